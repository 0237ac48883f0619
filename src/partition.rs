use simple_error::bail;
use std::ops::Range;

use crate::result::Result;

/// Half-open index range `[start, end)` over the token sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub start: usize,
    pub end: usize,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }
}

/// Splits `n` items into `workers` contiguous chunks whose sizes differ by at
/// most one; the first `n % workers` chunks get the extra item.
pub fn plan(n: usize, workers: usize) -> Result<Vec<Chunk>> {
    if workers == 0 {
        bail!("cannot partition {} tokens over zero workers", n);
    }

    let base = n / workers;
    let rem = n % workers;
    let mut chunks = Vec::with_capacity(workers);
    let mut start = 0;
    for i in 0..workers {
        let size = if i < rem { base + 1 } else { base };
        chunks.push(Chunk {
            start,
            end: start + size,
        });
        start += size;
    }
    debug_assert_eq!(start, n);
    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sizes(chunks: &[Chunk]) -> Vec<usize> {
        chunks.iter().map(Chunk::len).collect()
    }

    #[test]
    fn remainder_goes_to_first_chunks() {
        let chunks = plan(10, 4).unwrap();
        assert_eq!(sizes(&chunks), vec![3, 3, 2, 2]);
        assert_eq!(chunks[0], Chunk { start: 0, end: 3 });
        assert_eq!(chunks[3], Chunk { start: 8, end: 10 });
    }

    #[test]
    fn covers_everything_without_overlap() {
        for n in 0..50 {
            for w in 1..12 {
                let chunks = plan(n, w).unwrap();
                assert_eq!(chunks.len(), w);
                assert_eq!(chunks[0].start, 0);
                assert_eq!(chunks[w - 1].end, n);
                for pair in chunks.windows(2) {
                    assert_eq!(pair[0].end, pair[1].start);
                }
                let max = chunks.iter().map(Chunk::len).max().unwrap();
                let min = chunks.iter().map(Chunk::len).min().unwrap();
                assert!(max - min <= 1, "n={} w={}", n, w);
            }
        }
    }

    #[test]
    fn more_workers_than_tokens() {
        let chunks = plan(3, 8).unwrap();
        assert_eq!(sizes(&chunks), vec![1, 1, 1, 0, 0, 0, 0, 0]);
        assert!(chunks[7].is_empty());
        assert_eq!(chunks[7].range(), 3..3);
    }

    #[test]
    fn empty_input() {
        let chunks = plan(0, 8).unwrap();
        assert!(chunks.iter().all(Chunk::is_empty));
    }

    #[test]
    fn deterministic() {
        assert_eq!(plan(1_000_003, 7).unwrap(), plan(1_000_003, 7).unwrap());
    }

    #[test]
    fn zero_workers_is_an_error() {
        assert!(plan(10, 0).is_err());
    }
}
