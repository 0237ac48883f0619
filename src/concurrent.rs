//! Thread-parallel merge into a sharded concurrent map. Workers still count
//! their chunk privately first; the merge then only locks the shard that
//! holds each token, so merge passes of different workers can overlap.

use concurrent_hashmap::ConcHashMap;
use log::debug;
use simple_error::SimpleError;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::corpus::{Corpus, Token};
use crate::partition::Chunk;
use crate::result::Result;
use crate::table::{FrequencyEntry, FrequencyTable};

#[derive(Debug, Clone, Copy)]
struct Tally {
    count: i32,
    first_seen: usize,
}

type SharedCounts = ConcHashMap<Token, Tally>;

fn count_chunk(corpus: &Corpus, chunk: Chunk, counts: &SharedCounts) {
    let local = FrequencyTable::aggregate(&corpus.tokens()[chunk.range()], chunk.start);
    debug!("upserting {} local entries", local.len());

    for entry in local.into_entries() {
        upsert(counts, entry);
    }
}

fn upsert(counts: &SharedCounts, entry: FrequencyEntry) {
    let tally = Tally {
        count: entry.count,
        first_seen: entry.first_seen,
    };
    counts.upsert(entry.token, tally, &|old: &mut Tally| {
        old.count = old.count.saturating_add(tally.count);
        old.first_seen = old.first_seen.min(tally.first_seen);
    });
}

fn join_all(workers: Vec<JoinHandle<()>>) -> Result<()> {
    let mut panicked = 0;
    for worker in workers {
        if worker.join().is_err() {
            panicked += 1;
        }
    }
    if panicked > 0 {
        return Err(SimpleError::new(format!("{} worker threads panicked", panicked)));
    }
    Ok(())
}

pub fn count(corpus: Arc<Corpus>, chunks: &[Chunk]) -> Result<FrequencyTable> {
    let counts: Arc<SharedCounts> = Arc::new(ConcHashMap::<Token, Tally>::new());
    let mut workers = Vec::with_capacity(chunks.len());

    for (i, &chunk) in chunks.iter().enumerate() {
        debug!("spawn worker {} for tokens {}..{}", i, chunk.start, chunk.end);

        let corpus = Arc::clone(&corpus);
        let map = Arc::clone(&counts);
        let res = thread::Builder::new()
            .name(format!("worker-{}", i))
            .spawn(move || count_chunk(&corpus, chunk, &map));

        match res {
            Ok(handle) => workers.push(handle),
            Err(e) => {
                let _ = join_all(workers);
                return Err(SimpleError::with("failed to spawn worker thread", e));
            }
        }
    }

    join_all(workers)?;

    let table: FrequencyTable = counts
        .iter()
        .map(|(token, tally)| FrequencyEntry::new(token.clone(), tally.count, tally.first_seen))
        .collect();
    Ok(table)
}
