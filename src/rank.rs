use std::fmt;

use crate::table::{FrequencyEntry, FrequencyTable};

/// The `k` most frequent entries, most frequent first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RankedList {
    entries: Vec<FrequencyEntry>,
}

impl RankedList {
    pub fn entries(&self) -> &[FrequencyEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(token, count)` pairs, for display and comparisons.
    pub fn pairs(&self) -> Vec<(String, i32)> {
        self.entries
            .iter()
            .map(|e| (e.token.to_string(), e.count))
            .collect()
    }
}

impl fmt::Display for RankedList {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for entry in &self.entries {
            writeln!(f, "{}: {}", entry.token, entry.count)?;
        }
        Ok(())
    }
}

/// Ranks the table by descending count. Entries with equal counts keep the
/// order they have in the table.
pub fn rank(table: FrequencyTable, k: usize) -> RankedList {
    let mut entries = table.into_entries();
    sort_by_count(&mut entries);
    entries.truncate(k);
    RankedList { entries }
}

/// Stable top-down merge sort, descending by count.
pub fn sort_by_count(entries: &mut [FrequencyEntry]) {
    let mut scratch = Vec::with_capacity(entries.len());
    merge_sort(entries, &mut scratch);
}

fn merge_sort(entries: &mut [FrequencyEntry], scratch: &mut Vec<FrequencyEntry>) {
    if entries.len() < 2 {
        return;
    }
    let mid = (entries.len() + 1) / 2;
    merge_sort(&mut entries[..mid], scratch);
    merge_sort(&mut entries[mid..], scratch);
    // halves already in order
    if entries[mid - 1].count >= entries[mid].count {
        return;
    }
    merge(entries, mid, scratch);
}

fn merge(entries: &mut [FrequencyEntry], mid: usize, scratch: &mut Vec<FrequencyEntry>) {
    scratch.clear();
    scratch.extend_from_slice(entries);
    let (left, right) = scratch.split_at(mid);

    let (mut i, mut j) = (0, 0);
    for slot in entries.iter_mut() {
        // ties go to the left half
        let take_left = j == right.len() || (i < left.len() && left[i].count >= right[j].count);
        if take_left {
            *slot = left[i].clone();
            i += 1;
        } else {
            *slot = right[j].clone();
            j += 1;
        }
    }
}
