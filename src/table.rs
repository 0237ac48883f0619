//! Token frequency tables.
//!
//! A [`FrequencyTable`] keeps exactly one entry per distinct token, in the
//! order the tokens were first inserted. Workers build a private table over
//! their chunk with [`FrequencyTable::aggregate`]; the coordinator folds those
//! into the global table with [`FrequencyTable::absorb`].

use std::collections::HashMap;

use crate::config::INITIAL_CAPACITY;
use crate::corpus::Token;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrequencyEntry {
    pub token: Token,
    pub count: i32,
    /// Index of the first occurrence in the whole token sequence.
    pub first_seen: usize,
}

impl FrequencyEntry {
    pub fn new(token: Token, count: i32, first_seen: usize) -> FrequencyEntry {
        FrequencyEntry {
            token,
            count,
            first_seen,
        }
    }

    /// Counts saturate at `i32::MAX` rather than wrapping negative.
    fn add(&mut self, count: i32, first_seen: usize) {
        self.count = self.count.saturating_add(count);
        if first_seen < self.first_seen {
            self.first_seen = first_seen;
        }
    }
}

#[derive(Debug, Clone)]
pub struct FrequencyTable {
    index: HashMap<Token, usize>,
    entries: Vec<FrequencyEntry>,
}

impl Default for FrequencyTable {
    fn default() -> FrequencyTable {
        FrequencyTable::new()
    }
}

impl FrequencyTable {
    pub fn new() -> FrequencyTable {
        FrequencyTable::with_capacity(INITIAL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> FrequencyTable {
        FrequencyTable {
            index: HashMap::with_capacity(capacity),
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Counts `tokens`, which start at position `offset` of the full sequence.
    pub fn aggregate(tokens: &[Token], offset: usize) -> FrequencyTable {
        let mut table = FrequencyTable::with_capacity(INITIAL_CAPACITY.min(tokens.len()));
        for (i, token) in tokens.iter().enumerate() {
            table.record(token, offset + i);
        }
        table
    }

    /// Counts one occurrence of `token` seen at `position`.
    pub fn record(&mut self, token: &Token, position: usize) {
        match self.index.get(token.as_bytes()) {
            Some(&i) => self.entries[i].add(1, position),
            None => self.append(FrequencyEntry::new(token.clone(), 1, position)),
        }
    }

    /// Find-or-append: adds the entry's count to an existing entry for the
    /// same token, or appends it as a new entry.
    pub fn absorb(&mut self, entry: FrequencyEntry) {
        match self.index.get(entry.token.as_bytes()) {
            Some(&i) => self.entries[i].add(entry.count, entry.first_seen),
            None => self.append(entry),
        }
    }

    pub fn absorb_table(&mut self, other: FrequencyTable) {
        self.entries.reserve(other.len());
        for entry in other.entries {
            self.absorb(entry);
        }
    }

    fn append(&mut self, entry: FrequencyEntry) {
        self.index.insert(entry.token.clone(), self.entries.len());
        self.entries.push(entry);
    }

    pub fn get(&self, token: &[u8]) -> Option<&FrequencyEntry> {
        self.index.get(token).map(|&i| &self.entries[i])
    }

    /// Insertion index of `token`'s entry.
    pub fn position(&self, token: &[u8]) -> Option<usize> {
        self.index.get(token).copied()
    }

    pub fn count(&self, token: &str) -> i32 {
        self.get(token.as_bytes()).map_or(0, |e| e.count)
    }

    /// Number of distinct tokens.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of all counts.
    pub fn total(&self) -> u64 {
        self.entries.iter().map(|e| e.count as u64).sum()
    }

    pub fn entries(&self) -> &[FrequencyEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<FrequencyEntry> {
        self.entries
    }

    /// Reorders entries by first occurrence, which is the order a single
    /// sequential pass over the input would have inserted them in.
    pub fn sort_by_first_seen(&mut self) {
        self.entries.sort_unstable_by_key(|e| e.first_seen);
        for (i, entry) in self.entries.iter().enumerate() {
            if let Some(slot) = self.index.get_mut(entry.token.as_bytes()) {
                *slot = i;
            }
        }
    }
}

impl std::iter::FromIterator<FrequencyEntry> for FrequencyTable {
    fn from_iter<I: IntoIterator<Item = FrequencyEntry>>(iter: I) -> FrequencyTable {
        let mut table = FrequencyTable::new();
        for entry in iter {
            table.absorb(entry);
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::Corpus;

    fn corpus(text: &str) -> Corpus {
        Corpus::from_bytes(text.as_bytes())
    }

    #[test]
    fn counts_each_distinct_token_once() {
        let c = corpus("a b a c b a");
        let table = FrequencyTable::aggregate(c.tokens(), 0);
        assert_eq!(table.len(), 3);
        assert_eq!(table.count("a"), 3);
        assert_eq!(table.count("b"), 2);
        assert_eq!(table.count("c"), 1);
        assert_eq!(table.count("d"), 0);
        assert_eq!(table.total(), 6);
    }

    #[test]
    fn keeps_insertion_order() {
        let c = corpus("z y z x");
        let table = FrequencyTable::aggregate(c.tokens(), 0);
        let order: Vec<String> = table.entries().iter().map(|e| e.token.to_string()).collect();
        assert_eq!(order, vec!["z", "y", "x"]);
    }

    #[test]
    fn first_seen_is_global() {
        let c = corpus("q r q");
        let table = FrequencyTable::aggregate(c.tokens(), 100);
        assert_eq!(table.get(b"q").unwrap().first_seen, 100);
        assert_eq!(table.get(b"r").unwrap().first_seen, 101);
    }

    #[test]
    fn absorb_sums_counts_and_keeps_earliest_position() {
        let c = corpus("a b a | b c c");
        let left = FrequencyTable::aggregate(&c.tokens()[..3], 0);
        let right = FrequencyTable::aggregate(&c.tokens()[4..], 4);

        let mut global = FrequencyTable::new();
        global.absorb_table(right);
        global.absorb_table(left);

        assert_eq!(global.len(), 3);
        assert_eq!(global.count("a"), 2);
        assert_eq!(global.count("b"), 2);
        assert_eq!(global.count("c"), 2);
        assert_eq!(global.get(b"b").unwrap().first_seen, 1);
    }

    #[test]
    fn sort_by_first_seen_restores_sequential_order() {
        let c = corpus("one two three four two");
        let sequential = FrequencyTable::aggregate(c.tokens(), 0);

        let mut global = FrequencyTable::new();
        global.absorb_table(FrequencyTable::aggregate(&c.tokens()[3..], 3));
        global.absorb_table(FrequencyTable::aggregate(&c.tokens()[..3], 0));
        assert_ne!(global.entries(), sequential.entries());

        global.sort_by_first_seen();
        assert_eq!(global.entries(), sequential.entries());
        // the index must follow the moved entries
        global.absorb(FrequencyEntry::new(Token::from("two"), 5, 9));
        assert_eq!(global.count("two"), 7);
        assert_eq!(global.len(), 4);
    }

    #[test]
    fn counts_saturate_at_the_type_limit() {
        let mut table = FrequencyTable::new();
        table.absorb(FrequencyEntry::new(Token::from("w"), i32::MAX - 2, 4));
        table.absorb(FrequencyEntry::new(Token::from("w"), 10, 1));
        table.record(&Token::from("w"), 0);
        let entry = table.get(b"w").unwrap();
        assert_eq!(entry.count, i32::MAX);
        assert_eq!(entry.first_seen, 0);
    }

    #[test]
    fn survives_growth() {
        let words: Vec<String> = (0..3 * INITIAL_CAPACITY).map(|i| format!("w{}", i % 1000)).collect();
        let c: Corpus = words.iter().map(|w| w.as_str()).collect();
        let table = FrequencyTable::aggregate(c.tokens(), 0);
        assert_eq!(table.len(), 1000);
        assert_eq!(table.total(), (3 * INITIAL_CAPACITY) as u64);
    }
}
