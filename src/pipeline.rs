use log::info;
use std::sync::Arc;
use std::time::Instant;

use crate::concurrent;
use crate::config::{Config, Strategy};
use crate::corpus::Corpus;
use crate::partition;
use crate::processes::{self, Anomaly};
use crate::rank::{self, RankedList};
use crate::result::Result;
use crate::table::FrequencyTable;
use crate::threads;

/// Result of counting and ranking one corpus.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub ranked: RankedList,
    pub total_tokens: usize,
    pub distinct_tokens: usize,
    pub anomalies: Vec<Anomaly>,
}

/// Builds the global table for `corpus` with the configured strategy. The
/// returned table is in first-occurrence order regardless of how the workers
/// were scheduled.
pub fn tally(corpus: &Arc<Corpus>, config: &Config) -> Result<(FrequencyTable, Vec<Anomaly>)> {
    config.validate()?;

    let chunks = || partition::plan(corpus.len(), config.workers);
    let (mut table, anomalies) = match config.strategy {
        Strategy::Naive => (FrequencyTable::aggregate(corpus.tokens(), 0), Vec::new()),
        Strategy::Threads => (threads::count(Arc::clone(corpus), &chunks()?)?, Vec::new()),
        Strategy::Concurrent => (concurrent::count(Arc::clone(corpus), &chunks()?)?, Vec::new()),
        Strategy::Processes => processes::count(corpus, &chunks()?)?,
    };

    table.sort_by_first_seen();
    Ok((table, anomalies))
}

/// Counts, merges and ranks `corpus`, keeping the `config.top_k` most frequent tokens.
pub fn run(corpus: &Arc<Corpus>, config: &Config) -> Result<Outcome> {
    let start = Instant::now();
    let (table, anomalies) = tally(corpus, config)?;
    info!(
        "{} strategy counted {} distinct tokens in {:?}",
        config.strategy,
        table.len(),
        start.elapsed()
    );

    let distinct_tokens = table.len();
    let start = Instant::now();
    let ranked = rank::rank(table, config.top_k);
    info!("ranked {} entries in {:?}", distinct_tokens, start.elapsed());

    Ok(Outcome {
        ranked,
        total_tokens: corpus.len(),
        distinct_tokens,
        anomalies,
    })
}
