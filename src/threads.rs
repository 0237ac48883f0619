//! Thread-parallel merge: every worker counts its chunk without any shared
//! state, then takes the one global lock and folds its whole local table in.

use log::debug;
use simple_error::{bail, try_with, SimpleError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crate::corpus::Corpus;
use crate::partition::Chunk;
use crate::result::Result;
use crate::table::FrequencyTable;

fn count_chunk(corpus: &Corpus, chunk: Chunk, global: &Mutex<FrequencyTable>) -> Result<()> {
    let local = FrequencyTable::aggregate(&corpus.tokens()[chunk.range()], chunk.start);

    let mut table = match global.lock() {
        Ok(table) => table,
        Err(_) => bail!("global table lock poisoned"),
    };
    debug!(
        "merging {} local entries into {} global entries",
        local.len(),
        table.len()
    );
    table.absorb_table(local);
    Ok(())
}

fn join_all(workers: Vec<JoinHandle<Result<()>>>) -> Result<()> {
    let mut first_error = None;
    for worker in workers {
        let res = match worker.join() {
            Ok(res) => res,
            Err(_) => Err(SimpleError::new("worker thread panicked")),
        };
        if let Err(e) = res {
            if first_error.is_none() {
                first_error = Some(e);
            }
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Counts `corpus` with one thread per chunk. Returns once every worker has
/// finished both its local pass and its merge pass.
pub fn count(corpus: Arc<Corpus>, chunks: &[Chunk]) -> Result<FrequencyTable> {
    let global = Arc::new(Mutex::new(FrequencyTable::new()));
    let mut workers = Vec::with_capacity(chunks.len());

    for (i, &chunk) in chunks.iter().enumerate() {
        debug!("spawn worker {} for tokens {}..{}", i, chunk.start, chunk.end);

        let corpus = Arc::clone(&corpus);
        let table = Arc::clone(&global);
        let res = thread::Builder::new()
            .name(format!("worker-{}", i))
            .spawn(move || count_chunk(&corpus, chunk, &table));

        match res {
            Ok(handle) => workers.push(handle),
            Err(e) => {
                let _ = join_all(workers);
                return Err(SimpleError::with("failed to spawn worker thread", e));
            }
        }
    }

    join_all(workers)?;

    let global = match Arc::try_unwrap(global) {
        Ok(global) => global,
        Err(_) => bail!("global table still shared after join"),
    };
    let table = try_with!(global.into_inner(), "global table lock poisoned");
    Ok(table)
}
