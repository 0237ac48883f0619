//! Process-parallel merge. Each worker is a forked child with its own copy of
//! the corpus; the only thing the children share is the [`SharedTable`]
//! mapping, which they fold their local counts into under its lock.

use log::{debug, warn};
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{self, ForkResult, Pid};
use simple_error::{try_with, SimpleError};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use crate::corpus::Corpus;
use crate::partition::Chunk;
use crate::result::Result;
use crate::shm::SharedTable;
use crate::table::FrequencyTable;

const EXIT_OVERFLOW: i32 = 2;
const EXIT_LOCK: i32 = 3;
const EXIT_PANIC: i32 = 101;

/// A worker that did not finish cleanly. The run goes on with whatever made
/// it into the shared table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Anomaly {
    Exited { worker: usize, pid: i32, code: i32 },
    Signaled { worker: usize, pid: i32, signal: String },
    Dropped { entries: u64 },
    /// Workers died holding the shared table lock.
    LockRecovered { times: u64 },
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Anomaly::Exited { worker, pid, code } => write!(
                f,
                "worker {} (pid {}) exited with status {}",
                worker, pid, code
            ),
            Anomaly::Signaled {
                worker,
                pid,
                signal,
            } => write!(
                f,
                "worker {} (pid {}) was killed by {}",
                worker, pid, signal
            ),
            Anomaly::Dropped { entries } => {
                write!(f, "{} entries did not fit into the shared table", entries)
            }
            Anomaly::LockRecovered { times } => write!(
                f,
                "shared table lock recovered {} times from dead workers",
                times
            ),
        }
    }
}

fn run_worker(corpus: &Corpus, chunk: Chunk, shared: &SharedTable) -> i32 {
    let res = panic::catch_unwind(AssertUnwindSafe(|| -> Result<u64> {
        let local = FrequencyTable::aggregate(&corpus.tokens()[chunk.range()], chunk.start);
        let mut guard = shared.lock()?;
        Ok(guard.merge(&local))
    }));
    match res {
        Ok(Ok(0)) => 0,
        Ok(Ok(_)) => EXIT_OVERFLOW,
        Ok(Err(_)) => EXIT_LOCK,
        Err(_) => EXIT_PANIC,
    }
}

fn wait_worker(pid: Pid) -> Result<WaitStatus> {
    loop {
        match waitpid(pid, None) {
            Err(Errno::EINTR) => continue,
            res => return Ok(try_with!(res, "failed to wait for worker {}", pid)),
        }
    }
}

fn kill_workers(workers: &[(usize, Pid)]) {
    for &(_, pid) in workers {
        let _ = signal::kill(pid, Signal::SIGKILL);
    }
    for &(_, pid) in workers {
        let _ = wait_worker(pid);
    }
}

/// Waits for every worker in turn. If waiting fails, the workers not yet
/// reaped are killed and reaped before the error is returned.
fn reap_workers(workers: &[(usize, Pid)]) -> Result<Vec<Anomaly>> {
    let mut anomalies = Vec::new();
    for (i, &(worker, pid)) in workers.iter().enumerate() {
        let status = match wait_worker(pid) {
            Ok(status) => status,
            Err(e) => {
                kill_workers(&workers[i + 1..]);
                return Err(e);
            }
        };
        let anomaly = match status {
            WaitStatus::Exited(_, 0) => None,
            WaitStatus::Exited(_, code) => Some(Anomaly::Exited {
                worker,
                pid: pid.as_raw(),
                code,
            }),
            WaitStatus::Signaled(_, sig, _) => Some(Anomaly::Signaled {
                worker,
                pid: pid.as_raw(),
                signal: format!("{:?}", sig),
            }),
            status => {
                debug!("unexpected wait status for worker {}: {:?}", worker, status);
                None
            }
        };
        if let Some(anomaly) = anomaly {
            warn!("{}", anomaly);
            anomalies.push(anomaly);
        }
    }
    Ok(anomalies)
}

/// Counts `corpus` with one forked process per chunk. Abnormal worker exits
/// are returned as anomalies rather than errors.
pub fn count(corpus: &Corpus, chunks: &[Chunk]) -> Result<(FrequencyTable, Vec<Anomaly>)> {
    // every chunk has at most as many distinct tokens as tokens, so this
    // bounds the number of distinct tokens overall
    let shared = SharedTable::new(corpus.len())?;
    let mut workers = Vec::with_capacity(chunks.len());

    for (i, &chunk) in chunks.iter().enumerate() {
        // SAFETY: the child only reads its copy of the corpus, writes the
        // shared mapping under its lock and leaves through _exit.
        match unsafe { unistd::fork() } {
            Ok(ForkResult::Child) => {
                let code = run_worker(corpus, chunk, &shared);
                unsafe { libc::_exit(code) }
            }
            Ok(ForkResult::Parent { child }) => {
                debug!(
                    "spawn worker {} (pid {}) for tokens {}..{}",
                    i, child, chunk.start, chunk.end
                );
                workers.push((i, child));
            }
            Err(e) => {
                kill_workers(&workers);
                return Err(SimpleError::with("failed to fork worker", e));
            }
        }
    }

    let mut anomalies = reap_workers(&workers)?;

    let dropped = shared.dropped();
    if dropped > 0 {
        let anomaly = Anomaly::Dropped { entries: dropped };
        warn!("{}", anomaly);
        anomalies.push(anomaly);
    }

    // every worker is reaped, so a recovery can only come from a dead one
    let table = shared.snapshot()?;
    let recovered = shared.recovered();
    if recovered > 0 {
        let anomaly = Anomaly::LockRecovered { times: recovered };
        warn!("{}", anomaly);
        anomalies.push(anomaly);
    }

    Ok((table, anomalies))
}
