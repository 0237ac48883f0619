use std::fmt;
use std::time::Duration;

use crate::config::Strategy;
use crate::pipeline::Outcome;

pub struct Report {
    pub outcome: Outcome,
    pub strategy: Strategy,
    pub workers: usize,
    pub elapsed: Duration,
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "Top {} Most Frequent Words:", self.outcome.ranked.len())?;
        write!(f, "{}", self.outcome.ranked)?;

        writeln!(f)?;
        writeln!(f, "Total Words: {}", self.outcome.total_tokens)?;
        match self.strategy {
            Strategy::Naive => {}
            Strategy::Processes => writeln!(f, "Number of Processes Used: {}", self.workers)?,
            Strategy::Threads | Strategy::Concurrent => {
                writeln!(f, "Number of Threads Used: {}", self.workers)?
            }
        }
        if !self.outcome.anomalies.is_empty() {
            writeln!(f, "Worker Anomalies: {}", self.outcome.anomalies.len())?;
        }
        writeln!(f, "Execution Time: {:.4} seconds", self.elapsed.as_secs_f64())
    }
}
