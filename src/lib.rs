//! Word frequency counting over a tokenized corpus, with interchangeable
//! single-threaded, multi-threaded and multi-process merge strategies.

pub mod concurrent;
pub mod config;
pub mod corpus;
pub mod logger;
pub mod partition;
pub mod pipeline;
pub mod processes;
pub mod rank;
pub mod report;
pub mod result;
pub mod shm;
pub mod table;
pub mod threads;

pub use crate::config::{Config, Strategy};
pub use crate::corpus::{Corpus, Token};
pub use crate::pipeline::{run, tally, Outcome};
pub use crate::rank::RankedList;
pub use crate::table::{FrequencyEntry, FrequencyTable};
