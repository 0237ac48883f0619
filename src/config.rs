use simple_error::{bail, try_with};
use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::result::Result;

/// Longest token kept, in bytes. Longer input tokens are cut to this length.
pub const MAX_TOKEN_LEN: usize = 59;

/// Entries reserved up front in every frequency table.
pub const INITIAL_CAPACITY: usize = 4096;

pub const DEFAULT_WORKERS: usize = 8;

pub const DEFAULT_TOP_K: usize = 10;

pub const DEFAULT_INPUT: &str = "text8.txt";

pub const USAGE: &str = "usage: wordfreq [-s|--strategy naive|threads|processes|concurrent] \
                         [-j|--workers N] [-k|--top K] [-v|--verbose] [FILE]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// One aggregator over the whole sequence.
    Naive,
    /// Worker threads merging into a mutex-guarded table.
    Threads,
    /// Forked workers merging into a shared mapping.
    Processes,
    /// Worker threads upserting into a bucket-locked concurrent map.
    Concurrent,
}

impl FromStr for Strategy {
    type Err = simple_error::SimpleError;

    fn from_str(s: &str) -> Result<Strategy> {
        match s {
            "naive" => Ok(Strategy::Naive),
            "threads" => Ok(Strategy::Threads),
            "processes" => Ok(Strategy::Processes),
            "concurrent" => Ok(Strategy::Concurrent),
            _ => bail!("unknown strategy '{}'", s),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Strategy::Naive => "naive",
            Strategy::Threads => "threads",
            Strategy::Processes => "processes",
            Strategy::Concurrent => "concurrent",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub strategy: Strategy,
    pub workers: usize,
    pub top_k: usize,
    pub input: PathBuf,
    pub verbose: bool,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            strategy: Strategy::Threads,
            workers: DEFAULT_WORKERS,
            top_k: DEFAULT_TOP_K,
            input: PathBuf::from(DEFAULT_INPUT),
            verbose: false,
        }
    }
}

fn value_of<I>(args: &mut I, flag: &str) -> Result<String>
where
    I: Iterator<Item = OsString>,
{
    let value = match args.next() {
        Some(v) => v,
        None => bail!("missing value for {}", flag),
    };
    match value.into_string() {
        Ok(v) => Ok(v),
        Err(v) => bail!("invalid value for {}: {:?}", flag, v),
    }
}

impl Config {
    /// Parses command line arguments, excluding the program name.
    pub fn from_args<I>(args: I) -> Result<Config>
    where
        I: IntoIterator<Item = OsString>,
    {
        let mut config = Config::default();
        let mut input = None;
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            match arg.to_str() {
                Some("-s") | Some("--strategy") => {
                    config.strategy = value_of(&mut args, "--strategy")?.parse()?;
                }
                Some("-j") | Some("--workers") => {
                    let v = value_of(&mut args, "--workers")?;
                    config.workers = try_with!(v.parse(), "invalid worker count '{}'", v);
                }
                Some("-k") | Some("--top") => {
                    let v = value_of(&mut args, "--top")?;
                    config.top_k = try_with!(v.parse(), "invalid top count '{}'", v);
                }
                Some("-v") | Some("--verbose") => config.verbose = true,
                Some(flag) if flag.starts_with('-') && flag.len() > 1 => {
                    bail!("unknown option '{}'\n{}", flag, USAGE)
                }
                _ => {
                    if input.is_some() {
                        bail!("more than one input file given\n{}", USAGE);
                    }
                    input = Some(PathBuf::from(&arg));
                }
            }
        }

        if let Some(path) = input {
            config.input = path;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            bail!("worker count must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Config> {
        Config::from_args(args.iter().map(OsString::from))
    }

    #[test]
    fn defaults() {
        let config = parse(&[]).unwrap();
        assert_eq!(config.strategy, Strategy::Threads);
        assert_eq!(config.workers, DEFAULT_WORKERS);
        assert_eq!(config.top_k, DEFAULT_TOP_K);
        assert_eq!(config.input, PathBuf::from(DEFAULT_INPUT));
        assert!(!config.verbose);
    }

    #[test]
    fn all_options() {
        let config = parse(&["-s", "processes", "-j", "3", "--top", "5", "-v", "corpus.txt"]).unwrap();
        assert_eq!(config.strategy, Strategy::Processes);
        assert_eq!(config.workers, 3);
        assert_eq!(config.top_k, 5);
        assert_eq!(config.input, PathBuf::from("corpus.txt"));
        assert!(config.verbose);
    }

    #[test]
    fn zero_workers_rejected() {
        assert!(parse(&["--workers", "0"]).is_err());
    }

    #[test]
    fn bad_values_rejected() {
        assert!(parse(&["--strategy", "gpu"]).is_err());
        assert!(parse(&["--workers", "-2"]).is_err());
        assert!(parse(&["--top"]).is_err());
        assert!(parse(&["--frobnicate"]).is_err());
        assert!(parse(&["a.txt", "b.txt"]).is_err());
    }

    #[test]
    fn strategy_names_round_trip() {
        for s in &[
            Strategy::Naive,
            Strategy::Threads,
            Strategy::Processes,
            Strategy::Concurrent,
        ] {
            assert_eq!(s.to_string().parse::<Strategy>().unwrap(), *s);
        }
    }
}
