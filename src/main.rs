use log::LevelFilter;
use simple_error::try_with;
use std::env;
use std::process::exit;
use std::sync::Arc;
use std::time::Instant;

use wordfreq::config::Config;
use wordfreq::corpus::Corpus;
use wordfreq::logger::{enable_debug_log, enable_log};
use wordfreq::pipeline;
use wordfreq::report::Report;
use wordfreq::result::Result;

fn count_words(config: &Config) -> Result<Report> {
    let start = Instant::now();
    let corpus = Arc::new(Corpus::read(&config.input)?);
    log::info!("read {} tokens from {}", corpus.len(), config.input.display());

    let outcome = try_with!(
        pipeline::run(&corpus, config),
        "{} strategy failed",
        config.strategy
    );

    Ok(Report {
        outcome,
        strategy: config.strategy,
        workers: config.workers,
        elapsed: start.elapsed(),
    })
}

fn main() {
    let config = match Config::from_args(env::args_os().skip(1)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            exit(2);
        }
    };

    let res = if config.verbose {
        enable_debug_log()
    } else {
        enable_log(LevelFilter::Warn)
    };
    if let Err(e) = res {
        eprintln!("cannot set up logging: {}", e);
    }

    match count_words(&config) {
        Ok(report) => print!("{}", report),
        Err(e) => {
            eprintln!("{}", e);
            exit(1);
        }
    };
}
