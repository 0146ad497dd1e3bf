//! Binary entry point: CLI parsing, logging setup, configuration load, and
//! handing off to the [`supervisor::Supervisor`] (spec §4.6). Structured
//! after `examples/barrucadu-resolved/bin-resolved/src/main.rs`'s own
//! `main()`/`begin_logging()` — `tracing`-based logging with the same
//! `RUST_LOG_FORMAT` flag set, a fatal start-up path that logs and exits
//! non-zero rather than panicking.

mod cache_store;
mod cli;
mod error;
mod listener;
mod metrics;
mod routing;
mod rule_fetcher;
mod rules;
mod settings;
mod supervisor;

use std::collections::HashSet;
use std::env;
use std::process;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::Args;
use error::Error;
use supervisor::{Paths, Supervisor};

/// Mirrors the teacher's `begin_logging()`: `RUST_LOG_FORMAT` carries a
/// comma-separated set of format flags layered onto
/// `tracing_subscriber::fmt()`, `RUST_LOG` controls verbosity via the usual
/// `EnvFilter` convention.
fn begin_logging() {
    let log_format: HashSet<String> = match env::var("RUST_LOG_FORMAT") {
        Ok(var) => var.split(',').map(str::to_string).collect(),
        Err(_) => HashSet::new(),
    };

    let logger = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_ansi(!log_format.contains("no-ansi"));

    if log_format.contains("json") {
        if log_format.contains("no-time") {
            logger.json().without_time().init();
        } else {
            logger.json().init();
        }
    } else if log_format.contains("pretty") {
        if log_format.contains("no-time") {
            logger.pretty().without_time().init();
        } else {
            logger.pretty().init();
        }
    } else if log_format.contains("compact") {
        if log_format.contains("no-time") {
            logger.compact().without_time().init();
        } else {
            logger.compact().init();
        }
    } else if log_format.contains("no-time") {
        logger.without_time().init();
    } else {
        logger.init();
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if !args.start {
        let _ = <Args as clap::CommandFactory>::command().print_help();
        println!();
        process::exit(0);
    }

    begin_logging();

    if let Err(err) = run(args).await {
        tracing::error!(error = %err, "fatal start-up failure");
        process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), Error> {
    let config = settings::load(&args.config)?;

    let supervisor = Supervisor::new(
        config,
        Paths {
            cache_file: args.cache_file.clone(),
            rule_file: args.rule_file.clone(),
            subscriptions_file: args.subscriptions.clone(),
        },
        args.interface,
    );
    supervisor.start().await?;

    tracing::info!(
        address = %args.metrics_address,
        port = args.metrics_port,
        "binding Prometheus metrics endpoint"
    );
    metrics::serve_prometheus_endpoint_task(args.metrics_address, args.metrics_port)
        .await
        .map_err(|source| Error::Bind {
            address: format!("{}:{}/metrics", args.metrics_address, args.metrics_port),
            source,
        })
}
