//! redis-cloudwatch - publish Redis queue depth to CloudWatch
//!
//! Sums `LLEN` of one list across every configured Redis server and sends the
//! total as a single Count datapoint, once or on an interval.
//!
//! CHANGELOG:
//! - 10/18/2026 - Lock before connecting; single exit point for fatal errors (Phase 2)
//! - 10/18/2026 - Initial CLI (Phase 1)

use anyhow::{Context, Result};
use clap::Parser;
use std::process::ExitCode;
use tracing::{debug, error, info};

use redis_cloudwatch::config::{Cli, Config};
use redis_cloudwatch::credentials;
use redis_cloudwatch::lock::LockFile;
use redis_cloudwatch::logging;
use redis_cloudwatch::monitor::{Monitor, RunOutcome};
use redis_cloudwatch::publish::CloudWatchSink;
use redis_cloudwatch::shutdown;
use redis_cloudwatch::store::ConnectionPool;
use redis_cloudwatch::Error;

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);

    let config = match cli.into_config() {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::from(1);
        }
    };

    match run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(1)
        }
    }
}

/// Take the lock, run the loop, release the lock. The lock is released
/// exactly once whichever way the loop ends.
fn run(config: &Config) -> Result<()> {
    logging::log_startup(config);

    let lock = LockFile::acquire(&config.lock_file)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    let result = runtime.block_on(poll(config));

    lock.release();
    info!("Done");
    result
}

async fn poll(config: &Config) -> Result<()> {
    let mut shutdown = shutdown::listen_for_signals().map_err(Error::Signal)?;

    let pool = tokio::select! {
        signal = shutdown.recv() => {
            info!(%signal, "shutting down before first cycle");
            return Ok(());
        }
        pool = ConnectionPool::connect(&config.servers) => pool?,
    };

    let sink = if config.publish {
        let sdk_config = credentials::load_sdk_config(&config.aws).await;
        Some(CloudWatchSink::new(&sdk_config))
    } else {
        None
    };

    let mut monitor = Monitor::new(pool, sink, config);
    match monitor.run(&mut shutdown).await? {
        RunOutcome::Completed { cycles } => debug!(cycles, "finished"),
        RunOutcome::Interrupted { cycles, signal } => {
            info!(%signal, cycles, "shutting down")
        }
    }
    Ok(())
}
