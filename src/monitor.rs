//! Poll loop: aggregate, publish, sleep, repeat.
//!
//! A zero interval runs exactly one cycle. Otherwise cycles repeat until a
//! shutdown signal arrives; the signal interrupts both an in-progress cycle
//! and the sleep between cycles.
//!
//! CHANGELOG:
//! - 10/18/2026 - Per-cycle NDJSON reports (Phase 2)
//! - 10/18/2026 - Race cycles and sleeps against shutdown (Phase 1)

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

use crate::aggregate::{aggregate, QueryErrorPolicy};
use crate::config::{Config, MetricSettings};
use crate::error::Result;
use crate::publish::{publish, MetricDatapoint, MetricSink};
use crate::shutdown::{Shutdown, ShutdownSignal};
use crate::store::{ConnectionPool, QueueConnection};

/// What one cycle did.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    pub list: String,
    pub servers: usize,
    pub skipped: usize,
    pub total: i64,
    pub timestamp: DateTime<Utc>,
    /// `None` when publishing is disabled
    pub published: Option<bool>,
}

/// How the loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Single-cycle mode finished
    Completed { cycles: u64 },
    /// A shutdown signal stopped the loop
    Interrupted { cycles: u64, signal: ShutdownSignal },
}

impl RunOutcome {
    pub fn cycles(&self) -> u64 {
        match self {
            Self::Completed { cycles } | Self::Interrupted { cycles, .. } => *cycles,
        }
    }
}

/// Drives the aggregate-and-publish cycle.
pub struct Monitor<C, S> {
    pool: ConnectionPool<C>,
    sink: Option<S>,
    list_key: String,
    metric: MetricSettings,
    interval: Duration,
    policy: QueryErrorPolicy,
    json: bool,
}

impl<C: QueueConnection, S: MetricSink> Monitor<C, S> {
    /// `sink` is `None` when publishing is disabled.
    pub fn new(pool: ConnectionPool<C>, sink: Option<S>, config: &Config) -> Self {
        Self {
            pool,
            sink,
            list_key: config.list_key.clone(),
            metric: config.metric.clone(),
            interval: config.interval,
            policy: config.on_query_error,
            json: config.json,
        }
    }

    /// One aggregate -> log -> publish pass.
    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        let result = aggregate(&mut self.pool, &self.list_key, self.policy).await?;
        info!(redis_total = result.total, "counters");

        let datapoint = MetricDatapoint::count(&self.metric, result.total);
        let published = match &self.sink {
            Some(sink) => Some(publish(sink, &datapoint).await),
            None => None,
        };

        let report = CycleReport {
            list: result.list,
            servers: result.servers,
            skipped: result.skipped,
            total: result.total,
            timestamp: datapoint.timestamp,
            published,
        };
        if self.json {
            emit_report(&report);
        }
        Ok(report)
    }

    /// Run until single-cycle completion, a fatal error, or shutdown.
    pub async fn run(&mut self, shutdown: &mut Shutdown) -> Result<RunOutcome> {
        let mut cycles = 0u64;
        loop {
            tokio::select! {
                biased;
                signal = shutdown.recv() => {
                    return Ok(RunOutcome::Interrupted { cycles, signal });
                }
                report = self.run_cycle() => {
                    report?;
                }
            }
            cycles += 1;

            if self.interval.is_zero() {
                return Ok(RunOutcome::Completed { cycles });
            }

            tokio::select! {
                biased;
                signal = shutdown.recv() => {
                    return Ok(RunOutcome::Interrupted { cycles, signal });
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }
}

/// Write one compact JSON line to stdout.
fn emit_report(report: &CycleReport) {
    match serde_json::to_string(report) {
        Ok(line) => println!("{}", line),
        Err(e) => warn!(error = %e, "could not serialize cycle report"),
    }
}
