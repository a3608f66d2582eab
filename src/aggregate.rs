//! Sum a list's length across every connection.

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::store::{ConnectionPool, QueueConnection};

/// What a failed LLEN does to the cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum QueryErrorPolicy {
    /// The first failure is fatal
    #[default]
    Abort,
    /// Leave the failing server out of this cycle's sum
    Skip,
}

/// One cycle's total. Built fresh every cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregateResult {
    pub list: String,
    pub total: i64,
    /// Servers whose length is included in `total`
    pub servers: usize,
    /// Servers left out under `QueryErrorPolicy::Skip`
    pub skipped: usize,
}

/// Query `key` on every connection, one at a time, and add up the lengths.
pub async fn aggregate<C: QueueConnection>(
    pool: &mut ConnectionPool<C>,
    key: &str,
    policy: QueryErrorPolicy,
) -> Result<AggregateResult> {
    let mut result = AggregateResult {
        list: key.to_string(),
        total: 0,
        servers: 0,
        skipped: 0,
    };

    for conn in pool.connections_mut() {
        debug!(server = conn.name(), "Looking up queue length");
        match conn.list_len(key).await {
            Ok(len) => {
                debug!(server = conn.name(), list = key, length = len, "queue length");
                result.total += len;
                result.servers += 1;
            }
            Err(e) if policy == QueryErrorPolicy::Skip => {
                warn!(server = conn.name(), error = %e, "excluding server from this cycle");
                result.skipped += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }

    if result.servers == 0 && result.skipped > 0 {
        return Err(Error::AllServersFailed {
            list: key.to_string(),
        });
    }
    Ok(result)
}
