//! redis-cloudwatch library
//!
//! Polls the length of a Redis list on every configured server, sums it, and
//! publishes the total as a CloudWatch metric. Exposes modules for the binary
//! and for tests.
//!
//! CHANGELOG:
//! - 10/18/2026 - Initial library structure (Phase 1)

pub mod aggregate;
pub mod config;
pub mod credentials;
pub mod error;
pub mod lock;
pub mod logging;
pub mod monitor;
pub mod publish;
pub mod shutdown;
pub mod store;

pub use error::{Error, Result};
