//! Fatal errors. Anything that reaches `main` as an `Error` ends the process
//! with a non-zero exit code; publish failures never become one.

use thiserror::Error;

use crate::config::ConfigError;
use crate::lock::LockError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("every redis server failed to report the length of '{list}'")]
    AllServersFailed { list: String },

    #[error("failed to install signal handler: {0}")]
    Signal(#[source] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
