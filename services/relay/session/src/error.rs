//! Session error types.

use std::time::Duration;
use thiserror::Error;

/// Session errors
#[derive(Error, Debug)]
pub enum SessionError {
    /// Dial failed
    #[error("connect to {target} failed: {source}")]
    Connect {
        /// Dialled endpoint
        target: String,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// Dial did not resolve in time
    #[error("connect to {target} timed out after {timeout:?}")]
    DialTimeout {
        /// Dialled endpoint
        target: String,
        /// Configured dial timeout
        timeout: Duration,
    },

    /// Session manager is no longer running
    #[error("session manager stopped")]
    Closed,
}
