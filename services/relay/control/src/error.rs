//! Control layer error types.

use thiserror::Error;

/// Control layer errors
#[derive(Error, Debug)]
pub enum ControlError {
    /// The connectivity manager reported an unrecoverable modem failure
    #[error("connectivity lost: 3G bring-up failed")]
    ConnectivityLost,

    /// A subsystem event stream ended
    #[error("{0} event stream closed")]
    SubsystemClosed(&'static str),
}
