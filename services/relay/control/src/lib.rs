//! Control layer of the field relay.
//!
//! This crate turns subsystem events into actions: it interprets commands
//! coming from the server or from SMS, keeps the daily wake / sleep triggers
//! in line with the recording window, polls the modem for signal quality and
//! shapes every outbound message.
//!
//! ## Components
//!
//! - [`CommandInterpreter`]: validates and executes commands
//! - [`DailyTriggers`]: wake / sleep jobs on the daily scheduler
//! - [`StatePoller`]: `net<label>` reports on signal changes
//! - [`Reporter`]: status envelopes and measurement batches
//! - [`Relay`]: startup sequence and event routing
//!
//! The modem, sensor, OS and scheduler are reached through the traits in
//! [`subsystems`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod command;
pub mod error;
pub mod interpreter;
pub mod poller;
pub mod relay;
pub mod reporter;
pub mod schedule;
pub mod signal;
pub mod subsystems;
pub mod window;

#[cfg(test)]
mod testing;

pub use command::Command;
pub use error::ControlError;
pub use interpreter::{CommandInterpreter, Outcome};
pub use poller::StatePoller;
pub use relay::{Relay, RelaySettings};
pub use reporter::{Encoders, ReplyEncoding, Replier, Reporter};
pub use schedule::DailyTriggers;
pub use signal::{classify, SignalQuality};
pub use subsystems::{
    Clock, Connectivity, ConnectivityEvent, DailyJob, DailyScheduler, DevicePaths, ScheduledJob,
    Sensor, SensorEvent, Sms, Subsystems, SystemActions, SystemClock,
};
pub use window::{SchedulingWindow, SharedWindow};
