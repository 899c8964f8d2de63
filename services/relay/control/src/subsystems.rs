//! Interfaces of the subsystems the relay drives.
//!
//! The modem, the sensor, the operating system and the daily scheduler live
//! outside this crate. Each one is seen through a small trait: a set of
//! fire-and-forget command methods plus, for the event-emitting ones, a
//! `subscribe` method returning a broadcast receiver.

use chrono::Timelike;
use relay_wire::Measurement;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Connectivity state in which the 3G link is up
pub const STATE_CONNECTED: &str = "3G_connected";
/// Connectivity state while a reverse tunnel is open
pub const STATE_TUNNELLING: &str = "tunnelling";
/// Connectivity state after the modem answered its init sequence
pub const STATE_INITIALIZED: &str = "initialized";
/// Connectivity state before initialisation
pub const STATE_UNINITIALIZED: &str = "uninitialized";

/// Serial device paths of the modem
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DevicePaths {
    /// Data (PPP) port
    pub modem: String,
    /// SMS / AT command port
    pub sms: String,
}

/// Received SMS
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sms {
    /// Sender number
    pub from: String,
    /// Message body
    pub body: String,
}

/// Events emitted by the connectivity manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectivityEvent {
    /// State machine transition
    Transition {
        /// Previous state
        from: String,
        /// New state
        to: String,
    },
    /// 3G bring-up failed
    LinkError,
    /// Reverse tunnel could not be opened
    TunnelError,
    /// SMS received
    SmsReceived(Sms),
}

/// Modem / PPP / SMS manager
pub trait Connectivity: Send + Sync {
    /// Initialise the modem on the given ports
    fn initialize(&self, devices: &DevicePaths, pin: &str);
    /// Bring up the 3G data link
    fn open_3g(&self);
    /// Request a reverse tunnel to `host:port` exposing `remote_port`
    fn open_tunnel(&self, host: &str, port: &str, remote_port: &str);
    /// Close the reverse tunnel
    fn close_tunnel(&self);
    /// Ask the modem to refresh its network type
    fn ask_network_type(&self);
    /// Last network type reported by the modem
    fn network_type(&self) -> Option<i32>;
    /// Current state machine state
    fn state(&self) -> String;
    /// Subscribe to connectivity events
    fn subscribe(&self) -> broadcast::Receiver<ConnectivityEvent>;

    /// Whether the data link is up
    fn is_linked(&self) -> bool {
        matches!(self.state().as_str(), STATE_CONNECTED | STATE_TUNNELLING)
    }
}

/// Events emitted by the sensor subsystem
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SensorEvent {
    /// A measurement period completed
    Processed(Measurement),
    /// Sensor state machine transition
    Transition {
        /// Previous state
        from: String,
        /// New state
        to: String,
    },
}

/// Sensor acquisition subsystem
pub trait Sensor: Send + Sync {
    /// Start recording with the given period in seconds
    fn record(&self, period_secs: u32);
    /// Pause recording
    fn pause(&self);
    /// Current state machine state
    fn state(&self) -> String;
    /// Subscribe to sensor events
    fn subscribe(&self) -> broadcast::Receiver<SensorEvent>;
}

/// Operating system actions, all fire-and-forget
pub trait SystemActions: Send + Sync {
    /// Reboot the device
    fn reboot(&self);
    /// Set the system clock (`timedatectl set-time` format)
    fn set_time(&self, value: &str);
    /// Kill every process with the given name
    fn kill_process(&self, name: &str);
}

/// Callback run by a daily trigger
pub type DailyJob = Arc<dyn Fn() + Send + Sync>;

/// Handle to a scheduled daily trigger
pub trait ScheduledJob: Send + Sync {
    /// Stop the trigger from firing again
    fn cancel(&self);
}

/// Scheduler firing a callback once a day at minute 0 of an hour
pub trait DailyScheduler: Send + Sync {
    /// Schedule `job` at `hour:00` every day
    fn schedule_daily(&self, hour: u8, job: DailyJob) -> Box<dyn ScheduledJob>;
}

/// Wall clock
pub trait Clock: Send + Sync {
    /// Current local hour, 0-23
    fn current_hour(&self) -> u32;
}

/// Clock backed by the system local time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn current_hour(&self) -> u32 {
        chrono::Local::now().hour()
    }
}

/// Every external subsystem the relay drives
#[derive(Clone)]
pub struct Subsystems {
    /// Modem manager
    pub connectivity: Arc<dyn Connectivity>,
    /// Sensor subsystem
    pub sensor: Arc<dyn Sensor>,
    /// OS actions
    pub system: Arc<dyn SystemActions>,
    /// Daily trigger scheduler
    pub scheduler: Arc<dyn DailyScheduler>,
    /// Wall clock
    pub clock: Arc<dyn Clock>,
}
