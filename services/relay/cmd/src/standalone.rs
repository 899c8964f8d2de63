//! Standalone connectivity and sensor adapters.
//!
//! These stand in for the modem driver and the sensor acquisition subsystem
//! when the relay runs on a host whose network link is already up. The
//! connectivity adapter walks the usual state machine immediately and opens
//! reverse tunnels with `ssh`. The sensor adapter tracks recording state but
//! produces no measurements.

use relay_control::subsystems::{
    STATE_CONNECTED, STATE_INITIALIZED, STATE_TUNNELLING, STATE_UNINITIALIZED,
};
use relay_control::{Connectivity, ConnectivityEvent, DevicePaths, Sensor, SensorEvent};
use std::sync::Mutex;
use tokio::process::{Child, Command};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

const EVENT_CAPACITY: usize = 64;

/// Sensor state while recording
pub const SENSOR_RECORDING: &str = "recording";
/// Sensor state while paused
pub const SENSOR_PAUSED: &str = "paused";

/// Connectivity over an already available host network
pub struct StandaloneConnectivity {
    state: Mutex<String>,
    network_type: Option<i32>,
    tunnel: Mutex<Option<Child>>,
    events: broadcast::Sender<ConnectivityEvent>,
}

impl StandaloneConnectivity {
    /// Create a link that reports `network_type` on every poll
    pub fn new(network_type: Option<i32>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: Mutex::new(STATE_UNINITIALIZED.to_string()),
            network_type,
            tunnel: Mutex::new(None),
            events,
        }
    }

    fn transition(&self, to: &str) {
        let from = {
            let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
            std::mem::replace(&mut *state, to.to_string())
        };
        debug!(component = "3g", "{} => {}", from, to);
        self.emit(ConnectivityEvent::Transition {
            from,
            to: to.to_string(),
        });
    }

    fn emit(&self, event: ConnectivityEvent) {
        // No subscriber yet is fine
        self.events.send(event).ok();
    }

    fn tunnel_command(host: &str, port: &str, remote_port: &str) -> Command {
        let mut command = Command::new("ssh");
        command
            .arg("-N")
            .args(["-o", "ExitOnForwardFailure=yes"])
            .arg("-R")
            .arg(format!("{}:localhost:22", remote_port))
            .args(["-p", port])
            .arg(host)
            .kill_on_drop(true);
        command
    }
}

impl Connectivity for StandaloneConnectivity {
    fn initialize(&self, devices: &DevicePaths, _pin: &str) {
        info!(
            component = "3g",
            "Standalone link, ignoring modem {} and SMS port {}", devices.modem, devices.sms
        );
        self.transition(STATE_INITIALIZED);
    }

    fn open_3g(&self) {
        self.transition(STATE_CONNECTED);
    }

    fn open_tunnel(&self, host: &str, port: &str, remote_port: &str) {
        info!(component = "3g", "Opening tunnel to {}:{} on remote port {}", host, port, remote_port);
        match Self::tunnel_command(host, port, remote_port).spawn() {
            Ok(child) => {
                let previous = self
                    .tunnel
                    .lock()
                    .unwrap_or_else(|p| p.into_inner())
                    .replace(child);
                if let Some(mut previous) = previous {
                    previous.start_kill().ok();
                }
                self.transition(STATE_TUNNELLING);
            }
            Err(e) => {
                warn!(component = "3g", "Failed to start ssh: {}", e);
                self.emit(ConnectivityEvent::TunnelError);
            }
        }
    }

    fn close_tunnel(&self) {
        let child = self.tunnel.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(mut child) = child {
            child.start_kill().ok();
        }
        if self.state() == STATE_TUNNELLING {
            self.transition(STATE_CONNECTED);
        }
    }

    fn ask_network_type(&self) {
        debug!(component = "3g", "Network type is fixed at {:?}", self.network_type);
    }

    fn network_type(&self) -> Option<i32> {
        self.network_type
    }

    fn state(&self) -> String {
        self.state.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    fn subscribe(&self) -> broadcast::Receiver<ConnectivityEvent> {
        self.events.subscribe()
    }
}

/// Sensor that only tracks whether it is recording
pub struct IdleSensor {
    state: Mutex<&'static str>,
    events: broadcast::Sender<SensorEvent>,
}

impl IdleSensor {
    /// Create a sensor with no measurements and measuring switched off
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: Mutex::new(SENSOR_PAUSED),
            events,
        }
    }

    fn transition(&self, to: &'static str) {
        let from = {
            let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
            std::mem::replace(&mut *state, to)
        };
        if from != to {
            self.events
                .send(SensorEvent::Transition {
                    from: from.to_string(),
                    to: to.to_string(),
                })
                .ok();
        }
    }
}

impl Default for IdleSensor {
    fn default() -> Self {
        Self::new()
    }
}

impl Sensor for IdleSensor {
    fn record(&self, period_secs: u32) {
        info!(component = "sensor", "Recording every {}s", period_secs);
        self.transition(SENSOR_RECORDING);
    }

    fn pause(&self) {
        info!(component = "sensor", "Recording paused");
        self.transition(SENSOR_PAUSED);
    }

    fn state(&self) -> String {
        self.state.lock().unwrap_or_else(|p| p.into_inner()).to_string()
    }

    fn subscribe(&self) -> broadcast::Receiver<SensorEvent> {
        self.events.subscribe()
    }
}
