//! Configuration handling for the relay.
//!
//! Settings are read from a YAML file, then selected values can be overridden
//! from the environment. A missing or unparsable file is not fatal: the relay
//! starts on defaults and says so.

use anyhow::{ensure, Context, Result};
use relay_control::{DevicePaths, RelaySettings, SchedulingWindow};
use relay_session::SessionConfig;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Relay configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RelayConfig {
    /// Modem data port
    pub modem_device: String,
    /// Modem SMS port
    pub sms_device: String,
    /// SIM PIN
    pub pin: String,
    /// Control server host
    pub server_host: String,
    /// Control server port
    pub server_port: u16,
    /// Phone number sent in the identification line
    pub phone_number: String,
    /// Measurement period (seconds)
    pub measure_period: u32,
    /// Hour recording starts
    pub wakeup_hour: u8,
    /// Hour recording stops
    pub sleep_hour: u8,
    /// Numbers allowed to send SMS commands
    pub authorized_numbers: Vec<String>,
    /// Delay before redialling the server
    pub reconnect_delay: Duration,
    /// Upper bound on one dial
    pub dial_timeout: Duration,
    /// Delivery queue flush interval
    pub flush_interval: Duration,
    /// Signal poll interval
    pub poll_interval: Duration,
    /// Sensor settle time when restarting measurements
    pub restart_delay: Duration,
    /// Network type reported by the standalone connectivity adapter
    pub network_type: Option<i32>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            modem_device: "/dev/ttyUSB0".to_string(),
            sms_device: "/dev/ttyUSB2".to_string(),
            pin: String::new(),
            server_host: "localhost".to_string(),
            server_port: 5000,
            phone_number: String::new(),
            measure_period: 10,
            wakeup_hour: 7,
            sleep_hour: 16,
            authorized_numbers: Vec::new(),
            reconnect_delay: Duration::from_secs(10),
            dial_timeout: Duration::from_secs(30),
            flush_interval: Duration::from_secs(60),
            poll_interval: Duration::from_secs(5),
            restart_delay: Duration::from_secs(3),
            network_type: None,
        }
    }
}

/// File layout of `relay.yaml`
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    devices: Option<DevicesSection>,
    pin: Option<String>,
    server: Option<ServerSection>,
    measure_period: Option<u32>,
    wakeup_hour: Option<u8>,
    sleep_hour: Option<u8>,
    authorized_numbers: Option<Vec<String>>,
    reconnect_delay: Option<String>,
    dial_timeout: Option<String>,
    flush_interval: Option<String>,
    poll_interval: Option<String>,
    restart_delay: Option<String>,
    network_type: Option<i32>,
}

#[derive(Debug, Default, Deserialize)]
struct DevicesSection {
    modem: Option<String>,
    sms: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerSection {
    host: Option<String>,
    port: Option<u16>,
    phone_number: Option<String>,
}

impl RelayConfig {
    /// Load configuration from file and environment variables
    pub fn load_from_file<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let path = config_path.as_ref();
        let mut config = Self::default();

        match std::fs::read_to_string(path) {
            Ok(content) => match serde_yaml::from_str::<FileConfig>(&content) {
                Ok(file) => {
                    config.apply_file(file);
                    info!("Loaded configuration from {:?}", path);
                }
                Err(e) => warn!("Failed to parse config file {:?} ({}), using defaults", path, e),
            },
            Err(_) => warn!("Config file {:?} not found, using defaults", path),
        }

        config.apply_environment_overrides(|key| std::env::var(key).ok());
        config.validate()?;

        info!(
            "Relay configuration: server={}, phone={}, period={}s, window={:02}h-{:02}h",
            config.server_addr(),
            config.phone_number,
            config.measure_period,
            config.wakeup_hour,
            config.sleep_hour
        );
        Ok(config)
    }

    fn apply_file(&mut self, file: FileConfig) {
        if let Some(devices) = file.devices {
            if let Some(modem) = devices.modem {
                self.modem_device = modem;
            }
            if let Some(sms) = devices.sms {
                self.sms_device = sms;
            }
        }
        if let Some(server) = file.server {
            if let Some(host) = server.host {
                self.server_host = host;
            }
            if let Some(port) = server.port {
                self.server_port = port;
            }
            if let Some(phone_number) = server.phone_number {
                self.phone_number = phone_number;
            }
        }
        if let Some(pin) = file.pin {
            self.pin = pin;
        }
        if let Some(period) = file.measure_period {
            self.measure_period = period;
        }
        if let Some(hour) = file.wakeup_hour {
            self.wakeup_hour = hour;
        }
        if let Some(hour) = file.sleep_hour {
            self.sleep_hour = hour;
        }
        if let Some(numbers) = file.authorized_numbers {
            self.authorized_numbers = numbers;
        }
        if file.network_type.is_some() {
            self.network_type = file.network_type;
        }

        let durations = [
            ("reconnect_delay", file.reconnect_delay, &mut self.reconnect_delay),
            ("dial_timeout", file.dial_timeout, &mut self.dial_timeout),
            ("flush_interval", file.flush_interval, &mut self.flush_interval),
            ("poll_interval", file.poll_interval, &mut self.poll_interval),
            ("restart_delay", file.restart_delay, &mut self.restart_delay),
        ];
        for (key, value, slot) in durations {
            let Some(value) = value else { continue };
            match humantime::parse_duration(&value) {
                Ok(duration) => *slot = duration,
                Err(e) => warn!("Ignoring {}={:?}: {}", key, value, e),
            }
        }
    }

    /// Apply environment variable overrides, looking values up with `lookup`
    fn apply_environment_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("RELAY_SERVER_HOST") {
            info!("Server host overridden by environment: {}", host);
            self.server_host = host;
        }

        if let Some(port) = lookup("RELAY_SERVER_PORT") {
            match port.parse::<u16>() {
                Ok(port) => {
                    self.server_port = port;
                    info!("Server port overridden by environment: {}", port);
                }
                Err(_) => warn!("Ignoring invalid RELAY_SERVER_PORT {:?}", port),
            }
        }

        if let Some(phone_number) = lookup("RELAY_PHONE_NUMBER") {
            info!("Phone number overridden by environment: {}", phone_number);
            self.phone_number = phone_number;
        }

        if let Some(pin) = lookup("RELAY_PIN") {
            info!("SIM PIN overridden by environment");
            self.pin = pin;
        }

        if let Some(period) = lookup("RELAY_MEASURE_PERIOD") {
            match period.parse::<u32>() {
                Ok(period) => {
                    self.measure_period = period;
                    info!("Measure period overridden by environment: {}", period);
                }
                Err(_) => warn!("Ignoring invalid RELAY_MEASURE_PERIOD {:?}", period),
            }
        }
    }

    /// Replace the server endpoint with a `host:port` string
    pub fn set_server(&mut self, endpoint: &str) -> Result<()> {
        let (host, port) = endpoint
            .rsplit_once(':')
            .with_context(|| format!("server endpoint {:?} is not host:port", endpoint))?;
        self.server_port = port
            .parse()
            .with_context(|| format!("invalid port in server endpoint {:?}", endpoint))?;
        self.server_host = host.to_string();
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        ensure!(self.wakeup_hour <= 23, "wakeup_hour {} is not an hour of day", self.wakeup_hour);
        ensure!(self.sleep_hour <= 23, "sleep_hour {} is not an hour of day", self.sleep_hour);
        ensure!(!self.server_host.is_empty(), "server host is empty");
        for (key, value) in [
            ("dial_timeout", self.dial_timeout),
            ("flush_interval", self.flush_interval),
            ("poll_interval", self.poll_interval),
        ] {
            ensure!(!value.is_zero(), "{} must be greater than zero", key);
        }
        Ok(())
    }

    /// `host:port` of the control server
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    /// Session settings derived from this configuration
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            phone_number: self.phone_number.clone(),
            reconnect_delay: self.reconnect_delay,
            dial_timeout: self.dial_timeout,
            flush_interval: self.flush_interval,
        }
    }

    /// Control layer settings derived from this configuration
    pub fn relay_settings(&self) -> RelaySettings {
        RelaySettings {
            devices: DevicePaths {
                modem: self.modem_device.clone(),
                sms: self.sms_device.clone(),
            },
            pin: self.pin.clone(),
            authorized_numbers: self.authorized_numbers.clone(),
            window: SchedulingWindow {
                period_secs: self.measure_period,
                wake_hour: self.wakeup_hour,
                sleep_hour: self.sleep_hour,
            },
            poll_interval: self.poll_interval,
            restart_delay: self.restart_delay,
        }
    }
}
