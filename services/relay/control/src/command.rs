//! Typed command parsing and argument validation.
//!
//! Commands arrive as the lower-cased, space-separated arguments that follow
//! the `cmd:` prefix. A command is identified by its argument count together
//! with its name; a known name with the wrong arity is not a command.

/// A recognised command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `status`
    Status,
    /// `reboot`
    Reboot,
    /// `resumerecord`
    ResumeRecord,
    /// `pauserecord`
    PauseRecord,
    /// `closetunnel`
    CloseTunnel,
    /// `changeperiod <p>`, argument not yet validated
    ChangePeriod(String),
    /// `changestarttime <h>`, argument not yet validated
    ChangeStartTime(String),
    /// `changestoptime <h>`, argument not yet validated
    ChangeStopTime(String),
    /// `date <timestamp>`
    Date(String),
    /// `opentunnel <host> <port> <remote_port>`
    OpenTunnel {
        /// SSH host
        host: String,
        /// SSH port
        port: String,
        /// Port exposed on the remote side
        remote_port: String,
    },
    /// `init <period> <wake> <sleep> <timestamp>`, arguments not yet validated
    Init {
        /// Measurement period
        period: String,
        /// Wake hour
        wake: String,
        /// Sleep hour
        sleep: String,
        /// Timestamp for the system clock
        timestamp: String,
    },
}

impl Command {
    /// Parse command arguments. Returns `None` for unknown names or arities.
    pub fn parse(args: &[String]) -> Option<Self> {
        let command = match args {
            [name] => match name.as_str() {
                "status" => Command::Status,
                "reboot" => Command::Reboot,
                "resumerecord" => Command::ResumeRecord,
                "pauserecord" => Command::PauseRecord,
                "closetunnel" => Command::CloseTunnel,
                _ => return None,
            },
            [name, arg] => match name.as_str() {
                "changeperiod" => Command::ChangePeriod(arg.clone()),
                "changestarttime" => Command::ChangeStartTime(arg.clone()),
                "changestoptime" => Command::ChangeStopTime(arg.clone()),
                "date" => Command::Date(arg.clone()),
                _ => return None,
            },
            [name, host, port, remote_port] if name == "opentunnel" => Command::OpenTunnel {
                host: host.clone(),
                port: port.clone(),
                remote_port: remote_port.clone(),
            },
            [name, period, wake, sleep, timestamp] if name == "init" => Command::Init {
                period: period.clone(),
                wake: wake.clone(),
                sleep: sleep.clone(),
                timestamp: timestamp.clone(),
            },
            _ => return None,
        };
        Some(command)
    }

    /// Command name as received
    pub fn name(&self) -> &'static str {
        match self {
            Command::Status => "status",
            Command::Reboot => "reboot",
            Command::ResumeRecord => "resumerecord",
            Command::PauseRecord => "pauserecord",
            Command::CloseTunnel => "closetunnel",
            Command::ChangePeriod(_) => "changeperiod",
            Command::ChangeStartTime(_) => "changestarttime",
            Command::ChangeStopTime(_) => "changestoptime",
            Command::Date(_) => "date",
            Command::OpenTunnel { .. } => "opentunnel",
            Command::Init { .. } => "init",
        }
    }
}

fn all_digits(value: &str, max_len: usize) -> bool {
    (1..=max_len).contains(&value.len()) && value.bytes().all(|b| b.is_ascii_digit())
}

/// Parse a measurement period: 1 to 5 ASCII digits
pub fn parse_period(value: &str) -> Option<u32> {
    if !all_digits(value, 5) {
        return None;
    }
    value.parse().ok()
}

/// Parse an hour of day: 1 or 2 ASCII digits, at most 23
pub fn parse_hour(value: &str) -> Option<u8> {
    if !all_digits(value, 2) {
        return None;
    }
    value.parse().ok().filter(|hour| *hour <= 23)
}

/// Normalise an ISO-like timestamp for `timedatectl set-time`.
///
/// The first `t` becomes a space and everything from the first `.` is cut,
/// so `2016-03-14t10:22:33.123z` becomes `2016-03-14 10:22:33`.
pub fn normalize_timestamp(value: &str) -> String {
    let replaced = value.replacen('t', " ", 1);
    match replaced.split_once('.') {
        Some((head, _)) => head.to_string(),
        None => replaced,
    }
}
