//! Operating system actions run as child processes.

use relay_control::SystemActions;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

/// A program invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemCommand {
    program: &'static str,
    args: Vec<String>,
}

impl SystemCommand {
    /// `reboot`
    pub fn reboot() -> Self {
        Self { program: "reboot", args: Vec::new() }
    }

    /// `timedatectl set-time <value>`
    pub fn set_time(value: &str) -> Self {
        Self {
            program: "timedatectl",
            args: vec!["set-time".to_string(), value.to_string()],
        }
    }

    /// `killall <name>`
    pub fn kill_all(name: &str) -> Self {
        Self {
            program: "killall",
            args: vec![name.to_string()],
        }
    }

    /// Start detached with output discarded. Only a failure to start is logged.
    pub fn spawn(self) {
        let child = Command::new(self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();

        match child {
            Ok(mut child) => {
                debug!(component = "system", "Started {} {:?}", self.program, self.args);
                // Reap the child so it does not linger as a zombie
                tokio::spawn(async move {
                    child.wait().await.ok();
                });
            }
            Err(e) => {
                warn!(component = "system", "Failed to run {}: {}", self.program, e);
            }
        }
    }
}

/// [`SystemActions`] backed by the host's commands
#[derive(Debug, Clone, Copy, Default)]
pub struct OsActions;

impl SystemActions for OsActions {
    fn reboot(&self) {
        SystemCommand::reboot().spawn();
    }

    fn set_time(&self, value: &str) {
        SystemCommand::set_time(value).spawn();
    }

    fn kill_process(&self, name: &str) {
        SystemCommand::kill_all(name).spawn();
    }
}
