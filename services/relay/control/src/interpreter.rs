//! Command interpreter.
//!
//! Commands reach the interpreter from two channels, inbound server lines and
//! SMS from authorised numbers, and are dispatched identically. Commands that
//! change how measurements are taken go through the restart sequence before
//! replying: pause the sensor, wait for it to settle, resume recording if the
//! current hour is inside the recording window, then reply.

use crate::command::{normalize_timestamp, parse_hour, parse_period, Command};
use crate::reporter::{ReplyEncoding, Replier};
use crate::schedule::DailyTriggers;
use crate::subsystems::{Clock, Connectivity, Sensor, Subsystems, SystemActions};
use crate::window::SharedWindow;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Result of dispatching a command
#[derive(Debug)]
pub enum Outcome {
    /// Executed, any reply already sent
    Completed,
    /// Executed, reply sent once the restart sequence finishes
    Restarting(JoinHandle<()>),
    /// Arguments failed validation, nothing changed
    Rejected,
    /// Unknown name or arity
    Ignored,
}

/// Executes commands against the subsystems
#[derive(Clone)]
pub struct CommandInterpreter {
    connectivity: Arc<dyn Connectivity>,
    sensor: Arc<dyn Sensor>,
    system: Arc<dyn SystemActions>,
    clock: Arc<dyn Clock>,
    window: SharedWindow,
    triggers: Arc<DailyTriggers>,
    restart_delay: Duration,
}

impl CommandInterpreter {
    /// Create an interpreter
    pub fn new(
        subsystems: &Subsystems,
        window: SharedWindow,
        triggers: Arc<DailyTriggers>,
        restart_delay: Duration,
    ) -> Self {
        Self {
            connectivity: subsystems.connectivity.clone(),
            sensor: subsystems.sensor.clone(),
            system: subsystems.system.clone(),
            clock: subsystems.clock.clone(),
            window,
            triggers,
            restart_delay,
        }
    }

    /// Dispatch a command given its lower-cased arguments
    pub async fn dispatch(&self, args: &[String], replier: Arc<dyn Replier>) -> Outcome {
        let Some(command) = Command::parse(args) else {
            info!("Ignoring unrecognized command {:?}", args);
            return Outcome::Ignored;
        };
        debug!("Executing {:?}", command);

        match command {
            Command::Status => {
                replier.reply("status:OK", ReplyEncoding::Generic).await;
                Outcome::Completed
            }
            Command::Reboot => {
                info!("Reboot requested");
                self.system.reboot();
                Outcome::Completed
            }
            Command::ResumeRecord => {
                self.sensor.record(self.window.get().period_secs);
                replier.reply("resumerecord:OK", ReplyEncoding::Generic).await;
                Outcome::Completed
            }
            Command::PauseRecord => {
                self.sensor.pause();
                replier.reply("pauserecord:OK", ReplyEncoding::Generic).await;
                Outcome::Completed
            }
            Command::CloseTunnel => {
                self.connectivity.close_tunnel();
                replier.reply("closetunnel:OK", ReplyEncoding::Generic).await;
                Outcome::Completed
            }
            Command::OpenTunnel { host, port, remote_port } => {
                // Reply comes from the tunnelling transition or the tunnel error
                self.connectivity.open_tunnel(&host, &port, &remote_port);
                Outcome::Completed
            }
            Command::ChangePeriod(arg) => match parse_period(&arg) {
                Some(period) => {
                    self.window.update(|w| w.period_secs = period);
                    self.restart(format!("changeperiod:{}", arg), replier)
                }
                None => self.reject("changeperiod", &arg, replier).await,
            },
            Command::ChangeStartTime(arg) => match parse_hour(&arg) {
                Some(hour) => {
                    self.window.update(|w| w.wake_hour = hour);
                    self.triggers.reschedule_wake();
                    self.restart(format!("changestarttime:{}", arg), replier)
                }
                None => self.reject("changestarttime", &arg, replier).await,
            },
            Command::ChangeStopTime(arg) => match parse_hour(&arg) {
                Some(hour) => {
                    self.window.update(|w| w.sleep_hour = hour);
                    self.triggers.reschedule_sleep();
                    self.restart(format!("changestoptime:{}", arg), replier)
                }
                None => self.reject("changestoptime", &arg, replier).await,
            },
            Command::Date(timestamp) => {
                self.system.set_time(&normalize_timestamp(&timestamp));
                self.restart(format!("date:{}", timestamp), replier)
            }
            Command::Init { period, wake, sleep, timestamp } => {
                let (Some(period), Some(wake), Some(sleep)) =
                    (parse_period(&period), parse_hour(&wake), parse_hour(&sleep))
                else {
                    warn!(
                        "Rejecting init with period {:?}, wake {:?}, sleep {:?}",
                        period, wake, sleep
                    );
                    return Outcome::Rejected;
                };

                self.system.set_time(&normalize_timestamp(&timestamp));
                let window = self.window.update(|w| {
                    w.period_secs = period;
                    w.wake_hour = wake;
                    w.sleep_hour = sleep;
                });
                info!("Initialized with {:?}", window);
                self.triggers.start();
                self.restart("init:OK".to_string(), replier)
            }
        }
    }

    async fn reject(&self, name: &str, arg: &str, replier: Arc<dyn Replier>) -> Outcome {
        warn!("Invalid argument for {}: {:?}", name, arg);
        replier
            .reply(&format!("{}:KO", name), ReplyEncoding::Generic)
            .await;
        Outcome::Rejected
    }

    /// Pause, wait, resume inside the window, then send `reply`
    fn restart(&self, reply: String, replier: Arc<dyn Replier>) -> Outcome {
        let sensor = self.sensor.clone();
        let clock = self.clock.clone();
        let window = self.window.clone();
        let delay = self.restart_delay;

        sensor.pause();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            let window = window.get();
            let hour = clock.current_hour();
            if window.is_active(hour) {
                sensor.record(window.period_secs);
            } else {
                debug!("Hour {} outside {:?}, staying paused", hour, window);
            }

            replier.reply(&reply, ReplyEncoding::Generic).await;
        });

        Outcome::Restarting(handle)
    }
}
