//! Relay event loop.
//!
//! [`Relay`] is the composition root of the control layer. It runs the startup
//! sequence, owns the session and the signal poller once the data link is up,
//! and routes every subsystem event to the right handler.

use crate::error::ControlError;
use crate::interpreter::CommandInterpreter;
use crate::poller::StatePoller;
use crate::reporter::{Encoders, ReplyEncoding, Replier, Reporter};
use crate::schedule::DailyTriggers;
use crate::subsystems::{
    ConnectivityEvent, DevicePaths, SensorEvent, Sms, Subsystems, STATE_CONNECTED,
    STATE_INITIALIZED, STATE_TUNNELLING, STATE_UNINITIALIZED,
};
use crate::window::{SchedulingWindow, SharedWindow};
use relay_session::{Dialer, SessionConfig, SessionEvent, SessionManager};
use relay_wire::command_args;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Name of the PPP daemon killed at startup
pub const PPP_PROCESS: &str = "pppd";

/// Device-side settings of the relay
#[derive(Debug, Clone)]
pub struct RelaySettings {
    /// Modem serial ports
    pub devices: DevicePaths,
    /// SIM PIN
    pub pin: String,
    /// Numbers allowed to send SMS commands
    pub authorized_numbers: Vec<String>,
    /// Initial measurement period and recording window
    pub window: SchedulingWindow,
    /// Signal poll interval
    pub poll_interval: Duration,
    /// Sensor settle time in the restart sequence
    pub restart_delay: Duration,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            devices: DevicePaths::default(),
            pin: String::new(),
            authorized_numbers: Vec::new(),
            window: SchedulingWindow::default(),
            poll_interval: Duration::from_secs(5),
            restart_delay: Duration::from_secs(3),
        }
    }
}

/// The relay process
pub struct Relay<D: Dialer + 'static> {
    settings: RelaySettings,
    subsystems: Subsystems,
    triggers: Arc<DailyTriggers>,
    interpreter: CommandInterpreter,
    reporter: Arc<Reporter>,
    session: Option<SessionManager<D>>,
    session_events: mpsc::Receiver<SessionEvent>,
    poller: Option<StatePoller>,
    tasks: Vec<JoinHandle<()>>,
}

impl<D: Dialer + 'static> Relay<D> {
    /// Wire the relay. Nothing runs until [`Relay::run`].
    pub fn new(
        settings: RelaySettings,
        session_config: SessionConfig,
        dialer: D,
        subsystems: Subsystems,
        encoders: Encoders,
    ) -> Self {
        let (event_tx, session_events) = mpsc::channel(100);
        let (session, handle) = SessionManager::new(session_config, dialer, event_tx);

        let reporter = Arc::new(Reporter::new(
            handle,
            encoders,
            subsystems.connectivity.clone(),
            subsystems.sensor.clone(),
        ));

        let window = SharedWindow::new(settings.window);
        let triggers = Arc::new(DailyTriggers::new(
            subsystems.scheduler.clone(),
            subsystems.sensor.clone(),
            window.clone(),
        ));
        let interpreter = CommandInterpreter::new(
            &subsystems,
            window,
            triggers.clone(),
            settings.restart_delay,
        );
        let poller = StatePoller::new(
            subsystems.connectivity.clone(),
            reporter.clone(),
            settings.poll_interval,
        );

        Self {
            settings,
            subsystems,
            triggers,
            interpreter,
            reporter,
            session: Some(session),
            session_events,
            poller: Some(poller),
            tasks: Vec::new(),
        }
    }

    /// Run until a fatal subsystem error
    pub async fn run(mut self) -> Result<(), ControlError> {
        let mut connectivity_events = self.subsystems.connectivity.subscribe();
        let mut sensor_events = self.subsystems.sensor.subscribe();

        info!("Killing any running {}", PPP_PROCESS);
        self.subsystems.system.kill_process(PPP_PROCESS);
        self.subsystems
            .connectivity
            .initialize(&self.settings.devices, &self.settings.pin);
        self.triggers.start();

        loop {
            tokio::select! {
                event = connectivity_events.recv() => match event {
                    Ok(event) => self.on_connectivity(event).await?,
                    Err(RecvError::Lagged(n)) => warn!("Missed {} connectivity events", n),
                    Err(RecvError::Closed) => return Err(ControlError::SubsystemClosed("connectivity")),
                },

                event = sensor_events.recv() => match event {
                    Ok(event) => self.on_sensor(event).await,
                    Err(RecvError::Lagged(n)) => warn!("Missed {} sensor events", n),
                    Err(RecvError::Closed) => return Err(ControlError::SubsystemClosed("sensor")),
                },

                Some(event) = self.session_events.recv() => self.on_session(event).await,
            }
        }
    }

    async fn on_connectivity(&mut self, event: ConnectivityEvent) -> Result<(), ControlError> {
        match event {
            ConnectivityEvent::Transition { from, to } => {
                info!("3G transition {} => {}", from, to);
                match (from.as_str(), to.as_str()) {
                    (STATE_UNINITIALIZED, STATE_INITIALIZED) => {
                        self.subsystems.connectivity.open_3g();
                        self.subsystems.connectivity.ask_network_type();
                    }
                    (STATE_INITIALIZED, STATE_CONNECTED) => self.link_up(),
                    (STATE_CONNECTED, STATE_TUNNELLING) => {
                        self.reporter
                            .reply("opentunnel:OK", ReplyEncoding::Generic)
                            .await;
                    }
                    _ => {}
                }
            }
            ConnectivityEvent::LinkError => {
                error!("3G error, giving up");
                return Err(ControlError::ConnectivityLost);
            }
            ConnectivityEvent::TunnelError => {
                warn!("Tunnel could not be opened");
                self.reporter
                    .reply("opentunnel:KO", ReplyEncoding::Generic)
                    .await;
            }
            ConnectivityEvent::SmsReceived(sms) => self.on_sms(sms).await,
        }
        Ok(())
    }

    /// Start the session and the poller, once
    fn link_up(&mut self) {
        if let Some(session) = self.session.take() {
            self.tasks.push(tokio::spawn(async move {
                if let Err(e) = session.run().await {
                    error!("Session manager failed: {:#}", e);
                }
            }));
        }
        if let Some(poller) = self.poller.take() {
            self.tasks.push(tokio::spawn(poller.run()));
        }
    }

    async fn on_sms(&self, sms: Sms) {
        info!("SMS received from {}", sms.from);
        let Some(args) = command_args(&sms.body) else {
            debug!("SMS from {} is not a command", sms.from);
            return;
        };
        if !self.settings.authorized_numbers.iter().any(|n| *n == sms.from) {
            warn!("Ignoring command from unauthorized number {}", sms.from);
            return;
        }
        self.dispatch(&args).await;
    }

    async fn on_sensor(&self, event: SensorEvent) {
        match event {
            SensorEvent::Processed(measurement) => {
                debug!("Measurement processed for {}", measurement.date);
                self.reporter.send_measurements(&[measurement]).await;
            }
            SensorEvent::Transition { from, to } => {
                info!("Sensor transition {} => {}", from, to);
                self.reporter.reply("null:null", ReplyEncoding::Generic).await;
            }
        }
    }

    async fn on_session(&self, event: SessionEvent) {
        match event {
            SessionEvent::Connected { target } => info!("Server link up ({})", target),
            SessionEvent::Disconnected => debug!("Server link down"),
            SessionEvent::LineReceived { line } => match command_args(&line) {
                Some(args) => self.dispatch(&args).await,
                None => info!("Discarding non-command line {:?}", line),
            },
        }
    }

    async fn dispatch(&self, args: &[String]) {
        let replier: Arc<dyn Replier> = self.reporter.clone();
        let outcome = self.interpreter.dispatch(args, replier).await;
        debug!("Command {:?} => {:?}", args, outcome);
    }
}

impl<D: Dialer + 'static> Drop for Relay<D> {
    fn drop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}
