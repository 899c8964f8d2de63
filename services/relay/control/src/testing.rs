//! Recording doubles for the subsystems, and an in-memory server end.

use crate::reporter::{ReplyEncoding, Replier};
use crate::subsystems::{
    Clock, Connectivity, ConnectivityEvent, DailyJob, DailyScheduler, DevicePaths, ScheduledJob,
    Sensor, SensorEvent, SystemActions,
};
use async_trait::async_trait;
use relay_session::{Dialer, SessionConfig, SessionHandle, SessionManager};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{
    split, AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines, ReadHalf, WriteHalf,
};
use tokio::sync::{broadcast, mpsc};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Initialize { modem: String, sms: String, pin: String },
    Open3g,
    OpenTunnel(String, String, String),
    CloseTunnel,
    AskNetworkType,
    Record(u32),
    Pause,
    Reboot,
    SetTime(String),
    Kill(String),
}

pub struct FakeConnectivity {
    state: Mutex<String>,
    network_type: Mutex<Option<i32>>,
    calls: Mutex<Vec<Call>>,
    events: broadcast::Sender<ConnectivityEvent>,
}

impl FakeConnectivity {
    pub fn new(state: &str) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            state: Mutex::new(state.to_string()),
            network_type: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
            events,
        }
    }

    pub fn set_state(&self, state: &str) {
        *self.state.lock().unwrap() = state.to_string();
    }

    pub fn set_network_type(&self, network_type: Option<i32>) {
        *self.network_type.lock().unwrap() = network_type;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn emit(&self, event: ConnectivityEvent) {
        self.events.send(event).unwrap();
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

impl Connectivity for FakeConnectivity {
    fn initialize(&self, devices: &DevicePaths, pin: &str) {
        self.record(Call::Initialize {
            modem: devices.modem.clone(),
            sms: devices.sms.clone(),
            pin: pin.to_string(),
        });
    }

    fn open_3g(&self) {
        self.record(Call::Open3g);
    }

    fn open_tunnel(&self, host: &str, port: &str, remote_port: &str) {
        self.record(Call::OpenTunnel(
            host.to_string(),
            port.to_string(),
            remote_port.to_string(),
        ));
    }

    fn close_tunnel(&self) {
        self.record(Call::CloseTunnel);
    }

    fn ask_network_type(&self) {
        self.record(Call::AskNetworkType);
    }

    fn network_type(&self) -> Option<i32> {
        *self.network_type.lock().unwrap()
    }

    fn state(&self) -> String {
        self.state.lock().unwrap().clone()
    }

    fn subscribe(&self) -> broadcast::Receiver<ConnectivityEvent> {
        self.events.subscribe()
    }
}

pub struct FakeSensor {
    state: Mutex<String>,
    calls: Mutex<Vec<Call>>,
    events: broadcast::Sender<SensorEvent>,
}

impl FakeSensor {
    pub fn new(state: &str) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            state: Mutex::new(state.to_string()),
            calls: Mutex::new(Vec::new()),
            events,
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn emit(&self, event: SensorEvent) {
        self.events.send(event).unwrap();
    }
}

impl Sensor for FakeSensor {
    fn record(&self, period_secs: u32) {
        self.calls.lock().unwrap().push(Call::Record(period_secs));
    }

    fn pause(&self) {
        self.calls.lock().unwrap().push(Call::Pause);
    }

    fn state(&self) -> String {
        self.state.lock().unwrap().clone()
    }

    fn subscribe(&self) -> broadcast::Receiver<SensorEvent> {
        self.events.subscribe()
    }
}

#[derive(Default)]
pub struct FakeSystem {
    calls: Mutex<Vec<Call>>,
}

impl FakeSystem {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

impl SystemActions for FakeSystem {
    fn reboot(&self) {
        self.calls.lock().unwrap().push(Call::Reboot);
    }

    fn set_time(&self, value: &str) {
        self.calls.lock().unwrap().push(Call::SetTime(value.to_string()));
    }

    fn kill_process(&self, name: &str) {
        self.calls.lock().unwrap().push(Call::Kill(name.to_string()));
    }
}

struct FakeJob {
    hour: u8,
    job: DailyJob,
    cancelled: Arc<AtomicBool>,
}

struct FakeJobHandle(Arc<AtomicBool>);

impl ScheduledJob for FakeJobHandle {
    fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct FakeScheduler {
    jobs: Mutex<Vec<FakeJob>>,
}

impl FakeScheduler {
    /// Hours of the jobs that have not been cancelled
    pub fn active_hours(&self) -> Vec<u8> {
        self.jobs
            .lock()
            .unwrap()
            .iter()
            .filter(|job| !job.cancelled.load(Ordering::SeqCst))
            .map(|job| job.hour)
            .collect()
    }

    /// Run every live job scheduled at `hour`
    pub fn fire(&self, hour: u8) {
        let jobs: Vec<DailyJob> = self
            .jobs
            .lock()
            .unwrap()
            .iter()
            .filter(|job| job.hour == hour && !job.cancelled.load(Ordering::SeqCst))
            .map(|job| job.job.clone())
            .collect();
        for job in jobs {
            job();
        }
    }
}

impl DailyScheduler for FakeScheduler {
    fn schedule_daily(&self, hour: u8, job: DailyJob) -> Box<dyn ScheduledJob> {
        let cancelled = Arc::new(AtomicBool::new(false));
        self.jobs.lock().unwrap().push(FakeJob {
            hour,
            job,
            cancelled: cancelled.clone(),
        });
        Box::new(FakeJobHandle(cancelled))
    }
}

pub struct FixedClock(AtomicU32);

impl FixedClock {
    pub fn new(hour: u32) -> Self {
        Self(AtomicU32::new(hour))
    }
}

impl Clock for FixedClock {
    fn current_hour(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct RecordingReplier {
    replies: Mutex<Vec<(String, ReplyEncoding)>>,
}

impl RecordingReplier {
    pub fn replies(&self) -> Vec<(String, ReplyEncoding)> {
        self.replies.lock().unwrap().clone()
    }
}

#[async_trait]
impl Replier for RecordingReplier {
    async fn reply(&self, message: &str, encoding: ReplyEncoding) {
        self.replies
            .lock()
            .unwrap()
            .push((message.to_string(), encoding));
    }
}

/// Dialer handing out one in-memory stream, then never connecting again
pub struct OnceDialer {
    stream: Mutex<Option<DuplexStream>>,
}

#[async_trait]
impl Dialer for OnceDialer {
    type Stream = DuplexStream;

    fn target(&self) -> String {
        "memory".to_string()
    }

    async fn dial(&self) -> std::io::Result<DuplexStream> {
        let stream = self.stream.lock().unwrap().take();
        match stream {
            Some(stream) => Ok(stream),
            None => std::future::pending().await,
        }
    }
}

pub fn duplex_dialer() -> (OnceDialer, ServerEnd) {
    let (client, server) = tokio::io::duplex(64 * 1024);
    let dialer = OnceDialer {
        stream: Mutex::new(Some(client)),
    };
    (dialer, ServerEnd::new(server))
}

/// Server side of an in-memory connection
pub struct ServerEnd {
    lines: Lines<BufReader<ReadHalf<DuplexStream>>>,
    writer: WriteHalf<DuplexStream>,
}

impl ServerEnd {
    fn new(stream: DuplexStream) -> Self {
        let (reader, writer) = split(stream);
        Self {
            lines: BufReader::new(reader).lines(),
            writer,
        }
    }

    pub async fn next_line(&mut self) -> String {
        self.lines.next_line().await.unwrap().unwrap()
    }

    pub async fn send_line(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
    }
}

/// Spawn a session over an in-memory stream and consume its identification line
pub async fn connected_session(phone_number: &str) -> (SessionHandle, ServerEnd) {
    let (dialer, mut server) = duplex_dialer();
    let config = SessionConfig {
        phone_number: phone_number.to_string(),
        ..SessionConfig::default()
    };
    let (event_tx, _event_rx) = mpsc::channel(16);
    let (manager, handle) = SessionManager::new(config, dialer, event_tx);
    tokio::spawn(manager.run());

    assert_eq!(server.next_line().await, format!("phoneNumber={}", phone_number));
    (handle, server)
}
