//! Core session management for the relay.
//!
//! This module implements the [`SessionManager`] that owns the single outbound
//! connection: it dials, identifies the device, reads lines, writes outbound
//! messages, defers failed writes to the delivery queue and reconnects after a
//! fixed delay whenever the connection closes.

use bytes::BytesMut;
use relay_storage::DeliveryQueue;
use relay_wire::{encode_line, LineDecoder, OutboundMessage};
use std::fmt;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, WriteHalf};
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::error::SessionError;
use crate::handshake::send_identification;
use crate::transport::Dialer;

/// Configuration for the relay session
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Device phone number sent in the identification line
    pub phone_number: String,
    /// Delay between a close (or failed dial) and the next dial
    pub reconnect_delay: Duration,
    /// Upper bound on a single dial
    pub dial_timeout: Duration,
    /// Interval between delivery queue flushes
    pub flush_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            phone_number: String::new(),
            reconnect_delay: Duration::from_secs(10),
            dial_timeout: Duration::from_secs(30),
            flush_interval: Duration::from_secs(60),
        }
    }
}

/// Connection state of the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No connection, waiting for the next dial
    Disconnected,
    /// Dial in progress
    Connecting,
    /// Connection established and identified
    Connected,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Disconnected => write!(f, "disconnected"),
            SessionState::Connecting => write!(f, "connecting"),
            SessionState::Connected => write!(f, "connected"),
        }
    }
}

/// Events emitted by the session manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Connection established and identification sent
    Connected {
        /// Dialled endpoint
        target: String,
    },
    /// Connection closed or dial failed
    Disconnected,
    /// Complete inbound line, delimiter stripped
    LineReceived {
        /// Line content
        line: String,
    },
}

/// Statistics for the session manager
#[derive(Clone, Debug, Default)]
pub struct SessionStats {
    /// Successful dials
    pub connects: u64,
    /// Failed or timed out dials
    pub failed_dials: u64,
    /// Total bytes received
    pub bytes_in: u64,
    /// Total bytes sent
    pub bytes_out: u64,
    /// Complete lines received
    pub lines_received: u64,
    /// Lines written, identification included
    pub lines_sent: u64,
}

/// Cloneable handle used to send messages through the session
#[derive(Debug, Clone)]
pub struct SessionHandle {
    outbound_tx: mpsc::UnboundedSender<OutboundMessage>,
    state_rx: watch::Receiver<SessionState>,
}

impl SessionHandle {
    /// Queue a message for transmission.
    ///
    /// The message is written if a connection is up, otherwise it goes to the
    /// delivery queue and is retried by the next flush after reconnecting.
    pub fn send(&self, message: OutboundMessage) -> Result<(), SessionError> {
        self.outbound_tx
            .send(message)
            .map_err(|_| SessionError::Closed)
    }

    /// Current session state
    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }
}

/// Why a connected period ended
enum SessionExit {
    /// Connection lost, reconnect
    Closed,
    /// Every handle dropped, stop the manager
    Shutdown,
}

/// Owner of the single outbound connection
pub struct SessionManager<D: Dialer> {
    config: SessionConfig,
    dialer: D,
    outbound_rx: mpsc::UnboundedReceiver<OutboundMessage>,
    event_tx: mpsc::Sender<SessionEvent>,
    state_tx: watch::Sender<SessionState>,
    queue: DeliveryQueue,
    decoder: LineDecoder,
    stats: SessionStats,
}

impl<D: Dialer> SessionManager<D> {
    /// Create a session manager and the handle used to feed it
    pub fn new(
        config: SessionConfig,
        dialer: D,
        event_tx: mpsc::Sender<SessionEvent>,
    ) -> (Self, SessionHandle) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SessionState::Disconnected);

        let manager = Self {
            config,
            dialer,
            outbound_rx,
            event_tx,
            state_tx,
            queue: DeliveryQueue::new(),
            decoder: LineDecoder::new(),
            stats: SessionStats::default(),
        };

        (manager, SessionHandle { outbound_tx, state_rx })
    }

    /// Run the dial / serve / back off loop until every handle is dropped
    pub async fn run(mut self) -> anyhow::Result<()> {
        let target = self.dialer.target();
        info!("Starting session manager for {}", target);

        let first_flush = Instant::now() + self.config.flush_interval;
        let mut flush = tokio::time::interval_at(first_flush, self.config.flush_interval);
        flush.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            self.set_state(SessionState::Connecting);
            info!("Attempting to connect to {}", target);

            match self.dial(&target).await {
                Ok(stream) => {
                    self.stats.connects += 1;
                    let exit = self.serve(stream, &target, &mut flush).await;
                    info!(
                        "Session with {} ended. Stats: {:?}, queue: {:?}",
                        target,
                        self.stats,
                        self.queue.stats()
                    );

                    if let SessionExit::Shutdown = exit {
                        self.set_state(SessionState::Disconnected);
                        break;
                    }
                }
                Err(e) => {
                    self.stats.failed_dials += 1;
                    warn!("{}", e);
                }
            }

            self.set_state(SessionState::Disconnected);
            self.event_tx.send(SessionEvent::Disconnected).await.ok();

            if let SessionExit::Shutdown = self.back_off(&mut flush).await {
                break;
            }
        }

        if !self.queue.is_empty() {
            warn!("Session manager stopping with {} undelivered messages", self.queue.len());
        }
        info!("Session manager for {} stopped", target);
        Ok(())
    }

    async fn dial(&self, target: &str) -> Result<D::Stream, SessionError> {
        match tokio::time::timeout(self.config.dial_timeout, self.dialer.dial()).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(source)) => Err(SessionError::Connect {
                target: target.to_string(),
                source,
            }),
            Err(_) => Err(SessionError::DialTimeout {
                target: target.to_string(),
                timeout: self.config.dial_timeout,
            }),
        }
    }

    /// Serve one connection until it closes
    async fn serve(&mut self, stream: D::Stream, target: &str, flush: &mut Interval) -> SessionExit {
        let (mut reader, mut writer) = tokio::io::split(stream);

        match send_identification(&mut writer, &self.config.phone_number).await {
            Ok(n) => {
                self.stats.bytes_out += n as u64;
                self.stats.lines_sent += 1;
            }
            Err(e) => {
                error!("Failed to identify to {}: {}", target, e);
                return SessionExit::Closed;
            }
        }

        info!("Connected to the server at {}", target);
        self.set_state(SessionState::Connected);
        self.event_tx
            .send(SessionEvent::Connected { target: target.to_string() })
            .await
            .ok();

        let mut read_buffer = BytesMut::with_capacity(4 * 1024);

        loop {
            tokio::select! {
                // Inbound bytes
                read = reader.read_buf(&mut read_buffer) => {
                    match read {
                        Ok(0) => {
                            info!("Connection to {} closed by peer", target);
                            return SessionExit::Closed;
                        }
                        Ok(n) => {
                            self.stats.bytes_in += n as u64;
                            if let Err(e) = self.dispatch_lines(&mut read_buffer).await {
                                warn!("Dropping connection to {}: {}", target, e);
                                return SessionExit::Closed;
                            }
                        }
                        Err(e) => {
                            warn!("Read error from {}: {}", target, e);
                            return SessionExit::Closed;
                        }
                    }
                }

                // Live outbound messages
                message = self.outbound_rx.recv() => {
                    let Some(message) = message else {
                        info!("All session handles dropped, closing connection to {}", target);
                        writer.shutdown().await.ok();
                        return SessionExit::Shutdown;
                    };

                    if let Err(e) = self.write_message(&mut writer, &message).await {
                        warn!("Write to {} failed, deferring message: {}", target, e);
                        self.queue.enqueue(message);
                        return SessionExit::Closed;
                    }
                }

                // Retry deferred messages
                _ = flush.tick() => {
                    if let Err(e) = self.flush_queue(&mut writer).await {
                        warn!("Queue flush to {} interrupted: {}", target, e);
                        return SessionExit::Closed;
                    }
                }
            }
        }
    }

    /// Split complete lines off the buffer and emit them in arrival order
    async fn dispatch_lines(&mut self, buf: &mut BytesMut) -> Result<(), relay_wire::WireError> {
        while let Some(line) = self.decoder.decode(buf)? {
            self.stats.lines_received += 1;
            debug!("Data received: {}", line);
            self.event_tx.send(SessionEvent::LineReceived { line }).await.ok();
        }
        Ok(())
    }

    async fn write_message<S>(&mut self, writer: &mut WriteHalf<S>, message: &OutboundMessage) -> std::io::Result<()>
    where
        S: AsyncRead + AsyncWrite,
    {
        let bytes = encode_line(&message.to_line());
        writer.write_all(&bytes).await?;
        writer.flush().await?;

        self.stats.bytes_out += bytes.len() as u64;
        self.stats.lines_sent += 1;
        debug!("Sent {} byte line (tag {})", bytes.len(), message.tag());
        Ok(())
    }

    /// One bounded drain pass over the delivery queue
    async fn flush_queue<S>(&mut self, writer: &mut WriteHalf<S>) -> std::io::Result<()>
    where
        S: AsyncRead + AsyncWrite,
    {
        if self.queue.is_empty() {
            return Ok(());
        }

        debug!("Sending the content of the deferred messages, size: {}", self.queue.len());
        let mut pass = self.queue.begin_drain();

        while let Some(message) = pass.next() {
            if let Err(e) = self.write_message(writer, &message).await {
                self.queue.requeue(message);
                debug!("Flush interrupted, {} messages left in the pass", pass.remaining());
                pass.abandon(&mut self.queue);
                return Err(e);
            }
        }

        Ok(())
    }

    /// Wait out the reconnect delay, deferring anything sent meanwhile
    async fn back_off(&mut self, flush: &mut Interval) -> SessionExit {
        let deadline = Instant::now() + self.config.reconnect_delay;
        debug!("Reconnecting in {:?}", self.config.reconnect_delay);

        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => return SessionExit::Closed,

                message = self.outbound_rx.recv() => match message {
                    Some(message) => {
                        debug!("Session not connected, deferring message");
                        self.queue.enqueue(message);
                    }
                    None => return SessionExit::Shutdown,
                },

                _ = flush.tick() => {
                    if !self.queue.is_empty() {
                        debug!("Skipping queue flush while disconnected ({} queued)", self.queue.len());
                    }
                }
            }
        }
    }

    fn set_state(&self, state: SessionState) {
        self.state_tx.send_replace(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::io;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};
    use std::task::{Context, Poll};
    use tokio::io::{DuplexStream, ReadBuf};
    use tokio::time::timeout;

    /// Duplex stream whose writes can be made to fail on demand
    struct TestStream {
        inner: DuplexStream,
        fail_writes: Arc<AtomicBool>,
    }

    impl AsyncRead for TestStream {
        fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
            Pin::new(&mut self.get_mut().inner).poll_read(cx, buf)
        }
    }

    impl AsyncWrite for TestStream {
        fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
            let this = self.get_mut();
            if this.fail_writes.load(Ordering::SeqCst) {
                return Poll::Ready(Err(io::Error::from(io::ErrorKind::BrokenPipe)));
            }
            Pin::new(&mut this.inner).poll_write(cx, buf)
        }

        fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Pin::new(&mut self.get_mut().inner).poll_flush(cx)
        }

        fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
        }
    }

    /// Dialer handing out prepared streams, refusing once they run out
    #[derive(Clone, Default)]
    struct TestDialer {
        streams: Arc<Mutex<VecDeque<TestStream>>>,
        attempts: Arc<Mutex<Vec<Instant>>>,
    }

    impl TestDialer {
        /// Prepare a stream for the next dial, returning the server end
        fn accept_next(&self) -> (DuplexStream, Arc<AtomicBool>) {
            let (client, server) = tokio::io::duplex(4096);
            let fail_writes = Arc::new(AtomicBool::new(false));
            self.streams.lock().unwrap().push_back(TestStream {
                inner: client,
                fail_writes: fail_writes.clone(),
            });
            (server, fail_writes)
        }

        fn attempts(&self) -> Vec<Instant> {
            self.attempts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Dialer for TestDialer {
        type Stream = TestStream;

        fn target(&self) -> String {
            "test-server:5000".to_string()
        }

        async fn dial(&self) -> io::Result<TestStream> {
            self.attempts.lock().unwrap().push(Instant::now());
            self.streams
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| io::Error::from(io::ErrorKind::ConnectionRefused))
        }
    }

    fn test_config() -> SessionConfig {
        SessionConfig {
            phone_number: "+33600000000".to_string(),
            ..SessionConfig::default()
        }
    }

    async fn read_line(server: &mut DuplexStream, buf: &mut BytesMut) -> String {
        let mut decoder = LineDecoder::new();
        loop {
            if let Some(line) = decoder.decode(buf).unwrap() {
                return line;
            }
            let n = server.read_buf(buf).await.unwrap();
            assert!(n > 0, "server stream closed");
        }
    }

    async fn next_event(rx: &mut mpsc::Receiver<SessionEvent>) -> SessionEvent {
        timeout(Duration::from_secs(300), rx.recv())
            .await
            .expect("timed out waiting for session event")
            .expect("event channel closed")
    }

    #[tokio::test]
    async fn test_identification_then_inbound_lines() {
        let dialer = TestDialer::default();
        let (mut server, _) = dialer.accept_next();
        let (event_tx, mut event_rx) = mpsc::channel(16);
        let (manager, handle) = SessionManager::new(test_config(), dialer.clone(), event_tx);
        tokio::spawn(manager.run());

        let mut buf = BytesMut::new();
        assert_eq!(read_line(&mut server, &mut buf).await, "phoneNumber=+33600000000");
        assert_eq!(
            next_event(&mut event_rx).await,
            SessionEvent::Connected { target: "test-server:5000".to_string() }
        );
        assert_eq!(handle.state(), SessionState::Connected);

        // One line split across writes, a second one in the same chunk
        server.write_all(b"cmd:sta").await.unwrap();
        server.write_all(b"tus\nhello\ncmd:par").await.unwrap();

        assert_eq!(next_event(&mut event_rx).await, SessionEvent::LineReceived { line: "cmd:status".into() });
        assert_eq!(next_event(&mut event_rx).await, SessionEvent::LineReceived { line: "hello".into() });
        assert!(timeout(Duration::from_millis(50), event_rx.recv()).await.is_err());

        server.write_all(b"tial\n").await.unwrap();
        assert_eq!(next_event(&mut event_rx).await, SessionEvent::LineReceived { line: "cmd:partial".into() });
    }

    #[tokio::test]
    async fn test_outbound_messages_are_tagged() {
        let dialer = TestDialer::default();
        let (mut server, _) = dialer.accept_next();
        let (event_tx, mut event_rx) = mpsc::channel(16);
        let (manager, handle) = SessionManager::new(test_config(), dialer, event_tx);
        tokio::spawn(manager.run());

        let mut buf = BytesMut::new();
        read_line(&mut server, &mut buf).await;
        next_event(&mut event_rx).await;

        handle.send(OutboundMessage::raw("netGPRS")).unwrap();
        handle.send(OutboundMessage::structured("{\"x\":1}")).unwrap();

        assert_eq!(read_line(&mut server, &mut buf).await, "0netGPRS");
        assert_eq!(read_line(&mut server, &mut buf).await, "2{\"x\":1}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_reconnect_after_close() {
        let dialer = TestDialer::default();
        let (server, _) = dialer.accept_next();
        let (event_tx, mut event_rx) = mpsc::channel(16);
        let (manager, handle) = SessionManager::new(test_config(), dialer.clone(), event_tx);
        tokio::spawn(manager.run());

        assert!(matches!(next_event(&mut event_rx).await, SessionEvent::Connected { .. }));

        // No dial while connected
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(dialer.attempts().len(), 1);

        drop(server);
        assert_eq!(next_event(&mut event_rx).await, SessionEvent::Disconnected);
        let closed_at = Instant::now();
        assert_eq!(handle.state(), SessionState::Disconnected);

        let (_server2, _) = dialer.accept_next();
        tokio::time::sleep(Duration::from_millis(9_900)).await;
        assert_eq!(dialer.attempts().len(), 1);

        tokio::time::sleep(Duration::from_millis(200)).await;
        let attempts = dialer.attempts();
        assert_eq!(attempts.len(), 2);
        assert!(attempts[1] - closed_at >= Duration::from_secs(10));
        assert!(matches!(next_event(&mut event_rx).await, SessionEvent::Connected { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_dials_retry_on_fixed_delay() {
        let dialer = TestDialer::default();
        let (event_tx, mut event_rx) = mpsc::channel(16);
        let (manager, _handle) = SessionManager::new(test_config(), dialer.clone(), event_tx);
        tokio::spawn(manager.run());

        for _ in 0..3 {
            assert_eq!(next_event(&mut event_rx).await, SessionEvent::Disconnected);
        }

        let attempts = dialer.attempts();
        assert!(attempts.len() >= 3);
        for pair in attempts.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_secs(10));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_failure_is_retried_once_by_flush() {
        let dialer = TestDialer::default();
        let (_server1, fail_writes) = dialer.accept_next();
        let (event_tx, mut event_rx) = mpsc::channel(16);
        let (manager, handle) = SessionManager::new(test_config(), dialer.clone(), event_tx);
        tokio::spawn(manager.run());
        let started = Instant::now();

        assert!(matches!(next_event(&mut event_rx).await, SessionEvent::Connected { .. }));

        fail_writes.store(true, Ordering::SeqCst);
        handle.send(OutboundMessage::compact("AAEC")).unwrap();
        assert_eq!(next_event(&mut event_rx).await, SessionEvent::Disconnected);

        let (mut server2, _) = dialer.accept_next();
        assert!(matches!(next_event(&mut event_rx).await, SessionEvent::Connected { .. }));

        let mut buf = BytesMut::new();
        assert_eq!(read_line(&mut server2, &mut buf).await, "phoneNumber=+33600000000");
        assert_eq!(read_line(&mut server2, &mut buf).await, "1AAEC");
        assert!(Instant::now() - started >= Duration::from_secs(60));

        // Nothing more on the next tick
        let mut decoder = LineDecoder::new();
        let extra = timeout(Duration::from_secs(70), async {
            loop {
                if let Some(line) = decoder.decode(&mut buf).unwrap() {
                    return line;
                }
                server2.read_buf(&mut buf).await.unwrap();
            }
        })
        .await;
        assert!(extra.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_messages_sent_while_disconnected_are_deferred() {
        let dialer = TestDialer::default();
        let (event_tx, mut event_rx) = mpsc::channel(16);
        let (manager, handle) = SessionManager::new(test_config(), dialer.clone(), event_tx);
        tokio::spawn(manager.run());

        assert_eq!(next_event(&mut event_rx).await, SessionEvent::Disconnected);
        handle.send(OutboundMessage::raw("first")).unwrap();
        handle.send(OutboundMessage::raw("second")).unwrap();

        let (mut server, _) = dialer.accept_next();
        let mut buf = BytesMut::new();
        assert_eq!(read_line(&mut server, &mut buf).await, "phoneNumber=+33600000000");
        assert_eq!(read_line(&mut server, &mut buf).await, "0first");
        assert_eq!(read_line(&mut server, &mut buf).await, "0second");
    }

    /// Dialer that never resolves
    struct HangingDialer {
        attempts: Arc<Mutex<u32>>,
    }

    #[async_trait]
    impl Dialer for HangingDialer {
        type Stream = DuplexStream;

        fn target(&self) -> String {
            "unreachable:5000".to_string()
        }

        async fn dial(&self) -> io::Result<DuplexStream> {
            *self.attempts.lock().unwrap() += 1;
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_dial_times_out() {
        let attempts = Arc::new(Mutex::new(0));
        let dialer = HangingDialer { attempts: attempts.clone() };
        let (event_tx, mut event_rx) = mpsc::channel(16);
        let (manager, _handle) = SessionManager::new(test_config(), dialer, event_tx);
        tokio::spawn(manager.run());
        let started = Instant::now();

        assert_eq!(next_event(&mut event_rx).await, SessionEvent::Disconnected);
        assert!(Instant::now() - started >= Duration::from_secs(30));

        assert_eq!(next_event(&mut event_rx).await, SessionEvent::Disconnected);
        assert_eq!(*attempts.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_manager_stops_when_handles_dropped() {
        let dialer = TestDialer::default();
        let (_server, _) = dialer.accept_next();
        let (event_tx, mut event_rx) = mpsc::channel(16);
        let (manager, handle) = SessionManager::new(test_config(), dialer, event_tx);
        let task = tokio::spawn(manager.run());

        next_event(&mut event_rx).await;
        drop(handle);

        let result = timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
        assert!(result.is_ok());
    }

    #[test]
    fn test_send_after_stop_fails() {
        let (event_tx, _event_rx) = mpsc::channel(1);
        let (manager, handle) = SessionManager::new(test_config(), TestDialer::default(), event_tx);
        drop(manager);
        assert!(matches!(handle.send(OutboundMessage::raw("x")), Err(SessionError::Closed)));
    }
}
