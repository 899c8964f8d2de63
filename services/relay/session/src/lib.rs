//! Reconnecting TCP session, identification handshake and retry flushing for the relay.
//!
//! This crate owns the single outbound connection between the field relay and
//! its control server. It dials the server, identifies the device, splits the
//! inbound stream into lines, writes tagged outbound messages and defers any
//! message that cannot be written to the delivery queue.
//!
//! ## Features
//!
//! - **Single session**: at most one connection, never dialled in parallel
//! - **Handshake**: `phoneNumber=<number>` line right after connect
//! - **Auto-reconnect**: fixed delay after every close or failed dial
//! - **Dial timeout**: a dial that never resolves counts as a failed connect
//! - **Store and forward**: failed writes are retried by a periodic flush
//!
//! ## Example
//!
//! ```rust,no_run
//! use relay_session::{SessionConfig, SessionEvent, SessionManager, TcpDialer};
//! use relay_wire::OutboundMessage;
//! use tokio::sync::mpsc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = SessionConfig {
//!     phone_number: "+33600000000".to_string(),
//!     ..SessionConfig::default()
//! };
//!
//! let (event_tx, mut event_rx) = mpsc::channel(100);
//! let dialer = TcpDialer::new("relay.example.net:5000");
//! let (manager, handle) = SessionManager::new(config, dialer, event_tx);
//! tokio::spawn(manager.run());
//!
//! handle.send(OutboundMessage::raw("netGPRS"))?;
//!
//! while let Some(event) = event_rx.recv().await {
//!     if let SessionEvent::LineReceived { line } = event {
//!         println!("received {}", line);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod handshake;
pub mod session;
pub mod transport;

pub use error::SessionError;
pub use handshake::{identification_line, send_identification};
pub use session::{
    SessionConfig, SessionEvent, SessionHandle, SessionManager, SessionState, SessionStats,
};
pub use transport::{connect_tcp, Dialer, TcpDialer};
