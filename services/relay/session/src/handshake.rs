//! Identification handshake for relay sessions.
//!
//! The first line written on every new connection tells the server which
//! device is speaking. It is sent untagged, before any other traffic.

use relay_wire::encode_line;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Identification line for a device, without delimiter
pub fn identification_line(phone_number: &str) -> String {
    format!("phoneNumber={}", phone_number)
}

/// Send the identification line to establish the session
pub async fn send_identification<W: AsyncWrite + Unpin>(
    mut writer: W,
    phone_number: &str,
) -> std::io::Result<usize> {
    let bytes = encode_line(&identification_line(phone_number));
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    debug!("Sent identification for {}", phone_number);
    Ok(bytes.len())
}
