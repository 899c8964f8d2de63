//! TCP transport for the relay session.
//!
//! The session manager only needs something that can produce a fresh
//! bidirectional byte stream on demand; [`Dialer`] is that seam.

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::debug;

/// Source of new connections to the control server
#[async_trait]
pub trait Dialer: Send + Sync {
    /// Stream type produced by a successful dial
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Human-readable endpoint, used in logs
    fn target(&self) -> String;

    /// Open a new connection
    async fn dial(&self) -> std::io::Result<Self::Stream>;
}

/// Dialer for a `host:port` endpoint
#[derive(Debug, Clone)]
pub struct TcpDialer {
    target: String,
}

impl TcpDialer {
    /// Create a dialer for `host:port`
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
        }
    }
}

#[async_trait]
impl Dialer for TcpDialer {
    type Stream = TcpStream;

    fn target(&self) -> String {
        self.target.clone()
    }

    async fn dial(&self) -> std::io::Result<TcpStream> {
        connect_tcp(&self.target).await
    }
}

/// Connect to a TCP endpoint, resolving the host name if needed
pub async fn connect_tcp(target: &str) -> tokio::io::Result<TcpStream> {
    let stream = TcpStream::connect(target).await?;
    stream.set_nodelay(true)?;
    debug!("TCP stream open to {} (local {:?})", target, stream.local_addr().ok());
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_tcp_dialer_connects() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let dialer = TcpDialer::new(addr.to_string());
        assert_eq!(dialer.target(), addr.to_string());

        let accept = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 2];
            socket.read_exact(&mut buf).await.unwrap();
            buf
        });

        let mut stream = dialer.dial().await.unwrap();
        tokio::io::AsyncWriteExt::write_all(&mut stream, b"ok").await.unwrap();
        assert_eq!(&accept.await.unwrap(), b"ok");
    }

    #[tokio::test]
    async fn test_tcp_dialer_refused() {
        // Bind then drop to get a port with nothing listening
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };

        let dialer = TcpDialer::new(addr.to_string());
        assert!(dialer.dial().await.is_err());
    }
}
