//! TCP/Telnet transport.
//!
//! NAD receivers with a network jack expose the control protocol on the
//! Telnet port (23).  No Telnet option negotiation is needed — the receiver
//! speaks the raw line protocol on the socket.

use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::error::ClientError;
use crate::transport::{Transport, TransportPair};

/// Default control port (Telnet).
pub const DEFAULT_TCP_PORT: u16 = 23;

/// TCP transport parameters.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    host: String,
    port: u16,
}

impl TcpTransport {
    /// Creates a transport for `host:port`.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Creates a transport for the default Telnet port.
    pub fn with_default_port(host: impl Into<String>) -> Self {
        Self::new(host, DEFAULT_TCP_PORT)
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn open(&self) -> Result<TransportPair, ClientError> {
        debug!("connecting to {}:{}", self.host, self.port);

        let stream = TcpStream::connect((self.host.as_str(), self.port))
            .await
            .map_err(|source| ClientError::ConnectFailed {
                endpoint: self.describe(),
                source,
            })?;

        info!("connected to NAD receiver at {}:{}", self.host, self.port);

        let (reader, writer) = stream.into_split();
        Ok(TransportPair {
            reader: Box::new(reader),
            writer: Box::new(writer),
        })
    }

    fn describe(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_port_is_telnet() {
        let transport = TcpTransport::with_default_port("192.168.1.50");
        assert_eq!(transport.port, 23);
    }

    #[test]
    fn test_describe_formats_host_and_port() {
        let transport = TcpTransport::new("receiver.local", 5000);
        assert_eq!(transport.describe(), "receiver.local:5000");
    }

    #[tokio::test]
    async fn test_open_against_unreachable_port_returns_connect_failed() {
        // Port 1 on loopback is refused immediately on any sane test host.
        let transport = TcpTransport::new("127.0.0.1", 1);

        let result = transport.open().await;

        assert!(matches!(
            result,
            Err(ClientError::ConnectFailed { .. })
        ));
    }
}
