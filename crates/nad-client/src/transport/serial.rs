//! RS-232 serial transport.
//!
//! Older NAD models (and installs where the network jack is in use) are
//! controlled over the rear-panel RS-232 port.  The wire protocol is byte
//! for byte the same as Telnet; only the link differs.

use async_trait::async_trait;
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info};

use crate::error::ClientError;
use crate::transport::{Transport, TransportPair};

/// Default baud rate for NAD RS-232 ports.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Serial transport parameters.
#[derive(Debug, Clone)]
pub struct SerialTransport {
    path: String,
    baud_rate: u32,
}

impl SerialTransport {
    /// Creates a transport for the given port path (e.g. `/dev/ttyUSB0`
    /// or `COM3`) and baud rate.
    pub fn new(path: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            path: path.into(),
            baud_rate,
        }
    }

    /// Creates a transport at the default 115200 baud.
    pub fn with_default_baud(path: impl Into<String>) -> Self {
        Self::new(path, DEFAULT_BAUD_RATE)
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn open(&self) -> Result<TransportPair, ClientError> {
        debug!("opening serial port {} at {} baud", self.path, self.baud_rate);

        let stream = tokio_serial::new(&self.path, self.baud_rate)
            .open_native_async()
            .map_err(|source| ClientError::SerialOpenFailed {
                path: self.path.clone(),
                baud_rate: self.baud_rate,
                source,
            })?;

        info!(
            "connected to NAD receiver on {} at {} baud",
            self.path, self.baud_rate
        );

        let (reader, writer) = tokio::io::split(stream);
        Ok(TransportPair {
            reader: Box::new(reader),
            writer: Box::new(writer),
        })
    }

    fn describe(&self) -> String {
        format!("{} ({} baud)", self.path, self.baud_rate)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_baud_rate_is_115200() {
        let transport = SerialTransport::with_default_baud("/dev/ttyUSB0");
        assert_eq!(transport.baud_rate, 115_200);
    }

    #[test]
    fn test_describe_includes_path_and_baud() {
        let transport = SerialTransport::new("/dev/ttyUSB1", 9600);
        assert_eq!(transport.describe(), "/dev/ttyUSB1 (9600 baud)");
    }

    #[tokio::test]
    async fn test_open_nonexistent_port_returns_serial_open_failed() {
        let transport = SerialTransport::with_default_baud("/dev/does-not-exist-nad");

        let result = transport.open().await;

        assert!(matches!(
            result,
            Err(ClientError::SerialOpenFailed { .. })
        ));
    }
}
