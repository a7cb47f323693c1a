//! Error types for the client runtime.

use thiserror::Error;

/// Errors raised by the transport layer and the protocol client.
///
/// Connection-open failures are split by transport so callers can tell a
/// refused/OS-level TCP failure apart from a serial-port open failure when
/// deciding on retry policy.  Malformed inbound lines are deliberately not
/// represented here: they are discarded by the listen loop, never raised.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The TCP connection could not be established (refused, unreachable,
    /// or another OS-level failure — see the `source` kind).
    #[error("failed to connect to {endpoint}: {source}")]
    ConnectFailed {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    /// The serial port could not be opened.
    #[error("failed to open serial port {path} at {baud_rate} baud: {source}")]
    SerialOpenFailed {
        path: String,
        baud_rate: u32,
        #[source]
        source: tokio_serial::Error,
    },

    /// An I/O error occurred on an established connection.
    #[error("connection I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A send was attempted with no live connection.
    #[error("not connected to the receiver")]
    NotConnected,
}

// ── Tests ─────────────────────────────────────────────────────────────────────
