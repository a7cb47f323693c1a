//! Transport abstraction over the byte-stream link to the receiver.
//!
//! The NAD protocol is identical on Telnet and RS-232, so the protocol
//! client is written against one capability trait and the transport is
//! selected at construction.  A [`Transport`] knows how to *open* a
//! connection; what it hands back is a [`TransportPair`] of read/write
//! halves, because the listen loop and the send path use the two directions
//! concurrently (the link is full-duplex).
//!
//! Reopening is just calling [`Transport::open`] again — the reconnect
//! cycle replaces the halves in place without constructing a new client.

pub mod mock;
pub mod serial;
pub mod tcp;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::ClientError;

pub use mock::MockTransport;
pub use serial::SerialTransport;
pub use tcp::TcpTransport;

/// Type-erased read half of an open connection.
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
/// Type-erased write half of an open connection.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// The two halves of one open connection.
pub struct TransportPair {
    pub reader: BoxedReader,
    pub writer: BoxedWriter,
}

/// Capability to open a byte-stream connection to the receiver.
///
/// Implementations hold only the connection *parameters* (host/port or
/// path/baud); each successful `open` yields a fresh connection, so the same
/// transport value serves the initial connect and every reconnect.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Opens a new connection and returns its read/write halves.
    async fn open(&self) -> Result<TransportPair, ClientError>;

    /// Human-readable endpoint description for log lines.
    fn describe(&self) -> String;
}
