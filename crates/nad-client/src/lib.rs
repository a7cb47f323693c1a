//! nad-client library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does nad-client do? (for beginners)
//!
//! NAD receivers speak a plain-text control protocol over Telnet (port 23)
//! or the rear-panel RS-232 port: every state change on the unit — whether
//! caused by our commands, the front panel, or the infrared remote — is
//! pushed as a `Key=Value` line.  There is no request/response pairing;
//! querying `Main.Volume?` just provokes one more push.
//!
//! The crate is layered accordingly:
//!
//! 1. [`transport`] — how bytes reach the unit ([`TcpTransport`],
//!    [`SerialTransport`], plus a scriptable [`MockTransport`] simulating a
//!    receiver for tests).
//! 2. [`client`] — [`ReceiverClient`]: connection lifecycle, the background
//!    listen loop, and the retry-once reconnect policy.
//! 3. [`coordinator`] — [`ReceiverCoordinator`]: the key→value state cache,
//!    source discovery, the power projection, and debounced listener
//!    notifications.  This is the surface a host application talks to.
//! 4. [`config`] — TOML configuration for the bundled binary.

/// Connection lifecycle and the listen loop.
pub mod client;
/// TOML configuration.
pub mod config;
/// State cache, discovery, and listener fan-out.
pub mod coordinator;
/// Crate error type.
pub mod error;
/// Pluggable byte links to the receiver.
pub mod transport;

pub use client::ReceiverClient;
pub use config::{load_config, save_config, AppConfig};
pub use coordinator::{ListenerId, PowerState, ReceiverCoordinator};
pub use error::ClientError;
pub use transport::{MockTransport, SerialTransport, TcpTransport, Transport};
