//! In-memory mock transport simulating a NAD receiver.
//!
//! Used by the unit and integration tests (and handy for offline demos).
//! Each `open` wires the client to a small simulated receiver task over an
//! in-memory duplex pipe.  The simulated receiver:
//!
//! - answers `Key?` queries from a scriptable key/value table (absent keys
//!   get no reply, which is exactly what a real receiver does for
//!   unsupported keys);
//! - applies `Key=Value` sets and `Key+`/`Key-` steps to the table and
//!   pushes the updated value back, the way the push protocol works;
//! - records every command line it receives, so tests can assert on the
//!   retry-once send policy;
//! - can inject unsolicited pushes, fail the next N opens, and drop the
//!   live connection to exercise the reconnect state machine.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;
use tracing::debug;

use nad_protocol::LineFramer;

use crate::error::ClientError;
use crate::transport::{Transport, TransportPair};

/// Scriptable mock transport.  Clone handles share the same state, so tests
/// keep one handle and give another to the client under test.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<MockState>,
}

#[derive(Default)]
struct MockState {
    /// Simulated receiver key/value state.
    values: Mutex<HashMap<String, String>>,
    /// Every command line received, across all connections.
    received: Mutex<Vec<String>>,
    /// Live channel for injecting pushes into the current connection.
    push_tx: Mutex<Option<mpsc::UnboundedSender<String>>>,
    /// Number of upcoming `open` calls that must fail.
    fail_opens: AtomicUsize,
    /// Number of successful opens so far.
    opens: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a mock pre-loaded with receiver state.
    pub fn with_values<'a>(values: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mock = Self::new();
        for (key, value) in values {
            mock.set_value(key, value);
        }
        mock
    }

    /// Sets one key in the simulated receiver state.
    pub fn set_value(&self, key: &str, value: &str) {
        self.state
            .values
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
    }

    /// All command lines the simulated receiver has seen, oldest first.
    pub fn received_commands(&self) -> Vec<String> {
        self.state.received.lock().unwrap().clone()
    }

    /// Number of successful opens (1 after connect, 2 after one reconnect).
    pub fn open_count(&self) -> usize {
        self.state.opens.load(Ordering::SeqCst)
    }

    /// Makes the next `count` open attempts fail with a refused error.
    pub fn fail_next_opens(&self, count: usize) {
        self.state.fail_opens.store(count, Ordering::SeqCst);
    }

    /// Injects an unsolicited `Key=Value` push on the live connection.
    pub fn push(&self, key: &str, value: &str) {
        self.push_line(&format!("{key}={value}"));
    }

    /// Injects a raw line (e.g. a banner) on the live connection.
    pub fn push_line(&self, line: &str) {
        let guard = self.state.push_tx.lock().unwrap();
        if let Some(tx) = guard.as_ref() {
            let _ = tx.send(line.to_string());
        }
    }

    /// Drops the live connection, as if the receiver closed it.
    pub fn drop_connection(&self) {
        self.state.push_tx.lock().unwrap().take();
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(&self) -> Result<TransportPair, ClientError> {
        let pending_failures = self.state.fail_opens.load(Ordering::SeqCst);
        if pending_failures > 0 {
            self.state
                .fail_opens
                .store(pending_failures - 1, Ordering::SeqCst);
            return Err(ClientError::ConnectFailed {
                endpoint: self.describe(),
                source: std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "mock open failure",
                ),
            });
        }

        self.state.opens.fetch_add(1, Ordering::SeqCst);

        let (client_side, device_side) = tokio::io::duplex(4096);
        let (push_tx, push_rx) = mpsc::unbounded_channel();
        // Replacing the sender severs any previous connection's push path.
        *self.state.push_tx.lock().unwrap() = Some(push_tx);

        tokio::spawn(device_task(Arc::clone(&self.state), device_side, push_rx));

        let (reader, writer) = tokio::io::split(client_side);
        Ok(TransportPair {
            reader: Box::new(reader),
            writer: Box::new(writer),
        })
    }

    fn describe(&self) -> String {
        "mock receiver".to_string()
    }
}

/// Simulated receiver: answers commands and forwards injected pushes until
/// either side goes away.
async fn device_task(
    state: Arc<MockState>,
    device_side: DuplexStream,
    mut push_rx: mpsc::UnboundedReceiver<String>,
) {
    let (mut reader, mut writer) = tokio::io::split(device_side);
    let mut framer = LineFramer::new();
    let mut buf = [0u8; 1024];

    loop {
        tokio::select! {
            pushed = push_rx.recv() => {
                let Some(line) = pushed else {
                    // Push channel dropped: simulate the receiver closing
                    // the connection.
                    debug!("mock receiver dropping connection");
                    break;
                };
                if write_line(&mut writer, &line).await.is_err() {
                    break;
                }
            }
            read = reader.read(&mut buf) => {
                let n = match read {
                    Ok(0) | Err(_) => break,
                    Ok(n) => n,
                };
                let mut failed = false;
                for line in framer.feed(&buf[..n]) {
                    if line.is_empty() {
                        continue;
                    }
                    debug!("mock receiver got command: {line}");
                    state.received.lock().unwrap().push(line.clone());
                    if let Some(reply) = handle_command(&state, &line) {
                        if write_line(&mut writer, &reply).await.is_err() {
                            failed = true;
                            break;
                        }
                    }
                }
                if failed {
                    break;
                }
            }
        }
    }
}

async fn write_line(
    writer: &mut (impl AsyncWriteExt + Unpin),
    line: &str,
) -> std::io::Result<()> {
    writer.write_all(format!("{line}\r\n").as_bytes()).await
}

/// Applies one command line to the simulated state and returns the push
/// line it provokes, if any.
fn handle_command(state: &MockState, line: &str) -> Option<String> {
    if let Some(key) = line.strip_suffix('?') {
        let values = state.values.lock().unwrap();
        return values.get(key).map(|value| format!("{key}={value}"));
    }

    if let Some((key, value)) = line.split_once('=') {
        let mut values = state.values.lock().unwrap();
        values.insert(key.to_string(), value.to_string());
        return Some(format!("{key}={value}"));
    }

    let (key, delta) = if let Some(key) = line.strip_suffix('+') {
        (key, 1)
    } else if let Some(key) = line.strip_suffix('-') {
        (key, -1)
    } else {
        return None;
    };

    let mut values = state.values.lock().unwrap();
    let current: i64 = values.get(key)?.parse().ok()?;
    let stepped = (current + delta).to_string();
    values.insert(key.to_string(), stepped.clone());
    Some(format!("{key}={stepped}"))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
