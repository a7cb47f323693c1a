//! The protocol client: one transport, one listen loop, retry-once sends.
//!
//! [`ReceiverClient`] owns a [`Transport`] and drives the connection
//! lifecycle.  While connected, a background listen task reads raw chunks,
//! frames them into lines, parses `Key=Value` pairs, and hands each
//! [`Message`] to the registered message callback.  Sends go through the
//! write half concurrently; the link is full-duplex so the two directions
//! never contend.
//!
//! # Reconnect policy
//!
//! There is no periodic reconnect loop.  A failed send while the client is
//! marked disconnected (and reconnect has not been permanently disabled by
//! [`ReceiverClient::disconnect`]) triggers exactly one reconnect cycle and,
//! if that succeeds, exactly one resend.  Nothing is ever queued.  A
//! reconnect-in-progress guard makes cycles mutually exclusive: a second
//! concurrent attempt observes the guard and reports "not reconnected"
//! immediately instead of blocking.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use nad_protocol::{Command, LineFramer, Message};

use crate::error::ClientError;
use crate::transport::{BoxedReader, Transport};

/// Callback invoked for every parsed push message.
pub type MessageCallback = Arc<dyn Fn(Message) + Send + Sync>;
/// Callback invoked after every successful reconnect.
pub type ReconnectCallback = Arc<dyn Fn() + Send + Sync>;

/// Read buffer size for the listen loop.
const READ_CHUNK_SIZE: usize = 4096;

/// Async client for the NAD push protocol, generic over its transport.
///
/// Use behind an [`Arc`]; the methods that spawn the listen task take
/// `self: &Arc<Self>`.
pub struct ReceiverClient {
    transport: Arc<dyn Transport>,
    /// Write half of the live connection; `None` until connected.
    writer: Mutex<Option<crate::transport::BoxedWriter>>,
    /// Handle of the background listen task, if one is running.
    listen_task: StdMutex<Option<JoinHandle<()>>>,
    connected: AtomicBool,
    /// Cleared permanently by `disconnect`.
    reconnect_enabled: AtomicBool,
    /// Reconnect-in-progress guard.
    reconnecting: AtomicBool,
    message_callback: StdMutex<Option<MessageCallback>>,
    reconnect_callback: StdMutex<Option<ReconnectCallback>>,
}

impl ReceiverClient {
    /// Creates a client for the given transport.  No connection is opened
    /// until [`connect`](Self::connect).
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            writer: Mutex::new(None),
            listen_task: StdMutex::new(None),
            connected: AtomicBool::new(false),
            reconnect_enabled: AtomicBool::new(true),
            reconnecting: AtomicBool::new(false),
            message_callback: StdMutex::new(None),
            reconnect_callback: StdMutex::new(None),
        }
    }

    /// Registers the callback invoked for every parsed push message.
    ///
    /// The callback runs on the listen task and must return quickly.
    pub fn set_message_callback(&self, callback: MessageCallback) {
        *self.message_callback.lock().unwrap() = Some(callback);
    }

    /// Registers the callback invoked after every successful reconnect.
    pub fn set_reconnect_callback(&self, callback: ReconnectCallback) {
        *self.reconnect_callback.lock().unwrap() = Some(callback);
    }

    /// Returns `true` while a connection is believed live.
    pub fn connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Opens the transport and starts the listen loop.
    ///
    /// Idempotent: a no-op when already connected.
    ///
    /// # Errors
    ///
    /// Propagates [`ClientError::ConnectFailed`] /
    /// [`ClientError::SerialOpenFailed`] when the transport cannot be
    /// opened; the variants let callers distinguish the failure class.
    pub async fn connect(self: &Arc<Self>) -> Result<(), ClientError> {
        if self.connected() {
            return Ok(());
        }

        let pair = self.transport.open().await?;
        *self.writer.lock().await = Some(pair.writer);
        self.connected.store(true, Ordering::SeqCst);
        self.spawn_listen_task(pair.reader);
        Ok(())
    }

    /// Disconnects and permanently disables auto-reconnect for this client.
    ///
    /// Idempotent.  Cancels the listen task and awaits its termination
    /// before releasing the transport.
    pub async fn disconnect(&self) {
        debug!("disconnecting from NAD receiver");
        self.reconnect_enabled.store(false, Ordering::SeqCst);

        self.stop_listen_task().await;

        if let Some(mut writer) = self.writer.lock().await.take() {
            if let Err(err) = writer.shutdown().await {
                debug!("error closing connection: {err}");
            }
        }
        self.connected.store(false, Ordering::SeqCst);
        info!("disconnected from NAD receiver");
    }

    /// Sends one command, applying the retry-once reconnect policy.
    ///
    /// # Errors
    ///
    /// When the write fails while the client is marked disconnected and
    /// reconnect is still enabled, one reconnect cycle is attempted; on
    /// success the send is retried exactly once and that result returned.
    /// In every other failure case the original error is propagated.
    pub async fn send_command(self: &Arc<Self>, command: &Command) -> Result<(), ClientError> {
        let wire = command.to_wire();
        debug!("sending command: {command}");

        match self.write_wire(&wire).await {
            Ok(()) => Ok(()),
            Err(original) => {
                if !self.connected() && self.reconnect_enabled.load(Ordering::SeqCst) {
                    info!("command failed, attempting reconnect");
                    if self.try_reconnect().await {
                        debug!("retrying command after reconnect: {command}");
                        return self.write_wire(&wire).await;
                    }
                }
                Err(original)
            }
        }
    }

    /// Attempts one reconnect cycle; returns whether the client is now
    /// connected.  Safe to call proactively; concurrent calls do not stack —
    /// the loser of the guard race returns `false` immediately.
    pub async fn reconnect(self: &Arc<Self>) -> bool {
        self.try_reconnect().await
    }

    async fn try_reconnect(self: &Arc<Self>) -> bool {
        if self
            .reconnecting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("reconnect already in progress");
            return false;
        }

        info!("attempting to reconnect to NAD receiver");
        self.stop_listen_task().await;

        // Single exit below this point so the guard is always cleared.
        let reconnected = match self.transport.open().await {
            Ok(pair) => {
                *self.writer.lock().await = Some(pair.writer);
                self.connected.store(true, Ordering::SeqCst);
                self.spawn_listen_task(pair.reader);
                info!("successfully reconnected to NAD receiver");
                self.invoke_reconnect_callback();
                true
            }
            Err(err) => {
                warn!("reconnect failed: {err}");
                self.connected.store(false, Ordering::SeqCst);
                false
            }
        };

        self.reconnecting.store(false, Ordering::SeqCst);
        reconnected
    }

    fn invoke_reconnect_callback(&self) {
        let callback = self.reconnect_callback.lock().unwrap().clone();
        if let Some(callback) = callback {
            // A panicking callback must not take down the reconnect path.
            if catch_unwind(AssertUnwindSafe(|| callback())).is_err() {
                error!("reconnect callback panicked");
            }
        }
    }

    /// Writes raw bytes to the live connection.
    ///
    /// Fails with [`ClientError::NotConnected`] whenever the client is
    /// marked disconnected, even if the write half is still present: a TCP
    /// write after a peer close can land in the kernel buffer and "succeed"
    /// without delivering anything, so the flag, not the write result, is
    /// what arms the retry-once path in [`send_command`](Self::send_command).
    async fn write_wire(&self, wire: &[u8]) -> Result<(), ClientError> {
        if !self.connected() {
            return Err(ClientError::NotConnected);
        }
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(ClientError::NotConnected)?;
        writer.write_all(wire).await?;
        writer.flush().await?;
        Ok(())
    }

    fn spawn_listen_task(self: &Arc<Self>, reader: BoxedReader) {
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            this.listen_loop(reader).await;
        });
        *self.listen_task.lock().unwrap() = Some(handle);
    }

    /// Cancels the listen task, if any, and awaits its termination.
    async fn stop_listen_task(&self) {
        let handle = self.listen_task.lock().unwrap().take();
        if let Some(handle) = handle {
            handle.abort();
            // Cancellation during shutdown is expected, not an error.
            let _ = handle.await;
        }
    }

    /// Reads chunks for the lifetime of one connection.
    ///
    /// An empty read means the peer closed the connection: the loop marks
    /// the client disconnected and ends.  It never reconnects on its own —
    /// reconnection happens reactively on the next failed send, or
    /// proactively via [`reconnect`](Self::reconnect).
    async fn listen_loop(&self, mut reader: BoxedReader) {
        debug!("listen loop started");
        let mut framer = LineFramer::new();
        let mut buf = vec![0u8; READ_CHUNK_SIZE];

        loop {
            let n = match reader.read(&mut buf).await {
                Ok(0) => {
                    warn!("connection closed by NAD receiver");
                    self.connected.store(false, Ordering::SeqCst);
                    break;
                }
                Ok(n) => n,
                Err(err) => {
                    error!("read error in listen loop: {err}");
                    self.connected.store(false, Ordering::SeqCst);
                    break;
                }
            };

            for line in framer.feed(&buf[..n]) {
                if let Some(message) = Message::parse(&line) {
                    self.dispatch(message);
                }
            }
        }
        debug!("listen loop stopped");
    }

    fn dispatch(&self, message: Message) {
        debug!("received: {} = {}", message.key, message.value);
        let callback = self.message_callback.lock().unwrap().clone();
        if let Some(callback) = callback {
            // A panicking callback must never terminate the listen loop.
            if catch_unwind(AssertUnwindSafe(|| callback(message))).is_err() {
                error!("message callback panicked");
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
