//! The receiver coordinator: authoritative state cache and fan-out.
//!
//! [`ReceiverCoordinator`] owns a [`ReceiverClient`] and is the single
//! source of truth consumers read.  It:
//!
//! - runs the startup discovery sequence (model, version, sources, initial
//!   state) when connecting;
//! - mirrors every push message into the key→value cache and derives the
//!   coarse on/off power projection;
//! - coalesces bursts of rapid updates (volume ramps) into one listener
//!   notification per quiet period;
//! - refreshes the core state keys after every reconnect.
//!
//! # Response correlation
//!
//! The wire protocol has no request/response pairing: the answer to
//! `Main.Model?` is an ordinary push line.  Instead of sleeping a fixed
//! settle time after each query, the coordinator registers a one-shot
//! waiter for the key *before* sending and lets the message-dispatch path
//! resolve it when that key next updates.  A timeout bounds the wait and
//! falls back to whatever the cache holds, so a receiver that never answers
//! an unsupported key cannot stall discovery.

use std::collections::{BTreeMap, HashMap};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use nad_protocol::{Command, Message, Operator};

use crate::client::ReceiverClient;
use crate::error::ClientError;
use crate::transport::Transport;

/// Well-known protocol keys used by discovery and state refresh.
pub mod keys {
    pub const MODEL: &str = "Main.Model";
    pub const VERSION: &str = "Main.Version";
    pub const POWER: &str = "Main.Power";
    pub const VOLUME: &str = "Main.Volume";
    pub const MUTE: &str = "Main.Mute";
    pub const SOURCE: &str = "Main.Source";
}

/// Quiet period used to coalesce bursts of pushes into one notification.
const DEBOUNCE_WINDOW: Duration = Duration::from_millis(50);
/// Upper bound on waiting for the answer to a discovery/state query.
const QUERY_TIMEOUT: Duration = Duration::from_millis(300);
/// Upper bound per source-slot query; disabled slots often never answer.
const SOURCE_QUERY_TIMEOUT: Duration = Duration::from_millis(100);
/// Upper bound on waiting for the pushed result of a mutating command.
const COMMAND_SETTLE_TIMEOUT: Duration = Duration::from_millis(150);

/// Source slots the protocol exposes.
const SOURCE_SLOTS: std::ops::RangeInclusive<u8> = 1..=12;

/// Coarse two-valued power projection derived from `Main.Power`.
///
/// Consumers that only need binary power state read this instead of
/// interpreting the raw value.  Unrecognized values (e.g. `"Standby"`
/// on some firmware) leave the previous projection unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PowerState {
    On,
    Off,
    #[default]
    Unknown,
}

/// Opaque unsubscribe token returned by
/// [`ReceiverCoordinator::add_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type ListenerCallback = Arc<dyn Fn() + Send + Sync>;

/// State shared between the coordinator, the client's dispatch path, and
/// the notifier task.
///
/// All mutexes here guard sync-only critical sections; none is held across
/// an await.
struct CoordinatorShared {
    cache: Mutex<HashMap<String, String>>,
    sources: Mutex<BTreeMap<u8, String>>,
    power_state: Mutex<PowerState>,
    model: Mutex<Option<String>>,
    version: Mutex<Option<String>>,
    listeners: Mutex<Vec<(ListenerId, ListenerCallback)>>,
    next_listener_id: AtomicU64,
    /// Per-key one-shot waiters resolved by the dispatch path.
    waiters: Mutex<HashMap<String, Vec<oneshot::Sender<String>>>>,
    /// Pokes the debounce notifier task.
    poke_tx: mpsc::UnboundedSender<()>,
}

impl CoordinatorShared {
    /// Message callback body.  Runs synchronously on the listen task and
    /// must never block.
    fn handle_message(&self, message: Message) {
        debug!("push update: {} = {}", message.key, message.value);

        self.cache
            .lock()
            .unwrap()
            .insert(message.key.clone(), message.value.clone());

        if message.key == keys::POWER {
            match message.value.to_ascii_lowercase().as_str() {
                "on" => *self.power_state.lock().unwrap() = PowerState::On,
                "off" => *self.power_state.lock().unwrap() = PowerState::Off,
                // Unrecognized power values are not errors; the projection
                // keeps its previous value.
                _ => {}
            }
        }

        if let Some(waiting) = self.waiters.lock().unwrap().remove(&message.key) {
            for waiter in waiting {
                let _ = waiter.send(message.value.clone());
            }
        }

        let _ = self.poke_tx.send(());
    }

    /// Registers a one-shot waiter for the next update of `key`.
    ///
    /// Must be called *before* the query is sent, or the answer can race
    /// past the registration.
    fn register_waiter(&self, key: &str) -> oneshot::Receiver<String> {
        let (tx, rx) = oneshot::channel();
        self.waiters
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_default()
            .push(tx);
        rx
    }

    /// Drops waiters whose receiver side has gone away (timed-out waits).
    fn prune_waiters(&self, key: &str) {
        let mut waiters = self.waiters.lock().unwrap();
        if let Some(waiting) = waiters.get_mut(key) {
            waiting.retain(|tx| !tx.is_closed());
            if waiting.is_empty() {
                waiters.remove(key);
            }
        }
    }

    fn cached(&self, key: &str) -> Option<String> {
        self.cache.lock().unwrap().get(key).cloned()
    }

    fn notify_listeners(&self) {
        // Iterate over a snapshot so a listener may unregister itself (or
        // others) mid-notification without corrupting iteration.
        let snapshot: Vec<ListenerCallback> = self
            .listeners
            .lock()
            .unwrap()
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();
        for callback in snapshot {
            // A panicking listener must not take down the notifier task.
            if catch_unwind(AssertUnwindSafe(|| callback())).is_err() {
                error!("update listener panicked");
            }
        }
    }
}

/// Coordinator over one receiver connection.
///
/// This is the integration surface for the host layer: connect/disconnect,
/// command sending, listener registration, and read access to the cache,
/// source table, and power projection.
pub struct ReceiverCoordinator {
    client: Arc<ReceiverClient>,
    shared: Arc<CoordinatorShared>,
    notifier_task: Mutex<Option<JoinHandle<()>>>,
}

impl ReceiverCoordinator {
    /// Creates a coordinator for the given transport.  No connection is
    /// opened until [`connect`](Self::connect).
    pub fn new(transport: Arc<dyn Transport>) -> Arc<Self> {
        let client = Arc::new(ReceiverClient::new(transport));
        let (poke_tx, poke_rx) = mpsc::unbounded_channel();

        let shared = Arc::new(CoordinatorShared {
            cache: Mutex::new(HashMap::new()),
            sources: Mutex::new(BTreeMap::new()),
            power_state: Mutex::new(PowerState::Unknown),
            model: Mutex::new(None),
            version: Mutex::new(None),
            listeners: Mutex::new(Vec::new()),
            next_listener_id: AtomicU64::new(0),
            waiters: Mutex::new(HashMap::new()),
            poke_tx,
        });

        let notifier = tokio::spawn(notifier_loop(Arc::clone(&shared), poke_rx));

        // Push messages update the shared state synchronously.
        let dispatch_shared = Arc::clone(&shared);
        client.set_message_callback(Arc::new(move |message| {
            dispatch_shared.handle_message(message);
        }));

        // A successful reconnect schedules a state refresh.  The callback
        // holds a Weak client reference to avoid an Arc cycle through the
        // client's own callback slot.
        let refresh_client = Arc::downgrade(&client);
        let refresh_shared = Arc::clone(&shared);
        client.set_reconnect_callback(Arc::new(move || {
            info!("reconnection successful, refreshing state");
            let Some(client) = Weak::upgrade(&refresh_client) else {
                return;
            };
            let shared = Arc::clone(&refresh_shared);
            tokio::spawn(async move {
                if let Err(err) = refresh_state(&client, &shared).await {
                    // Refresh errors are logged, never fatal, no retry.
                    error!("failed to refresh state after reconnect: {err}");
                }
            });
        }));

        Arc::new(Self {
            client,
            shared,
            notifier_task: Mutex::new(Some(notifier)),
        })
    }

    /// Connects and runs the discovery sequence: model, version, source
    /// table, then initial state.
    ///
    /// # Errors
    ///
    /// Any client-level error during the sequence aborts the whole setup
    /// and surfaces here, so the host can report "not ready".
    pub async fn connect(&self) -> Result<(), ClientError> {
        self.client.connect().await?;

        let model = self.query(keys::MODEL, QUERY_TIMEOUT).await?;
        *self.shared.model.lock().unwrap() = model.clone();

        let version = self.query(keys::VERSION, QUERY_TIMEOUT).await?;
        *self.shared.version.lock().unwrap() = version;

        self.discover_sources().await?;

        refresh_state(&self.client, &self.shared).await?;

        info!(
            "connected to NAD {}",
            model.as_deref().unwrap_or("(unknown model)")
        );
        Ok(())
    }

    /// Disconnects the client and stops the notifier task, awaiting its
    /// termination.  The cached state stays readable.
    pub async fn disconnect(&self) {
        self.client.disconnect().await;
        let task = self.notifier_task.lock().unwrap().take();
        if let Some(task) = task {
            task.abort();
            // Cancellation during shutdown is expected, not an error.
            let _ = task.await;
        }
    }

    /// Sends a command and returns the (possibly updated) cached value for
    /// its key.
    ///
    /// Returns `None` without sending when not connected, and `None` when
    /// the send fails (the failure is logged — the host treats the control
    /// as unavailable rather than erroring).
    ///
    /// For mutating operators (`=`, `+`, `-`) the call waits, bounded, for
    /// the receiver's pushed result so the returned value reflects the
    /// change.
    pub async fn send_command(
        &self,
        key: &str,
        operator: Operator,
        value: Option<String>,
    ) -> Option<String> {
        if !self.client.connected() {
            warn!("not connected to NAD receiver");
            return None;
        }

        let command = Command::new(key, operator, value);

        let settle = if operator.mutates_state() {
            Some(self.shared.register_waiter(key))
        } else {
            None
        };

        if let Err(err) = self.client.send_command(&command).await {
            error!("failed to send command {command}: {err}");
            drop(settle);
            self.shared.prune_waiters(key);
            return None;
        }

        if let Some(waiter) = settle {
            match tokio::time::timeout(COMMAND_SETTLE_TIMEOUT, waiter).await {
                Ok(Ok(value)) => return Some(value),
                _ => self.shared.prune_waiters(key),
            }
        }
        self.shared.cached(key)
    }

    /// Registers an update listener; returns the token to unsubscribe with.
    ///
    /// Listeners fire after each debounce window, not per message.
    pub fn add_listener(&self, callback: impl Fn() + Send + Sync + 'static) -> ListenerId {
        let id = ListenerId(self.shared.next_listener_id.fetch_add(1, Ordering::Relaxed));
        self.shared
            .listeners
            .lock()
            .unwrap()
            .push((id, Arc::new(callback)));
        id
    }

    /// Removes a listener.  Unknown tokens are ignored; a listener may
    /// remove itself from within its own notification.
    pub fn remove_listener(&self, id: ListenerId) {
        self.shared
            .listeners
            .lock()
            .unwrap()
            .retain(|(listener_id, _)| *listener_id != id);
    }

    /// Last-known value for a key, from the cache only.
    pub fn value(&self, key: &str) -> Option<String> {
        self.shared.cached(key)
    }

    /// Snapshot of the whole cache.
    pub fn values(&self) -> HashMap<String, String> {
        self.shared.cache.lock().unwrap().clone()
    }

    /// Discovered source table: slot index → display name.
    pub fn sources(&self) -> BTreeMap<u8, String> {
        self.shared.sources.lock().unwrap().clone()
    }

    /// Coarse power projection.
    pub fn power_state(&self) -> PowerState {
        *self.shared.power_state.lock().unwrap()
    }

    /// Receiver model reported during discovery.
    pub fn model(&self) -> Option<String> {
        self.shared.model.lock().unwrap().clone()
    }

    /// Firmware version reported during discovery.
    pub fn version(&self) -> Option<String> {
        self.shared.version.lock().unwrap().clone()
    }

    /// Whether the underlying connection is believed live.
    pub fn is_connected(&self) -> bool {
        self.client.connected()
    }

    /// The underlying protocol client, for hosts that need direct access
    /// (e.g. to force a reconnect).
    pub fn client(&self) -> Arc<ReceiverClient> {
        Arc::clone(&self.client)
    }

    /// Sends `key?` and waits (bounded) for the pushed answer, falling back
    /// to the cache on timeout.
    async fn query(&self, key: &str, timeout: Duration) -> Result<Option<String>, ClientError> {
        query_and_wait(&self.client, &self.shared, key, timeout).await
    }

    /// Probes source slots 1..=12: an `Enabled` value of `"yes"` (any case)
    /// gates a `Name` query; slots without a non-empty name are omitted.
    async fn discover_sources(&self) -> Result<(), ClientError> {
        self.shared.sources.lock().unwrap().clear();

        for slot in SOURCE_SLOTS {
            let enabled = self
                .query(&format!("Source{slot}.Enabled"), SOURCE_QUERY_TIMEOUT)
                .await?;
            if !enabled.is_some_and(|value| value.eq_ignore_ascii_case("yes")) {
                continue;
            }

            let name = self
                .query(&format!("Source{slot}.Name"), SOURCE_QUERY_TIMEOUT)
                .await?;
            if let Some(name) = name.filter(|name| !name.is_empty()) {
                debug!("found source {slot}: {name}");
                self.shared.sources.lock().unwrap().insert(slot, name);
            }
        }
        Ok(())
    }
}

impl Drop for ReceiverCoordinator {
    fn drop(&mut self) {
        if let Some(task) = self.notifier_task.lock().unwrap().take() {
            task.abort();
        }
    }
}

/// Registers a waiter for `key`, sends the query, and waits up to
/// `timeout` for the pushed answer; falls back to the cached value.
async fn query_and_wait(
    client: &Arc<ReceiverClient>,
    shared: &Arc<CoordinatorShared>,
    key: &str,
    timeout: Duration,
) -> Result<Option<String>, ClientError> {
    let waiter = shared.register_waiter(key);
    client.send_command(&Command::query(key)).await?;

    match tokio::time::timeout(timeout, waiter).await {
        Ok(Ok(value)) => Ok(Some(value)),
        _ => {
            shared.prune_waiters(key);
            Ok(shared.cached(key))
        }
    }
}

/// Re-queries the core state keys.  Used for the initial state fetch and
/// after every reconnect; only the caller decides whether errors are fatal.
async fn refresh_state(
    client: &Arc<ReceiverClient>,
    shared: &Arc<CoordinatorShared>,
) -> Result<(), ClientError> {
    debug!("refreshing receiver state");
    for key in [keys::POWER, keys::VOLUME, keys::MUTE, keys::SOURCE] {
        query_and_wait(client, shared, key, QUERY_TIMEOUT).await?;
    }
    Ok(())
}

/// Debounce notifier: a single deferred timer rather than a task spawned
/// and cancelled per message.  Each poke (re)opens the quiet window; only
/// when the window elapses with no newer poke do listeners fire, so a burst
/// of rapid updates produces exactly one notification.
async fn notifier_loop(shared: Arc<CoordinatorShared>, mut poke_rx: mpsc::UnboundedReceiver<()>) {
    while poke_rx.recv().await.is_some() {
        loop {
            match tokio::time::timeout(DEBOUNCE_WINDOW, poke_rx.recv()).await {
                // Superseded by a newer message: restart the window.
                Ok(Some(())) => continue,
                // Channel closed: coordinator is gone.
                Ok(None) => return,
                // Quiet window elapsed.
                Err(_) => break,
            }
        }
        shared.notify_listeners();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
