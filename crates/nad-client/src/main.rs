//! NAD receiver monitor entry point.
//!
//! Loads the TOML config, connects the coordinator to the configured
//! transport, and then logs a state snapshot whenever the receiver pushes
//! an update, until Ctrl-C.
//!
//! ```text
//! main()
//!  └─ load_config()                 -- TOML config (defaults if absent)
//!  └─ ReceiverCoordinator::new()    -- cache + debounce notifier
//!  └─ coordinator.connect()         -- discovery: model, version, sources
//!  └─ add_listener(log snapshot)
//!  └─ ctrl_c().await                -- run until shutdown
//! ```

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use nad_client::config::load_config;
use nad_client::coordinator::{keys, ReceiverCoordinator};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config()?;

    // Initialise structured logging.  RUST_LOG wins over the config file.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.client.log_level.clone())),
        )
        .init();

    let transport = config.receiver.build_transport();
    info!("NAD receiver monitor starting ({})", transport.describe());

    let coordinator = ReceiverCoordinator::new(transport);
    coordinator
        .connect()
        .await
        .map_err(|e| anyhow::anyhow!("receiver setup failed: {e}"))?;

    info!(
        "connected: model={} version={} sources={:?}",
        coordinator.model().as_deref().unwrap_or("?"),
        coordinator.version().as_deref().unwrap_or("?"),
        coordinator.sources()
    );

    // Log a compact snapshot after each debounced update burst.  The
    // listener holds a Weak reference so shutdown is not kept alive by it.
    let snapshot_coordinator = Arc::downgrade(&coordinator);
    coordinator.add_listener(move || {
        let Some(coordinator) = snapshot_coordinator.upgrade() else {
            return;
        };
        info!(
            "state: power={:?} volume={} mute={} source={}",
            coordinator.power_state(),
            coordinator.value(keys::VOLUME).as_deref().unwrap_or("?"),
            coordinator.value(keys::MUTE).as_deref().unwrap_or("?"),
            coordinator.value(keys::SOURCE).as_deref().unwrap_or("?"),
        );
    });

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    coordinator.disconnect().await;
    info!("NAD receiver monitor stopped");
    Ok(())
}
