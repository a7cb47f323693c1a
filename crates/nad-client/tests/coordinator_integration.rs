//! End-to-end coordinator tests against the simulated receiver.
//!
//! These run the full stack — coordinator, client, framer, mock transport —
//! over an in-memory pipe, exercising the discovery sequence, command
//! round-trips, push fan-out, and the reconnect-then-refresh flow.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use nad_client::coordinator::{keys, PowerState, ReceiverCoordinator};
use nad_client::error::ClientError;
use nad_client::transport::MockTransport;
use nad_protocol::Operator;

/// Polls `condition` until it holds or the deadline passes.
async fn wait_until(condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within deadline"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// A mock pre-loaded like a T778 with two sources configured.  All twelve
/// slots answer their `Enabled` probe so discovery never waits out a
/// timeout.
fn configured_receiver() -> MockTransport {
    let values = [
        ("Main.Model", "T778"),
        ("Main.Version", "V2.18"),
        ("Main.Power", "On"),
        ("Main.Volume", "-45"),
        ("Main.Mute", "Off"),
        ("Main.Source", "1"),
        ("Source1.Name", "Stream"),
        ("Source3.Name", "TV"),
    ];
    let enabled: Vec<(String, &str)> = (1u8..=12)
        .map(|slot| {
            let state = if slot == 1 || slot == 3 { "Yes" } else { "No" };
            (format!("Source{slot}.Enabled"), state)
        })
        .collect();

    let mock = MockTransport::new();
    for (key, value) in values {
        mock.set_value(key, value);
    }
    for (key, value) in &enabled {
        mock.set_value(key, value);
    }
    mock
}

#[tokio::test]
async fn test_connect_discovers_model_version_sources_and_state() {
    // Arrange
    let mock = configured_receiver();
    let coordinator = ReceiverCoordinator::new(Arc::new(mock.clone()));

    // Act
    coordinator.connect().await.expect("setup");

    // Assert
    assert_eq!(coordinator.model().as_deref(), Some("T778"));
    assert_eq!(coordinator.version().as_deref(), Some("V2.18"));

    let sources = coordinator.sources();
    assert_eq!(sources.len(), 2, "only enabled slots with names survive");
    assert_eq!(sources.get(&1).map(String::as_str), Some("Stream"));
    assert_eq!(sources.get(&3).map(String::as_str), Some("TV"));

    assert_eq!(coordinator.power_state(), PowerState::On);
    assert_eq!(coordinator.value(keys::VOLUME).as_deref(), Some("-45"));
    assert_eq!(coordinator.value(keys::MUTE).as_deref(), Some("Off"));
}

#[tokio::test]
async fn test_enabled_slot_without_name_is_omitted() {
    // Slot 2 claims Enabled=Yes but has no Name key at all.
    let mock = configured_receiver();
    mock.set_value("Source2.Enabled", "Yes");
    let coordinator = ReceiverCoordinator::new(Arc::new(mock.clone()));

    coordinator.connect().await.expect("setup");

    assert!(!coordinator.sources().contains_key(&2));
}

#[tokio::test]
async fn test_set_command_returns_updated_value() {
    let mock = configured_receiver();
    let coordinator = ReceiverCoordinator::new(Arc::new(mock.clone()));
    coordinator.connect().await.expect("setup");

    let result = coordinator
        .send_command(keys::VOLUME, Operator::Set, Some("-30".to_string()))
        .await;

    assert_eq!(result.as_deref(), Some("-30"));
    assert_eq!(coordinator.value(keys::VOLUME).as_deref(), Some("-30"));
    assert!(mock
        .received_commands()
        .contains(&"Main.Volume=-30".to_string()));
}

#[tokio::test]
async fn test_increment_command_steps_and_reports_new_value() {
    let mock = configured_receiver();
    let coordinator = ReceiverCoordinator::new(Arc::new(mock.clone()));
    coordinator.connect().await.expect("setup");

    let result = coordinator
        .send_command(keys::VOLUME, Operator::Increment, None)
        .await;

    assert_eq!(result.as_deref(), Some("-44"));
}

#[tokio::test]
async fn test_unsolicited_push_updates_cache_and_notifies_listener() {
    let mock = configured_receiver();
    let coordinator = ReceiverCoordinator::new(Arc::new(mock.clone()));
    coordinator.connect().await.expect("setup");

    let notifications = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&notifications);
    coordinator.add_listener(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    // Front-panel volume change arrives as a push.
    mock.push(keys::VOLUME, "-20");

    wait_until(|| coordinator.value(keys::VOLUME).as_deref() == Some("-20")).await;
    wait_until(|| notifications.load(Ordering::SeqCst) >= 1).await;
}

#[tokio::test]
async fn test_setup_failure_surfaces_as_error() {
    let mock = MockTransport::new();
    mock.fail_next_opens(1);
    let coordinator = ReceiverCoordinator::new(Arc::new(mock.clone()));

    let result = coordinator.connect().await;

    assert!(matches!(result, Err(ClientError::ConnectFailed { .. })));
    assert!(!coordinator.is_connected());
}

#[tokio::test]
async fn test_command_while_disconnected_reports_unavailable() {
    let mock = configured_receiver();
    let coordinator = ReceiverCoordinator::new(Arc::new(mock.clone()));
    coordinator.connect().await.expect("setup");

    mock.drop_connection();
    wait_until(|| !coordinator.is_connected()).await;
    let commands_before = mock.received_commands().len();

    let result = coordinator
        .send_command(keys::MUTE, Operator::Set, Some("On".to_string()))
        .await;

    assert_eq!(result, None, "unavailable, not an error");
    assert_eq!(
        mock.received_commands().len(),
        commands_before,
        "nothing may be sent while disconnected"
    );
}

#[tokio::test]
async fn test_reconnect_refreshes_state_and_commands_work_again() {
    let mock = configured_receiver();
    let coordinator = ReceiverCoordinator::new(Arc::new(mock.clone()));
    coordinator.connect().await.expect("setup");
    assert_eq!(mock.open_count(), 1);

    // The receiver closes the link; state changes while we are away.
    mock.drop_connection();
    mock.set_value(keys::VOLUME, "-10");
    mock.set_value(keys::SOURCE, "3");
    wait_until(|| !coordinator.is_connected()).await;

    assert!(coordinator.client().reconnect().await);
    assert_eq!(mock.open_count(), 2);
    assert!(coordinator.is_connected());

    // The post-reconnect refresh picks up the missed changes.  Waiting on
    // the last refreshed key also means the refresh queries are done and
    // cannot race the command below.
    wait_until(|| coordinator.value(keys::VOLUME).as_deref() == Some("-10")).await;
    wait_until(|| coordinator.value(keys::SOURCE).as_deref() == Some("3")).await;

    // And commands flow over the new connection.
    let result = coordinator
        .send_command(keys::MUTE, Operator::Set, Some("On".to_string()))
        .await;
    assert_eq!(result.as_deref(), Some("On"));
}

#[tokio::test]
async fn test_disconnect_keeps_cache_readable() {
    let mock = configured_receiver();
    let coordinator = ReceiverCoordinator::new(Arc::new(mock.clone()));
    coordinator.connect().await.expect("setup");

    coordinator.disconnect().await;

    assert!(!coordinator.is_connected());
    assert_eq!(coordinator.model().as_deref(), Some("T778"));
    assert_eq!(coordinator.value(keys::VOLUME).as_deref(), Some("-45"));
}
