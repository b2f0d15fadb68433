//! Connection lifecycle tests against the in-memory broker.
//!
//! Time is paused, so reconnect delays elapse instantly while timestamps stay exact.

mod common;

use std::time::Duration;

use common::*;
use storefront_notifications::config::{BROADCAST_DESTINATION, PRIVATE_DESTINATION};
use storefront_notifications::stomp_codec::Command;
use storefront_notifications::{ConnectionState, CredentialProvider};
use tokio::time::Instant;

const RECONNECT_DELAY: Duration = Duration::from_millis(5000);

#[tokio::test(start_paused = true)]
async fn test_connect_subscribes_both_channels_once() {
    let server = MockServer::new();
    let service = service(&server);
    let creds = credentials();
    let mut state = service.watch_state();

    service.start(creds.clone());
    wait_for_state(&mut state, ConnectionState::Connected).await;

    let connects = server.received(Command::Connect);
    assert_eq!(connects.len(), 1);
    assert_eq!(connects[0].header("Authorization"), Some("Bearer token-1"));
    assert_eq!(connects[0].header("host"), Some("localhost"));

    let mut destinations = server.subscribed_destinations();
    destinations.sort();
    assert_eq!(destinations, [BROADCAST_DESTINATION, PRIVATE_DESTINATION]);

    // Second start while connected is a no-op.
    service.start(creds);
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(server.opens(), 1);
    assert_eq!(server.received(Command::Subscribe).len(), 2);
    assert_eq!(service.connection_state(), ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_not_authenticated_never_connects() {
    let server = MockServer::new();
    let service = service(&server);
    let creds = credentials();
    creds.logout();
    assert!(!creds.is_authenticated());

    service.start(creds);
    tokio::time::sleep(Duration::from_secs(30)).await;

    assert_eq!(server.opens(), 0);
    assert_eq!(service.connection_state(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_reconnects_after_unexpected_close() {
    let server = MockServer::new();
    let service = service(&server);
    let mut state = service.watch_state();

    service.start(credentials());
    wait_for_state(&mut state, ConnectionState::Connected).await;

    let dropped_at = Instant::now();
    server.drop_connections();
    wait_until(|| service.connection_state() == ConnectionState::Disconnected).await;
    assert_eq!(server.opens(), 1);

    wait_for_state(&mut state, ConnectionState::Connected).await;
    assert!(dropped_at.elapsed() >= RECONNECT_DELAY);
    assert_eq!(server.opens(), 2);
    assert_eq!(server.received(Command::Subscribe).len(), 4);
    assert_eq!(server.subscribed_destinations().len(), 2);
    assert_eq!(server.max_live_sessions(), 1);

    // Messages flow on the new session.
    assert_eq!(
        server.deliver(PRIVATE_DESTINATION, &payload(Some("n-1"), "ORDER_CREATED", "hi")),
        1
    );
    wait_until(|| service.notifications().len() == 1).await;
}

#[tokio::test(start_paused = true)]
async fn test_failed_opens_retry_until_connected() {
    let server = MockServer::new();
    server.fail_next_opens(2);
    let service = service(&server);
    let mut transitions = service.subscribe_transitions();
    let mut state = service.watch_state();

    let started = Instant::now();
    service.start(credentials());
    wait_for_state(&mut state, ConnectionState::Connected).await;

    assert_eq!(server.opens(), 3);
    assert!(started.elapsed() >= RECONNECT_DELAY * 2);
    assert_eq!(server.max_live_sessions(), 1);

    let mut seen = Vec::new();
    while let Ok(t) = transitions.try_recv() {
        seen.push(t.to);
    }
    assert_eq!(
        seen,
        [
            ConnectionState::Connecting,
            ConnectionState::Error,
            ConnectionState::Connecting,
            ConnectionState::Error,
            ConnectionState::Connecting,
            ConnectionState::Connected,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_rejected_credential_retries_with_refreshed_token() {
    let server = MockServer::new();
    let service = service(&server);
    let creds = credentials();
    creds.set_token("stale");
    let mut state = service.watch_state();

    service.start(creds.clone());
    wait_for_state(&mut state, ConnectionState::Error).await;
    assert_eq!(server.live_sessions(), 0);

    // The provider is asked again on the next attempt.
    creds.set_token(TOKEN);
    wait_for_state(&mut state, ConnectionState::Connected).await;
    assert_eq!(server.opens(), 2);

    let connects = server.received(Command::Connect);
    assert_eq!(connects[0].header("Authorization"), Some("Bearer stale"));
    assert_eq!(connects[1].header("Authorization"), Some("Bearer token-1"));
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_cancels_pending_reconnect() {
    let server = MockServer::new();
    let service = service(&server);
    let mut state = service.watch_state();

    service.start(credentials());
    wait_for_state(&mut state, ConnectionState::Connected).await;

    server.drop_connections();
    wait_until(|| service.connection_state() == ConnectionState::Disconnected).await;

    service.shutdown().await;
    tokio::time::sleep(RECONNECT_DELAY * 10).await;

    assert_eq!(server.opens(), 1);
    assert_eq!(service.connection_state(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_closes_session_and_clears_store() {
    let server = MockServer::new();
    let service = service(&server);
    let mut state = service.watch_state();

    service.start(credentials());
    wait_for_state(&mut state, ConnectionState::Connected).await;
    server.deliver(BROADCAST_DESTINATION, &payload(Some("b-1"), "ORDER_CREATED", "x"));
    wait_until(|| service.unread_count() == 1).await;

    service.shutdown().await;

    assert_eq!(service.connection_state(), ConnectionState::Disconnected);
    assert_eq!(server.live_sessions(), 0);
    assert_eq!(server.received(Command::Unsubscribe).len(), 2);
    assert_eq!(server.received(Command::Disconnect).len(), 1);
    assert!(service.notifications().is_empty());
    assert_eq!(service.unread_count(), 0);

    tokio::time::sleep(RECONNECT_DELAY * 4).await;
    assert_eq!(server.opens(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_logout_during_backoff_stops_retrying() {
    let server = MockServer::new();
    let service = service(&server);
    let creds = credentials();
    let mut state = service.watch_state();

    service.start(creds.clone());
    wait_for_state(&mut state, ConnectionState::Connected).await;
    server.deliver(PRIVATE_DESTINATION, &payload(Some("p-1"), "PAYMENT_SUCCESS", "paid"));
    wait_until(|| service.unread_count() == 1).await;

    server.drop_connections();
    wait_until(|| service.connection_state() == ConnectionState::Disconnected).await;
    // Still signed in: records survive the dropped connection.
    assert_eq!(service.notifications().len(), 1);
    creds.logout();

    tokio::time::sleep(RECONNECT_DELAY * 4).await;
    assert_eq!(server.opens(), 1);
    assert_eq!(service.connection_state(), ConnectionState::Disconnected);
    assert!(service.notifications().is_empty());
    assert_eq!(service.unread_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_authentication_lost_disconnects() {
    let server = MockServer::new();
    let service = service(&server);
    let mut state = service.watch_state();

    service.start(credentials());
    wait_for_state(&mut state, ConnectionState::Connected).await;
    server.deliver(BROADCAST_DESTINATION, &payload(Some("b-1"), "ORDER_CREATED", "x"));
    wait_until(|| service.unread_count() == 1).await;

    service.authentication_lost();
    wait_until(|| server.live_sessions() == 0).await;
    assert_eq!(service.connection_state(), ConnectionState::Disconnected);
    assert!(service.notifications().is_empty());
    assert_eq!(service.unread_count(), 0);

    tokio::time::sleep(RECONNECT_DELAY * 4).await;
    assert_eq!(server.opens(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_repeated_drops_keep_one_session() {
    let server = MockServer::new();
    let service = service(&server);
    let mut state = service.watch_state();

    service.start(credentials());
    for round in 1..=4 {
        wait_for_state(&mut state, ConnectionState::Connected).await;
        assert_eq!(server.opens(), round);
        server.drop_connections();
        wait_until(|| service.connection_state() != ConnectionState::Connected).await;
    }
    wait_for_state(&mut state, ConnectionState::Connected).await;

    assert_eq!(server.max_live_sessions(), 1);
    assert_eq!(server.live_sessions(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_sends_negotiated_heartbeats() {
    let server = MockServer::new();
    server.advertise_heart_beat("0,4000");
    let service = service(&server);
    let mut state = service.watch_state();

    service.start(credentials());
    wait_for_state(&mut state, ConnectionState::Connected).await;

    // Client offers 10s, server wants 4s: the larger wins.
    tokio::time::sleep(Duration::from_millis(35_000)).await;
    assert_eq!(server.heartbeats(), 3);
}
