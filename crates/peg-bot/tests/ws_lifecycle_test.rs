//! Feed lifecycle integration tests.
//!
//! Tests the connection lifecycle:
//! - One SUBSCRIBE per registered event type
//! - Dispatch of pushed events
//! - Reconnection after a server-side close
//! - Shutdown

mod integration;
use integration::common::mock_ws::MockWsServer;

use parking_lot::Mutex;
use peg_core::BoxFuture;
use peg_ws::{EventHandler, FeedConfig, FeedConnection, FeedEvent, FeedState, HandlerError, HandlerRegistry};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct RecordingHandler {
    events: Mutex<Vec<FeedEvent>>,
}

impl RecordingHandler {
    fn events(&self) -> Vec<FeedEvent> {
        self.events.lock().clone()
    }
}

impl EventHandler for RecordingHandler {
    fn handle(&self, event: FeedEvent) -> BoxFuture<'_, Result<(), HandlerError>> {
        Box::pin(async move {
            self.events.lock().push(event);
            Ok(())
        })
    }
}

fn feed(server: &MockWsServer, registry: HandlerRegistry, token: CancellationToken) -> Arc<FeedConnection> {
    let config = FeedConfig {
        url: server.url(),
        api_key: None,
        reconnect_delay_ms: 50,
    };
    Arc::new(FeedConnection::new(config, registry, token))
}

async fn wait_until<F: Fn() -> bool>(condition: F) -> bool {
    timeout(Duration::from_secs(3), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .is_ok()
}

/// Each registered event type gets its own SUBSCRIBE request.
#[tokio::test]
async fn test_feed_subscribes_per_event_type() {
    let server = MockWsServer::start().await;
    let handler = Arc::new(RecordingHandler::default());
    let mut registry = HandlerRegistry::new();
    registry.register("PRICE_UPDATE", handler.clone());
    registry.register("VOLUME_UPDATE", handler.clone());

    let token = CancellationToken::new();
    let connection = feed(&server, registry, token.clone());
    let runner = connection.clone();
    let handle = tokio::spawn(async move { runner.run().await });

    let messages = server.wait_for_messages(2, Duration::from_secs(3)).await;
    assert_eq!(messages.len(), 2);

    let mut events: Vec<String> = messages
        .iter()
        .map(|m| {
            let v: serde_json::Value = serde_json::from_str(m).unwrap();
            assert_eq!(v["type"], "SUBSCRIBE");
            v["event"].as_str().unwrap().to_string()
        })
        .collect();
    events.sort();
    assert_eq!(events, vec!["PRICE_UPDATE", "VOLUME_UPDATE"]);
    assert!(wait_until(|| connection.state() == FeedState::Subscribed).await);

    token.cancel();
    handle.await.unwrap().unwrap();
    server.shutdown().await;
}

/// Registered events reach their handler; other frames are skipped.
#[tokio::test]
async fn test_pushed_events_are_dispatched() {
    let server = MockWsServer::start().await;
    let handler = Arc::new(RecordingHandler::default());
    let mut registry = HandlerRegistry::new();
    registry.register("PRICE_UPDATE", handler.clone());

    let token = CancellationToken::new();
    let connection = feed(&server, registry, token.clone());
    let runner = connection.clone();
    let handle = tokio::spawn(async move { runner.run().await });

    server.wait_for_messages(1, Duration::from_secs(3)).await;
    server.push("not json");
    server.push(r#"{"type":"HEARTBEAT"}"#);
    server.push(r#"{"type":"PRICE_UPDATE","price":"99500000"}"#);

    assert!(wait_until(|| !handler.events().is_empty()).await);
    let events = handler.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, "PRICE_UPDATE");
    assert_eq!(events[0].payload["price"], "99500000");

    token.cancel();
    handle.await.unwrap().unwrap();
    server.shutdown().await;
}

/// A server-side close triggers a reconnect and a fresh subscription.
#[tokio::test]
async fn test_feed_reconnects_after_close() {
    let server = MockWsServer::start().await;
    let handler = Arc::new(RecordingHandler::default());
    let mut registry = HandlerRegistry::new();
    registry.register("PRICE_UPDATE", handler);

    let token = CancellationToken::new();
    let connection = feed(&server, registry, token.clone());
    let runner = connection.clone();
    let handle = tokio::spawn(async move { runner.run().await });

    server.wait_for_messages(1, Duration::from_secs(3)).await;
    server.drop_connections();

    let messages = server.wait_for_messages(2, Duration::from_secs(3)).await;
    assert_eq!(messages.len(), 2, "should resubscribe after reconnect");
    assert_eq!(server.connection_count().await, 2);
    assert!(wait_until(|| connection.state() == FeedState::Subscribed).await);
    assert_eq!(connection.reconnect_count(), 0);

    token.cancel();
    handle.await.unwrap().unwrap();
    server.shutdown().await;
}

/// Cancelling the token ends `run` promptly even while disconnected.
#[tokio::test]
async fn test_shutdown_during_backoff() {
    let server = MockWsServer::start().await;
    let url = server.url();
    server.shutdown().await;

    let config = FeedConfig {
        url,
        api_key: None,
        reconnect_delay_ms: 60_000,
    };
    let token = CancellationToken::new();
    let connection = Arc::new(FeedConnection::new(config, HandlerRegistry::new(), token.clone()));
    let runner = connection.clone();
    let handle = tokio::spawn(async move { runner.run().await });

    tokio::time::sleep(Duration::from_millis(100)).await;
    token.cancel();

    let result = timeout(Duration::from_secs(2), handle).await;
    assert!(result.is_ok(), "run should return after cancel");
    assert_eq!(connection.state(), FeedState::Disconnected);
}
