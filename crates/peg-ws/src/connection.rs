//! Feed connection manager.
//!
//! Maintains one live subscription, reconnects after a fixed backoff and
//! dispatches decoded events to the handler registry in arrival order.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio_tungstenite::{connect_async_tls_with_config, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::dispatch::HandlerRegistry;
use crate::error::{WsError, WsResult};
use crate::message::{FeedEvent, SubscribeRequest};

/// Feed connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// WebSocket URL.
    pub url: String,
    /// API key appended as `apiKey` query parameter. Filled from the environment.
    #[serde(skip)]
    pub api_key: Option<String>,
    /// Fixed delay between reconnection attempts.
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
}

fn default_reconnect_delay_ms() -> u64 {
    5000
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key: None,
            reconnect_delay_ms: default_reconnect_delay_ms(),
        }
    }
}

impl FeedConfig {
    /// URL with the API key attached, if any.
    pub fn endpoint(&self) -> String {
        match &self.api_key {
            Some(key) if !key.is_empty() => {
                let sep = if self.url.contains('?') { '&' } else { '?' };
                format!("{}{}apiKey={}", self.url, sep, key)
            }
            _ => self.url.clone(),
        }
    }
}

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedState {
    Disconnected,
    Connecting,
    Subscribed,
}

/// Long-lived feed consumer.
pub struct FeedConnection {
    config: FeedConfig,
    registry: HandlerRegistry,
    state: Arc<RwLock<FeedState>>,
    reconnect_count: AtomicU32,
    shutdown_token: CancellationToken,
}

impl FeedConnection {
    pub fn new(config: FeedConfig, registry: HandlerRegistry, shutdown_token: CancellationToken) -> Self {
        Self {
            config,
            registry,
            state: Arc::new(RwLock::new(FeedState::Disconnected)),
            reconnect_count: AtomicU32::new(0),
            shutdown_token,
        }
    }

    pub fn state(&self) -> FeedState {
        *self.state.read()
    }

    /// Reconnections since the last successful subscription.
    pub fn reconnect_count(&self) -> u32 {
        self.reconnect_count.load(Ordering::Relaxed)
    }

    /// Signal graceful shutdown.
    pub fn shutdown(&self) {
        info!("FeedConnection shutdown requested");
        self.shutdown_token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    /// Run until shutdown. Transport failures only trigger a reconnect.
    pub async fn run(&self) -> WsResult<()> {
        let delay = Duration::from_millis(self.config.reconnect_delay_ms);

        loop {
            if self.is_shutdown() {
                info!("Shutdown requested, exiting feed loop");
                self.set_state(FeedState::Disconnected);
                return Ok(());
            }

            self.set_state(FeedState::Connecting);

            match self.try_connect().await {
                Ok(()) => info!("Feed connection closed"),
                Err(e) => error!(error = %e, "Feed connection error"),
            }
            self.set_state(FeedState::Disconnected);

            if self.is_shutdown() {
                info!("Shutdown requested after disconnect, not reconnecting");
                return Ok(());
            }

            let attempt = self.reconnect_count.fetch_add(1, Ordering::Relaxed) + 1;
            warn!(attempt, delay_ms = delay.as_millis() as u64, "Reconnecting feed");

            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = self.shutdown_token.cancelled() => {
                    info!("Shutdown requested during backoff, exiting");
                    return Ok(());
                }
            }
        }
    }

    async fn try_connect(&self) -> WsResult<()> {
        info!(url = %self.config.url, "Connecting to feed");

        let connect = connect_async_tls_with_config(self.config.endpoint(), None, true, None);
        let (ws_stream, _response) = tokio::select! {
            result = connect => result?,
            () = self.shutdown_token.cancelled() => return Ok(()),
        };
        let (mut write, mut read) = ws_stream.split();

        let event_types = self.registry.event_types();
        for event_type in &event_types {
            let request = SubscribeRequest::new(event_type.clone()).to_json()?;
            write
                .send(Message::Text(request))
                .await
                .map_err(|e| WsError::SendFailed(e.to_string()))?;
        }

        self.set_state(FeedState::Subscribed);
        self.reconnect_count.store(0, Ordering::Relaxed);
        info!(?event_types, "Feed subscribed");

        loop {
            tokio::select! {
                biased;

                () = self.shutdown_token.cancelled() => {
                    info!("Shutdown signal received in feed loop");
                    if let Err(e) = write.send(Message::Close(None)).await {
                        warn!(error = %e, "Failed to send Close frame during shutdown");
                    }
                    return Ok(());
                }

                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.handle_text_message(&text).await;
                        }
                        Some(Ok(Message::Ping(data))) => {
                            debug!("Received ping, sending pong");
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let (code, reason) = frame
                                .map(|f| (f.code.into(), f.reason.to_string()))
                                .unwrap_or((1000, "Normal close".to_string()));
                            warn!(code, %reason, "Feed closed by server");
                            return Err(WsError::ConnectionClosed { code, reason });
                        }
                        Some(Err(e)) => {
                            error!(error = %e, "Feed read error");
                            return Err(e.into());
                        }
                        None => {
                            warn!("Feed stream ended");
                            return Ok(());
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    async fn handle_text_message(&self, text: &str) {
        let event = match FeedEvent::parse(text) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, raw = %truncate(text, 256), "Skipping undecodable feed message");
                return;
            }
        };
        debug!(event_type = %event.event_type, "Feed event received");
        self.registry.dispatch(&event).await;
    }

    fn set_state(&self, state: FeedState) {
        *self.state.write() = state;
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = FeedConfig::default();
        assert_eq!(config.reconnect_delay_ms, 5000);
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_endpoint_appends_api_key() {
        let mut config = FeedConfig {
            url: "wss://feed.example/v3/polygon".to_string(),
            ..Default::default()
        };
        assert_eq!(config.endpoint(), "wss://feed.example/v3/polygon");

        config.api_key = Some("k".to_string());
        assert_eq!(config.endpoint(), "wss://feed.example/v3/polygon?apiKey=k");

        config.url.push_str("?chain=matic");
        assert_eq!(
            config.endpoint(),
            "wss://feed.example/v3/polygon?chain=matic&apiKey=k"
        );
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("hi", 10), "hi");
    }

    #[tokio::test]
    async fn test_run_exits_when_already_cancelled() {
        let token = CancellationToken::new();
        token.cancel();
        let conn = FeedConnection::new(FeedConfig::default(), HandlerRegistry::new(), token);
        conn.run().await.unwrap();
        assert_eq!(conn.state(), FeedState::Disconnected);
    }

    #[tokio::test]
    async fn test_failed_connect_backs_off_until_shutdown() {
        let token = CancellationToken::new();
        let conn = Arc::new(FeedConnection::new(
            FeedConfig {
                url: "ws://127.0.0.1:1".to_string(),
                reconnect_delay_ms: 10,
                ..Default::default()
            },
            HandlerRegistry::new(),
            token.clone(),
        ));

        let runner = {
            let conn = conn.clone();
            tokio::spawn(async move { conn.run().await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(conn.reconnect_count() >= 1);

        token.cancel();
        runner.await.unwrap().unwrap();
        assert_eq!(conn.state(), FeedState::Disconnected);
    }
}
