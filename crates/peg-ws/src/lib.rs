//! WebSocket feed ingestion for the peg stabilization agent.
//!
//! Provides the long-lived feed consumer with:
//! - Fixed-backoff reconnection under a cancellation token
//! - One SUBSCRIBE request per registered event type
//! - Ordered dispatch to handlers, with per-handler error containment

pub mod connection;
pub mod dispatch;
pub mod error;
pub mod message;

pub use connection::{FeedConfig, FeedConnection, FeedState};
pub use dispatch::{EventHandler, HandlerRegistry};
pub use error::{HandlerError, WsError, WsResult};
pub use message::{FeedEvent, PriceUpdate, SubscribeRequest, PRICE_UPDATE_EVENT};

use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Initialize the TLS crypto provider.
/// Must be called before any WebSocket connections are made.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
