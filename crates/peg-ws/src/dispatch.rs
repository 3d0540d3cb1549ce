//! Event handler registration and dispatch.

use std::sync::Arc;

use peg_core::BoxFuture;
use tracing::{trace, warn};

use crate::error::HandlerError;
use crate::message::FeedEvent;

/// Consumer of feed events.
///
/// Implementations should return quickly; long-running work belongs in a
/// spawned task so the feed keeps its arrival order without stalling.
pub trait EventHandler: Send + Sync {
    fn handle(&self, event: FeedEvent) -> BoxFuture<'_, Result<(), HandlerError>>;
}

/// Handlers keyed by event type, kept in registration order.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: Vec<(String, Arc<dyn EventHandler>)>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, event_type: impl Into<String>, handler: Arc<dyn EventHandler>) {
        self.handlers.push((event_type.into(), handler));
    }

    /// Distinct event types, in first-registration order.
    pub fn event_types(&self) -> Vec<String> {
        let mut types: Vec<String> = Vec::new();
        for (event_type, _) in &self.handlers {
            if !types.contains(event_type) {
                types.push(event_type.clone());
            }
        }
        types
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Run every handler registered for the event's type, in order.
    ///
    /// Returns the number of handlers that failed. Failures are logged and
    /// never stop the remaining handlers.
    pub async fn dispatch(&self, event: &FeedEvent) -> usize {
        let mut failures = 0;
        let mut matched = 0;
        for (event_type, handler) in &self.handlers {
            if event_type != &event.event_type {
                continue;
            }
            matched += 1;
            if let Err(e) = handler.handle(event.clone()).await {
                failures += 1;
                warn!(event_type = %event.event_type, error = %e, "Event handler failed");
            }
        }
        if matched == 0 {
            trace!(event_type = %event.event_type, "No handler registered for event");
        }
        failures
    }
}
