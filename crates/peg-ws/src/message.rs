//! Feed message types.

use chrono::{DateTime, TimeZone, Utc};
use peg_core::{fixed_point_to_decimal, Price};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{WsError, WsResult};

/// Event type carrying oracle price updates.
pub const PRICE_UPDATE_EVENT: &str = "PRICE_UPDATE";

/// Decimals of the fixed-point price on the wire.
pub const PRICE_DECIMALS: u32 = 8;

// ============================================================================
// Outgoing
// ============================================================================

/// Subscription request, one per event type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscribeRequest {
    /// Always "SUBSCRIBE".
    #[serde(rename = "type")]
    pub request_type: String,
    pub event: String,
}

impl SubscribeRequest {
    pub fn new(event: impl Into<String>) -> Self {
        Self {
            request_type: "SUBSCRIBE".to_string(),
            event: event.into(),
        }
    }

    pub fn to_json(&self) -> WsResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// ============================================================================
// Incoming
// ============================================================================

/// Decoded inbound event: a type tag plus the remaining fields.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FeedEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl FeedEvent {
    pub fn new(event_type: impl Into<String>, payload: Value) -> Self {
        let payload = match payload {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            event_type: event_type.into(),
            payload,
        }
    }

    /// Decode a text frame.
    pub fn parse(text: &str) -> WsResult<Self> {
        serde_json::from_str(text).map_err(|e| WsError::ParseError(e.to_string()))
    }
}

/// Price carried by a price update event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceUpdate {
    pub price: Price,
    /// Source timestamp, when the feed provides one.
    pub timestamp: Option<DateTime<Utc>>,
}

impl PriceUpdate {
    /// Decode `price` (fixed-point integer, as number or string) and an
    /// optional `decimals` override and unix-seconds `timestamp`.
    pub fn from_event(event: &FeedEvent) -> WsResult<Self> {
        let raw = event
            .payload
            .get("price")
            .ok_or_else(|| WsError::ParseError("missing price".to_string()))?;
        let raw = fixed_point_integer(raw)?;

        let decimals = match event.payload.get("decimals") {
            Some(v) => v
                .as_u64()
                .and_then(|d| u32::try_from(d).ok())
                .ok_or_else(|| WsError::ParseError(format!("invalid decimals: {v}")))?,
            None => PRICE_DECIMALS,
        };

        let value = fixed_point_to_decimal(raw, decimals)
            .map_err(|e| WsError::ParseError(e.to_string()))?;

        let timestamp = event
            .payload
            .get("timestamp")
            .and_then(Value::as_i64)
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single());

        Ok(Self {
            price: Price::new(value),
            timestamp,
        })
    }
}

fn fixed_point_integer(value: &Value) -> WsResult<i128> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .map(i128::from)
            .or_else(|| n.as_u64().map(i128::from))
            .ok_or_else(|| WsError::ParseError(format!("non-integer price: {n}"))),
        Value::String(s) => s
            .parse::<i128>()
            .map_err(|e| WsError::ParseError(format!("invalid price {s:?}: {e}"))),
        other => Err(WsError::ParseError(format!("unexpected price value: {other}"))),
    }
}
