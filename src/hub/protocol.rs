use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Frames a driver sends over its websocket, as `{"type": ..., "payload": ...}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InboundMessage {
    LocationUpdate { lat: f64, lng: f64 },
    OrderResponse { order_id: Uuid, action: ResponseAction },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseAction {
    Accept,
    Reject,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
}

pub fn decode_inbound(text: &str) -> Result<InboundMessage, ProtocolError> {
    Ok(serde_json::from_str(text)?)
}

/// Server-pushed events, tagged by `event`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboundEvent {
    OrderAssigned {
        order_id: Uuid,
        lat: f64,
        lng: f64,
    },
    Error {
        order_id: Option<Uuid>,
        message: String,
    },
    ServerShutdown,
}

impl OutboundEvent {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
