//! Wire-protocol layer: frames, subscriptions, backoff, and the client.
//!
//! The exchange speaks a line-oriented text protocol over one WebSocket:
//! every frame is `opcode|id|body`. Requests and subscriptions share the id
//! space, so a single pending table correlates both.

pub mod backoff;
pub mod frame;
pub mod native;
pub mod subscriptions;

pub use backoff::Backoff;
pub use frame::{InboundFrame, Op, ResponseKind};
pub use native::{Subscription, WsClient};
pub use subscriptions::{SubscriptionRegistry, TopicSpec};

use crate::error::WsError;

/// Result delivered to a request or subscription owner.
pub type Delivery = Result<serde_json::Value, WsError>;

// ─── WsEvent ─────────────────────────────────────────────────────────────────

/// Connection lifecycle events emitted by the WS client to the consumer.
#[derive(Debug, Clone)]
pub enum WsEvent {
    /// Handshake accepted. Carries the server's hello response.
    Connected(serde_json::Value),
    /// Transport lost. A reconnect is scheduled unless the client shut down.
    Disconnected { code: Option<u16>, reason: String },
    /// A transport or protocol error that did not end the connection.
    Error(String),
}

// ─── ReadyState ──────────────────────────────────────────────────────────────

/// Coarse connection state, readable from any thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ReadyState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl From<u16> for ReadyState {
    fn from(v: u16) -> Self {
        match v {
            0 => ReadyState::Connecting,
            1 => ReadyState::Open,
            2 => ReadyState::Closing,
            _ => ReadyState::Closed,
        }
    }
}

// ─── WsConfig ────────────────────────────────────────────────────────────────

/// Configuration for the WS client.
#[derive(Debug, Clone)]
pub struct WsConfig {
    pub url: String,
    /// Client version sent in the `hello` handshake.
    pub version: String,
    pub ping_interval_ms: u64,
    pub initial_reconnect_delay_ms: u64,
    pub max_reconnect_delay_ms: u64,
    /// Default deadline for [`WsClient::request`].
    pub request_timeout_ms: u64,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            url: crate::network::DEFAULT_WS_URL.to_string(),
            version: concat!("degens-mm ", env!("CARGO_PKG_VERSION")).to_string(),
            ping_interval_ms: 55_000,
            initial_reconnect_delay_ms: 500,
            max_reconnect_delay_ms: 8_000,
            request_timeout_ms: 5_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_state_roundtrip() {
        for state in [
            ReadyState::Connecting,
            ReadyState::Open,
            ReadyState::Closing,
            ReadyState::Closed,
        ] {
            assert_eq!(ReadyState::from(state as u16), state);
        }
        assert_eq!(ReadyState::from(99), ReadyState::Closed);
    }
}
