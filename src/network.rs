//! Network constants for the Degens exchange.

/// Default orderbook WebSocket URL.
pub const DEFAULT_WS_URL: &str = "wss://degens.com/ws";

/// Mainnet exchange contract that orders are signed against.
pub const DEFAULT_CONTRACT_ADDR: &str = "0x8888888883585b9a8202Db34D8b09d7252bfc61C";
