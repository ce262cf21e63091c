//! Wire types for the `positions` topic.
//!
//! Document shape: `events.{eventId}.matches.{marketId}.tokens.{sym}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Raw per-token position. `pos` is signed wei, usually sent as a string.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PositionEntry {
    pub pos: Value,
    #[serde(rename = "avgPrice")]
    pub avg_price: Value,
}
