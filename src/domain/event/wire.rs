//! Wire types for the `events` topic (`recs.{eventId}`).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// One record under `recs`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventRecord {
    #[serde(rename = "eventId", default)]
    pub event_id: Option<Value>,
    /// Set once the game is live or settled; `null`/absent before kickoff.
    #[serde(default)]
    pub status: Value,
    #[serde(default)]
    pub event: EventInfo,
    #[serde(default)]
    pub markets: BTreeMap<String, MarketRecord>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EventInfo {
    #[serde(default)]
    pub kickoff: Value,
    #[serde(default)]
    pub sport: Option<String>,
    #[serde(default)]
    pub league: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarketRecord {
    pub info: MarketInfo,
    /// Resting orders, keyed by order id (occasionally sent as an array).
    #[serde(default)]
    pub orders: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarketInfo {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub spread: Option<Value>,
    #[serde(default)]
    pub total: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RestingOrderRecord {
    #[serde(default)]
    pub dir: Value,
    pub price: Value,
    #[serde(default)]
    pub amount: Option<Value>,
}
