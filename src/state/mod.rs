//! Local mirror of exchange state.
//!
//! Every topic is held as an immutable [`Snapshot`]. Patch batches produce a
//! new snapshot; when nothing actually changed the old one is kept, so
//! [`ExchangeState::apply`] can report whether downstream work is needed.

pub mod patch;
pub mod snapshot;

pub use patch::{parse_batch, PatchKind, PatchOp};
pub use snapshot::Snapshot;

use crate::domain::event::wire::EventRecord;
use crate::domain::{Event, Position, TokenRegistry};
use crate::error::PatchError;
use crate::shared::amount::value_as_wei;
use crate::shared::{EventId, MarketId};
use crate::ws::TopicSpec;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Identifies the snapshot a subscription writes into.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TopicKey {
    Account(String),
    Positions(String),
    OrderFills(String),
    Events,
    GasPrices,
}

impl From<&TopicSpec> for TopicKey {
    fn from(spec: &TopicSpec) -> Self {
        match spec {
            TopicSpec::Account { addr } => TopicKey::Account(addr.clone()),
            TopicSpec::Positions { addr } => TopicKey::Positions(addr.clone()),
            TopicSpec::OrderFills { maker } => TopicKey::OrderFills(maker.clone()),
            TopicSpec::Events => TopicKey::Events,
            TopicSpec::GasPrices => TopicKey::GasPrices,
        }
    }
}

/// All synchronized state. Cheap to clone: every field is shared.
#[derive(Debug, Clone, Default)]
pub struct ExchangeState {
    config: Option<Arc<Value>>,
    tokens: Arc<TokenRegistry>,
    topics: HashMap<TopicKey, Snapshot>,
}

impl ExchangeState {
    /// Store the server configuration from a hello response and rebuild the
    /// token index.
    pub fn set_config(&mut self, config: Value) {
        self.tokens = Arc::new(TokenRegistry::from_config(&config));
        self.config = Some(Arc::new(config));
    }

    /// Apply one patch batch to a topic.
    ///
    /// Returns `true` when the topic's snapshot was replaced. On error the
    /// stored snapshot is left as it was.
    pub fn apply(&mut self, key: &TopicKey, ops: &[PatchOp]) -> Result<bool, PatchError> {
        let current = self.topics.get(key).cloned().unwrap_or_default();
        let next = current.apply(ops)?;

        if next.same(&current) {
            return Ok(false);
        }

        self.topics.insert(key.clone(), next);
        Ok(true)
    }

    /// Forget everything. Used on disconnect.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn has_config(&self) -> bool {
        self.config.is_some()
    }

    pub fn config(&self) -> Option<&Value> {
        self.config.as_deref()
    }

    pub fn tokens(&self) -> &TokenRegistry {
        &self.tokens
    }

    pub fn snapshot(&self, key: &TopicKey) -> Option<&Snapshot> {
        self.topics.get(key)
    }

    pub fn account(&self, addr: &str) -> Option<&Value> {
        self.value(&TopicKey::Account(addr.to_string()))
    }

    pub fn has_positions(&self, addr: &str) -> bool {
        self.value(&TopicKey::Positions(addr.to_string())).is_some()
    }

    pub fn has_order_fills(&self, addr: &str) -> bool {
        self.value(&TopicKey::OrderFills(addr.to_string())).is_some()
    }

    pub fn gas_prices(&self) -> Option<&Value> {
        self.value(&TopicKey::GasPrices)
    }

    /// Decoded events from `recs`. Records that fail validation are logged
    /// and left out.
    pub fn events(&self) -> Vec<Event> {
        let Some(recs) = self
            .value(&TopicKey::Events)
            .and_then(|doc| doc.get("recs"))
            .and_then(Value::as_object)
        else {
            return Vec::new();
        };

        recs.iter()
            .filter_map(|(key, raw)| {
                let record = serde_json::from_value::<EventRecord>(raw.clone())
                    .map_err(|e| tracing::warn!(event_id = %key, error = %e, "Malformed event record"))
                    .ok()?;
                Event::try_from((key.clone(), record))
                    .map_err(|e| tracing::warn!(event_id = %key, error = %e, "Skipping event"))
                    .ok()
            })
            .collect()
    }

    /// Position held by `addr` on a market, in the given token symbol.
    pub fn position(
        &self,
        addr: &str,
        event: &EventId,
        market: &MarketId,
        sym: &str,
    ) -> Option<Position> {
        let doc = self.value(&TopicKey::Positions(addr.to_string()))?;
        Position::lookup(doc, event, market, sym)
    }

    /// Cumulative filled wei for an order identity. Zero when unknown.
    pub fn fill_amount(&self, addr: &str, fill_hash: &str) -> i128 {
        self.value(&TopicKey::OrderFills(addr.to_string()))
            .and_then(|doc| doc.get("recs"))
            .and_then(|recs| recs.get(fill_hash))
            .and_then(value_as_wei)
            .unwrap_or(0)
    }

    fn value(&self, key: &TopicKey) -> Option<&Value> {
        self.topics
            .get(key)
            .map(Snapshot::value)
            .filter(|v| !v.is_null())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ops(v: Value) -> Vec<PatchOp> {
        parse_batch(v).unwrap()
    }

    #[test]
    fn test_apply_reports_changes_only() {
        let mut state = ExchangeState::default();
        let key = TopicKey::Events;

        assert!(state
            .apply(&key, &ops(json!([{"op": "replace", "path": "", "value": {"recs": {}}}])))
            .unwrap());
        assert!(!state
            .apply(&key, &ops(json!([{"op": "replace", "path": "/recs", "value": {}}])))
            .unwrap());
        assert!(state
            .apply(
                &key,
                &ops(json!([{"op": "add", "path": "/recs/1", "value": {"event": {"kickoff": 5}}}]))
            )
            .unwrap());
        assert_eq!(state.events().len(), 1);
    }

    #[test]
    fn test_failed_patch_keeps_snapshot() {
        let mut state = ExchangeState::default();
        let key = TopicKey::GasPrices;
        state
            .apply(&key, &ops(json!([{"op": "replace", "path": "", "value": {"fast": 1}}])))
            .unwrap();
        let before = state.snapshot(&key).cloned().unwrap();

        assert!(state
            .apply(&key, &ops(json!([{"op": "add", "path": "/a/b", "value": 1}])))
            .is_err());
        assert!(state.snapshot(&key).unwrap().same(&before));
        assert_eq!(state.gas_prices(), Some(&json!({"fast": 1})));
    }

    #[test]
    fn test_config_and_reset() {
        let mut state = ExchangeState::default();
        state.set_config(json!({"tokens": {"ETH": {"addr": "0xAA"}}}));
        state
            .apply(
                &TopicKey::Positions("0x1".into()),
                &ops(json!([{"op": "replace", "path": "", "value": {"events": {}}}])),
            )
            .unwrap();

        assert!(state.has_config());
        assert!(state.tokens().get("0xaa").is_some());
        assert!(state.has_positions("0x1"));
        assert!(!state.has_order_fills("0x1"));

        state.reset();
        assert!(!state.has_config());
        assert!(!state.has_positions("0x1"));
        assert!(state.tokens().is_empty());
    }

    #[test]
    fn test_fill_amount() {
        let mut state = ExchangeState::default();
        state
            .apply(
                &TopicKey::OrderFills("0x1".into()),
                &ops(json!([{"op": "replace", "path": "", "value": {"recs": {"0xfh": "250"}}}])),
            )
            .unwrap();
        assert_eq!(state.fill_amount("0x1", "0xfh"), 250);
        assert_eq!(state.fill_amount("0x1", "0xother"), 0);
        assert_eq!(state.fill_amount("0x2", "0xfh"), 0);
    }

    #[test]
    fn test_topic_key_from_spec() {
        let spec = TopicSpec::OrderFills { maker: "0xm".into() };
        assert_eq!(TopicKey::from(&spec), TopicKey::OrderFills("0xm".into()));
        assert_eq!(TopicKey::from(&TopicSpec::Events), TopicKey::Events);
    }
}
