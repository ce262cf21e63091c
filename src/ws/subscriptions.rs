//! Topic specs and the replay registry.

use crate::shared::RequestId;
use serde::{Deserialize, Serialize};

/// Topic document sent as the body of a `sub` frame.
///
/// Wire format uses `#[serde(tag = "to")]`, e.g. `{"to":"positions","addr":"0x.."}`.
#[derive(Debug, Clone, Serialize, Deserialize, Hash, Eq, PartialEq)]
#[serde(tag = "to")]
pub enum TopicSpec {
    #[serde(rename = "account")]
    Account { addr: String },
    #[serde(rename = "positions")]
    Positions { addr: String },
    #[serde(rename = "orderFills")]
    OrderFills { maker: String },
    #[serde(rename = "events")]
    Events,
    #[serde(rename = "gasPrices")]
    GasPrices,
}

impl TopicSpec {
    /// Topic name as it appears in the `to` field.
    pub fn topic(&self) -> &'static str {
        match self {
            TopicSpec::Account { .. } => "account",
            TopicSpec::Positions { .. } => "positions",
            TopicSpec::OrderFills { .. } => "orderFills",
            TopicSpec::Events => "events",
            TopicSpec::GasPrices => "gasPrices",
        }
    }

    pub fn to_body(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Active subscriptions keyed by the id they were opened under.
///
/// Entries survive disconnects and are replayed in registration order with
/// their original ids; only an explicit unsubscribe removes them.
#[derive(Debug, Default, Clone)]
pub struct SubscriptionRegistry {
    entries: Vec<(RequestId, TopicSpec)>,
}

impl SubscriptionRegistry {
    pub fn insert(&mut self, id: RequestId, spec: TopicSpec) {
        match self.entries.iter_mut().find(|(existing, _)| *existing == id) {
            Some(entry) => entry.1 = spec,
            None => {
                tracing::debug!(id = %id, topic = spec.topic(), "Tracking subscription");
                self.entries.push((id, spec));
            }
        }
    }

    pub fn remove(&mut self, id: &RequestId) -> Option<TopicSpec> {
        let idx = self.entries.iter().position(|(existing, _)| existing == id)?;
        Some(self.entries.remove(idx).1)
    }

    pub fn contains(&self, id: &RequestId) -> bool {
        self.entries.iter().any(|(existing, _)| existing == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(RequestId, TopicSpec)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_topic_spec_wire_format() {
        let spec = TopicSpec::OrderFills {
            maker: "0xabc".into(),
        };
        assert_eq!(
            serde_json::to_value(&spec).unwrap(),
            json!({"to": "orderFills", "maker": "0xabc"})
        );
        assert_eq!(TopicSpec::Events.to_body(), json!({"to": "events"}));
        assert_eq!(TopicSpec::GasPrices.to_body(), json!({"to": "gasPrices"}));
    }

    #[test]
    fn test_topic_spec_deserialize() {
        let spec: TopicSpec =
            serde_json::from_value(json!({"to": "positions", "addr": "0x1"})).unwrap();
        assert_eq!(spec, TopicSpec::Positions { addr: "0x1".into() });
        assert_eq!(spec.topic(), "positions");
    }

    #[test]
    fn test_registry_keeps_order_and_replaces_by_id() {
        let mut reg = SubscriptionRegistry::default();
        reg.insert(RequestId::new("10"), TopicSpec::Events);
        reg.insert(RequestId::new("2"), TopicSpec::GasPrices);
        reg.insert(
            RequestId::new("10"),
            TopicSpec::Account { addr: "0x1".into() },
        );

        let ids: Vec<&str> = reg.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["10", "2"]);
        assert_eq!(reg.len(), 2);
        assert!(matches!(reg.iter().next(), Some((_, TopicSpec::Account { .. }))));
    }

    #[test]
    fn test_registry_remove() {
        let mut reg = SubscriptionRegistry::default();
        reg.insert(RequestId::new("1"), TopicSpec::Events);
        assert_eq!(reg.remove(&RequestId::new("1")), Some(TopicSpec::Events));
        assert_eq!(reg.remove(&RequestId::new("1")), None);
        assert!(reg.is_empty());
    }
}
