//! Cached reflector documents and the odds accessor.

use crate::pricing::{EventOdds, ProviderQuote};
use crate::shared::serde_util::value_as_key;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Immutable view of the reflector cache: event id → `{etag, data}`.
#[derive(Debug, Clone, Default)]
pub struct OddsBook {
    items: Arc<Map<String, Value>>,
}

impl OddsBook {
    pub fn new(items: Map<String, Value>) -> Self {
        Self {
            items: Arc::new(items),
        }
    }

    /// Build from a JSON object; anything else is an empty book.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(items) => Self::new(items),
            _ => Self::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Version tokens of every cached item, as the poll request body.
    pub fn etags(&self) -> Map<String, Value> {
        self.items
            .values()
            .filter_map(|item| item.get("etag").and_then(value_as_key))
            .map(|etag| (etag, Value::from(1)))
            .collect()
    }

    /// Shallow-merge a poll response. Returned items replace cached ones
    /// wholesale; items not mentioned are kept.
    pub fn merge(&mut self, items: Map<String, Value>) {
        Arc::make_mut(&mut self.items).extend(items);
    }

    /// Provider odds published for an event, keyed source → market id.
    ///
    /// Quotes that do not parse are dropped individually.
    pub fn get_odds(&self, event_id: &str) -> Option<EventOdds> {
        let reflector = self.items.get(event_id)?.get("data")?.get("reflector")?;
        let sources = reflector.as_object()?;

        let mut odds: EventOdds = HashMap::with_capacity(sources.len());
        for (source, markets) in sources {
            let Some(markets) = markets.as_object() else {
                tracing::debug!(event_id, source = %source, "Odds source is not an object");
                continue;
            };
            let quotes = markets
                .iter()
                .filter_map(|(market_id, quote)| {
                    match serde_json::from_value::<ProviderQuote>(quote.clone()) {
                        Ok(q) => Some((market_id.clone(), q)),
                        Err(e) => {
                            tracing::debug!(event_id, market_id = %market_id, error = %e, "Skipping quote");
                            None
                        }
                    }
                })
                .collect();
            odds.insert(source.clone(), quotes);
        }
        Some(odds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn book() -> OddsBook {
        OddsBook::from_value(json!({
            "ev1": {
                "etag": "abc",
                "data": {"reflector": {
                    "pinnacle": {
                        "10": {"longOdds": "1.9", "shortOdds": 2.0},
                        "11": "garbage"
                    },
                    "broken": 7
                }}
            },
            "ev2": {"etag": 42, "data": {}}
        }))
    }

    #[test]
    fn test_get_odds() {
        let odds = book().get_odds("ev1").unwrap();
        let pinnacle = &odds["pinnacle"];
        assert_eq!(pinnacle.len(), 1);
        assert_eq!(pinnacle["10"], ProviderQuote::two_way(1.9, 2.0));
        assert!(!odds.contains_key("broken"));

        assert!(book().get_odds("ev2").is_none());
        assert!(book().get_odds("missing").is_none());
    }

    #[test]
    fn test_etags() {
        let etags = book().etags();
        assert_eq!(Value::Object(etags), json!({"abc": 1, "42": 1}));
    }

    #[test]
    fn test_merge_replaces_and_keeps() {
        let mut book = book();
        let before = book.clone();
        let Value::Object(update) = json!({"ev2": {"etag": "n", "data": {}}, "ev3": {"etag": "z"}}) else {
            unreachable!()
        };
        book.merge(update);

        assert_eq!(book.len(), 3);
        assert_eq!(before.len(), 2);
        assert_eq!(Value::Object(book.etags()), json!({"abc": 1, "n": 1, "z": 1}));
    }
}
