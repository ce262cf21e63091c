//! Conversion: EventRecord → Event (TryFrom + validation).

use super::wire::{EventRecord, MarketInfo, MarketRecord, RestingOrderRecord};
use super::{BookOrder, Event, Market, MarketKind, ThreeWayLeg};
use crate::shared::serde_util::{is_truthy, value_as_i64, value_as_key};
use crate::shared::{natural_cmp, EventId, MarketId, MAX_PRICE};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EventValidationError {
    #[error("Event record has no id")]
    MissingId,
    #[error("Unparseable kickoff: {0}")]
    InvalidKickoff(String),
}

impl TryFrom<(String, EventRecord)> for Event {
    type Error = EventValidationError;

    /// The key under `recs` is used when the record omits `eventId`.
    fn try_from((key, source): (String, EventRecord)) -> Result<Self, Self::Error> {
        let id = source
            .event_id
            .as_ref()
            .and_then(value_as_key)
            .or_else(|| (!key.is_empty()).then_some(key))
            .ok_or(EventValidationError::MissingId)?;

        let kickoff = value_as_i64(&source.event.kickoff)
            .ok_or_else(|| EventValidationError::InvalidKickoff(source.event.kickoff.to_string()))?;

        let mut markets: Vec<Market> = source
            .markets
            .into_iter()
            .map(|(market_id, record)| Market::from((MarketId::new(market_id), record)))
            .collect();
        markets.sort_by(|a, b| natural_cmp(a.id.as_str(), b.id.as_str()));

        Ok(Event {
            id: EventId::new(id),
            live: is_truthy(&source.status),
            kickoff,
            sport: source.event.sport.unwrap_or_default(),
            league: source.event.league.unwrap_or_default(),
            markets,
        })
    }
}

impl From<(MarketId, MarketRecord)> for Market {
    fn from((id, record): (MarketId, MarketRecord)) -> Self {
        let orders = match record.orders {
            Value::Object(map) => map.into_iter().map(|(_, v)| v).collect(),
            Value::Array(items) => items,
            _ => Vec::new(),
        };

        let book = orders
            .into_iter()
            .filter_map(|raw| match serde_json::from_value::<RestingOrderRecord>(raw) {
                Ok(record) => BookOrder::try_from(record).ok(),
                Err(e) => {
                    tracing::debug!(market_id = %id, error = %e, "Skipping malformed resting order");
                    None
                }
            })
            .collect();

        Market {
            kind: MarketKind::from(&record.info),
            id,
            orders: book,
        }
    }
}

impl From<&MarketInfo> for MarketKind {
    fn from(info: &MarketInfo) -> Self {
        let line = |v: &Option<Value>| v.as_ref().and_then(value_as_key);
        match info.kind.as_str() {
            "1x2_1" => MarketKind::ThreeWay(ThreeWayLeg::Home),
            "1x2_x" => MarketKind::ThreeWay(ThreeWayLeg::Draw),
            "1x2_2" => MarketKind::ThreeWay(ThreeWayLeg::Away),
            "ml" => MarketKind::Moneyline,
            "spread" => match line(&info.spread) {
                Some(l) => MarketKind::Spread(l),
                None => MarketKind::Unknown(info.kind.clone()),
            },
            "total" => match line(&info.total) {
                Some(l) => MarketKind::Total(l),
                None => MarketKind::Unknown(info.kind.clone()),
            },
            other => MarketKind::Unknown(other.to_string()),
        }
    }
}

impl TryFrom<RestingOrderRecord> for BookOrder {
    type Error = ();

    fn try_from(record: RestingOrderRecord) -> Result<Self, Self::Error> {
        let price = value_as_i64(&record.price)
            .and_then(|p| u64::try_from(p).ok())
            .filter(|p| *p <= MAX_PRICE)
            .ok_or(())?;
        Ok(BookOrder {
            is_offer: value_as_i64(&record.dir) == Some(1),
            price,
            amount: record.amount.as_ref().and_then(value_as_key),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(v: Value) -> EventRecord {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn test_event_conversion() {
        let rec = record(json!({
            "eventId": 55,
            "status": null,
            "event": {"kickoff": "1700000000", "sport": "soccer", "league": "EPL", "home": "A"},
            "markets": {
                "10": {"info": {"type": "1x2_1"}, "orders": {}},
                "9": {"info": {"type": "spread", "spread": -1.5}, "orders": {
                    "a": {"dir": 1, "price": 450000000},
                    "b": {"dir": 0, "price": "430000000", "amount": "1000"},
                }},
            }
        }));
        let event = Event::try_from(("55".to_string(), rec)).unwrap();

        assert_eq!(event.id.as_str(), "55");
        assert!(!event.live);
        assert_eq!(event.kickoff, 1_700_000_000);
        assert_eq!(event.sport, "soccer");
        let ids: Vec<&str> = event.markets.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["9", "10"]);
        assert_eq!(event.markets[0].kind, MarketKind::Spread("-1.5".into()));
        assert_eq!(event.markets[0].orders.len(), 2);
        assert_eq!(event.markets[1].kind, MarketKind::ThreeWay(ThreeWayLeg::Home));
    }

    #[test]
    fn test_live_status_and_missing_kickoff() {
        let live = record(json!({"status": "in-play", "event": {"kickoff": 1}}));
        assert!(Event::try_from(("1".to_string(), live)).unwrap().live);

        let bad = record(json!({"event": {"kickoff": "soon"}}));
        assert!(matches!(
            Event::try_from(("2".to_string(), bad)),
            Err(EventValidationError::InvalidKickoff(_))
        ));
    }

    #[test]
    fn test_market_kind_tags() {
        let info = |v: Value| serde_json::from_value::<MarketInfo>(v).unwrap();
        assert_eq!(MarketKind::from(&info(json!({"type": "ml"}))), MarketKind::Moneyline);
        assert_eq!(
            MarketKind::from(&info(json!({"type": "total", "total": "2.5"}))),
            MarketKind::Total("2.5".into())
        );
        assert_eq!(
            MarketKind::from(&info(json!({"type": "spread"}))),
            MarketKind::Unknown("spread".into())
        );
        assert_eq!(
            MarketKind::from(&info(json!({"type": "corners"}))),
            MarketKind::Unknown("corners".into())
        );
    }

    #[test]
    fn test_book_order_rejects_bad_price() {
        let rec: RestingOrderRecord =
            serde_json::from_value(json!({"dir": 1, "price": "free"})).unwrap();
        assert!(BookOrder::try_from(rec).is_err());
    }
}
