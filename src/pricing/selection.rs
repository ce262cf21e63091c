//! Which events and markets get quoted this pass.

use super::analyze::FairValue;
use crate::domain::{Event, MarketLookup};
use crate::shared::MarketId;
use std::collections::HashMap;

/// Expiry for orders on `event`, or `None` when the event must be skipped.
///
/// Events flagged live and events kicking off within `expiry_secs` are not
/// quoted. Orders never outlive kickoff.
pub fn order_expiry(event: &Event, now: i64, expiry_secs: i64) -> Option<i64> {
    if event.live {
        return None;
    }
    if now > event.kickoff - expiry_secs {
        return None;
    }
    Some((now + expiry_secs).min(event.kickoff))
}

/// Markets to quote, per type group, closest-to-even first.
///
/// Only markets with a usable fair value are considered. Within a group the
/// ones whose probability is nearest 0.5 are kept, up to the configured
/// per-type cap; ties keep natural id order.
pub fn select_markets(
    lookup: &MarketLookup,
    fair: &HashMap<MarketId, FairValue>,
    limits: &HashMap<String, usize>,
) -> Vec<MarketId> {
    let mut selected = Vec::new();

    for (type_tag, ids) in lookup.groups() {
        let mut candidates: Vec<(MarketId, f64)> = ids
            .into_iter()
            .filter_map(|id| {
                let prob = fair.get(&id)?.prob;
                (prob != 0.0 && !prob.is_nan()).then_some((id, (0.5 - prob).abs()))
            })
            .collect();

        candidates.sort_by(|a, b| a.1.total_cmp(&b.1));

        if let Some(limit) = limits.get(&type_tag) {
            candidates.truncate(*limit);
        }

        selected.extend(candidates.into_iter().map(|(id, _)| id));
    }

    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Market, MarketKind};
    use crate::shared::EventId;

    fn event(live: bool, kickoff: i64) -> Event {
        Event {
            id: EventId::new("1"),
            live,
            kickoff,
            sport: "Soccer".into(),
            league: "EPL".into(),
            markets: vec![],
        }
    }

    #[test]
    fn test_order_expiry() {
        let now = 1_000_000;
        assert_eq!(order_expiry(&event(false, now + 3_600), now, 300), Some(now + 300));
        assert_eq!(order_expiry(&event(false, now + 300), now, 300), Some(now + 300));
        assert_eq!(order_expiry(&event(false, now + 299), now, 300), None);
        assert_eq!(order_expiry(&event(true, now + 3_600), now, 300), None);
    }

    fn market(id: &str, line: &str) -> Market {
        Market {
            id: MarketId::new(id),
            kind: MarketKind::Spread(line.into()),
            orders: vec![],
        }
    }

    fn fv(prob: f64) -> FairValue {
        FairValue { prob, markup: 1.05 }
    }

    #[test]
    fn test_select_closest_to_even_with_cap() {
        let lookup = MarketLookup::build(&[
            market("1", "-2.5"),
            market("2", "-1.5"),
            market("3", "-0.5"),
            market("4", "0.5"),
            Market {
                id: MarketId::new("9"),
                kind: MarketKind::Moneyline,
                orders: vec![],
            },
        ]);
        let fair: HashMap<MarketId, FairValue> = [
            ("1", fv(0.2)),
            ("2", fv(0.45)),
            ("3", fv(0.55)),
            ("4", fv(0.7)),
            ("9", fv(0.6)),
        ]
        .into_iter()
        .map(|(id, f)| (MarketId::new(id), f))
        .collect();
        let limits: HashMap<String, usize> = [("spread".to_string(), 2)].into_iter().collect();

        let selected = select_markets(&lookup, &fair, &limits);
        let ids: Vec<&str> = selected.iter().map(|m| m.as_str()).collect();
        assert_eq!(ids, vec!["9", "2", "3"]);
    }

    #[test]
    fn test_unpriced_markets_skipped() {
        let lookup = MarketLookup::build(&[market("1", "-2.5"), market("2", "-1.5")]);
        let fair: HashMap<MarketId, FairValue> =
            [(MarketId::new("2"), fv(0.4))].into_iter().collect();
        let selected = select_markets(&lookup, &fair, &HashMap::new());
        assert_eq!(selected, vec![MarketId::new("2")]);
    }
}
