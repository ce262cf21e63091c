//! Pricing engine: odds conversion, fair values, quotes and market selection.
//!
//! Everything here is a pure function of its inputs. The engine feeds it
//! synchronized exchange state and the latest provider odds.

pub mod analyze;
pub mod odds;
pub mod quote;
pub mod selection;

pub use analyze::{analyze_multi_outcome, analyze_two_outcome, FairValue, ProviderQuote};
pub use odds::{parse_odds, render_odds, OddsFormat};
pub use quote::{compute_quote, Quote, QuoteParams, QuoteRejection};
pub use selection::{order_expiry, select_markets};

use crate::config::StrategyConfig;
use crate::domain::{Event, MarketKind, MarketLookup, ThreeWayLeg};
use crate::shared::MarketId;
use std::collections::HashMap;

/// Provider odds for one event: source → market id → quote.
pub type EventOdds = HashMap<String, HashMap<String, ProviderQuote>>;

/// A market's fair value and the index of the strategy that produced it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricedMarket {
    pub fair: FairValue,
    pub strategy: usize,
}

/// Resolve fair values for every priceable market of an event.
///
/// Three-way legs are priced together, and only when all three exist. Other
/// markets are priced on their own. In both cases strategies are tried in
/// order and the first that matches and yields a valid analysis wins.
pub fn price_event(
    event: &Event,
    lookup: &MarketLookup,
    odds: &EventOdds,
    strategies: &[StrategyConfig],
) -> HashMap<MarketId, PricedMarket> {
    let mut out = HashMap::new();

    let legs: Option<Vec<&MarketId>> = ThreeWayLeg::ALL
        .iter()
        .map(|leg| lookup.single(leg.type_tag()))
        .collect();

    if let Some(legs) = legs {
        for (idx, strategy) in strategies.iter().enumerate() {
            if !strategy.applies_to(&event.sport, &event.league, "1x2") {
                continue;
            }
            let Some(provider) = odds.get(&strategy.odds_source) else {
                continue;
            };
            let quotes: Option<Vec<ProviderQuote>> = legs
                .iter()
                .map(|id| provider.get(id.as_str()).cloned())
                .collect();
            let Some(quotes) = quotes else {
                continue;
            };
            let Some(results) = analyze_multi_outcome(&quotes) else {
                continue;
            };

            for (id, fair) in legs.iter().zip(results) {
                out.insert((*id).clone(), PricedMarket { fair, strategy: idx });
            }
            break;
        }
    }

    for market in &event.markets {
        if market.kind.is_three_way() || matches!(market.kind, MarketKind::Unknown(_)) {
            continue;
        }
        let market_type = market.kind.type_tag();

        for (idx, strategy) in strategies.iter().enumerate() {
            if !strategy.applies_to(&event.sport, &event.league, market_type) {
                continue;
            }
            let Some(quote) = odds
                .get(&strategy.odds_source)
                .and_then(|provider| provider.get(market.id.as_str()))
            else {
                continue;
            };
            let Some(fair) = analyze_two_outcome(quote) else {
                continue;
            };

            out.insert(market.id.clone(), PricedMarket { fair, strategy: idx });
            break;
        }
    }

    out
}
