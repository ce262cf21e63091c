//! The update pass: synchronized state and feed odds in, signed orders out.

use crate::client::DegensClient;
use crate::config::{MmConfig, StrategyConfig};
use crate::domain::MarketLookup;
use crate::error::MmError;
use crate::feed::{OddsBook, ReflectedPrices};
use crate::orders::{OrderLifecycleManager, SignedOrder};
use crate::pricing::{compute_quote, order_expiry, price_event, select_markets, FairValue, QuoteParams};
use crate::scheduler::{GateOutcome, GateSet, IfRunning};
use crate::shared::{now_secs, EventId, MarketId};
use crate::state::ExchangeState;

use std::collections::HashMap;
use std::sync::Mutex;

/// Gate that serializes update passes.
pub const UPDATE_GATE: &str = "doUpdates";

pub struct MarketMaker {
    maker: String,
    token_addr: String,
    order_expiry_secs: i64,
    order_refresh_secs: i64,
    market_type_limits: HashMap<String, usize>,
    strategies: Vec<StrategyConfig>,
    /// Effective parameters, parallel to `strategies`.
    params: Vec<QuoteParams>,
    orders: OrderLifecycleManager,
    last_event_update: Mutex<HashMap<EventId, i64>>,
    gates: GateSet,
}

impl MarketMaker {
    pub fn new(config: &MmConfig, orders: OrderLifecycleManager) -> Self {
        let params = config
            .strategies
            .iter()
            .map(|strategy| config.quote_params(strategy))
            .collect();
        Self {
            maker: orders.settings().maker.clone(),
            token_addr: config.token_addr.clone(),
            order_expiry_secs: config.order_expiry_time_seconds,
            order_refresh_secs: config.order_refresh_time_seconds,
            market_type_limits: config.market_type_limits.clone(),
            strategies: config.strategies.clone(),
            params,
            orders,
            last_event_update: Mutex::new(HashMap::new()),
            gates: GateSet::new(),
        }
    }

    pub fn maker(&self) -> &str {
        &self.maker
    }

    /// Config installed and our own positions and fills synchronized.
    pub fn ready(&self, state: &ExchangeState) -> bool {
        state.has_config() && state.has_positions(&self.maker) && state.has_order_fills(&self.maker)
    }

    /// Claim the refresh slot for an event. The slot is taken even if the
    /// event is then skipped.
    fn claim_refresh(&self, event_id: &EventId, now: i64) -> bool {
        let mut last = self
            .last_event_update
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if now - self.order_refresh_secs < last.get(event_id).copied().unwrap_or(0) {
            return false;
        }
        last.insert(event_id.clone(), now);
        true
    }

    /// One pass over every event. Persists create/amend decisions and
    /// returns the signed orders to submit.
    pub fn run_once(
        &self,
        state: &ExchangeState,
        odds: &OddsBook,
        now: i64,
    ) -> Result<Vec<SignedOrder>, MmError> {
        let Some(token) = state.tokens().get(&self.token_addr) else {
            tracing::error!(token_addr = %self.token_addr, "Couldn't find token_addr in orderbook config");
            return Ok(Vec::new());
        };
        let sym = token.sym.clone();

        self.orders.sweep_expired(now)?;

        let mut out = Vec::new();

        for event in state.events() {
            if !self.claim_refresh(&event.id, now) {
                continue;
            }
            let Some(expiry) = order_expiry(&event, now, self.order_expiry_secs) else {
                continue;
            };
            let Some(event_odds) = odds.get_odds(event.id.as_str()) else {
                continue;
            };

            let lookup = MarketLookup::build(&event.markets);
            let priced = price_event(&event, &lookup, &event_odds, &self.strategies);
            let fair: HashMap<MarketId, FairValue> =
                priced.iter().map(|(id, p)| (id.clone(), p.fair)).collect();

            for market_id in select_markets(&lookup, &fair, &self.market_type_limits) {
                let (Some(priced), Some(market)) = (priced.get(&market_id), event.market(&market_id)) else {
                    continue;
                };
                let position = state.position(&self.maker, &event.id, &market_id, &sym);
                let has_own_orders = self.orders.has_resting(&market_id)?;

                let quote = match compute_quote(
                    &priced.fair,
                    &self.params[priced.strategy],
                    position.as_ref(),
                    &market.book(),
                    has_own_orders,
                ) {
                    Ok(quote) => quote,
                    Err(reason) => {
                        tracing::debug!(event_id = %event.id, market_id = %market_id, %reason, "No quote");
                        continue;
                    }
                };

                for (direction, price, amount) in quote.sides() {
                    let action = self.orders.construct_order(
                        &market_id,
                        direction,
                        amount,
                        price,
                        expiry,
                        now,
                        |fill_hash| state.fill_amount(&self.maker, fill_hash),
                    );
                    match action {
                        Ok(action) => out.extend(action.into_order()),
                        Err(e) => tracing::warn!(
                            market_id = %market_id,
                            direction = %direction,
                            error = %e,
                            "Failed to construct order"
                        ),
                    }
                }
            }
        }

        if !out.is_empty() {
            tracing::info!(orders = out.len(), "Updating orders");
        }
        Ok(out)
    }

    /// Trigger an update pass through the single-flight gate.
    pub async fn trigger(&self, client: &DegensClient, feed: &ReflectedPrices) -> GateOutcome {
        if !self.ready(&client.state().await) {
            return GateOutcome::Coalesced;
        }

        self.gates
            .run(UPDATE_GATE, IfRunning::Reschedule, || async {
                let state = client.state().await;
                if !self.ready(&state) {
                    return;
                }
                let odds = feed.snapshot().await;
                match self.run_once(&state, &odds, now_secs()) {
                    Ok(orders) => {
                        if let Err(e) = client.send_orders(&orders) {
                            tracing::error!(orders = orders.len(), error = %e, "Error sending orders");
                        }
                    }
                    Err(e) => tracing::error!(error = %e, "Update pass failed"),
                }
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orders::{LocalOrderSigner, OrderSettings, OrderSigner, SqliteOrderStore};
    use crate::state::{parse_batch, TopicKey};
    use serde_json::{json, Value};
    use std::sync::Arc;

    const KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";
    const TOKEN: &str = "0x6B175474E89094C44Da98b954EedeAC495271d0F";

    fn config() -> MmConfig {
        MmConfig::from_toml_str(&format!(
            r#"
            private_key = "{KEY}"
            version_name = "test"
            reflector_url = "http://localhost"
            reflector_api_key = "k"
            token_addr = "{TOKEN}"
            order_refresh_time_seconds = 60

            [default_strategy]
            base_amount = 10.0

            [[strategies]]
            odds_source = "pin"
            "#
        ))
        .unwrap()
    }

    fn maker() -> MarketMaker {
        let config = config();
        let signer = Arc::new(LocalOrderSigner::from_private_key(KEY).unwrap());
        let settings = OrderSettings {
            maker: signer.address(),
            token: config.token_addr.clone(),
            contract: config.contract_addr.clone(),
            chain_id: config.chain_id,
            poll_interval_secs: config.poll_interval_seconds as i64,
        };
        let store = Arc::new(SqliteOrderStore::new_in_memory().unwrap());
        MarketMaker::new(&config, OrderLifecycleManager::new(store, signer, settings))
    }

    fn set(state: &mut ExchangeState, key: TopicKey, value: Value) {
        let ops = parse_batch(json!([{"op": "replace", "path": "", "value": value}])).unwrap();
        state.apply(&key, &ops).unwrap();
    }

    fn state_for(maker: &str, now: i64) -> ExchangeState {
        let mut state = ExchangeState::default();
        state.set_config(json!({"tokens": {"DAI": {"addr": TOKEN.to_lowercase()}}}));
        set(&mut state, TopicKey::Positions(maker.into()), json!({"events": {}}));
        set(&mut state, TopicKey::OrderFills(maker.into()), json!({"recs": {}}));
        set(
            &mut state,
            TopicKey::Events,
            json!({"recs": {"ev1": {
                "status": null,
                "event": {"kickoff": now + 86_400, "sport": "Basketball", "league": "NBA"},
                "markets": {"100": {"info": {"type": "ml"}, "orders": {}}}
            }}}),
        );
        state
    }

    fn odds() -> OddsBook {
        OddsBook::from_value(json!({
            "ev1": {"etag": "a", "data": {"reflector": {"pin": {"100": {"longOdds": 1.95, "shortOdds": 1.95}}}}}
        }))
    }

    #[test]
    fn test_ready_requires_all_topics() {
        let mm = maker();
        assert!(!mm.ready(&ExchangeState::default()));
        assert!(mm.ready(&state_for(mm.maker(), 0)));
    }

    #[test]
    fn test_quotes_both_sides_then_throttles() {
        let mm = maker();
        let now = 1_700_000_000;
        let state = state_for(mm.maker(), now);

        let orders = mm.run_once(&state, &odds(), now).unwrap();
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].direction, crate::shared::Direction::Sell);
        assert_eq!(orders[1].direction, crate::shared::Direction::Buy);
        assert!(orders[1].price < orders[0].price);
        assert_eq!(orders[0].expiry, now + 300);

        assert!(mm.run_once(&state, &odds(), now + 10).unwrap().is_empty());
    }

    #[test]
    fn test_missing_token_skips_pass() {
        let mm = maker();
        let now = 1_700_000_000;
        let mut state = state_for(mm.maker(), now);
        state.set_config(json!({"tokens": {}}));
        assert!(mm.run_once(&state, &odds(), now).unwrap().is_empty());
    }

    #[test]
    fn test_event_without_odds_is_skipped() {
        let mm = maker();
        let now = 1_700_000_000;
        let state = state_for(mm.maker(), now);
        assert!(mm.run_once(&state, &OddsBook::default(), now).unwrap().is_empty());
    }
}
