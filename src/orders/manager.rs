//! Reconcile desired quotes against resting orders.

use super::signing::{random_order_group, Order, OrderSigner, SignedOrder, ZERO_ADDRESS};
use super::store::{NewLiveOrder, OrderStore};
use crate::error::{MmError, StoreError};
use crate::pricing::quote::DUST_AMOUNT;
use crate::shared::price::is_tradable;
use crate::shared::{parse_ether, Direction, MarketId, WEI_PER_ETHER};
use std::sync::Arc;

/// Remaining size may drift this far (0.1 token) from the desired size
/// before an amendment is refused.
const AMOUNT_TOLERANCE_WEI: i128 = (WEI_PER_ETHER / 10) as i128;

/// Who we are and where orders go.
#[derive(Debug, Clone)]
pub struct OrderSettings {
    /// Lowercased maker address.
    pub maker: String,
    pub token: String,
    pub contract: String,
    pub chain_id: u64,
    /// Rows refreshed within two poll intervals at an unchanged price are
    /// left alone.
    pub poll_interval_secs: i64,
}

/// Why no order was produced for a side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    Dust,
    UntradablePrice,
    DuplicateRows(usize),
    RecentlyRefreshed,
    /// Remaining size differs too much; the old order is left to expire.
    AmountDrift { remaining: i128, desired: u128 },
    FillHashMismatch { stored: String, computed: String },
}

/// Outcome of [`OrderLifecycleManager::construct_order`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderAction {
    Insert(SignedOrder),
    Amend(SignedOrder),
    Skip(SkipReason),
}

impl OrderAction {
    pub fn into_order(self) -> Option<SignedOrder> {
        match self {
            OrderAction::Insert(o) | OrderAction::Amend(o) => Some(o),
            OrderAction::Skip(_) => None,
        }
    }
}

/// Owns the resting-order store and turns quotes into signed orders.
pub struct OrderLifecycleManager {
    store: Arc<dyn OrderStore>,
    signer: Arc<dyn OrderSigner>,
    settings: OrderSettings,
}

impl OrderLifecycleManager {
    pub fn new(
        store: Arc<dyn OrderStore>,
        signer: Arc<dyn OrderSigner>,
        settings: OrderSettings,
    ) -> Self {
        Self {
            store,
            signer,
            settings,
        }
    }

    pub fn settings(&self) -> &OrderSettings {
        &self.settings
    }

    /// Drop rows that have expired.
    pub fn sweep_expired(&self, now: i64) -> Result<usize, StoreError> {
        let removed = self.store.delete_expired(now)?;
        if removed > 0 {
            tracing::debug!(removed, "Expired resting orders removed");
        }
        Ok(removed)
    }

    /// Whether any of our orders rest on `market_id`, either side.
    pub fn has_resting(&self, market_id: &MarketId) -> Result<bool, StoreError> {
        Ok(self.store.count_by_market(market_id)? > 0)
    }

    /// Decide create / amend / skip for one side of a market, persist the
    /// decision, and sign the resulting order.
    ///
    /// `filled` returns the cumulative filled wei for a fill hash.
    #[allow(clippy::too_many_arguments)]
    pub fn construct_order(
        &self,
        market_id: &MarketId,
        direction: Direction,
        amount: f64,
        price: u64,
        expiry: i64,
        now: i64,
        filled: impl Fn(&str) -> i128,
    ) -> Result<OrderAction, MmError> {
        if amount.is_nan() || amount < DUST_AMOUNT {
            return Ok(OrderAction::Skip(SkipReason::Dust));
        }
        if !is_tradable(price) {
            return Ok(OrderAction::Skip(SkipReason::UntradablePrice));
        }
        let Some(desired) = parse_ether(amount) else {
            return Ok(OrderAction::Skip(SkipReason::Dust));
        };

        let existing = self.store.find(market_id, direction)?;
        if existing.len() > 1 {
            tracing::warn!(
                market_id = %market_id,
                direction = %direction,
                rows = existing.len(),
                "Multiple resting rows for one side, skipping"
            );
            return Ok(OrderAction::Skip(SkipReason::DuplicateRows(existing.len())));
        }

        let mut order = Order {
            maker: self.settings.maker.clone(),
            taker: ZERO_ADDRESS.to_string(),
            token: self.settings.token.clone(),
            market_id: market_id.clone(),
            amount: desired,
            price,
            direction,
            expiry,
            timestamp: now,
            order_group: String::new(),
        };

        let amended = match existing.into_iter().next() {
            Some(row) => {
                if price == row.price && now - row.timestamp < self.settings.poll_interval_secs * 2 {
                    return Ok(OrderAction::Skip(SkipReason::RecentlyRefreshed));
                }

                let remaining = i128::try_from(row.amount).unwrap_or(i128::MAX) - filled(&row.fill_hash);
                let desired_signed = i128::try_from(desired).unwrap_or(i128::MAX);
                if (remaining - desired_signed).abs() > AMOUNT_TOLERANCE_WEI {
                    tracing::debug!(
                        market_id = %market_id,
                        direction = %direction,
                        remaining,
                        desired,
                        "Size changed, waiting for resting order to expire"
                    );
                    return Ok(OrderAction::Skip(SkipReason::AmountDrift { remaining, desired }));
                }

                order.order_group = row.order_group.clone();
                order.amount = row.amount;

                let computed = order.fill_hash()?;
                if !computed.eq_ignore_ascii_case(&row.fill_hash) {
                    tracing::warn!(
                        market_id = %market_id,
                        stored = %row.fill_hash,
                        computed = %computed,
                        "fillHash mismatch on existing order"
                    );
                    return Ok(OrderAction::Skip(SkipReason::FillHashMismatch {
                        stored: row.fill_hash,
                        computed,
                    }));
                }

                self.store.update(row.order_id, price, now, expiry)?;
                true
            }
            None => {
                order.order_group = random_order_group();
                let fill_hash = order.fill_hash()?;
                self.store.insert(&NewLiveOrder {
                    market_id: market_id.clone(),
                    direction,
                    price,
                    timestamp: now,
                    expiry,
                    maker: order.maker.clone(),
                    token: order.token.clone(),
                    amount: order.amount,
                    order_group: order.order_group.clone(),
                    fill_hash,
                })?;
                false
            }
        };

        let sig = self
            .signer
            .sign(&order, &self.settings.contract, self.settings.chain_id)?;
        let signed = order.into_signed(sig)?;
        Ok(if amended {
            OrderAction::Amend(signed)
        } else {
            OrderAction::Insert(signed)
        })
    }
}
