//! Position domain: held inventory per market and token.

pub mod wire;

use crate::shared::amount::format_ether;
use crate::shared::serde_util::value_as_i64;
use crate::shared::{EventId, MarketId, MAX_PRICE};
use serde_json::Value;

/// Net holding on one market in one token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    /// Signed wei. Positive is long (bought), negative short.
    pub pos: i128,
    /// Average entry price on the fixed-point scale.
    pub avg_price: u64,
}

impl Position {
    pub fn is_long(&self) -> bool {
        self.pos > 0
    }

    /// Wei that would be lost if the position settles against us.
    ///
    /// Long positions risk `avg_price` per unit, short ones the complement.
    pub fn at_risk_wei(&self) -> u128 {
        let price = if self.is_long() {
            self.avg_price
        } else {
            MAX_PRICE.saturating_sub(self.avg_price)
        };
        self.pos.unsigned_abs().saturating_mul(u128::from(price)) / u128::from(MAX_PRICE)
    }

    /// [`Self::at_risk_wei`] in token units.
    pub fn at_risk(&self) -> f64 {
        format_ether(self.at_risk_wei())
    }

    /// Locate the position for `(event, market, sym)` inside a `positions`
    /// topic document.
    pub fn lookup(doc: &Value, event: &EventId, market: &MarketId, sym: &str) -> Option<Self> {
        let raw = doc
            .get("events")?
            .get(event.as_str())?
            .get("matches")?
            .get(market.as_str())?
            .get("tokens")?
            .get(sym)?;

        if raw.is_null() {
            return None;
        }

        match serde_json::from_value::<wire::PositionEntry>(raw.clone()) {
            Ok(entry) => Position::try_from(entry)
                .map_err(|e| {
                    tracing::warn!(market_id = %market, error = %e, "Unreadable position");
                })
                .ok(),
            Err(e) => {
                tracing::warn!(market_id = %market, error = %e, "Malformed position entry");
                None
            }
        }
    }
}

impl TryFrom<wire::PositionEntry> for Position {
    type Error = String;

    fn try_from(entry: wire::PositionEntry) -> Result<Self, Self::Error> {
        let pos = crate::shared::amount::value_as_wei(&entry.pos)
            .ok_or_else(|| format!("invalid pos {}", entry.pos))?;
        let avg_price = value_as_i64(&entry.avg_price)
            .and_then(|p| u64::try_from(p).ok())
            .filter(|p| *p <= MAX_PRICE)
            .ok_or_else(|| format!("invalid avgPrice {}", entry.avg_price))?;
        Ok(Self { pos, avg_price })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::WEI_PER_ETHER;
    use serde_json::json;

    #[test]
    fn test_at_risk_long_and_short() {
        let long = Position {
            pos: 10 * WEI_PER_ETHER as i128,
            avg_price: 400_000_000,
        };
        assert_eq!(long.at_risk_wei(), 4 * WEI_PER_ETHER);
        assert!((long.at_risk() - 4.0).abs() < 1e-12);

        let short = Position {
            pos: -(10 * WEI_PER_ETHER as i128),
            avg_price: 400_000_000,
        };
        assert_eq!(short.at_risk_wei(), 6 * WEI_PER_ETHER);
        assert!(!short.is_long());
    }

    #[test]
    fn test_lookup() {
        let doc = json!({
            "events": {"7": {"matches": {"100": {"tokens": {
                "ETH": {"pos": "-2000000000000000000", "avgPrice": 250000000}
            }}}}}
        });
        let p = Position::lookup(&doc, &EventId::new("7"), &MarketId::new("100"), "ETH").unwrap();
        assert_eq!(p.pos, -2 * WEI_PER_ETHER as i128);
        assert_eq!(p.avg_price, 250_000_000);

        assert!(Position::lookup(&doc, &EventId::new("7"), &MarketId::new("101"), "ETH").is_none());
        assert!(Position::lookup(&doc, &EventId::new("7"), &MarketId::new("100"), "DAI").is_none());
    }

    #[test]
    fn test_lookup_rejects_garbage() {
        let doc = json!({
            "events": {"7": {"matches": {"100": {"tokens": {
                "ETH": {"pos": "lots", "avgPrice": 1}
            }}}}}
        });
        assert!(Position::lookup(&doc, &EventId::new("7"), &MarketId::new("100"), "ETH").is_none());
    }
}
