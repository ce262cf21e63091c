//! Display odds ↔ fixed-point price.
//!
//! Parsing yields the price of the long side. Rendering works on
//! `buy_ratio = price / (MAX_PRICE - price)` and its inverse, picking the
//! ratio for the requested side.

use crate::shared::price::{is_tradable, probability_to_scaled};
use crate::shared::MAX_PRICE;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OddsFormat {
    Decimal,
    /// Hong Kong: decimal minus the stake.
    Hk,
    /// Implied percentage of the opposing outcome.
    Probability,
    American,
    /// Indonesian.
    Indo,
    /// Malaysian.
    Malay,
}

impl OddsFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            OddsFormat::Decimal => "decimal",
            OddsFormat::Hk => "hk",
            OddsFormat::Probability => "probability",
            OddsFormat::American => "american",
            OddsFormat::Indo => "indo",
            OddsFormat::Malay => "malay",
        }
    }

    /// Decimals used by [`render_odds`] when not rendering in full.
    fn precision(self) -> usize {
        match self {
            OddsFormat::American => 0,
            OddsFormat::Probability => 1,
            _ => 3,
        }
    }
}

impl fmt::Display for OddsFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OddsFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "decimal" => Ok(OddsFormat::Decimal),
            "hk" => Ok(OddsFormat::Hk),
            "probability" => Ok(OddsFormat::Probability),
            "american" => Ok(OddsFormat::American),
            "indo" => Ok(OddsFormat::Indo),
            "malay" => Ok(OddsFormat::Malay),
            other => Err(format!("unrecognized odds format: {}", other)),
        }
    }
}

/// Parse display odds into a fixed-point price.
///
/// Returns `None` for unparseable input, values outside the format's domain,
/// and odds implying a 0% or 100% outcome.
///
/// ```
/// use degens_mm::pricing::odds::{parse_odds, OddsFormat};
///
/// assert_eq!(parse_odds("2.0", OddsFormat::Decimal), Some(500_000_000));
/// assert_eq!(parse_odds("+150", OddsFormat::American), Some(600_000_000));
/// assert_eq!(parse_odds("1.0", OddsFormat::Decimal), None);
/// ```
pub fn parse_odds(odds: &str, format: OddsFormat) -> Option<u64> {
    let num = odds.trim().parse::<f64>().ok()?;
    parse_odds_value(num, format)
}

/// [`parse_odds`] for an already numeric value.
pub fn parse_odds_value(num: f64, format: OddsFormat) -> Option<u64> {
    if num.is_nan() {
        return None;
    }

    let (num, format) = match format {
        OddsFormat::American => {
            if num.abs() < 100.0 {
                return None;
            }
            (num / 100.0, OddsFormat::Indo)
        }
        OddsFormat::Hk => (num + 1.0, OddsFormat::Decimal),
        OddsFormat::Malay => {
            if num.abs() >= 1.0 {
                return None;
            }
            let num = if num < 0.0 { 1.0 / num.abs() } else { num };
            (num + 1.0, OddsFormat::Decimal)
        }
        other => (num, other),
    };

    let p = match format {
        OddsFormat::Indo => {
            let p = 1.0 / (num.abs() + 1.0);
            if num > 0.0 {
                1.0 - p
            } else {
                p
            }
        }
        OddsFormat::Probability => {
            if !(0.0..=100.0).contains(&num) {
                return None;
            }
            1.0 - num / 100.0
        }
        OddsFormat::Decimal => {
            if num <= 1.0 {
                return None;
            }
            1.0 - 1.0 / num
        }
        OddsFormat::American | OddsFormat::Hk | OddsFormat::Malay => return None,
    };

    probability_to_scaled(p)
}

/// Render a fixed-point price as display odds for the long or short side.
///
/// `full` renders with 9 decimals regardless of format. Untradable prices
/// have no finite odds and return `None`.
///
/// ```
/// use degens_mm::pricing::odds::{render_odds, OddsFormat};
///
/// assert_eq!(render_odds(600_000_000, true, OddsFormat::American, false).as_deref(), Some("+150"));
/// assert_eq!(render_odds(600_000_000, false, OddsFormat::Decimal, false).as_deref(), Some("1.667"));
/// ```
pub fn render_odds(price: u64, is_long: bool, format: OddsFormat, full: bool) -> Option<String> {
    if !is_tradable(price) {
        return None;
    }

    let buy_ratio = price as f64 / (MAX_PRICE - price) as f64;
    let sell_ratio = 1.0 / buy_ratio;
    let own_ratio = if is_long { buy_ratio } else { sell_ratio };

    let decimals = if full { 9 } else { format.precision() };
    let round = |n: f64| format!("{:.*}", decimals, n);

    let rendered = match format {
        OddsFormat::American => {
            let sign = if own_ratio >= 1.0 { "+" } else { "-" };
            format!("{}{}", sign, round(buy_ratio.max(sell_ratio) * 100.0))
        }
        OddsFormat::Decimal => round(1.0 + own_ratio),
        OddsFormat::Hk => round(own_ratio),
        OddsFormat::Probability => {
            let scaled = if is_long { MAX_PRICE - price } else { price };
            round(scaled as f64 / 10_000_000.0)
        }
        OddsFormat::Indo => {
            let sign = if own_ratio >= 1.0 { "" } else { "-" };
            format!("{}{}", sign, round(buy_ratio.max(sell_ratio)))
        }
        OddsFormat::Malay => {
            let sign = if own_ratio > 1.0 { "-" } else { "" };
            format!("{}{}", sign, round(buy_ratio.min(sell_ratio)))
        }
    };

    Some(rendered)
}
