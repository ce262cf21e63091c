//! 18-decimal token amount conversions.
//!
//! Amounts on the exchange are integers in wei (1 token = 10^18 wei). Strategy
//! sizing is done in plain decimal token units, so these helpers convert at
//! the boundary.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;

/// 10^18.
pub const WEI_PER_ETHER: u128 = 1_000_000_000_000_000_000;

/// Convert a decimal token amount into wei.
///
/// Amounts are rounded to 18 decimal places. Negative, non-finite and
/// overflowing inputs return `None`.
///
/// ```
/// use degens_mm::shared::amount::parse_ether;
///
/// assert_eq!(parse_ether(1.5), Some(1_500_000_000_000_000_000));
/// ```
pub fn parse_ether(amount: f64) -> Option<u128> {
    if !amount.is_finite() || amount < 0.0 {
        return None;
    }
    let decimal = Decimal::from_str(&amount.to_string()).ok()?.round_dp(18);
    let wei = decimal.checked_mul(Decimal::from(WEI_PER_ETHER as u64))?;
    wei.trunc().to_u128()
}

/// Convert wei into a decimal token amount.
pub fn format_ether(wei: u128) -> f64 {
    let whole = (wei / WEI_PER_ETHER) as f64;
    let frac = (wei % WEI_PER_ETHER) as f64 / WEI_PER_ETHER as f64;
    whole + frac
}

/// Read a signed wei amount sent as a decimal string or a JSON number.
pub fn value_as_wei(value: &Value) -> Option<i128> {
    match value {
        Value::String(s) => i128::from_str(s.trim()).ok(),
        Value::Number(n) => n
            .as_i64()
            .map(i128::from)
            .or_else(|| n.as_u64().map(i128::from)),
        _ => None,
    }
}
