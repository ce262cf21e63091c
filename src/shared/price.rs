//! Fixed-point price utilities.
//!
//! Exchange prices are implied probabilities scaled to integers by
//! [`MAX_PRICE`]. A tradable price lies strictly inside `(0, MAX_PRICE)`.

/// Price scaling factor (1e9).
///
/// A probability of 0.5 is stored as 500,000,000.
pub const MAX_PRICE: u64 = 1_000_000_000;

/// Convert a scaled price to a probability.
///
/// ```
/// use degens_mm::shared::price::scaled_to_probability;
///
/// assert_eq!(scaled_to_probability(500_000_000), 0.5);
/// ```
pub fn scaled_to_probability(price: u64) -> f64 {
    price as f64 / MAX_PRICE as f64
}

/// Encode a probability as `floor(p * MAX_PRICE)`.
///
/// Returns `None` for non-finite input and for anything that would land on
/// or outside the open interval `(0, MAX_PRICE)`.
///
/// ```
/// use degens_mm::shared::price::probability_to_scaled;
///
/// assert_eq!(probability_to_scaled(0.5), Some(500_000_000));
/// assert_eq!(probability_to_scaled(1.0), None);
/// ```
pub fn probability_to_scaled(p: f64) -> Option<u64> {
    let scaled = (p * MAX_PRICE as f64).floor();
    if !scaled.is_finite() || scaled <= 0.0 || scaled >= MAX_PRICE as f64 {
        return None;
    }
    Some(scaled as u64)
}

/// Whether a scaled price is tradable.
pub fn is_tradable(price: u64) -> bool {
    price > 0 && price < MAX_PRICE
}
