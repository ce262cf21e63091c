//! Combine provider quotes into a fair probability and markup.

use crate::shared::serde_util::lenient_f64_opt;
use serde::{Deserialize, Serialize};

/// One provider's odds for a market, as published by the price feed.
///
/// Odds are decimal. `probability` is used for legs without long odds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderQuote {
    #[serde(rename = "longOdds", default, deserialize_with = "lenient_f64_opt::deserialize")]
    pub long_odds: Option<f64>,
    #[serde(rename = "shortOdds", default, deserialize_with = "lenient_f64_opt::deserialize")]
    pub short_odds: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64_opt::deserialize")]
    pub probability: Option<f64>,
}

impl ProviderQuote {
    pub fn two_way(long_odds: f64, short_odds: f64) -> Self {
        Self {
            long_odds: Some(long_odds),
            short_odds: Some(short_odds),
            probability: None,
        }
    }

    /// Implied probability of the leg: `1/long_odds`, else `probability`.
    fn implied_probability(&self) -> Option<f64> {
        match self.long_odds.filter(|o| *o != 0.0) {
            Some(odds) => Some(1.0 / odds),
            None => self.probability,
        }
    }
}

/// Fair value of one market.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FairValue {
    /// Probability the long side wins, in `(0, 1)`.
    pub prob: f64,
    /// Multiplicative over-round the providers charge. `>= 1`.
    pub markup: f64,
}

/// Mutually exclusive legs (home / draw / away).
///
/// Leg probabilities are normalized by their sum; the sum itself becomes the
/// common markup. A sum below 1 means no over-round, which is a data error.
pub fn analyze_multi_outcome(legs: &[ProviderQuote]) -> Option<Vec<FairValue>> {
    let probs: Vec<f64> = legs
        .iter()
        .map(ProviderQuote::implied_probability)
        .collect::<Option<_>>()?;

    let sum: f64 = probs.iter().sum();
    if !sum.is_finite() {
        tracing::warn!(?legs, "Unreadable multi-outcome odds");
        return None;
    }
    if sum < 1.0 {
        tracing::warn!(sum, "Total probs < 1");
        return None;
    }

    Some(
        probs
            .into_iter()
            .map(|p| FairValue {
                prob: p / sum,
                markup: sum,
            })
            .collect(),
    )
}

/// Long/short odds on the same line.
///
/// The fair probability is the geometric mean of the two implied
/// probabilities. Quotes where the long side is not strictly more likely
/// than the short side are stale or inverted and rejected.
pub fn analyze_two_outcome(quote: &ProviderQuote) -> Option<FairValue> {
    let long_odds = quote.long_odds.filter(|o| *o != 0.0)?;
    let short_odds = quote.short_odds.filter(|o| *o != 0.0)?;

    let long_prob = 1.0 / long_odds;
    let short_prob = 1.0 - 1.0 / short_odds;

    if long_prob.is_nan() || short_prob.is_nan() {
        tracing::warn!(?quote, "Error parsing price");
        return None;
    }

    if long_prob <= short_prob {
        tracing::warn!(?quote, "Prices reversed?");
        return None;
    }

    let prob = (long_prob * short_prob).sqrt();
    let markup = prob / short_prob;
    if !prob.is_finite() || !markup.is_finite() || prob <= 0.0 {
        return None;
    }

    Some(FairValue { prob, markup })
}
