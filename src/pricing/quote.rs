//! Turn a fair value into bid/ask prices and sizes.

use super::analyze::FairValue;
use crate::domain::{Position, RestingBook};
use crate::shared::{Direction, MAX_PRICE};

/// Orders below this many tokens are not worth placing.
pub const DUST_AMOUNT: f64 = 0.1;

/// Fraction of the second band's exposure at which skewing starts.
pub const RISK_THRESHOLD: f64 = 0.6;

/// Strategy parameters that shape one market's quote.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuoteParams {
    /// Size quoted on each side when flat, in tokens.
    pub base_amount: f64,
    pub min_markup: f64,
    pub markup_mult: f64,
    /// Most extreme decimal odds to quote. `1.5` and `3` are equivalent.
    pub odds_limit: Option<f64>,
}

/// Bid and ask ready for order construction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quote {
    pub buy_price: u64,
    pub sell_price: u64,
    pub buy_amount: f64,
    pub sell_amount: f64,
    pub buy_markup: f64,
    pub sell_markup: f64,
}

impl Quote {
    /// `(direction, price, amount)` for both sides, ask first.
    pub fn sides(&self) -> [(Direction, u64, f64); 2] {
        [
            (Direction::Sell, self.sell_price, self.sell_amount),
            (Direction::Buy, self.buy_price, self.buy_amount),
        ]
    }
}

/// Why a market gets no quote this pass.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum QuoteRejection {
    #[error("price outside odds limit")]
    OutsideOddsLimit,
    #[error("resting book is crossed")]
    CrossedBook,
    #[error("{0} would cross the book and we already rest orders on this market")]
    SelfCross(Direction),
    #[error("buy price {buy} >= sell price {sell}")]
    Inverted { buy: f64, sell: f64 },
    #[error("non-finite price")]
    NotFinite,
}

/// Discrete risk tier for the current exposure.
///
/// Band 0 covers exposure up to `threshold` of the first band's size; each
/// following band halves the remaining capacity.
pub fn price_band(base_amount: f64, at_risk: f64, threshold: f64) -> f64 {
    let threshold = 1.0 + (1.0 - threshold);
    (-((2.0 * base_amount - at_risk) / (base_amount * threshold)).log2() + 1.0).floor()
}

/// Capacity left once a band is reached.
pub fn band_to_amount(base_amount: f64, band: f64) -> f64 {
    2f64.powf(-band) * base_amount
}

/// Stretch (scale > 1) or shrink (scale < 1) the premium of a markup.
pub fn scale_markup(markup: f64, scale: f64) -> f64 {
    (markup - 1.0) * scale + 1.0
}

/// Build the quote for one market.
///
/// `has_own_orders` says whether we already rest orders on this market; it
/// decides between clamping to the book and backing off when a price would
/// cross the best opposing order.
pub fn compute_quote(
    fair: &FairValue,
    params: &QuoteParams,
    position: Option<&Position>,
    book: &RestingBook,
    has_own_orders: bool,
) -> Result<Quote, QuoteRejection> {
    let base = params.base_amount;
    let mut buy_amount = base;
    let mut sell_amount = base;

    let markup = (fair.markup * params.markup_mult).max(params.min_markup);
    let mut buy_markup = markup;
    let mut sell_markup = markup;

    if let Some(position) = position {
        let at_risk = position.at_risk();
        let band = price_band(base, at_risk, RISK_THRESHOLD);
        let mut reduced = 2.0 * base - band_to_amount(base, band) - at_risk;
        if reduced < DUST_AMOUNT {
            reduced = 0.0;
        }

        let wider = scale_markup(markup, 1.0 + band);
        let tighter = scale_markup(markup, 1.0 / (1.0 + band));

        if position.is_long() {
            buy_amount = reduced;
            buy_markup = wider;
            sell_markup = tighter;
        } else {
            sell_amount = reduced;
            sell_markup = wider;
            buy_markup = tighter;
        }
    }

    let scale = MAX_PRICE as f64;
    let mut buy_price = (scale * (fair.prob / buy_markup)).floor();
    let mut sell_price = (scale * (1.0 - (1.0 - fair.prob) / sell_markup)).floor();

    if let Some(limit) = params.odds_limit {
        let mut max_price = scale * (1.0 / limit);
        let mut min_price = scale - max_price;
        if max_price < min_price {
            std::mem::swap(&mut max_price, &mut min_price);
        }
        let inside = |p: f64| p >= min_price && p <= max_price;
        if !inside(buy_price) || !inside(sell_price) {
            return Err(QuoteRejection::OutsideOddsLimit);
        }
    }

    if book.is_crossed() {
        return Err(QuoteRejection::CrossedBook);
    }

    if let Some(ask) = book.best_ask() {
        if buy_price > ask as f64 {
            if has_own_orders {
                return Err(QuoteRejection::SelfCross(Direction::Buy));
            }
            buy_price = ask as f64;
        }
    }

    if let Some(bid) = book.best_bid() {
        if sell_price < bid as f64 {
            if has_own_orders {
                return Err(QuoteRejection::SelfCross(Direction::Sell));
            }
            sell_price = bid as f64;
        }
    }

    if buy_price >= sell_price {
        return Err(QuoteRejection::Inverted {
            buy: buy_price,
            sell: sell_price,
        });
    }

    if !buy_price.is_finite() || !sell_price.is_finite() || buy_price < 0.0 || sell_price > scale
    {
        return Err(QuoteRejection::NotFinite);
    }

    Ok(Quote {
        buy_price: buy_price as u64,
        sell_price: sell_price as u64,
        buy_amount,
        sell_amount,
        buy_markup,
        sell_markup,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::BookOrder;
    use crate::shared::WEI_PER_ETHER;

    fn params() -> QuoteParams {
        QuoteParams {
            base_amount: 10.0,
            min_markup: 1.01,
            markup_mult: 1.0,
            odds_limit: None,
        }
    }

    fn book(asks: &[u64], bids: &[u64]) -> RestingBook {
        let orders: Vec<BookOrder> = asks
            .iter()
            .map(|p| (true, *p))
            .chain(bids.iter().map(|p| (false, *p)))
            .map(|(is_offer, price)| BookOrder {
                is_offer,
                price,
                amount: None,
            })
            .collect();
        RestingBook::from_orders(&orders)
    }

    fn fair(prob: f64, markup: f64) -> FairValue {
        FairValue { prob, markup }
    }

    #[test]
    fn test_flat_quote() {
        let q = compute_quote(&fair(0.5, 1.04), &params(), None, &RestingBook::default(), false)
            .unwrap();
        assert_eq!(q.buy_price, (1e9_f64 * 0.5 / 1.04).floor() as u64);
        assert_eq!(q.sell_price, (1e9_f64 * (1.0 - 0.5 / 1.04)).floor() as u64);
        assert_eq!(q.buy_amount, 10.0);
        assert_eq!(q.sell_amount, 10.0);
        assert!(q.buy_price < q.sell_price);
    }

    #[test]
    fn test_min_markup_applies() {
        let q = compute_quote(&fair(0.5, 1.0), &params(), None, &RestingBook::default(), false)
            .unwrap();
        assert_eq!(q.buy_markup, 1.01);
        assert_eq!(q.sell_markup, 1.01);
    }

    #[test]
    fn test_long_position_at_base_amount_skews() {
        // atRisk = 20 tokens * 0.5 = 10 = base_amount
        let position = Position {
            pos: 20 * WEI_PER_ETHER as i128,
            avg_price: 500_000_000,
        };
        let flat = compute_quote(&fair(0.5, 1.04), &params(), None, &RestingBook::default(), false)
            .unwrap();
        let q = compute_quote(
            &fair(0.5, 1.04),
            &params(),
            Some(&position),
            &RestingBook::default(),
            false,
        )
        .unwrap();

        assert!(q.buy_amount < 10.0);
        assert!((q.buy_amount - 5.0).abs() < 1e-9);
        assert_eq!(q.sell_amount, 10.0);
        assert!(q.buy_markup > flat.buy_markup);
        assert!(q.sell_markup < flat.sell_markup);
        assert!(q.buy_price < flat.buy_price);
    }

    #[test]
    fn test_short_position_mirrors() {
        let position = Position {
            pos: -(20 * WEI_PER_ETHER as i128),
            avg_price: 500_000_000,
        };
        let q = compute_quote(
            &fair(0.5, 1.04),
            &params(),
            Some(&position),
            &RestingBook::default(),
            false,
        )
        .unwrap();
        assert!((q.sell_amount - 5.0).abs() < 1e-9);
        assert_eq!(q.buy_amount, 10.0);
        assert!(q.sell_markup > q.buy_markup);
    }

    #[test]
    fn test_heavy_exposure_zeroes_amount() {
        // atRisk 19.95 of a possible 20
        let position = Position {
            pos: 399 * WEI_PER_ETHER as i128 / 10,
            avg_price: 500_000_000,
        };
        let q = compute_quote(
            &fair(0.5, 1.04),
            &params(),
            Some(&position),
            &RestingBook::default(),
            false,
        )
        .unwrap();
        assert_eq!(q.buy_amount, 0.0);
    }

    #[test]
    fn test_band_math() {
        assert_eq!(price_band(10.0, 0.0, RISK_THRESHOLD), 0.0);
        assert_eq!(price_band(10.0, 10.0, RISK_THRESHOLD), 1.0);
        assert_eq!(band_to_amount(10.0, 1.0), 5.0);
        assert!((scale_markup(1.05, 2.0) - 1.1).abs() < 1e-12);
        assert!((scale_markup(1.05, 0.5) - 1.025).abs() < 1e-12);
    }

    #[test]
    fn test_odds_limit() {
        let mut p = params();
        p.odds_limit = Some(3.0);
        // buy ~ 0.2/1.04, far below 1/3
        let err = compute_quote(&fair(0.2, 1.04), &p, None, &RestingBook::default(), false);
        assert_eq!(err, Err(QuoteRejection::OutsideOddsLimit));
        assert!(compute_quote(&fair(0.5, 1.04), &p, None, &RestingBook::default(), false).is_ok());

        p.odds_limit = Some(1.5);
        assert!(compute_quote(&fair(0.5, 1.04), &p, None, &RestingBook::default(), false).is_ok());
    }

    #[test]
    fn test_crossed_book_rejected() {
        let crossed = book(&[400_000_000], &[420_000_000]);
        assert_eq!(
            compute_quote(&fair(0.5, 1.04), &params(), None, &crossed, false),
            Err(QuoteRejection::CrossedBook)
        );
    }

    #[test]
    fn test_clamps_to_book_without_own_orders() {
        let resting = book(&[470_000_000], &[530_000_000 + 1]);
        // bid above our sell would be crossed, but the book itself is crossed too
        assert!(compute_quote(&fair(0.5, 1.04), &params(), None, &resting, false).is_err());

        let resting = book(&[470_000_000], &[]);
        let q = compute_quote(&fair(0.5, 1.04), &params(), None, &resting, false).unwrap();
        assert_eq!(q.buy_price, 470_000_000);

        let resting = book(&[], &[530_000_000]);
        let q = compute_quote(&fair(0.5, 1.04), &params(), None, &resting, false).unwrap();
        assert_eq!(q.sell_price, 530_000_000);
    }

    #[test]
    fn test_backs_off_with_own_orders() {
        let resting = book(&[470_000_000], &[]);
        assert_eq!(
            compute_quote(&fair(0.5, 1.04), &params(), None, &resting, true),
            Err(QuoteRejection::SelfCross(Direction::Buy))
        );
        let resting = book(&[], &[530_000_000]);
        assert_eq!(
            compute_quote(&fair(0.5, 1.04), &params(), None, &resting, true),
            Err(QuoteRejection::SelfCross(Direction::Sell))
        );
    }

    #[test]
    fn test_buy_below_sell_across_inputs() {
        let probs = [0.01, 0.1, 0.3, 0.5, 0.7, 0.9, 0.99];
        let markups = [1.0, 1.01, 1.05, 1.2, 2.0];
        let positions = [
            None,
            Some(Position {
                pos: 5 * WEI_PER_ETHER as i128,
                avg_price: 300_000_000,
            }),
            Some(Position {
                pos: -(25 * WEI_PER_ETHER as i128),
                avg_price: 700_000_000,
            }),
        ];

        for prob in probs {
            for markup in markups {
                for position in &positions {
                    if let Ok(q) = compute_quote(
                        &fair(prob, markup),
                        &params(),
                        position.as_ref(),
                        &RestingBook::default(),
                        false,
                    ) {
                        assert!(q.buy_price < q.sell_price, "prob={} markup={}", prob, markup);
                    }
                }
            }
        }
    }

    #[test]
    fn test_sides_order() {
        let q = compute_quote(&fair(0.5, 1.04), &params(), None, &RestingBook::default(), false)
            .unwrap();
        let sides = q.sides();
        assert_eq!(sides[0].0, Direction::Sell);
        assert_eq!(sides[1].0, Direction::Buy);
    }
}
