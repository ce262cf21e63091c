//! Event domain: sporting events, their markets, and resting books.

mod convert;
pub mod lookup;
pub mod wire;

pub use convert::EventValidationError;
pub use lookup::{format_point_spread, invert_point_spread, MarketLookup};

use crate::shared::{EventId, MarketId};
use std::fmt;

// ─── Event ───────────────────────────────────────────────────────────────────

/// A scheduled game with its bettable markets.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub id: EventId,
    /// The exchange sets a status once play has started or the event closed.
    pub live: bool,
    /// Unix seconds.
    pub kickoff: i64,
    pub sport: String,
    pub league: String,
    /// Sorted by natural market id order.
    pub markets: Vec<Market>,
}

impl Event {
    pub fn market(&self, id: &MarketId) -> Option<&Market> {
        self.markets.iter().find(|m| &m.id == id)
    }
}

// ─── Market ──────────────────────────────────────────────────────────────────

/// Leg of a three-way (home / draw / away) result market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThreeWayLeg {
    Home,
    Draw,
    Away,
}

impl ThreeWayLeg {
    pub const ALL: [ThreeWayLeg; 3] = [ThreeWayLeg::Home, ThreeWayLeg::Draw, ThreeWayLeg::Away];

    pub fn type_tag(self) -> &'static str {
        match self {
            ThreeWayLeg::Home => "1x2_1",
            ThreeWayLeg::Draw => "1x2_x",
            ThreeWayLeg::Away => "1x2_2",
        }
    }
}

/// Market type as tagged by the exchange.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MarketKind {
    ThreeWay(ThreeWayLeg),
    /// Two-way winner market (`ml`).
    Moneyline,
    /// Handicap keyed by its signed line, e.g. `"-1.5"`.
    Spread(String),
    /// Over/under keyed by its line, e.g. `"2.5"`.
    Total(String),
    Unknown(String),
}

impl MarketKind {
    /// The exchange's `info.type` string.
    pub fn type_tag(&self) -> &str {
        match self {
            MarketKind::ThreeWay(leg) => leg.type_tag(),
            MarketKind::Moneyline => "ml",
            MarketKind::Spread(_) => "spread",
            MarketKind::Total(_) => "total",
            MarketKind::Unknown(tag) => tag,
        }
    }

    pub fn is_three_way(&self) -> bool {
        matches!(self, MarketKind::ThreeWay(_))
    }
}

impl fmt::Display for MarketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketKind::Spread(line) => write!(f, "spread {}", format_point_spread(line)),
            MarketKind::Total(line) => write!(f, "total {}", line),
            other => write!(f, "{}", other.type_tag()),
        }
    }
}

/// One bettable proposition within an event.
#[derive(Debug, Clone, PartialEq)]
pub struct Market {
    pub id: MarketId,
    pub kind: MarketKind,
    /// Resting orders from every participant, unsorted.
    pub orders: Vec<BookOrder>,
}

impl Market {
    pub fn book(&self) -> RestingBook {
        RestingBook::from_orders(&self.orders)
    }
}

// ─── Book ────────────────────────────────────────────────────────────────────

/// A resting order as published on the events topic.
#[derive(Debug, Clone, PartialEq)]
pub struct BookOrder {
    /// `dir == 1` on the wire.
    pub is_offer: bool,
    pub price: u64,
    pub amount: Option<String>,
}

/// Resting prices split into sides and sorted best-first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RestingBook {
    /// Ascending.
    pub asks: Vec<u64>,
    /// Descending.
    pub bids: Vec<u64>,
}

impl RestingBook {
    pub fn from_orders(orders: &[BookOrder]) -> Self {
        let mut asks: Vec<u64> = Vec::new();
        let mut bids: Vec<u64> = Vec::new();
        for order in orders {
            if order.is_offer {
                asks.push(order.price);
            } else {
                bids.push(order.price);
            }
        }
        asks.sort_unstable();
        bids.sort_unstable_by(|a, b| b.cmp(a));
        Self { asks, bids }
    }

    pub fn best_ask(&self) -> Option<u64> {
        self.asks.first().copied()
    }

    pub fn best_bid(&self) -> Option<u64> {
        self.bids.first().copied()
    }

    /// Best ask strictly below best bid.
    pub fn is_crossed(&self) -> bool {
        matches!((self.best_ask(), self.best_bid()), (Some(ask), Some(bid)) if ask < bid)
    }
}
