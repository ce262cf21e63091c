//! Shared newtypes and utilities used across all modules.
//!
//! Identifier newtypes are serialization-transparent: they serialize and
//! deserialize exactly like the raw strings the exchange sends, so they can be
//! used directly in wire types and as map keys.

pub mod amount;
pub mod price;
pub mod serde_util;

pub use amount::{format_ether, parse_ether, WEI_PER_ETHER};
pub use price::MAX_PRICE;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;

/// Current Unix time in whole seconds.
pub fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

// ─── String identifiers ──────────────────────────────────────────────────────

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: Serializer,
            {
                serializer.serialize_str(&self.0)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                serde_util::string_or_number::deserialize(deserializer).map(Self)
            }
        }
    };
}

string_id! {
    /// Exchange market identifier (the contract's `matchId`), e.g. `"10231"`.
    MarketId
}

string_id! {
    /// Exchange event identifier.
    EventId
}

string_id! {
    /// Correlation id of a wire request. Assigned by the client, or overridden
    /// when a subscription is replayed under its original id.
    RequestId
}

/// Orders ids the way a person would: numerically when both sides are
/// integers, lexically otherwise.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    match (a.parse::<i128>(), b.parse::<i128>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

// ─── Direction ───────────────────────────────────────────────────────────────

/// Side of a resting order. Serialized as the contract's integer code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Ask (`0`).
    Sell,
    /// Bid (`1`).
    Buy,
}

impl Direction {
    pub fn as_u8(self) -> u8 {
        match self {
            Direction::Sell => 0,
            Direction::Buy => 1,
        }
    }

    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Direction::Sell),
            1 => Some(Direction::Buy),
            _ => None,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Sell => write!(f, "sell"),
            Direction::Buy => write!(f, "buy"),
        }
    }
}

impl Serialize for Direction {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u8(self.as_u8())
    }
}

impl<'de> Deserialize<'de> for Direction {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let v = u8::deserialize(deserializer)?;
        Direction::from_u8(v)
            .ok_or_else(|| serde::de::Error::custom(format!("Invalid direction: {}", v)))
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
