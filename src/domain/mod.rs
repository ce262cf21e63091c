//! Domain types decoded from synchronized exchange state.
//!
//! Each sub-module keeps the same split:
//! - `mod.rs`: typed values the pricing and order code works with
//! - `wire.rs`: raw serde structs matching what the exchange publishes
//! - `convert.rs`: `TryFrom` conversions with validation

pub mod event;
pub mod position;
pub mod token;

pub use event::{BookOrder, Event, Market, MarketKind, MarketLookup, RestingBook, ThreeWayLeg};
pub use position::Position;
pub use token::{TokenInfo, TokenRegistry};
