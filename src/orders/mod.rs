//! Resting-order lifecycle: persistence, signing and create/amend decisions.

pub mod manager;
pub mod signing;
pub mod store;

pub use manager::{OrderAction, OrderLifecycleManager, OrderSettings, SkipReason};
pub use signing::{LocalOrderSigner, Order, OrderSigner, SignedOrder};
pub use store::{LiveOrder, NewLiveOrder, OrderStore, SqliteOrderStore};
