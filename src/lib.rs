//! # degens-mm
//!
//! Market-making client for the Degens betting exchange.
//!
//! ## Architecture
//!
//! The crate is organized in layers:
//!
//! 1. **Core**: shared newtypes, domain models, errors, configuration
//! 2. **Wire**: `WsClient`, the `opcode|id|body` protocol over one WebSocket
//! 3. **State**: immutable topic snapshots kept current by patch batches
//! 4. **Pricing**: odds conversion, fair values, quotes, market selection
//! 5. **Orders**: SQLite-backed resting orders, signing, create/amend rules
//! 6. **Driver**: `DegensClient`, the reflector poller and `MarketMaker`
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use degens_mm::prelude::*;
//!
//! let client = DegensClient::new(WsConfig::default());
//! client.subscribe_account(&maker, AccountTopics { positions: true, order_fills: true })?;
//! client.subscribe_events()?;
//! client.connect();
//!
//! while let Some(event) = client.next_event().await {
//!     let state = client.state().await;
//!     println!("{} events", state.events().len());
//! }
//! ```

// ── Layer 1: Core ────────────────────────────────────────────────────────────

/// Shared newtypes, fixed-point prices and wei amounts.
pub mod shared;

/// Domain models: events, markets, positions, tokens.
pub mod domain;

/// Unified error types.
pub mod error;

/// Network URL and contract constants.
pub mod network;

/// TOML configuration, strategies and matchers.
pub mod config;

// ── Layer 2: Wire ────────────────────────────────────────────────────────────

/// WebSocket client: frames, subscriptions, reconnects.
pub mod ws;

// ── Layer 3: State ───────────────────────────────────────────────────────────

/// Topic snapshots and patch application.
pub mod state;

// ── Layer 4: Pricing ─────────────────────────────────────────────────────────

/// Odds formats, fair values and quotes.
pub mod pricing;

// ── Layer 5: Orders ──────────────────────────────────────────────────────────

/// Resting-order store, signing and lifecycle.
pub mod orders;

// ── Layer 6: Driver ──────────────────────────────────────────────────────────

/// `DegensClient`: wire client plus synchronized state.
pub mod client;

/// Reflected prices poller.
pub mod feed;

/// Single-flight gates.
pub mod scheduler;

/// `MarketMaker`: the update pass.
pub mod engine;

// ── Prelude ──────────────────────────────────────────────────────────────────

pub mod prelude {
    // Shared newtypes
    pub use crate::shared::{Direction, EventId, MarketId, RequestId, MAX_PRICE, WEI_PER_ETHER};

    // Domain
    pub use crate::domain::{
        BookOrder, Event, Market, MarketKind, MarketLookup, Position, RestingBook, TokenInfo,
        TokenRegistry,
    };

    // Config + errors
    pub use crate::config::{Matcher, MmConfig, StrategyConfig};
    pub use crate::error::{ConfigError, FeedError, MmError, PatchError, SignError, StoreError, WsError};

    // Wire
    pub use crate::ws::{Op, TopicSpec, WsClient, WsConfig, WsEvent};

    // State
    pub use crate::state::{ExchangeState, Snapshot, TopicKey};

    // Pricing
    pub use crate::pricing::{
        analyze_multi_outcome, analyze_two_outcome, compute_quote, parse_odds, render_odds,
        EventOdds, FairValue, OddsFormat, ProviderQuote, Quote, QuoteParams,
    };

    // Orders
    pub use crate::orders::{
        LocalOrderSigner, OrderLifecycleManager, OrderSettings, OrderSigner, OrderStore,
        SignedOrder, SqliteOrderStore,
    };

    // Driver
    pub use crate::client::{AccountTopics, ClientEvent, DegensClient};
    pub use crate::engine::MarketMaker;
    pub use crate::feed::{FeedConfig, OddsBook, ReflectedPrices};
    pub use crate::scheduler::{GateSet, IfRunning, SingleFlightGate};
}
