//! Market-maker configuration.
//!
//! Loaded from a TOML file, then selected secrets are overridden from the
//! environment. [`MmConfig::validate`] must pass before anything connects.

use crate::error::ConfigError;
use crate::network::{DEFAULT_CONTRACT_ADDR, DEFAULT_WS_URL};
use crate::pricing::quote::QuoteParams;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

pub const ENV_PRIVATE_KEY: &str = "DEGENS_MM_PRIVATE_KEY";
pub const ENV_REFLECTOR_API_KEY: &str = "DEGENS_MM_REFLECTOR_API_KEY";
pub const ENV_ORDERBOOK_ENDPOINT: &str = "DEGENS_MM_ORDERBOOK_ENDPOINT";

const DEFAULT_MIN_MARKUP: f64 = 1.01;
const DEFAULT_MARKUP_MULT: f64 = 1.0;

// ─── Matcher ─────────────────────────────────────────────────────────────────

/// Filter on a sport, league or market type.
///
/// In TOML a matcher is written as a plain string (exact match),
/// `{ not = "Soccer" }` or `{ any_of = ["NBA", "NFL"] }`.
#[derive(Clone)]
pub enum Matcher {
    Exact(String),
    Predicate(Arc<dyn Fn(&str) -> bool + Send + Sync>),
}

impl Matcher {
    pub fn predicate(f: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        Matcher::Predicate(Arc::new(f))
    }

    pub fn matches(&self, value: &str) -> bool {
        match self {
            Matcher::Exact(expected) => expected == value,
            Matcher::Predicate(f) => f(value),
        }
    }
}

impl fmt::Debug for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Matcher::Exact(s) => f.debug_tuple("Exact").field(s).finish(),
            Matcher::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawMatcher {
    Exact(String),
    Not { not: String },
    AnyOf { any_of: Vec<String> },
}

impl<'de> Deserialize<'de> for Matcher {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Ok(match RawMatcher::deserialize(deserializer)? {
            RawMatcher::Exact(s) => Matcher::Exact(s),
            RawMatcher::Not { not } => Matcher::predicate(move |v| v != not),
            RawMatcher::AnyOf { any_of } => {
                Matcher::predicate(move |v| any_of.iter().any(|candidate| candidate == v))
            }
        })
    }
}

// ─── Strategies ──────────────────────────────────────────────────────────────

/// Fallback quoting parameters shared by all strategies.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StrategyDefaults {
    #[serde(default)]
    pub base_amount: Option<f64>,
    #[serde(default)]
    pub min_markup: Option<f64>,
    #[serde(default)]
    pub markup_mult: Option<f64>,
    #[serde(default)]
    pub odds_limit: Option<f64>,
}

/// One quoting strategy. Strategies are tried in file order; the first one
/// whose filters match and whose odds source can price the market wins.
#[derive(Debug, Clone, Deserialize)]
pub struct StrategyConfig {
    /// Key of the provider in the price feed, e.g. `"betfair"`.
    pub odds_source: String,
    #[serde(default)]
    pub base_amount: Option<f64>,
    #[serde(default)]
    pub min_markup: Option<f64>,
    #[serde(default)]
    pub markup_mult: Option<f64>,
    #[serde(default)]
    pub odds_limit: Option<f64>,
    #[serde(default)]
    pub sport: Option<Matcher>,
    #[serde(default)]
    pub league: Option<Matcher>,
    #[serde(default)]
    pub market_type: Option<Matcher>,
}

impl StrategyConfig {
    pub fn new(odds_source: impl Into<String>) -> Self {
        Self {
            odds_source: odds_source.into(),
            base_amount: None,
            min_markup: None,
            markup_mult: None,
            odds_limit: None,
            sport: None,
            league: None,
            market_type: None,
        }
    }

    /// Whether this strategy applies to a market. Unset filters match all.
    pub fn applies_to(&self, sport: &str, league: &str, market_type: &str) -> bool {
        let check = |matcher: &Option<Matcher>, value: &str| {
            matcher.as_ref().map_or(true, |m| m.matches(value))
        };
        check(&self.sport, sport) && check(&self.league, league) && check(&self.market_type, market_type)
    }
}

// ─── MmConfig ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct MmConfig {
    /// Hex secp256k1 key of the maker account.
    #[serde(default)]
    pub private_key: String,
    #[serde(default = "default_db_path")]
    pub db_path: String,

    #[serde(default = "default_orderbook_endpoint")]
    pub orderbook_endpoint: String,
    /// Client version announced in the handshake.
    #[serde(default)]
    pub version_name: String,

    #[serde(default)]
    pub reflector_url: String,
    #[serde(default)]
    pub reflector_api_key: String,
    #[serde(default = "default_reflector_interval_ms")]
    pub reflector_interval_ms: u64,

    #[serde(default = "default_chain_id")]
    pub chain_id: u64,
    #[serde(default = "default_contract_addr")]
    pub contract_addr: String,
    #[serde(default)]
    pub token_addr: String,

    #[serde(default = "default_order_expiry")]
    pub order_expiry_time_seconds: i64,
    /// Minimum time between two passes over the same event.
    #[serde(default = "default_order_refresh")]
    pub order_refresh_time_seconds: i64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,

    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Cap on the number of markets quoted per type (`spread`, `total`, ...).
    #[serde(default)]
    pub market_type_limits: HashMap<String, usize>,
    #[serde(default)]
    pub default_strategy: StrategyDefaults,
    #[serde(default)]
    pub strategies: Vec<StrategyConfig>,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_db_path() -> String {
    "degens-mm.db".to_string()
}

fn default_orderbook_endpoint() -> String {
    DEFAULT_WS_URL.to_string()
}

fn default_reflector_interval_ms() -> u64 {
    30_000
}

fn default_chain_id() -> u64 {
    1
}

fn default_contract_addr() -> String {
    DEFAULT_CONTRACT_ADDR.to_string()
}

fn default_order_expiry() -> i64 {
    300
}

fn default_order_refresh() -> i64 {
    60
}

fn default_poll_interval() -> u64 {
    2
}

fn default_ping_interval_ms() -> u64 {
    55_000
}

fn default_request_timeout_ms() -> u64 {
    5_000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl MmConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Apply environment variable overrides for secrets and the endpoint.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup(ENV_PRIVATE_KEY) {
            self.private_key = key;
        }
        if let Some(key) = lookup(ENV_REFLECTOR_API_KEY) {
            self.reflector_api_key = key;
        }
        if let Some(endpoint) = lookup(ENV_ORDERBOOK_ENDPOINT) {
            self.orderbook_endpoint = endpoint;
        }
    }

    /// Refuse to start with a partial configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.private_key.is_empty() {
            return Err(ConfigError::Missing("private_key"));
        }
        let key = self.private_key.trim_start_matches("0x");
        match hex::decode(key) {
            Ok(bytes) if bytes.len() == 32 => {}
            _ => {
                return Err(ConfigError::Invalid {
                    field: "private_key",
                    reason: "expected 32 hex-encoded bytes".into(),
                })
            }
        }

        for (field, value) in [
            ("orderbook_endpoint", &self.orderbook_endpoint),
            ("version_name", &self.version_name),
            ("reflector_url", &self.reflector_url),
            ("reflector_api_key", &self.reflector_api_key),
            ("db_path", &self.db_path),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Missing(field));
            }
        }

        for (field, value) in [
            ("contract_addr", &self.contract_addr),
            ("token_addr", &self.token_addr),
        ] {
            if !is_address(value) {
                return Err(ConfigError::Invalid {
                    field,
                    reason: format!("{:?} is not a 20-byte hex address", value),
                });
            }
        }

        if self.order_expiry_time_seconds <= 0 {
            return Err(ConfigError::Invalid {
                field: "order_expiry_time_seconds",
                reason: "must be positive".into(),
            });
        }
        if self.poll_interval_seconds == 0 {
            return Err(ConfigError::Invalid {
                field: "poll_interval_seconds",
                reason: "must be positive".into(),
            });
        }

        if self.strategies.is_empty() {
            return Err(ConfigError::Missing("strategies"));
        }

        for strategy in &self.strategies {
            let params = self.quote_params(strategy);
            if params.base_amount.is_nan() || params.base_amount <= 0.0 {
                return Err(ConfigError::Invalid {
                    field: "base_amount",
                    reason: format!("strategy {:?} has no positive base amount", strategy.odds_source),
                });
            }
            if let Some(limit) = params.odds_limit {
                if limit.is_nan() || limit <= 1.0 {
                    return Err(ConfigError::Invalid {
                        field: "odds_limit",
                        reason: format!("{} must be greater than 1", limit),
                    });
                }
            }
        }

        Ok(())
    }

    /// Effective parameters for a strategy: built-in defaults, overridden by
    /// `default_strategy`, overridden by the strategy itself.
    pub fn quote_params(&self, strategy: &StrategyConfig) -> QuoteParams {
        let defaults = &self.default_strategy;
        QuoteParams {
            base_amount: strategy.base_amount.or(defaults.base_amount).unwrap_or(0.0),
            min_markup: strategy
                .min_markup
                .or(defaults.min_markup)
                .unwrap_or(DEFAULT_MIN_MARKUP),
            markup_mult: strategy
                .markup_mult
                .or(defaults.markup_mult)
                .unwrap_or(DEFAULT_MARKUP_MULT),
            odds_limit: strategy.odds_limit.or(defaults.odds_limit),
        }
    }

    /// Lowercased maker address derived from the private key.
    pub fn maker_address(&self) -> Result<String, ConfigError> {
        crate::orders::signing::address_from_key(&self.private_key).map_err(|e| {
            ConfigError::Invalid {
                field: "private_key",
                reason: e.to_string(),
            }
        })
    }
}

fn is_address(value: &str) -> bool {
    value
        .strip_prefix("0x")
        .map(|hex_part| hex_part.len() == 40 && hex::decode(hex_part).is_ok())
        .unwrap_or(false)
}
