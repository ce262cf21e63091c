//! Token registry built from the handshake configuration.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// One entry of the exchange's token table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenInfo {
    /// Symbol the token is keyed by in the config (`"ETH"`, `"DAI"`).
    #[serde(default)]
    pub sym: String,
    pub addr: String,
    /// Remaining metadata (decimals, display name, ...), kept opaque.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Token address (lowercased) → token info.
#[derive(Debug, Clone, Default)]
pub struct TokenRegistry {
    by_addr: HashMap<String, TokenInfo>,
}

impl TokenRegistry {
    /// Index the `tokens` table of a hello response config.
    ///
    /// Entries without a usable `addr` are logged and left out.
    pub fn from_config(config: &Value) -> Self {
        let mut by_addr = HashMap::new();

        let Some(tokens) = config.get("tokens").and_then(Value::as_object) else {
            tracing::warn!("Exchange config has no token table");
            return Self { by_addr };
        };

        for (sym, raw) in tokens {
            match serde_json::from_value::<TokenInfo>(raw.clone()) {
                Ok(mut info) => {
                    info.sym = sym.clone();
                    by_addr.insert(info.addr.to_lowercase(), info);
                }
                Err(e) => tracing::warn!(sym = %sym, error = %e, "Skipping malformed token entry"),
            }
        }

        Self { by_addr }
    }

    /// Case-insensitive lookup by contract address.
    pub fn get(&self, addr: &str) -> Option<&TokenInfo> {
        self.by_addr.get(&addr.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.by_addr.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_addr.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_config_indexes_by_lowercase_addr() {
        let config = json!({
            "tokens": {
                "ETH": {"addr": "0xAbC0000000000000000000000000000000000001", "decimals": 18},
                "DAI": {"addr": "0x6B175474E89094C44Da98b954EedeAC495271d0F"},
            }
        });
        let reg = TokenRegistry::from_config(&config);

        assert_eq!(reg.len(), 2);
        let eth = reg.get("0xabc0000000000000000000000000000000000001").unwrap();
        assert_eq!(eth.sym, "ETH");
        assert_eq!(eth.extra.get("decimals"), Some(&json!(18)));
        assert_eq!(
            reg.get("0x6b175474e89094c44da98b954eedeac495271d0f").unwrap().sym,
            "DAI"
        );
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let reg = TokenRegistry::from_config(&json!({"tokens": {"ETH": {"addr": "0xabcd"}}}));
        assert!(reg.get("0xABCD").is_some());
        assert!(reg.get("0xdead").is_none());
    }

    #[test]
    fn test_missing_or_malformed_tokens() {
        assert!(TokenRegistry::from_config(&json!({})).is_empty());
        let reg = TokenRegistry::from_config(&json!({"tokens": {"BAD": {"name": "x"}}}));
        assert!(reg.is_empty());
    }
}
