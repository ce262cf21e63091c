//! Market lookup by type and line, plus point-spread string helpers.

use super::{Market, MarketKind};
use crate::shared::{natural_cmp, MarketId};
use std::collections::BTreeMap;

/// Markets of one event grouped by type.
///
/// Three-way legs and moneylines are single entries keyed by their type tag
/// (`1x2_1`, `1x2_x`, `1x2_2`, `ml`). Spreads and totals are grouped under
/// `spread`/`total` and keyed by line. A later market with the same key
/// replaces an earlier one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarketLookup {
    singles: BTreeMap<String, MarketId>,
    lines: BTreeMap<String, BTreeMap<String, MarketId>>,
}

impl MarketLookup {
    pub fn build(markets: &[Market]) -> Self {
        let mut lookup = Self::default();

        for market in markets {
            match &market.kind {
                MarketKind::ThreeWay(_) | MarketKind::Moneyline => {
                    lookup
                        .singles
                        .insert(market.kind.type_tag().to_string(), market.id.clone());
                }
                MarketKind::Spread(line) | MarketKind::Total(line) => {
                    lookup
                        .lines
                        .entry(market.kind.type_tag().to_string())
                        .or_default()
                        .insert(line.clone(), market.id.clone());
                }
                MarketKind::Unknown(tag) => {
                    tracing::error!(market_id = %market.id, market_type = %tag, "Unrecognized market type");
                }
            }
        }

        lookup
    }

    /// Single-entry market for a type tag.
    pub fn single(&self, type_tag: &str) -> Option<&MarketId> {
        self.singles.get(type_tag)
    }

    /// Line-keyed market, e.g. `line("spread", "-1.5")`.
    pub fn line(&self, type_tag: &str, line: &str) -> Option<&MarketId> {
        self.lines.get(type_tag)?.get(line)
    }

    /// Every type tag with its markets in natural id order.
    pub fn groups(&self) -> Vec<(String, Vec<MarketId>)> {
        let mut out: Vec<(String, Vec<MarketId>)> = self
            .singles
            .iter()
            .map(|(tag, id)| (tag.clone(), vec![id.clone()]))
            .collect();

        for (tag, by_line) in &self.lines {
            let mut ids: Vec<MarketId> = by_line.values().cloned().collect();
            ids.sort_by(|a, b| natural_cmp(a.as_str(), b.as_str()));
            out.push((tag.clone(), ids));
        }

        out
    }

    pub fn is_empty(&self) -> bool {
        self.singles.is_empty() && self.lines.is_empty()
    }
}

/// The same line seen from the other side: `-3.5` ↔ `3.5`.
pub fn invert_point_spread(line: &str) -> String {
    if let Some(rest) = line.strip_prefix('-') {
        rest.to_string()
    } else if let Some(rest) = line.strip_prefix('+') {
        format!("-{}", rest)
    } else {
        format!("-{}", line)
    }
}

/// Explicit sign for display: `3.5` → `+3.5`.
pub fn format_point_spread(line: &str) -> String {
    if line.starts_with('-') || line.starts_with('+') {
        line.to_string()
    } else {
        format!("+{}", line)
    }
}
