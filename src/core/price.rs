//! Pricing abstractions and core types

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt::Display;

/// A non-fatal diagnostic about a degraded or missing data point.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct Warning(String);

impl Warning {
    pub fn new(message: impl Into<String>) -> Self {
        Warning(message.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

impl Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Prices in USD keyed by upper-case symbol, plus the warnings collected
/// while resolving them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceBatch {
    pub prices: HashMap<String, f64>,
    pub warnings: Vec<Warning>,
}

impl PriceBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_price(&mut self, symbol: &str, price: f64) {
        self.prices.insert(symbol.to_uppercase(), price);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(Warning::new(message));
    }

    /// Applies `later` on top of `self`: shared price keys take `later`'s
    /// value, warnings are appended in order.
    pub fn merge(&mut self, later: PriceBatch) {
        for (symbol, price) in later.prices {
            self.prices.insert(symbol, price);
        }
        self.warnings.extend(later.warnings);
    }
}

/// One market-data source for a single asset class.
///
/// Implementations never fail: transport errors, rate limits and unknown
/// symbols all end up as warnings in the returned batch.
#[async_trait]
pub trait PriceProviderClient: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch_prices(&self, symbols: &BTreeSet<String>) -> PriceBatch;
}

/// Interprets a JSON number or numeric string as a price. Anything that is
/// not a positive finite number counts as missing.
pub fn parse_price(value: &serde_json::Value) -> Option<f64> {
    let price = match value {
        serde_json::Value::Number(n) => n.as_f64()?,
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    (price.is_finite() && price > 0.0).then_some(price)
}
