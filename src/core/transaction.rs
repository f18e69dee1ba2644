//! Ledger records and the validation applied before they enter the ledger.

use crate::core::ledger::LedgerError;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetClass {
    Crypto,
    Stock,
    Forex,
    /// Missing or unrecognized class on a stored record.
    #[default]
    #[serde(other)]
    Unknown,
}

impl Display for AssetClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                AssetClass::Crypto => "crypto",
                AssetClass::Stock => "stock",
                AssetClass::Forex => "forex",
                AssetClass::Unknown => "unknown",
            }
        )
    }
}

impl FromStr for AssetClass {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "crypto" => Ok(AssetClass::Crypto),
            "stock" | "equity" => Ok(AssetClass::Stock),
            "forex" | "fx" => Ok(AssetClass::Forex),
            _ => Err(anyhow::anyhow!("Invalid asset class: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Buy,
    Sell,
}

impl Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Buy => write!(f, "buy"),
            Operation::Sell => write!(f, "sell"),
        }
    }
}

impl FromStr for Operation {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "buy" => Ok(Operation::Buy),
            "sell" => Ok(Operation::Sell),
            _ => Err(anyhow::anyhow!("Invalid operation: {}", s)),
        }
    }
}

/// An immutable ledger entry. Amounts are USD.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub symbol: String,
    #[serde(default)]
    pub asset_class: AssetClass,
    pub operation: Operation,
    pub quantity: f64,
    pub unit_price: f64,
    #[serde(default)]
    pub fee: f64,
    pub timestamp: DateTime<Utc>,
    /// Insertion order within the owner's ledger, assigned by the store.
    /// Orders records that share a timestamp.
    #[serde(default)]
    pub sequence: u64,
}

impl Transaction {
    /// Chronological order with ties broken by insertion order.
    pub fn ledger_order(&self) -> (DateTime<Utc>, u64) {
        (self.timestamp, self.sequence)
    }

    /// Key used to recognise the same trade recorded twice in different stores.
    pub fn dedup_key(&self) -> (String, i64, u64, u64, Operation) {
        (
            self.symbol.clone(),
            self.timestamp.timestamp_millis(),
            self.quantity.to_bits(),
            self.unit_price.to_bits(),
            self.operation,
        )
    }
}

/// How the price of a new transaction was entered.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PriceInput {
    UnitPrice(f64),
    /// Total paid or received, excluding fees.
    TotalCost(f64),
}

/// User supplied fields for a new or replacement transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionInput {
    pub symbol: String,
    pub asset_class: AssetClass,
    pub operation: Operation,
    pub quantity: f64,
    pub price: PriceInput,
    pub fee: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl TransactionInput {
    /// Checks every field and produces a record with the given identity.
    pub fn into_transaction(self, id: impl Into<String>) -> Result<Transaction, LedgerError> {
        let symbol = self.symbol.trim().to_uppercase();
        if symbol.is_empty() {
            return Err(LedgerError::validation("symbol", "must not be empty"));
        }
        if self.asset_class == AssetClass::Unknown {
            return Err(LedgerError::validation(
                "asset_class",
                "must be one of crypto, stock or forex",
            ));
        }
        if !self.quantity.is_finite() || self.quantity <= 0.0 {
            return Err(LedgerError::validation("quantity", "must be a positive number"));
        }

        let unit_price = match self.price {
            PriceInput::UnitPrice(price) => price,
            PriceInput::TotalCost(total) => {
                if !total.is_finite() || total <= 0.0 {
                    return Err(LedgerError::validation("total", "must be a positive number"));
                }
                total / self.quantity
            }
        };
        if !unit_price.is_finite() || unit_price <= 0.0 {
            return Err(LedgerError::validation("unit_price", "must be a positive number"));
        }

        let fee = self.fee.unwrap_or(0.0);
        if !fee.is_finite() || fee < 0.0 {
            return Err(LedgerError::validation("fee", "must not be negative"));
        }

        Ok(Transaction {
            id: id.into(),
            symbol,
            asset_class: self.asset_class,
            operation: self.operation,
            quantity: self.quantity,
            unit_price,
            fee,
            timestamp: self.timestamp,
            sequence: 0,
        })
    }
}

/// Accepts RFC 3339 timestamps or plain `YYYY-MM-DD` dates (midnight UTC).
pub fn parse_timestamp(s: &str) -> anyhow::Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Ok(ts.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| anyhow::anyhow!("Invalid date '{}': {}", s, e))?;
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc())
        .ok_or_else(|| anyhow::anyhow!("Invalid date '{}'", s))
}
