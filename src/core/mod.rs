//! Core business logic abstractions

pub mod aggregator;
pub mod config;
pub mod cost_basis;
pub mod currency;
pub mod ledger;
pub mod log;
pub mod price;
pub mod summary;
pub mod transaction;
pub mod valuation;

// Re-export main types for cleaner imports
pub use currency::CurrencyRateProvider;
pub use ledger::{Ledger, LedgerError, TransactionStore};
pub use price::{PriceBatch, PriceProviderClient, Warning};
pub use summary::{PortfolioSummary, PortfolioSummaryEntry, ZeroCostReturnPolicy};
pub use transaction::{AssetClass, Operation, Transaction, TransactionInput};
