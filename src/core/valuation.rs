//! One valuation pass: positions from the ledger, prices from the
//! aggregator, and the summary built from both.

use crate::core::aggregator::PriceAggregator;
use crate::core::cost_basis::compute_positions;
use crate::core::price::Warning;
use crate::core::summary::{PortfolioSummary, ZeroCostReturnPolicy, build_summary};
use crate::core::transaction::Transaction;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValuationReport {
    pub summary: PortfolioSummary,
    pub warnings: Vec<Warning>,
}

pub async fn run_valuation(
    transactions: &[Transaction],
    aggregator: &PriceAggregator,
    policy: ZeroCostReturnPolicy,
) -> ValuationReport {
    let positions = compute_positions(transactions);
    let prices = aggregator.fetch_prices(transactions).await;
    let summary = build_summary(&positions, &prices.prices, policy);
    info!(
        assets = summary.entries.len(),
        warnings = prices.warnings.len(),
        "Valuation finished"
    );
    ValuationReport {
        summary,
        warnings: prices.warnings,
    }
}

/// Identifies one started pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PassTicket(u64);

/// Keeps the report of the most recently started pass.
///
/// Passes are not cancelled when a newer one starts; a superseded pass that
/// finishes late is simply not published.
#[derive(Default)]
pub struct PassTracker {
    generation: AtomicU64,
    latest: Mutex<Option<ValuationReport>>,
}

impl PassTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self) -> PassTicket {
        PassTicket(self.generation.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn is_current(&self, ticket: PassTicket) -> bool {
        self.generation.load(Ordering::SeqCst) == ticket.0
    }

    /// Stores `report` if `ticket` is still the newest. Returns whether it was
    /// accepted.
    pub fn publish(&self, ticket: PassTicket, report: ValuationReport) -> bool {
        let mut latest = match self.latest.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        // Checked under the lock so a stale pass cannot overwrite a newer one.
        if !self.is_current(ticket) {
            debug!(ticket = ticket.0, "Discarding stale valuation");
            return false;
        }
        *latest = Some(report);
        true
    }

    pub fn latest(&self) -> Option<ValuationReport> {
        match self.latest.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::price::{PriceBatch, PriceProviderClient};
    use crate::core::transaction::{AssetClass, Operation};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeSet;
    use std::sync::Arc;

    struct FixedClient(Vec<(&'static str, f64)>);

    #[async_trait]
    impl PriceProviderClient for FixedClient {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn fetch_prices(&self, symbols: &BTreeSet<String>) -> PriceBatch {
            let mut batch = PriceBatch::new();
            for (symbol, price) in &self.0 {
                if symbols.contains(*symbol) {
                    batch.insert_price(symbol, *price);
                }
            }
            for symbol in symbols {
                if !batch.prices.contains_key(symbol) {
                    batch.warn(format!("no price for {symbol}"));
                }
            }
            batch
        }
    }

    fn tx(symbol: &str, class: AssetClass, op: Operation, qty: f64, price: f64, day: u32) -> Transaction {
        Transaction {
            id: format!("{symbol}-{day}"),
            symbol: symbol.to_string(),
            asset_class: class,
            operation: op,
            quantity: qty,
            unit_price: price,
            fee: 0.0,
            timestamp: Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap(),
            sequence: 0,
        }
    }

    fn aggregator() -> PriceAggregator {
        PriceAggregator::new(
            Arc::new(FixedClient(vec![("BTC", 20000.0)])),
            Arc::new(FixedClient(vec![])),
            Arc::new(FixedClient(vec![("EURUSD", 1.1)])),
            &["USDT".to_string()],
        )
    }

    #[tokio::test]
    async fn test_run_valuation() {
        let txs = vec![
            tx("BTC", AssetClass::Crypto, Operation::Buy, 2.0, 10000.0, 1),
            tx("BTC", AssetClass::Crypto, Operation::Sell, 1.0, 15000.0, 2),
            tx("AAPL", AssetClass::Stock, Operation::Buy, 1.0, 50.0, 3),
        ];

        let report = run_valuation(&txs, &aggregator(), ZeroCostReturnPolicy::default()).await;

        let btc = report.summary.get("BTC").unwrap();
        assert_eq!(btc.current_value, 20000.0);
        assert_eq!(btc.realized_pl, 5000.0);
        assert_eq!(btc.total_pl, 15000.0);
        assert!(!btc.is_fallback_price);

        let aapl = report.summary.get("AAPL").unwrap();
        assert!(aapl.is_fallback_price);
        assert_eq!(aapl.current_price, 50.0);
        assert_eq!(report.warnings, vec![Warning::new("no price for AAPL")]);
    }

    #[tokio::test]
    async fn test_empty_ledger() {
        let report = run_valuation(&[], &aggregator(), ZeroCostReturnPolicy::default()).await;
        assert!(report.summary.is_empty());
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_stale_pass_is_discarded() {
        let tracker = PassTracker::new();
        let first = tracker.begin();
        let second = tracker.begin();

        let newer = ValuationReport {
            warnings: vec![Warning::new("second")],
            ..ValuationReport::default()
        };
        assert!(tracker.publish(second, newer.clone()));

        let older = ValuationReport {
            warnings: vec![Warning::new("first")],
            ..ValuationReport::default()
        };
        assert!(!tracker.publish(first, older));
        assert_eq!(tracker.latest(), Some(newer));
        assert!(!tracker.is_current(first));
    }
}
