//! Weighted-average cost basis over a transaction history.

use crate::core::transaction::{AssetClass, Operation, Transaction};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Magnitudes below this are treated as zero.
pub const EPSILON: f64 = 1e-9;

/// Running state for one symbol, derived from its full history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetPosition {
    pub symbol: String,
    pub asset_class: AssetClass,
    pub quantity: f64,
    pub total_cost_basis: f64,
    pub average_buy_price: f64,
    pub realized_pl: f64,
    /// Cumulative buy cost including fees; never reduced by sells.
    pub total_invested: f64,
    pub transaction_count: usize,
}

impl AssetPosition {
    fn new(symbol: &str) -> Self {
        AssetPosition {
            symbol: symbol.to_string(),
            asset_class: AssetClass::Unknown,
            quantity: 0.0,
            total_cost_basis: 0.0,
            average_buy_price: 0.0,
            realized_pl: 0.0,
            total_invested: 0.0,
            transaction_count: 0,
        }
    }

    fn apply(&mut self, tx: &Transaction) {
        if tx.asset_class != AssetClass::Unknown {
            self.asset_class = tx.asset_class;
        }
        self.transaction_count += 1;

        match tx.operation {
            Operation::Buy => {
                let cost = tx.quantity * tx.unit_price + tx.fee;
                self.quantity += tx.quantity;
                self.total_cost_basis += cost;
                self.total_invested += cost;
            }
            Operation::Sell => {
                if tx.quantity > self.quantity + EPSILON {
                    warn!(
                        symbol = %self.symbol,
                        held = self.quantity,
                        sold = tx.quantity,
                        "Sell exceeds held quantity"
                    );
                }
                let average_cost = if self.quantity > 0.0 {
                    self.total_cost_basis / self.quantity
                } else {
                    0.0
                };
                let cost_of_sold = average_cost * tx.quantity.min(self.quantity.max(0.0));
                let proceeds = tx.quantity * tx.unit_price - tx.fee;

                self.realized_pl += proceeds - cost_of_sold;
                self.quantity -= tx.quantity;
                self.total_cost_basis -= cost_of_sold;

                if self.quantity < EPSILON {
                    self.quantity = 0.0;
                    self.total_cost_basis = 0.0;
                }
            }
        }
    }

    fn finish(&mut self) {
        if self.quantity > EPSILON {
            self.average_buy_price = self.total_cost_basis / self.quantity;
        } else {
            self.quantity = 0.0;
            self.average_buy_price = 0.0;
            self.total_cost_basis = 0.0;
        }
    }
}

/// Folds `transactions` into one position per symbol.
///
/// Transactions are replayed in timestamp order. Entries sharing a timestamp
/// replay in insertion order (`sequence`), and then in input order.
pub fn compute_positions(transactions: &[Transaction]) -> BTreeMap<String, AssetPosition> {
    let mut ordered: Vec<&Transaction> = transactions.iter().collect();
    ordered.sort_by_key(|tx| tx.ledger_order());

    let mut positions: BTreeMap<String, AssetPosition> = BTreeMap::new();
    for tx in ordered {
        let symbol = tx.symbol.trim().to_uppercase();
        positions
            .entry(symbol.clone())
            .or_insert_with(|| AssetPosition::new(&symbol))
            .apply(tx);
    }

    for position in positions.values_mut() {
        position.finish();
        debug!(
            symbol = %position.symbol,
            quantity = position.quantity,
            cost_basis = position.total_cost_basis,
            realized = position.realized_pl,
            "Computed position"
        );
    }

    positions
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn tx(symbol: &str, op: Operation, quantity: f64, price: f64, fee: f64, day: i64) -> Transaction {
        Transaction {
            id: format!("{symbol}-{day}-{op}"),
            symbol: symbol.to_string(),
            asset_class: AssetClass::Crypto,
            operation: op,
            quantity,
            unit_price: price,
            fee,
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(day),
            sequence: 0,
        }
    }

    #[test]
    fn test_buy_only_sums_cost_and_quantity() {
        let txs = vec![
            tx("ETH", Operation::Buy, 1.5, 2000.0, 3.0, 0),
            tx("ETH", Operation::Buy, 0.5, 2400.0, 1.0, 1),
            tx("ETH", Operation::Buy, 2.0, 1800.0, 0.0, 2),
        ];
        let positions = compute_positions(&txs);
        let eth = &positions["ETH"];
        assert_eq!(eth.quantity, 4.0);
        assert_eq!(eth.total_cost_basis, 3000.0 + 3.0 + 1200.0 + 1.0 + 3600.0);
        assert_eq!(eth.total_invested, eth.total_cost_basis);
        assert_eq!(eth.realized_pl, 0.0);
        assert_eq!(eth.transaction_count, 3);
    }

    #[test]
    fn test_full_exit_zeroes_position() {
        let txs = vec![
            tx("SOL", Operation::Buy, 3.0, 10.0, 0.0, 0),
            tx("SOL", Operation::Sell, 3.0, 15.0, 1.5, 1),
        ];
        let sol = &compute_positions(&txs)["SOL"];
        assert_eq!(sol.quantity, 0.0);
        assert_eq!(sol.total_cost_basis, 0.0);
        assert_eq!(sol.average_buy_price, 0.0);
        assert!((sol.realized_pl - (45.0 - 1.5 - 30.0)).abs() < EPSILON);
        assert_eq!(sol.total_invested, 30.0);
    }

    #[test]
    fn test_weighted_average_cost() {
        let txs = vec![
            tx("BTC", Operation::Buy, 1.0, 100.0, 0.0, 0),
            tx("BTC", Operation::Buy, 1.0, 200.0, 0.0, 1),
        ];
        let btc = &compute_positions(&txs)["BTC"];
        assert_eq!(btc.average_buy_price, 150.0);

        let mut with_sell = txs.clone();
        with_sell.push(tx("BTC", Operation::Sell, 1.0, 180.0, 0.0, 2));
        let btc = &compute_positions(&with_sell)["BTC"];
        assert_eq!(btc.realized_pl, 30.0);
        assert_eq!(btc.quantity, 1.0);
        assert_eq!(btc.total_cost_basis, 150.0);
        assert_eq!(btc.average_buy_price, 150.0);
    }

    #[test]
    fn test_replays_in_time_order_regardless_of_input_order() {
        // Stores list newest first.
        let txs = vec![
            tx("BTC", Operation::Sell, 1.0, 15000.0, 0.0, 5),
            tx("BTC", Operation::Buy, 2.0, 10000.0, 0.0, 0),
        ];
        let btc = &compute_positions(&txs)["BTC"];
        assert_eq!(btc.quantity, 1.0);
        assert_eq!(btc.total_cost_basis, 10000.0);
        assert_eq!(btc.realized_pl, 5000.0);
    }

    #[test]
    fn test_same_timestamp_without_sequence_keeps_input_order() {
        // Sell listed before buy at the same instant: the sell finds nothing held.
        let txs = vec![
            tx("ADA", Operation::Sell, 1.0, 2.0, 0.0, 0),
            tx("ADA", Operation::Buy, 1.0, 1.0, 0.0, 0),
        ];
        let ada = &compute_positions(&txs)["ADA"];
        assert_eq!(ada.realized_pl, 2.0);
        assert_eq!(ada.quantity, 1.0);
        assert_eq!(ada.total_cost_basis, 1.0);

        let reversed: Vec<_> = txs.into_iter().rev().collect();
        let ada = &compute_positions(&reversed)["ADA"];
        assert_eq!(ada.realized_pl, 1.0);
        assert_eq!(ada.quantity, 0.0);
    }

    #[test]
    fn test_same_timestamp_replays_by_sequence() {
        let buy = Transaction {
            sequence: 1,
            ..tx("ADA", Operation::Buy, 2.0, 10.0, 0.0, 0)
        };
        let sell = Transaction {
            sequence: 2,
            ..tx("ADA", Operation::Sell, 1.0, 15.0, 0.0, 0)
        };

        for txs in [vec![buy.clone(), sell.clone()], vec![sell, buy]] {
            let ada = &compute_positions(&txs)["ADA"];
            assert_eq!(ada.realized_pl, 5.0);
            assert_eq!(ada.quantity, 1.0);
            assert_eq!(ada.total_cost_basis, 10.0);
        }
    }

    #[test]
    fn test_oversell_is_tolerated_and_clamped() {
        let txs = vec![
            tx("DOT", Operation::Buy, 1.0, 10.0, 0.0, 0),
            tx("DOT", Operation::Sell, 3.0, 12.0, 0.0, 1),
        ];
        let dot = &compute_positions(&txs)["DOT"];
        assert_eq!(dot.quantity, 0.0);
        assert_eq!(dot.total_cost_basis, 0.0);
        // Only the held unit carries cost.
        assert_eq!(dot.realized_pl, 36.0 - 10.0);
    }

    #[test]
    fn test_floating_drift_snaps_to_zero() {
        let txs = vec![
            tx("XRP", Operation::Buy, 0.1, 3.0, 0.0, 0),
            tx("XRP", Operation::Buy, 0.2, 3.0, 0.0, 1),
            tx("XRP", Operation::Sell, 0.3, 4.0, 0.0, 2),
        ];
        let xrp = &compute_positions(&txs)["XRP"];
        assert_eq!(xrp.quantity, 0.0);
        assert_eq!(xrp.total_cost_basis, 0.0);
    }

    #[test]
    fn test_symbols_are_grouped_case_insensitively() {
        let mut lower = tx("btc", Operation::Buy, 1.0, 10.0, 0.0, 0);
        lower.asset_class = AssetClass::Unknown;
        let txs = vec![lower, tx("BTC", Operation::Buy, 1.0, 20.0, 0.0, 1)];
        let positions = compute_positions(&txs);
        assert_eq!(positions.len(), 1);
        assert_eq!(positions["BTC"].quantity, 2.0);
        assert_eq!(positions["BTC"].asset_class, AssetClass::Crypto);
    }
}
