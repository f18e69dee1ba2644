//! Combines positions with resolved prices into the final valuation.
use crate::core::cost_basis::{AssetPosition, EPSILON};
use crate::core::transaction::AssetClass;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

/// What to report as the return of a fully exited position that cost nothing
/// (an airdrop sold, for example). The ratio is undefined in that case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZeroCostReturnPolicy {
    #[default]
    HundredPercent,
    Zero,
}

/// Valuation of a single asset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioSummaryEntry {
    pub symbol: String,
    pub asset_class: AssetClass,
    pub quantity: f64,
    pub average_buy_price: f64,
    pub total_cost_basis: f64,
    pub total_invested: f64,
    pub realized_pl: f64,
    pub current_price: f64,
    pub current_value: f64,
    pub unrealized_pl: f64,
    pub total_pl: f64,
    pub total_pl_percentage: f64,
    /// The price is the average cost (or zero), not a live quote.
    pub is_fallback_price: bool,
    pub transaction_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PortfolioSummary {
    pub entries: BTreeMap<String, PortfolioSummaryEntry>,
}

/// Aggregates over every entry of a summary.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PortfolioTotals {
    pub current_value: f64,
    pub total_cost_basis: f64,
    pub total_invested: f64,
    pub realized_pl: f64,
    pub unrealized_pl: f64,
    pub total_pl: f64,
}

impl PortfolioSummary {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, symbol: &str) -> Option<&PortfolioSummaryEntry> {
        self.entries.get(symbol)
    }

    pub fn totals(&self) -> PortfolioTotals {
        self.entries
            .values()
            .fold(PortfolioTotals::default(), |acc, e| PortfolioTotals {
                current_value: acc.current_value + e.current_value,
                total_cost_basis: acc.total_cost_basis + e.total_cost_basis,
                total_invested: acc.total_invested + e.total_invested,
                realized_pl: acc.realized_pl + e.realized_pl,
                unrealized_pl: acc.unrealized_pl + e.unrealized_pl,
                total_pl: acc.total_pl + e.total_pl,
            })
    }
}

fn snap(value: f64) -> f64 {
    if value.abs() < EPSILON { 0.0 } else { value }
}

fn resolve_price(position: &AssetPosition, prices: &HashMap<String, f64>) -> (f64, bool) {
    match prices.get(&position.symbol) {
        Some(&price) if price.is_finite() && price > 0.0 => (price, false),
        _ => {
            if position.quantity > EPSILON {
                warn!(symbol = %position.symbol, "No live price, using average cost");
            }
            if position.average_buy_price > 0.0 {
                (position.average_buy_price, true)
            } else {
                (0.0, true)
            }
        }
    }
}

fn pl_percentage(
    total_pl: f64,
    total_invested: f64,
    held: bool,
    policy: ZeroCostReturnPolicy,
) -> f64 {
    if total_invested > 0.0 && total_pl != 0.0 {
        total_pl / total_invested * 100.0
    } else if total_invested == 0.0 && total_pl != 0.0 && !held {
        match policy {
            ZeroCostReturnPolicy::HundredPercent => 100.0,
            ZeroCostReturnPolicy::Zero => 0.0,
        }
    } else {
        0.0
    }
}

/// Values every position against `prices` (USD, keyed by symbol).
pub fn build_summary(
    positions: &BTreeMap<String, AssetPosition>,
    prices: &HashMap<String, f64>,
    policy: ZeroCostReturnPolicy,
) -> PortfolioSummary {
    let mut summary = PortfolioSummary::default();

    for position in positions.values() {
        let held = position.quantity > EPSILON;
        let (current_price, is_fallback_price) = resolve_price(position, prices);

        let (current_value, unrealized_pl) = if held {
            let value = position.quantity * current_price;
            (value, value - position.total_cost_basis)
        } else {
            (0.0, 0.0)
        };
        let realized_pl = snap(position.realized_pl);
        let unrealized_pl = snap(unrealized_pl);
        let total_pl = snap(realized_pl + unrealized_pl);
        let total_pl_percentage = pl_percentage(total_pl, position.total_invested, held, policy);

        let entry = PortfolioSummaryEntry {
            symbol: position.symbol.clone(),
            asset_class: position.asset_class,
            quantity: snap(position.quantity),
            average_buy_price: position.average_buy_price,
            total_cost_basis: snap(position.total_cost_basis),
            total_invested: position.total_invested,
            realized_pl,
            current_price,
            current_value: snap(current_value),
            unrealized_pl,
            total_pl,
            total_pl_percentage: snap(total_pl_percentage),
            is_fallback_price,
            transaction_count: position.transaction_count,
        };

        if entry.quantity == 0.0 && entry.realized_pl == 0.0 && entry.transaction_count == 0 {
            debug!(symbol = %entry.symbol, "Dropping empty position");
            continue;
        }
        summary.entries.insert(entry.symbol.clone(), entry);
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cost_basis::compute_positions;
    use crate::core::transaction::{Operation, Transaction};
    use chrono::{Duration, TimeZone, Utc};

    fn tx(symbol: &str, op: Operation, quantity: f64, price: f64, day: i64) -> Transaction {
        Transaction {
            id: format!("{symbol}-{day}"),
            symbol: symbol.to_string(),
            asset_class: AssetClass::Crypto,
            operation: op,
            quantity,
            unit_price: price,
            fee: 0.0,
            timestamp: Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap() + Duration::days(day),
            sequence: 0,
        }
    }

    fn position(symbol: &str) -> AssetPosition {
        AssetPosition {
            symbol: symbol.to_string(),
            asset_class: AssetClass::Stock,
            quantity: 0.0,
            total_cost_basis: 0.0,
            average_buy_price: 0.0,
            realized_pl: 0.0,
            total_invested: 0.0,
            transaction_count: 1,
        }
    }

    #[test]
    fn test_live_price_valuation() {
        let txs = vec![
            tx("BTC", Operation::Buy, 2.0, 10000.0, 0),
            tx("BTC", Operation::Sell, 1.0, 15000.0, 1),
        ];
        let positions = compute_positions(&txs);
        let prices = HashMap::from([("BTC".to_string(), 20000.0)]);

        let summary = build_summary(&positions, &prices, ZeroCostReturnPolicy::default());
        let btc = summary.get("BTC").unwrap();
        assert_eq!(btc.quantity, 1.0);
        assert_eq!(btc.total_cost_basis, 10000.0);
        assert_eq!(btc.realized_pl, 5000.0);
        assert_eq!(btc.unrealized_pl, 10000.0);
        assert_eq!(btc.total_pl, 15000.0);
        assert_eq!(btc.current_value, 20000.0);
        assert_eq!(btc.total_pl_percentage, 75.0);
        assert!(!btc.is_fallback_price);
    }

    #[test]
    fn test_falls_back_to_average_cost() {
        let mut pos = position("AAPL");
        pos.quantity = 2.0;
        pos.total_cost_basis = 100.0;
        pos.average_buy_price = 50.0;
        pos.total_invested = 100.0;
        let positions = BTreeMap::from([("AAPL".to_string(), pos)]);

        let summary = build_summary(&positions, &HashMap::new(), ZeroCostReturnPolicy::default());
        let aapl = summary.get("AAPL").unwrap();
        assert_eq!(aapl.current_price, 50.0);
        assert!(aapl.is_fallback_price);
        assert_eq!(aapl.current_value, 100.0);
        assert_eq!(aapl.unrealized_pl, 0.0);
        assert_eq!(aapl.total_pl_percentage, 0.0);
    }

    #[test]
    fn test_non_positive_quote_is_ignored() {
        let mut pos = position("MSFT");
        pos.quantity = 1.0;
        pos.total_cost_basis = 300.0;
        pos.average_buy_price = 300.0;
        pos.total_invested = 300.0;
        let positions = BTreeMap::from([("MSFT".to_string(), pos)]);
        let prices = HashMap::from([("MSFT".to_string(), 0.0)]);

        let summary = build_summary(&positions, &prices, ZeroCostReturnPolicy::default());
        let msft = summary.get("MSFT").unwrap();
        assert_eq!(msft.current_price, 300.0);
        assert!(msft.is_fallback_price);
    }

    #[test]
    fn test_exited_position_is_kept_with_zero_price_fallback() {
        let txs = vec![
            tx("LUNA", Operation::Buy, 10.0, 5.0, 0),
            tx("LUNA", Operation::Sell, 10.0, 1.0, 1),
        ];
        let positions = compute_positions(&txs);
        let summary = build_summary(&positions, &HashMap::new(), ZeroCostReturnPolicy::default());

        let luna = summary.get("LUNA").unwrap();
        assert_eq!(luna.quantity, 0.0);
        assert_eq!(luna.current_price, 0.0);
        assert!(luna.is_fallback_price);
        assert_eq!(luna.current_value, 0.0);
        assert_eq!(luna.realized_pl, -40.0);
        assert_eq!(luna.total_pl, -40.0);
        assert_eq!(luna.total_pl_percentage, -80.0);
    }

    #[test]
    fn test_zero_cost_exit_follows_policy() {
        let mut pos = position("AIRDROP");
        pos.realized_pl = 25.0;
        let positions = BTreeMap::from([("AIRDROP".to_string(), pos)]);

        let summary = build_summary(&positions, &HashMap::new(), ZeroCostReturnPolicy::HundredPercent);
        assert_eq!(summary.get("AIRDROP").unwrap().total_pl_percentage, 100.0);

        let summary = build_summary(&positions, &HashMap::new(), ZeroCostReturnPolicy::Zero);
        assert_eq!(summary.get("AIRDROP").unwrap().total_pl_percentage, 0.0);
    }

    #[test]
    fn test_noise_is_snapped_and_phantom_positions_dropped() {
        let mut noisy = position("ETH");
        noisy.realized_pl = 1e-12;
        let mut phantom = position("GHOST");
        phantom.transaction_count = 0;
        let positions = BTreeMap::from([
            ("ETH".to_string(), noisy),
            ("GHOST".to_string(), phantom),
        ]);

        let summary = build_summary(&positions, &HashMap::new(), ZeroCostReturnPolicy::default());
        assert_eq!(summary.entries.len(), 1);
        let eth = summary.get("ETH").unwrap();
        assert_eq!(eth.realized_pl, 0.0);
        assert_eq!(eth.total_pl, 0.0);
        assert_eq!(eth.total_pl_percentage, 0.0);
    }

    #[test]
    fn test_return_agrees_with_snapped_pl_after_round_trip() {
        // 0.1 + 0.2 style drift leaves a sub-epsilon realized P&L on a free exit.
        let mut pos = position("DUST");
        pos.realized_pl = (0.1 + 0.2) - 0.3;
        assert!(pos.realized_pl != 0.0);
        let positions = BTreeMap::from([("DUST".to_string(), pos)]);

        for policy in [ZeroCostReturnPolicy::HundredPercent, ZeroCostReturnPolicy::Zero] {
            let summary = build_summary(&positions, &HashMap::new(), policy);
            let dust = summary.get("DUST").unwrap();
            assert_eq!(dust.total_pl, 0.0);
            assert_eq!(dust.total_pl_percentage, 0.0);
        }
    }

    #[test]
    fn test_totals() {
        let txs = vec![
            tx("BTC", Operation::Buy, 1.0, 100.0, 0),
            tx("ETH", Operation::Buy, 2.0, 10.0, 0),
        ];
        let positions = compute_positions(&txs);
        let prices = HashMap::from([("BTC".to_string(), 150.0), ("ETH".to_string(), 5.0)]);
        let totals = build_summary(&positions, &prices, ZeroCostReturnPolicy::default()).totals();
        assert_eq!(totals.current_value, 160.0);
        assert_eq!(totals.total_cost_basis, 120.0);
        assert_eq!(totals.unrealized_pl, 40.0);
        assert_eq!(totals.total_pl, 40.0);
    }
}
