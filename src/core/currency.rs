//! Currency conversion for presentation only. The engine itself is USD.

use crate::core::summary::PortfolioSummary;
use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait CurrencyRateProvider: Send + Sync {
    async fn get_rate(&self, from: &str, to: &str) -> Result<f64>;
}

/// Scales every monetary field of `summary` by `rate`. Quantities and
/// percentages are left untouched.
pub fn convert_summary(summary: &PortfolioSummary, rate: f64) -> PortfolioSummary {
    let mut converted = summary.clone();
    for entry in converted.entries.values_mut() {
        entry.average_buy_price *= rate;
        entry.total_cost_basis *= rate;
        entry.total_invested *= rate;
        entry.realized_pl *= rate;
        entry.current_price *= rate;
        entry.current_value *= rate;
        entry.unrealized_pl *= rate;
        entry.total_pl *= rate;
    }
    converted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cost_basis::compute_positions;
    use crate::core::summary::{ZeroCostReturnPolicy, build_summary};
    use crate::core::transaction::{AssetClass, Operation, Transaction};
    use chrono::Utc;
    use std::collections::HashMap;

    #[test]
    fn test_convert_summary_scales_money_only() {
        let txs = vec![Transaction {
            id: "1".to_string(),
            symbol: "AAPL".to_string(),
            asset_class: AssetClass::Stock,
            operation: Operation::Buy,
            quantity: 2.0,
            unit_price: 100.0,
            fee: 0.0,
            timestamp: Utc::now(),
            sequence: 0,
        }];
        let prices = HashMap::from([("AAPL".to_string(), 150.0)]);
        let summary = build_summary(
            &compute_positions(&txs),
            &prices,
            ZeroCostReturnPolicy::default(),
        );

        let converted = convert_summary(&summary, 0.5);
        let aapl = converted.get("AAPL").unwrap();
        assert_eq!(aapl.quantity, 2.0);
        assert_eq!(aapl.current_price, 75.0);
        assert_eq!(aapl.current_value, 150.0);
        assert_eq!(aapl.total_cost_basis, 100.0);
        assert_eq!(aapl.unrealized_pl, 50.0);
        assert_eq!(aapl.total_pl_percentage, 50.0);
    }
}
