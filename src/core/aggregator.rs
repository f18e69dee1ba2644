//! Fans a valuation's symbols out to one price client per asset class and
//! merges the answers.

use crate::core::price::{PriceBatch, PriceProviderClient};
use crate::core::transaction::{AssetClass, Transaction};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

/// Symbols of one valuation pass grouped by the client that prices them.
#[derive(Debug, Default, PartialEq)]
pub struct SymbolPartition {
    pub crypto: BTreeSet<String>,
    pub stocks: BTreeSet<String>,
    pub forex: BTreeSet<String>,
    /// Configured stablecoins, priced at 1.00 locally whatever their class.
    pub stablecoins: BTreeSet<String>,
}

pub struct PriceAggregator {
    crypto: Arc<dyn PriceProviderClient>,
    stocks: Arc<dyn PriceProviderClient>,
    forex: Arc<dyn PriceProviderClient>,
    stablecoins: HashSet<String>,
}

impl PriceAggregator {
    pub fn new(
        crypto: Arc<dyn PriceProviderClient>,
        stocks: Arc<dyn PriceProviderClient>,
        forex: Arc<dyn PriceProviderClient>,
        stablecoins: &[String],
    ) -> Self {
        PriceAggregator {
            crypto,
            stocks,
            forex,
            stablecoins: stablecoins.iter().map(|s| s.trim().to_uppercase()).collect(),
        }
    }

    /// Groups distinct symbols by asset class. Stablecoins never reach a
    /// client. Records without a usable class are priced as crypto and reported.
    pub fn partition(&self, transactions: &[Transaction]) -> (SymbolPartition, PriceBatch) {
        let mut partition = SymbolPartition::default();
        let mut notes = PriceBatch::new();
        let mut reported = HashSet::new();

        for tx in transactions {
            let symbol = tx.symbol.trim().to_uppercase();
            if self.stablecoins.contains(&symbol) {
                partition.stablecoins.insert(symbol);
                continue;
            }
            let class = match tx.asset_class {
                AssetClass::Unknown => {
                    if reported.insert(symbol.clone()) {
                        notes.warn(format!(
                            "Unknown or missing asset class for {symbol}, treating as crypto"
                        ));
                    }
                    AssetClass::Crypto
                }
                known => known,
            };

            match class {
                AssetClass::Stock => partition.stocks.insert(symbol),
                AssetClass::Forex => partition.forex.insert(symbol),
                _ => partition.crypto.insert(symbol),
            };
        }

        (partition, notes)
    }

    /// Resolves live USD prices for every symbol in `transactions`.
    ///
    /// Never fails: whatever the clients could not price is reported through
    /// the returned warnings.
    pub async fn fetch_prices(&self, transactions: &[Transaction]) -> PriceBatch {
        if transactions.is_empty() {
            return PriceBatch::new();
        }

        let (partition, mut result) = self.partition(transactions);
        debug!(?partition, "Partitioned symbols");

        let (forex, stocks, crypto) = futures::join!(
            fetch_class(self.forex.as_ref(), &partition.forex),
            fetch_class(self.stocks.as_ref(), &partition.stocks),
            fetch_class(self.crypto.as_ref(), &partition.crypto),
        );

        result.merge(forex);
        result.merge(stocks);
        result.merge(crypto);

        for symbol in &partition.stablecoins {
            result.insert_price(symbol, 1.0);
        }

        info!(
            prices = result.prices.len(),
            warnings = result.warnings.len(),
            "Price aggregation finished"
        );
        result
    }
}

async fn fetch_class(client: &dyn PriceProviderClient, symbols: &BTreeSet<String>) -> PriceBatch {
    if symbols.is_empty() {
        return PriceBatch::new();
    }
    debug!(provider = client.name(), count = symbols.len(), "Fetching prices");
    client.fetch_prices(symbols).await
}
