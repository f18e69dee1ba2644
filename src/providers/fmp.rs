use crate::core::config::FmpConfig;
use crate::core::price::{PriceBatch, PriceProviderClient, parse_price};
use crate::providers::util::{RequestPacer, build_url, http_client, with_retry};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::{debug, instrument, warn};

const BATCH_SIZE: usize = 100;

/// Which FMP endpoint a client reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FmpMarket {
    /// `/api/v3/quote`, entries carry `symbol` and `price`.
    Stocks,
    /// `/api/v3/fx`, entries carry `ticker` (`EUR/USD`) and `bid`.
    Forex,
}

impl FmpMarket {
    fn path(&self) -> &'static str {
        match self {
            FmpMarket::Stocks => "/api/v3/quote",
            FmpMarket::Forex => "/api/v3/fx",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            FmpMarket::Stocks => "stock",
            FmpMarket::Forex => "forex",
        }
    }

    fn entry_price(&self, entry: &Value) -> Option<(String, f64)> {
        let (symbol, price) = match self {
            FmpMarket::Stocks => (entry.get("symbol")?.as_str()?.to_string(), entry.get("price")?),
            FmpMarket::Forex => (entry.get("ticker")?.as_str()?.replace('/', ""), entry.get("bid")?),
        };
        Some((symbol, parse_price(price)?))
    }
}

/// Batched quotes from Financial Modeling Prep.
pub struct FmpClient {
    market: FmpMarket,
    base_url: String,
    api_key: Option<String>,
    pacer: RequestPacer,
    client: reqwest::Client,
}

impl FmpClient {
    pub fn new(market: FmpMarket, config: &FmpConfig) -> Result<Self> {
        Ok(FmpClient {
            market,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone().filter(|k| !k.trim().is_empty()),
            pacer: RequestPacer::new(config.request_delay_ms),
            client: http_client()?,
        })
    }
}

#[async_trait]
impl PriceProviderClient for FmpClient {
    fn name(&self) -> &str {
        match self.market {
            FmpMarket::Stocks => "FMP stocks",
            FmpMarket::Forex => "FMP forex",
        }
    }

    #[instrument(name = "FmpPriceFetch", skip(self, symbols), fields(market = ?self.market, count = symbols.len()))]
    async fn fetch_prices(&self, symbols: &BTreeSet<String>) -> PriceBatch {
        let mut batch = PriceBatch::new();
        let label = self.market.label();
        let Some(api_key) = self.api_key.as_deref() else {
            warn!(market = label, "No FMP API key configured");
            batch.warn(format!("FMP API key missing, {label} prices unavailable"));
            return batch;
        };

        let symbols: Vec<&String> = symbols.iter().collect();
        let mut rate_limited = false;
        for (index, chunk) in symbols.chunks(BATCH_SIZE).enumerate() {
            let joined = chunk.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(",");
            let url = match build_url(
                &self.base_url,
                &format!("{}/{}", self.market.path(), joined),
                &[("apikey", api_key)],
            ) {
                Ok(url) => url,
                Err(e) => {
                    batch.warn(format!("Invalid FMP request: {e}"));
                    continue;
                }
            };

            self.pacer.wait().await;
            debug!(batch = index + 1, count = chunk.len(), "Requesting FMP quotes");
            let response = match with_retry(|| self.client.get(url.clone()).send(), 2, 250).await {
                Ok(response) => response,
                Err(e) => {
                    warn!(error = %e, "FMP request failed");
                    batch.warn(format!("FMP {label} batch {} failed: {e}", index + 1));
                    continue;
                }
            };

            if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
                rate_limited = true;
                warn!("FMP rate limit reached, stopping");
                batch.warn(format!("FMP rate limit reached, remaining {label} prices skipped"));
                break;
            }
            let status = response.status();
            let body: Value = match response.json().await {
                Ok(body) => body,
                Err(e) if status.is_success() => {
                    batch.warn(format!("FMP {label} batch {} unreadable: {e}", index + 1));
                    continue;
                }
                Err(_) => Value::Null,
            };
            if let Some(message) = body.get("Error Message").and_then(Value::as_str) {
                warn!(%message, "FMP returned an error");
                batch.warn(format!("FMP error for {label} batch {}: {message}", index + 1));
                continue;
            }
            if !status.is_success() {
                batch.warn(format!("FMP {label} batch {} failed: HTTP {status}", index + 1));
                continue;
            }

            for entry in body.as_array().into_iter().flatten() {
                if let Some((symbol, price)) = self.market.entry_price(entry) {
                    batch.insert_price(&symbol, price);
                }
            }
        }

        if !rate_limited {
            for symbol in symbols {
                if !batch.prices.contains_key(symbol.as_str()) {
                    batch.warn(format!("No FMP price found for {symbol}"));
                }
            }
        }
        batch
    }
}
