use crate::core::config::BinanceConfig;
use crate::core::price::{PriceBatch, PriceProviderClient, parse_price};
use crate::providers::util::{RequestPacer, build_url, http_client, with_retry};
use anyhow::Result;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::collections::BTreeSet;
use tracing::{debug, instrument, warn};

const BATCH_SIZE: usize = 100;
const TICKER_PATH: &str = "/api/v3/ticker/price";

#[derive(Debug, Deserialize)]
struct Ticker {
    symbol: String,
    price: serde_json::Value,
}

enum Outcome {
    Prices(Vec<Ticker>),
    BadRequest,
    RateLimited,
    Failed(String),
}

/// Crypto prices from the Binance public ticker, quoted against a stable
/// quote asset.
pub struct BinanceClient {
    base_url: String,
    quote_asset: String,
    pacer: RequestPacer,
    client: reqwest::Client,
}

impl BinanceClient {
    pub fn new(config: &BinanceConfig) -> Result<Self> {
        Ok(BinanceClient {
            base_url: config.base_url.clone(),
            quote_asset: config.quote_asset.trim().to_uppercase(),
            pacer: RequestPacer::new(config.request_delay_ms),
            client: http_client()?,
        })
    }

    fn pair(&self, symbol: &str) -> String {
        format!("{symbol}{}", self.quote_asset)
    }

    async fn request(&self, params: &[(&str, &str)]) -> Outcome {
        let url = match build_url(&self.base_url, TICKER_PATH, params) {
            Ok(url) => url,
            Err(e) => return Outcome::Failed(e.to_string()),
        };
        self.pacer.wait().await;
        debug!("Requesting price data from {}", url);

        let response = match with_retry(|| self.client.get(url.clone()).send(), 2, 250).await {
            Ok(response) => response,
            Err(e) => return Outcome::Failed(e.to_string()),
        };

        match response.status() {
            StatusCode::TOO_MANY_REQUESTS | StatusCode::IM_A_TEAPOT => Outcome::RateLimited,
            StatusCode::BAD_REQUEST => Outcome::BadRequest,
            status if !status.is_success() => Outcome::Failed(format!("HTTP {status}")),
            _ => {
                let body = match response.text().await {
                    Ok(body) => body,
                    Err(e) => return Outcome::Failed(e.to_string()),
                };
                // The batch endpoint answers with a list, the single one with an object.
                if let Ok(tickers) = serde_json::from_str::<Vec<Ticker>>(&body) {
                    Outcome::Prices(tickers)
                } else if let Ok(ticker) = serde_json::from_str::<Ticker>(&body) {
                    Outcome::Prices(vec![ticker])
                } else {
                    Outcome::Failed(format!("unexpected response '{body}'"))
                }
            }
        }
    }

    fn collect(&self, tickers: Vec<Ticker>, batch: &mut PriceBatch) {
        for ticker in tickers {
            let Some(base) = ticker.symbol.strip_suffix(self.quote_asset.as_str()) else {
                continue;
            };
            match parse_price(&ticker.price) {
                Some(price) => batch.insert_price(base, price),
                None => debug!(symbol = %ticker.symbol, price = ?ticker.price, "Ignoring unusable price"),
            }
        }
    }

    /// Resolves `symbols` one request at a time. Returns false when the pass
    /// was stopped by a rate limit.
    async fn fetch_individually(&self, symbols: &[&String], batch: &mut PriceBatch) -> bool {
        for symbol in symbols {
            let pair = self.pair(symbol);
            match self.request(&[("symbol", pair.as_str())]).await {
                Outcome::Prices(tickers) => self.collect(tickers, batch),
                Outcome::BadRequest => debug!(%pair, "Pair not listed"),
                Outcome::RateLimited => return false,
                Outcome::Failed(reason) => {
                    warn!(%pair, %reason, "Binance request failed");
                    batch.warn(format!("Binance request for {symbol} failed: {reason}"));
                }
            }
        }
        true
    }
}

#[async_trait]
impl PriceProviderClient for BinanceClient {
    fn name(&self) -> &str {
        "Binance"
    }

    #[instrument(name = "BinancePriceFetch", skip(self, symbols), fields(count = symbols.len()))]
    async fn fetch_prices(&self, symbols: &BTreeSet<String>) -> PriceBatch {
        let mut batch = PriceBatch::new();
        let mut pending = Vec::new();
        for symbol in symbols {
            if *symbol == self.quote_asset {
                batch.insert_price(symbol, 1.0);
            } else {
                pending.push(symbol);
            }
        }

        let mut rate_limited = false;
        for chunk in pending.chunks(BATCH_SIZE) {
            let pairs: Vec<String> = chunk.iter().map(|s| self.pair(s)).collect();
            let list = serde_json::to_string(&pairs).unwrap_or_default();

            match self.request(&[("symbols", list.as_str())]).await {
                Outcome::Prices(tickers) => self.collect(tickers, &mut batch),
                Outcome::BadRequest => {
                    debug!("Batch rejected, falling back to single symbol requests");
                    if !self.fetch_individually(chunk, &mut batch).await {
                        rate_limited = true;
                    }
                }
                Outcome::RateLimited => rate_limited = true,
                Outcome::Failed(reason) => {
                    warn!(%reason, "Binance batch request failed");
                    batch.warn(format!("Binance request failed: {reason}"));
                }
            }

            if rate_limited {
                warn!("Binance rate limit reached, stopping");
                batch.warn("Binance rate limit reached, remaining crypto prices skipped");
                break;
            }
        }

        for symbol in pending {
            if !batch.prices.contains_key(symbol.as_str()) && !rate_limited {
                batch.warn(format!("No Binance price found for {symbol}"));
            }
        }
        batch
    }
}
