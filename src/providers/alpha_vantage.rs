//! Alpha Vantage equity and currency-pair quotes.
//!
//! One request per symbol. The free tier allows a handful of requests per
//! minute, so every request goes through a shared pacer and a rate-limit
//! answer ends the pass.

use crate::core::config::AlphaVantageConfig;
use crate::core::currency::CurrencyRateProvider;
use crate::core::price::{PriceBatch, PriceProviderClient, parse_price};
use crate::providers::util::{RequestPacer, build_url, http_client, with_retry};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

enum Reply {
    Body(Value),
    RateLimited,
    NotFound(String),
    Failed(String),
}

/// Connection to Alpha Vantage shared by the stock, forex and rate clients
/// so that they pace against the same key.
pub struct AlphaVantageApi {
    base_url: String,
    api_key: Option<String>,
    pacer: RequestPacer,
    client: reqwest::Client,
}

impl AlphaVantageApi {
    pub fn new(config: &AlphaVantageConfig) -> Result<Self> {
        Ok(AlphaVantageApi {
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone().filter(|k| !k.trim().is_empty()),
            pacer: RequestPacer::new(config.request_delay_ms),
            client: http_client()?,
        })
    }

    async fn query(&self, api_key: &str, params: &[(&str, &str)]) -> Reply {
        let mut params: Vec<(&str, &str)> = params.iter().copied().collect();
        params.push(("apikey", api_key));
        let url = match build_url(&self.base_url, "/query", &params) {
            Ok(url) => url,
            Err(e) => return Reply::Failed(e.to_string()),
        };
        self.pacer.wait().await;
        debug!(function = params[0].1, "Requesting Alpha Vantage data");

        let response = match with_retry(|| self.client.get(url.clone()).send(), 2, 500).await {
            Ok(response) => response,
            Err(e) => return Reply::Failed(e.to_string()),
        };
        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Reply::RateLimited;
        }
        if !response.status().is_success() {
            return Reply::Failed(format!("HTTP {}", response.status()));
        }

        let body: Value = match response.json().await {
            Ok(body) => body,
            Err(e) => return Reply::Failed(e.to_string()),
        };
        // Throttled answers still come back as 200 with an explanatory field.
        if body.get("Note").is_some() || body.get("Information").is_some() {
            return Reply::RateLimited;
        }
        if let Some(message) = body.get("Error Message").and_then(Value::as_str) {
            return Reply::NotFound(message.to_string());
        }
        Reply::Body(body)
    }

    /// Runs one request per symbol and collects the prices `extract` finds.
    async fn fetch_each<F>(
        &self,
        provider: &str,
        symbols: &BTreeSet<String>,
        params_for: F,
        extract: fn(&Value) -> Option<f64>,
    ) -> PriceBatch
    where
        F: Fn(&str) -> Option<Vec<(&'static str, String)>>,
    {
        let mut batch = PriceBatch::new();
        let Some(api_key) = self.api_key.as_deref() else {
            warn!(provider, "No Alpha Vantage API key configured");
            batch.warn(format!(
                "Alpha Vantage API key missing, {provider} prices unavailable"
            ));
            return batch;
        };

        for symbol in symbols {
            let Some(params) = params_for(symbol) else {
                batch.warn(format!("Invalid {provider} symbol {symbol}"));
                continue;
            };
            let params: Vec<(&str, &str)> = params.iter().map(|(k, v)| (*k, v.as_str())).collect();

            match self.query(api_key, &params).await {
                Reply::Body(body) => match extract(&body) {
                    Some(price) => batch.insert_price(symbol, price),
                    None => batch.warn(format!("No Alpha Vantage price found for {symbol}")),
                },
                Reply::NotFound(message) => {
                    debug!(%symbol, %message, "Symbol rejected");
                    batch.warn(format!("No Alpha Vantage price found for {symbol}"));
                }
                Reply::RateLimited => {
                    warn!(provider, "Alpha Vantage rate limit reached, stopping");
                    batch.warn(format!(
                        "Alpha Vantage rate limit reached, remaining {provider} prices skipped"
                    ));
                    break;
                }
                Reply::Failed(reason) => {
                    warn!(%symbol, %reason, "Alpha Vantage request failed");
                    batch.warn(format!("Alpha Vantage request for {symbol} failed: {reason}"));
                }
            }
        }
        batch
    }
}

/// Splits a six letter pair such as `EURUSD` into its two currencies.
pub fn split_pair(pair: &str) -> Option<(&str, &str)> {
    if pair.len() != 6 || !pair.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    Some(pair.split_at(3))
}

fn global_quote_price(body: &Value) -> Option<f64> {
    parse_price(body.get("Global Quote")?.get("05. price")?)
}

fn exchange_rate(body: &Value) -> Option<f64> {
    parse_price(
        body.get("Realtime Currency Exchange Rate")?
            .get("5. Exchange Rate")?,
    )
}

pub struct AlphaVantageStockClient {
    api: Arc<AlphaVantageApi>,
}

impl AlphaVantageStockClient {
    pub fn new(api: Arc<AlphaVantageApi>) -> Self {
        AlphaVantageStockClient { api }
    }
}

#[async_trait]
impl PriceProviderClient for AlphaVantageStockClient {
    fn name(&self) -> &str {
        "Alpha Vantage stocks"
    }

    #[instrument(name = "AlphaVantageStockFetch", skip(self, symbols), fields(count = symbols.len()))]
    async fn fetch_prices(&self, symbols: &BTreeSet<String>) -> PriceBatch {
        self.api
            .fetch_each(
                "stock",
                symbols,
                |symbol| {
                    Some(vec![
                        ("function", "GLOBAL_QUOTE".to_string()),
                        ("symbol", symbol.to_string()),
                    ])
                },
                global_quote_price,
            )
            .await
    }
}

pub struct AlphaVantageForexClient {
    api: Arc<AlphaVantageApi>,
}

impl AlphaVantageForexClient {
    pub fn new(api: Arc<AlphaVantageApi>) -> Self {
        AlphaVantageForexClient { api }
    }
}

#[async_trait]
impl PriceProviderClient for AlphaVantageForexClient {
    fn name(&self) -> &str {
        "Alpha Vantage forex"
    }

    #[instrument(name = "AlphaVantageForexFetch", skip(self, symbols), fields(count = symbols.len()))]
    async fn fetch_prices(&self, symbols: &BTreeSet<String>) -> PriceBatch {
        self.api
            .fetch_each(
                "forex",
                symbols,
                |pair| {
                    let (from, to) = split_pair(pair)?;
                    Some(vec![
                        ("function", "CURRENCY_EXCHANGE_RATE".to_string()),
                        ("from_currency", from.to_string()),
                        ("to_currency", to.to_string()),
                    ])
                },
                exchange_rate,
            )
            .await
    }
}

/// Display-currency rates for the summary view.
pub struct AlphaVantageRateProvider {
    api: Arc<AlphaVantageApi>,
}

impl AlphaVantageRateProvider {
    pub fn new(api: Arc<AlphaVantageApi>) -> Self {
        AlphaVantageRateProvider { api }
    }
}

#[async_trait]
impl CurrencyRateProvider for AlphaVantageRateProvider {
    #[instrument(name = "AlphaVantageRate", skip(self))]
    async fn get_rate(&self, from: &str, to: &str) -> Result<f64> {
        if from.eq_ignore_ascii_case(to) {
            return Ok(1.0);
        }
        let api_key = self
            .api
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow!("Alpha Vantage API key missing"))?;
        let from = from.to_uppercase();
        let to = to.to_uppercase();

        let params = [
            ("function", "CURRENCY_EXCHANGE_RATE"),
            ("from_currency", from.as_str()),
            ("to_currency", to.as_str()),
        ];
        match self.api.query(api_key, &params).await {
            Reply::Body(body) => {
                exchange_rate(&body).ok_or_else(|| anyhow!("No exchange rate for {from}/{to}"))
            }
            Reply::RateLimited => Err(anyhow!("Alpha Vantage rate limit reached")),
            Reply::NotFound(message) => Err(anyhow!("No exchange rate for {from}/{to}: {message}")),
            Reply::Failed(reason) => Err(anyhow!("Exchange rate request failed: {reason}")),
        }
    }
}
