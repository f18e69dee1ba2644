//! Polygon.io previous-day aggregates for stocks and currency pairs.
//!
//! Every symbol costs one `/v2/aggs/ticker/{ticker}/prev` request. The close
//! of the last session is used, or its open when no close is reported.

use crate::core::config::PolygonConfig;
use crate::core::currency::CurrencyRateProvider;
use crate::core::price::{PriceBatch, PriceProviderClient, parse_price};
use crate::providers::alpha_vantage::split_pair;
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
    NoData(Option<String>),
    Failed(String),
}

/// Connection to Polygon shared by the stock, forex and rate clients so they
/// pace against the same key.
pub struct PolygonApi {
    base_url: String,
    api_key: Option<String>,
    pacer: RequestPacer,
    client: reqwest::Client,
}

impl PolygonApi {
    pub fn new(config: &PolygonConfig) -> Result<Self> {
        Ok(PolygonApi {
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone().filter(|k| !k.trim().is_empty()),
            pacer: RequestPacer::new(config.request_delay_ms),
            client: http_client()?,
        })
    }

    async fn previous_close(&self, api_key: &str, ticker: &str) -> Reply {
        let path = format!("/v2/aggs/ticker/{ticker}/prev");
        let url = match build_url(
            &self.base_url,
            &path,
            &[("adjusted", "true"), ("apiKey", api_key)],
        ) {
            Ok(url) => url,
            Err(e) => return Reply::Failed(e.to_string()),
        };
        self.pacer.wait().await;
        debug!(%ticker, "Requesting Polygon aggregate");

        let response = match with_retry(|| self.client.get(url.clone()).send(), 2, 500).await {
            Ok(response) => response,
            Err(e) => return Reply::Failed(e.to_string()),
        };
        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Reply::RateLimited;
        }
        if !status.is_success() {
            let detail = response
                .json::<Value>()
                .await
                .ok()
                .and_then(|body| error_message(&body));
            return Reply::Failed(match detail {
                Some(detail) => format!("HTTP {status}: {detail}"),
                None => format!("HTTP {status}"),
            });
        }

        let body: Value = match response.json().await {
            Ok(body) => body,
            Err(e) => return Reply::Failed(e.to_string()),
        };
        let empty = body.get("status").and_then(Value::as_str) == Some("ERROR")
            || body.get("resultsCount").and_then(Value::as_u64) == Some(0)
            || body
                .get("results")
                .and_then(Value::as_array)
                .is_some_and(|results| results.is_empty());
        if empty {
            return Reply::NoData(error_message(&body));
        }
        Reply::Body(body)
    }
}

fn error_message(body: &Value) -> Option<String> {
    body.get("message")
        .or_else(|| body.get("error"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Close of the first aggregate, or its open when the close is missing.
fn session_price(body: &Value) -> Option<f64> {
    let bar = body.get("results")?.as_array()?.first()?;
    bar.get("c")
        .and_then(parse_price)
        .or_else(|| bar.get("o").and_then(parse_price))
}

fn is_ticker(symbol: &str) -> bool {
    !symbol.is_empty()
        && symbol
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
}

/// Which Polygon ticker family a client reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolygonMarket {
    Stocks,
    /// Six letter pairs, requested as `C:EURUSD`.
    Forex,
}

impl PolygonMarket {
    fn label(&self) -> &'static str {
        match self {
            PolygonMarket::Stocks => "stock",
            PolygonMarket::Forex => "forex",
        }
    }

    fn ticker(&self, symbol: &str) -> Option<String> {
        match self {
            PolygonMarket::Stocks => is_ticker(symbol).then(|| symbol.to_string()),
            PolygonMarket::Forex => {
                let (from, to) = split_pair(symbol)?;
                Some(format!("C:{from}{to}"))
            }
        }
    }
}

pub struct PolygonClient {
    market: PolygonMarket,
    api: Arc<PolygonApi>,
}

impl PolygonClient {
    pub fn new(market: PolygonMarket, api: Arc<PolygonApi>) -> Self {
        PolygonClient { market, api }
    }
}

#[async_trait]
impl PriceProviderClient for PolygonClient {
    fn name(&self) -> &str {
        match self.market {
            PolygonMarket::Stocks => "Polygon stocks",
            PolygonMarket::Forex => "Polygon forex",
        }
    }

    #[instrument(name = "PolygonPriceFetch", skip(self, symbols), fields(market = ?self.market, count = symbols.len()))]
    async fn fetch_prices(&self, symbols: &BTreeSet<String>) -> PriceBatch {
        let mut batch = PriceBatch::new();
        let label = self.market.label();
        let Some(api_key) = self.api.api_key.as_deref() else {
            warn!(market = label, "No Polygon API key configured");
            batch.warn(format!("Polygon API key missing, {label} prices unavailable"));
            return batch;
        };

        for symbol in symbols {
            let Some(ticker) = self.market.ticker(symbol) else {
                batch.warn(format!("Invalid {label} symbol {symbol}"));
                continue;
            };

            match self.api.previous_close(api_key, &ticker).await {
                Reply::Body(body) => match session_price(&body) {
                    Some(price) => batch.insert_price(symbol, price),
                    None => batch.warn(format!("No Polygon price found for {symbol}")),
                },
                Reply::NoData(message) => {
                    debug!(%symbol, ?message, "No aggregate returned");
                    batch.warn(format!(
                        "No Polygon price found for {symbol}, the market may be closed or the symbol wrong"
                    ));
                }
                Reply::RateLimited => {
                    warn!(market = label, "Polygon rate limit reached, stopping");
                    batch.warn(format!(
                        "Polygon rate limit reached, remaining {label} prices skipped"
                    ));
                    break;
                }
                Reply::Failed(reason) => {
                    warn!(%symbol, %reason, "Polygon request failed");
                    batch.warn(format!("Polygon request for {symbol} failed: {reason}"));
                }
            }
        }
        batch
    }
}

/// Display-currency rates from the previous forex session.
pub struct PolygonRateProvider {
    api: Arc<PolygonApi>,
}

impl PolygonRateProvider {
    pub fn new(api: Arc<PolygonApi>) -> Self {
        PolygonRateProvider { api }
    }
}

#[async_trait]
impl CurrencyRateProvider for PolygonRateProvider {
    #[instrument(name = "PolygonRate", skip(self))]
    async fn get_rate(&self, from: &str, to: &str) -> Result<f64> {
        if from.eq_ignore_ascii_case(to) {
            return Ok(1.0);
        }
        let api_key = self
            .api
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow!("Polygon API key missing"))?;
        let pair = format!("{}{}", from.to_uppercase(), to.to_uppercase());
        let ticker = PolygonMarket::Forex
            .ticker(&pair)
            .ok_or_else(|| anyhow!("Invalid currency pair {from}/{to}"))?;

        match self.api.previous_close(api_key, &ticker).await {
            Reply::Body(body) => {
                session_price(&body).ok_or_else(|| anyhow!("No exchange rate for {from}/{to}"))
            }
            Reply::NoData(_) => Err(anyhow!("No exchange rate for {from}/{to}")),
            Reply::RateLimited => Err(anyhow!("Polygon rate limit reached")),
            Reply::Failed(reason) => Err(anyhow!("Exchange rate request failed: {reason}")),
        }
    }
}
