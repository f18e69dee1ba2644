pub mod alpha_vantage;
pub mod binance;
pub mod fmp;
pub mod polygon;
pub mod util;

use crate::core::aggregator::PriceAggregator;
use crate::core::config::{AppConfig, MarketSource, RateSource};
use crate::core::currency::CurrencyRateProvider;
use crate::core::price::PriceProviderClient;
use alpha_vantage::{
    AlphaVantageApi, AlphaVantageForexClient, AlphaVantageRateProvider, AlphaVantageStockClient,
};
use anyhow::Result;
use binance::BinanceClient;
use fmp::{FmpClient, FmpMarket};
use polygon::{PolygonApi, PolygonClient, PolygonMarket, PolygonRateProvider};
use std::sync::Arc;

/// Clients and the rate provider built from one configuration.
pub struct Providers {
    pub aggregator: PriceAggregator,
    pub rates: Box<dyn CurrencyRateProvider>,
}

pub fn build_providers(config: &AppConfig) -> Result<Providers> {
    let settings = &config.providers;
    let alpha_vantage = Arc::new(AlphaVantageApi::new(&settings.alpha_vantage)?);
    let polygon = Arc::new(PolygonApi::new(&settings.polygon)?);

    let crypto: Arc<dyn PriceProviderClient> = Arc::new(BinanceClient::new(&settings.binance)?);
    let stocks: Arc<dyn PriceProviderClient> = match settings.stocks {
        MarketSource::AlphaVantage => {
            Arc::new(AlphaVantageStockClient::new(Arc::clone(&alpha_vantage)))
        }
        MarketSource::Fmp => Arc::new(FmpClient::new(FmpMarket::Stocks, &settings.fmp)?),
        MarketSource::Polygon => {
            Arc::new(PolygonClient::new(PolygonMarket::Stocks, Arc::clone(&polygon)))
        }
    };
    let forex: Arc<dyn PriceProviderClient> = match settings.forex {
        MarketSource::AlphaVantage => {
            Arc::new(AlphaVantageForexClient::new(Arc::clone(&alpha_vantage)))
        }
        MarketSource::Fmp => Arc::new(FmpClient::new(FmpMarket::Forex, &settings.fmp)?),
        MarketSource::Polygon => {
            Arc::new(PolygonClient::new(PolygonMarket::Forex, Arc::clone(&polygon)))
        }
    };
    let rates: Box<dyn CurrencyRateProvider> = match settings.rates {
        RateSource::AlphaVantage => Box::new(AlphaVantageRateProvider::new(alpha_vantage)),
        RateSource::Polygon => Box::new(PolygonRateProvider::new(polygon)),
    };

    Ok(Providers {
        aggregator: PriceAggregator::new(crypto, stocks, forex, &config.stablecoins),
        rates,
    })
}
