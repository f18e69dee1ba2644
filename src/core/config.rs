use crate::core::summary::ZeroCostReturnPolicy;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};
use tracing::debug;

pub const ALPHA_VANTAGE_KEY_ENV: &str = "ALPHA_VANTAGE_API_KEY";
pub const FMP_KEY_ENV: &str = "FMP_API_KEY";
pub const POLYGON_KEY_ENV: &str = "POLYGON_API_KEY";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BinanceConfig {
    #[serde(default = "BinanceConfig::default_base_url")]
    pub base_url: String,
    /// Quote asset appended to every crypto symbol (`BTC` -> `BTCUSDT`).
    #[serde(default = "BinanceConfig::default_quote_asset")]
    pub quote_asset: String,
    #[serde(default)]
    pub request_delay_ms: u64,
}

impl BinanceConfig {
    fn default_base_url() -> String {
        "https://api.binance.com".to_string()
    }

    fn default_quote_asset() -> String {
        "USDT".to_string()
    }
}

impl Default for BinanceConfig {
    fn default() -> Self {
        BinanceConfig {
            base_url: Self::default_base_url(),
            quote_asset: Self::default_quote_asset(),
            request_delay_ms: 0,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AlphaVantageConfig {
    #[serde(default = "AlphaVantageConfig::default_base_url")]
    pub base_url: String,
    pub api_key: Option<String>,
    /// Free tier allows roughly one request per second.
    #[serde(default = "AlphaVantageConfig::default_delay")]
    pub request_delay_ms: u64,
}

impl AlphaVantageConfig {
    fn default_base_url() -> String {
        "https://www.alphavantage.co".to_string()
    }

    fn default_delay() -> u64 {
        1200
    }
}

impl Default for AlphaVantageConfig {
    fn default() -> Self {
        AlphaVantageConfig {
            base_url: Self::default_base_url(),
            api_key: None,
            request_delay_ms: Self::default_delay(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FmpConfig {
    #[serde(default = "FmpConfig::default_base_url")]
    pub base_url: String,
    pub api_key: Option<String>,
    #[serde(default = "FmpConfig::default_delay")]
    pub request_delay_ms: u64,
}

impl FmpConfig {
    fn default_base_url() -> String {
        "https://financialmodelingprep.com".to_string()
    }

    fn default_delay() -> u64 {
        200
    }
}

impl Default for FmpConfig {
    fn default() -> Self {
        FmpConfig {
            base_url: Self::default_base_url(),
            api_key: None,
            request_delay_ms: Self::default_delay(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PolygonConfig {
    #[serde(default = "PolygonConfig::default_base_url")]
    pub base_url: String,
    pub api_key: Option<String>,
    #[serde(default = "PolygonConfig::default_delay")]
    pub request_delay_ms: u64,
}

impl PolygonConfig {
    fn default_base_url() -> String {
        "https://api.polygon.io".to_string()
    }

    fn default_delay() -> u64 {
        200
    }
}

impl Default for PolygonConfig {
    fn default() -> Self {
        PolygonConfig {
            base_url: Self::default_base_url(),
            api_key: None,
            request_delay_ms: Self::default_delay(),
        }
    }
}

/// Which market-data source prices stocks or forex pairs.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MarketSource {
    #[default]
    AlphaVantage,
    Fmp,
    Polygon,
}

/// Which source answers display-currency conversions.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RateSource {
    #[default]
    AlphaVantage,
    Polygon,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub binance: BinanceConfig,
    #[serde(default)]
    pub alpha_vantage: AlphaVantageConfig,
    #[serde(default)]
    pub fmp: FmpConfig,
    #[serde(default)]
    pub polygon: PolygonConfig,
    #[serde(default)]
    pub stocks: MarketSource,
    #[serde(default)]
    pub forex: MarketSource,
    #[serde(default)]
    pub rates: RateSource,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    /// Identity whose ledger is valued. Without one the local list is used.
    pub owner: Option<String>,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default = "AppConfig::default_currency")]
    pub display_currency: String,
    #[serde(default = "AppConfig::default_stablecoins")]
    pub stablecoins: Vec<String>,
    #[serde(default)]
    pub zero_cost_return: ZeroCostReturnPolicy,
    pub data_path: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            owner: None,
            providers: ProvidersConfig::default(),
            display_currency: Self::default_currency(),
            stablecoins: Self::default_stablecoins(),
            zero_cost_return: ZeroCostReturnPolicy::default(),
            data_path: None,
        }
    }
}

impl AppConfig {
    fn default_currency() -> String {
        "USD".to_string()
    }

    fn default_stablecoins() -> Vec<String> {
        vec!["USDT".to_string(), "USDC".to_string()]
    }

    /// Loads the default config file, or built-in defaults when none exists.
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        if !config_path.exists() {
            debug!("No config at {}, using defaults", config_path.display());
            let mut config = Self::default();
            config.resolve_api_keys();
            return Ok(config);
        }
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("dev", "pnlfolio", "pnlfolio")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn data_path(&self) -> Result<PathBuf> {
        if let Some(custom_path) = &self.data_path {
            return Ok(PathBuf::from(custom_path));
        }
        let proj_dirs = ProjectDirs::from("dev", "pnlfolio", "pnlfolio")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.data_dir().to_path_buf())
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let mut config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        config.resolve_api_keys();
        debug!("Successfully loaded config");
        Ok(config)
    }

    /// Fills API keys missing from the file from the environment.
    pub fn resolve_api_keys(&mut self) {
        let providers = &mut self.providers;
        if providers.alpha_vantage.api_key.is_none() {
            providers.alpha_vantage.api_key = std::env::var(ALPHA_VANTAGE_KEY_ENV).ok();
        }
        if providers.fmp.api_key.is_none() {
            providers.fmp.api_key = std::env::var(FMP_KEY_ENV).ok();
        }
        if providers.polygon.api_key.is_none() {
            providers.polygon.api_key = std::env::var(POLYGON_KEY_ENV).ok();
        }
    }
}
