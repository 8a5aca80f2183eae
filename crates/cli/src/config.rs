use anyhow::{Context, Result};
use chrono::NaiveDate;
use coinlab_core::{BacktestConfig, BacktestConfigPatch, Language, StrategyParameters, Theme, Timeframe};
use coinlab_data::{HttpGatewayConfig, OkxConfig, DEFAULT_BASE_URL, OKX_BASE_URL};
use coinlab_store::{market::DEFAULT_WATCHLIST, StoreDefaults};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Contents of `coinlab.toml`. Every section and key is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub api: ApiSettings,
    pub market: MarketSettings,
    pub backtest: BacktestSettings,
    pub okx: OkxSettings,
    pub ui: UiSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    pub base_url: String,
    pub token: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            token: None,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MarketSettings {
    pub watchlist: Vec<String>,
    pub timeframe: Timeframe,
}

impl Default for MarketSettings {
    fn default() -> Self {
        Self {
            watchlist: DEFAULT_WATCHLIST.iter().map(|s| s.to_string()).collect(),
            timeframe: Timeframe::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BacktestSettings {
    pub poll_interval_ms: u64,
    pub max_polls: u32,
    /// Starting point for `coinlab backtest`; flags override field by field.
    pub defaults: BacktestDefaults,
}

impl Default for BacktestSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2000,
            max_polls: 150,
            defaults: BacktestDefaults::default(),
        }
    }
}

impl BacktestSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Keys left out fall back to [`BacktestConfig::default`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BacktestDefaults {
    pub symbol: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub initial_capital: Option<Decimal>,
    pub strategy: Option<String>,
    pub parameters: Option<StrategyParameters>,
}

impl BacktestDefaults {
    pub fn to_config(&self) -> BacktestConfig {
        let mut config = BacktestConfig::default();
        config.merge(BacktestConfigPatch {
            symbol: self.symbol.clone(),
            start_date: self.start_date.map(Some),
            end_date: self.end_date.map(Some),
            initial_capital: self.initial_capital,
            strategy: self.strategy.clone(),
            parameters: self.parameters.clone(),
        });
        config
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OkxSettings {
    pub base_url: String,
    pub max_calls_per_minute: u32,
}

impl Default for OkxSettings {
    fn default() -> Self {
        Self {
            base_url: OKX_BASE_URL.to_string(),
            max_calls_per_minute: 20,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UiSettings {
    pub theme: Theme,
    pub language: Language,
}

impl Settings {
    /// Read settings from `path`. A missing file yields the defaults unless
    /// `required` is set.
    pub fn load(path: &Path, required: bool) -> Result<Self> {
        if !path.exists() && !required {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn gateway_config(&self) -> HttpGatewayConfig {
        HttpGatewayConfig {
            base_url: self.api.base_url.clone(),
            token: self.api.token.clone(),
            timeout_secs: self.api.timeout_secs,
        }
    }

    pub fn okx_config(&self) -> OkxConfig {
        OkxConfig {
            base_url: self.okx.base_url.clone(),
            max_calls_per_minute: self.okx.max_calls_per_minute,
            ..Default::default()
        }
    }

    pub fn store_defaults(&self) -> StoreDefaults {
        StoreDefaults {
            watchlist: self.market.watchlist.clone(),
            timeframe: self.market.timeframe,
            backtest: self.backtest.defaults.to_config(),
            theme: self.ui.theme,
            language: self.ui.language,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_empty_file_gives_defaults() {
        let settings = Settings::parse("").unwrap();
        assert_eq!(settings.api.base_url, "http://localhost:8000/api");
        assert!(settings.api.token.is_none());
        assert_eq!(settings.market.watchlist.len(), 4);
        assert_eq!(settings.market.timeframe, Timeframe::OneHour);
        assert_eq!(settings.backtest.max_polls, 150);
        assert_eq!(settings.okx.max_calls_per_minute, 20);
        assert_eq!(settings.ui.language, Language::Ko);
    }

    #[test]
    fn test_partial_sections() {
        let settings = Settings::parse(
            r#"
            [api]
            base_url = "https://dashboard.example.com/api"

            [market]
            watchlist = ["SOL-USDT"]
            timeframe = "4h"

            [backtest]
            poll_interval_ms = 500

            [backtest.defaults]
            symbol = "ETH-USDT"
            initial_capital = 2500
            start_date = "2024-01-01"

            [backtest.defaults.parameters]
            fast = 9

            [ui]
            theme = "dark"
            "#,
        )
        .unwrap();

        assert_eq!(settings.api.base_url, "https://dashboard.example.com/api");
        assert_eq!(settings.api.timeout_secs, 30);
        assert_eq!(settings.market.timeframe, Timeframe::FourHours);
        assert_eq!(settings.backtest.poll_interval(), Duration::from_millis(500));
        assert_eq!(settings.backtest.max_polls, 150);

        let defaults = settings.store_defaults();
        assert_eq!(defaults.watchlist, vec!["SOL-USDT".to_string()]);
        assert_eq!(defaults.backtest.symbol, "ETH-USDT");
        assert_eq!(defaults.backtest.initial_capital, dec!(2500));
        assert_eq!(defaults.backtest.strategy, "buy_and_hold");
        assert!(defaults.backtest.start_date.is_some());
        assert!(defaults.backtest.end_date.is_none());
        assert_eq!(defaults.backtest.parameters["fast"], serde_json::json!(9));
        assert_eq!(defaults.theme, Theme::Dark);
    }

    #[test]
    fn test_unknown_timeframe_rejected() {
        assert!(Settings::parse("[market]\ntimeframe = \"30m\"").is_err());
    }

    #[test]
    fn test_missing_file() {
        let path = std::env::temp_dir().join("coinlab-does-not-exist.toml");
        assert!(Settings::load(&path, false).is_ok());
        assert!(Settings::load(&path, true).is_err());
    }
}
