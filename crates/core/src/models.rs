use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::traits::{IntegrityError, ValidationError};

/// Open key/value mapping of strategy-specific settings. Passed to the
/// execution engine verbatim; nothing here inspects its schema.
pub type StrategyParameters = serde_json::Map<String, serde_json::Value>;

// ---------------------------------------------------------------------------
// Market Data
// ---------------------------------------------------------------------------

/// Chart timeframe selectable in the market view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "1h")]
    #[default]
    OneHour,
    #[serde(rename = "4h")]
    FourHours,
    #[serde(rename = "1d")]
    OneDay,
}

impl Timeframe {
    pub const ALL: [Timeframe; 6] = [
        Timeframe::OneMinute,
        Timeframe::FiveMinutes,
        Timeframe::FifteenMinutes,
        Timeframe::OneHour,
        Timeframe::FourHours,
        Timeframe::OneDay,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::OneMinute => "1m",
            Timeframe::FiveMinutes => "5m",
            Timeframe::FifteenMinutes => "15m",
            Timeframe::OneHour => "1h",
            Timeframe::FourHours => "4h",
            Timeframe::OneDay => "1d",
        }
    }

    /// Bar code used by the OKX candle endpoints.
    pub fn okx_bar(&self) -> &'static str {
        match self {
            Timeframe::OneMinute => "1m",
            Timeframe::FiveMinutes => "5m",
            Timeframe::FifteenMinutes => "15m",
            Timeframe::OneHour => "1H",
            Timeframe::FourHours => "4H",
            Timeframe::OneDay => "1D",
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Timeframe::ALL
            .iter()
            .copied()
            .find(|tf| tf.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownTimeframe(s.to_string()))
    }
}

/// Latest known quote for a watched symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketData {
    pub symbol: String,
    pub price: Decimal,
    pub change_24h: Decimal,
    pub change_percent_24h: Decimal,
    pub volume_24h: Decimal,
    pub market_cap: Decimal,
    /// Epoch milliseconds on the wire.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_update: DateTime<Utc>,
}

/// A single OHLCV candle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

/// Parameters of a historical price series request.
#[derive(Debug, Clone, PartialEq)]
pub struct CandleQuery {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Portfolio
// ---------------------------------------------------------------------------

/// A single holding in the portfolio.
///
/// `allocation` is owned by the portfolio store: whatever value arrives
/// here is overwritten on the next aggregate recomputation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub symbol: String,
    pub amount: Decimal,
    /// Current market value in the display currency.
    pub value: Decimal,
    #[serde(default)]
    pub allocation: Decimal,
    pub pnl: Decimal,
    pub pnl_percent: Decimal,
}

impl Asset {
    pub fn new(symbol: &str, amount: Decimal, value: Decimal, pnl: Decimal) -> Self {
        // Out-of-range cost basis or ratio reports zero rather than panicking.
        let pnl_percent = value
            .checked_sub(pnl)
            .filter(|cost| !cost.is_zero())
            .and_then(|cost| pnl.checked_div(cost))
            .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
            .unwrap_or(Decimal::ZERO);
        Self {
            symbol: symbol.to_string(),
            amount,
            value,
            allocation: Decimal::ZERO,
            pnl,
            pnl_percent,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.symbol.trim().is_empty() {
            return Err(ValidationError::BlankSymbol);
        }
        if self.amount < Decimal::ZERO {
            return Err(ValidationError::NegativeAmount {
                symbol: self.symbol.clone(),
                amount: self.amount,
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Backtest configuration
// ---------------------------------------------------------------------------

/// The pending configuration of a backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BacktestConfig {
    pub symbol: String,
    #[serde(default, with = "optional_date")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, with = "optional_date")]
    pub end_date: Option<NaiveDate>,
    pub initial_capital: Decimal,
    /// Identifier of a strategy implemented by the execution engine.
    pub strategy: String,
    #[serde(default)]
    pub parameters: StrategyParameters,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            symbol: "BTC-USDT".to_string(),
            start_date: None,
            end_date: None,
            initial_capital: Decimal::new(10_000, 0),
            strategy: "buy_and_hold".to_string(),
            parameters: StrategyParameters::new(),
        }
    }
}

impl BacktestConfig {
    /// Shallow merge: every field present in `patch` replaces the current one.
    /// A supplied `parameters` map replaces the whole map.
    pub fn merge(&mut self, patch: BacktestConfigPatch) {
        if let Some(symbol) = patch.symbol {
            self.symbol = symbol;
        }
        if let Some(start_date) = patch.start_date {
            self.start_date = start_date;
        }
        if let Some(end_date) = patch.end_date {
            self.end_date = end_date;
        }
        if let Some(initial_capital) = patch.initial_capital {
            self.initial_capital = initial_capital;
        }
        if let Some(strategy) = patch.strategy {
            self.strategy = strategy;
        }
        if let Some(parameters) = patch.parameters {
            self.parameters = parameters;
        }
    }

    /// Checks the preconditions a run must satisfy before it is submitted.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.symbol.trim().is_empty() {
            return Err(ValidationError::BlankSymbol);
        }
        if self.strategy.trim().is_empty() {
            return Err(ValidationError::BlankStrategy);
        }
        let start = self.start_date.ok_or(ValidationError::MissingDate("startDate"))?;
        let end = self.end_date.ok_or(ValidationError::MissingDate("endDate"))?;
        if start > end {
            return Err(ValidationError::DateOrder { start, end });
        }
        if self.initial_capital <= Decimal::ZERO {
            return Err(ValidationError::NonPositiveCapital(self.initial_capital));
        }
        Ok(())
    }
}

/// Partial update of a [`BacktestConfig`]. `start_date: Some(None)` clears
/// the date; `None` leaves it untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BacktestConfigPatch {
    pub symbol: Option<String>,
    pub start_date: Option<Option<NaiveDate>>,
    pub end_date: Option<Option<NaiveDate>>,
    pub initial_capital: Option<Decimal>,
    pub strategy: Option<String>,
    pub parameters: Option<StrategyParameters>,
}

// ---------------------------------------------------------------------------
// Backtest results
// ---------------------------------------------------------------------------

/// Lifecycle of a remote backtest run. Transitions are reported by the
/// execution engine; `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BacktestStatus {
    Running,
    Completed,
    Failed,
}

impl BacktestStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BacktestStatus::Completed | BacktestStatus::Failed)
    }
}

impl fmt::Display for BacktestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BacktestStatus::Running => "running",
            BacktestStatus::Completed => "completed",
            BacktestStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Buy,
    Sell,
}

/// A closed trade in a backtest ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeRecord {
    #[serde(with = "day_or_datetime")]
    pub entry_date: DateTime<Utc>,
    #[serde(with = "day_or_datetime")]
    pub exit_date: DateTime<Utc>,
    pub symbol: String,
    pub side: Side,
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub pnl: Decimal,
    pub pnl_percent: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    #[serde(with = "day_or_datetime")]
    pub date: DateTime<Utc>,
    pub value: Decimal,
}

/// Performance metrics of a completed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BacktestMetrics {
    pub total_return: Decimal,
    pub total_return_percent: Decimal,
    pub annualized_return: Decimal,
    pub max_drawdown: Decimal,
    pub sharpe_ratio: Decimal,
    /// Percentage of winning trades (0-100).
    pub win_rate: Decimal,
    pub total_trades: usize,
    pub profit_factor: Decimal,
    /// Chronological equity curve.
    #[serde(default)]
    pub equity: Vec<EquityPoint>,
    #[serde(default)]
    pub trades: Vec<TradeRecord>,
}

/// A backtest run as reported by the execution engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BacktestResult {
    pub id: String,
    pub config: BacktestConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<BacktestMetrics>,
    pub status: BacktestStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BacktestResult {
    /// A freshly submitted run with no results yet.
    pub fn running(id: &str, config: BacktestConfig, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.to_string(),
            config,
            results: None,
            status: BacktestStatus::Running,
            created_at,
            completed_at: None,
            error: None,
        }
    }

    /// Checks a received payload against the result invariants.
    pub fn verify(&self) -> Result<(), IntegrityError> {
        match self.status {
            BacktestStatus::Completed if self.results.is_none() => {
                return Err(IntegrityError::MissingResults(self.id.clone()));
            }
            BacktestStatus::Failed if self.error.as_deref().map_or(true, str::is_empty) => {
                return Err(IntegrityError::MissingError(self.id.clone()));
            }
            _ => {}
        }

        let Some(metrics) = &self.results else {
            return Ok(());
        };

        if metrics.trades.len() != metrics.total_trades {
            return Err(IntegrityError::TradeCountMismatch {
                id: self.id.clone(),
                expected: metrics.total_trades,
                actual: metrics.trades.len(),
            });
        }

        if metrics.win_rate < Decimal::ZERO || metrics.win_rate > Decimal::ONE_HUNDRED {
            return Err(IntegrityError::WinRateOutOfRange {
                id: self.id.clone(),
                win_rate: metrics.win_rate,
            });
        }

        if let Some(index) = metrics
            .equity
            .windows(2)
            .position(|w| w[1].date < w[0].date)
        {
            return Err(IntegrityError::EquityOutOfOrder {
                id: self.id.clone(),
                index: index + 1,
            });
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// UI preferences
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    #[default]
    Ko,
    En,
    Ja,
    Zh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Success,
    Error,
    Warning,
    Info,
}

/// A transient message shown to the user until dismissed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub message: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

/// `YYYY-MM-DD` dates where an empty string or null means "not chosen yet".
mod optional_date {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(date: &Option<NaiveDate>, s: S) -> Result<S::Ok, S::Error> {
        match date {
            Some(d) => s.serialize_str(&d.format("%Y-%m-%d").to_string()),
            None => s.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveDate>, D::Error> {
        let raw: Option<String> = Option::deserialize(d)?;
        match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map(Some)
                .map_err(serde::de::Error::custom),
        }
    }
}

/// RFC 3339 timestamps, also accepting a bare `YYYY-MM-DD` as midnight UTC.
mod day_or_datetime {
    use chrono::{DateTime, NaiveDate, Utc};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        ts.serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        let raw = raw.trim();
        if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
            return Ok(ts.with_timezone(&Utc));
        }
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc())
            .ok_or_else(|| serde::de::Error::custom(format!("expected RFC 3339 or YYYY-MM-DD, got '{}'", raw)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap()
    }

    fn trade(d: u32) -> TradeRecord {
        TradeRecord {
            entry_date: day(d),
            exit_date: day(d + 1),
            symbol: "BTC-USDT".to_string(),
            side: Side::Buy,
            quantity: dec!(0.5),
            entry_price: dec!(40000),
            exit_price: dec!(42000),
            pnl: dec!(1000),
            pnl_percent: dec!(5),
        }
    }

    fn completed(trades: Vec<TradeRecord>, total_trades: usize) -> BacktestResult {
        let mut result = BacktestResult::running("bt-1", BacktestConfig::default(), day(1));
        result.status = BacktestStatus::Completed;
        result.completed_at = Some(day(2));
        result.results = Some(BacktestMetrics {
            total_return: dec!(1000),
            total_return_percent: dec!(10),
            annualized_return: dec!(12),
            max_drawdown: dec!(3.5),
            sharpe_ratio: dec!(1.4),
            win_rate: dec!(100),
            total_trades,
            profit_factor: dec!(999.99),
            equity: vec![
                EquityPoint { date: day(1), value: dec!(10000) },
                EquityPoint { date: day(1), value: dec!(10200) },
                EquityPoint { date: day(3), value: dec!(11000) },
            ],
            trades,
        });
        result
    }

    #[test]
    fn test_timeframe_parse_and_okx_mapping() {
        assert_eq!("4h".parse::<Timeframe>().unwrap(), Timeframe::FourHours);
        assert_eq!(Timeframe::OneDay.okx_bar(), "1D");
        assert_eq!(Timeframe::default(), Timeframe::OneHour);
        assert!("30m".parse::<Timeframe>().is_err());
    }

    #[test]
    fn test_config_merge_is_shallow() {
        let mut config = BacktestConfig::default();
        config.parameters.insert("fast".into(), serde_json::json!(10));
        config.parameters.insert("slow".into(), serde_json::json!(30));

        let mut params = StrategyParameters::new();
        params.insert("period".into(), serde_json::json!(14));
        config.merge(BacktestConfigPatch {
            initial_capital: Some(dec!(5000)),
            parameters: Some(params),
            ..Default::default()
        });

        assert_eq!(config.symbol, "BTC-USDT");
        assert_eq!(config.initial_capital, dec!(5000));
        assert_eq!(config.parameters.len(), 1);
        assert_eq!(config.parameters["period"], serde_json::json!(14));
    }

    #[test]
    fn test_config_validation() {
        let mut config = BacktestConfig::default();
        assert!(matches!(config.validate(), Err(ValidationError::MissingDate("startDate"))));

        config.start_date = NaiveDate::from_ymd_opt(2024, 3, 1);
        config.end_date = NaiveDate::from_ymd_opt(2024, 1, 1);
        assert!(matches!(config.validate(), Err(ValidationError::DateOrder { .. })));

        config.end_date = config.start_date;
        assert!(config.validate().is_ok());

        config.initial_capital = Decimal::ZERO;
        assert!(matches!(config.validate(), Err(ValidationError::NonPositiveCapital(_))));
    }

    #[test]
    fn test_config_wire_format_accepts_blank_dates() {
        let config: BacktestConfig = serde_json::from_value(serde_json::json!({
            "symbol": "ETH-USDT",
            "startDate": "",
            "endDate": "2024-02-01",
            "initialCapital": 2500,
            "strategy": "sma_cross",
            "parameters": { "fast": 5 }
        }))
        .unwrap();

        assert_eq!(config.start_date, None);
        assert_eq!(config.end_date, NaiveDate::from_ymd_opt(2024, 2, 1));
        assert_eq!(config.initial_capital, dec!(2500));

        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["startDate"], "");
        assert_eq!(json["endDate"], "2024-02-01");
    }

    #[test]
    fn test_verify_accepts_consistent_result() {
        let result = completed(vec![trade(1), trade(2)], 2);
        assert!(result.verify().is_ok());
    }

    #[test]
    fn test_verify_rejects_trade_count_mismatch() {
        let result = completed(vec![trade(1)], 3);
        assert!(matches!(
            result.verify(),
            Err(IntegrityError::TradeCountMismatch { expected: 3, actual: 1, .. })
        ));
    }

    #[test]
    fn test_verify_rejects_equity_going_backwards() {
        let mut result = completed(vec![], 0);
        if let Some(metrics) = result.results.as_mut() {
            metrics.equity.push(EquityPoint { date: day(2), value: dec!(10900) });
        }
        assert!(matches!(
            result.verify(),
            Err(IntegrityError::EquityOutOfOrder { index: 3, .. })
        ));
    }

    #[test]
    fn test_verify_requires_error_on_failed_run() {
        let mut result = BacktestResult::running("bt-2", BacktestConfig::default(), day(1));
        result.status = BacktestStatus::Failed;
        assert!(matches!(result.verify(), Err(IntegrityError::MissingError(_))));

        result.error = Some("unknown strategy".to_string());
        assert!(result.verify().is_ok());
    }

    #[test]
    fn test_asset_validation() {
        let asset = Asset::new("BTC-USDT", dec!(-1), dec!(100), dec!(0));
        assert!(matches!(asset.validate(), Err(ValidationError::NegativeAmount { .. })));
        assert!(Asset::new("BTC-USDT", dec!(0), dec!(0), dec!(0)).validate().is_ok());
        assert!(matches!(
            Asset::new(" ", dec!(1), dec!(1), dec!(0)).validate(),
            Err(ValidationError::BlankSymbol)
        ));
    }

    #[test]
    fn test_asset_pnl_percent_against_cost() {
        assert_eq!(Asset::new("ETH-USDT", dec!(1), dec!(110), dec!(10)).pnl_percent, dec!(10));
        assert_eq!(Asset::new("ETH-USDT", dec!(1), dec!(10), dec!(10)).pnl_percent, Decimal::ZERO);

        let big = dec!(60000000000000000000000000000);
        assert_eq!(Asset::new("BTC-USDT", dec!(1), big, -big).pnl_percent, Decimal::ZERO);
    }

    #[test]
    fn test_metrics_accept_day_only_dates() {
        let metrics: BacktestMetrics = serde_json::from_value(serde_json::json!({
            "totalReturn": 500,
            "totalReturnPercent": 5,
            "annualizedReturn": 20,
            "maxDrawdown": 2.5,
            "sharpeRatio": 1.1,
            "winRate": 100,
            "totalTrades": 1,
            "profitFactor": 2,
            "equity": [
                { "date": "2024-01-01", "value": 10000 },
                { "date": "2024-01-02T12:00:00Z", "value": 10500 }
            ],
            "trades": [{
                "entryDate": "2024-01-01",
                "exitDate": "2024-01-02",
                "symbol": "BTC-USDT",
                "side": "buy",
                "quantity": 0.25,
                "entryPrice": 40000,
                "exitPrice": 42000,
                "pnl": 500,
                "pnlPercent": 5
            }]
        }))
        .unwrap();

        assert_eq!(metrics.equity[0].date, day(1));
        assert_eq!(metrics.equity[1].date, day(2) + chrono::Duration::hours(12));
        assert_eq!(metrics.trades[0].exit_date, day(2));

        let bad = serde_json::json!({ "date": "next tuesday", "value": 1 });
        assert!(serde_json::from_value::<EquityPoint>(bad).is_err());
    }

    #[test]
    fn test_market_data_last_update_is_epoch_millis() {
        let data: MarketData = serde_json::from_value(serde_json::json!({
            "symbol": "BTC-USDT",
            "price": 43250.5,
            "change24h": -120,
            "changePercent24h": -0.28,
            "volume24h": 1500000,
            "marketCap": 850000000000u64,
            "lastUpdate": 1704067200000i64
        }))
        .unwrap();

        assert_eq!(data.last_update, day(1));
        assert_eq!(data.price, dec!(43250.5));
    }
}
