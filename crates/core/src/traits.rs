use crate::models::*;
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Input rejected before it reaches a store or the remote engine.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Symbol must not be blank")]
    BlankSymbol,
    #[error("Strategy must not be blank")]
    BlankStrategy,
    #[error("Missing {0}")]
    MissingDate(&'static str),
    #[error("Start date {start} is after end date {end}")]
    DateOrder { start: NaiveDate, end: NaiveDate },
    #[error("Initial capital must be positive, got {0}")]
    NonPositiveCapital(Decimal),
    #[error("Asset {symbol} has negative amount {amount}")]
    NegativeAmount { symbol: String, amount: Decimal },
    #[error("Unknown timeframe: {0}")]
    UnknownTimeframe(String),
    #[error("Portfolio figures exceed the supported decimal range")]
    ValueOverflow,
}

/// A backtest payload that breaks the result invariants.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum IntegrityError {
    #[error("Backtest {0} is completed but carries no results")]
    MissingResults(String),
    #[error("Backtest {0} failed without an error message")]
    MissingError(String),
    #[error("Backtest {id} reports {expected} trades but the ledger holds {actual}")]
    TradeCountMismatch {
        id: String,
        expected: usize,
        actual: usize,
    },
    #[error("Backtest {id} equity curve goes back in time at point {index}")]
    EquityOutOfOrder { id: String, index: usize },
    #[error("Backtest {id} win rate {win_rate} is outside 0-100")]
    WinRateOutOfRange { id: String, win_rate: Decimal },
}

// ---------------------------------------------------------------------------
// Remote Data Gateway
// ---------------------------------------------------------------------------

/// Errors that can occur while talking to a remote service.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Unauthorized ({0})")]
    Unauthorized(u16),
    #[error("Request failed with status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("API error {code}: {msg}")]
    Api { code: String, msg: String },
}

/// The remote service that owns market data, portfolio snapshots and
/// backtest execution. Responses arrive fully resolved; stores apply them
/// through their synchronous mutations.
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    /// Time-ordered price series for a symbol.
    async fn market_data(&self, query: &CandleQuery) -> Result<Vec<Candle>, GatewayError>;

    /// Tradable symbol identifiers.
    async fn symbols(&self) -> Result<Vec<String>, GatewayError>;

    async fn portfolio(&self) -> Result<Vec<Asset>, GatewayError>;

    async fn update_portfolio(&self, assets: &[Asset]) -> Result<(), GatewayError>;

    /// Submit a run. The engine answers with a `running` result and no metrics.
    async fn run_backtest(&self, config: &BacktestConfig) -> Result<BacktestResult, GatewayError>;

    async fn backtest_result(&self, id: &str) -> Result<BacktestResult, GatewayError>;

    /// Past runs, most recent first.
    async fn backtest_history(&self) -> Result<Vec<BacktestResult>, GatewayError>;
}
