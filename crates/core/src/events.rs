use crate::models::*;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Top-level action enum routed by the application store. Each variant
/// targets exactly one slice.
#[derive(Debug, Clone)]
pub enum Action {
    Market(MarketAction),
    Portfolio(PortfolioAction),
    Backtest(BacktestAction),
    Ui(UiAction),
}

/// Watchlist and quote mutations.
#[derive(Debug, Clone)]
pub enum MarketAction {
    /// Merge a snapshot; symbols absent from it are kept.
    SetAll(HashMap<String, MarketData>),
    Update(MarketData),
    AddToWatchlist(String),
    RemoveFromWatchlist(String),
    SelectSymbol(Option<String>),
    SetTimeframe(Timeframe),
    SetLoading(bool),
    SetError(Option<String>),
}

/// Holding mutations. Aggregates are recomputed by the store, never set.
#[derive(Debug, Clone)]
pub enum PortfolioAction {
    Load(Vec<Asset>),
    Upsert(Asset),
    Remove(String),
    SetLoading(bool),
    SetError(Option<String>),
}

/// Backtest configuration and run lifecycle mutations.
#[derive(Debug, Clone)]
pub enum BacktestAction {
    SetConfig(BacktestConfigPatch),
    SetCurrent(Option<BacktestResult>),
    RecordResult(BacktestResult),
    SetHistory(Vec<BacktestResult>),
    RemoveResult(String),
    SetLoading(bool),
    SetError(Option<String>),
}

#[derive(Debug, Clone)]
pub enum UiAction {
    ToggleSidebar,
    SetSidebarOpen(bool),
    SetTheme(Theme),
    SetLanguage(Language),
    SetLoading(bool),
    Notify {
        kind: NotificationKind,
        message: String,
        issued_at: DateTime<Utc>,
    },
    Dismiss(String),
    ClearNotifications,
}

impl UiAction {
    /// A notification stamped with the current time.
    pub fn notify(kind: NotificationKind, message: impl Into<String>) -> Self {
        UiAction::Notify {
            kind,
            message: message.into(),
            issued_at: Utc::now(),
        }
    }
}

impl From<MarketAction> for Action {
    fn from(action: MarketAction) -> Self {
        Action::Market(action)
    }
}

impl From<PortfolioAction> for Action {
    fn from(action: PortfolioAction) -> Self {
        Action::Portfolio(action)
    }
}

impl From<BacktestAction> for Action {
    fn from(action: BacktestAction) -> Self {
        Action::Backtest(action)
    }
}

impl From<UiAction> for Action {
    fn from(action: UiAction) -> Self {
        Action::Ui(action)
    }
}
