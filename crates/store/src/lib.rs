pub mod aggregates;
pub mod backtest;
pub mod market;
pub mod portfolio;
pub mod session;
pub mod ui;

pub use backtest::BacktestState;
pub use market::MarketState;
pub use portfolio::PortfolioState;
pub use session::{Session, SessionError};
pub use ui::UiState;

use coinlab_core::*;
use serde::Serialize;
use tracing::debug;

/// A slice of application state driven by its own action type.
pub trait Reducer: Sized {
    type Action;

    /// Apply an action in place. Derived fields are recomputed before this returns.
    fn apply(&mut self, action: Self::Action);

    /// Prior state in, next state out.
    fn reduce(mut self, action: Self::Action) -> Self {
        self.apply(action);
        self
    }
}

/// Initial values for a fresh [`AppStore`].
#[derive(Debug, Clone)]
pub struct StoreDefaults {
    pub watchlist: Vec<String>,
    pub timeframe: Timeframe,
    pub backtest: BacktestConfig,
    pub theme: Theme,
    pub language: Language,
}

impl Default for StoreDefaults {
    fn default() -> Self {
        Self {
            watchlist: market::DEFAULT_WATCHLIST.iter().map(|s| s.to_string()).collect(),
            timeframe: Timeframe::default(),
            backtest: BacktestConfig::default(),
            theme: Theme::default(),
            language: Language::default(),
        }
    }
}

/// Detached copy of every slice, for readers that span slices.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppState {
    pub market: MarketState,
    pub portfolio: PortfolioState,
    pub backtest: BacktestState,
    pub ui: UiState,
}

/// The per-session state container. Each slice is owned here and only
/// changes through [`AppStore::dispatch`].
#[derive(Debug, Clone)]
pub struct AppStore {
    state: AppState,
}

impl Default for AppStore {
    fn default() -> Self {
        Self::new(StoreDefaults::default())
    }
}

impl AppStore {
    pub fn new(defaults: StoreDefaults) -> Self {
        Self {
            state: AppState {
                market: MarketState::new(defaults.watchlist, defaults.timeframe),
                portfolio: PortfolioState::new(),
                backtest: BacktestState::new(defaults.backtest),
                ui: UiState::new(defaults.theme, defaults.language),
            },
        }
    }

    /// Route an action to the one slice it targets.
    pub fn dispatch(&mut self, action: impl Into<Action>) {
        match action.into() {
            Action::Market(a) => {
                debug!(slice = "market", action = ?a, "dispatch");
                self.state.market.apply(a);
            }
            Action::Portfolio(a) => {
                debug!(slice = "portfolio", action = ?a, "dispatch");
                self.state.portfolio.apply(a);
            }
            Action::Backtest(a) => {
                debug!(slice = "backtest", action = ?a, "dispatch");
                self.state.backtest.apply(a);
            }
            Action::Ui(a) => {
                debug!(slice = "ui", action = ?a, "dispatch");
                self.state.ui.apply(a);
            }
        }
    }

    pub fn market(&self) -> &MarketState {
        &self.state.market
    }

    pub fn portfolio(&self) -> &PortfolioState {
        &self.state.portfolio
    }

    pub fn backtest(&self) -> &BacktestState {
        &self.state.backtest
    }

    pub fn ui(&self) -> &UiState {
        &self.state.ui
    }

    pub fn snapshot(&self) -> AppState {
        self.state.clone()
    }
}
