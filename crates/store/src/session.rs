use chrono::Utc;
use coinlab_core::*;
use std::time::Duration;
use tracing::{info, warn};

use crate::{aggregates, AppStore};

/// Errors surfaced by gateway-driven session operations. The same message
/// is also stored in the affected slice's `error` field.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Invalid input: {0}")]
    Validation(#[from] ValidationError),
    #[error("Gateway request failed: {0}")]
    Gateway(#[from] GatewayError),
    #[error("Inconsistent payload: {0}")]
    Integrity(#[from] IntegrityError),
    #[error("Backtest {id} still running after {polls} polls")]
    PollTimeout { id: String, polls: u32 },
}

#[derive(Debug, Clone, Copy)]
enum Slice {
    Market,
    Portfolio,
    Backtest,
}

impl Slice {
    fn loading(self, loading: bool) -> Action {
        match self {
            Slice::Market => MarketAction::SetLoading(loading).into(),
            Slice::Portfolio => PortfolioAction::SetLoading(loading).into(),
            Slice::Backtest => BacktestAction::SetLoading(loading).into(),
        }
    }

    fn error(self, error: Option<String>) -> Action {
        match self {
            Slice::Market => MarketAction::SetError(error).into(),
            Slice::Portfolio => PortfolioAction::SetError(error).into(),
            Slice::Backtest => BacktestAction::SetError(error).into(),
        }
    }
}

/// Binds an [`AppStore`] to a [`RemoteGateway`].
///
/// Requests are awaited here; their outcomes are applied to the store
/// through ordinary dispatches once they have fully resolved.
pub struct Session<G> {
    store: AppStore,
    gateway: G,
}

impl<G: RemoteGateway> Session<G> {
    pub fn new(store: AppStore, gateway: G) -> Self {
        Self { store, gateway }
    }

    pub fn store(&self) -> &AppStore {
        &self.store
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn dispatch(&mut self, action: impl Into<Action>) {
        self.store.dispatch(action);
    }

    fn succeed(&mut self, slice: Slice) {
        self.store.dispatch(slice.loading(false));
        self.store.dispatch(slice.error(None));
    }

    fn fail<T>(&mut self, slice: Slice, err: SessionError) -> Result<T, SessionError> {
        warn!(slice = ?slice, error = %err, "Session request failed");
        self.store.dispatch(slice.loading(false));
        self.store.dispatch(slice.error(Some(err.to_string())));
        Err(err)
    }

    // -----------------------------------------------------------------------
    // Market
    // -----------------------------------------------------------------------

    pub async fn symbols(&mut self) -> Result<Vec<String>, SessionError> {
        self.store.dispatch(Slice::Market.loading(true));
        match self.gateway.symbols().await {
            Ok(symbols) => {
                self.succeed(Slice::Market);
                Ok(symbols)
            }
            Err(e) => self.fail(Slice::Market, e.into()),
        }
    }

    pub async fn candles(&mut self, query: &CandleQuery) -> Result<Vec<Candle>, SessionError> {
        self.store.dispatch(Slice::Market.loading(true));
        match self.gateway.market_data(query).await {
            Ok(mut candles) => {
                candles.sort_by_key(|c| c.timestamp);
                info!(symbol = %query.symbol, timeframe = %query.timeframe, candles = candles.len(), "Loaded market data");
                self.succeed(Slice::Market);
                Ok(candles)
            }
            Err(e) => self.fail(Slice::Market, e.into()),
        }
    }

    // -----------------------------------------------------------------------
    // Portfolio
    // -----------------------------------------------------------------------

    pub async fn refresh_portfolio(&mut self) -> Result<(), SessionError> {
        self.store.dispatch(Slice::Portfolio.loading(true));
        let assets = match self.gateway.portfolio().await {
            Ok(assets) => assets,
            Err(e) => return self.fail(Slice::Portfolio, e.into()),
        };
        if let Err(e) = assets.iter().try_for_each(Asset::validate) {
            return self.fail(Slice::Portfolio, e.into());
        }
        if aggregates::checked_totals(&assets).is_none() {
            return self.fail(Slice::Portfolio, ValidationError::ValueOverflow.into());
        }

        info!(assets = assets.len(), "Loaded portfolio");
        self.store.dispatch(PortfolioAction::Load(assets));
        self.succeed(Slice::Portfolio);
        Ok(())
    }

    pub async fn save_portfolio(&mut self) -> Result<(), SessionError> {
        self.store.dispatch(Slice::Portfolio.loading(true));
        let assets = self.store.portfolio().assets().to_vec();
        match self.gateway.update_portfolio(&assets).await {
            Ok(()) => {
                info!(assets = assets.len(), "Saved portfolio");
                self.succeed(Slice::Portfolio);
                Ok(())
            }
            Err(e) => self.fail(Slice::Portfolio, e.into()),
        }
    }

    // -----------------------------------------------------------------------
    // Backtests
    // -----------------------------------------------------------------------

    /// Validate the pending config and submit it. The returned `running`
    /// result becomes the current run and the head of the history.
    pub async fn submit_backtest(&mut self) -> Result<BacktestResult, SessionError> {
        let config = self.store.backtest().config().clone();
        if let Err(e) = config.validate() {
            return self.fail(Slice::Backtest, e.into());
        }

        self.store.dispatch(Slice::Backtest.loading(true));
        let result = match self.gateway.run_backtest(&config).await {
            Ok(result) => result,
            Err(e) => return self.fail(Slice::Backtest, e.into()),
        };
        if let Err(e) = result.verify() {
            return self.fail(Slice::Backtest, e.into());
        }

        info!(
            id = %result.id,
            symbol = %config.symbol,
            strategy = %config.strategy,
            "Submitted backtest"
        );
        self.store.dispatch(BacktestAction::SetCurrent(Some(result.clone())));
        self.store.dispatch(BacktestAction::RecordResult(result.clone()));
        self.succeed(Slice::Backtest);
        Ok(result)
    }

    /// Fetch the latest state of a run and reconcile it into the history
    /// (and into the current run when it tracks the same id).
    pub async fn poll_backtest(&mut self, id: &str) -> Result<BacktestResult, SessionError> {
        self.store.dispatch(Slice::Backtest.loading(true));
        let mut result = match self.gateway.backtest_result(id).await {
            Ok(result) => result,
            Err(e) => return self.fail(Slice::Backtest, e.into()),
        };
        if let Err(e) = result.verify() {
            return self.fail(Slice::Backtest, e.into());
        }
        if let Some(known) = self.store.backtest().find(id) {
            result.created_at = known.created_at;
        }

        info!(id = %result.id, status = %result.status, "Polled backtest");
        if self.store.backtest().current().map(|c| c.id.as_str()) == Some(id) {
            self.store.dispatch(BacktestAction::SetCurrent(Some(result.clone())));
        }
        self.store.dispatch(BacktestAction::RecordResult(result.clone()));
        self.succeed(Slice::Backtest);
        Ok(result)
    }

    /// Poll until the run reaches a terminal state or `max_polls` is spent.
    pub async fn wait_for_backtest(
        &mut self,
        id: &str,
        interval: Duration,
        max_polls: u32,
    ) -> Result<BacktestResult, SessionError> {
        let started = Utc::now();
        for poll in 1..=max_polls {
            let result = self.poll_backtest(id).await?;
            if result.status.is_terminal() {
                info!(
                    id,
                    status = %result.status,
                    polls = poll,
                    elapsed_ms = (Utc::now() - started).num_milliseconds(),
                    "Backtest finished"
                );
                return Ok(result);
            }
            if poll < max_polls {
                tokio::time::sleep(interval).await;
            }
        }
        let err = SessionError::PollTimeout {
            id: id.to_string(),
            polls: max_polls,
        };
        self.fail(Slice::Backtest, err)
    }

    pub async fn refresh_history(&mut self) -> Result<(), SessionError> {
        self.store.dispatch(Slice::Backtest.loading(true));
        let history = match self.gateway.backtest_history().await {
            Ok(history) => history,
            Err(e) => return self.fail(Slice::Backtest, e.into()),
        };
        if let Err(e) = history.iter().try_for_each(BacktestResult::verify) {
            return self.fail(Slice::Backtest, e.into());
        }

        info!(runs = history.len(), "Loaded backtest history");
        self.store.dispatch(BacktestAction::SetHistory(history));
        self.succeed(Slice::Backtest);
        Ok(())
    }

    /// Stop tracking the current run locally. The remote run is not cancelled.
    pub fn abandon_backtest(&mut self) {
        if let Some(current) = self.store.backtest().current() {
            info!(id = %current.id, "Abandoning backtest");
        }
        self.store.dispatch(BacktestAction::SetCurrent(None));
    }
}
