use coinlab_core::*;
use serde::Serialize;
use tracing::debug;

use crate::Reducer;

/// Pending configuration, the run being watched, and past runs
/// (most recent first).
///
/// `current` and `history` are independent copies: recording a result in
/// the history does not touch `current`, and vice versa.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BacktestState {
    config: BacktestConfig,
    current: Option<BacktestResult>,
    history: Vec<BacktestResult>,
    loading: bool,
    error: Option<String>,
}

impl BacktestState {
    pub fn new(config: BacktestConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    /// Shallow-merge into the pending configuration. No validation happens
    /// here; see [`BacktestConfig::validate`].
    pub fn set_config(&mut self, patch: BacktestConfigPatch) {
        self.config.merge(patch);
    }

    pub fn set_current(&mut self, result: Option<BacktestResult>) {
        self.current = result;
    }

    /// Idempotent upsert keyed by id. A known id is replaced in place and
    /// keeps its original `created_at`; a new id goes to the front.
    pub fn record_result(&mut self, mut result: BacktestResult) {
        match self.history.iter_mut().find(|r| r.id == result.id) {
            Some(existing) => {
                debug!(
                    id = %result.id,
                    from = %existing.status,
                    to = %result.status,
                    "Updating backtest in history"
                );
                result.created_at = existing.created_at;
                *existing = result;
            }
            None => {
                debug!(id = %result.id, status = %result.status, "Adding backtest to history");
                self.history.insert(0, result);
            }
        }
    }

    pub fn set_history(&mut self, history: Vec<BacktestResult>) {
        self.history = history;
    }

    pub fn remove_result(&mut self, id: &str) {
        self.history.retain(|r| r.id != id);
    }

    pub fn set_loading(&mut self, loading: bool) {
        self.loading = loading;
    }

    pub fn set_error(&mut self, error: Option<String>) {
        self.error = error;
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    pub fn current(&self) -> Option<&BacktestResult> {
        self.current.as_ref()
    }

    pub fn history(&self) -> &[BacktestResult] {
        &self.history
    }

    pub fn find(&self, id: &str) -> Option<&BacktestResult> {
        self.history.iter().find(|r| r.id == id)
    }

    pub fn loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

impl Reducer for BacktestState {
    type Action = BacktestAction;

    fn apply(&mut self, action: BacktestAction) {
        match action {
            BacktestAction::SetConfig(patch) => self.set_config(patch),
            BacktestAction::SetCurrent(result) => self.set_current(result),
            BacktestAction::RecordResult(result) => self.record_result(result),
            BacktestAction::SetHistory(history) => self.set_history(history),
            BacktestAction::RemoveResult(id) => self.remove_result(&id),
            BacktestAction::SetLoading(loading) => self.set_loading(loading),
            BacktestAction::SetError(error) => self.set_error(error),
        }
    }
}
