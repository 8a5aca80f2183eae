use coinlab_core::*;
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

use crate::Reducer;

/// Symbols shown in the watchlist before the user curates it.
pub const DEFAULT_WATCHLIST: [&str; 4] = ["BTC-USDT", "ETH-USDT", "ADA-USDT", "DOT-USDT"];

/// Watchlist and latest quote per symbol.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketState {
    market_data: HashMap<String, MarketData>,
    watchlist: Vec<String>,
    selected_symbol: Option<String>,
    timeframe: Timeframe,
    loading: bool,
    error: Option<String>,
}

impl Default for MarketState {
    fn default() -> Self {
        Self::new(
            DEFAULT_WATCHLIST.iter().map(|s| s.to_string()).collect(),
            Timeframe::default(),
        )
    }
}

impl MarketState {
    pub fn new(watchlist: Vec<String>, timeframe: Timeframe) -> Self {
        let mut state = Self {
            market_data: HashMap::new(),
            watchlist: Vec::with_capacity(watchlist.len()),
            selected_symbol: None,
            timeframe,
            loading: false,
            error: None,
        };
        for symbol in watchlist {
            state.add_to_watchlist(symbol);
        }
        state
    }

    /// Merge a snapshot into the known quotes, keyed by the snapshot's own
    /// keys. Symbols missing from the snapshot keep their previous entry.
    pub fn set_all(&mut self, snapshot: HashMap<String, MarketData>) {
        for (key, entry) in snapshot {
            self.merge_quote(key, entry);
        }
    }

    /// Upsert one symbol's quote. An entry older than the stored one is
    /// dropped so a late response cannot roll the quote back.
    pub fn update(&mut self, entry: MarketData) {
        self.merge_quote(entry.symbol.clone(), entry);
    }

    fn merge_quote(&mut self, key: String, entry: MarketData) {
        if let Some(current) = self.market_data.get(&key) {
            if entry.last_update < current.last_update {
                debug!(
                    symbol = %key,
                    incoming = %entry.last_update,
                    stored = %current.last_update,
                    "Ignoring stale market data"
                );
                return;
            }
        }
        self.market_data.insert(key, entry);
    }

    pub fn add_to_watchlist(&mut self, symbol: String) {
        if !self.watchlist.contains(&symbol) {
            self.watchlist.push(symbol);
        }
    }

    pub fn remove_from_watchlist(&mut self, symbol: &str) {
        self.watchlist.retain(|s| s != symbol);
    }

    pub fn select_symbol(&mut self, symbol: Option<String>) {
        self.selected_symbol = symbol;
    }

    pub fn set_timeframe(&mut self, timeframe: Timeframe) {
        self.timeframe = timeframe;
    }

    pub fn set_loading(&mut self, loading: bool) {
        self.loading = loading;
    }

    pub fn set_error(&mut self, error: Option<String>) {
        self.error = error;
    }

    pub fn market_data(&self) -> &HashMap<String, MarketData> {
        &self.market_data
    }

    pub fn quote(&self, symbol: &str) -> Option<&MarketData> {
        self.market_data.get(symbol)
    }

    pub fn watchlist(&self) -> &[String] {
        &self.watchlist
    }

    /// Quotes for the watched symbols, in watchlist order.
    pub fn watched_quotes(&self) -> impl Iterator<Item = &MarketData> + '_ {
        self.watchlist.iter().filter_map(|s| self.market_data.get(s))
    }

    pub fn selected_symbol(&self) -> Option<&str> {
        self.selected_symbol.as_deref()
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    pub fn loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

impl Reducer for MarketState {
    type Action = MarketAction;

    fn apply(&mut self, action: MarketAction) {
        match action {
            MarketAction::SetAll(snapshot) => self.set_all(snapshot),
            MarketAction::Update(entry) => self.update(entry),
            MarketAction::AddToWatchlist(symbol) => self.add_to_watchlist(symbol),
            MarketAction::RemoveFromWatchlist(symbol) => self.remove_from_watchlist(&symbol),
            MarketAction::SelectSymbol(symbol) => self.select_symbol(symbol),
            MarketAction::SetTimeframe(timeframe) => self.set_timeframe(timeframe),
            MarketAction::SetLoading(loading) => self.set_loading(loading),
            MarketAction::SetError(error) => self.set_error(error),
        }
    }
}
