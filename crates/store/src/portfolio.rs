use coinlab_core::*;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::warn;

use crate::aggregates::{self, PortfolioTotals};
use crate::Reducer;

/// Owned holdings plus the totals derived from them.
///
/// Every mutation of the asset list ends with a recompute,
/// so totals and allocations never lag the assets they summarize.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioState {
    assets: Vec<Asset>,
    #[serde(flatten)]
    totals: PortfolioTotals,
    loading: bool,
    error: Option<String>,
}

impl PortfolioState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole collection. A repeated symbol replaces the earlier
    /// occurrence in place.
    pub fn load(&mut self, assets: Vec<Asset>) {
        let mut deduped: Vec<Asset> = Vec::with_capacity(assets.len());
        for asset in assets {
            match deduped.iter_mut().find(|a| a.symbol == asset.symbol) {
                Some(existing) => {
                    warn!(symbol = %asset.symbol, "Duplicate symbol in portfolio load, keeping last");
                    *existing = asset;
                }
                None => deduped.push(asset),
            }
        }
        self.assets = deduped;
        self.recompute();
    }

    /// Replace the asset with the same symbol in place, or append it.
    pub fn upsert(&mut self, asset: Asset) {
        match self.assets.iter_mut().find(|a| a.symbol == asset.symbol) {
            Some(existing) => *existing = asset,
            None => self.assets.push(asset),
        }
        self.recompute();
    }

    /// Drop the asset with `symbol`. Unknown symbols are ignored.
    pub fn remove(&mut self, symbol: &str) {
        let before = self.assets.len();
        self.assets.retain(|a| a.symbol != symbol);
        if self.assets.len() != before {
            self.recompute();
        }
    }

    pub fn set_loading(&mut self, loading: bool) {
        self.loading = loading;
    }

    pub fn set_error(&mut self, error: Option<String>) {
        self.error = error;
    }

    fn recompute(&mut self) {
        self.totals = aggregates::compute_totals(&self.assets);
        let total_value = self.totals.total_value;
        for asset in &mut self.assets {
            asset.allocation = aggregates::allocation(asset.value, total_value);
        }
    }

    pub fn assets(&self) -> &[Asset] {
        &self.assets
    }

    pub fn asset(&self, symbol: &str) -> Option<&Asset> {
        self.assets.iter().find(|a| a.symbol == symbol)
    }

    pub fn asset_count(&self) -> usize {
        self.assets.len()
    }

    pub fn totals(&self) -> PortfolioTotals {
        self.totals
    }

    pub fn total_value(&self) -> Decimal {
        self.totals.total_value
    }

    pub fn total_pnl(&self) -> Decimal {
        self.totals.total_pnl
    }

    pub fn total_pnl_percent(&self) -> Decimal {
        self.totals.total_pnl_percent
    }

    pub fn top_performer(&self) -> Option<&Asset> {
        aggregates::top_performer(&self.assets)
    }

    pub fn loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

impl Reducer for PortfolioState {
    type Action = PortfolioAction;

    fn apply(&mut self, action: PortfolioAction) {
        match action {
            PortfolioAction::Load(assets) => self.load(assets),
            PortfolioAction::Upsert(asset) => self.upsert(asset),
            PortfolioAction::Remove(symbol) => self.remove(&symbol),
            PortfolioAction::SetLoading(loading) => self.set_loading(loading),
            PortfolioAction::SetError(error) => self.set_error(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn asset(symbol: &str, value: Decimal, pnl: Decimal) -> Asset {
        Asset::new(symbol, dec!(1), value, pnl)
    }

    fn assert_consistent(state: &PortfolioState) {
        let sum: Decimal = state.assets().iter().map(|a| a.value).sum();
        let pnl: Decimal = state.assets().iter().map(|a| a.pnl).sum();
        assert_eq!(state.total_value(), sum);
        assert_eq!(state.total_pnl(), pnl);
        if state.total_value().is_zero() {
            assert_eq!(state.total_pnl_percent(), Decimal::ZERO);
        }
    }

    #[test]
    fn test_load_sums_values() {
        let mut state = PortfolioState::new();
        state.load(vec![asset("A", dec!(60), dec!(0)), asset("B", dec!(40), dec!(0))]);
        assert_eq!(state.total_value(), dec!(100));
        assert_eq!(state.asset("A").map(|a| a.allocation), Some(dec!(60)));
        assert_eq!(state.asset("B").map(|a| a.allocation), Some(dec!(40)));
    }

    #[test]
    fn test_empty_load_then_upsert() {
        let mut state = PortfolioState::new();
        state.load(vec![]);
        state.upsert(asset("A", dec!(60), dec!(10)));

        assert_eq!(state.total_value(), dec!(60));
        assert_eq!(state.total_pnl(), dec!(10));
        assert_eq!(state.total_pnl_percent().round_dp(2), dec!(16.67));
        assert_eq!(state.asset("A").map(|a| a.allocation), Some(dec!(100)));
    }

    #[test]
    fn test_upsert_same_symbol_keeps_position() {
        let mut state = PortfolioState::new();
        state.upsert(asset("A", dec!(10), dec!(0)));
        state.upsert(asset("B", dec!(20), dec!(0)));
        state.upsert(asset("C", dec!(30), dec!(0)));
        state.upsert(asset("B", dec!(50), dec!(5)));

        let symbols: Vec<_> = state.assets().iter().map(|a| a.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["A", "B", "C"]);
        assert_eq!(state.asset("B").map(|a| a.value), Some(dec!(50)));
        assert_eq!(state.total_value(), dec!(90));
        assert_consistent(&state);
    }

    #[test]
    fn test_remove_last_asset_zeroes_aggregates() {
        let mut state = PortfolioState::new();
        state.upsert(asset("A", dec!(60), dec!(10)));
        state.remove("A");

        assert_eq!(state.asset_count(), 0);
        assert_eq!(state.totals(), PortfolioTotals::default());
    }

    #[test]
    fn test_remove_unknown_symbol_is_noop() {
        let mut state = PortfolioState::new();
        state.upsert(asset("A", dec!(60), dec!(10)));
        let before = state.clone();
        state.remove("ZZZ");
        assert_eq!(state, before);
    }

    #[test]
    fn test_aggregates_hold_across_mutation_sequence() {
        let mut state = PortfolioState::new();
        let steps: Vec<PortfolioAction> = vec![
            PortfolioAction::Upsert(asset("BTC", dec!(500), dec!(50))),
            PortfolioAction::Upsert(asset("ETH", dec!(300), dec!(-20))),
            PortfolioAction::Upsert(asset("BTC", dec!(450), dec!(0))),
            PortfolioAction::Remove("ETH".to_string()),
            PortfolioAction::Upsert(asset("DOT", dec!(0), dec!(-5))),
            PortfolioAction::Remove("BTC".to_string()),
            PortfolioAction::Remove("BTC".to_string()),
        ];
        for step in steps {
            state = state.reduce(step);
            assert_consistent(&state);
        }
        assert_eq!(state.total_value(), Decimal::ZERO);
        assert_eq!(state.total_pnl(), dec!(-5));
        assert_eq!(state.total_pnl_percent(), Decimal::ZERO);
    }

    #[test]
    fn test_load_deduplicates_symbols() {
        let mut state = PortfolioState::new();
        state.load(vec![
            asset("A", dec!(10), dec!(0)),
            asset("B", dec!(20), dec!(0)),
            asset("A", dec!(30), dec!(0)),
        ]);
        assert_eq!(state.asset_count(), 2);
        assert_eq!(state.assets()[0].value, dec!(30));
        assert_eq!(state.total_value(), dec!(50));
    }

    #[test]
    fn test_top_performer() {
        let mut state = PortfolioState::new();
        state.load(vec![asset("A", dec!(110), dec!(10)), asset("B", dec!(150), dec!(50))]);
        assert_eq!(state.top_performer().map(|a| a.symbol.as_str()), Some("B"));
    }

    #[test]
    fn test_load_near_decimal_max_saturates() {
        let big = dec!(60000000000000000000000000000);
        let mut state = PortfolioState::new();
        state.load(vec![asset("A", big, dec!(0)), asset("B", big, dec!(0))]);

        assert_eq!(state.asset_count(), 2);
        assert_eq!(state.total_value(), Decimal::MAX);
        assert_eq!(state.total_pnl_percent(), Decimal::ZERO);
        assert!(state.assets().iter().all(|a| a.allocation > dec!(75) && a.allocation < dec!(76)));

        state.upsert(asset("C", big, dec!(0)));
        assert_eq!(state.total_value(), Decimal::MAX);
    }
}
