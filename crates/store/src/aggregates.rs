use coinlab_core::*;
use rust_decimal::Decimal;
use serde::Serialize;

/// Portfolio-wide figures derived from the asset collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioTotals {
    pub total_value: Decimal,
    pub total_pnl: Decimal,
    /// `total_pnl / total_value * 100`, or zero for an empty/worthless portfolio.
    pub total_pnl_percent: Decimal,
}

/// Compute portfolio totals from the current holdings. Sums that leave the
/// `Decimal` range saturate; see [`checked_totals`] to detect that case.
pub fn compute_totals(assets: &[Asset]) -> PortfolioTotals {
    let total_value = assets
        .iter()
        .fold(Decimal::ZERO, |acc, a| acc.saturating_add(a.value));
    let total_pnl = assets
        .iter()
        .fold(Decimal::ZERO, |acc, a| acc.saturating_add(a.pnl));

    PortfolioTotals {
        total_value,
        total_pnl,
        total_pnl_percent: allocation(total_pnl, total_value),
    }
}

/// Like [`compute_totals`], but `None` when any figure overflows.
pub fn checked_totals(assets: &[Asset]) -> Option<PortfolioTotals> {
    let total_value = assets
        .iter()
        .try_fold(Decimal::ZERO, |acc, a| acc.checked_add(a.value))?;
    let total_pnl = assets
        .iter()
        .try_fold(Decimal::ZERO, |acc, a| acc.checked_add(a.pnl))?;
    let total_pnl_percent = checked_percent(total_pnl, total_value)?;

    Some(PortfolioTotals {
        total_value,
        total_pnl,
        total_pnl_percent,
    })
}

/// Share of `total_value` held in `value`, as a percentage. Zero when
/// `total_value` is not positive; saturates when the ratio overflows.
pub fn allocation(value: Decimal, total_value: Decimal) -> Decimal {
    checked_percent(value, total_value).unwrap_or(if value.is_sign_negative() {
        Decimal::MIN
    } else {
        Decimal::MAX
    })
}

fn checked_percent(part: Decimal, whole: Decimal) -> Option<Decimal> {
    if whole > Decimal::ZERO {
        part.checked_div(whole)?.checked_mul(Decimal::ONE_HUNDRED)
    } else {
        Some(Decimal::ZERO)
    }
}

/// The holding with the highest relative PnL. The earliest asset wins ties.
pub fn top_performer(assets: &[Asset]) -> Option<&Asset> {
    let (first, rest) = assets.split_first()?;
    Some(rest.iter().fold(first, |best, asset| {
        if asset.pnl_percent > best.pnl_percent {
            asset
        } else {
            best
        }
    }))
}

/// Counts and best run across a backtest history.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistorySummary {
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    /// Id and total return percent of the best completed run.
    pub best_run: Option<(String, Decimal)>,
}

pub fn summarize_history(history: &[BacktestResult]) -> HistorySummary {
    let mut summary = HistorySummary::default();

    for run in history {
        match run.status {
            BacktestStatus::Running => summary.running += 1,
            BacktestStatus::Completed => summary.completed += 1,
            BacktestStatus::Failed => summary.failed += 1,
        }

        let Some(metrics) = run.results.as_ref().filter(|_| run.status == BacktestStatus::Completed)
        else {
            continue;
        };
        let better = summary
            .best_run
            .as_ref()
            .map_or(true, |(_, best)| metrics.total_return_percent > *best);
        if better {
            summary.best_run = Some((run.id.clone(), metrics.total_return_percent));
        }
    }

    summary
}
