mod config;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use coinlab_core::*;
use coinlab_data::{write_candles_to_csv, HttpGateway, OkxCandleFetcher};
use coinlab_store::aggregates::summarize_history;
use coinlab_store::{AppStore, Session};
use config::Settings;
use rust_decimal::Decimal;
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "coinlab")]
#[command(about = "Crypto portfolio and backtest dashboard client")]
#[command(version)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Path to the settings file
    #[arg(short, long, default_value = "coinlab.toml")]
    config: PathBuf,

    /// Backend API base URL (overrides the settings file)
    #[arg(long, env = "COINLAB_API_BASE_URL")]
    api_url: Option<String>,

    /// Bearer token for the backend API
    #[arg(long, env = "COINLAB_API_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show holdings, totals and the top performer
    Portfolio,

    /// List tradable symbols
    Symbols,

    /// Submit a backtest and wait for it to finish
    Backtest {
        /// Trading pair (e.g. "BTC-USDT")
        #[arg(short, long)]
        symbol: Option<String>,

        /// First day of the test window (YYYY-MM-DD)
        #[arg(long)]
        start: Option<NaiveDate>,

        /// Last day of the test window (YYYY-MM-DD)
        #[arg(long)]
        end: Option<NaiveDate>,

        /// Initial capital
        #[arg(long)]
        capital: Option<Decimal>,

        /// Strategy identifier known to the execution engine
        #[arg(long)]
        strategy: Option<String>,

        /// Strategy parameter as key=value; values are parsed as JSON when possible
        #[arg(short, long = "param", value_parser = parse_param)]
        params: Vec<(String, serde_json::Value)>,

        /// Submit without waiting for completion
        #[arg(long)]
        detach: bool,
    },

    /// List past backtest runs
    History,

    /// Fetch historical candles
    Candles {
        #[arg(short, long)]
        symbol: String,

        /// Candle interval (1m, 5m, 15m, 1h, 4h, 1d)
        #[arg(short, long, default_value = "1h")]
        interval: Timeframe,

        /// Window start (YYYY-MM-DD or RFC 3339)
        #[arg(long, value_parser = parse_instant)]
        start: DateTime<Utc>,

        /// Window end (YYYY-MM-DD or RFC 3339)
        #[arg(long, value_parser = parse_instant)]
        end: DateTime<Utc>,

        #[arg(long, value_enum, default_value = "gateway")]
        source: CandleSource,

        /// Write the candles to this CSV file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum CandleSource {
    Gateway,
    Okx,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let explicit_config = cli.config != PathBuf::from("coinlab.toml");
    let mut settings = Settings::load(&cli.config, explicit_config)?;
    if let Some(url) = cli.api_url {
        settings.api.base_url = url;
    }
    if let Some(token) = cli.token {
        settings.api.token = Some(token);
    }

    let gateway = HttpGateway::new(settings.gateway_config())?;
    let store = AppStore::new(settings.store_defaults());
    let mut session = Session::new(store, gateway);
    tracing::debug!(base_url = %session.gateway().base_url(), "Session ready");

    match cli.command {
        Commands::Portfolio => show_portfolio(&mut session).await?,
        Commands::Symbols => {
            let symbols = session.symbols().await?;
            let watchlist = session.store().market().watchlist().to_vec();
            for symbol in symbols {
                let marker = if watchlist.contains(&symbol) { "*" } else { " " };
                println!("{} {}", marker, symbol);
            }
        }
        Commands::Backtest {
            symbol,
            start,
            end,
            capital,
            strategy,
            params,
            detach,
        } => {
            let parameters = if params.is_empty() {
                None
            } else {
                let mut map = session.store().backtest().config().parameters.clone();
                map.extend(params);
                Some(map)
            };
            session.dispatch(BacktestAction::SetConfig(BacktestConfigPatch {
                symbol,
                start_date: start.map(Some),
                end_date: end.map(Some),
                initial_capital: capital,
                strategy,
                parameters,
            }));
            run_backtest(&mut session, &settings, detach).await?;
        }
        Commands::History => show_history(&mut session).await?,
        Commands::Candles {
            symbol,
            interval,
            start,
            end,
            source,
            output,
        } => {
            let query = CandleQuery {
                symbol,
                timeframe: interval,
                start,
                end,
            };
            let candles = match source {
                CandleSource::Gateway => session.candles(&query).await?,
                CandleSource::Okx => {
                    let mut fetcher = OkxCandleFetcher::new(settings.okx_config())?;
                    fetcher.fetch(&query).await?
                }
            };
            show_candles(&query, &candles);

            if let Some(path) = output {
                let written = write_candles_to_csv(&path, &candles)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                tracing::info!(rows = written, path = %path.display(), "Candles exported");
                println!("Wrote {} candles to {}", written, path.display());
            }
        }
    }

    Ok(())
}

async fn show_portfolio(session: &mut Session<HttpGateway>) -> Result<()> {
    session.refresh_portfolio().await?;
    let portfolio = session.store().portfolio();

    let sep = "=".repeat(72);
    println!("\n{sep}");
    println!("  PORTFOLIO ({} assets)", portfolio.asset_count());
    println!("{sep}");
    println!(
        "  {:<12} {:>14} {:>14} {:>8} {:>14} {:>8}",
        "Symbol", "Amount", "Value", "Alloc%", "PnL", "PnL%"
    );
    for asset in portfolio.assets() {
        println!(
            "  {:<12} {:>14} {:>14.2} {:>8.2} {:>14.2} {:>8.2}",
            asset.symbol, asset.amount, asset.value, asset.allocation, asset.pnl, asset.pnl_percent
        );
    }
    println!("{sep}");
    println!("  Total Value:     ${:.2}", portfolio.total_value());
    println!(
        "  Total PnL:       ${:.2} ({:.2}%)",
        portfolio.total_pnl(),
        portfolio.total_pnl_percent()
    );
    if let Some(top) = portfolio.top_performer() {
        println!("  Top Performer:   {} ({:.2}%)", top.symbol, top.pnl_percent);
    }
    println!("{sep}\n");
    Ok(())
}

async fn run_backtest(session: &mut Session<HttpGateway>, settings: &Settings, detach: bool) -> Result<()> {
    let config = session.store().backtest().config().clone();
    tracing::info!(
        symbol = %config.symbol,
        strategy = %config.strategy,
        capital = %config.initial_capital,
        "Submitting backtest"
    );

    let submitted = session.submit_backtest().await?;
    if detach || submitted.status.is_terminal() {
        print_result(&submitted);
        return Ok(());
    }

    let result = match session
        .wait_for_backtest(&submitted.id, settings.backtest.poll_interval(), settings.backtest.max_polls)
        .await
    {
        Ok(result) => result,
        Err(e) => {
            session.abandon_backtest();
            return Err(e.into());
        }
    };

    let (kind, message) = match result.status {
        BacktestStatus::Completed => (NotificationKind::Success, format!("Backtest {} completed", result.id)),
        _ => (NotificationKind::Error, format!("Backtest {} failed", result.id)),
    };
    session.dispatch(UiAction::notify(kind, message));
    for note in session.store().ui().notifications() {
        tracing::info!(id = %note.id, kind = ?note.kind, "{}", note.message);
    }

    print_result(&result);
    if result.status == BacktestStatus::Failed {
        bail!("Backtest failed: {}", result.error.as_deref().unwrap_or("unknown error"));
    }
    Ok(())
}

fn print_result(result: &BacktestResult) {
    let config = &result.config;
    let fmt_date = |d: Option<NaiveDate>| d.map(|d| d.to_string()).unwrap_or_else(|| "-".to_string());

    let sep = "=".repeat(60);
    println!("\n{sep}");
    println!("  BACKTEST {}", result.id);
    println!("{sep}");
    println!("  Status:          {}", result.status);
    println!("  Strategy:        {}", config.strategy);
    println!("  Symbol:          {}", config.symbol);
    println!("  Period:          {} → {}", fmt_date(config.start_date), fmt_date(config.end_date));
    println!("  Initial Capital: ${:.2}", config.initial_capital);

    if let Some(metrics) = &result.results {
        println!("  Total Return:    ${:.2} ({:.2}%)", metrics.total_return, metrics.total_return_percent);
        println!("  Annualized:      {:.2}%", metrics.annualized_return);
        println!("  Max Drawdown:    {:.2}%", metrics.max_drawdown);
        println!("  Sharpe Ratio:    {:.2}", metrics.sharpe_ratio);
        println!("  Win Rate:        {:.1}%", metrics.win_rate);
        println!("  Profit Factor:   {:.2}", metrics.profit_factor);
        println!("  Total Trades:    {}", metrics.total_trades);
    }
    if let Some(error) = &result.error {
        println!("  Error:           {}", error);
    }
    println!("{sep}\n");
}

async fn show_history(session: &mut Session<HttpGateway>) -> Result<()> {
    session.refresh_history().await?;
    let history = session.store().backtest().history();

    for run in history {
        let ret = run
            .results
            .as_ref()
            .map(|m| format!("{:>8.2}%", m.total_return_percent))
            .unwrap_or_else(|| format!("{:>9}", "-"));
        println!(
            "{}  {:<10} {:<12} {:<16} {}  {}",
            run.created_at.format("%Y-%m-%d %H:%M"),
            run.status.to_string(),
            run.config.symbol,
            run.config.strategy,
            ret,
            run.id
        );
    }

    let summary = summarize_history(history);
    println!(
        "\n{} runs: {} completed, {} failed, {} running",
        history.len(),
        summary.completed,
        summary.failed,
        summary.running
    );
    if let Some((id, pct)) = summary.best_run {
        println!("Best run: {} ({:.2}%)", id, pct);
    }
    Ok(())
}

fn show_candles(query: &CandleQuery, candles: &[Candle]) {
    println!(
        "{} {} candles for {} between {} and {}",
        candles.len(),
        query.timeframe,
        query.symbol,
        query.start.to_rfc3339(),
        query.end.to_rfc3339()
    );
    if let (Some(first), Some(last)) = (candles.first(), candles.last()) {
        println!("  first: {} close {}", first.timestamp.to_rfc3339(), first.close);
        println!("  last:  {} close {}", last.timestamp.to_rfc3339(), last.close);
    }
}

fn parse_param(s: &str) -> Result<(String, serde_json::Value), String> {
    let (key, raw) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", s))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty parameter name in '{}'", s));
    }
    let value = serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}

fn parse_instant(s: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| format!("expected YYYY-MM-DD or RFC 3339, got '{}'", s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use clap::CommandFactory;
    use serde_json::json;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_param() {
        assert_eq!(parse_param("fast=9").unwrap(), ("fast".to_string(), json!(9)));
        assert_eq!(parse_param("ma=ema").unwrap(), ("ma".to_string(), json!("ema")));
        assert_eq!(parse_param("use_stop=true").unwrap().1, json!(true));
        assert_eq!(parse_param("levels=[1,2]").unwrap().1, json!([1, 2]));
        assert!(parse_param("novalue").is_err());
        assert!(parse_param("=3").is_err());
    }

    #[test]
    fn test_parse_instant() {
        assert_eq!(
            parse_instant("2024-03-01").unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(
            parse_instant("2024-03-01T12:30:00+02:00").unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 1, 10, 30, 0).unwrap()
        );
        assert!(parse_instant("yesterday").is_err());
    }

    #[test]
    fn test_backtest_flags() {
        let cli = Cli::try_parse_from([
            "coinlab", "backtest", "--symbol", "ETH-USDT", "--start", "2024-01-01", "--end", "2024-06-30",
            "--capital", "5000", "--strategy", "sma_cross", "-p", "fast=9", "-p", "slow=21",
        ])
        .unwrap();
        match cli.command {
            Commands::Backtest { symbol, start, capital, params, detach, .. } => {
                assert_eq!(symbol.as_deref(), Some("ETH-USDT"));
                assert_eq!(start, NaiveDate::from_ymd_opt(2024, 1, 1));
                assert_eq!(capital, Some(Decimal::new(5000, 0)));
                assert_eq!(params.len(), 2);
                assert!(!detach);
            }
            _ => panic!("expected backtest command"),
        }
    }

    #[test]
    fn test_candles_flags() {
        let cli = Cli::try_parse_from([
            "coinlab", "candles", "-s", "BTC-USDT", "-i", "4h", "--start", "2024-01-01", "--end", "2024-01-02",
            "--source", "okx",
        ])
        .unwrap();
        match cli.command {
            Commands::Candles { interval, source, output, .. } => {
                assert_eq!(interval, Timeframe::FourHours);
                assert!(matches!(source, CandleSource::Okx));
                assert!(output.is_none());
            }
            _ => panic!("expected candles command"),
        }
        assert!(Cli::try_parse_from(["coinlab", "candles", "-s", "X", "-i", "30m", "--start", "2024-01-01", "--end", "2024-01-02"]).is_err());
    }
}
