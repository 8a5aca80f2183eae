use chrono::{DateTime, Utc};
use coinlab_core::{Candle, CandleQuery, GatewayError};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

pub const OKX_BASE_URL: &str = "https://www.okx.com";
const HISTORY_CANDLES_PATH: &str = "/api/v5/market/history-candles";
/// Largest page the history endpoint will return.
const PAGE_LIMIT: usize = 100;

#[derive(Debug, Clone)]
pub struct OkxConfig {
    pub base_url: String,
    /// Zero disables the throttle.
    pub max_calls_per_minute: u32,
    pub timeout_secs: u64,
}

impl Default for OkxConfig {
    fn default() -> Self {
        Self {
            base_url: OKX_BASE_URL.to_string(),
            max_calls_per_minute: 20,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Deserialize)]
struct OkxResponse {
    code: String,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    data: Vec<Vec<String>>,
}

/// Pulls historical candles from OKX's public market API, newest page first.
pub struct OkxCandleFetcher {
    client: reqwest::Client,
    config: OkxConfig,
    last_call: Option<Instant>,
}

impl OkxCandleFetcher {
    pub fn new(config: OkxConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GatewayError::Transport(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            config,
            last_call: None,
        })
    }

    /// Fetch every candle in `[start, end]`, ascending and without duplicates.
    pub async fn fetch(&mut self, query: &CandleQuery) -> Result<Vec<Candle>, GatewayError> {
        if query.start > query.end {
            return Ok(Vec::new());
        }

        let start_ms = query.start.timestamp_millis();
        // `after` is exclusive, so step one past the end to include it.
        let mut cursor = query.end.timestamp_millis() + 1;
        let mut collected: BTreeMap<DateTime<Utc>, Candle> = BTreeMap::new();
        let mut pages = 0usize;

        loop {
            let page = self
                .fetch_page(&query.symbol, query.timeframe.okx_bar(), cursor)
                .await?;
            pages += 1;

            let page_len = page.len();
            let Some(oldest) = page.iter().map(|c| c.timestamp.timestamp_millis()).min() else {
                break;
            };

            for candle in page {
                if candle.timestamp >= query.start && candle.timestamp <= query.end {
                    collected.insert(candle.timestamp, candle);
                }
            }

            if oldest <= start_ms || page_len < PAGE_LIMIT || oldest >= cursor {
                break;
            }
            cursor = oldest;
        }

        info!(
            symbol = %query.symbol,
            bar = query.timeframe.okx_bar(),
            pages,
            candles = collected.len(),
            "Fetched OKX history"
        );
        Ok(collected.into_values().collect())
    }

    async fn fetch_page(&mut self, symbol: &str, bar: &str, after: i64) -> Result<Vec<Candle>, GatewayError> {
        self.throttle().await;
        debug!(symbol, bar, after, "OKX history page");

        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), HISTORY_CANDLES_PATH);
        let response = self
            .client
            .get(url)
            .query(&[
                ("instId", symbol.to_string()),
                ("bar", bar.to_string()),
                ("after", after.to_string()),
                ("limit", PAGE_LIMIT.to_string()),
            ])
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(GatewayError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let body: OkxResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))?;
        if body.code != "0" {
            return Err(GatewayError::Api {
                code: body.code,
                msg: body.msg,
            });
        }

        body.data.iter().map(|row| parse_row(row)).collect()
    }

    async fn throttle(&mut self) {
        if self.config.max_calls_per_minute > 0 {
            let spacing = Duration::from_secs(60) / self.config.max_calls_per_minute;
            if let Some(last) = self.last_call {
                let elapsed = last.elapsed();
                if elapsed < spacing {
                    sleep(spacing - elapsed).await;
                }
            }
        }
        self.last_call = Some(Instant::now());
    }
}

/// Parse one `[ts, o, h, l, c, vol, volCcy, volCcyQuote, confirm]` row.
pub fn parse_row(row: &[String]) -> Result<Candle, GatewayError> {
    if row.len() < 6 {
        return Err(GatewayError::Decode(format!(
            "Candle row has {} fields, expected at least 6",
            row.len()
        )));
    }

    let millis: i64 = row[0]
        .parse()
        .map_err(|_| GatewayError::Decode(format!("Invalid candle timestamp '{}'", row[0])))?;
    let timestamp = DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| GatewayError::Decode(format!("Candle timestamp out of range: {}", millis)))?;

    Ok(Candle {
        timestamp,
        open: parse_decimal(&row[1], "open")?,
        high: parse_decimal(&row[2], "high")?,
        low: parse_decimal(&row[3], "low")?,
        close: parse_decimal(&row[4], "close")?,
        volume: parse_decimal(&row[5], "volume")?,
    })
}

fn parse_decimal(s: &str, field: &str) -> Result<Decimal, GatewayError> {
    Decimal::from_str(s)
        .or_else(|_| Decimal::from_scientific(s))
        .map_err(|_| GatewayError::Decode(format!("Invalid {} value '{}'", field, s)))
}
