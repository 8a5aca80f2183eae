use async_trait::async_trait;
use coinlab_core::*;
use reqwest::{Method, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/api";

/// Connection settings for the backend API.
#[derive(Debug, Clone)]
pub struct HttpGatewayConfig {
    pub base_url: String,
    /// Bearer credential issued by the identity provider. Forwarded as-is.
    pub token: Option<String>,
    pub timeout_secs: u64,
}

impl Default for HttpGatewayConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            token: None,
            timeout_secs: 30,
        }
    }
}

/// [`RemoteGateway`] backed by the dashboard's REST API.
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpGateway {
    pub fn new(config: HttpGatewayConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GatewayError::Transport(format!("Failed to build HTTP client: {}", e)))?;

        let base_url = Url::parse(config.base_url.trim_end_matches('/'))
            .map_err(|e| GatewayError::Transport(format!("Invalid base URL '{}': {}", config.base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(GatewayError::Transport(format!(
                "Invalid base URL '{}': not a hierarchical URL",
                config.base_url
            )));
        }

        Ok(Self {
            client,
            base_url,
            token: config.token.filter(|t| !t.is_empty()),
        })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// Base URL extended by `segments`, each percent-encoded as one segment.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, segments: &[&str]) -> RequestBuilder {
        let url = self.endpoint(segments);
        let request_id = Uuid::new_v4();
        debug!(%method, path = url.path(), %request_id, authenticated = self.token.is_some(), "Gateway request");

        let builder = self
            .client
            .request(method, url)
            .header("x-request-id", request_id.to_string());
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<reqwest::Response, GatewayError> {
        let response = builder
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(GatewayError::Unauthorized(status.as_u16()));
        }

        let body = response.text().await.unwrap_or_default();
        let message = if body.is_empty() {
            status.canonical_reason().unwrap_or("unknown status").to_string()
        } else {
            body.chars().take(512).collect()
        };
        Err(GatewayError::Status {
            status: status.as_u16(),
            message,
        })
    }

    async fn fetch_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, GatewayError> {
        let response = self.send(builder).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| GatewayError::Decode(e.to_string()))
    }
}

#[async_trait]
impl RemoteGateway for HttpGateway {
    async fn market_data(&self, query: &CandleQuery) -> Result<Vec<Candle>, GatewayError> {
        let builder = self.request(Method::GET, &["market", "data"]).query(&[
            ("symbol", query.symbol.clone()),
            ("interval", query.timeframe.to_string()),
            ("start", query.start.to_rfc3339()),
            ("end", query.end.to_rfc3339()),
        ]);
        self.fetch_json(builder).await
    }

    async fn symbols(&self) -> Result<Vec<String>, GatewayError> {
        self.fetch_json(self.request(Method::GET, &["market", "symbols"])).await
    }

    async fn portfolio(&self) -> Result<Vec<Asset>, GatewayError> {
        self.fetch_json(self.request(Method::GET, &["portfolio"])).await
    }

    async fn update_portfolio(&self, assets: &[Asset]) -> Result<(), GatewayError> {
        self.send(self.request(Method::PUT, &["portfolio"]).json(assets))
            .await
            .map(|_| ())
    }

    async fn run_backtest(&self, config: &BacktestConfig) -> Result<BacktestResult, GatewayError> {
        self.fetch_json(self.request(Method::POST, &["backtest", "run"]).json(config))
            .await
    }

    async fn backtest_result(&self, id: &str) -> Result<BacktestResult, GatewayError> {
        self.fetch_json(self.request(Method::GET, &["backtest", "results", id]))
            .await
    }

    async fn backtest_history(&self) -> Result<Vec<BacktestResult>, GatewayError> {
        self.fetch_json(self.request(Method::GET, &["backtest", "history"])).await
    }
}
