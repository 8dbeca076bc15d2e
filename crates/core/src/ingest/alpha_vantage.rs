use crate::config::Settings;
use crate::domain::bar::DailyBar;
use crate::ingest::provider::QuoteSource;
use crate::ingest::types::{parse_daily_series, FetchError};
use anyhow::Context;
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://www.alphavantage.co";
const QUERY_PATH: &str = "/query";
const DEFAULT_RETRY_DELAY_SECS: u64 = 30;

/// Suffix Alpha Vantage uses for B3-listed symbols.
pub const B3_SUFFIX: &str = ".SA";

#[derive(Debug, Clone)]
pub struct AlphaVantageClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    retry_delay: Duration,
}

impl AlphaVantageClient {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> anyhow::Result<Self> {
        // No request timeout: the client default applies.
        let http = reqwest::Client::builder()
            .build()
            .context("failed to build Alpha Vantage http client")?;

        Ok(Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
            retry_delay: Duration::from_secs(DEFAULT_RETRY_DELAY_SECS),
        })
    }

    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        // A missing key is not fatal here; the provider rejects each request instead.
        let api_key = settings.alpha_vantage_api_key.clone().unwrap_or_else(|| {
            tracing::warn!("ALPHA_VANTAGE_API_KEY is not set; requests will likely be rejected");
            String::new()
        });
        let base_url = settings
            .alpha_vantage_base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let retry_delay_secs = std::env::var("COLLECT_RETRY_DELAY_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_RETRY_DELAY_SECS);

        Ok(Self::new(api_key, base_url)?.with_retry_delay(Duration::from_secs(retry_delay_secs)))
    }

    /// Wait before the single re-request that follows an HTTP 503.
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn provider_symbol(ticker: &str) -> String {
        format!("{ticker}{B3_SUFFIX}")
    }

    fn url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), QUERY_PATH)
    }

    async fn send_once(&self, ticker: &str, symbol: &str) -> Result<reqwest::Response, FetchError> {
        let params = [
            ("function", "TIME_SERIES_DAILY"),
            ("symbol", symbol),
            ("apikey", self.api_key.as_str()),
            ("outputsize", "compact"),
        ];

        self.http
            .get(self.url())
            .query(&params)
            .send()
            .await
            .map_err(|err| {
                // The query string carries the API key.
                FetchError::unexpected(ticker, format!("request failed: {}", err.without_url()))
            })
    }

    /// Fetch the raw JSON payload, retrying exactly once on HTTP 503.
    pub async fn fetch_payload(&self, ticker: &str) -> Result<Value, FetchError> {
        let symbol = Self::provider_symbol(ticker);

        let mut res = self.send_once(ticker, &symbol).await?;
        if res.status() == StatusCode::SERVICE_UNAVAILABLE {
            tracing::warn!(
                ticker,
                retry_delay = ?self.retry_delay,
                "Alpha Vantage unavailable (503); retrying once"
            );
            tokio::time::sleep(self.retry_delay).await;
            res = self.send_once(ticker, &symbol).await?;
        }

        let status = res.status();
        let text = res
            .text()
            .await
            .map_err(|err| {
                FetchError::unexpected(
                    ticker,
                    format!("failed to read response: {}", err.without_url()),
                )
            })?;

        if status != StatusCode::OK {
            return Err(FetchError::HttpStatus {
                ticker: ticker.to_string(),
                status: status.as_u16(),
                body: text,
            });
        }

        serde_json::from_str::<Value>(&text).map_err(|err| {
            FetchError::unexpected(ticker, format!("response is not valid JSON: {err}: {text}"))
        })
    }
}

#[async_trait::async_trait]
impl QuoteSource for AlphaVantageClient {
    fn provider_name(&self) -> &'static str {
        "alpha_vantage"
    }

    async fn fetch_daily_series(&self, ticker: &str) -> Result<Vec<DailyBar>, FetchError> {
        let payload = self.fetch_payload(ticker).await?;
        parse_daily_series(ticker, &payload)
    }
}
