use crate::config::Settings;
use crate::search::{SearchHit, WebSearch};
use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://google.serper.dev";
const DEFAULT_NUM_RESULTS: u32 = 10;
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Google results through serper.dev.
#[derive(Debug, Clone)]
pub struct SerperClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    num_results: u32,
}

impl SerperClient {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .context("failed to build Serper http client")?;

        Ok(Self {
            http,
            api_key: api_key.into(),
            base_url: base_url.into(),
            num_results: DEFAULT_NUM_RESULTS,
        })
    }

    /// `None` when no key is configured; search is optional.
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Option<Self>> {
        let Some(api_key) = settings.serper_api_key.clone() else {
            return Ok(None);
        };
        let base_url =
            std::env::var("SERPER_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let num_results = std::env::var("SERPER_NUM_RESULTS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_NUM_RESULTS);

        Ok(Some(Self::new(api_key, base_url)?.with_num_results(num_results)))
    }

    pub fn with_num_results(mut self, num_results: u32) -> Self {
        self.num_results = num_results;
        self
    }
}

#[async_trait::async_trait]
impl WebSearch for SerperClient {
    async fn search(&self, query: &str) -> anyhow::Result<Vec<SearchHit>> {
        let mut headers = HeaderMap::new();
        headers.insert("X-API-KEY", HeaderValue::from_str(&self.api_key)?);

        let url = format!("{}/search", self.base_url.trim_end_matches('/'));
        let res = self
            .http
            .post(url)
            .headers(headers)
            .json(&SearchRequest {
                q: query,
                num: self.num_results,
            })
            .send()
            .await
            .context("Serper request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read Serper response body")?;
        anyhow::ensure!(status.is_success(), "Serper returned status={status}: {text}");

        let parsed: SearchResponse = serde_json::from_str(&text)
            .with_context(|| format!("failed to parse Serper response JSON: {text}"))?;

        tracing::debug!(query, hits = parsed.organic.len(), "web search done");
        Ok(parsed
            .organic
            .into_iter()
            .map(|r| SearchHit {
                title: r.title,
                link: r.link,
                snippet: r.snippet,
            })
            .collect())
    }
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    q: &'a str,
    num: u32,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    organic: Vec<OrganicResult>,
}

#[derive(Debug, Deserialize)]
struct OrganicResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    snippet: String,
}
