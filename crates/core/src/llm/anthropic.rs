use crate::config::Settings;
use crate::llm::error::LlmDiagnosticsError;
use crate::llm::{Completion, CompletionRequest, LlmClient, Provider};
use crate::search::{render_hits, WebSearch};
use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MODEL: &str = "claude-3-5-sonnet-latest";
const DEFAULT_MAX_TOKENS: u32 = 4096;
const DEFAULT_TIMEOUT_SECS: u64 = 120;
const DEFAULT_TEMPERATURE: f32 = 0.3;

const TOOL_NAME_WEB_SEARCH: &str = "web_search";
/// After this many search rounds the model must answer without tools.
const MAX_SEARCH_ROUNDS: usize = 3;

#[derive(Clone)]
pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    search: Option<Arc<dyn WebSearch>>,
}

impl AnthropicClient {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> anyhow::Result<Self> {
        Self::with_timeout(api_key, base_url, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    fn with_timeout(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build reqwest client")?;

        Ok(Self {
            http,
            api_key: api_key.into(),
            base_url: base_url.into(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            search: None,
        })
    }

    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let api_key = settings.require_anthropic_api_key()?.to_string();
        let base_url =
            std::env::var("ANTHROPIC_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let model = std::env::var("ANTHROPIC_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let max_tokens = std::env::var("ANTHROPIC_MAX_TOKENS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_MAX_TOKENS);

        let timeout_secs = std::env::var("ANTHROPIC_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        Ok(Self::with_timeout(api_key, base_url, Duration::from_secs(timeout_secs))?
            .with_model(model)
            .with_max_tokens(max_tokens))
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Offer the model a `web_search` tool backed by `search`.
    pub fn with_search(mut self, search: Arc<dyn WebSearch>) -> Self {
        self.search = Some(search);
        self
    }

    fn tools() -> Vec<Tool> {
        vec![Tool {
            name: TOOL_NAME_WEB_SEARCH,
            description: "Pesquisa na internet noticias e dados recentes sobre economia e \
                          mercado de acoes brasileiro. Retorna titulo, link e resumo.",
            input_schema: json!({
                "type": "object",
                "additionalProperties": false,
                "required": ["query"],
                "properties": {
                    "query": {"type": "string", "description": "Termos de busca"}
                }
            }),
        }]
    }

    /// One `tool_result` block per `tool_use` block in `res`.
    async fn run_tool_calls(search: &dyn WebSearch, res: &CreateMessageResponse) -> Vec<Value> {
        let mut results = Vec::new();
        for block in &res.content {
            let ContentBlock::ToolUse { id, name, input } = block else {
                continue;
            };

            let query = input.get("query").and_then(Value::as_str);
            let outcome = match (name.as_str(), query) {
                (TOOL_NAME_WEB_SEARCH, Some(query)) => {
                    tracing::info!(query, "model requested web search");
                    search
                        .search(query)
                        .await
                        .map(|hits| render_hits(query, &hits))
                        .map_err(|err| format!("{err:#}"))
                }
                (TOOL_NAME_WEB_SEARCH, None) => Err("missing 'query' string".to_string()),
                (other, _) => Err(format!("unknown tool '{other}'")),
            };

            results.push(match outcome {
                Ok(text) => json!({"type": "tool_result", "tool_use_id": id, "content": text}),
                Err(err) => {
                    tracing::warn!(tool = %name, error = %err, "tool call failed");
                    json!({
                        "type": "tool_result",
                        "tool_use_id": id,
                        "content": err,
                        "is_error": true
                    })
                }
            });
        }
        results
    }

    async fn create_message(
        &self,
        req: CreateMessageRequest,
    ) -> anyhow::Result<(Value, CreateMessageResponse)> {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_str(&self.api_key)?);
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );

        let url = format!("{}/v1/messages", self.base_url.trim_end_matches('/'));
        let res = self
            .http
            .post(url)
            .headers(headers)
            .json(&req)
            .send()
            .await
            .context("Anthropic request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read Anthropic response body")?;
        if !status.is_success() {
            let raw_response_json = serde_json::from_str::<Value>(&text).ok();
            return Err(LlmDiagnosticsError {
                provider: Provider::Anthropic,
                stage: "http",
                detail: format!("status={status}"),
                raw_output: Some(text),
                raw_response_json,
            }
            .into());
        }

        let raw_json = serde_json::from_str::<Value>(&text)
            .with_context(|| format!("failed to parse Anthropic response JSON: {text}"))?;
        let parsed = serde_json::from_value::<CreateMessageResponse>(raw_json.clone())
            .context("failed to decode Anthropic response into CreateMessageResponse")?;
        Ok((raw_json, parsed))
    }

    fn response_text(res: &CreateMessageResponse) -> String {
        let mut out = String::new();
        for block in &res.content {
            if let ContentBlock::Text { text } = block {
                if !out.is_empty() {
                    out.push('\n');
                }
                out.push_str(text);
            }
        }
        out
    }
}

#[async_trait::async_trait]
impl LlmClient for AnthropicClient {
    fn provider(&self) -> Provider {
        Provider::Anthropic
    }

    async fn complete(&self, req: CompletionRequest) -> anyhow::Result<Completion> {
        let mut messages = vec![Message {
            role: "user",
            content: Value::String(req.prompt.clone()),
        }];
        let mut max_tokens = self.max_tokens;
        let mut bumped = false;
        let mut search_rounds = 0;

        let (raw_json, res) = loop {
            let tool_choice = match self.search {
                None => None,
                Some(_) if search_rounds >= MAX_SEARCH_ROUNDS => Some(ToolChoice::None),
                Some(_) => Some(ToolChoice::Auto),
            };
            let body = CreateMessageRequest {
                model: self.model.clone(),
                max_tokens,
                temperature: self.temperature,
                system: Some(req.system.clone()),
                messages: messages.clone(),
                tools: self.search.as_ref().map(|_| Self::tools()),
                tool_choice,
            };
            let (raw_json, res) = self.create_message(body).await?;

            let stop_reason = res.stop_reason.clone();
            match (stop_reason.as_deref(), &self.search) {
                // If the model hit max_tokens, retry once with a higher ceiling.
                (Some("max_tokens"), _) if !bumped => {
                    let to = max_tokens.saturating_mul(2).max(4096);
                    tracing::warn!(
                        from = max_tokens,
                        to,
                        "Anthropic stop_reason=max_tokens; retrying once with higher max_tokens"
                    );
                    max_tokens = to;
                    bumped = true;
                }
                (Some("tool_use"), Some(search)) if search_rounds < MAX_SEARCH_ROUNDS => {
                    let results = Self::run_tool_calls(search.as_ref(), &res).await;
                    messages.push(Message {
                        role: "assistant",
                        content: raw_json.get("content").cloned().unwrap_or_else(|| json!([])),
                    });
                    messages.push(Message {
                        role: "user",
                        content: Value::Array(results),
                    });
                    search_rounds += 1;
                }
                _ => break (raw_json, res),
            }
        };

        let text = Self::response_text(&res);
        if text.trim().is_empty() {
            return Err(LlmDiagnosticsError {
                provider: Provider::Anthropic,
                stage: "empty_output",
                detail: "response contained no text blocks".to_string(),
                raw_output: None,
                raw_response_json: Some(raw_json),
            }
            .into());
        }

        Ok(Completion {
            text,
            stop_reason: res.stop_reason,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
struct CreateMessageRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<Message>,

    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Tool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<ToolChoice>,
}

/// `content` is a plain string or a list of content blocks.
#[derive(Debug, Clone, Serialize)]
struct Message {
    role: &'static str,
    content: Value,
}

#[derive(Debug, Clone, Serialize)]
struct Tool {
    name: &'static str,
    description: &'static str,
    input_schema: Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
enum ToolChoice {
    #[serde(rename = "auto")]
    Auto,
    #[serde(rename = "none")]
    None,
}

#[derive(Debug, Clone, Deserialize)]
struct CreateMessageResponse {
    content: Vec<ContentBlock>,

    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },

    #[serde(rename = "tool_use")]
    ToolUse {
        #[serde(default)]
        id: String,
        #[serde(default)]
        name: String,
        #[serde(default)]
        input: Value,
    },

    #[serde(other)]
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn request() -> CompletionRequest {
        CompletionRequest {
            system: "Voce e um analista.".to_string(),
            prompt: "Analise o cenario.".to_string(),
        }
    }

    #[test]
    fn joins_text_blocks_and_skips_others() {
        let res: CreateMessageResponse = serde_json::from_value(json!({
            "content": [
                {"type": "thinking", "thinking": "..."},
                {"type": "text", "text": "# Parte 1"},
                {"type": "text", "text": "Parte 2"}
            ],
            "stop_reason": "end_turn"
        }))
        .unwrap();

        assert_eq!(AnthropicClient::response_text(&res), "# Parte 1\nParte 2");
    }

    #[tokio::test]
    async fn sends_system_prompt_and_returns_text() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/messages")
            .match_header("x-api-key", "test-key")
            .match_header("anthropic-version", ANTHROPIC_VERSION)
            .match_body(Matcher::PartialJson(json!({
                "system": "Voce e um analista.",
                "temperature": 0.3,
                "messages": [{"role": "user", "content": "Analise o cenario."}]
            })))
            .with_status(200)
            .with_body(
                json!({
                    "content": [{"type": "text", "text": "Cenario estavel."}],
                    "stop_reason": "end_turn"
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = AnthropicClient::new("test-key", server.url()).unwrap();
        let out = client.complete(request()).await.unwrap();

        mock.assert_async().await;
        assert_eq!(out.text, "Cenario estavel.");
        assert_eq!(out.stop_reason.as_deref(), Some("end_turn"));
    }

    #[tokio::test]
    async fn retries_once_with_higher_ceiling_on_max_tokens() {
        let mut server = mockito::Server::new_async().await;
        let truncated = server
            .mock("POST", "/v1/messages")
            .match_body(Matcher::PartialJson(json!({"max_tokens": 1024})))
            .with_status(200)
            .with_body(
                json!({
                    "content": [{"type": "text", "text": "# Relat"}],
                    "stop_reason": "max_tokens"
                })
                .to_string(),
            )
            .expect(1)
            .create_async()
            .await;
        let full = server
            .mock("POST", "/v1/messages")
            .match_body(Matcher::PartialJson(json!({"max_tokens": 4096})))
            .with_status(200)
            .with_body(
                json!({
                    "content": [{"type": "text", "text": "# Relatorio completo"}],
                    "stop_reason": "end_turn"
                })
                .to_string(),
            )
            .expect(1)
            .create_async()
            .await;

        let client = AnthropicClient::new("k", server.url())
            .unwrap()
            .with_max_tokens(1024);
        let out = client.complete(request()).await.unwrap();

        truncated.assert_async().await;
        full.assert_async().await;
        assert_eq!(out.text, "# Relatorio completo");
    }

    #[tokio::test]
    async fn http_error_carries_diagnostics() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/messages")
            .with_status(529)
            .with_body(json!({"type": "error", "error": {"type": "overloaded_error"}}).to_string())
            .create_async()
            .await;

        let client = AnthropicClient::new("k", server.url()).unwrap();
        let err = client.complete(request()).await.unwrap_err();

        let diag = err.downcast_ref::<LlmDiagnosticsError>().unwrap();
        assert_eq!(diag.stage, "http");
        assert!(diag.raw_response_json.is_some());
    }

    #[tokio::test]
    async fn empty_text_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/messages")
            .with_status(200)
            .with_body(json!({"content": [], "stop_reason": "end_turn"}).to_string())
            .create_async()
            .await;

        let client = AnthropicClient::new("k", server.url()).unwrap();
        let err = client.complete(request()).await.unwrap_err();
        let diag = err.downcast_ref::<LlmDiagnosticsError>().unwrap();
        assert_eq!(diag.stage, "empty_output");
    }

    #[derive(Default)]
    struct FakeSearch {
        queries: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl WebSearch for FakeSearch {
        async fn search(&self, query: &str) -> anyhow::Result<Vec<crate::search::SearchHit>> {
            self.queries.lock().unwrap().push(query.to_string());
            Ok(vec![crate::search::SearchHit {
                title: "Copom mantem Selic".to_string(),
                link: "https://ex.com/selic".to_string(),
                snippet: "Taxa segue em 10,75%.".to_string(),
            }])
        }
    }

    fn tool_use_body(id: &str) -> String {
        json!({
            "content": [
                {"type": "text", "text": "Vou pesquisar."},
                {"type": "tool_use", "id": id, "name": "web_search", "input": {"query": "selic copom"}}
            ],
            "stop_reason": "tool_use"
        })
        .to_string()
    }

    #[tokio::test]
    async fn runs_web_search_and_feeds_results_back() {
        let mut server = mockito::Server::new_async().await;
        let asks = server
            .mock("POST", "/v1/messages")
            .match_body(Matcher::PartialJson(json!({"tool_choice": {"type": "auto"}})))
            .with_status(200)
            .with_body(tool_use_body("toolu_1"))
            .expect(1)
            .create_async()
            .await;
        let answers = server
            .mock("POST", "/v1/messages")
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex("tool_result".to_string()),
                Matcher::Regex("toolu_1".to_string()),
                Matcher::Regex("Copom mantem Selic".to_string()),
            ]))
            .with_status(200)
            .with_body(
                json!({
                    "content": [{"type": "text", "text": "Selic estavel em 10,75%."}],
                    "stop_reason": "end_turn"
                })
                .to_string(),
            )
            .expect(1)
            .create_async()
            .await;

        let search = Arc::new(FakeSearch::default());
        let client = AnthropicClient::new("k", server.url())
            .unwrap()
            .with_search(search.clone());
        let out = client.complete(request()).await.unwrap();

        asks.assert_async().await;
        answers.assert_async().await;
        assert_eq!(out.text, "Selic estavel em 10,75%.");
        assert_eq!(*search.queries.lock().unwrap(), vec!["selic copom"]);
    }

    #[tokio::test]
    async fn stops_offering_search_after_round_limit() {
        let mut server = mockito::Server::new_async().await;
        let searching = server
            .mock("POST", "/v1/messages")
            .match_body(Matcher::PartialJson(json!({"tool_choice": {"type": "auto"}})))
            .with_status(200)
            .with_body(tool_use_body("toolu_n"))
            .expect(MAX_SEARCH_ROUNDS)
            .create_async()
            .await;
        let forced = server
            .mock("POST", "/v1/messages")
            .match_body(Matcher::PartialJson(json!({"tool_choice": {"type": "none"}})))
            .with_status(200)
            .with_body(
                json!({
                    "content": [{"type": "text", "text": "Resposta final."}],
                    "stop_reason": "end_turn"
                })
                .to_string(),
            )
            .expect(1)
            .create_async()
            .await;

        let search = Arc::new(FakeSearch::default());
        let client = AnthropicClient::new("k", server.url())
            .unwrap()
            .with_search(search.clone());
        let out = client.complete(request()).await.unwrap();

        searching.assert_async().await;
        forced.assert_async().await;
        assert_eq!(out.text, "Resposta final.");
        assert_eq!(search.queries.lock().unwrap().len(), MAX_SEARCH_ROUNDS);
    }
}

