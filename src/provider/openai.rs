//! Provider for OpenAI-compatible chat completion APIs.
//!
//! Endpoint: `{base_url}/v1/chat/completions` with a system and a user message.

use super::{with_backoff, BackoffConfig, Provider, RawGenerationResponse, Usage};
use crate::config::GenerationConfig;
use crate::error::{RepairError, Result};
use crate::events::{emit, Event, EventHandler};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// Required by [`OpenAiProvider::from_env`].
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Optional base URL override read by [`OpenAiProvider::from_env`].
pub const BASE_URL_ENV: &str = "OPENAI_BASE_URL";

/// Provider for any OpenAI-compatible API.
///
/// Transient HTTP failures (429, 5xx, connection errors) are retried
/// according to the configured [`BackoffConfig`] before the call is reported
/// as failed.
///
/// # Example
///
/// ```
/// use crm_triage::config::GenerationConfig;
/// use crm_triage::provider::{BackoffConfig, OpenAiProvider};
///
/// let provider = OpenAiProvider::new("sk-...", GenerationConfig::default())
///     .unwrap()
///     .with_base_url("http://localhost:8000")
///     .with_backoff(BackoffConfig::interactive());
/// ```
#[derive(Clone)]
pub struct OpenAiProvider {
    client: Client,
    base_url: String,
    api_key: String,
    organization: Option<String>,
    config: GenerationConfig,
    backoff: BackoffConfig,
    events: Option<Arc<dyn EventHandler>>,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix: String = self.api_key.chars().take(6).collect();
        let redacted = if self.api_key.chars().count() > 6 {
            format!("{prefix}***")
        } else {
            "***".to_string()
        };
        f.debug_struct("OpenAiProvider")
            .field("base_url", &self.base_url)
            .field("api_key", &redacted)
            .field("organization", &self.organization)
            .field("config", &self.config)
            .field("backoff", &self.backoff)
            .finish()
    }
}

impl OpenAiProvider {
    /// Create a provider with the standard cloud backoff.
    pub fn new(api_key: impl Into<String>, config: GenerationConfig) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(RepairError::InvalidConfig("API key is empty".into()));
        }
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key,
            organization: None,
            config,
            backoff: BackoffConfig::standard(),
            events: None,
        })
    }

    /// Build from `OPENAI_API_KEY`, `OPENAI_MODEL` and `OPENAI_BASE_URL`.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var(API_KEY_ENV)
            .map_err(|_| RepairError::InvalidConfig(format!("{API_KEY_ENV} is not set")))?;
        let provider = Self::new(api_key, GenerationConfig::from_env())?;
        match std::env::var(BASE_URL_ENV) {
            Ok(url) if !url.trim().is_empty() => Ok(provider.with_base_url(url.trim())),
            _ => Ok(provider),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the organization ID header.
    pub fn with_organization(mut self, org: impl Into<String>) -> Self {
        self.organization = Some(org.into());
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    /// Receive [`Event::TransportRetry`] before each transport retry.
    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.events = Some(handler);
        self
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'))
    }

    /// Build the request body for `/v1/chat/completions`.
    fn build_body(&self, system_prompt: &str, user_prompt: &str) -> Value {
        let mut messages = Vec::with_capacity(2);
        if !system_prompt.is_empty() {
            messages.push(json!({"role": "system", "content": system_prompt}));
        }
        messages.push(json!({"role": "user", "content": user_prompt}));

        let mut body = json!({
            "model": self.config.model,
            "messages": messages,
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
        });

        if self.config.json_mode {
            body["response_format"] = json!({"type": "json_object"});
        }
        body
    }

    /// Parse a `Retry-After` header value as seconds.
    fn parse_retry_after(value: &str) -> Option<Duration> {
        value.trim().parse::<u64>().ok().map(Duration::from_secs)
    }

    fn build_http_request(&self, url: &str, body: &Value) -> reqwest::RequestBuilder {
        let mut req = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(body);
        if let Some(ref org) = self.organization {
            req = req.header("OpenAI-Organization", org.as_str());
        }
        req
    }

    async fn send(&self, url: &str, body: &Value) -> Result<Value> {
        let resp = self.build_http_request(url, body).send().await?;
        let status = resp.status();

        if !status.is_success() {
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(Self::parse_retry_after);
            let text = resp.text().await.unwrap_or_default();
            return Err(RepairError::HttpError {
                status: status.as_u16(),
                body: text,
                retry_after,
            });
        }

        Ok(resp.json().await?)
    }

    /// Pull content, usage and model out of a completion body.
    fn parse_completion(body: &Value) -> Result<RawGenerationResponse> {
        let choice = body
            .get("choices")
            .and_then(|c| c.get(0))
            .ok_or_else(|| RepairError::Other("completion response has no choices".into()))?;

        let content = choice
            .get("message")
            .and_then(|m| m.get("content"))
            .and_then(Value::as_str)
            .unwrap_or_default();

        let usage = match body.get("usage") {
            Some(u) if !u.is_null() => serde_json::from_value::<Usage>(u.clone())?,
            _ => Usage::default(),
        };

        let mut response = RawGenerationResponse::ok(content).with_usage(usage);
        if let Some(model) = body.get("model").and_then(Value::as_str) {
            response = response.with_model(model);
        }
        Ok(response)
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> RawGenerationResponse {
        let url = self.endpoint();
        let body = self.build_body(system_prompt, user_prompt);

        let events = &self.events;
        let mut on_retry = |attempt: u32, delay: Duration, reason: &str| {
            warn!(attempt, delay_ms = delay.as_millis() as u64, reason, "retrying generation call");
            emit(
                events,
                Event::TransportRetry {
                    provider: "openai",
                    attempt,
                    delay_ms: delay.as_millis() as u64,
                    reason: reason.to_string(),
                },
            );
        };

        let outcome = with_backoff(&self.backoff, || self.send(&url, &body), Some(&mut on_retry))
            .await
            .and_then(|json| Self::parse_completion(&json));

        match outcome {
            Ok(response) => {
                debug!(
                    model = response.model.as_deref().unwrap_or(self.config.model.as_str()),
                    total_tokens = response.usage.total_tokens,
                    "generation call completed"
                );
                response
            }
            Err(e) => {
                warn!(error = %e, "generation call failed");
                RawGenerationResponse::failed(e.to_string())
            }
        }
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> OpenAiProvider {
        OpenAiProvider::new("sk-test123456", GenerationConfig::default()).unwrap()
    }

    #[test]
    fn chat_payload_uses_generation_config() {
        let body = provider().build_body("You map columns.", "Columns: a, b");

        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["temperature"], 0.3);
        assert_eq!(body["max_tokens"], 4000);
        assert_eq!(body["response_format"]["type"], "json_object");

        let messages = body["messages"].as_array().expect("messages");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[1]["role"], "user");
        assert_eq!(messages[1]["content"], "Columns: a, b");
    }

    #[test]
    fn json_mode_off_omits_response_format() {
        let p = OpenAiProvider::new(
            "sk-test",
            GenerationConfig::default().with_json_mode(false),
        )
        .unwrap();
        let body = p.build_body("", "hi");
        assert!(body.get("response_format").is_none());
        assert_eq!(body["messages"].as_array().map(Vec::len), Some(1));
    }

    #[test]
    fn auth_and_org_headers() {
        let p = provider().with_organization("org-abc");
        let req = p
            .build_http_request(&p.endpoint(), &json!({}))
            .build()
            .expect("build request");
        assert_eq!(req.url().as_str(), "https://api.openai.com/v1/chat/completions");
        let auth = req.headers().get("Authorization").expect("auth header");
        assert_eq!(auth, "Bearer sk-test123456");
        let org = req.headers().get("OpenAI-Organization").expect("org header");
        assert_eq!(org, "org-abc");
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let p = provider().with_base_url("http://localhost:8000/");
        assert_eq!(p.endpoint(), "http://localhost:8000/v1/chat/completions");
    }

    #[test]
    fn completion_body_is_parsed() {
        let body = json!({
            "id": "chatcmpl-1",
            "model": "gpt-4o-mini-2024-07-18",
            "choices": [{"message": {"role": "assistant", "content": "{\"a\": 1}"}}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        });
        let r = OpenAiProvider::parse_completion(&body).unwrap();
        assert!(r.success);
        assert_eq!(r.content, "{\"a\": 1}");
        assert_eq!(r.usage.total_tokens, 15);
        assert_eq!(r.model.as_deref(), Some("gpt-4o-mini-2024-07-18"));
    }

    #[test]
    fn null_content_and_missing_usage_default() {
        let body = json!({"choices": [{"message": {"content": null}}]});
        let r = OpenAiProvider::parse_completion(&body).unwrap();
        assert_eq!(r.content, "");
        assert_eq!(r.usage, Usage::default());
    }

    #[test]
    fn missing_choices_is_an_error() {
        assert!(OpenAiProvider::parse_completion(&json!({"choices": []})).is_err());
    }

    #[test]
    fn retry_after_seconds() {
        assert_eq!(
            OpenAiProvider::parse_retry_after(" 12 "),
            Some(Duration::from_secs(12))
        );
        assert_eq!(OpenAiProvider::parse_retry_after("soon"), None);
    }

    #[test]
    fn empty_key_is_rejected() {
        let err = OpenAiProvider::new("  ", GenerationConfig::default()).unwrap_err();
        assert!(matches!(err, RepairError::InvalidConfig(_)));
    }

    #[test]
    fn debug_redacts_api_key() {
        let debug_output = format!("{:?}", provider());
        assert!(!debug_output.contains("test123456"));
        assert!(debug_output.contains("sk-tes***"));
    }

    #[tokio::test]
    async fn unreachable_host_reports_failure() {
        let p = provider()
            .with_base_url("http://127.0.0.1:9")
            .with_backoff(BackoffConfig::none());
        let r = p.complete("s", "u").await;
        assert!(!r.success);
        assert!(r.error.is_some());
    }
}
