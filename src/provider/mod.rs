//! Generation provider trait and response types.
//!
//! The [`Provider`] trait is the only seam between the repair loop and a
//! language model. Providers never return `Err`: a failed call is reported as a
//! [`RawGenerationResponse`] with `success == false`, and the loop turns it into
//! a terminal transport failure.
//!
//! ```text
//! RepairLoop ──► Provider::complete() ──────────────► RawGenerationResponse
//!           └──► Provider::complete_with_repair() ──┘
//!                         │
//!            ┌────────────┴────────────┐
//!       MockProvider            OpenAiProvider
//!       canned replies          /v1/chat/completions + backoff
//! ```

pub mod backoff;
pub mod mock;
#[cfg(feature = "openai")]
pub mod openai;

pub use backoff::{BackoffConfig, JitterStrategy};
pub use mock::{MockProvider, MockReply};
#[cfg(feature = "openai")]
pub use openai::OpenAiProvider;

use crate::error::Result;
use crate::prompt::{append_repair, render_repair};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Token accounting reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl std::ops::AddAssign for Usage {
    fn add_assign(&mut self, other: Usage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// Outcome of one generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawGenerationResponse {
    pub success: bool,
    /// Raw model text. Empty when `success` is false.
    pub content: String,
    #[serde(default)]
    pub usage: Usage,
    #[serde(default)]
    pub model: Option<String>,
    /// Failure description when `success` is false.
    #[serde(default)]
    pub error: Option<String>,
}

impl RawGenerationResponse {
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            success: true,
            content: content.into(),
            usage: Usage::default(),
            model: None,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            content: String::new(),
            usage: Usage::default(),
            model: None,
            error: Some(error.into()),
        }
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = usage;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Failure text, or a generic message when the provider gave none.
    pub fn error_text(&self) -> String {
        self.error
            .clone()
            .unwrap_or_else(|| "generation failed without an error message".to_string())
    }
}

/// Abstraction over generation services.
///
/// # Object Safety
///
/// This trait is object-safe and designed to be used as `Arc<dyn Provider>`.
#[async_trait]
pub trait Provider: Send + Sync {
    /// One generation call with a system and a user prompt.
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> RawGenerationResponse;

    /// Ask the model to fix its previous response.
    ///
    /// The default appends the rendered repair section to the original user
    /// prompt, separated by `---`, and calls [`Provider::complete`].
    async fn complete_with_repair(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        issue_messages: &[String],
        original_response: &str,
    ) -> RawGenerationResponse {
        let repair = render_repair(original_response, issue_messages);
        self.complete(system_prompt, &append_repair(user_prompt, &repair))
            .await
    }

    /// Human-readable name for logging and diagnostics.
    fn name(&self) -> &'static str;
}

/// Type alias for the callback invoked before each transport retry.
///
/// Arguments: `(attempt_number, delay_before_retry, reason_for_retry)`.
pub type RetryCallback<'a> = Option<&'a mut (dyn FnMut(u32, Duration, &str) + Send)>;

/// Run `op` with transport-level retry and exponential backoff.
///
/// Returns the first success, or the first non-retryable error, or the last
/// error once `config.max_retries` retries are spent.
pub async fn with_backoff<T, F, Fut>(
    config: &BackoffConfig,
    mut op: F,
    mut on_retry: RetryCallback<'_>,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < config.max_retries && config.is_retryable(&e) => {
                let delay = config.retry_delay(attempt, &e);
                attempt += 1;
                if let Some(ref mut cb) = on_retry {
                    cb(attempt, delay, &e.to_string());
                }
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RepairError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast(max_retries: u32) -> BackoffConfig {
        BackoffConfig {
            max_retries,
            initial_delay: Duration::ZERO,
            jitter: JitterStrategy::None,
            ..BackoffConfig::standard()
        }
    }

    fn unavailable() -> RepairError {
        RepairError::HttpError {
            status: 503,
            body: "busy".into(),
            retry_after: None,
        }
    }

    #[tokio::test]
    async fn retries_transient_errors_until_success() {
        let calls = AtomicUsize::new(0);
        let mut retries = Vec::new();
        let mut on_retry = |attempt: u32, _delay: Duration, reason: &str| {
            retries.push((attempt, reason.to_string()));
        };

        let result = with_backoff(
            &fast(3),
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(unavailable())
                    } else {
                        Ok(n)
                    }
                }
            },
            Some(&mut on_retry),
        )
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(retries.len(), 2);
        assert_eq!(retries[0], (1, "HTTP 503: busy".to_string()));
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let calls = AtomicUsize::new(0);
        let result: Result<()> = with_backoff(
            &fast(2),
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(unavailable()) }
            },
            None,
        )
        .await;

        assert!(matches!(result, Err(RepairError::HttpError { status: 503, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_error_returns_immediately() {
        let calls = AtomicUsize::new(0);
        let result: Result<()> = with_backoff(
            &fast(3),
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(RepairError::HttpError {
                        status: 401,
                        body: "bad key".into(),
                        retry_after: None,
                    })
                }
            },
            None,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_response_reports_error_text() {
        let failed = RawGenerationResponse::failed("timeout");
        assert!(!failed.success);
        assert_eq!(failed.error_text(), "timeout");

        let odd = RawGenerationResponse {
            success: false,
            error: None,
            ..RawGenerationResponse::ok("")
        };
        assert!(odd.error_text().contains("without an error message"));
    }
}
