//! Mock provider for testing without a live model.
//!
//! [`MockProvider`] returns pre-configured replies in order and records what it
//! was asked, so tests can assert on call counts and on the repair prompts
//! the loop produced.
//!
//! # Example
//!
//! ```
//! use crm_triage::provider::{MockProvider, Provider};
//!
//! let mock = MockProvider::fixed(r#"{"mappings": []}"#);
//! let reply = tokio_test::block_on(mock.complete("system", "user"));
//! assert!(reply.success);
//! assert_eq!(mock.calls(), 1);
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{Provider, RawGenerationResponse};
use crate::prompt::{append_repair, render_repair};

/// One canned reply.
#[derive(Debug, Clone, PartialEq)]
pub enum MockReply {
    /// A successful call returning this text.
    Content(String),
    /// A failed call with this error.
    Failure(String),
}

/// A test provider that returns canned replies in order.
///
/// Cycles back to the beginning when all replies have been consumed.
#[derive(Debug)]
pub struct MockProvider {
    replies: Vec<MockReply>,
    index: AtomicUsize,
    user_prompts: Mutex<Vec<String>>,
    repair_issues: Mutex<Vec<Vec<String>>>,
}

impl MockProvider {
    /// Create a mock provider with the given canned replies.
    pub fn new(replies: Vec<MockReply>) -> Self {
        assert!(!replies.is_empty(), "MockProvider requires at least one reply");
        Self {
            replies,
            index: AtomicUsize::new(0),
            user_prompts: Mutex::new(Vec::new()),
            repair_issues: Mutex::new(Vec::new()),
        }
    }

    /// Successful replies with the given texts, in order.
    pub fn with_contents<I, S>(contents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            contents
                .into_iter()
                .map(|c| MockReply::Content(c.into()))
                .collect(),
        )
    }

    /// Create a mock that always returns the same text.
    pub fn fixed(content: impl Into<String>) -> Self {
        Self::new(vec![MockReply::Content(content.into())])
    }

    /// Create a mock whose every call fails.
    pub fn failing(error: impl Into<String>) -> Self {
        Self::new(vec![MockReply::Failure(error.into())])
    }

    /// Number of generation calls made so far, repairs included.
    pub fn calls(&self) -> usize {
        self.index.load(Ordering::SeqCst)
    }

    /// User prompts received, in call order. Repair calls show the appended
    /// repair section.
    pub fn user_prompts(&self) -> Vec<String> {
        self.user_prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Issue lines passed to each repair call.
    pub fn repair_calls(&self) -> Vec<Vec<String>> {
        self.repair_issues
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn next_reply(&self) -> MockReply {
        let idx = self.index.fetch_add(1, Ordering::SeqCst) % self.replies.len();
        self.replies[idx].clone()
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn complete(&self, _system_prompt: &str, user_prompt: &str) -> RawGenerationResponse {
        self.user_prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(user_prompt.to_string());

        match self.next_reply() {
            MockReply::Content(text) => RawGenerationResponse::ok(text).with_model("mock"),
            MockReply::Failure(error) => RawGenerationResponse::failed(error),
        }
    }

    async fn complete_with_repair(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        issue_messages: &[String],
        original_response: &str,
    ) -> RawGenerationResponse {
        self.repair_issues
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(issue_messages.to_vec());

        let repair = render_repair(original_response, issue_messages);
        self.complete(system_prompt, &append_repair(user_prompt, &repair))
            .await
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
