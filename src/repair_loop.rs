//! Generate, validate, and repair until the payload passes or the budget runs out.
//!
//! ```text
//! Init ──► Validating ──► Succeeded
//!   │        │    ▲
//!   │        ▼    │
//!   │      Repairing
//!   │        │
//!   └────────┴──────────► Failed
//! ```
//!
//! Transport failures are terminal and never repaired. Every generation call,
//! repairs included, counts against [`RepairConfig::max_attempts`], and every
//! call leaves exactly one [`RepairAttempt`] in the history.

use crate::config::RepairConfig;
use crate::events::{emit, Event, EventHandler};
use crate::extract::extract;
use crate::issue::{ValidationIssue, ValidationOutcome};
use crate::model::Reasoned;
use crate::prompt::issue_messages;
use crate::provider::{Provider, Usage};
use crate::rules::{Stage, StageValidator};
use crate::schema::ROOT_FIELD;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Field used for issues raised by a failed generation call.
pub const TRANSPORT_FIELD: &str = "llm";

/// Characters of each response kept in the history.
pub const PREVIEW_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    Init,
    Validating,
    Repairing,
    Succeeded,
    Failed,
}

impl LoopState {
    pub fn is_terminal(self) -> bool {
        matches!(self, LoopState::Succeeded | LoopState::Failed)
    }
}

/// One generation call in the loop history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairAttempt {
    /// 1-indexed call number.
    pub attempt: u32,
    /// First [`PREVIEW_CHARS`] characters of the response; empty on failure.
    pub response_preview: String,
    pub is_valid: bool,
    pub error_count: usize,
    /// Transport failure text, when the call itself failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RepairAttempt {
    fn validated(attempt: u32, response: &str, outcome: &ValidationOutcome) -> Self {
        Self {
            attempt,
            response_preview: response.chars().take(PREVIEW_CHARS).collect(),
            is_valid: outcome.is_valid,
            error_count: outcome.error_count(),
            error: None,
        }
    }

    fn failed(attempt: u32, error: String) -> Self {
        Self {
            attempt,
            response_preview: String::new(),
            is_valid: false,
            error_count: 0,
            error: Some(error),
        }
    }
}

/// Final state of a loop run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopResult<T> {
    pub success: bool,
    /// Present only when `success` is true.
    pub result: Option<T>,
    /// Outcome of the last validation, plus any transport issue.
    pub validation: ValidationOutcome,
    /// Generation calls made; always equals `repair_history.len()`.
    pub attempts: u32,
    pub repair_history: Vec<RepairAttempt>,
    /// Tokens spent across all calls.
    #[serde(default)]
    pub usage: Usage,
}

/// Drives a [`Provider`] and a [`StageValidator`] through repair rounds.
///
/// # Example
///
/// ```
/// use crm_triage::provider::MockProvider;
/// use crm_triage::repair_loop::RepairLoop;
/// use crm_triage::rules::TriageRules;
/// use std::sync::Arc;
///
/// let reply = r#"{
///     "columns_to_keep": [{"column_name": "email", "target_object": "people",
///         "suggested_field_label": "People - Email", "reason": "contact"}],
///     "recommended_objects": ["people"]
/// }"#;
/// let provider = Arc::new(MockProvider::fixed(reply));
/// let rules = TriageRules::new(vec!["email".into()]).unwrap();
///
/// let outcome = tokio_test::block_on(
///     RepairLoop::new(provider).run("system", "classify", &rules),
/// );
/// assert!(outcome.success);
/// assert_eq!(outcome.attempts, 1);
/// ```
#[derive(Clone)]
pub struct RepairLoop {
    provider: Arc<dyn Provider>,
    config: RepairConfig,
    events: Option<Arc<dyn EventHandler>>,
}

impl std::fmt::Debug for RepairLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepairLoop")
            .field("provider", &self.provider.name())
            .field("config", &self.config)
            .field("events", &self.events.is_some())
            .finish()
    }
}

impl RepairLoop {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self {
            provider,
            config: RepairConfig::default(),
            events: None,
        }
    }

    pub fn with_config(mut self, config: RepairConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.events = Some(handler);
        self
    }

    pub fn config(&self) -> RepairConfig {
        self.config
    }

    /// Run one loop for `validator`'s stage.
    pub async fn run<V: StageValidator>(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        validator: &V,
    ) -> LoopResult<V::Output> {
        let stage = validator.stage();
        let max_attempts = self.config.max_attempts;
        info!(stage = %stage, provider = self.provider.name(), max_attempts, "repair loop started");
        emit(&self.events, Event::LoopStart { stage, max_attempts });

        let mut state = LoopState::Init;
        let mut attempts = 0u32;
        let mut history = Vec::new();
        let mut usage = Usage::default();
        let mut response = String::new();
        let mut validation =
            ValidationOutcome::single_error(TRANSPORT_FIELD, "no generation call made");
        let mut result = None;

        while !state.is_terminal() {
            state = match state {
                LoopState::Init => {
                    attempts = 1;
                    let reply = self.provider.complete(system_prompt, user_prompt).await;
                    usage += reply.usage;
                    if reply.success {
                        response = reply.content;
                        LoopState::Validating
                    } else {
                        let error = reply.error_text();
                        self.transport_failed(stage, attempts, &error);
                        validation = ValidationOutcome::single_error(
                            TRANSPORT_FIELD,
                            format!("generation call failed: {error}"),
                        );
                        history.push(RepairAttempt::failed(attempts, error));
                        LoopState::Failed
                    }
                }

                LoopState::Validating => {
                    let (typed, outcome) = check_response(validator, &response);
                    history.push(RepairAttempt::validated(attempts, &response, &outcome));
                    info!(
                        stage = %stage,
                        attempt = attempts,
                        errors = outcome.errors.len(),
                        warnings = outcome.warnings.len(),
                        "response validated"
                    );
                    emit(
                        &self.events,
                        Event::AttemptValidated {
                            stage,
                            attempt: attempts,
                            is_valid: outcome.is_valid,
                            error_count: outcome.errors.len(),
                            warning_count: outcome.warnings.len(),
                        },
                    );
                    validation = outcome;

                    match typed {
                        Some(typed) if validation.is_valid => {
                            result = Some(typed);
                            LoopState::Succeeded
                        }
                        _ if attempts >= max_attempts => {
                            warn!(stage = %stage, attempts, "repair budget exhausted");
                            LoopState::Failed
                        }
                        _ => LoopState::Repairing,
                    }
                }

                LoopState::Repairing => {
                    attempts += 1;
                    let issues = issue_messages(&validation.errors);
                    debug!(
                        stage = %stage,
                        attempt = attempts,
                        issues = issues.len(),
                        "requesting repair"
                    );
                    emit(
                        &self.events,
                        Event::RepairStart {
                            stage,
                            attempt: attempts,
                            issues: issues.clone(),
                        },
                    );

                    let reply = self
                        .provider
                        .complete_with_repair(system_prompt, user_prompt, &issues, &response)
                        .await;
                    usage += reply.usage;
                    if reply.success {
                        response = reply.content;
                        LoopState::Validating
                    } else {
                        let error = reply.error_text();
                        self.transport_failed(stage, attempts, &error);
                        validation.push(ValidationIssue::error(
                            TRANSPORT_FIELD,
                            format!("repair call failed: {error}"),
                        ));
                        history.push(RepairAttempt::failed(attempts, error));
                        LoopState::Failed
                    }
                }

                LoopState::Succeeded | LoopState::Failed => state,
            };
        }

        let success = state == LoopState::Succeeded;
        info!(stage = %stage, success, attempts, "repair loop finished");
        emit(
            &self.events,
            Event::LoopEnd {
                stage,
                success,
                attempts,
            },
        );

        LoopResult {
            success,
            result,
            validation,
            attempts,
            repair_history: history,
            usage,
        }
    }

    fn transport_failed(&self, stage: Stage, attempt: u32, error: &str) {
        warn!(stage = %stage, attempt, error, "generation call failed");
        emit(
            &self.events,
            Event::TransportFailure {
                stage,
                attempt,
                error: error.to_string(),
            },
        );
    }
}

/// Extract and validate one raw response.
///
/// A reasoning trace found outside the payload is attached to the typed
/// result when the payload did not carry one itself.
fn check_response<V: StageValidator>(
    validator: &V,
    response: &str,
) -> (Option<V::Output>, ValidationOutcome) {
    let extracted = extract(response);
    let Some(payload) = extracted.payload else {
        return (
            None,
            ValidationOutcome::single_error(
                ROOT_FIELD,
                "parse failure: no JSON object could be extracted from the response",
            ),
        );
    };

    let (mut typed, outcome) = validator.validate(&payload);
    if let (Some(result), Some(thinking)) = (typed.as_mut(), extracted.thinking) {
        if result.thinking().is_none() {
            result.set_thinking(thinking);
        }
    }
    (typed, outcome)
}
