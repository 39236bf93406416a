//! Validation issues and the outcome they roll up into.
//!
//! Every checker in this crate accumulates issues into an [`IssueLog`] and
//! never returns early on the first defect. A single malformed response usually
//! has several independent problems, and all of them should reach the model in
//! one repair round.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// How much an issue matters. Only [`Severity::Error`] blocks success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// One finding against a generated payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Dotted path of the offending field (`"columns_to_keep.0.reason"`).
    pub field: String,
    pub message: String,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl ValidationIssue {
    pub fn error(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(field, message, Severity::Error)
    }

    pub fn warning(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(field, message, Severity::Warning)
    }

    pub fn info(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(field, message, Severity::Info)
    }

    fn new(field: impl Into<String>, message: impl Into<String>, severity: Severity) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            severity,
            suggestion: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn is_blocking(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// Verdict for one validated payload.
///
/// `is_valid` always equals `errors.is_empty()`; build it through
/// [`IssueLog::finish`] or [`ValidationOutcome::from_issues`] to keep it so.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub is_valid: bool,
    pub errors: Vec<ValidationIssue>,
    /// Non-blocking findings (`warning` and `info`).
    pub warnings: Vec<ValidationIssue>,
    #[serde(default)]
    pub stats: Map<String, Value>,
}

impl ValidationOutcome {
    pub fn from_issues(issues: Vec<ValidationIssue>, stats: Map<String, Value>) -> Self {
        let (errors, warnings): (Vec<_>, Vec<_>) =
            issues.into_iter().partition(ValidationIssue::is_blocking);
        Self {
            is_valid: errors.is_empty(),
            errors,
            warnings,
            stats,
        }
    }

    /// Outcome holding a single blocking issue.
    pub fn single_error(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::from_issues(vec![ValidationIssue::error(field, message)], Map::new())
    }

    /// Append an issue to the matching list, keeping `is_valid` consistent.
    pub fn push(&mut self, issue: ValidationIssue) {
        if issue.is_blocking() {
            self.errors.push(issue);
        } else {
            self.warnings.push(issue);
        }
        self.is_valid = self.errors.is_empty();
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    pub fn stat(&self, key: &str) -> Option<&Value> {
        self.stats.get(key)
    }
}

/// Accumulator for issues and stats produced by one validation pass.
#[derive(Debug, Default)]
pub struct IssueLog {
    issues: Vec<ValidationIssue>,
    stats: Map<String, Value>,
}

impl IssueLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, issue: ValidationIssue) {
        self.issues.push(issue);
    }

    pub fn extend(&mut self, issues: impl IntoIterator<Item = ValidationIssue>) {
        self.issues.extend(issues);
    }

    pub fn stat(&mut self, key: &str, value: impl Into<Value>) {
        self.stats.insert(key.to_string(), value.into());
    }

    pub fn has_errors(&self) -> bool {
        self.issues.iter().any(ValidationIssue::is_blocking)
    }

    pub fn finish(self) -> ValidationOutcome {
        ValidationOutcome::from_issues(self.issues, self.stats)
    }
}
