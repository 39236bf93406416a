//! Stage validators: schema contract, typed decode, then business rules.
//!
//! Each stage binds its context (column list, selected objects, field
//! catalogue) at construction and exposes a single
//! [`StageValidator::validate`] call that the repair loop drives.

pub mod mapping;
pub mod triage;

pub use mapping::MappingRules;
pub use triage::TriageRules;

use crate::catalog::{format_field_label, has_label_format};
use crate::issue::{IssueLog, ValidationIssue, ValidationOutcome};
use crate::model::{ObjectType, Reasoned};
use crate::schema::{validate_schema, Contract, ROOT_FIELD};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;

/// Which generation step a payload belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Triage,
    Mapping,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Triage => "triage",
            Stage::Mapping => "mapping",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Checks one raw payload for a stage.
///
/// The typed result is returned only when the outcome has no errors.
pub trait StageValidator: Send + Sync {
    type Output: Reasoned + Serialize + DeserializeOwned + Clone + fmt::Debug + Send;

    fn stage(&self) -> Stage;

    fn validate(&self, payload: &Value) -> (Option<Self::Output>, ValidationOutcome);
}

/// Walk the contract, then decode strictly.
///
/// On failure the returned outcome carries every structural issue and a
/// `schema_errors` stat; business rules must not run.
pub(crate) fn decode<T: DeserializeOwned>(
    payload: &Value,
    contract: &Contract,
) -> Result<T, ValidationOutcome> {
    let issues = validate_schema(payload, contract);
    if !issues.is_empty() {
        let mut log = IssueLog::new();
        log.stat("schema_errors", issues.len());
        log.extend(issues);
        return Err(log.finish());
    }

    serde_json::from_value(payload.clone()).map_err(|e| {
        let mut log = IssueLog::new();
        log.stat("schema_errors", 1);
        log.push(ValidationIssue::error(
            ROOT_FIELD,
            format!("payload does not decode as {}: {e}", contract.name()),
        ));
        log.finish()
    })
}

/// Require the `"<Object> - <Field>"` label convention.
pub(crate) fn check_label(log: &mut IssueLog, field: String, object: ObjectType, label: &str) {
    if has_label_format(label) {
        return;
    }
    log.push(
        ValidationIssue::error(
            field,
            format!("label '{label}' must use the '<Object> - <Field>' format"),
        )
        .with_suggestion(format_field_label(object, label.trim())),
    );
}

/// Names that occur more than once, sorted.
pub(crate) fn repeated<'a>(names: impl IntoIterator<Item = &'a str>) -> BTreeSet<&'a str> {
    let mut seen = BTreeSet::new();
    let mut dupes = BTreeSet::new();
    for name in names {
        if !seen.insert(name) {
            dupes.insert(name);
        }
    }
    dupes
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn label_check_suggests_canonical_label() {
        let mut log = IssueLog::new();
        check_label(&mut log, "x".into(), ObjectType::Company, "Name");
        check_label(&mut log, "y".into(), ObjectType::People, "People - Email");
        let outcome = log.finish();
        assert_eq!(outcome.error_count(), 1);
        assert_eq!(
            outcome.errors[0].suggestion.as_deref(),
            Some("Organization - Name")
        );
    }

    #[test]
    fn repeated_reports_each_duplicate_once() {
        let dupes = repeated(["a", "b", "a", "c", "a", "b"]);
        assert_eq!(dupes.into_iter().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn decode_short_circuits_on_schema_errors() {
        let contract = crate::schema::mapping_contract().unwrap();
        let outcome = decode::<crate::model::MappingResult>(&json!({"mappings": 1}), &contract)
            .unwrap_err();
        assert!(!outcome.is_valid);
        assert_eq!(outcome.stat("schema_errors"), Some(&json!(1)));
    }
}
