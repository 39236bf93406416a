//! Request/response types and entry points for the triage and mapping stages.
//!
//! These mirror the bodies of `POST /triage` and `POST /map`; routing itself
//! lives in the embedding application. Prompt text is rendered by the caller
//! and passed in as [`Prompts`].

use crate::catalog::FieldCatalog;
use crate::error::{RepairError, Result};
use crate::issue::ValidationOutcome;
use crate::model::{ColumnKeep, ColumnStats, MappingResult, ObjectType, TriageResult};
use crate::repair_loop::{LoopResult, RepairLoop};
use crate::rules::{MappingRules, Stage, TriageRules};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

/// One sample row keyed by column name.
pub type Row = Map<String, Value>;

/// Upper bound on sample rows in a triage request.
pub const MAX_SAMPLE_ROWS: usize = 10;

/// Upper bound on sample values per [`ColumnStats`] entry.
pub const MAX_STAT_SAMPLES: usize = 5;

/// Rendered prompts for one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompts {
    pub system: String,
    pub user: String,
}

impl Prompts {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriageRequest {
    pub columns: Vec<String>,
    pub sample_data: Vec<Row>,
    #[serde(default)]
    pub column_stats: Option<Vec<ColumnStats>>,
    #[serde(default)]
    pub business_context: Option<String>,
}

impl TriageRequest {
    pub fn check(&self) -> Result<()> {
        if self.columns.is_empty() {
            return Err(invalid("columns must not be empty"));
        }
        if self.sample_data.is_empty() || self.sample_data.len() > MAX_SAMPLE_ROWS {
            return Err(invalid(format!(
                "sample_data must contain 1 to {MAX_SAMPLE_ROWS} rows, got {}",
                self.sample_data.len()
            )));
        }
        for stat in self.column_stats.iter().flatten() {
            if stat.sample_values.len() > MAX_STAT_SAMPLES {
                return Err(invalid(format!(
                    "column_stats for '{}' has more than {MAX_STAT_SAMPLES} sample values",
                    stat.column_name
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingRequest {
    pub columns_to_keep: Vec<ColumnKeep>,
    pub object_types: Vec<ObjectType>,
    pub available_fields: FieldCatalog,
    #[serde(default)]
    pub sample_data: Vec<Row>,
}

impl MappingRequest {
    pub fn check(&self) -> Result<()> {
        if self.columns_to_keep.is_empty() {
            return Err(invalid("columns_to_keep must not be empty"));
        }
        if self.object_types.is_empty() {
            return Err(invalid("object_types must not be empty"));
        }
        Ok(())
    }
}

fn invalid(msg: impl Into<String>) -> RepairError {
    RepairError::InvalidRequest(msg.into())
}

/// Response body shared by both stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResponse<T> {
    pub success: bool,
    #[serde(default)]
    pub result: Option<T>,
    #[serde(default)]
    pub validation: Option<ValidationOutcome>,
    /// Generation calls made, the first one included.
    #[serde(default)]
    pub repair_attempts: u32,
    #[serde(default)]
    pub error: Option<String>,
}

pub type TriageResponse = StageResponse<TriageResult>;
pub type MappingResponse = StageResponse<MappingResult>;

impl<T> StageResponse<T> {
    fn rejected(stage: Stage, err: RepairError) -> Self {
        warn!(stage = %stage, error = %err, "request rejected");
        Self {
            success: false,
            result: None,
            validation: None,
            repair_attempts: 0,
            error: Some(err.to_string()),
        }
    }

    fn from_loop(stage: Stage, outcome: LoopResult<T>) -> Self {
        let error = (!outcome.success).then(|| {
            format!(
                "{stage} failed after {} attempt(s); see validation errors",
                outcome.attempts
            )
        });
        Self {
            success: outcome.success,
            result: outcome.result,
            validation: Some(outcome.validation),
            repair_attempts: outcome.attempts,
            error,
        }
    }
}

/// Classify every source column as keep or skip.
pub async fn run_triage(
    repair: &RepairLoop,
    request: &TriageRequest,
    prompts: &Prompts,
) -> TriageResponse {
    if let Err(e) = request.check() {
        return StageResponse::rejected(Stage::Triage, e);
    }
    let rules = match TriageRules::new(request.columns.clone()) {
        Ok(rules) => rules,
        Err(e) => return StageResponse::rejected(Stage::Triage, e),
    };

    let outcome = repair.run(&prompts.system, &prompts.user, &rules).await;
    StageResponse::from_loop(Stage::Triage, outcome)
}

/// Map every kept column onto a CRM field.
pub async fn run_mapping(
    repair: &RepairLoop,
    request: &MappingRequest,
    prompts: &Prompts,
) -> MappingResponse {
    if let Err(e) = request.check() {
        return StageResponse::rejected(Stage::Mapping, e);
    }
    let rules = match MappingRules::new(
        request.columns_to_keep.clone(),
        request.object_types.clone(),
        request.available_fields.clone(),
    ) {
        Ok(rules) => rules,
        Err(e) => return StageResponse::rejected(Stage::Mapping, e),
    };

    let outcome = repair.run(&prompts.system, &prompts.user, &rules).await;
    StageResponse::from_loop(Stage::Mapping, outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::system_catalog;
    use crate::model::FieldType;
    use crate::provider::{MockProvider, Provider};
    use serde_json::json;
    use std::sync::Arc;

    fn row(pairs: &[(&str, &str)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), json!(v)))
            .collect()
    }

    fn triage_request() -> TriageRequest {
        TriageRequest {
            columns: vec!["id".into(), "name".into(), "email".into()],
            sample_data: vec![row(&[("id", "1"), ("name", "Kim"), ("email", "kim@example.com")])],
            column_stats: None,
            business_context: Some("B2B SaaS".into()),
        }
    }

    fn repair_loop(mock: &Arc<MockProvider>) -> RepairLoop {
        let provider: Arc<dyn Provider> = mock.clone();
        RepairLoop::new(provider)
    }

    const TRIAGE_REPLY: &str = r#"```json
{
  "columns_to_keep": [
    {"column_name": "name", "target_object": "people",
     "suggested_field_label": "People - Name", "suggested_field_type": "text",
     "is_required": true, "reason": "person name"},
    {"column_name": "email", "target_object": "people",
     "suggested_field_label": "People - Email", "suggested_field_type": "email",
     "reason": "contact"}
  ],
  "columns_to_skip": [{"column_name": "id", "reason": "internal_id", "detail": null}],
  "recommended_objects": ["people"]
}
```"#;

    #[tokio::test]
    async fn triage_success_reports_attempts() {
        let mock = Arc::new(MockProvider::fixed(TRIAGE_REPLY));
        let resp = run_triage(
            &repair_loop(&mock),
            &triage_request(),
            &Prompts::new("sys", "classify"),
        )
        .await;

        assert!(resp.success);
        assert_eq!(resp.repair_attempts, 1);
        assert!(resp.error.is_none());
        let result = resp.result.unwrap();
        assert_eq!(result.columns_to_keep[1].suggested_field_type, FieldType::Email);
        assert!(resp.validation.unwrap().is_valid);
    }

    #[tokio::test]
    async fn triage_failure_carries_validation() {
        let mock = Arc::new(MockProvider::fixed("no idea"));
        let resp = run_triage(
            &repair_loop(&mock),
            &triage_request(),
            &Prompts::new("sys", "classify"),
        )
        .await;

        assert!(!resp.success);
        assert_eq!(resp.repair_attempts, 2);
        assert!(resp.error.unwrap().starts_with("triage failed after 2 attempt(s)"));
        assert_eq!(resp.validation.unwrap().errors[0].field, "response");
    }

    #[tokio::test]
    async fn rejected_triage_request_makes_no_call() {
        let mock = Arc::new(MockProvider::fixed(TRIAGE_REPLY));
        let mut request = triage_request();
        request.sample_data = vec![row(&[("id", "1")]); 11];

        let resp = run_triage(&repair_loop(&mock), &request, &Prompts::new("s", "u")).await;
        assert!(!resp.success);
        assert!(resp.validation.is_none());
        assert_eq!(resp.repair_attempts, 0);
        assert!(resp.error.unwrap().contains("1 to 10 rows"));
        assert_eq!(mock.calls(), 0);
    }

    #[test]
    fn request_checks() {
        let mut request = triage_request();
        request.columns.clear();
        assert!(request.check().is_err());

        let mut request = triage_request();
        request.sample_data.clear();
        assert!(request.check().is_err());

        let mut request = triage_request();
        request.column_stats = Some(vec![ColumnStats {
            column_name: "name".into(),
            total_rows: 10,
            non_empty_count: 10,
            empty_count: 0,
            unique_count: 9,
            sample_values: vec!["a".into(); 6],
        }]);
        assert!(matches!(request.check(), Err(RepairError::InvalidRequest(_))));
    }

    fn mapping_request() -> MappingRequest {
        let keep: ColumnKeep = serde_json::from_value(json!({
            "column_name": "email",
            "target_object": "people",
            "suggested_field_label": "People - Email",
            "suggested_field_type": "email",
            "reason": "contact"
        }))
        .unwrap();
        MappingRequest {
            columns_to_keep: vec![keep],
            object_types: vec![ObjectType::People],
            available_fields: system_catalog(&[ObjectType::People]),
            sample_data: vec![],
        }
    }

    #[tokio::test]
    async fn mapping_success_keeps_warnings() {
        let reply = r#"{
            "mappings": [{
                "source_column": "email", "target_object": "people",
                "target_field_id": "email", "target_field_label": "People - Email",
                "field_type": "email", "is_unique": true, "confidence": 0.95
            }],
            "thinking": "email maps directly"
        }"#;
        let mock = Arc::new(MockProvider::fixed(reply));
        let resp = run_mapping(
            &repair_loop(&mock),
            &mapping_request(),
            &Prompts::new("sys", "map"),
        )
        .await;

        assert!(resp.success);
        let result = resp.result.unwrap();
        assert_eq!(result.thinking.as_deref(), Some("email maps directly"));
        let validation = resp.validation.unwrap();
        assert_eq!(validation.warnings.len(), 1);
        assert!(validation.warnings[0].message.contains("'name' of People"));
    }

    #[tokio::test]
    async fn mapping_without_objects_is_rejected() {
        let mock = Arc::new(MockProvider::fixed("{}"));
        let mut request = mapping_request();
        request.object_types.clear();
        let resp = run_mapping(&repair_loop(&mock), &request, &Prompts::new("s", "u")).await;
        assert!(!resp.success);
        assert_eq!(mock.calls(), 0);
    }

    #[test]
    fn mapping_request_decodes_catalogue_keyed_by_object() {
        let request: MappingRequest = serde_json::from_value(json!({
            "columns_to_keep": [],
            "object_types": ["company"],
            "available_fields": {
                "company": [{"id": "name", "label": "Name", "required": true}]
            }
        }))
        .unwrap();
        assert!(request.sample_data.is_empty());
        let fields = &request.available_fields[&ObjectType::Company];
        assert!(fields[0].required);
        assert!(fields[0].field_type.is_none());
    }
}
