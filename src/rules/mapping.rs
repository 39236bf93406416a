use super::{check_label, decode, repeated, Stage, StageValidator};
use crate::catalog::{object_name, required_fields, FieldCatalog};
use crate::error::Result;
use crate::issue::{IssueLog, ValidationIssue, ValidationOutcome};
use crate::model::{ColumnKeep, FieldMapping, MappingResult, ObjectType};
use crate::schema::{mapping_contract, Contract};
use serde_json::Value;
use std::collections::{BTreeSet, HashSet};

/// Validator for the field mapping stage.
#[derive(Debug, Clone)]
pub struct MappingRules {
    keep_columns: Vec<ColumnKeep>,
    object_types: Vec<ObjectType>,
    catalog: FieldCatalog,
    contract: Contract,
}

impl MappingRules {
    pub fn new(
        keep_columns: Vec<ColumnKeep>,
        object_types: Vec<ObjectType>,
        catalog: FieldCatalog,
    ) -> Result<Self> {
        Ok(Self {
            keep_columns,
            object_types,
            catalog,
            contract: mapping_contract()?,
        })
    }

    fn known_field(&self, object: ObjectType, id: &str) -> bool {
        self.catalog
            .get(&object)
            .is_some_and(|fields| fields.iter().any(|f| f.id == id))
    }

    fn check(&self, result: &MappingResult, log: &mut IssueLog) {
        let keep: BTreeSet<&str> = self
            .keep_columns
            .iter()
            .map(|c| c.column_name.as_str())
            .collect();
        let mapped: BTreeSet<&str> = result
            .mappings
            .iter()
            .map(|m| m.source_column.as_str())
            .collect();

        let unmapped: BTreeSet<&str> = keep.difference(&mapped).copied().collect();
        if !unmapped.is_empty() {
            log.push(
                ValidationIssue::error("mappings", format!("kept columns not mapped: {unmapped:?}"))
                    .with_suggestion("add one mapping for every kept column"),
            );
        }

        let selected: Vec<&str> = self.object_types.iter().map(|o| o.as_str()).collect();
        for m in &result.mappings {
            let at = |field: &str| format!("mappings.{}.{field}", m.source_column);

            if !keep.contains(m.source_column.as_str()) {
                log.push(ValidationIssue::info(
                    at("source_column"),
                    format!("'{}' is not in the keep list", m.source_column),
                ));
            }

            if !self.object_types.contains(&m.target_object) {
                log.push(
                    ValidationIssue::error(
                        at("target_object"),
                        format!("object '{}' was not selected", m.target_object),
                    )
                    .with_suggestion(format!("use one of: {}", selected.join(", "))),
                );
            }

            check_label(
                log,
                at("target_field_label"),
                m.target_object,
                &m.target_field_label,
            );

            match (&m.target_field_id, m.is_new_field) {
                (Some(id), false) if !self.known_field(m.target_object, id) => {
                    log.push(
                        ValidationIssue::warning(
                            at("target_field_id"),
                            format!("no {} field with id '{id}'", m.target_object),
                        )
                        .with_suggestion("create a new field or use an existing field id"),
                    );
                }
                (Some(id), true) => {
                    log.push(ValidationIssue::warning(
                        at("target_field_id"),
                        format!("new field carries target_field_id '{id}', which is ignored"),
                    ));
                }
                _ => {}
            }
        }

        self.check_required(&result.mappings, log);

        let mut seen = HashSet::new();
        let mut dupe_targets = Vec::new();
        for m in &result.mappings {
            // New fields are identified by label; their id is ignored.
            let key = match (&m.target_field_id, m.is_new_field) {
                (Some(id), false) => id.as_str(),
                _ => m.target_field_label.as_str(),
            };
            if !seen.insert((m.target_object, key)) {
                dupe_targets.push(format!("{}/{key}", m.target_object));
            }
        }
        if !dupe_targets.is_empty() {
            log.push(ValidationIssue::warning(
                "mappings",
                format!("fields targeted more than once: {dupe_targets:?}"),
            ));
        }

        let sources = result.mappings.iter().map(|m| m.source_column.as_str());
        let remapped: BTreeSet<&str> = repeated(sources)
            .into_iter()
            .filter(|c| keep.contains(c))
            .collect();
        if !remapped.is_empty() {
            log.push(ValidationIssue::warning(
                "mappings",
                format!("kept columns mapped more than once: {remapped:?}"),
            ));
        }

        log.stat("total_mappings", result.mappings.len());
        log.stat(
            "new_fields",
            result.mappings.iter().filter(|m| m.is_new_field).count(),
        );
        log.stat("unmapped_count", unmapped.len());
    }

    /// Required fields are matched by id, or by a label containing the id.
    fn check_required(&self, mappings: &[FieldMapping], log: &mut IssueLog) {
        for &object in &self.object_types {
            let to_object: Vec<&FieldMapping> =
                mappings.iter().filter(|m| m.target_object == object).collect();

            for &req in required_fields(object) {
                let by_id = to_object
                    .iter()
                    .any(|m| m.target_field_id.as_deref() == Some(req));
                let by_label = to_object
                    .iter()
                    .any(|m| m.target_field_label.to_lowercase().contains(req));
                if !by_id && !by_label {
                    log.push(ValidationIssue::warning(
                        format!("mappings.{object}"),
                        format!("required field '{req}' of {} is not mapped", object_name(object)),
                    ));
                }
            }
        }
    }
}

impl StageValidator for MappingRules {
    type Output = MappingResult;

    fn stage(&self) -> Stage {
        Stage::Mapping
    }

    fn validate(&self, payload: &Value) -> (Option<MappingResult>, ValidationOutcome) {
        let result: MappingResult = match decode(payload, &self.contract) {
            Ok(r) => r,
            Err(outcome) => return (None, outcome),
        };

        let mut log = IssueLog::new();
        self.check(&result, &mut log);
        let outcome = log.finish();
        let typed = outcome.is_valid.then_some(result);
        (typed, outcome)
    }
}
