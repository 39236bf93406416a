//! Structural contracts for generated payloads.
//!
//! A [`Contract`] describes an object shape: which properties exist, their
//! kinds, and whether they may be missing or null. [`validate_schema`] walks a
//! raw [`Value`] against a contract and reports every violation with a dotted
//! path, so a single repair round can address all of them. A strict serde decode
//! into the typed result only happens once the walk comes back clean.

use crate::error::{RepairError, Result};
use crate::issue::ValidationIssue;
use crate::model::{FieldType, ObjectType, SkipReason};
use serde_json::Value;
use std::collections::HashSet;

/// Field path used for violations on the payload root.
pub const ROOT_FIELD: &str = "response";

/// Expected shape of a single value.
#[derive(Debug, Clone, PartialEq)]
pub enum Kind {
    String { min_len: usize },
    Bool,
    Number { min: Option<f64>, max: Option<f64> },
    Enum(&'static [&'static str]),
    List { min_items: usize, items: Box<Kind> },
    Object(Contract),
}

impl Kind {
    pub fn string() -> Self {
        Kind::String { min_len: 0 }
    }

    pub fn non_empty_string() -> Self {
        Kind::String { min_len: 1 }
    }

    pub fn number_in(min: f64, max: f64) -> Self {
        Kind::Number {
            min: Some(min),
            max: Some(max),
        }
    }

    pub fn list_of(items: Kind) -> Self {
        Kind::List {
            min_items: 0,
            items: Box::new(items),
        }
    }

    pub fn non_empty_list_of(items: Kind) -> Self {
        Kind::List {
            min_items: 1,
            items: Box::new(items),
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            Kind::String { .. } => "string",
            Kind::Bool => "boolean",
            Kind::Number { .. } => "number",
            Kind::Enum(_) => "string",
            Kind::List { .. } => "list",
            Kind::Object(_) => "object",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub name: &'static str,
    pub kind: Kind,
    pub required: bool,
    pub nullable: bool,
}

/// Declared shape of a JSON object.
#[derive(Debug, Clone, PartialEq)]
pub struct Contract {
    name: &'static str,
    properties: Vec<Property>,
}

impl Contract {
    /// Start declaring a contract. Call [`ContractBuilder::build`] to finish.
    pub fn object(name: &'static str) -> ContractBuilder {
        ContractBuilder {
            name,
            properties: Vec::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Builder for [`Contract`].
///
/// ```
/// use crm_triage::schema::{Contract, Kind, validate_schema};
/// use serde_json::json;
///
/// let contract = Contract::object("Pair")
///     .required("key", Kind::non_empty_string())
///     .nullable("note", Kind::string())
///     .build()
///     .unwrap();
///
/// assert!(validate_schema(&json!({"key": "a", "note": null}), &contract).is_empty());
/// assert_eq!(validate_schema(&json!({"note": 3}), &contract).len(), 2);
/// ```
#[derive(Debug)]
pub struct ContractBuilder {
    name: &'static str,
    properties: Vec<Property>,
}

impl ContractBuilder {
    /// Property that must be present and non-null.
    pub fn required(self, name: &'static str, kind: Kind) -> Self {
        self.property(name, kind, true, false)
    }

    /// Property that may be missing but not null.
    pub fn optional(self, name: &'static str, kind: Kind) -> Self {
        self.property(name, kind, false, false)
    }

    /// Property that may be missing or null.
    pub fn nullable(self, name: &'static str, kind: Kind) -> Self {
        self.property(name, kind, false, true)
    }

    fn property(mut self, name: &'static str, kind: Kind, required: bool, nullable: bool) -> Self {
        self.properties.push(Property {
            name,
            kind,
            required,
            nullable,
        });
        self
    }

    /// Finish the contract, rejecting declarations that could never validate
    /// consistently.
    pub fn build(self) -> Result<Contract> {
        let mut seen = HashSet::new();
        for prop in &self.properties {
            if !seen.insert(prop.name) {
                return Err(self.invalid(format!("duplicate property '{}'", prop.name)));
            }
            check_kind(&prop.kind).map_err(|reason| {
                self.invalid(format!("property '{}': {}", prop.name, reason))
            })?;
        }
        Ok(Contract {
            name: self.name,
            properties: self.properties,
        })
    }

    fn invalid(&self, reason: String) -> RepairError {
        RepairError::InvalidContract {
            contract: self.name,
            reason,
        }
    }
}

fn check_kind(kind: &Kind) -> std::result::Result<(), String> {
    match kind {
        Kind::Enum(variants) if variants.is_empty() => Err("enum has no variants".into()),
        Kind::Number {
            min: Some(min),
            max: Some(max),
        } if min > max => Err(format!("range {min}..={max} is empty")),
        Kind::List { items, .. } => check_kind(items),
        _ => Ok(()),
    }
}

/// Check `payload` against `contract`, returning every violation found.
///
/// Keys the contract does not declare are ignored.
pub fn validate_schema(payload: &Value, contract: &Contract) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    match payload {
        Value::Object(_) => check_object(payload, contract, None, &mut issues),
        other => issues.push(ValidationIssue::error(
            ROOT_FIELD,
            format!("expected a JSON object, got {}", type_name(other)),
        )),
    }
    issues
}

fn check_object(
    value: &Value,
    contract: &Contract,
    prefix: Option<&str>,
    issues: &mut Vec<ValidationIssue>,
) {
    for prop in &contract.properties {
        let path = match prefix {
            Some(p) => format!("{p}.{}", prop.name),
            None => prop.name.to_string(),
        };
        match value.get(prop.name) {
            None if prop.required => {
                issues.push(ValidationIssue::error(path, "field required"));
            }
            None => {}
            Some(Value::Null) if prop.nullable => {}
            Some(Value::Null) => {
                issues.push(ValidationIssue::error(
                    path,
                    format!("must not be null, expected {}", prop.kind.describe()),
                ));
            }
            Some(v) => check_value(v, &prop.kind, &path, issues),
        }
    }
}

fn check_value(value: &Value, kind: &Kind, path: &str, issues: &mut Vec<ValidationIssue>) {
    let mismatch = |issues: &mut Vec<ValidationIssue>| {
        issues.push(ValidationIssue::error(
            path,
            format!("expected {}, got {}", kind.describe(), type_name(value)),
        ));
    };

    match kind {
        Kind::String { min_len } => match value.as_str() {
            Some(s) if s.trim().chars().count() < *min_len => {
                issues.push(ValidationIssue::error(path, "must not be empty"));
            }
            Some(_) => {}
            None => mismatch(issues),
        },
        Kind::Bool => {
            if !value.is_boolean() {
                mismatch(issues);
            }
        }
        Kind::Number { min, max } => match value.as_f64() {
            Some(n) => {
                if let Some(lo) = min.filter(|lo| n < *lo) {
                    issues.push(ValidationIssue::error(path, format!("must be >= {lo}, got {n}")));
                }
                if let Some(hi) = max.filter(|hi| n > *hi) {
                    issues.push(ValidationIssue::error(path, format!("must be <= {hi}, got {n}")));
                }
            }
            None => mismatch(issues),
        },
        Kind::Enum(variants) => match value.as_str() {
            Some(s) if variants.contains(&s) => {}
            Some(s) => issues.push(ValidationIssue::error(
                path,
                format!("'{s}' is not one of: {}", variants.join(", ")),
            )),
            None => mismatch(issues),
        },
        Kind::List { min_items, items } => match value.as_array() {
            Some(list) => {
                if list.len() < *min_items {
                    issues.push(ValidationIssue::error(
                        path,
                        format!("must contain at least {min_items} item(s)"),
                    ));
                }
                for (i, item) in list.iter().enumerate() {
                    let item_path = format!("{path}.{i}");
                    if item.is_null() {
                        issues.push(ValidationIssue::error(item_path, "must not be null"));
                    } else {
                        check_value(item, items, &item_path, issues);
                    }
                }
            }
            None => mismatch(issues),
        },
        Kind::Object(contract) => {
            if value.is_object() {
                check_object(value, contract, Some(path), issues);
            } else {
                mismatch(issues);
            }
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

fn object_type_kind() -> Kind {
    Kind::Enum(&ObjectType::WIRE_NAMES)
}

/// Contract for the triage stage payload.
pub fn triage_contract() -> Result<Contract> {
    let keep = Contract::object("ColumnKeep")
        .required("column_name", Kind::string())
        .required("target_object", object_type_kind())
        .required("suggested_field_label", Kind::string())
        .optional("suggested_field_type", Kind::Enum(&FieldType::WIRE_NAMES))
        .optional("is_required", Kind::Bool)
        .required("reason", Kind::non_empty_string())
        .build()?;

    let skip = Contract::object("ColumnSkip")
        .required("column_name", Kind::string())
        .required("reason", Kind::Enum(&SkipReason::WIRE_NAMES))
        .nullable("detail", Kind::string())
        .build()?;

    Contract::object("TriageResult")
        .required("columns_to_keep", Kind::non_empty_list_of(Kind::Object(keep)))
        .optional("columns_to_skip", Kind::list_of(Kind::Object(skip)))
        .required("recommended_objects", Kind::non_empty_list_of(object_type_kind()))
        .nullable("thinking", Kind::string())
        .build()
}

/// Contract for the mapping stage payload.
pub fn mapping_contract() -> Result<Contract> {
    let mapping = Contract::object("FieldMapping")
        .required("source_column", Kind::string())
        .required("target_object", object_type_kind())
        .nullable("target_field_id", Kind::string())
        .required("target_field_label", Kind::string())
        .optional("field_type", Kind::Enum(&FieldType::WIRE_NAMES))
        .optional("is_new_field", Kind::Bool)
        .optional("is_required", Kind::Bool)
        .optional("is_unique", Kind::Bool)
        .optional("confidence", Kind::number_in(0.0, 1.0))
        .build()?;

    Contract::object("MappingResult")
        .required("mappings", Kind::non_empty_list_of(Kind::Object(mapping)))
        .optional("unmapped_columns", Kind::list_of(Kind::string()))
        .optional("warnings", Kind::list_of(Kind::string()))
        .nullable("thinking", Kind::string())
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(issues: &[ValidationIssue]) -> Vec<&str> {
        issues.iter().map(|i| i.field.as_str()).collect()
    }

    #[test]
    fn duplicate_property_is_rejected() {
        let err = Contract::object("Dup")
            .required("a", Kind::Bool)
            .optional("a", Kind::string())
            .build()
            .unwrap_err();
        assert!(matches!(err, RepairError::InvalidContract { contract: "Dup", .. }));
    }

    #[test]
    fn empty_enum_is_rejected_even_when_nested() {
        let err = Contract::object("E")
            .required("xs", Kind::list_of(Kind::Enum(&[])))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("enum has no variants"));
    }

    #[test]
    fn inverted_range_is_rejected() {
        assert!(Contract::object("R")
            .required("n", Kind::number_in(1.0, 0.0))
            .build()
            .is_err());
    }

    #[test]
    fn wire_contracts_build() {
        assert!(triage_contract().is_ok());
        assert!(mapping_contract().is_ok());
    }

    #[test]
    fn non_object_root_is_one_issue() {
        let contract = triage_contract().unwrap();
        let issues = validate_schema(&json!([1, 2]), &contract);
        assert_eq!(fields(&issues), vec![ROOT_FIELD]);
    }

    #[test]
    fn missing_required_fields_are_all_reported() {
        let contract = triage_contract().unwrap();
        let issues = validate_schema(&json!({}), &contract);
        assert_eq!(fields(&issues), vec!["columns_to_keep", "recommended_objects"]);
        assert!(issues.iter().all(|i| i.message == "field required"));
    }

    #[test]
    fn nested_paths_use_list_indices() {
        let contract = triage_contract().unwrap();
        let payload = json!({
            "columns_to_keep": [
                {"column_name": "name", "target_object": "people",
                 "suggested_field_label": "People - Name", "reason": "person name"},
                {"column_name": "email", "target_object": "contact",
                 "suggested_field_label": "People - Email", "reason": ""}
            ],
            "recommended_objects": ["people"]
        });
        let issues = validate_schema(&payload, &contract);
        assert_eq!(
            fields(&issues),
            vec!["columns_to_keep.1.target_object", "columns_to_keep.1.reason"]
        );
        assert!(issues[0].message.contains("'contact' is not one of"));
    }

    #[test]
    fn null_only_allowed_when_nullable() {
        let contract = triage_contract().unwrap();
        let payload = json!({
            "columns_to_keep": [
                {"column_name": "a", "target_object": "people",
                 "suggested_field_label": "People - A", "reason": "r"}
            ],
            "columns_to_skip": [
                {"column_name": "id", "reason": "internal_id", "detail": null}
            ],
            "recommended_objects": ["people"],
            "thinking": null
        });
        assert!(validate_schema(&payload, &contract).is_empty());

        let mut bad = payload.clone();
        bad["columns_to_skip"] = Value::Null;
        let issues = validate_schema(&bad, &contract);
        assert_eq!(fields(&issues), vec!["columns_to_skip"]);
    }

    #[test]
    fn empty_lists_violate_minimum() {
        let contract = mapping_contract().unwrap();
        let issues = validate_schema(&json!({"mappings": []}), &contract);
        assert_eq!(fields(&issues), vec!["mappings"]);
        assert!(issues[0].message.contains("at least 1"));
    }

    #[test]
    fn confidence_outside_unit_interval() {
        let contract = mapping_contract().unwrap();
        let payload = json!({
            "mappings": [{
                "source_column": "Email", "target_object": "people",
                "target_field_label": "People - Email", "confidence": 1.5
            }]
        });
        let issues = validate_schema(&payload, &contract);
        assert_eq!(fields(&issues), vec!["mappings.0.confidence"]);
        assert!(issues[0].message.starts_with("must be <= 1"));
    }

    #[test]
    fn wrong_scalar_types_are_named() {
        let contract = mapping_contract().unwrap();
        let payload = json!({
            "mappings": [{
                "source_column": 7, "target_object": "deal",
                "target_field_label": "Deal - Name", "is_new_field": "yes"
            }],
            "unknown_key": true
        });
        let issues = validate_schema(&payload, &contract);
        assert_eq!(
            fields(&issues),
            vec!["mappings.0.source_column", "mappings.0.is_new_field"]
        );
        assert_eq!(issues[0].message, "expected string, got number");
    }
}
