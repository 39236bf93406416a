//! Fixed knowledge about the target CRM: object names, required and unique
//! fields, built-in system fields, and the field label convention.

use crate::model::{AvailableField, FieldType, ObjectType};
use std::collections::HashMap;

/// Separator between object name and field name in a field label.
pub const LABEL_SEPARATOR: &str = " - ";

/// Advisory minimum share of source columns that triage should keep.
pub const MIN_KEEP_RATIO: f64 = 0.9;

/// Advisory maximum number of skipped columns.
pub const MAX_SKIP_COLUMNS: usize = 3;

/// Field catalogue keyed by object, as supplied by the caller.
pub type FieldCatalog = HashMap<ObjectType, Vec<AvailableField>>;

/// Canonical object name used as the left half of a field label.
pub fn object_name(object: ObjectType) -> &'static str {
    match object {
        ObjectType::People => "People",
        ObjectType::Company => "Organization",
        ObjectType::Deal => "Deal",
        ObjectType::Lead => "Lead",
    }
}

/// Field ids that must carry a value for the object.
pub fn required_fields(object: ObjectType) -> &'static [&'static str] {
    match object {
        ObjectType::People | ObjectType::Company | ObjectType::Lead => &["name"],
        ObjectType::Deal => &["name", "pipeline"],
    }
}

/// Objects that must be linked to a person or organization.
pub fn needs_connection(object: ObjectType) -> bool {
    matches!(object, ObjectType::Deal | ObjectType::Lead)
}

/// Build a label in the `"<Object> - <Field>"` convention.
///
/// ```
/// use crm_triage::catalog::format_field_label;
/// use crm_triage::model::ObjectType;
///
/// assert_eq!(format_field_label(ObjectType::Company, "Name"), "Organization - Name");
/// ```
pub fn format_field_label(object: ObjectType, field: &str) -> String {
    format!("{}{}{}", object_name(object), LABEL_SEPARATOR, field)
}

/// Split a label into `(object_name, field_name)`.
///
/// Returns `(None, label)` when the label has no separator.
pub fn parse_field_label(label: &str) -> (Option<&str>, &str) {
    match label.split_once(LABEL_SEPARATOR) {
        Some((object, field)) => (Some(object), field),
        None => (None, label),
    }
}

pub fn has_label_format(label: &str) -> bool {
    label.contains(LABEL_SEPARATOR)
}

struct SystemField {
    id: &'static str,
    label: &'static str,
    field_type: FieldType,
    required: bool,
    unique: bool,
}

const fn field(id: &'static str, label: &'static str, field_type: FieldType) -> SystemField {
    SystemField {
        id,
        label,
        field_type,
        required: false,
        unique: false,
    }
}

const fn required(id: &'static str, label: &'static str, field_type: FieldType) -> SystemField {
    SystemField {
        id,
        label,
        field_type,
        required: true,
        unique: false,
    }
}

const fn unique(id: &'static str, label: &'static str, field_type: FieldType) -> SystemField {
    SystemField {
        id,
        label,
        field_type,
        required: false,
        unique: true,
    }
}

const PEOPLE_FIELDS: &[SystemField] = &[
    required("name", "Name", FieldType::Text),
    unique("email", "Email", FieldType::Email),
    field("phone", "Phone", FieldType::Phone),
    field("mobile", "Mobile", FieldType::Phone),
    field("position", "Position", FieldType::Text),
    field("department", "Department", FieldType::Text),
    field("company", "Company", FieldType::Text),
    field("address", "Address", FieldType::Text),
    field("memo", "Memo", FieldType::Textarea),
    field("owner", "Owner", FieldType::User),
    field("tags", "Tags", FieldType::Multiselect),
    field("created_at", "Created At", FieldType::Datetime),
    field("updated_at", "Updated At", FieldType::Datetime),
];

const COMPANY_FIELDS: &[SystemField] = &[
    required("name", "Name", FieldType::Text),
    field("domain", "Domain", FieldType::Url),
    field("industry", "Industry", FieldType::Select),
    field("employee_count", "Employee Count", FieldType::Number),
    field("address", "Address", FieldType::Text),
    field("phone", "Phone", FieldType::Phone),
    field("memo", "Memo", FieldType::Textarea),
    field("owner", "Owner", FieldType::User),
    field("tags", "Tags", FieldType::Multiselect),
    field("created_at", "Created At", FieldType::Datetime),
    field("updated_at", "Updated At", FieldType::Datetime),
];

const DEAL_FIELDS: &[SystemField] = &[
    required("name", "Name", FieldType::Text),
    required("pipeline", "Pipeline", FieldType::Select),
    field("stage", "Stage", FieldType::Select),
    field("amount", "Amount", FieldType::Number),
    field("currency", "Currency", FieldType::Select),
    field("probability", "Probability", FieldType::Number),
    field("expected_close_date", "Expected Close Date", FieldType::Date),
    field("actual_close_date", "Actual Close Date", FieldType::Date),
    field("status", "Status", FieldType::Select),
    field("source", "Source", FieldType::Select),
    field("memo", "Memo", FieldType::Textarea),
    field("owner", "Owner", FieldType::User),
    field("tags", "Tags", FieldType::Multiselect),
    field("created_at", "Created At", FieldType::Datetime),
    field("updated_at", "Updated At", FieldType::Datetime),
];

const LEAD_FIELDS: &[SystemField] = &[
    required("name", "Name", FieldType::Text),
    unique("email", "Email", FieldType::Email),
    field("phone", "Phone", FieldType::Phone),
    field("company", "Company", FieldType::Text),
    field("position", "Position", FieldType::Text),
    field("source", "Source", FieldType::Select),
    field("status", "Status", FieldType::Select),
    field("score", "Score", FieldType::Number),
    field("memo", "Memo", FieldType::Textarea),
    field("owner", "Owner", FieldType::User),
    field("tags", "Tags", FieldType::Multiselect),
    field("created_at", "Created At", FieldType::Datetime),
    field("updated_at", "Updated At", FieldType::Datetime),
];

/// Built-in system fields every CRM workspace has for the object.
pub fn system_fields(object: ObjectType) -> Vec<AvailableField> {
    let fields = match object {
        ObjectType::People => PEOPLE_FIELDS,
        ObjectType::Company => COMPANY_FIELDS,
        ObjectType::Deal => DEAL_FIELDS,
        ObjectType::Lead => LEAD_FIELDS,
    };
    fields
        .iter()
        .map(|f| AvailableField {
            id: f.id.to_string(),
            label: f.label.to_string(),
            field_type: Some(f.field_type),
            required: f.required,
            unique: f.unique,
        })
        .collect()
}

/// Catalogue of system fields for the given objects.
pub fn system_catalog(objects: &[ObjectType]) -> FieldCatalog {
    objects
        .iter()
        .map(|&obj| (obj, system_fields(obj)))
        .collect()
}
