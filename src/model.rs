//! Typed results produced by the triage and mapping stages.
//!
//! These are the shapes a generated payload must decode into once it has
//! passed the schema contract. Wire names are snake_case throughout.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the four CRM entity kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectType {
    People,
    Company,
    Deal,
    Lead,
}

impl ObjectType {
    pub const ALL: [ObjectType; 4] = [
        ObjectType::People,
        ObjectType::Company,
        ObjectType::Deal,
        ObjectType::Lead,
    ];

    pub const WIRE_NAMES: [&'static str; 4] = ["people", "company", "deal", "lead"];

    /// Wire identifier (`"people"`, `"company"`, ...).
    pub fn as_str(self) -> &'static str {
        match self {
            ObjectType::People => "people",
            ObjectType::Company => "company",
            ObjectType::Deal => "deal",
            ObjectType::Lead => "lead",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|o| o.as_str() == s)
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// CRM field types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    #[default]
    Text,
    Textarea,
    Number,
    Email,
    Phone,
    Url,
    Date,
    Datetime,
    Select,
    Multiselect,
    Boolean,
    User,
    Users,
    File,
}

impl FieldType {
    pub const WIRE_NAMES: [&'static str; 14] = [
        "text",
        "textarea",
        "number",
        "email",
        "phone",
        "url",
        "date",
        "datetime",
        "select",
        "multiselect",
        "boolean",
        "user",
        "users",
        "file",
    ];
}

/// Why a column was left out of the import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Only empty values.
    Empty,
    /// Internal identifier of the source system.
    InternalId,
    /// Duplicates another column.
    Duplicate,
    /// Value generated by the source system.
    SystemGenerated,
    /// Metadata with no meaning after the import.
    MetaInfo,
    /// Mostly empty (80% or more).
    LowQuality,
    /// Left unclassified by the model and skipped automatically.
    AutoSkipped,
}

impl SkipReason {
    pub const WIRE_NAMES: [&'static str; 7] = [
        "empty",
        "internal_id",
        "duplicate",
        "system_generated",
        "meta_info",
        "low_quality",
        "auto_skipped",
    ];
}

/// A source column to carry into the CRM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnKeep {
    pub column_name: String,
    pub target_object: ObjectType,
    /// `"<Object> - <Field>"`.
    pub suggested_field_label: String,
    #[serde(default)]
    pub suggested_field_type: FieldType,
    #[serde(default)]
    pub is_required: bool,
    pub reason: String,
}

/// A source column to drop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSkip {
    pub column_name: String,
    pub reason: SkipReason,
    #[serde(default)]
    pub detail: Option<String>,
}

/// Output of the triage stage: a keep/skip partition of the source columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriageResult {
    pub columns_to_keep: Vec<ColumnKeep>,
    #[serde(default)]
    pub columns_to_skip: Vec<ColumnSkip>,
    pub recommended_objects: Vec<ObjectType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
}

/// Assignment of one kept column to a CRM field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMapping {
    pub source_column: String,
    pub target_object: ObjectType,
    /// Id of an existing field; `None` for new fields.
    #[serde(default)]
    pub target_field_id: Option<String>,
    pub target_field_label: String,
    #[serde(default)]
    pub field_type: FieldType,
    #[serde(default)]
    pub is_new_field: bool,
    #[serde(default)]
    pub is_required: bool,
    #[serde(default)]
    pub is_unique: bool,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

fn default_confidence() -> f64 {
    1.0
}

/// Output of the mapping stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingResult {
    pub mappings: Vec<FieldMapping>,
    #[serde(default)]
    pub unmapped_columns: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
}

/// A field the caller's CRM already has for some object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailableField {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub field_type: Option<FieldType>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub unique: bool,
}

/// Per-column statistics a caller may attach to a triage request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnStats {
    pub column_name: String,
    pub total_rows: u64,
    pub non_empty_count: u64,
    pub empty_count: u64,
    pub unique_count: u64,
    #[serde(default)]
    pub sample_values: Vec<String>,
}

/// Typed stage results that can carry the model's reasoning trace.
pub trait Reasoned {
    fn thinking(&self) -> Option<&str>;
    fn set_thinking(&mut self, thinking: String);
}

impl Reasoned for TriageResult {
    fn thinking(&self) -> Option<&str> {
        self.thinking.as_deref()
    }

    fn set_thinking(&mut self, thinking: String) {
        self.thinking = Some(thinking);
    }
}

impl Reasoned for MappingResult {
    fn thinking(&self) -> Option<&str> {
        self.thinking.as_deref()
    }

    fn set_thinking(&mut self, thinking: String) {
        self.thinking = Some(thinking);
    }
}
