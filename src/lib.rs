//! # CRM Triage
//!
//! Validation and repair for LLM-generated CRM column triage and field mapping.
//!
//! A spreadsheet import runs two generation stages: **triage** decides which
//! source columns to keep, and **mapping** binds each kept column to a CRM
//! field. Model output is messy, so every reply goes through the same loop:
//!
//! 1. [`extract`](extract::extract) pulls a JSON payload (and optional
//!    `<thinking>` block) out of free text.
//! 2. A [`StageValidator`](rules::StageValidator) checks the payload against
//!    the stage's [`Contract`](schema::Contract) and its domain rules,
//!    producing a [`ValidationOutcome`].
//! 3. On errors, [`RepairLoop`] asks the [`Provider`] to fix its previous
//!    response, listing every issue, until the payload passes or the attempt
//!    budget is spent.
//!
//! ## Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use crm_triage::{run_triage, MockProvider, Prompts, RepairLoop, TriageRequest};
//! use serde_json::json;
//!
//! let provider = Arc::new(MockProvider::fixed(r#"{
//!     "columns_to_keep": [{"column_name": "email", "target_object": "people",
//!         "suggested_field_label": "People - Email", "reason": "contact"}],
//!     "columns_to_skip": [],
//!     "recommended_objects": ["people"]
//! }"#));
//! let repair = RepairLoop::new(provider);
//!
//! let request: TriageRequest = serde_json::from_value(json!({
//!     "columns": ["email"],
//!     "sample_data": [{"email": "kim@example.com"}]
//! })).unwrap();
//!
//! let response = tokio_test::block_on(
//!     run_triage(&repair, &request, &Prompts::new("system", "classify")),
//! );
//! assert!(response.success);
//! assert_eq!(response.repair_attempts, 1);
//! ```

pub mod catalog;
pub mod config;
pub mod error;
pub mod events;
pub mod extract;
pub mod issue;
pub mod model;
pub mod prompt;
pub mod provider;
pub mod repair_loop;
pub mod rules;
pub mod schema;
pub mod service;

pub use config::{GenerationConfig, RepairConfig};
pub use error::{RepairError, Result};
pub use events::{Event, EventHandler, FnEventHandler};
pub use extract::{extract, ExtractedOutput};
pub use issue::{Severity, ValidationIssue, ValidationOutcome};
pub use model::{ColumnKeep, ColumnSkip, FieldMapping, MappingResult, ObjectType, TriageResult};
#[cfg(feature = "openai")]
pub use provider::OpenAiProvider;
pub use provider::{MockProvider, Provider, RawGenerationResponse};
pub use repair_loop::{LoopResult, RepairAttempt, RepairLoop};
pub use rules::{MappingRules, Stage, StageValidator, TriageRules};
pub use service::{
    run_mapping, run_triage, MappingRequest, MappingResponse, Prompts, TriageRequest,
    TriageResponse,
};
