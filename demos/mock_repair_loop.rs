//! Example: driving the repair loop with MockProvider, no live model needed.
//!
//! Run with: `cargo run --example mock_repair_loop`

use crm_triage::{run_triage, MockProvider, Prompts, RepairLoop, TriageRequest};
use serde_json::json;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // First reply puts "name" in both lists; the second one fixes it.
    let mock = Arc::new(MockProvider::with_contents([
        r#"{
            "columns_to_keep": [
                {"column_name": "name", "target_object": "people",
                 "suggested_field_label": "People - Name", "reason": "contact name"},
                {"column_name": "email", "target_object": "people",
                 "suggested_field_label": "People - Email", "reason": "contact email"}
            ],
            "columns_to_skip": [
                {"column_name": "id", "reason": "internal_id"},
                {"column_name": "name", "reason": "duplicate"}
            ],
            "recommended_objects": ["people"]
        }"#,
        r#"<thinking>name belongs in keep only</thinking>
        ```json
        {
            "columns_to_keep": [
                {"column_name": "name", "target_object": "people",
                 "suggested_field_label": "People - Name", "reason": "contact name"},
                {"column_name": "email", "target_object": "people",
                 "suggested_field_label": "People - Email", "reason": "contact email"}
            ],
            "columns_to_skip": [{"column_name": "id", "reason": "internal_id"}],
            "recommended_objects": ["people"]
        }
        ```"#,
    ]));

    let repair = RepairLoop::new(mock.clone());
    let request: TriageRequest = serde_json::from_value(json!({
        "columns": ["id", "name", "email"],
        "sample_data": [{"id": "1", "name": "Kim", "email": "kim@example.com"}]
    }))?;
    let prompts = Prompts::new(
        "You classify spreadsheet columns for a CRM import.",
        "Columns: id, name, email",
    );

    let response = run_triage(&repair, &request, &prompts).await;

    println!("Success: {}", response.success);
    println!("Generation calls: {}", response.repair_attempts);
    for issues in mock.repair_calls() {
        println!("Repair requested for:");
        for line in issues {
            println!("  - {line}");
        }
    }
    if let Some(result) = response.result {
        for col in &result.columns_to_keep {
            println!("Keep {} -> {}", col.column_name, col.suggested_field_label);
        }
        println!("Thinking: {}", result.thinking.unwrap_or_default());
    }
    if let Some(validation) = response.validation {
        for warning in &validation.warnings {
            println!("Warning: {}: {}", warning.field, warning.message);
        }
    }

    Ok(())
}
