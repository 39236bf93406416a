//! Repair prompt rendering.
//!
//! A repair round re-sends the original instruction followed by a section that
//! lists what was wrong, quotes the rejected response verbatim, and restates
//! the label rule the model most often breaks.

use crate::issue::ValidationIssue;

/// Separator between the original user prompt and the repair section.
pub const REPAIR_SEPARATOR: &str = "\n\n---\n\n";

/// Restated on every repair round.
pub const LABEL_RULE: &str = "Every field label must follow the \"<Object> - <Field>\" format, \
     for example \"People - Email\".";

const FIX_INSTRUCTION: &str = "Fix every problem above and return the corrected JSON only.";

/// Create a numbered list from items (1-indexed).
pub fn numbered_list(items: &[String]) -> String {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| format!("{}. {}", i + 1, item))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Wrap text in a labeled section for structured prompts.
pub fn section(label: &str, content: &str) -> String {
    format!("## {}\n{}", label, content)
}

/// `"<field>: <message> (suggestion: <suggestion>)"`, suggestion part optional.
pub fn format_issue(issue: &ValidationIssue) -> String {
    match &issue.suggestion {
        Some(s) => format!("{}: {} (suggestion: {})", issue.field, issue.message, s),
        None => format!("{}: {}", issue.field, issue.message),
    }
}

pub fn issue_messages(issues: &[ValidationIssue]) -> Vec<String> {
    issues.iter().map(format_issue).collect()
}

/// Render the repair section from already formatted issue lines.
pub fn render_repair(original_response: &str, issue_lines: &[String]) -> String {
    let issues = section(
        "Repair request",
        &format!(
            "Your previous response had the following problems:\n\n{}",
            numbered_list(issue_lines)
        ),
    );
    let previous = format!(
        "### Previous response\n```json\n{}\n```",
        original_response.trim()
    );
    format!("{issues}\n\n{previous}\n\n{FIX_INSTRUCTION}\n{LABEL_RULE}")
}

/// Repair section for the given issues.
///
/// ```
/// use crm_triage::issue::ValidationIssue;
/// use crm_triage::prompt::build_repair;
///
/// let issue = ValidationIssue::error("columns_to_keep.email.suggested_field_label", "bad label")
///     .with_suggestion("People - Email");
/// let text = build_repair(r#"{"columns_to_keep": []}"#, &[issue]);
/// assert!(text.contains(
///     "1. columns_to_keep.email.suggested_field_label: bad label (suggestion: People - Email)"
/// ));
/// assert!(text.contains(r#"{"columns_to_keep": []}"#));
/// ```
pub fn build_repair(original_response: &str, issues: &[ValidationIssue]) -> String {
    render_repair(original_response, &issue_messages(issues))
}

/// Original user prompt with the repair section appended.
pub fn append_repair(user_prompt: &str, repair: &str) -> String {
    format!("{user_prompt}{REPAIR_SEPARATOR}{repair}")
}
