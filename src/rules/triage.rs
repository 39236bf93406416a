use super::{check_label, decode, repeated, Stage, StageValidator};
use crate::catalog::{needs_connection, MAX_SKIP_COLUMNS, MIN_KEEP_RATIO};
use crate::error::Result;
use crate::issue::{IssueLog, ValidationIssue, ValidationOutcome};
use crate::model::{ObjectType, TriageResult};
use crate::schema::{triage_contract, Contract};
use serde_json::Value;
use std::collections::BTreeSet;

/// Validator for the column triage stage.
///
/// Checks that keep and skip partition the source columns exactly, that
/// labels follow the object naming convention, and flags advisory ratios.
#[derive(Debug, Clone)]
pub struct TriageRules {
    all_columns: Vec<String>,
    contract: Contract,
}

impl TriageRules {
    pub fn new(all_columns: Vec<String>) -> Result<Self> {
        Ok(Self {
            all_columns,
            contract: triage_contract()?,
        })
    }

    fn check(&self, result: &TriageResult, log: &mut IssueLog) {
        let keep_names: Vec<&str> = result
            .columns_to_keep
            .iter()
            .map(|c| c.column_name.as_str())
            .collect();
        let skip_names: Vec<&str> = result
            .columns_to_skip
            .iter()
            .map(|c| c.column_name.as_str())
            .collect();

        let lists = [("columns_to_keep", &keep_names), ("columns_to_skip", &skip_names)];
        for (set, names) in lists {
            let dupes = repeated(names.iter().copied());
            if !dupes.is_empty() {
                log.push(ValidationIssue::error(
                    set,
                    format!("columns listed more than once: {dupes:?}"),
                ));
            }
        }

        let keep: BTreeSet<&str> = keep_names.iter().copied().collect();
        let skip: BTreeSet<&str> = skip_names.iter().copied().collect();
        let all: BTreeSet<&str> = self.all_columns.iter().map(String::as_str).collect();

        let overlap: BTreeSet<&str> = keep.intersection(&skip).copied().collect();
        if !overlap.is_empty() {
            log.push(
                ValidationIssue::error(
                    "columns",
                    format!("columns listed in both keep and skip: {overlap:?}"),
                )
                .with_suggestion("put each column in exactly one of keep or skip"),
            );
        }

        let classified: BTreeSet<&str> = keep.union(&skip).copied().collect();
        let missing: BTreeSet<&str> = all.difference(&classified).copied().collect();
        if !missing.is_empty() {
            log.push(
                ValidationIssue::error("columns", format!("columns not classified: {missing:?}"))
                    .with_suggestion("classify every column as keep or skip"),
            );
        }
        let unknown: BTreeSet<&str> = classified.difference(&all).copied().collect();
        if !unknown.is_empty() {
            log.push(ValidationIssue::error(
                "columns",
                format!("columns not present in the source file: {unknown:?}"),
            ));
        }

        let total = self.all_columns.len();
        let keep_count = result.columns_to_keep.len();
        let skip_count = result.columns_to_skip.len();
        let keep_ratio = if total > 0 {
            keep_count as f64 / total as f64
        } else {
            0.0
        };

        if total > 0 && keep_ratio < MIN_KEEP_RATIO {
            let minimum = (total as f64 * MIN_KEEP_RATIO).ceil() as usize;
            log.push(
                ValidationIssue::warning(
                    "columns_to_keep",
                    format!(
                        "keep ratio {:.1}% is below the recommended {:.0}%",
                        keep_ratio * 100.0,
                        MIN_KEEP_RATIO * 100.0
                    ),
                )
                .with_suggestion(format!("keep at least {minimum} of {total} columns")),
            );
        }

        if skip_count > MAX_SKIP_COLUMNS {
            log.push(ValidationIssue::warning(
                "columns_to_skip",
                format!(
                    "{skip_count} columns skipped, more than the recommended {MAX_SKIP_COLUMNS}"
                ),
            ));
        }

        for col in &result.columns_to_keep {
            check_label(
                log,
                format!("columns_to_keep.{}.suggested_field_label", col.column_name),
                col.target_object,
                &col.suggested_field_label,
            );
        }

        if result.recommended_objects.is_empty() {
            log.push(ValidationIssue::error(
                "recommended_objects",
                "no objects recommended",
            ));
        }

        let recommended = &result.recommended_objects;
        let has_dependent = recommended.iter().any(|o| needs_connection(*o));
        let has_anchor = recommended
            .iter()
            .any(|o| matches!(o, ObjectType::People | ObjectType::Company));
        if has_dependent && !has_anchor {
            log.push(
                ValidationIssue::warning(
                    "recommended_objects",
                    "deal or lead recommended without people or company to link to",
                )
                .with_suggestion("deals and leads must be connected to people or company"),
            );
        }

        log.stat("total_columns", total);
        log.stat("keep_count", keep_count);
        log.stat("skip_count", skip_count);
        log.stat("keep_ratio", keep_ratio);
    }
}

impl StageValidator for TriageRules {
    type Output = TriageResult;

    fn stage(&self) -> Stage {
        Stage::Triage
    }

    fn validate(&self, payload: &Value) -> (Option<TriageResult>, ValidationOutcome) {
        let result: TriageResult = match decode(payload, &self.contract) {
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

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rules(columns: &[&str]) -> TriageRules {
        TriageRules::new(columns.iter().map(|c| c.to_string()).collect()).unwrap()
    }

    fn keep(name: &str, label: &str) -> Value {
        json!({
            "column_name": name,
            "target_object": "people",
            "suggested_field_label": label,
            "suggested_field_type": "text",
            "reason": "customer attribute"
        })
    }

    fn skip(name: &str) -> Value {
        json!({"column_name": name, "reason": "internal_id"})
    }

    fn payload(keeps: Vec<Value>, skips: Vec<Value>, objects: &[&str]) -> Value {
        json!({
            "columns_to_keep": keeps,
            "columns_to_skip": skips,
            "recommended_objects": objects,
        })
    }

    #[test]
    fn partition_with_low_ratio_is_valid_with_one_warning() {
        let rules = rules(&["id", "name", "email"]);
        let (typed, outcome) = rules.validate(&payload(
            vec![keep("name", "People - Name"), keep("email", "People - Email")],
            vec![skip("id")],
            &["people"],
        ));

        assert!(outcome.is_valid);
        assert!(outcome.errors.is_empty());
        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(
            outcome.warnings[0].suggestion.as_deref(),
            Some("keep at least 3 of 3 columns")
        );
        let ratio = outcome.stat("keep_ratio").and_then(Value::as_f64).unwrap();
        assert!((ratio - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(outcome.stat("total_columns"), Some(&json!(3)));

        let typed = typed.expect("valid payload decodes");
        let kept: BTreeSet<_> = typed
            .columns_to_keep
            .iter()
            .map(|c| c.column_name.as_str())
            .collect();
        let skipped: BTreeSet<_> = typed
            .columns_to_skip
            .iter()
            .map(|c| c.column_name.as_str())
            .collect();
        assert!(kept.is_disjoint(&skipped));
        assert_eq!(kept.union(&skipped).count(), 3);
    }

    #[test]
    fn column_in_both_sets_is_one_error() {
        let rules = rules(&["id", "name", "email"]);
        let (typed, outcome) = rules.validate(&payload(
            vec![keep("name", "People - Name"), keep("email", "People - Email")],
            vec![skip("id"), skip("name")],
            &["people"],
        ));

        assert!(typed.is_none());
        assert_eq!(outcome.error_count(), 1);
        assert_eq!(outcome.errors[0].field, "columns");
        assert!(outcome.errors[0].message.contains(r#"{"name"}"#));
    }

    #[test]
    fn label_without_separator_gets_canonical_suggestion() {
        let rules = rules(&["email"]);
        let (typed, outcome) = rules.validate(&payload(
            vec![keep("email", "Email")],
            vec![],
            &["people"],
        ));

        assert!(typed.is_none());
        assert_eq!(outcome.error_count(), 1);
        let err = &outcome.errors[0];
        assert_eq!(err.field, "columns_to_keep.email.suggested_field_label");
        assert_eq!(err.suggestion.as_deref(), Some("People - Email"));
    }

    #[test]
    fn missing_and_unknown_columns_are_errors() {
        let rules = rules(&["a", "b"]);
        let (_, outcome) = rules.validate(&payload(
            vec![keep("a", "People - A"), keep("z", "People - Z")],
            vec![],
            &["people"],
        ));
        let messages: Vec<_> = outcome.errors.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages.len(), 2);
        assert!(messages[0].contains(r#"{"b"}"#));
        assert!(messages[1].contains(r#"{"z"}"#));
    }

    #[test]
    fn duplicate_within_keep_is_an_error() {
        let rules = rules(&["a"]);
        let (_, outcome) = rules.validate(&payload(
            vec![keep("a", "People - A"), keep("a", "People - A")],
            vec![],
            &["people"],
        ));
        assert_eq!(outcome.error_count(), 1);
        assert_eq!(outcome.errors[0].field, "columns_to_keep");
    }

    #[test]
    fn many_skips_and_unlinked_deal_warn() {
        let cols = ["a", "b", "c", "d", "e"];
        let rules = rules(&cols);
        let mut k = keep("a", "Deal - A");
        k["target_object"] = json!("deal");
        let (typed, outcome) = rules.validate(&payload(
            vec![k],
            vec![skip("b"), skip("c"), skip("d"), skip("e")],
            &["deal"],
        ));
        assert!(typed.is_some());
        let fields: Vec<_> = outcome.warnings.iter().map(|w| w.field.as_str()).collect();
        assert_eq!(
            fields,
            vec!["columns_to_keep", "columns_to_skip", "recommended_objects"]
        );
    }

    #[test]
    fn schema_errors_skip_business_rules() {
        let rules = rules(&["a"]);
        let (typed, outcome) = rules.validate(&json!({"columns_to_keep": []}));
        assert!(typed.is_none());
        assert!(outcome.stat("schema_errors").is_some());
        assert!(outcome.stat("keep_ratio").is_none());
    }

    #[test]
    fn thinking_key_decodes_into_result() {
        let rules = rules(&["a"]);
        let mut p = payload(vec![keep("a", "People - A")], vec![], &["people"]);
        p["thinking"] = json!("only one column");
        let (typed, outcome) = rules.validate(&p);
        assert!(outcome.is_valid);
        assert!(outcome.warnings.is_empty());
        assert_eq!(typed.unwrap().thinking.as_deref(), Some("only one column"));
    }

    fn numbered(prefix: &str, n: usize) -> Vec<String> {
        (0..n).map(|i| format!("{prefix}{i}")).collect()
    }

    #[test]
    fn keep_ratio_at_threshold_and_linked_deal_do_not_warn() {
        let kept = numbered("k", 9);
        let mut cols = kept.clone();
        cols.push("id".into());
        let rules = TriageRules::new(cols).unwrap();

        let mut keeps: Vec<Value> = kept
            .iter()
            .map(|c| keep(c, &format!("People - {c}")))
            .collect();
        keeps[0]["target_object"] = json!("deal");
        keeps[0]["suggested_field_label"] = json!("Deal - k0");

        let (typed, outcome) =
            rules.validate(&payload(keeps, vec![skip("id")], &["deal", "people"]));
        assert!(typed.is_some());
        assert!(outcome.warnings.is_empty(), "{:?}", outcome.warnings);
        assert_eq!(outcome.stat("keep_ratio"), Some(&json!(0.9)));
    }

    #[test]
    fn exactly_max_skips_does_not_warn() {
        let kept = numbered("k", 27);
        let skipped = numbered("s", MAX_SKIP_COLUMNS);
        let rules = TriageRules::new(kept.iter().chain(&skipped).cloned().collect()).unwrap();

        let (typed, outcome) = rules.validate(&payload(
            kept.iter().map(|c| keep(c, &format!("People - {c}"))).collect(),
            skipped.iter().map(|c| skip(c)).collect(),
            &["people"],
        ));
        assert!(typed.is_some());
        assert!(outcome.warnings.is_empty(), "{:?}", outcome.warnings);
        assert_eq!(outcome.stat("skip_count"), Some(&json!(3)));
    }
}
