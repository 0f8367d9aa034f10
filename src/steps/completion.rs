//! Completion scoring for the review step

use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

use super::StepName;
use crate::workflow::Issue;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepCompletion {
    pub step_name: StepName,
    pub percentage: u8,
    pub complete: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionReport {
    pub steps: Vec<StepCompletion>,
    pub percentage: u8,
    pub complete: bool,
    pub submission_issues: Vec<Issue>,
}

/// Share of a step's top-level keys that hold something, rounded to a whole percent.
/// Missing data, a non-object or an empty object scores zero.
pub fn step_percentage(data: Option<&Value>) -> u8 {
    let Some(object) = data.and_then(Value::as_object) else { return 0 };
    if object.is_empty() {
        return 0;
    }

    let filled = object.values().filter(|v| is_filled(v)).count();
    ((filled as f64 / object.len() as f64) * 100.0).round() as u8
}

fn is_filled(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => items.iter().any(row_has_content),
        Value::Bool(_) | Value::Number(_) | Value::Object(_) => true,
    }
}

/// An array row counts when any of its own values is non-blank
fn row_has_content(row: &Value) -> bool {
    match row {
        Value::Object(fields) => fields.values().any(|v| !is_blank(v)),
        Value::Array(items) => items.iter().any(|v| !is_blank(v)),
        other => !is_blank(other),
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Score every scored step; the overall figure is their rounded mean
pub fn evaluate(steps: &HashMap<StepName, Value>, submission_issues: Vec<Issue>) -> CompletionReport {
    let per_step: Vec<StepCompletion> = StepName::ALL
        .iter()
        .filter(|s| s.is_scored())
        .map(|step| {
            let percentage = step_percentage(steps.get(step));
            StepCompletion {
                step_name: *step,
                percentage,
                complete: percentage == 100,
            }
        })
        .collect();

    let total: u32 = per_step.iter().map(|s| s.percentage as u32).sum();
    let percentage = (total as f64 / per_step.len() as f64).round() as u8;
    let complete = per_step.iter().all(|s| s.complete);

    CompletionReport {
        steps: per_step,
        percentage,
        complete,
        submission_issues,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_or_missing_scores_zero() {
        assert_eq!(step_percentage(None), 0);
        assert_eq!(step_percentage(Some(&json!({}))), 0);
        assert_eq!(step_percentage(Some(&json!("text"))), 0);
    }

    #[test]
    fn counts_filled_keys() {
        let data = json!({
            "title": "SAT",
            "projectRef": "",
            "documentRef": null,
        });
        // one of three
        assert_eq!(step_percentage(Some(&data)), 33);

        let data = json!({ "a": "x", "b": "", "c": "y" });
        assert_eq!(step_percentage(Some(&data)), 67);
    }

    #[test]
    fn arrays_need_a_row_with_content() {
        let data = json!({
            "requirements": [{ "item": "", "test": "" }],
            "relatedDocuments": [],
        });
        assert_eq!(step_percentage(Some(&data)), 0);

        let data = json!({
            "requirements": [{ "item": "", "test": "" }, { "item": "Power", "test": "" }],
            "relatedDocuments": [],
        });
        assert_eq!(step_percentage(Some(&data)), 50);
    }

    #[test]
    fn numbers_bools_and_objects_count() {
        let data = json!({ "n": 0, "b": false, "o": {} });
        assert_eq!(step_percentage(Some(&data)), 100);
    }

    #[test]
    fn overall_is_mean_of_eight_steps() {
        let mut steps = HashMap::new();
        steps.insert(StepName::DocumentInfo, json!({ "title": "SAT" }));
        steps.insert(StepName::IntroductionScope, json!({ "introduction": "x", "scope": "" }));
        // Review data never affects the score
        steps.insert(StepName::ReviewSubmit, json!({ "notes": "" }));

        let report = evaluate(&steps, Vec::new());
        assert_eq!(report.steps.len(), 8);
        // (100 + 50) / 8 = 18.75
        assert_eq!(report.percentage, 19);
        assert!(!report.complete);
    }

    #[test]
    fn complete_only_when_every_step_is_full() {
        let steps: HashMap<_, _> = StepName::ALL
            .iter()
            .filter(|s| s.is_scored())
            .map(|s| (*s, json!({ "field": "value" })))
            .collect();

        let report = evaluate(&steps, Vec::new());
        assert_eq!(report.percentage, 100);
        assert!(report.complete);
    }
}
