//! Visual validation report
//!
//! The comparison-only stage checks the assembled result against the image
//! and answers with `{accuracy, issues[{stage, description}], rerun_stage}`.
//! Parsing is lenient: models often answer with percentages or omit fields.
//!
//! Reports from several validators are combined rather than voted on field
//! by field: accuracy is averaged, issues are united, and the rerun stage is
//! the majority choice (earliest stage on a tie).

use super::stage::Stage;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;

/// One discrepancy the validator found
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualIssue {
    /// Stage the discrepancy belongs to, if the model said so
    pub stage: Option<Stage>,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualReport {
    /// Estimated accuracy of the assembled result in `[0, 1]`
    pub accuracy: f64,
    pub issues: Vec<VisualIssue>,
    pub rerun_stage: Option<Stage>,
}

impl VisualReport {
    /// Read a report out of a model's JSON answer
    ///
    /// Returns `None` when no accuracy value can be found.
    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let accuracy = ["accuracy", "overall_accuracy", "accuracy_score"]
            .iter()
            .find_map(|key| object.get(*key).and_then(Value::as_f64))
            .map(normalize_score)?;

        let issues = object
            .get("issues")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(parse_issue).collect())
            .unwrap_or_default();

        let rerun_stage = object
            .get("rerun_stage")
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<Stage>().ok())
            .filter(Stage::is_extraction);

        Some(Self {
            accuracy,
            issues,
            rerun_stage,
        })
    }

    /// Combine the reports of several validators
    ///
    /// Returns `None` for an empty slice. The result does not depend on the
    /// order of `reports`.
    pub fn combine(reports: &[VisualReport]) -> Option<Self> {
        if reports.is_empty() {
            return None;
        }

        let mut accuracies: Vec<f64> = reports.iter().map(|r| r.accuracy).collect();
        accuracies.sort_by(f64::total_cmp);
        let accuracy = accuracies.iter().sum::<f64>() / accuracies.len() as f64;

        let mut issues: Vec<VisualIssue> =
            reports.iter().flat_map(|r| r.issues.iter().cloned()).collect();
        issues.sort_by(|a, b| {
            a.stage
                .cmp(&b.stage)
                .then_with(|| a.description.cmp(&b.description))
        });
        issues.dedup();

        let mut votes: BTreeMap<Stage, usize> = BTreeMap::new();
        for stage in reports.iter().filter_map(|r| r.rerun_stage) {
            *votes.entry(stage).or_default() += 1;
        }
        // Stages iterate in pipeline order, so a tie goes to the earliest
        let top = votes.values().copied().max().unwrap_or(0);
        let rerun_stage = votes
            .iter()
            .find(|(_, count)| **count == top)
            .map(|(stage, _)| *stage);

        Some(Self {
            accuracy,
            issues,
            rerun_stage,
        })
    }

    /// Canonical JSON form, readable again by [`VisualReport::from_value`]
    pub fn to_value(&self) -> Value {
        let issues: Vec<Value> = self
            .issues
            .iter()
            .map(|issue| {
                json!({
                    "stage": issue.stage.map(|s| s.as_str()),
                    "description": issue.description,
                })
            })
            .collect();
        json!({
            "accuracy": self.accuracy,
            "issues": issues,
            "rerun_stage": self.rerun_stage.map(|s| s.as_str()),
        })
    }

    /// Earliest extraction stage the report asks to re-run
    pub fn target_stage(&self) -> Option<Stage> {
        if self.rerun_stage.is_some() {
            return self.rerun_stage;
        }
        self.issues
            .iter()
            .filter_map(|issue| issue.stage)
            .filter(Stage::is_extraction)
            .min()
    }

    /// Issue descriptions relevant to `stage` (unattributed issues included)
    pub fn feedback_for(&self, stage: Stage) -> Vec<String> {
        self.issues
            .iter()
            .filter(|issue| issue.stage.is_none_or(|s| s == stage))
            .map(|issue| issue.description.clone())
            .collect()
    }
}

/// Map a score given either in `[0, 1]` or as a percentage into `[0, 1]`
pub fn normalize_score(score: f64) -> f64 {
    let score = if score > 1.0 { score / 100.0 } else { score };
    score.clamp(0.0, 1.0)
}

fn parse_issue(item: &Value) -> Option<VisualIssue> {
    match item {
        Value::String(description) => Some(VisualIssue {
            stage: None,
            description: description.clone(),
        }),
        Value::Object(map) => {
            let description = map
                .get("description")
                .or_else(|| map.get("issue"))
                .and_then(Value::as_str)?
                .to_string();
            let stage = map
                .get("stage")
                .and_then(Value::as_str)
                .and_then(|s| s.parse().ok());
            Some(VisualIssue { stage, description })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_full_report() {
        let report = VisualReport::from_value(&json!({
            "accuracy": 0.82,
            "issues": [
                {"stage": "details", "description": "Price of item 3 is 2.49, not 2.99"},
                {"stage": "products", "description": "Missed a facing on shelf 2"},
                "Glare on the top shelf"
            ],
            "rerun_stage": null
        }))
        .unwrap();

        assert!((report.accuracy - 0.82).abs() < 1e-9);
        assert_eq!(report.issues.len(), 3);
        assert_eq!(report.target_stage(), Some(Stage::Products));
        assert_eq!(
            report.feedback_for(Stage::Details),
            vec![
                "Price of item 3 is 2.49, not 2.99".to_string(),
                "Glare on the top shelf".to_string()
            ]
        );
    }

    #[test]
    fn test_percentage_accuracy_and_explicit_rerun() {
        let report = VisualReport::from_value(&json!({
            "overall_accuracy": 91,
            "rerun_stage": "details"
        }))
        .unwrap();
        assert!((report.accuracy - 0.91).abs() < 1e-9);
        assert_eq!(report.target_stage(), Some(Stage::Details));
    }

    #[test]
    fn test_visual_stage_never_rerun_target() {
        let report = VisualReport::from_value(&json!({
            "accuracy": 0.5,
            "rerun_stage": "visual_validation"
        }))
        .unwrap();
        assert_eq!(report.target_stage(), None);
    }

    #[test]
    fn test_combine_averages_and_unites() {
        let first = VisualReport::from_value(&json!({
            "accuracy": 0.96,
            "issues": [{"stage": "details", "description": "Price of item 3 is 2.49"}]
        }))
        .unwrap();
        let second = VisualReport::from_value(&json!({
            "accuracy": 0.97,
            "issues": [
                {"stage": "details", "description": "Price of item 3 is 2.49"},
                "Glare on the top shelf"
            ]
        }))
        .unwrap();

        let combined = VisualReport::combine(&[first.clone(), second.clone()]).unwrap();
        assert!((combined.accuracy - 0.965).abs() < 1e-9);
        assert_eq!(combined.issues.len(), 2);
        assert_eq!(combined.rerun_stage, None);
        assert_eq!(VisualReport::combine(&[second, first]), Some(combined));
        assert_eq!(VisualReport::combine(&[]), None);
    }

    #[test]
    fn test_combine_rerun_stage_by_majority_then_earliest() {
        let report = |stage: &str| {
            VisualReport::from_value(&json!({"accuracy": 0.5, "rerun_stage": stage})).unwrap()
        };

        let majority =
            VisualReport::combine(&[report("details"), report("products"), report("details")])
                .unwrap();
        assert_eq!(majority.rerun_stage, Some(Stage::Details));

        let tie = VisualReport::combine(&[report("details"), report("products")]).unwrap();
        assert_eq!(tie.rerun_stage, Some(Stage::Products));
    }

    #[test]
    fn test_canonical_value_parses_back() {
        let report = VisualReport::from_value(&json!({
            "accuracy": 88,
            "issues": [{"stage": "products", "description": "Missed a facing"}, "Blurry"],
            "rerun_stage": "products"
        }))
        .unwrap();
        assert_eq!(VisualReport::from_value(&report.to_value()), Some(report));
    }

    #[test]
    fn test_missing_accuracy() {
        assert!(VisualReport::from_value(&json!({"issues": []})).is_none());
        assert!(VisualReport::from_value(&json!("ok")).is_none());
    }
}
