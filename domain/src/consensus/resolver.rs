//! Consensus Resolver
//!
//! Merges every successful attempt of one stage into a single
//! [`StageResult`]. Fields on which all models agree reinforce confidence;
//! conflicting fields are settled by the configured priority order, then by
//! cross-field consistency, and otherwise flagged as unresolved (value
//! `null`) for human review. Disagreements are always recorded.
//!
//! Visual validation reports are not voted on: they are combined through
//! [`VisualReport::combine`], so validators that differ slightly on accuracy
//! still produce one confident report.

use super::checks::{consistency_checks, is_confidence_key, reported_confidence, values_agree};
use super::policy::ConsensusPolicy;
use crate::core::model::ModelId;
use crate::extraction::attempt::ExtractionAttempt;
use crate::extraction::result::{
    Candidate, FieldDisagreement, Resolution, StageResult, StageStatus,
};
use crate::extraction::stage::Stage;
use crate::extraction::visual::VisualReport;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

/// Reconciles multiple models' outputs for the same stage
#[derive(Debug, Clone, Default)]
pub struct ConsensusResolver {
    policy: ConsensusPolicy,
}

/// A successful attempt prepared for comparison
struct Contribution<'a> {
    model: &'a ModelId,
    object: &'a Map<String, Value>,
    confidence: f64,
    consistency: usize,
    /// Serialized form, the last sort key
    canonical: String,
}

type Reconciled = (Value, BTreeMap<String, f64>, Vec<FieldDisagreement>, f64);

/// Models that produced the same value for a field
struct ValueGroup<'a> {
    value: &'a Value,
    members: Vec<usize>,
}

impl ConsensusResolver {
    pub fn new(policy: ConsensusPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ConsensusPolicy {
        &self.policy
    }

    /// Reconcile all attempts of one stage run
    ///
    /// Deterministic: the same attempts (in any order) and the same policy
    /// always produce the same value, agreement and confidence.
    pub fn resolve(&self, stage: Stage, attempts: Vec<ExtractionAttempt>) -> StageResult {
        let reconciled = match stage {
            Stage::VisualValidation => self
                .reconcile_reports(&attempts)
                .or_else(|| self.reconcile(&attempts)),
            _ => self.reconcile(&attempts),
        };
        let Some((value, field_agreement, disagreements, confidence)) = reconciled else {
            return StageResult::failed(stage, attempts);
        };

        StageResult {
            stage,
            status: StageStatus::Succeeded,
            value,
            field_agreement,
            disagreements,
            attempts,
            confidence,
            budget_refused: 0,
        }
    }

    fn reconcile(&self, attempts: &[ExtractionAttempt]) -> Option<Reconciled> {
        let mut contributions: Vec<Contribution<'_>> = attempts
            .iter()
            .filter_map(|attempt| {
                let parsed = attempt.parsed.as_ref()?;
                Some(Contribution {
                    model: &attempt.model,
                    object: parsed.as_object()?,
                    confidence: reported_confidence(parsed)
                        .unwrap_or(self.policy.default_confidence),
                    consistency: consistency_checks(parsed).passed,
                    canonical: parsed.to_string(),
                })
            })
            .collect();

        if contributions.is_empty() {
            return None;
        }

        contributions.sort_by(|a, b| {
            self.policy
                .rank(a.model)
                .cmp(&self.policy.rank(b.model))
                .then_with(|| a.model.cmp(b.model))
                .then_with(|| a.canonical.cmp(&b.canonical))
        });

        let (value, field_agreement, disagreements) = if let [only] = contributions.as_slice() {
            let agreement = only
                .object
                .keys()
                .filter(|k| !is_confidence_key(k))
                .map(|k| (k.clone(), 1.0))
                .collect();
            (Value::Object(only.object.clone()), agreement, Vec::new())
        } else {
            self.merge(&contributions)
        };

        let reported: Vec<f64> = contributions.iter().map(|c| c.confidence).collect();
        let confidence = self.stage_confidence(&reported, &field_agreement);

        Some((value, field_agreement, disagreements, confidence))
    }

    /// Combine visual validation reports; `None` when no attempt holds one
    fn reconcile_reports(&self, attempts: &[ExtractionAttempt]) -> Option<Reconciled> {
        let mut reports: Vec<(&ModelId, VisualReport, f64)> = attempts
            .iter()
            .filter_map(|attempt| {
                let parsed = attempt.parsed.as_ref()?;
                let report = VisualReport::from_value(parsed)?;
                let confidence =
                    reported_confidence(parsed).unwrap_or(self.policy.default_confidence);
                Some((&attempt.model, report, confidence))
            })
            .collect();
        reports.sort_by(|a, b| {
            self.policy
                .rank(a.0)
                .cmp(&self.policy.rank(b.0))
                .then_with(|| a.0.cmp(b.0))
        });

        let parsed: Vec<VisualReport> = reports.iter().map(|(_, r, _)| r.clone()).collect();
        let combined = VisualReport::combine(&parsed)?;
        let total = reports.len() as f64;

        let (low, high) = parsed.iter().fold((1.0_f64, 0.0_f64), |(lo, hi), r| {
            (lo.min(r.accuracy), hi.max(r.accuracy))
        });
        let rerun_votes = parsed
            .iter()
            .filter(|r| r.rerun_stage == combined.rerun_stage)
            .count() as f64;

        let mut field_agreement = BTreeMap::new();
        field_agreement.insert("accuracy".to_string(), (1.0 - (high - low)).clamp(0.0, 1.0));
        field_agreement.insert("issues".to_string(), 1.0);
        field_agreement.insert("rerun_stage".to_string(), rerun_votes / total);

        let value = combined.to_value();
        let mut disagreements = Vec::new();
        if high - low > f64::EPSILON {
            disagreements.push(combined_disagreement("accuracy", &value, &reports, |r| {
                Value::from(r.accuracy)
            }));
        }
        if rerun_votes < total {
            disagreements.push(combined_disagreement("rerun_stage", &value, &reports, |r| {
                r.rerun_stage
                    .map_or(Value::Null, |s| Value::String(s.as_str().to_string()))
            }));
        }

        let confidences: Vec<f64> = reports.iter().map(|(_, _, c)| *c).collect();
        let confidence = self.stage_confidence(&confidences, &field_agreement);
        Some((value, field_agreement, disagreements, confidence))
    }

    /// Mean reported confidence, scaled by agreement and boosted per extra model
    fn stage_confidence(&self, reported: &[f64], field_agreement: &BTreeMap<String, f64>) -> f64 {
        let base = mean(reported.iter().copied()).unwrap_or(0.0);
        let agreement = mean(field_agreement.values().copied()).unwrap_or(1.0);
        let extra_models = reported.len().saturating_sub(1) as f64;
        (base * (0.5 + 0.5 * agreement) + self.policy.agreement_bonus * extra_models * agreement)
            .clamp(0.0, 1.0)
    }

    fn merge(
        &self,
        contributions: &[Contribution<'_>],
    ) -> (Value, BTreeMap<String, f64>, Vec<FieldDisagreement>) {
        let keys: BTreeSet<&String> = contributions
            .iter()
            .flat_map(|c| c.object.keys())
            .collect();

        let mut merged = Map::new();
        let mut agreement = BTreeMap::new();
        let mut disagreements = Vec::new();
        let total = contributions.len() as f64;

        for key in keys {
            if is_confidence_key(key) {
                let reported = contributions
                    .iter()
                    .filter_map(|c| c.object.get(key.as_str()).and_then(Value::as_f64));
                if let Some(avg) = mean(reported) {
                    merged.insert(key.clone(), Value::from(avg));
                }
                continue;
            }

            let groups = group_values(key, contributions);
            if let [only] = groups.as_slice() {
                merged.insert(key.clone(), only.value.clone());
                agreement.insert(key.clone(), 1.0);
                continue;
            }

            let (chosen, resolution) = self.pick(&groups, contributions);
            let candidates = contributions
                .iter()
                .map(|c| Candidate {
                    model: c.model.clone(),
                    value: c.object.get(key.as_str()).cloned().unwrap_or(Value::Null),
                })
                .collect();

            let (chosen_value, chosen_model, score) = match chosen {
                Some(index) => {
                    let group = &groups[index];
                    (
                        group.value.clone(),
                        Some(contributions[group.members[0]].model.clone()),
                        group.members.len() as f64 / total,
                    )
                }
                None => (Value::Null, None, 0.0),
            };

            merged.insert(key.clone(), chosen_value.clone());
            agreement.insert(key.clone(), score);
            disagreements.push(FieldDisagreement {
                field: key.clone(),
                chosen: chosen_value,
                chosen_model,
                candidates,
                resolution,
            });
        }

        (Value::Object(merged), agreement, disagreements)
    }

    /// Choose the winning group for a conflicting field
    fn pick(
        &self,
        groups: &[ValueGroup<'_>],
        contributions: &[Contribution<'_>],
    ) -> (Option<usize>, Resolution) {
        if self.policy.has_priority() {
            // Contributions are sorted by rank, so the group holding the
            // lowest member index holds the highest-priority model.
            let best = groups
                .iter()
                .enumerate()
                .min_by_key(|(_, g)| g.members[0])
                .map(|(i, _)| i);
            if let Some(index) = best
                && self.policy.rank(contributions[groups[index].members[0]].model)
                    < self.policy.priority.len()
            {
                return (Some(index), Resolution::Priority);
            }
        }

        let scores: Vec<usize> = groups
            .iter()
            .map(|g| {
                g.members
                    .iter()
                    .map(|&m| contributions[m].consistency)
                    .max()
                    .unwrap_or(0)
            })
            .collect();
        let top = scores.iter().copied().max().unwrap_or(0);
        let leaders: Vec<usize> = scores
            .iter()
            .enumerate()
            .filter(|(_, s)| **s == top)
            .map(|(i, _)| i)
            .collect();

        match leaders.as_slice() {
            [winner] => (Some(*winner), Resolution::ConsistencyChecks),
            _ => (None, Resolution::Unresolved),
        }
    }
}

fn combined_disagreement(
    field: &str,
    combined: &Value,
    reports: &[(&ModelId, VisualReport, f64)],
    value_of: impl Fn(&VisualReport) -> Value,
) -> FieldDisagreement {
    FieldDisagreement {
        field: field.to_string(),
        chosen: combined.get(field).cloned().unwrap_or(Value::Null),
        chosen_model: None,
        candidates: reports
            .iter()
            .map(|(model, report, _)| Candidate {
                model: (*model).clone(),
                value: value_of(report),
            })
            .collect(),
        resolution: Resolution::Combined,
    }
}

fn group_values<'a>(key: &str, contributions: &'a [Contribution<'a>]) -> Vec<ValueGroup<'a>> {
    let mut groups: Vec<ValueGroup<'a>> = Vec::new();
    for (index, contribution) in contributions.iter().enumerate() {
        let value = contribution.object.get(key).unwrap_or(&Value::Null);
        match groups.iter_mut().find(|g| values_agree(g.value, value)) {
            Some(group) => group.members.push(index),
            None => groups.push(ValueGroup {
                value,
                members: vec![index],
            }),
        }
    }
    groups
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    (count > 0).then(|| sum / count as f64)
}
