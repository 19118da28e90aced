//! Value comparison and cross-field consistency checks

use crate::extraction::visual::normalize_score;
use serde_json::{Map, Value};
use std::collections::HashSet;

/// Top-level keys a model may use to report its own confidence
pub const CONFIDENCE_KEYS: [&str; 4] = [
    "confidence",
    "confidence_score",
    "extraction_confidence",
    "overall_confidence",
];

pub fn is_confidence_key(key: &str) -> bool {
    CONFIDENCE_KEYS.contains(&key)
}

/// The model's self-reported confidence in `[0, 1]`, if present
pub fn reported_confidence(value: &Value) -> Option<f64> {
    let object = value.as_object()?;
    CONFIDENCE_KEYS
        .iter()
        .find_map(|key| object.get(*key).and_then(Value::as_f64))
        .map(normalize_score)
}

/// Semantic equality used to decide whether two models agree
///
/// Numbers compare with a relative tolerance, strings ignore surrounding
/// whitespace and case; containers compare element-wise.
pub fn values_agree(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => {
                let scale = x.abs().max(y.abs()).max(1.0);
                (x - y).abs() <= 1e-6 * scale
            }
            _ => x == y,
        },
        (Value::String(x), Value::String(y)) => x.trim().eq_ignore_ascii_case(y.trim()),
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_agree(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| values_agree(x, y)))
        }
        _ => a == b,
    }
}

/// Outcome of the cross-field checks for one parsed result
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsistencyScore {
    pub passed: usize,
    pub failed: usize,
}

impl ConsistencyScore {
    pub fn total(&self) -> usize {
        self.passed + self.failed
    }
}

/// Run every applicable cross-field check on `value`
///
/// - A count field (`total_X`, `X_count`, `num_X`, `number_of_X`) must equal
///   the length of a sibling array `X` (or its plural `Xs`).
/// - `position` values within an array of objects must be unique.
pub fn consistency_checks(value: &Value) -> ConsistencyScore {
    let mut score = ConsistencyScore::default();
    walk(value, &mut score);
    score
}

fn walk(value: &Value, score: &mut ConsistencyScore) {
    match value {
        Value::Object(map) => {
            check_counts(map, score);
            for child in map.values() {
                walk(child, score);
            }
        }
        Value::Array(items) => {
            check_positions(items, score);
            for item in items {
                walk(item, score);
            }
        }
        _ => {}
    }
}

fn counted_name(key: &str) -> Option<&str> {
    key.strip_prefix("total_")
        .or_else(|| key.strip_prefix("number_of_"))
        .or_else(|| key.strip_prefix("num_"))
        .or_else(|| key.strip_suffix("_count"))
        .filter(|name| !name.is_empty())
}

fn check_counts(map: &Map<String, Value>, score: &mut ConsistencyScore) {
    for (key, value) in map {
        let Some(count) = value.as_u64() else {
            continue;
        };
        let Some(target) = counted_name(key) else {
            continue;
        };
        let sibling = map.get(target).or_else(|| map.get(&format!("{}s", target)));
        if let Some(Value::Array(items)) = sibling {
            if items.len() as u64 == count {
                score.passed += 1;
            } else {
                score.failed += 1;
            }
        }
    }
}

fn check_positions(items: &[Value], score: &mut ConsistencyScore) {
    let positions: Vec<String> = items
        .iter()
        .filter_map(|item| item.as_object()?.get("position"))
        .filter(|p| !p.is_null())
        .map(Value::to_string)
        .collect();
    if positions.len() < 2 {
        return;
    }
    let unique: HashSet<&String> = positions.iter().collect();
    if unique.len() == positions.len() {
        score.passed += 1;
    } else {
        score.failed += 1;
    }
}
