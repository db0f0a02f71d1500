//! Scores for extracted JSON against a ground-truth document.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::markdown_metrics::cer;

/// String leaves at or below this similarity earn nothing.
const STRING_MATCH_FLOOR: f64 = 0.8;
/// Numbers closer than this are equal.
const NUMERIC_TOLERANCE: f64 = 0.01;
/// Deduction per hypothesis field absent from the reference.
const EXTRA_FIELD_PENALTY: f64 = 0.1;

/// Leaf values keyed by path (`vendor.name`, `items[0].price`).
pub fn flatten(value: &Value) -> BTreeMap<String, Value> {
    let mut leaves = BTreeMap::new();
    flatten_into(value, String::new(), &mut leaves);
    leaves
}

fn flatten_into(value: &Value, path: String, leaves: &mut BTreeMap<String, Value>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let child_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", path, key)
                };
                flatten_into(child, child_path, leaves);
            }
        }
        Value::Array(items) => {
            for (i, child) in items.iter().enumerate() {
                flatten_into(child, format!("{}[{}]", path, i), leaves);
            }
        }
        leaf => {
            leaves.insert(path, leaf.clone());
        }
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Compact serialization with object keys in sorted order.
pub fn canonical_string(value: &Value) -> String {
    sorted(value).to_string()
}

fn sorted(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(key, child)| (key.clone(), sorted(child)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        other => other.clone(),
    }
}

/// Character-level similarity of the canonical serializations.
///
/// Either side being empty scores 0.
pub fn json_similarity(reference: &Value, hypothesis: &Value) -> f64 {
    if is_empty(reference) || is_empty(hypothesis) {
        return 0.0;
    }
    (1.0 - cer(&canonical_string(reference), &canonical_string(hypothesis))).max(0.0)
}

/// Credit one hypothesis leaf earns against its reference leaf.
///
/// `floor` gates string similarity: at or below it a string earns nothing.
fn leaf_score(reference: &Value, hypothesis: &Value, floor: Option<f64>) -> f64 {
    if reference == hypothesis {
        return 1.0;
    }
    match (reference, hypothesis) {
        (Value::String(a), Value::String(b)) => {
            let similarity = (1.0 - cer(&a.to_lowercase(), &b.to_lowercase())).max(0.0);
            match floor {
                Some(floor) if similarity <= floor => 0.0,
                _ => similarity,
            }
        }
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) if (a - b).abs() <= NUMERIC_TOLERANCE => 1.0,
            _ => 0.0,
        },
        _ => 0.0,
    }
}

/// Path-by-path agreement with a penalty for invented fields, in [0, 1].
pub fn semantic_json_similarity(reference: &Value, hypothesis: &Value) -> f64 {
    let reference = flatten(reference);
    let hypothesis = flatten(hypothesis);

    if reference.is_empty() {
        return if hypothesis.is_empty() { 1.0 } else { 0.0 };
    }

    let earned: f64 = reference
        .iter()
        .filter_map(|(path, expected)| {
            hypothesis
                .get(path)
                .map(|actual| leaf_score(expected, actual, Some(STRING_MATCH_FLOOR)))
        })
        .sum();
    let extra = hypothesis
        .keys()
        .filter(|path| !reference.contains_key(*path))
        .count();

    let score = earned / reference.len() as f64 - extra as f64 * EXTRA_FIELD_PENALTY;
    score.max(0.0)
}

/// Score for every reference path. Missing paths score 0.
pub fn field_level_accuracy(reference: &Value, hypothesis: &Value) -> BTreeMap<String, f64> {
    let hypothesis = flatten(hypothesis);
    flatten(reference)
        .into_iter()
        .map(|(path, expected)| {
            let score = hypothesis
                .get(&path)
                .map_or(0.0, |actual| leaf_score(&expected, actual, None));
            (path, score)
        })
        .collect()
}

/// All JSON scores for one sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonScores {
    pub cer: f64,
    pub json_similarity: f64,
    pub semantic_similarity: f64,
    pub field_accuracy: BTreeMap<String, f64>,
}

impl JsonScores {
    pub fn failed() -> Self {
        Self {
            cer: 1.0,
            json_similarity: 0.0,
            semantic_similarity: 0.0,
            field_accuracy: BTreeMap::new(),
        }
    }

    /// Mean of each score. A path missing from a sample counts as 0 for it.
    pub fn mean(scores: &[JsonScores]) -> Self {
        if scores.is_empty() {
            return Self::failed();
        }
        let n = scores.len() as f64;
        let mut field_accuracy: BTreeMap<String, f64> = BTreeMap::new();
        for sample in scores {
            for (path, score) in &sample.field_accuracy {
                *field_accuracy.entry(path.clone()).or_default() += score / n;
            }
        }
        Self {
            cer: scores.iter().map(|s| s.cer).sum::<f64>() / n,
            json_similarity: scores.iter().map(|s| s.json_similarity).sum::<f64>() / n,
            semantic_similarity: scores.iter().map(|s| s.semantic_similarity).sum::<f64>() / n,
            field_accuracy,
        }
    }
}

pub fn evaluate_json(reference: &Value, hypothesis: &Value) -> JsonScores {
    JsonScores {
        cer: cer(&canonical_string(reference), &canonical_string(hypothesis)),
        json_similarity: json_similarity(reference, hypothesis),
        semantic_similarity: semantic_json_similarity(reference, hypothesis),
        field_accuracy: field_level_accuracy(reference, hypothesis),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn invoice() -> Value {
        json!({
            "vendor": {"name": "Corner Shop"},
            "items": [{"name": "Coffee", "price": 40.0}, {"name": "Bagel", "price": 60.0}],
            "total": 100.0
        })
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_flatten_paths() {
        let leaves = flatten(&invoice());
        assert_eq!(leaves["vendor.name"], "Corner Shop");
        assert_eq!(leaves["items[1].price"], 60.0);
        assert_eq!(leaves.len(), 6);
    }

    #[test]
    fn test_json_similarity_ignores_key_order() {
        let reordered: Value =
            serde_json::from_str(r#"{"total": 100.0, "items": [{"price": 40.0, "name": "Coffee"}, {"name": "Bagel", "price": 60.0}], "vendor": {"name": "Corner Shop"}}"#)
                .unwrap();
        assert!(close(json_similarity(&invoice(), &reordered), 1.0));
        assert!(close(json_similarity(&invoice(), &json!({})), 0.0));
    }

    #[test]
    fn test_semantic_similarity_scoring() {
        assert!(close(semantic_json_similarity(&invoice(), &invoice()), 1.0));

        let mut near = invoice();
        near["total"] = json!(100.004);
        near["vendor"]["name"] = json!("corner shop");
        assert!(close(semantic_json_similarity(&invoice(), &near), 1.0));

        let mut wrong = invoice();
        wrong["vendor"]["name"] = json!("Gas Station");
        wrong["total"] = json!(150.0);
        assert!(close(semantic_json_similarity(&invoice(), &wrong), 4.0 / 6.0));

        let mut extra = invoice();
        extra["tax"] = json!(8.0);
        assert!(close(semantic_json_similarity(&invoice(), &extra), 0.9));

        assert!(close(semantic_json_similarity(&json!({}), &json!({})), 1.0));
        assert!(close(semantic_json_similarity(&json!({}), &json!({"a": 1})), 0.0));
    }

    #[test]
    fn test_field_level_accuracy() {
        let hypothesis = json!({
            "vendor": {"name": "Corner Shoq"},
            "items": [{"name": "Coffee", "price": 40.0}],
            "total": "100.00"
        });
        let fields = field_level_accuracy(&invoice(), &hypothesis);
        assert!(close(fields["items[0].price"], 1.0));
        assert!(close(fields["items[1].name"], 0.0));
        assert!(close(fields["vendor.name"], 1.0 - 1.0 / 11.0));
        assert!(close(fields["total"], 0.0));
    }

    #[test]
    fn test_mean_spreads_missing_paths() {
        let full = evaluate_json(&invoice(), &invoice());
        let empty = evaluate_json(&json!({"total": 1.0}), &json!({}));
        let mean = JsonScores::mean(&[full, empty]);
        assert!(close(mean.field_accuracy["total"], 0.5));
        assert!(close(mean.field_accuracy["vendor.name"], 0.5));
        assert!(close(mean.semantic_similarity, 0.5));
    }
}
