//! JSON content matching: structural equality and JSONPath extraction.

use super::match_result::MatchResult;
use crate::error::MappingError;
use serde_json::Value;
use serde_json_path::JsonPath;

/// Maximum number of difference descriptions kept for diagnostics.
const MAX_REPORTED_DIFFERENCES: usize = 5;

/// Compiled structural JSON equality.
#[derive(Debug, Clone)]
pub struct JsonEquality {
    expected: Value,
    ignore_array_order: bool,
    ignore_extra_elements: bool,
}

#[derive(Debug, Default)]
struct JsonDiff {
    nodes: usize,
    differences: usize,
    reports: Vec<String>,
}

impl JsonDiff {
    fn record(&mut self, weight: usize, report: impl FnOnce() -> String) {
        self.differences += weight;
        if self.reports.len() < MAX_REPORTED_DIFFERENCES {
            self.reports.push(report());
        }
    }
}

impl JsonEquality {
    pub fn new(expected: Value, ignore_array_order: bool, ignore_extra_elements: bool) -> Self {
        Self {
            expected,
            ignore_array_order,
            ignore_extra_elements,
        }
    }

    /// Compare a request value (as text) against the expected document.
    ///
    /// Unparseable input is a non-match with maximal distance.
    pub fn evaluate(&self, actual: &str) -> MatchResult {
        let Ok(actual) = serde_json::from_str::<Value>(actual) else {
            return MatchResult::no_match().with_description("body is not valid JSON");
        };
        let mut diff = JsonDiff::default();
        self.compare("$", &self.expected, &actual, &mut diff);

        if diff.differences == 0 {
            return MatchResult::exact_match();
        }
        let distance = diff.differences as f64 / diff.nodes.max(1) as f64;
        MatchResult::partial(distance).with_description(diff.reports.join("\n"))
    }

    fn compare(&self, path: &str, expected: &Value, actual: &Value, diff: &mut JsonDiff) {
        match (expected, actual) {
            (Value::Object(expected_map), Value::Object(actual_map)) => {
                diff.nodes += 1;
                for (key, expected_child) in expected_map {
                    let child_path = format!("{path}.{key}");
                    match actual_map.get(key) {
                        Some(actual_child) => {
                            self.compare(&child_path, expected_child, actual_child, diff)
                        }
                        None => {
                            let weight = count_nodes(expected_child);
                            diff.nodes += weight;
                            diff.record(weight, || format!("{child_path}: missing"));
                        }
                    }
                }
                if !self.ignore_extra_elements {
                    for key in actual_map.keys().filter(|k| !expected_map.contains_key(*k)) {
                        diff.nodes += 1;
                        diff.record(1, || format!("{path}.{key}: unexpected field"));
                    }
                }
            }
            (Value::Array(expected_items), Value::Array(actual_items)) => {
                diff.nodes += 1;
                if self.ignore_array_order {
                    self.compare_unordered(path, expected_items, actual_items, diff);
                } else {
                    self.compare_ordered(path, expected_items, actual_items, diff);
                }
            }
            (Value::Number(a), Value::Number(b)) => {
                diff.nodes += 1;
                if a.as_f64() != b.as_f64() {
                    diff.record(1, || format!("{path}: expected {a} but was {b}"));
                }
            }
            (expected, actual) if is_scalar(expected) && expected == actual => {
                diff.nodes += 1;
            }
            (expected, actual) => {
                let weight = count_nodes(expected);
                diff.nodes += weight;
                diff.record(weight, || format!("{path}: expected {expected} but was {actual}"));
            }
        }
    }

    fn compare_ordered(
        &self,
        path: &str,
        expected: &[Value],
        actual: &[Value],
        diff: &mut JsonDiff,
    ) {
        for (index, expected_item) in expected.iter().enumerate() {
            let item_path = format!("{path}[{index}]");
            match actual.get(index) {
                Some(actual_item) => self.compare(&item_path, expected_item, actual_item, diff),
                None => {
                    let weight = count_nodes(expected_item);
                    diff.nodes += weight;
                    diff.record(weight, || format!("{item_path}: missing"));
                }
            }
        }
        if !self.ignore_extra_elements && actual.len() > expected.len() {
            let extra = actual.len() - expected.len();
            diff.nodes += extra;
            diff.record(extra, || format!("{path}: {extra} unexpected element(s)"));
        }
    }

    fn compare_unordered(
        &self,
        path: &str,
        expected: &[Value],
        actual: &[Value],
        diff: &mut JsonDiff,
    ) {
        let mut used = vec![false; actual.len()];
        for (index, expected_item) in expected.iter().enumerate() {
            let item_path = format!("{path}[{index}]");
            // Pick the unused candidate with the fewest differences
            let best = actual
                .iter()
                .enumerate()
                .filter(|(i, _)| !used[*i])
                .map(|(i, candidate)| {
                    let mut probe = JsonDiff::default();
                    self.compare(&item_path, expected_item, candidate, &mut probe);
                    (i, probe.differences)
                })
                .min_by_key(|(_, differences)| *differences);

            match best {
                Some((i, _)) => {
                    used[i] = true;
                    self.compare(&item_path, expected_item, &actual[i], diff);
                }
                None => {
                    let weight = count_nodes(expected_item);
                    diff.nodes += weight;
                    diff.record(weight, || format!("{item_path}: missing"));
                }
            }
        }
        let extra = used.iter().filter(|u| !**u).count();
        if !self.ignore_extra_elements && extra > 0 {
            diff.nodes += extra;
            diff.record(extra, || format!("{path}: {extra} unexpected element(s)"));
        }
    }
}

fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Object(_))
}

fn count_nodes(value: &Value) -> usize {
    match value {
        Value::Array(items) => 1 + items.iter().map(count_nodes).sum::<usize>(),
        Value::Object(map) => 1 + map.values().map(count_nodes).sum::<usize>(),
        _ => 1,
    }
}

/// Parse a JSONPath expression, surfacing syntax errors as configuration errors.
pub fn compile_json_path(expression: &str) -> Result<JsonPath, MappingError> {
    JsonPath::parse(expression).map_err(|e| MappingError::InvalidJsonPath {
        expression: expression.to_string(),
        message: e.to_string(),
    })
}

/// Evaluate a JSONPath against a document given as text.
///
/// Returns `None` when the input is not valid JSON, otherwise the string
/// rendering of every selected node. An empty array selected as the only
/// node counts as an empty result.
pub fn extract_json_path(body: &str, path: &JsonPath) -> Option<Vec<String>> {
    let json: Value = serde_json::from_str(body).ok()?;
    let nodes = path.query(&json).all();

    if let [Value::Array(items)] = nodes.as_slice() {
        if items.is_empty() {
            return Some(Vec::new());
        }
    }

    Some(nodes.into_iter().map(json_to_string).collect())
}

fn json_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}
