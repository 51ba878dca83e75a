//! Validation of persisted stub mapping documents.
//!
//! Checks run in two passes. The first pass looks at each mapping on its
//! own: document shape, deserialization and pattern compilation (invalid
//! regexes, JSONPath and XPath expressions, URL templates). The second
//! pass runs the engine's static analysis over every mapping that loaded,
//! in load order, to find mappings that can never be served.

use crate::types::{LintIssue, LintOptions, LintResult, MappingRef};
use mimic_core::mapping::{analyze_mappings, StubMapping, WarningType};
use mimic_core::pattern::{
    CompiledRequestPattern, CustomMatcher, CustomMatcherRegistry, MatchResult,
};
use mimic_core::Request;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::debug;

const KNOWN_KEYS: &[&str] = &[
    "id",
    "uuid",
    "name",
    "request",
    "response",
    "priority",
    "scenarioName",
    "requiredScenarioState",
    "newScenarioState",
    "metadata",
];

/// A mapping that passed the per-mapping checks, with where it came from.
#[derive(Debug, Clone)]
pub struct LoadedMapping {
    pub file: PathBuf,
    pub index: usize,
    pub mapping: StubMapping,
}

impl LoadedMapping {
    fn reference(&self) -> MappingRef {
        MappingRef {
            index: self.index,
            name: Some(self.mapping.display_name()),
        }
    }

    fn location(&self) -> String {
        format!("mappings[{}]", self.index)
    }
}

/// Stands in for a server-provided matcher so patterns naming it compile.
struct DeclaredMatcher(String);

impl CustomMatcher for DeclaredMatcher {
    fn name(&self) -> &str {
        &self.0
    }

    fn matches(&self, _request: &Request, _parameters: &Value) -> MatchResult {
        MatchResult::exact_match()
    }
}

fn declared_matchers(options: &LintOptions) -> CustomMatcherRegistry {
    let mut registry = CustomMatcherRegistry::new();
    for name in &options.custom_matchers {
        registry.register(std::sync::Arc::new(DeclaredMatcher(name.clone())));
    }
    registry
}

/// Split a mappings document into its mapping objects.
///
/// Accepts a single mapping, an array of mappings, or `{"mappings": [...]}`.
fn mapping_values<'a>(
    file: &Path,
    document: &'a Value,
    result: &mut LintResult,
) -> Vec<&'a Value> {
    match document {
        Value::Array(items) => items.iter().collect(),
        Value::Object(map) => match map.get("mappings") {
            Some(Value::Array(items)) => items.iter().collect(),
            Some(_) => {
                result.add_issue(
                    LintIssue::error("E003", "'mappings' must be an array", file)
                        .with_location("mappings"),
                );
                Vec::new()
            }
            None => vec![document],
        },
        _ => {
            result.add_issue(
                LintIssue::error(
                    "E003",
                    "Document must be a mapping object, an array of mappings or {\"mappings\": [...]}",
                    file,
                ),
            );
            Vec::new()
        }
    }
}

/// Run the per-mapping checks on a parsed document.
///
/// Returns the mappings that would register successfully.
pub fn validate_document(
    file: &Path,
    document: &Value,
    result: &mut LintResult,
    options: &LintOptions,
) -> Vec<LoadedMapping> {
    let matchers = declared_matchers(options);
    mapping_values(file, document, result)
        .into_iter()
        .enumerate()
        .filter_map(|(index, value)| {
            validate_mapping(file, index, value, &matchers, result, options)
        })
        .collect()
}

fn check_keys(file: &Path, object: &Map<String, Value>, location: &str, result: &mut LintResult) {
    if !object.contains_key("request") {
        result.add_issue(
            LintIssue::error("E005", "Mapping is missing 'request'", file)
                .with_location(location)
                .with_suggestion(
                    "Add a request pattern, e.g. {\"method\": \"GET\", \"url\": \"/\"}",
                ),
        );
    }
    if !object.contains_key("response") {
        result.add_issue(
            LintIssue::warning("W001", "Mapping has no 'response'", file)
                .with_location(location)
                .with_suggestion("Matching requests will be served an empty response"),
        );
    }
    for key in object.keys() {
        if !KNOWN_KEYS.contains(&key.as_str()) {
            result.add_issue(
                LintIssue::warning(
                    "W002",
                    format!("Unknown mapping field '{key}' is ignored"),
                    file,
                )
                .with_location(format!("{location}.{key}")),
            );
        }
    }
}

/// Validate one mapping object.
pub fn validate_mapping(
    file: &Path,
    index: usize,
    value: &Value,
    matchers: &CustomMatcherRegistry,
    result: &mut LintResult,
    options: &LintOptions,
) -> Option<LoadedMapping> {
    let location = format!("mappings[{index}]");
    let Some(object) = value.as_object() else {
        result.add_issue(
            LintIssue::error("E004", "Mapping must be a JSON object", file).with_location(location),
        );
        return None;
    };
    check_keys(file, object, &location, result);
    if !object.contains_key("request") {
        return None;
    }

    let mapping: StubMapping = match serde_json::from_value(value.clone()) {
        Ok(mapping) => mapping,
        Err(e) => {
            result.add_issue(
                LintIssue::error("E006", format!("Invalid mapping: {e}"), file)
                    .with_location(location)
                    .with_mapping(MappingRef { index, name: None }),
            );
            return None;
        }
    };
    let reference = MappingRef {
        index,
        name: Some(mapping.display_name()),
    };

    // Without a declared matcher list, custom matcher names cannot be checked
    let mut pattern = mapping.request.clone();
    if let Some(custom) = &pattern.custom_matcher {
        if options.custom_matchers.is_empty() {
            result.add_issue(
                LintIssue::info(
                    "I001",
                    format!("Custom matcher '{}' cannot be checked offline", custom.name),
                    file,
                )
                .with_location(format!("{location}.request.customMatcher"))
                .with_mapping(reference.clone())
                .with_suggestion(
                    "Pass --custom-matcher to declare the matchers your server provides",
                ),
            );
            pattern.custom_matcher = None;
        }
    }

    if let Err(e) = CompiledRequestPattern::compile(&pattern, matchers) {
        result.add_issue(
            LintIssue::error("E007", e.to_string(), file)
                .with_location(format!("{location}.request"))
                .with_mapping(reference),
        );
        return None;
    }

    if options.verbose {
        debug!("{}: {location} ({}) is valid", file.display(), mapping.display_name());
    }
    result.mappings_checked += 1;
    Some(LoadedMapping {
        file: file.to_path_buf(),
        index,
        mapping,
    })
}

fn classify(warning_type: WarningType) -> (&'static str, bool, &'static str) {
    match warning_type {
        WarningType::DuplicateId => (
            "E010",
            true,
            "Give each mapping a unique 'id' (or omit it to have one generated)",
        ),
        WarningType::ExactDuplicate => (
            "W010",
            false,
            "Remove the duplicate, or gate one of them by scenario state",
        ),
        WarningType::Shadowed => (
            "W011",
            false,
            "Give the catch-all a higher 'priority' value so it acts as a fallback",
        ),
        WarningType::CatchAll => (
            "W012",
            false,
            "Add a method or URL constraint unless a fallback is intended",
        ),
        WarningType::ScenarioStateWithoutName => (
            "W013",
            false,
            "Add 'scenarioName', or remove the scenario state fields",
        ),
    }
}

/// Run static analysis over every loaded mapping, in load order.
pub fn validate_mapping_set(
    loaded: &[LoadedMapping],
    result: &mut LintResult,
    options: &LintOptions,
) {
    let mappings: Vec<StubMapping> = loaded.iter().map(|m| m.mapping.clone()).collect();
    let analysis = analyze_mappings(&mappings, options.default_priority);

    for warning in analysis.warnings {
        let Some(source) = loaded.get(warning.index) else {
            continue;
        };
        let (code, is_error, suggestion) = classify(warning.warning_type);
        let issue = if is_error {
            LintIssue::error(code, &warning.message, &source.file)
        } else {
            LintIssue::warning(code, &warning.message, &source.file)
        };
        let mut issue = issue
            .with_location(source.location())
            .with_mapping(source.reference())
            .with_suggestion(suggestion);
        if let Some(related) = warning
            .related_id
            .and_then(|id| loaded.iter().find(|m| m.mapping.id == id))
        {
            if related.file != source.file {
                issue.message =
                    format!("{} (defined in {})", issue.message, related.file.display());
            }
        }
        result.add_issue(issue);
    }
}
