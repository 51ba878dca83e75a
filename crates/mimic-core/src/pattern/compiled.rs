//! Compiled value patterns.
//!
//! `StringValuePattern` is the declarative, persisted form. Before a mapping
//! is registered every pattern is compiled once into `CompiledValuePattern`:
//! regexes are built, JSONPath expressions parsed, expected documents
//! normalized and base64 operands decoded. Any failure here is a
//! configuration error; evaluation itself never fails.

use super::json::{compile_json_path, extract_json_path, JsonEquality};
use super::match_result::MatchResult;
use super::matcher::CachedValue;
use super::string_pattern::StringValuePattern;
use super::xml::{extract_xpath, validate_xpath, XmlEquality};
use crate::error::MappingError;
use base64::Engine;
use regex::Regex;
use serde_json_path::JsonPath;
use std::sync::Arc;

/// Runtime form of a value pattern.
#[derive(Debug, Clone)]
pub struct CompiledValuePattern {
    source: StringValuePattern,
    kind: CompiledKind,
}

#[derive(Debug, Clone)]
enum CompiledKind {
    EqualTo {
        expected: CachedValue,
        case_sensitive: bool,
    },
    Contains(String),
    Regex(Arc<Regex>),
    NegativeRegex(Arc<Regex>),
    EqualToJson(JsonEquality),
    JsonPath {
        path: Arc<JsonPath>,
        nested: Option<Box<CompiledValuePattern>>,
    },
    EqualToXml(XmlEquality),
    XPath {
        expression: String,
        nested: Option<Box<CompiledValuePattern>>,
    },
    Binary(Vec<u8>),
    Absent,
    Optional(Box<CompiledValuePattern>),
    And(Vec<CompiledValuePattern>),
    Or(Vec<CompiledValuePattern>),
}

/// Regexes must match the whole value, not a substring of it.
fn compile_anchored(pattern: &str) -> Result<Arc<Regex>, MappingError> {
    Regex::new(&format!("^(?:{pattern})$"))
        .map(Arc::new)
        .map_err(|source| MappingError::InvalidRegex {
            pattern: pattern.to_string(),
            source,
        })
}

fn compile_nested(
    nested: &Option<Box<StringValuePattern>>,
) -> Result<Option<Box<CompiledValuePattern>>, MappingError> {
    nested
        .as_deref()
        .map(|inner| CompiledValuePattern::compile(inner).map(Box::new))
        .transpose()
}

impl CompiledValuePattern {
    /// Compile a pattern into its runtime form.
    pub fn compile(pattern: &StringValuePattern) -> Result<Self, MappingError> {
        let kind = match pattern {
            StringValuePattern::EqualTo {
                value,
                case_insensitive,
            } => CompiledKind::EqualTo {
                expected: CachedValue::new(value.as_str()),
                case_sensitive: !case_insensitive,
            },
            StringValuePattern::Contains(value) => CompiledKind::Contains(value.clone()),
            StringValuePattern::Regex(pattern) => CompiledKind::Regex(compile_anchored(pattern)?),
            StringValuePattern::NegativeRegex(pattern) => {
                CompiledKind::NegativeRegex(compile_anchored(pattern)?)
            }
            StringValuePattern::EqualToJson {
                expected,
                ignore_array_order,
                ignore_extra_elements,
            } => CompiledKind::EqualToJson(JsonEquality::new(
                expected.clone(),
                *ignore_array_order,
                *ignore_extra_elements,
            )),
            StringValuePattern::MatchesJsonPath {
                expression,
                value_pattern,
            } => CompiledKind::JsonPath {
                path: Arc::new(compile_json_path(expression)?),
                nested: compile_nested(value_pattern)?,
            },
            StringValuePattern::EqualToXml(xml) => {
                CompiledKind::EqualToXml(XmlEquality::compile(xml)?)
            }
            StringValuePattern::MatchesXPath {
                expression,
                value_pattern,
            } => {
                validate_xpath(expression)?;
                CompiledKind::XPath {
                    expression: expression.clone(),
                    nested: compile_nested(value_pattern)?,
                }
            }
            StringValuePattern::BinaryEqualTo(encoded) => CompiledKind::Binary(
                base64::engine::general_purpose::STANDARD.decode(encoded)?,
            ),
            StringValuePattern::Absent => CompiledKind::Absent,
            StringValuePattern::Optional(inner) => {
                CompiledKind::Optional(Box::new(Self::compile(inner)?))
            }
            StringValuePattern::And(patterns) => CompiledKind::And(
                patterns.iter().map(Self::compile).collect::<Result<_, _>>()?,
            ),
            StringValuePattern::Or(patterns) => CompiledKind::Or(
                patterns.iter().map(Self::compile).collect::<Result<_, _>>()?,
            ),
        };

        Ok(Self {
            source: pattern.clone(),
            kind,
        })
    }

    /// The declarative pattern this was compiled from.
    pub fn source(&self) -> &StringValuePattern {
        &self.source
    }

    pub fn describe(&self) -> String {
        self.source.describe()
    }

    /// Whether this pattern accepts a missing attribute.
    pub fn accepts_absent(&self) -> bool {
        self.match_value(None).is_exact()
    }

    /// Evaluate against a textual attribute value (`None` when the attribute is missing).
    pub fn match_value(&self, value: Option<&str>) -> MatchResult {
        self.evaluate(value, value.map(str::as_bytes))
    }

    /// Evaluate against a request body, given as raw bytes.
    ///
    /// The body is always present (possibly empty). Text-based operators see
    /// a lossy UTF-8 rendering; `binaryEqualTo` compares the raw bytes.
    pub fn match_body(&self, body: &[u8]) -> MatchResult {
        let text = String::from_utf8_lossy(body);
        self.evaluate(Some(&text), Some(body))
    }

    fn evaluate(&self, text: Option<&str>, bytes: Option<&[u8]>) -> MatchResult {
        match (&self.kind, text) {
            (CompiledKind::Absent, value) => MatchResult::from_bool(value.is_none()),
            (CompiledKind::Optional(_), None) => MatchResult::exact_match(),
            (CompiledKind::Optional(inner), Some(_)) => inner.evaluate(text, bytes),
            (CompiledKind::And(patterns), _) => MatchResult::aggregate(
                &patterns
                    .iter()
                    .map(|p| p.evaluate(text, bytes))
                    .collect::<Vec<_>>(),
            ),
            (CompiledKind::Or(patterns), _) => {
                MatchResult::best(patterns.iter().map(|p| p.evaluate(text, bytes)))
            }

            // Every remaining operator needs a value to inspect
            (_, None) => MatchResult::no_match(),

            (
                CompiledKind::EqualTo {
                    expected,
                    case_sensitive,
                },
                Some(value),
            ) => {
                if expected.equals(value, *case_sensitive) {
                    MatchResult::exact_match()
                } else {
                    MatchResult::partial(expected.distance(value, *case_sensitive))
                }
            }
            (CompiledKind::Contains(needle), Some(value)) => {
                MatchResult::from_bool(value.contains(needle.as_str()))
            }
            (CompiledKind::Regex(regex), Some(value)) => {
                MatchResult::from_bool(regex.is_match(value))
            }
            (CompiledKind::NegativeRegex(regex), Some(value)) => {
                MatchResult::from_bool(!regex.is_match(value))
            }
            (CompiledKind::EqualToJson(equality), Some(value)) => equality.evaluate(value),
            (CompiledKind::JsonPath { path, nested }, Some(value)) => {
                match extract_json_path(value, path) {
                    Some(values) => Self::match_extracted(values, nested.as_deref()),
                    None => MatchResult::no_match().with_description("body is not valid JSON"),
                }
            }
            (CompiledKind::EqualToXml(equality), Some(value)) => equality.evaluate(value),
            (CompiledKind::XPath { expression, nested }, Some(value)) => {
                match extract_xpath(value, expression) {
                    Some(values) => Self::match_extracted(values, nested.as_deref()),
                    None => MatchResult::no_match().with_description("body is not valid XML"),
                }
            }
            (CompiledKind::Binary(expected), Some(_)) => {
                MatchResult::from_bool(bytes == Some(expected.as_slice()))
            }
        }
    }

    /// Path operators: exact when something was selected and, if a nested
    /// pattern is present, the best selected value satisfies it.
    fn match_extracted(values: Vec<String>, nested: Option<&CompiledValuePattern>) -> MatchResult {
        match nested {
            None => MatchResult::from_bool(!values.is_empty()),
            Some(inner) if values.is_empty() => inner.match_value(None),
            Some(inner) => {
                MatchResult::best(values.iter().map(|v| inner.match_value(Some(v.as_str()))))
            }
        }
    }
}
