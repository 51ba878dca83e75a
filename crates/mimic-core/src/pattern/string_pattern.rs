//! Value pattern definitions and their persisted JSON form.
//!
//! A pattern is persisted as an object carrying exactly one operator key
//! plus optional modifier keys:
//!
//! ```json
//! { "equalTo": "application/json", "caseInsensitive": true }
//! { "matchesJsonPath": { "expression": "$.user.name", "contains": "ann" } }
//! { "optional": { "matches": "v[0-9]+" } }
//! ```

use crate::error::MappingError;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A matcher over a single (possibly absent) attribute value.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(try_from = "StringValuePatternRaw", into = "StringValuePatternRaw")]
pub enum StringValuePattern {
    /// Exact equality, optionally ignoring case
    EqualTo { value: String, case_insensitive: bool },
    /// Substring present
    Contains(String),
    /// Whole value matches the regex
    Regex(String),
    /// Whole value does not match the regex
    NegativeRegex(String),
    /// Structural JSON equality
    EqualToJson {
        expected: Value,
        ignore_array_order: bool,
        ignore_extra_elements: bool,
    },
    /// JSONPath yields a non-empty result, optionally satisfying a nested pattern
    MatchesJsonPath {
        expression: String,
        value_pattern: Option<Box<StringValuePattern>>,
    },
    /// Structural XML equality
    EqualToXml(String),
    /// XPath yields a non-empty result, optionally satisfying a nested pattern
    MatchesXPath {
        expression: String,
        value_pattern: Option<Box<StringValuePattern>>,
    },
    /// Raw bytes equal the base64-decoded operand
    BinaryEqualTo(String),
    /// Attribute is not present at all
    Absent,
    /// Attribute is absent or satisfies the inner pattern
    Optional(Box<StringValuePattern>),
    /// All inner patterns must match
    And(Vec<StringValuePattern>),
    /// Any inner pattern must match
    Or(Vec<StringValuePattern>),
}

impl StringValuePattern {
    pub fn equal_to(value: impl Into<String>) -> Self {
        Self::EqualTo {
            value: value.into(),
            case_insensitive: false,
        }
    }

    pub fn equal_to_ignore_case(value: impl Into<String>) -> Self {
        Self::EqualTo {
            value: value.into(),
            case_insensitive: true,
        }
    }

    pub fn contains(value: impl Into<String>) -> Self {
        Self::Contains(value.into())
    }

    pub fn matches(regex: impl Into<String>) -> Self {
        Self::Regex(regex.into())
    }

    pub fn does_not_match(regex: impl Into<String>) -> Self {
        Self::NegativeRegex(regex.into())
    }

    pub fn equal_to_json(expected: Value) -> Self {
        Self::EqualToJson {
            expected,
            ignore_array_order: false,
            ignore_extra_elements: false,
        }
    }

    pub fn matches_json_path(expression: impl Into<String>) -> Self {
        Self::MatchesJsonPath {
            expression: expression.into(),
            value_pattern: None,
        }
    }

    pub fn equal_to_xml(expected: impl Into<String>) -> Self {
        Self::EqualToXml(expected.into())
    }

    pub fn matches_xpath(expression: impl Into<String>) -> Self {
        Self::MatchesXPath {
            expression: expression.into(),
            value_pattern: None,
        }
    }

    pub fn binary_equal_to(bytes: &[u8]) -> Self {
        Self::BinaryEqualTo(base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn absent() -> Self {
        Self::Absent
    }

    pub fn optional(inner: StringValuePattern) -> Self {
        Self::Optional(Box::new(inner))
    }

    /// Persisted operator key of this pattern.
    pub fn operator(&self) -> &'static str {
        match self {
            Self::EqualTo { .. } => "equalTo",
            Self::Contains(_) => "contains",
            Self::Regex(_) => "matches",
            Self::NegativeRegex(_) => "doesNotMatch",
            Self::EqualToJson { .. } => "equalToJson",
            Self::MatchesJsonPath { .. } => "matchesJsonPath",
            Self::EqualToXml(_) => "equalToXml",
            Self::MatchesXPath { .. } => "matchesXPath",
            Self::BinaryEqualTo(_) => "binaryEqualTo",
            Self::Absent => "absent",
            Self::Optional(_) => "optional",
            Self::And(_) => "and",
            Self::Or(_) => "or",
        }
    }

    /// Human-readable rendering used as the "expected" side of a diff.
    pub fn describe(&self) -> String {
        match self {
            Self::EqualTo {
                value,
                case_insensitive: false,
            } => value.clone(),
            Self::EqualTo {
                value,
                case_insensitive: true,
            } => format!("{value} [case-insensitive]"),
            Self::Contains(v) | Self::Regex(v) | Self::NegativeRegex(v) => {
                format!("[{}] {v}", self.operator())
            }
            Self::EqualToJson { expected, .. } => {
                let pretty =
                    serde_json::to_string_pretty(expected).unwrap_or_else(|_| expected.to_string());
                format!("[equalToJson]\n{pretty}")
            }
            Self::EqualToXml(xml) => format!("[equalToXml]\n{xml}"),
            Self::MatchesJsonPath {
                expression,
                value_pattern,
            }
            | Self::MatchesXPath {
                expression,
                value_pattern,
            } => match value_pattern {
                Some(inner) => format!("[{}] {expression} {}", self.operator(), inner.describe()),
                None => format!("[{}] {expression}", self.operator()),
            },
            Self::BinaryEqualTo(encoded) => format!("[binaryEqualTo] {encoded}"),
            Self::Absent => "[absent]".to_string(),
            Self::Optional(inner) => format!("[optional] {}", inner.describe()),
            Self::And(patterns) => join_described(patterns, " AND "),
            Self::Or(patterns) => join_described(patterns, " OR "),
        }
    }
}

fn join_described(patterns: &[StringValuePattern], separator: &str) -> String {
    patterns
        .iter()
        .map(StringValuePattern::describe)
        .collect::<Vec<_>>()
        .join(separator)
}

/// Wire shape of a value pattern: one operator key plus modifiers.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StringValuePatternRaw {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    equal_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    case_insensitive: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    contains: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    matches: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    does_not_match: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    equal_to_json: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ignore_array_order: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ignore_extra_elements: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    matches_json_path: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    equal_to_xml: Option<String>,
    #[serde(
        rename = "matchesXPath",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    matches_xpath: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    binary_equal_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    absent: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    optional: Option<Box<StringValuePattern>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    and: Option<Vec<StringValuePattern>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    or: Option<Vec<StringValuePattern>>,
}

impl StringValuePatternRaw {
    fn operators(&self) -> Vec<&'static str> {
        let present = [
            ("equalTo", self.equal_to.is_some()),
            ("contains", self.contains.is_some()),
            ("matches", self.matches.is_some()),
            ("doesNotMatch", self.does_not_match.is_some()),
            ("equalToJson", self.equal_to_json.is_some()),
            ("matchesJsonPath", self.matches_json_path.is_some()),
            ("equalToXml", self.equal_to_xml.is_some()),
            ("matchesXPath", self.matches_xpath.is_some()),
            ("binaryEqualTo", self.binary_equal_to.is_some()),
            ("absent", self.absent.is_some()),
            ("optional", self.optional.is_some()),
            ("and", self.and.is_some()),
            ("or", self.or.is_some()),
        ];
        present
            .into_iter()
            .filter_map(|(name, is_set)| is_set.then_some(name))
            .collect()
    }
}

impl TryFrom<StringValuePatternRaw> for StringValuePattern {
    type Error = MappingError;

    fn try_from(raw: StringValuePatternRaw) -> Result<Self, Self::Error> {
        let operators = raw.operators();
        match operators.len() {
            0 => {
                return Err(MappingError::InvalidPattern(
                    "pattern has no operator (expected one of equalTo, contains, matches, ...)"
                        .to_string(),
                ))
            }
            1 => {}
            _ => {
                return Err(MappingError::InvalidPattern(format!(
                    "pattern has several operators: {}",
                    operators.join(", ")
                )))
            }
        }

        if let Some(value) = raw.equal_to {
            return Ok(Self::EqualTo {
                value,
                case_insensitive: raw.case_insensitive.unwrap_or(false),
            });
        }
        if let Some(value) = raw.contains {
            return Ok(Self::Contains(value));
        }
        if let Some(regex) = raw.matches {
            return Ok(Self::Regex(regex));
        }
        if let Some(regex) = raw.does_not_match {
            return Ok(Self::NegativeRegex(regex));
        }
        if let Some(expected) = raw.equal_to_json {
            // A string operand carries the JSON document as text
            let expected = match expected {
                Value::String(text) => serde_json::from_str(&text)
                    .map_err(|e| MappingError::InvalidJson(e.to_string()))?,
                other => other,
            };
            return Ok(Self::EqualToJson {
                expected,
                ignore_array_order: raw.ignore_array_order.unwrap_or(false),
                ignore_extra_elements: raw.ignore_extra_elements.unwrap_or(false),
            });
        }
        if let Some(operand) = raw.matches_json_path {
            let (expression, value_pattern) = parse_path_operand("matchesJsonPath", operand)?;
            return Ok(Self::MatchesJsonPath {
                expression,
                value_pattern,
            });
        }
        if let Some(xml) = raw.equal_to_xml {
            return Ok(Self::EqualToXml(xml));
        }
        if let Some(operand) = raw.matches_xpath {
            let (expression, value_pattern) = parse_path_operand("matchesXPath", operand)?;
            return Ok(Self::MatchesXPath {
                expression,
                value_pattern,
            });
        }
        if let Some(encoded) = raw.binary_equal_to {
            return Ok(Self::BinaryEqualTo(encoded));
        }
        if let Some(absent) = raw.absent {
            if !absent {
                return Err(MappingError::InvalidPattern(
                    "'absent' only accepts true".to_string(),
                ));
            }
            return Ok(Self::Absent);
        }
        if let Some(inner) = raw.optional {
            return Ok(Self::Optional(inner));
        }
        if let Some(patterns) = raw.and {
            return Ok(Self::And(non_empty("and", patterns)?));
        }
        if let Some(patterns) = raw.or {
            return Ok(Self::Or(non_empty("or", patterns)?));
        }
        Err(MappingError::InvalidPattern("unsupported pattern".to_string()))
    }
}

fn non_empty(
    operator: &str,
    patterns: Vec<StringValuePattern>,
) -> Result<Vec<StringValuePattern>, MappingError> {
    if patterns.is_empty() {
        return Err(MappingError::InvalidPattern(format!(
            "'{operator}' requires at least one pattern"
        )));
    }
    Ok(patterns)
}

/// Parses `"$.expr"` or `{ "expression": "$.expr", <nested pattern> }`.
fn parse_path_operand(
    operator: &str,
    operand: Value,
) -> Result<(String, Option<Box<StringValuePattern>>), MappingError> {
    match operand {
        Value::String(expression) => Ok((expression, None)),
        Value::Object(mut map) => {
            let expression = match map.remove("expression") {
                Some(Value::String(expression)) => expression,
                _ => {
                    return Err(MappingError::InvalidPattern(format!(
                        "'{operator}' object requires an 'expression' string"
                    )))
                }
            };
            let value_pattern = if map.is_empty() {
                None
            } else {
                Some(Box::new(serde_json::from_value(Value::Object(map))?))
            };
            Ok((expression, value_pattern))
        }
        _ => Err(MappingError::InvalidPattern(format!(
            "'{operator}' must be a string or an object"
        ))),
    }
}

fn path_operand(expression: String, value_pattern: Option<Box<StringValuePattern>>) -> Value {
    let Some(inner) = value_pattern else {
        return Value::String(expression);
    };
    match serde_json::to_value(&*inner) {
        Ok(Value::Object(mut map)) => {
            map.insert("expression".to_string(), Value::String(expression));
            Value::Object(map)
        }
        _ => Value::String(expression),
    }
}

impl From<StringValuePattern> for StringValuePatternRaw {
    fn from(pattern: StringValuePattern) -> Self {
        let mut raw = StringValuePatternRaw::default();
        match pattern {
            StringValuePattern::EqualTo {
                value,
                case_insensitive,
            } => {
                raw.equal_to = Some(value);
                raw.case_insensitive = case_insensitive.then_some(true);
            }
            StringValuePattern::Contains(value) => raw.contains = Some(value),
            StringValuePattern::Regex(regex) => raw.matches = Some(regex),
            StringValuePattern::NegativeRegex(regex) => raw.does_not_match = Some(regex),
            StringValuePattern::EqualToJson {
                expected,
                ignore_array_order,
                ignore_extra_elements,
            } => {
                raw.equal_to_json = Some(expected);
                raw.ignore_array_order = ignore_array_order.then_some(true);
                raw.ignore_extra_elements = ignore_extra_elements.then_some(true);
            }
            StringValuePattern::MatchesJsonPath {
                expression,
                value_pattern,
            } => raw.matches_json_path = Some(path_operand(expression, value_pattern)),
            StringValuePattern::EqualToXml(xml) => raw.equal_to_xml = Some(xml),
            StringValuePattern::MatchesXPath {
                expression,
                value_pattern,
            } => raw.matches_xpath = Some(path_operand(expression, value_pattern)),
            StringValuePattern::BinaryEqualTo(encoded) => raw.binary_equal_to = Some(encoded),
            StringValuePattern::Absent => raw.absent = Some(true),
            StringValuePattern::Optional(inner) => raw.optional = Some(inner),
            StringValuePattern::And(patterns) => raw.and = Some(patterns),
            StringValuePattern::Or(patterns) => raw.or = Some(patterns),
        }
        raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pattern_serde_simple_operators() {
        let pattern: StringValuePattern = serde_json::from_str(r#"{"equalTo": "test"}"#).unwrap();
        assert_eq!(pattern, StringValuePattern::equal_to("test"));

        let pattern: StringValuePattern =
            serde_json::from_str(r#"{"equalTo": "Test", "caseInsensitive": true}"#).unwrap();
        assert_eq!(pattern, StringValuePattern::equal_to_ignore_case("Test"));

        let pattern: StringValuePattern = serde_json::from_str(r#"{"contains": "api"}"#).unwrap();
        assert_eq!(pattern, StringValuePattern::contains("api"));

        let pattern: StringValuePattern =
            serde_json::from_str(r#"{"matches": "^/api/v\\d+"}"#).unwrap();
        assert_eq!(pattern, StringValuePattern::matches(r"^/api/v\d+"));

        let pattern: StringValuePattern =
            serde_json::from_str(r#"{"doesNotMatch": "x+"}"#).unwrap();
        assert_eq!(pattern, StringValuePattern::does_not_match("x+"));

        let pattern: StringValuePattern = serde_json::from_str(r#"{"absent": true}"#).unwrap();
        assert_eq!(pattern, StringValuePattern::Absent);
    }

    #[test]
    fn test_pattern_serde_json_string_operand_is_parsed() {
        let pattern: StringValuePattern = serde_json::from_str(
            r#"{"equalToJson": "{\"id\": 1}", "ignoreExtraElements": true}"#,
        )
        .unwrap();
        assert_eq!(
            pattern,
            StringValuePattern::EqualToJson {
                expected: json!({"id": 1}),
                ignore_array_order: false,
                ignore_extra_elements: true,
            }
        );
    }

    #[test]
    fn test_pattern_serde_invalid_json_operand_rejected() {
        let result: Result<StringValuePattern, _> =
            serde_json::from_str(r#"{"equalToJson": "{not json"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_pattern_serde_path_with_nested_pattern() {
        let pattern: StringValuePattern = serde_json::from_value(json!({
            "matchesJsonPath": {"expression": "$.name", "contains": "ann"}
        }))
        .unwrap();
        assert_eq!(
            pattern,
            StringValuePattern::MatchesJsonPath {
                expression: "$.name".to_string(),
                value_pattern: Some(Box::new(StringValuePattern::contains("ann"))),
            }
        );

        let back = serde_json::to_value(&pattern).unwrap();
        assert_eq!(back["matchesJsonPath"]["expression"], "$.name");
        assert_eq!(back["matchesJsonPath"]["contains"], "ann");
    }

    #[test]
    fn test_pattern_serde_combinators() {
        let pattern: StringValuePattern = serde_json::from_value(json!({
            "or": [{"equalTo": "a"}, {"optional": {"contains": "b"}}]
        }))
        .unwrap();
        assert_eq!(
            pattern,
            StringValuePattern::Or(vec![
                StringValuePattern::equal_to("a"),
                StringValuePattern::optional(StringValuePattern::contains("b")),
            ])
        );
    }

    #[test]
    fn test_pattern_requires_exactly_one_operator() {
        let none: Result<StringValuePattern, _> = serde_json::from_str(r#"{}"#);
        assert!(none.unwrap_err().to_string().contains("no operator"));

        let many: Result<StringValuePattern, _> =
            serde_json::from_str(r#"{"equalTo": "a", "contains": "b"}"#);
        assert!(many.unwrap_err().to_string().contains("several operators"));

        let empty_and: Result<StringValuePattern, _> = serde_json::from_str(r#"{"and": []}"#);
        assert!(empty_and.is_err());

        let absent_false: Result<StringValuePattern, _> =
            serde_json::from_str(r#"{"absent": false}"#);
        assert!(absent_false.is_err());
    }

    #[test]
    fn test_pattern_serializes_without_default_modifiers() {
        let value = serde_json::to_value(StringValuePattern::equal_to("x")).unwrap();
        assert_eq!(value, json!({"equalTo": "x"}));
    }

    #[test]
    fn test_describe() {
        assert_eq!(StringValuePattern::equal_to("/status").describe(), "/status");
        assert_eq!(
            StringValuePattern::contains("api").describe(),
            "[contains] api"
        );
        assert_eq!(
            StringValuePattern::optional(StringValuePattern::matches("a+")).describe(),
            "[optional] [matches] a+"
        );
        assert_eq!(StringValuePattern::Absent.describe(), "[absent]");
    }
}
