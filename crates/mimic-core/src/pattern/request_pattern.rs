//! Request patterns: composite matchers over every request attribute.
//!
//! A `RequestPattern` is the persisted description; `CompiledRequestPattern`
//! is what the selector evaluates. Matching is AND across constrained
//! attributes. The composite distance is the mean over the attributes the
//! pattern constrains, with method and URL always counted and each
//! attribute group (headers, query, cookies, body, custom) contributing a
//! single distance regardless of how many sub-patterns it holds.

use super::compiled::CompiledValuePattern;
use super::custom::{CustomMatcher, CustomMatcherRegistry};
use super::match_result::MatchResult;
use super::string_pattern::StringValuePattern;
use super::url::{CompiledUrlPattern, UrlPattern};
use crate::error::MappingError;
use crate::request::Request;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// HTTP method constraint.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(from = "String", into = "String")]
pub enum RequestMethod {
    #[default]
    Any,
    Method(String),
}

impl RequestMethod {
    pub fn of(method: impl AsRef<str>) -> Self {
        Self::from(method.as_ref().to_string())
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Any => "ANY",
            Self::Method(m) => m,
        }
    }
}

impl From<String> for RequestMethod {
    fn from(method: String) -> Self {
        if method.eq_ignore_ascii_case("any") {
            Self::Any
        } else {
            Self::Method(method)
        }
    }
}

impl From<RequestMethod> for String {
    fn from(method: RequestMethod) -> Self {
        method.as_str().to_string()
    }
}

/// Reference to a named custom matcher plus its parameters.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CustomMatcherRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub parameters: Value,
}

/// Declarative description of the requests a mapping serves.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(try_from = "RequestPatternRaw", into = "RequestPatternRaw")]
pub struct RequestPattern {
    pub method: RequestMethod,
    pub url: UrlPattern,
    pub headers: BTreeMap<String, StringValuePattern>,
    pub query_parameters: BTreeMap<String, StringValuePattern>,
    pub cookies: BTreeMap<String, StringValuePattern>,
    pub body_patterns: Vec<StringValuePattern>,
    pub custom_matcher: Option<CustomMatcherRef>,
    /// `false` only for the sentinel pattern, which never matches
    configured: bool,
}

impl Default for RequestPattern {
    fn default() -> Self {
        Self::new(RequestMethod::Any, UrlPattern::Any)
    }
}

impl RequestPattern {
    pub fn new(method: RequestMethod, url: UrlPattern) -> Self {
        Self {
            method,
            url,
            headers: BTreeMap::new(),
            query_parameters: BTreeMap::new(),
            cookies: BTreeMap::new(),
            body_patterns: Vec::new(),
            custom_matcher: None,
            configured: true,
        }
    }

    /// Pattern that matches every request.
    pub fn any() -> Self {
        Self::default()
    }

    /// Sentinel pattern that never matches any request.
    pub fn not_configured() -> Self {
        Self {
            configured: false,
            ..Self::default()
        }
    }

    pub fn is_configured(&self) -> bool {
        self.configured
    }

    pub fn with_header(mut self, name: impl Into<String>, pattern: StringValuePattern) -> Self {
        self.headers.insert(name.into(), pattern);
        self
    }

    pub fn with_query_parameter(
        mut self,
        name: impl Into<String>,
        pattern: StringValuePattern,
    ) -> Self {
        self.query_parameters.insert(name.into(), pattern);
        self
    }

    pub fn with_cookie(mut self, name: impl Into<String>, pattern: StringValuePattern) -> Self {
        self.cookies.insert(name.into(), pattern);
        self
    }

    pub fn with_body(mut self, pattern: StringValuePattern) -> Self {
        self.body_patterns.push(pattern);
        self
    }

    pub fn with_custom_matcher(mut self, name: impl Into<String>, parameters: Value) -> Self {
        self.custom_matcher = Some(CustomMatcherRef {
            name: name.into(),
            parameters,
        });
        self
    }

    /// Whether the pattern constrains nothing beyond method `ANY` and any URL.
    pub fn is_catch_all(&self) -> bool {
        self.configured
            && self.method == RequestMethod::Any
            && self.url == UrlPattern::Any
            && self.headers.is_empty()
            && self.query_parameters.is_empty()
            && self.cookies.is_empty()
            && self.body_patterns.is_empty()
            && self.custom_matcher.is_none()
    }
}

/// Wire shape of a request pattern.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RequestPatternRaw {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    method: Option<RequestMethod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    url_pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    url_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    url_path_pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    url_path_template: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    headers: BTreeMap<String, StringValuePattern>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    query_parameters: BTreeMap<String, StringValuePattern>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    cookies: BTreeMap<String, StringValuePattern>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    body_patterns: Vec<StringValuePattern>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    custom_matcher: Option<CustomMatcherRef>,
}

impl TryFrom<RequestPatternRaw> for RequestPattern {
    type Error = MappingError;

    fn try_from(raw: RequestPatternRaw) -> Result<Self, Self::Error> {
        let candidates = [
            raw.url.map(UrlPattern::Url),
            raw.url_pattern.map(UrlPattern::UrlRegex),
            raw.url_path.map(UrlPattern::Path),
            raw.url_path_pattern.map(UrlPattern::PathRegex),
            raw.url_path_template.map(UrlPattern::PathTemplate),
        ];
        let mut urls: Vec<UrlPattern> = candidates.into_iter().flatten().collect();
        if urls.len() > 1 {
            let keys: Vec<&str> = urls.iter().filter_map(UrlPattern::key).collect();
            return Err(MappingError::InvalidPattern(format!(
                "request declares several URL matchers: {}",
                keys.join(", ")
            )));
        }

        Ok(Self {
            method: raw.method.unwrap_or_default(),
            url: urls.pop().unwrap_or_default(),
            headers: raw.headers,
            query_parameters: raw.query_parameters,
            cookies: raw.cookies,
            body_patterns: raw.body_patterns,
            custom_matcher: raw.custom_matcher,
            configured: true,
        })
    }
}

impl From<RequestPattern> for RequestPatternRaw {
    fn from(pattern: RequestPattern) -> Self {
        let mut raw = RequestPatternRaw {
            method: Some(pattern.method),
            headers: pattern.headers,
            query_parameters: pattern.query_parameters,
            cookies: pattern.cookies,
            body_patterns: pattern.body_patterns,
            custom_matcher: pattern.custom_matcher,
            ..Default::default()
        };
        match pattern.url {
            UrlPattern::Any => {}
            UrlPattern::Url(v) => raw.url = Some(v),
            UrlPattern::UrlRegex(v) => raw.url_pattern = Some(v),
            UrlPattern::Path(v) => raw.url_path = Some(v),
            UrlPattern::PathRegex(v) => raw.url_path_pattern = Some(v),
            UrlPattern::PathTemplate(v) => raw.url_path_template = Some(v),
        }
        raw
    }
}

/// Request attribute a match line refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "name", rename_all = "camelCase")]
pub enum Attribute {
    Method,
    Url,
    Header(String),
    QueryParameter(String),
    Cookie(String),
    Body,
    Custom(String),
}

impl Attribute {
    pub fn label(&self) -> String {
        match self {
            Self::Method => "Method".to_string(),
            Self::Url => "URL".to_string(),
            Self::Header(name) => format!("Header: {name}"),
            Self::QueryParameter(name) => format!("Query: {name}"),
            Self::Cookie(name) => format!("Cookie: {name}"),
            Self::Body => "Body".to_string(),
            Self::Custom(name) => format!("Custom matcher: {name}"),
        }
    }
}

/// Outcome of one sub-pattern against the corresponding request value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeMatch {
    pub attribute: Attribute,
    pub expected: String,
    pub actual: String,
    pub result: MatchResult,
}

/// Full evaluation of a request pattern against a request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestMatch {
    pub result: MatchResult,
    pub attributes: Vec<AttributeMatch>,
}

impl RequestMatch {
    pub fn is_exact(&self) -> bool {
        self.result.is_exact()
    }

    pub fn distance(&self) -> f64 {
        self.result.distance()
    }
}

struct CompiledCustom {
    name: String,
    matcher: Arc<dyn CustomMatcher>,
    parameters: Value,
}

impl fmt::Debug for CompiledCustom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledCustom")
            .field("name", &self.name)
            .field("parameters", &self.parameters)
            .finish()
    }
}

/// Runtime form of a `RequestPattern`.
#[derive(Debug)]
pub struct CompiledRequestPattern {
    source: RequestPattern,
    case_insensitive_method: bool,
    url: CompiledUrlPattern,
    headers: Vec<(String, CompiledValuePattern)>,
    query_parameters: Vec<(String, CompiledValuePattern)>,
    cookies: Vec<(String, CompiledValuePattern)>,
    body: Vec<CompiledValuePattern>,
    custom: Option<CompiledCustom>,
}

fn compile_named(
    patterns: &BTreeMap<String, StringValuePattern>,
) -> Result<Vec<(String, CompiledValuePattern)>, MappingError> {
    patterns
        .iter()
        .map(|(name, pattern)| Ok((name.clone(), CompiledValuePattern::compile(pattern)?)))
        .collect()
}

/// Best result over every value of a multi-valued attribute.
fn match_multi(pattern: &CompiledValuePattern, values: &[&str]) -> MatchResult {
    if values.is_empty() {
        return pattern.match_value(None);
    }
    MatchResult::best(values.iter().map(|v| pattern.match_value(Some(v))))
}

/// Evaluate a group of named patterns, contributing one aggregated distance.
fn match_group<'r>(
    patterns: &[(String, CompiledValuePattern)],
    values_of: impl Fn(&str) -> Vec<&'r str>,
    attribute: impl Fn(String) -> Attribute,
    attributes: &mut Vec<AttributeMatch>,
    groups: &mut Vec<MatchResult>,
) {
    if patterns.is_empty() {
        return;
    }
    let mut results = Vec::with_capacity(patterns.len());
    for (name, pattern) in patterns {
        let values = values_of(name);
        let result = match_multi(pattern, &values);
        results.push(result.clone());
        attributes.push(AttributeMatch {
            attribute: attribute(name.clone()),
            expected: pattern.describe(),
            actual: values.join(", "),
            result,
        });
    }
    groups.push(MatchResult::aggregate(&results));
}

impl CompiledRequestPattern {
    /// Compile a pattern, resolving custom matcher references.
    pub fn compile(
        pattern: &RequestPattern,
        custom_matchers: &CustomMatcherRegistry,
    ) -> Result<Self, MappingError> {
        let custom = match &pattern.custom_matcher {
            Some(reference) => {
                let matcher = custom_matchers
                    .get(&reference.name)
                    .ok_or_else(|| MappingError::UnknownCustomMatcher(reference.name.clone()))?;
                Some(CompiledCustom {
                    name: reference.name.clone(),
                    matcher,
                    parameters: reference.parameters.clone(),
                })
            }
            None => None,
        };

        Ok(Self {
            source: pattern.clone(),
            case_insensitive_method: false,
            url: CompiledUrlPattern::compile(&pattern.url)?,
            headers: compile_named(&pattern.headers)?,
            query_parameters: compile_named(&pattern.query_parameters)?,
            cookies: compile_named(&pattern.cookies)?,
            body: pattern
                .body_patterns
                .iter()
                .map(CompiledValuePattern::compile)
                .collect::<Result<_, _>>()?,
            custom,
        })
    }

    /// Compare methods ignoring ASCII case.
    pub fn with_case_insensitive_method(mut self, enabled: bool) -> Self {
        self.case_insensitive_method = enabled;
        self
    }

    pub fn source(&self) -> &RequestPattern {
        &self.source
    }

    fn method_matches(&self, method: &str) -> bool {
        match &self.source.method {
            RequestMethod::Any => true,
            RequestMethod::Method(expected) if self.case_insensitive_method => {
                expected.eq_ignore_ascii_case(method)
            }
            RequestMethod::Method(expected) => expected == method,
        }
    }

    /// Fast boolean check used on the selection path.
    ///
    /// Agrees with `match_request(..).is_exact()` but stops at the first
    /// failing attribute and builds no diagnostics.
    pub fn is_match(&self, request: &Request) -> bool {
        self.source.configured
            && self.method_matches(request.method())
            && self.url.is_match(request)
            && self
                .headers
                .iter()
                .all(|(name, p)| match_multi(p, &request.header_values(name)).is_exact())
            && self
                .query_parameters
                .iter()
                .all(|(name, p)| match_multi(p, &request.query_values(name)).is_exact())
            && self
                .cookies
                .iter()
                .all(|(name, p)| match_multi(p, &request.cookie_values(name)).is_exact())
            && self
                .body
                .iter()
                .all(|p| p.match_body(request.body()).is_exact())
            && self
                .custom
                .as_ref()
                .map_or(true, |c| c.matcher.matches(request, &c.parameters).is_exact())
    }

    /// Evaluate every attribute, producing a graded result plus per-attribute lines.
    pub fn match_request(&self, request: &Request) -> RequestMatch {
        if !self.source.configured {
            return RequestMatch {
                result: MatchResult::no_match().with_description("mapping is not configured"),
                attributes: Vec::new(),
            };
        }

        let mut attributes = Vec::new();
        // One distance per constrained attribute group
        let mut groups = Vec::new();

        let method = MatchResult::from_bool(self.method_matches(request.method()));
        groups.push(method.clone());
        attributes.push(AttributeMatch {
            attribute: Attribute::Method,
            expected: self.source.method.as_str().to_string(),
            actual: request.method().to_string(),
            result: method,
        });

        let url = self.url.match_request(request);
        groups.push(url.clone());
        attributes.push(AttributeMatch {
            attribute: Attribute::Url,
            expected: self.source.url.describe(),
            actual: self.url.target(request).to_string(),
            result: url,
        });

        match_group(
            &self.headers,
            |name| request.header_values(name),
            Attribute::Header,
            &mut attributes,
            &mut groups,
        );
        match_group(
            &self.query_parameters,
            |name| request.query_values(name),
            Attribute::QueryParameter,
            &mut attributes,
            &mut groups,
        );
        match_group(
            &self.cookies,
            |name| request.cookie_values(name),
            Attribute::Cookie,
            &mut attributes,
            &mut groups,
        );

        if !self.body.is_empty() {
            let actual = request.body_text().into_owned();
            let mut results = Vec::with_capacity(self.body.len());
            for pattern in &self.body {
                let result = pattern.match_body(request.body());
                results.push(result.clone());
                attributes.push(AttributeMatch {
                    attribute: Attribute::Body,
                    expected: pattern.describe(),
                    actual: actual.clone(),
                    result,
                });
            }
            groups.push(MatchResult::aggregate(&results));
        }

        if let Some(custom) = &self.custom {
            let result = custom.matcher.matches(request, &custom.parameters);
            groups.push(result.clone());
            attributes.push(AttributeMatch {
                attribute: Attribute::Custom(custom.name.clone()),
                expected: custom.parameters.to_string(),
                actual: String::new(),
                result,
            });
        }

        RequestMatch {
            result: MatchResult::aggregate(&groups),
            attributes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn compile(pattern: &RequestPattern) -> CompiledRequestPattern {
        CompiledRequestPattern::compile(pattern, &CustomMatcherRegistry::new()).unwrap()
    }

    fn get_status() -> RequestPattern {
        RequestPattern::new(RequestMethod::of("GET"), UrlPattern::Url("/status".to_string()))
    }

    #[test]
    fn test_request_pattern_serde() {
        let pattern: RequestPattern = serde_json::from_value(json!({
            "method": "POST",
            "urlPath": "/orders",
            "headers": {"Content-Type": {"contains": "json"}},
            "queryParameters": {"dryRun": {"absent": true}},
            "bodyPatterns": [{"matchesJsonPath": "$.sku"}]
        }))
        .unwrap();

        assert_eq!(pattern.method, RequestMethod::of("POST"));
        assert_eq!(pattern.url, UrlPattern::Path("/orders".to_string()));
        assert_eq!(pattern.headers.len(), 1);
        assert_eq!(pattern.body_patterns.len(), 1);

        let back = serde_json::to_value(&pattern).unwrap();
        assert_eq!(back["urlPath"], "/orders");
        assert_eq!(back["queryParameters"]["dryRun"]["absent"], true);
    }

    #[test]
    fn test_request_pattern_defaults_to_any() {
        let pattern: RequestPattern = serde_json::from_value(json!({})).unwrap();
        assert!(pattern.is_catch_all());
        assert_eq!(pattern.method, RequestMethod::Any);
    }

    #[test]
    fn test_request_pattern_rejects_several_urls() {
        let result: Result<RequestPattern, _> =
            serde_json::from_value(json!({"url": "/a", "urlPath": "/a"}));
        assert!(result.unwrap_err().to_string().contains("several URL matchers"));
    }

    #[test]
    fn test_exact_match_requires_every_attribute() {
        let pattern = compile(
            &get_status().with_header("X-Debug", StringValuePattern::equal_to("true")),
        );
        let with_header = Request::new("GET", "/status").with_header("x-debug", "true");
        let without_header = Request::new("GET", "/status");

        assert!(pattern.is_match(&with_header));
        assert!(pattern.match_request(&with_header).is_exact());
        assert!(!pattern.is_match(&without_header));
        assert!(!pattern.match_request(&without_header).is_exact());
    }

    #[test]
    fn test_composite_distance_is_mean_of_groups() {
        // Three groups: method (match), URL (match), headers (mean of two)
        let pattern = compile(
            &get_status()
                .with_header("A", StringValuePattern::contains("x"))
                .with_header("B", StringValuePattern::contains("y")),
        );
        let request = Request::new("GET", "/status").with_header("A", "x");
        let result = pattern.match_request(&request);

        assert!(!result.is_exact());
        let expected = (0.0 + 0.0 + 0.5) / 3.0;
        assert!((result.distance() - expected).abs() < 1e-9);
        assert_eq!(result.attributes.len(), 4);
    }

    #[test]
    fn test_multi_valued_header_best_value_wins() {
        let pattern = compile(
            &RequestPattern::any().with_header("Accept", StringValuePattern::contains("json")),
        );
        let request = Request::new("GET", "/")
            .with_header("Accept", "text/html")
            .with_header("Accept", "application/json");
        assert!(pattern.is_match(&request));
    }

    #[test]
    fn test_query_and_cookie_patterns() {
        let pattern = compile(
            &RequestPattern::any()
                .with_query_parameter("page", StringValuePattern::matches("[0-9]+"))
                .with_cookie("session", StringValuePattern::equal_to("abc")),
        );
        let ok = Request::new("GET", "/items?page=2").with_header("Cookie", "session=abc");
        let bad = Request::new("GET", "/items?page=two").with_header("Cookie", "session=abc");
        assert!(pattern.is_match(&ok));
        assert!(!pattern.is_match(&bad));
    }

    #[test]
    fn test_method_case_sensitivity() {
        let pattern = compile(&RequestPattern::new(RequestMethod::of("GET"), UrlPattern::Any));
        assert!(!pattern.is_match(&Request::new("get", "/")));

        let relaxed = pattern.with_case_insensitive_method(true);
        assert!(relaxed.is_match(&Request::new("get", "/")));
    }

    #[test]
    fn test_not_configured_never_matches() {
        let pattern = compile(&RequestPattern::not_configured());
        let request = Request::new("GET", "/");
        assert!(!pattern.is_match(&request));
        let result = pattern.match_request(&request);
        assert!(!result.is_exact());
        assert_eq!(result.distance(), 1.0);
    }

    #[test]
    fn test_unknown_custom_matcher_is_configuration_error() {
        let pattern = RequestPattern::any().with_custom_matcher("nope", Value::Null);
        let result = CompiledRequestPattern::compile(&pattern, &CustomMatcherRegistry::new());
        assert!(matches!(result, Err(MappingError::UnknownCustomMatcher(name)) if name == "nope"));
    }

    struct BodyLength;

    impl CustomMatcher for BodyLength {
        fn name(&self) -> &str {
            "body-length"
        }

        fn matches(&self, request: &Request, parameters: &Value) -> MatchResult {
            let max = parameters["max"].as_u64().unwrap_or(0) as usize;
            MatchResult::from_bool(request.body().len() <= max)
        }
    }

    #[test]
    fn test_custom_matcher_participates() {
        let registry = CustomMatcherRegistry::new().with(BodyLength);
        let pattern = RequestPattern::any().with_custom_matcher("body-length", json!({"max": 3}));
        let compiled = CompiledRequestPattern::compile(&pattern, &registry).unwrap();

        assert!(compiled.is_match(&Request::new("POST", "/").with_body("abc")));
        assert!(!compiled.is_match(&Request::new("POST", "/").with_body("abcd")));
        let result = compiled.match_request(&Request::new("POST", "/").with_body("abcd"));
        assert!(result
            .attributes
            .iter()
            .any(|a| a.attribute == Attribute::Custom("body-length".to_string())));
    }

    #[test]
    fn test_match_is_idempotent() {
        let pattern = compile(&get_status().with_body(StringValuePattern::equal_to_json(
            json!({"a": 1}),
        )));
        let request = Request::new("GET", "/status").with_body(r#"{"a": 2}"#);
        assert_eq!(pattern.match_request(&request), pattern.match_request(&request));
    }
}
