//! Stub mapping data model and its persisted JSON form.
//!
//! ```json
//! {
//!   "id": "b7c0a1f4-...",
//!   "priority": 1,
//!   "request": { "method": "GET", "url": "/status" },
//!   "response": { "status": 200, "body": "OK" },
//!   "scenarioName": "cart",
//!   "requiredScenarioState": "Started",
//!   "newScenarioState": "item-added"
//! }
//! ```

use crate::error::MappingError;
use crate::pattern::RequestPattern;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Priority applied when a mapping does not declare one.
pub const DEFAULT_PRIORITY: i32 = 5;

/// A declared request/response pair.
///
/// The response is opaque to the engine: it is handed back verbatim to
/// whatever renders responses.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StubMapping {
    #[serde(default = "Uuid::new_v4", alias = "uuid")]
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub request: RequestPattern,
    #[serde(default)]
    pub response: Value,
    /// Lower value wins
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_scenario_state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_scenario_state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl StubMapping {
    pub fn new(request: RequestPattern, response: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: None,
            request,
            response,
            priority: None,
            scenario_name: None,
            required_scenario_state: None,
            new_scenario_state: None,
            metadata: None,
        }
    }

    /// Sentinel mapping whose request pattern never matches.
    pub fn not_configured() -> Self {
        Self::new(RequestPattern::not_configured(), Value::Null)
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn in_scenario(mut self, scenario: impl Into<String>) -> Self {
        self.scenario_name = Some(scenario.into());
        self
    }

    pub fn when_scenario_state_is(mut self, state: impl Into<String>) -> Self {
        self.required_scenario_state = Some(state.into());
        self
    }

    pub fn will_set_state_to(mut self, state: impl Into<String>) -> Self {
        self.new_scenario_state = Some(state.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn effective_priority(&self, default_priority: i32) -> i32 {
        self.priority.unwrap_or(default_priority)
    }

    /// Name if present, otherwise the id.
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => self.id.to_string(),
        }
    }

    /// Whether scenario fields are set without a scenario name to attach them to.
    pub fn has_orphan_scenario_state(&self) -> bool {
        self.scenario_name.is_none()
            && (self.required_scenario_state.is_some() || self.new_scenario_state.is_some())
    }

    pub fn from_json(json: &str) -> Result<Self, MappingError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, MappingError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Parse a mappings document: a single mapping, an array of mappings, or
/// an object with a `mappings` array.
pub fn parse_mappings(json: &str) -> Result<Vec<StubMapping>, MappingError> {
    let value: Value = serde_json::from_str(json)?;
    parse_mappings_value(value)
}

pub fn parse_mappings_value(value: Value) -> Result<Vec<StubMapping>, MappingError> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .map(|item| serde_json::from_value(item).map_err(MappingError::from))
            .collect(),
        Value::Object(mut map) => match map.remove("mappings") {
            Some(Value::Array(items)) => items
                .into_iter()
                .map(|item| serde_json::from_value(item).map_err(MappingError::from))
                .collect(),
            Some(_) => Err(MappingError::InvalidPattern(
                "'mappings' must be an array".to_string(),
            )),
            None => Ok(vec![serde_json::from_value(Value::Object(map))?]),
        },
        _ => Err(MappingError::InvalidPattern(
            "mappings document must be an object or an array".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::{RequestMethod, UrlPattern};
    use serde_json::json;

    #[test]
    fn test_mapping_from_json() {
        let mapping = StubMapping::from_json(
            r#"{
                "id": "8c5db8b0-2db4-4ad7-a99f-38c9b00da3f7",
                "priority": 1,
                "request": {"method": "GET", "url": "/status"},
                "response": {"status": 200},
                "scenarioName": "cart",
                "requiredScenarioState": "Started",
                "newScenarioState": "item-added"
            }"#,
        )
        .unwrap();

        assert_eq!(
            mapping.id.to_string(),
            "8c5db8b0-2db4-4ad7-a99f-38c9b00da3f7"
        );
        assert_eq!(mapping.priority, Some(1));
        assert_eq!(mapping.request.method, RequestMethod::of("GET"));
        assert_eq!(mapping.request.url, UrlPattern::Url("/status".to_string()));
        assert_eq!(mapping.response["status"], 200);
        assert_eq!(mapping.scenario_name.as_deref(), Some("cart"));
        assert_eq!(mapping.new_scenario_state.as_deref(), Some("item-added"));
    }

    #[test]
    fn test_mapping_defaults() {
        let mapping = StubMapping::from_json(r#"{"request": {"urlPath": "/a"}}"#).unwrap();
        assert_eq!(mapping.effective_priority(DEFAULT_PRIORITY), 5);
        assert_eq!(mapping.response, Value::Null);
        assert!(!mapping.id.is_nil());
    }

    #[test]
    fn test_mapping_requires_request() {
        assert!(StubMapping::from_json(r#"{"response": {}}"#).is_err());
    }

    #[test]
    fn test_mapping_rejects_invalid_pattern() {
        let result = StubMapping::from_json(r#"{"request": {"headers": {"X": {}}}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_mapping_json_roundtrip_keeps_keys() {
        let mapping = StubMapping::new(
            RequestPattern::new(RequestMethod::of("GET"), UrlPattern::Url("/x".to_string())),
            json!({"status": 204}),
        )
        .with_priority(2)
        .in_scenario("s");

        let json: Value = serde_json::from_str(&mapping.to_json().unwrap()).unwrap();
        assert_eq!(json["request"]["url"], "/x");
        assert_eq!(json["priority"], 2);
        assert_eq!(json["scenarioName"], "s");
        assert!(json.get("requiredScenarioState").is_none());

        let back = StubMapping::from_json(&json.to_string()).unwrap();
        assert_eq!(back, mapping);
    }

    #[test]
    fn test_parse_mappings_shapes() {
        let single = parse_mappings(r#"{"request": {"url": "/a"}}"#).unwrap();
        assert_eq!(single.len(), 1);

        let array = parse_mappings(r#"[{"request": {"url": "/a"}}, {"request": {"url": "/b"}}]"#)
            .unwrap();
        assert_eq!(array.len(), 2);

        let wrapped = parse_mappings(r#"{"mappings": [{"request": {"url": "/a"}}]}"#).unwrap();
        assert_eq!(wrapped.len(), 1);

        assert!(parse_mappings(r#""nope""#).is_err());
        assert!(parse_mappings(r#"{"mappings": {}}"#).is_err());
    }

    #[test]
    fn test_orphan_scenario_state() {
        let mapping = StubMapping::new(RequestPattern::any(), Value::Null)
            .when_scenario_state_is("Started");
        assert!(mapping.has_orphan_scenario_state());
        assert!(!mapping.in_scenario("s").has_orphan_scenario_state());
    }
}
