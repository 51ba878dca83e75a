//! Mimic core: the request-matching engine of an HTTP mock server.
//!
//! Given an inbound request, the engine selects the stub mapping to serve
//! (priority first, newest first among equals, gated by scenario state)
//! or reports the closest mappings when nothing matches.

// ===== Matching grammar =====
pub mod pattern;
pub mod request;

// ===== Registry and selection =====
pub mod mapping;
pub mod scenario;
pub mod selector;

// ===== Diagnostics =====
pub mod journal;
pub mod near_miss;

pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;

pub use config::EngineConfig;
pub use engine::{Registration, RequestCount, ServeOutcome, StubEngine};
pub use error::{MappingError, RegistryError, VerificationError};
pub use journal::{JournalMode, RequestJournal, ServeEvent};
pub use mapping::{MappingRegistry, StubMapping};
pub use near_miss::NearMiss;
pub use pattern::{MatchResult, RequestPattern, StringValuePattern, UrlPattern};
pub use request::{LoggedRequest, Request};
pub use scenario::{Scenario, ScenarioStore, STARTED};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::RequestMethod;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_debug_header_override() {
        let engine = StubEngine::default();
        engine
            .register_json(
                r#"[
                {"request": {"method": "GET", "url": "/status"},
                 "response": {"body": "general"}},
                {"priority": 1,
                 "request": {"method": "GET", "url": "/status",
                             "headers": {"X-Debug": {"equalTo": "true"}}},
                 "response": {"body": "debug"}}
            ]"#,
            )
            .unwrap();

        let debug = engine.serve(Request::new("GET", "/status").with_header("X-Debug", "true"));
        assert_eq!(debug.response(), Some(&json!({"body": "debug"})));

        let general = engine.serve(Request::new("GET", "/status"));
        assert_eq!(general.response(), Some(&json!({"body": "general"})));
    }

    #[test]
    fn test_shopping_cart_scenario() {
        let engine = StubEngine::default();
        engine
            .register_json(
                r#"[
                {"scenarioName": "cart", "requiredScenarioState": "Started",
                 "newScenarioState": "item-added",
                 "request": {"method": "POST", "url": "/cart"},
                 "response": {"status": 201}},
                {"scenarioName": "cart", "requiredScenarioState": "Started",
                 "request": {"method": "GET", "url": "/cart"},
                 "response": {"body": "[]"}},
                {"scenarioName": "cart", "requiredScenarioState": "item-added",
                 "request": {"method": "GET", "url": "/cart"},
                 "response": {"body": "[\"book\"]"}}
            ]"#,
            )
            .unwrap();

        let view = || engine.serve(Request::new("GET", "/cart"));
        assert_eq!(view().response(), Some(&json!({"body": "[]"})));

        engine.serve(Request::new("POST", "/cart"));
        assert_eq!(engine.scenario_state("cart").as_deref(), Some("item-added"));
        assert_eq!(view().response(), Some(&json!({"body": "[\"book\"]"})));

        engine.reset_scenarios();
        assert_eq!(view().response(), Some(&json!({"body": "[]"})));
    }

    #[test]
    fn test_optional_header() {
        let engine = StubEngine::default();
        engine
            .register_json(
                r#"{"request": {"method": "GET", "url": "/items",
                    "headers": {"X-Trace": {"optional": {"matches": "[0-9a-f]{8}"}}}},
                    "response": {}}"#,
            )
            .unwrap();

        assert!(engine.serve(Request::new("GET", "/items")).is_matched());
        assert!(engine
            .serve(Request::new("GET", "/items").with_header("X-Trace", "deadbeef"))
            .is_matched());
        assert!(!engine
            .serve(Request::new("GET", "/items").with_header("X-Trace", "nope"))
            .is_matched());
    }

    #[test]
    fn test_malformed_body_is_a_miss_not_an_error() {
        let engine = StubEngine::default();
        engine
            .register_json(
                r#"{"request": {"method": "POST", "url": "/orders",
                    "bodyPatterns": [{"matchesJsonPath": "$.items[0]"}]},
                    "response": {}}"#,
            )
            .unwrap();

        let request = Request::new("POST", "/orders").with_body("{not json");
        assert!(!engine.serve(request.clone()).is_matched());

        let misses = engine.near_misses(&request);
        assert_eq!(misses.len(), 1);
        let body = misses[0]
            .match_result
            .attributes
            .iter()
            .find(|a| a.attribute == crate::pattern::Attribute::Body)
            .unwrap();
        assert_eq!(body.result.distance(), 1.0);
    }

    fn url_strategy() -> impl Strategy<Value = String> {
        "/[a-d]{1,4}"
    }

    proptest! {
        #[test]
        fn prop_near_misses_sorted_and_minimal(
            urls in proptest::collection::vec(url_strategy(), 1..8),
            request_url in url_strategy(),
        ) {
            let engine = StubEngine::new(EngineConfig {
                near_miss_count: 3,
                ..EngineConfig::default()
            });
            for url in &urls {
                engine
                    .register(StubMapping::new(
                        RequestPattern::new(RequestMethod::of("GET"), UrlPattern::Url(url.clone())),
                        serde_json::Value::Null,
                    ))
                    .unwrap();
            }

            let request = Request::new("GET", request_url);
            let misses = engine.near_misses(&request);
            prop_assert_eq!(misses.len(), urls.len().min(3));
            for pair in misses.windows(2) {
                prop_assert!(pair[0].distance() <= pair[1].distance());
            }

            let returned: Vec<_> = misses
                .iter()
                .filter_map(|m| m.stub_mapping.as_ref().map(|s| s.id))
                .collect();
            let worst_returned = misses.last().map(|m| m.distance()).unwrap_or(0.0);
            for mapping in engine.mappings() {
                if returned.contains(&mapping.id) {
                    continue;
                }
                let compiled = engine.compile_pattern(&mapping.request).unwrap();
                prop_assert!(compiled.match_request(&request).distance() >= worst_returned);
            }
        }

        #[test]
        fn prop_matching_is_idempotent(request_url in url_strategy()) {
            let engine = StubEngine::default();
            for url in ["/a", "/ab", "/abc"] {
                engine
                    .register(StubMapping::new(
                        RequestPattern::new(
                            RequestMethod::of("GET"),
                            UrlPattern::Url(url.to_string()),
                        ),
                        serde_json::Value::Null,
                    ))
                    .unwrap();
            }
            let request = Request::new("GET", request_url);
            let results = || -> Vec<_> {
                engine.near_misses(&request).into_iter().map(|m| m.match_result).collect()
            };
            let first = results();
            let second = results();
            prop_assert_eq!(first, second);
        }
    }
}
