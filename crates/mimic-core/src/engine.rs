//! The stub matching engine.
//!
//! `StubEngine` ties the registry, scenario store, selector, near-miss
//! ranker and journal together behind the API an admin layer and a
//! transport layer consume. It holds no I/O and never blocks on anything
//! but its own short-lived locks.

use crate::config::{EngineConfig, MIN_DIFF_LINE_WIDTH};
use crate::error::{MappingError, RegistryError, VerificationError};
use crate::journal::{RequestJournal, ServeEvent};
use crate::mapping::{
    analyze_mappings, parse_mappings, AnalysisResult, MappingRegistry, MappingWarning,
    RegisteredMapping, StubMapping,
};
use crate::metrics;
use crate::near_miss::{self, NearMiss};
use crate::pattern::{CompiledRequestPattern, CustomMatcherRegistry, RequestPattern};
use crate::request::{LoggedRequest, Request};
use crate::scenario::{Scenario, ScenarioStore};
use crate::selector;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Outcome of registering a mapping.
#[derive(Debug, Clone)]
pub struct Registration {
    pub id: Uuid,
    /// Analysis warnings raised for, or caused by, the new mapping
    pub warnings: Vec<MappingWarning>,
}

/// Result of serving one request.
#[derive(Debug, Clone)]
pub struct ServeOutcome {
    pub event: Arc<ServeEvent>,
    pub mapping: Option<Arc<RegisteredMapping>>,
}

impl ServeOutcome {
    pub fn is_matched(&self) -> bool {
        self.mapping.is_some()
    }

    /// Response payload of the selected mapping.
    pub fn response(&self) -> Option<&Value> {
        self.mapping.as_ref().map(|m| &m.mapping().response)
    }
}

/// How many journaled requests a verification expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestCount {
    Exactly(usize),
    AtLeast(usize),
    AtMost(usize),
}

impl RequestCount {
    pub fn accepts(&self, actual: usize) -> bool {
        match *self {
            Self::Exactly(n) => actual == n,
            Self::AtLeast(n) => actual >= n,
            Self::AtMost(n) => actual <= n,
        }
    }
}

impl fmt::Display for RequestCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exactly(n) => write!(f, "exactly {n}"),
            Self::AtLeast(n) => write!(f, "at least {n}"),
            Self::AtMost(n) => write!(f, "at most {n}"),
        }
    }
}

#[derive(Debug)]
pub struct StubEngine {
    config: EngineConfig,
    registry: MappingRegistry,
    scenarios: ScenarioStore,
    journal: RequestJournal,
}

fn clamp_config(mut config: EngineConfig) -> EngineConfig {
    if config.near_miss_count == 0 {
        warn!("'nearMissCount' of 0 raised to 1");
        config.near_miss_count = 1;
    }
    if config.diff_line_width < MIN_DIFF_LINE_WIDTH {
        warn!(
            "'diffLineWidth' of {} raised to {MIN_DIFF_LINE_WIDTH}",
            config.diff_line_width
        );
        config.diff_line_width = MIN_DIFF_LINE_WIDTH;
    }
    config
}

impl Default for StubEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl StubEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_custom_matchers(config, CustomMatcherRegistry::new())
    }

    /// Build an engine with custom matchers available to request patterns.
    ///
    /// Values that `EngineConfig::validate` would reject are raised to their
    /// minimum instead, so a config built in code never disables near misses.
    pub fn with_custom_matchers(
        config: EngineConfig,
        custom_matchers: CustomMatcherRegistry,
    ) -> Self {
        let config = clamp_config(config);
        let registry = MappingRegistry::new(config.default_priority, custom_matchers)
            .with_case_insensitive_methods(config.case_insensitive_methods);
        let journal = RequestJournal::new(config.journal.journal_mode());
        debug!(
            "Created stub engine (journal {:?}, default priority {})",
            journal.mode(),
            config.default_priority
        );
        Self {
            config,
            registry,
            scenarios: ScenarioStore::new(),
            journal,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Compile a pattern for journal queries and verification.
    pub fn compile_pattern(
        &self,
        pattern: &RequestPattern,
    ) -> Result<CompiledRequestPattern, MappingError> {
        self.registry.compile_pattern(pattern)
    }

    // ===== Registry =====

    fn register_scenario_of(&self, mapping: &StubMapping) {
        if let Some(name) = &mapping.scenario_name {
            self.scenarios.register(
                name,
                mapping
                    .required_scenario_state
                    .as_deref()
                    .into_iter()
                    .chain(mapping.new_scenario_state.as_deref()),
            );
        } else if mapping.has_orphan_scenario_state() {
            warn!(
                "Mapping {} declares scenario state without 'scenarioName'; serving it regardless of scenario state",
                mapping.display_name()
            );
        }
    }

    /// Register a new mapping.
    pub fn register(&self, mapping: StubMapping) -> Result<Registration, RegistryError> {
        let entry = self.registry.add(mapping)?;
        self.register_scenario_of(entry.mapping());
        let warnings = self.analyze().concerning(entry.id());
        for warning in &warnings {
            warn!("{}", warning.message);
        }
        Ok(Registration {
            id: entry.id(),
            warnings,
        })
    }

    /// Parse a persisted mapping document and register every mapping in it.
    ///
    /// The document is rejected as a whole: if any mapping fails to compile
    /// or reuses a registered id, nothing is registered.
    pub fn register_json(&self, json: &str) -> Result<Vec<Registration>, RegistryError> {
        let entries = self.registry.add_all(parse_mappings(json)?)?;
        for entry in &entries {
            self.register_scenario_of(entry.mapping());
        }

        let analysis = self.analyze();
        Ok(entries
            .iter()
            .map(|entry| {
                let warnings = analysis.concerning(entry.id());
                for warning in &warnings {
                    warn!("{}", warning.message);
                }
                Registration {
                    id: entry.id(),
                    warnings,
                }
            })
            .collect())
    }

    /// Replace a mapping, keeping its identity and precedence among equals.
    pub fn edit(&self, mapping: StubMapping) -> Result<(), RegistryError> {
        let entry = self.registry.edit(mapping)?;
        self.register_scenario_of(entry.mapping());
        Ok(())
    }

    pub fn remove(&self, id: Uuid) -> Result<StubMapping, RegistryError> {
        self.registry.remove(id)
    }

    pub fn remove_by_metadata(
        &self,
        predicate: impl Fn(&Map<String, Value>) -> bool,
    ) -> Vec<StubMapping> {
        self.registry.remove_by_metadata(predicate)
    }

    pub fn find_by_metadata(
        &self,
        predicate: impl Fn(&Map<String, Value>) -> bool,
    ) -> Vec<StubMapping> {
        self.registry.find_by_metadata(predicate)
    }

    /// All mappings in selection order.
    pub fn mappings(&self) -> Vec<StubMapping> {
        self.registry.list()
    }

    pub fn get(&self, id: Uuid) -> Option<StubMapping> {
        self.registry.get(id).map(|m| m.mapping().clone())
    }

    /// Atomically import a batch; see [`MappingRegistry::import`].
    pub fn import(
        &self,
        mappings: Vec<StubMapping>,
        replace: bool,
    ) -> Result<usize, RegistryError> {
        let imported = self.registry.import(mappings, replace)?;
        for entry in &imported {
            self.register_scenario_of(entry.mapping());
        }
        Ok(imported.len())
    }

    /// Remove every mapping and forget every scenario.
    pub fn reset_mappings(&self) {
        self.registry.reset();
        self.scenarios.clear();
    }

    /// Reset mappings, scenarios and the request journal.
    pub fn reset_all(&self) {
        self.reset_mappings();
        self.journal.reset();
        info!("Stub engine reset");
    }

    /// Static analysis of the registered mappings, in registration order.
    pub fn analyze(&self) -> AnalysisResult {
        let mut entries: Vec<Arc<RegisteredMapping>> = self.registry.snapshot().to_vec();
        entries.sort_by_key(|m| m.insertion_index());
        let mappings: Vec<StubMapping> = entries.iter().map(|m| m.mapping().clone()).collect();
        analyze_mappings(&mappings, self.registry.default_priority())
    }

    // ===== Scenarios =====

    pub fn scenarios(&self) -> Vec<Scenario> {
        self.scenarios.all()
    }

    pub fn scenario_state(&self, name: &str) -> Option<String> {
        self.scenarios.state(name)
    }

    pub fn set_scenario_state(&self, name: &str, state: &str) -> Result<(), RegistryError> {
        self.scenarios.set_state(name, state)
    }

    pub fn reset_scenarios(&self) {
        self.scenarios.reset_all();
    }

    // ===== Matching =====

    /// Select the mapping for `request`, applying its scenario transition.
    ///
    /// The request is not journaled; use [`StubEngine::serve`] for that.
    pub fn find_match(&self, request: &Request) -> Option<Arc<RegisteredMapping>> {
        let started = Instant::now();
        let snapshot = self.registry.snapshot();
        let selected = selector::select(&snapshot, &self.scenarios, request);
        metrics::record_selection(selected.is_some(), started.elapsed().as_secs_f64());
        selected
    }

    /// Select a mapping and journal the request, matched or not.
    pub fn serve(&self, request: Request) -> ServeOutcome {
        let mapping = self.find_match(&request);
        let logged = LoggedRequest::capture(request);
        let event = match &mapping {
            Some(m) => ServeEvent::matched(logged, m.id()),
            None => {
                info!(
                    "Request was not matched: {} {}",
                    logged.request.method(),
                    logged.request.url()
                );
                ServeEvent::unmatched(logged)
            }
        };
        ServeOutcome {
            event: self.journal.record(event),
            mapping,
        }
    }

    /// Closest mappings to `request`, closest first.
    pub fn near_misses(&self, request: &Request) -> Vec<NearMiss> {
        near_miss::rank_mappings(
            &self.registry.snapshot(),
            request,
            self.config.near_miss_count,
        )
    }

    /// Plain-text diff against the closest mapping, if any mapping exists.
    pub fn render_not_matched(&self, request: &Request) -> Option<String> {
        near_miss::rank_mappings(&self.registry.snapshot(), request, 1)
            .first()
            .map(|miss| miss.render(self.config.diff_line_width))
    }

    // ===== Journal =====

    pub fn all_requests(&self) -> Vec<Arc<ServeEvent>> {
        self.journal.all()
    }

    pub fn unmatched_requests(&self) -> Vec<Arc<ServeEvent>> {
        self.journal.unmatched()
    }

    pub fn get_request(&self, id: Uuid) -> Option<Arc<ServeEvent>> {
        self.journal.get(id)
    }

    pub fn count_requests_matching(&self, pattern: &RequestPattern) -> Result<usize, MappingError> {
        let compiled = self.compile_pattern(pattern)?;
        Ok(self.journal.count_matching(&compiled))
    }

    pub fn find_requests_matching(
        &self,
        pattern: &RequestPattern,
    ) -> Result<Vec<Arc<ServeEvent>>, MappingError> {
        let compiled = self.compile_pattern(pattern)?;
        Ok(self.journal.find_matching(&compiled))
    }

    pub fn remove_requests_matching(
        &self,
        pattern: &RequestPattern,
    ) -> Result<Vec<Arc<ServeEvent>>, MappingError> {
        let compiled = self.compile_pattern(pattern)?;
        Ok(self.journal.remove_matching(&compiled))
    }

    pub fn reset_requests(&self) {
        self.journal.reset();
    }

    /// Journaled requests closest to `pattern`, closest first.
    pub fn near_misses_for_pattern(
        &self,
        pattern: &RequestPattern,
    ) -> Result<Vec<NearMiss>, MappingError> {
        let compiled = self.compile_pattern(pattern)?;
        Ok(near_miss::rank_requests(
            &self.journal.all(),
            &compiled,
            self.config.near_miss_count,
        ))
    }

    /// The closest mapping for each unmatched journaled request.
    pub fn near_misses_for_unmatched(&self) -> Vec<NearMiss> {
        let snapshot = self.registry.snapshot();
        self.journal
            .unmatched()
            .iter()
            .filter_map(|event| {
                near_miss::rank_mappings(&snapshot, &event.request.request, 1)
                    .into_iter()
                    .next()
            })
            .collect()
    }

    /// Check that the journal holds the expected number of matching requests.
    ///
    /// On failure the error message embeds a diff against the closest
    /// request actually received.
    pub fn verify(
        &self,
        pattern: &CompiledRequestPattern,
        expected: RequestCount,
    ) -> Result<(), VerificationError> {
        if !self.journal.mode().is_enabled() {
            return Err(VerificationError {
                expected: expected.to_string(),
                actual: 0,
                message: "The request journal is disabled, so requests cannot be verified"
                    .to_string(),
            });
        }

        let actual = self.journal.count_matching(pattern);
        if expected.accepts(actual) {
            return Ok(());
        }

        let described = serde_json::to_string_pretty(pattern.source())
            .unwrap_or_else(|_| format!("{:?}", pattern.source()));
        let mut message = format!(
            "Expected {expected} request(s) matching the following pattern but received {actual}:\n{described}"
        );
        if actual == 0 {
            let closest = near_miss::rank_requests(&self.journal.all(), pattern, 1);
            if let Some(miss) = closest.first() {
                message.push_str("\n\nClosest request received:\n");
                message.push_str(&miss.render(self.config.diff_line_width));
            }
        }
        Err(VerificationError {
            expected: expected.to_string(),
            actual,
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{JournalConfig, JournalModeKind};
    use crate::mapping::WarningType;
    use crate::pattern::{RequestMethod, StringValuePattern, UrlPattern};
    use crate::scenario::STARTED;
    use serde_json::json;

    fn get(url: &str) -> StubMapping {
        StubMapping::new(
            RequestPattern::new(RequestMethod::of("GET"), UrlPattern::Url(url.to_string())),
            json!({"status": 200}),
        )
    }

    fn pattern(method: &str, url: &str) -> RequestPattern {
        RequestPattern::new(RequestMethod::of(method), UrlPattern::Url(url.to_string()))
    }

    #[test]
    fn test_serve_journals_every_request() {
        let engine = StubEngine::default();
        let id = engine.register(get("/a")).unwrap().id;

        let hit = engine.serve(Request::new("GET", "/a"));
        assert!(hit.is_matched());
        assert_eq!(hit.event.stub_mapping_id, Some(id));
        assert_eq!(hit.response(), Some(&json!({"status": 200})));

        let miss = engine.serve(Request::new("GET", "/b"));
        assert!(!miss.is_matched());

        assert_eq!(engine.all_requests().len(), 2);
        assert_eq!(engine.unmatched_requests().len(), 1);
        assert_eq!(engine.count_requests_matching(&pattern("GET", "/a")).unwrap(), 1);
        assert!(engine.get_request(miss.event.id).is_some());
    }

    #[test]
    fn test_register_reports_shadowing() {
        let engine = StubEngine::default();
        let first = engine.register(get("/a")).unwrap();
        assert!(first.warnings.is_empty());

        let second = engine.register(get("/a")).unwrap();
        assert_eq!(second.warnings.len(), 1);
        assert_eq!(second.warnings[0].warning_type, WarningType::ExactDuplicate);
        assert_eq!(second.warnings[0].mapping_id, first.id);
    }

    #[test]
    fn test_register_json_and_remove() {
        let engine = StubEngine::default();
        let registrations = engine
            .register_json(
                r#"{"mappings": [
                    {"request": {"method": "GET", "url": "/one"}, "response": {"status": 200}},
                    {"request": {"method": "GET", "url": "/two"}, "response": {"status": 201}}
                ]}"#,
            )
            .unwrap();
        assert_eq!(registrations.len(), 2);
        assert_eq!(engine.mappings().len(), 2);

        engine.remove(registrations[0].id).unwrap();
        assert!(engine.get(registrations[0].id).is_none());
        assert!(matches!(
            engine.remove(registrations[0].id),
            Err(RegistryError::MappingNotFound(_))
        ));
    }

    #[test]
    fn test_invalid_mapping_is_rejected() {
        let engine = StubEngine::default();
        let result = engine.register_json(
            r#"{"request": {"method": "GET", "urlPattern": "/(unclosed"}, "response": {}}"#,
        );
        assert!(matches!(
            result,
            Err(RegistryError::Mapping(MappingError::InvalidRegex { .. }))
        ));
        assert!(engine.mappings().is_empty());
    }

    #[test]
    fn test_rejected_document_registers_nothing() {
        let engine = StubEngine::default();
        let result = engine.register_json(
            r#"[
                {"request": {"method": "GET", "url": "/ok"}, "response": {"status": 200}},
                {"request": {"method": "GET", "urlPattern": "/(bad"}, "response": {}}
            ]"#,
        );
        assert!(result.is_err());
        assert!(engine.mappings().is_empty());

        let id = Uuid::new_v4();
        let document = format!(
            r#"[
                {{"id": "{id}", "request": {{"method": "GET", "url": "/a"}}, "response": {{}}}},
                {{"id": "{id}", "request": {{"method": "GET", "url": "/b"}}, "response": {{}}}}
            ]"#
        );
        assert!(matches!(
            engine.register_json(&document),
            Err(RegistryError::DuplicateId(dup)) if dup == id
        ));
        assert!(engine.mappings().is_empty());
    }

    #[test]
    fn test_register_json_reports_warnings_per_mapping() {
        let engine = StubEngine::default();
        let registrations = engine
            .register_json(
                r#"[
                    {"request": {"method": "GET", "url": "/same"}, "response": {}},
                    {"request": {"method": "GET", "url": "/same"}, "response": {}}
                ]"#,
            )
            .unwrap();
        assert_eq!(registrations.len(), 2);
        assert!(registrations.iter().all(|r| !r.warnings.is_empty()));
    }

    #[test]
    fn test_out_of_range_config_is_clamped() {
        let engine = StubEngine::new(EngineConfig {
            near_miss_count: 0,
            diff_line_width: 5,
            ..EngineConfig::default()
        });
        assert_eq!(engine.config().near_miss_count, 1);
        assert_eq!(engine.config().diff_line_width, MIN_DIFF_LINE_WIDTH);

        engine.register(get("/a")).unwrap();
        assert_eq!(engine.near_misses(&Request::new("GET", "/b")).len(), 1);
    }

    #[test]
    fn test_scenarios_registered_and_reset() {
        let engine = StubEngine::default();
        engine
            .register(
                get("/cart/add")
                    .in_scenario("cart")
                    .when_scenario_state_is(STARTED)
                    .will_set_state_to("item-added"),
            )
            .unwrap();
        assert_eq!(engine.scenario_state("cart").as_deref(), Some(STARTED));

        engine.serve(Request::new("GET", "/cart/add"));
        assert_eq!(engine.scenario_state("cart").as_deref(), Some("item-added"));

        engine.reset_scenarios();
        assert_eq!(engine.scenario_state("cart").as_deref(), Some(STARTED));

        engine.set_scenario_state("cart", "done").unwrap();
        assert_eq!(engine.scenarios()[0].state, "done");

        engine.reset_mappings();
        assert!(engine.scenarios().is_empty());
    }

    #[test]
    fn test_edit_keeps_identity() {
        let engine = StubEngine::default();
        let mapping = get("/a");
        let id = engine.register(mapping.clone()).unwrap().id;

        let edited = StubMapping {
            request: pattern("GET", "/edited"),
            ..mapping
        };
        engine.edit(edited).unwrap();

        assert!(engine.serve(Request::new("GET", "/a")).mapping.is_none());
        let served = engine.serve(Request::new("GET", "/edited"));
        assert_eq!(served.mapping.map(|m| m.id()), Some(id));
    }

    #[test]
    fn test_import_replace() {
        let engine = StubEngine::default();
        engine.register(get("/old")).unwrap();
        let count = engine.import(vec![get("/new1"), get("/new2")], true).unwrap();
        assert_eq!(count, 2);
        assert_eq!(engine.mappings().len(), 2);
        assert!(!engine.serve(Request::new("GET", "/old")).is_matched());
    }

    #[test]
    fn test_metadata_queries() {
        let engine = StubEngine::default();
        let mut metadata = Map::new();
        metadata.insert("team".to_string(), json!("payments"));
        engine.register(get("/pay").with_metadata(metadata)).unwrap();
        engine.register(get("/other")).unwrap();

        let is_payments = |m: &Map<String, Value>| m.get("team") == Some(&json!("payments"));
        assert_eq!(engine.find_by_metadata(is_payments).len(), 1);
        assert_eq!(engine.remove_by_metadata(is_payments).len(), 1);
        assert_eq!(engine.mappings().len(), 1);
    }

    #[test]
    fn test_not_matched_rendering() {
        let engine = StubEngine::default();
        assert!(engine.render_not_matched(&Request::new("GET", "/")).is_none());

        engine
            .register(
                StubMapping::new(pattern("POST", "/known"), Value::Null).with_name("known"),
            )
            .unwrap();
        let request = Request::new("POST", "/unknown");
        let text = engine.render_not_matched(&request).unwrap();
        assert!(text.contains("Closest stub"));
        assert!(text.contains("known"));
        assert!(text.contains("<<<<< URL does not match"));
        assert!(!text.contains("Method does not match"));

        engine.serve(request);
        let misses = engine.near_misses_for_unmatched();
        assert_eq!(misses.len(), 1);
        assert_eq!(misses[0].request.url(), "/unknown");
    }

    #[test]
    fn test_verify() {
        let engine = StubEngine::default();
        engine.serve(Request::new("GET", "/orders").with_header("Accept", "text/plain"));
        engine.serve(Request::new("GET", "/orders").with_header("Accept", "text/plain"));

        let loose = engine.compile_pattern(&pattern("GET", "/orders")).unwrap();
        assert!(engine.verify(&loose, RequestCount::Exactly(2)).is_ok());
        assert!(engine.verify(&loose, RequestCount::AtLeast(1)).is_ok());
        let err = engine.verify(&loose, RequestCount::AtMost(1)).unwrap_err();
        assert_eq!(err.actual, 2);
        assert_eq!(err.expected, "at most 1");

        let strict = engine
            .compile_pattern(
                &pattern("GET", "/orders")
                    .with_header("Accept", StringValuePattern::equal_to("application/json")),
            )
            .unwrap();
        let err = engine.verify(&strict, RequestCount::Exactly(1)).unwrap_err();
        assert_eq!(err.actual, 0);
        assert!(err.message.contains("Closest request received"));
        assert!(err.message.contains("<<<<< Header: Accept does not match"));
    }

    #[test]
    fn test_verify_with_disabled_journal() {
        let engine = StubEngine::new(EngineConfig {
            journal: JournalConfig {
                mode: JournalModeKind::Disabled,
                ..JournalConfig::default()
            },
            ..EngineConfig::default()
        });
        engine.serve(Request::new("GET", "/"));
        assert!(engine.all_requests().is_empty());
        let any = engine.compile_pattern(&RequestPattern::any()).unwrap();
        assert!(engine.verify(&any, RequestCount::Exactly(0)).is_err());
    }

    #[test]
    fn test_reset_all() {
        let engine = StubEngine::default();
        engine.register(get("/a").in_scenario("s")).unwrap();
        engine.serve(Request::new("GET", "/a"));
        engine.reset_all();
        assert!(engine.mappings().is_empty());
        assert!(engine.all_requests().is_empty());
        assert!(engine.scenarios().is_empty());
    }
}
