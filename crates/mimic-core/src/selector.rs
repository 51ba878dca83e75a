//! Stub selection.
//!
//! Walks a registry snapshot in selection order and returns the first
//! scenario-eligible mapping whose pattern matches exactly. For mappings in
//! a scenario the guard is re-checked under the scenario's lock together
//! with the transition, so a state change racing with this request makes
//! the mapping ineligible instead of being applied twice.

use crate::mapping::RegisteredMapping;
use crate::request::Request;
use crate::scenario::ScenarioStore;
use std::sync::Arc;
use tracing::debug;

/// Select the mapping to serve, applying its scenario transition.
pub fn select(
    mappings: &[Arc<RegisteredMapping>],
    scenarios: &ScenarioStore,
    request: &Request,
) -> Option<Arc<RegisteredMapping>> {
    for entry in mappings {
        let mapping = entry.mapping();

        let Some(scenario) = mapping.scenario_name.as_deref() else {
            // No scenario: always eligible, orphan scenario fields ignored
            if entry.pattern().is_match(request) {
                debug!(
                    "Request {} {} matched mapping {}",
                    request.method(),
                    request.url(),
                    mapping.display_name()
                );
                return Some(Arc::clone(entry));
            }
            continue;
        };

        let required = mapping.required_scenario_state.as_deref();
        if !scenarios.is_eligible(scenario, required) || !entry.pattern().is_match(request) {
            continue;
        }

        let new_state = mapping.new_scenario_state.as_deref();
        if scenarios.guard_and_transition(scenario, required, new_state) {
            debug!(
                "Request {} {} matched mapping {} in scenario '{}'",
                request.method(),
                request.url(),
                mapping.display_name(),
                scenario
            );
            return Some(Arc::clone(entry));
        }
        debug!(
            "Scenario '{}' left state {:?} before mapping {} could be served",
            scenario,
            required,
            mapping.display_name()
        );
    }

    debug!("No mapping matched {} {}", request.method(), request.url());
    None
}
