//! Scenario state machine.
//!
//! Each scenario is an independently locked cell holding its current state
//! and every state mappings have declared for it. Guards and transitions
//! live on mappings; this store only provides atomic check-and-set per
//! scenario so that one served request applies its transition exactly once.

use crate::error::RegistryError;
use crate::metrics;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

/// Initial state of every scenario.
pub const STARTED: &str = "Started";

/// Point-in-time view of one scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    pub name: String,
    pub state: String,
    pub possible_states: Vec<String>,
}

#[derive(Debug)]
struct ScenarioCell {
    state: String,
    possible_states: BTreeSet<String>,
}

impl ScenarioCell {
    fn new() -> Self {
        Self {
            state: STARTED.to_string(),
            possible_states: BTreeSet::from([STARTED.to_string()]),
        }
    }
}

#[derive(Debug, Default)]
pub struct ScenarioStore {
    cells: RwLock<HashMap<String, Arc<Mutex<ScenarioCell>>>>,
}

impl ScenarioStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn cell(&self, name: &str) -> Option<Arc<Mutex<ScenarioCell>>> {
        self.cells.read().get(name).cloned()
    }

    /// Make a scenario known, creating it in `Started` if new, and record
    /// states a mapping declares for it.
    pub fn register<'a>(&self, name: &str, states: impl IntoIterator<Item = &'a str>) {
        let cell = match self.cell(name) {
            Some(cell) => cell,
            None => {
                let mut cells = self.cells.write();
                let cell = cells
                    .entry(name.to_string())
                    .or_insert_with(|| {
                        debug!("Created scenario '{name}'");
                        Arc::new(Mutex::new(ScenarioCell::new()))
                    });
                Arc::clone(cell)
            }
        };
        let mut cell = cell.lock();
        for state in states {
            cell.possible_states.insert(state.to_string());
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.cells.read().contains_key(name)
    }

    pub fn state(&self, name: &str) -> Option<String> {
        self.cell(name).map(|cell| cell.lock().state.clone())
    }

    /// Administrative override of a scenario's state.
    pub fn set_state(&self, name: &str, state: &str) -> Result<(), RegistryError> {
        let cell = self
            .cell(name)
            .ok_or_else(|| RegistryError::ScenarioNotFound(name.to_string()))?;
        let mut cell = cell.lock();
        cell.state = state.to_string();
        cell.possible_states.insert(state.to_string());
        info!("Scenario '{name}' set to '{state}'");
        Ok(())
    }

    /// Return every scenario to `Started`, keeping identities.
    pub fn reset_all(&self) {
        let cells = self.cells.read();
        for cell in cells.values() {
            cell.lock().state = STARTED.to_string();
        }
        info!("Reset {} scenario(s) to '{STARTED}'", cells.len());
    }

    /// Forget every scenario (full registry reset).
    pub fn clear(&self) {
        self.cells.write().clear();
    }

    /// All scenarios, sorted by name.
    pub fn all(&self) -> Vec<Scenario> {
        let cells = self.cells.read();
        let mut scenarios: Vec<Scenario> = cells
            .iter()
            .map(|(name, cell)| {
                let cell = cell.lock();
                Scenario {
                    name: name.clone(),
                    state: cell.state.clone(),
                    possible_states: cell.possible_states.iter().cloned().collect(),
                }
            })
            .collect();
        scenarios.sort_by(|a, b| a.name.cmp(&b.name));
        scenarios
    }

    /// Eligibility pre-check; applies no transition.
    ///
    /// Unknown scenarios are treated as being in `Started`.
    pub fn is_eligible(&self, name: &str, required_state: Option<&str>) -> bool {
        let Some(required) = required_state else {
            return true;
        };
        match self.cell(name) {
            Some(cell) => cell.lock().state == required,
            None => required == STARTED,
        }
    }

    /// Atomically re-check the guard and apply the transition.
    ///
    /// Returns `false` when the scenario is no longer in the required state,
    /// in which case nothing changes.
    pub fn guard_and_transition(
        &self,
        name: &str,
        required_state: Option<&str>,
        new_state: Option<&str>,
    ) -> bool {
        if required_state.is_none() && new_state.is_none() {
            return true;
        }
        if self.cell(name).is_none() {
            self.register(name, required_state.into_iter().chain(new_state));
        }
        let Some(cell) = self.cell(name) else {
            return false;
        };

        let mut cell = cell.lock();
        if let Some(required) = required_state {
            if cell.state != required {
                return false;
            }
        }
        if let Some(next) = new_state {
            debug!("Scenario '{name}': '{}' -> '{next}'", cell.state);
            cell.state = next.to_string();
            cell.possible_states.insert(next.to_string());
            metrics::record_scenario_transition(name);
        }
        true
    }
}
