//! Test world holding one engine per scenario

use cucumber::World;
use mimic_core::{RequestPattern, ServeOutcome, StubEngine};
use serde_json::Value;

/// Outcome of the last verification step.
#[derive(Debug, Clone)]
pub enum Verification {
    Passed,
    Failed(String),
}

/// The test world containing all shared state
#[derive(Debug, Default, World)]
pub struct AcceptanceWorld {
    /// Fresh engine for every scenario
    pub engine: StubEngine,

    /// Last served request
    pub last: Option<ServeOutcome>,

    /// Error message of the last rejected registration
    pub registration_error: Option<String>,

    /// Warnings returned by the last registration
    pub registration_warnings: Vec<String>,

    pub verification: Option<Verification>,
}

impl AcceptanceWorld {
    /// Register every mapping in a JSON document, remembering errors and warnings.
    pub fn register(&mut self, document: &str) -> Result<(), String> {
        self.registration_error = None;
        self.registration_warnings.clear();
        match self.engine.register_json(document) {
            Ok(registrations) => {
                self.registration_warnings = registrations
                    .into_iter()
                    .flat_map(|r| r.warnings)
                    .map(|w| w.message)
                    .collect();
                Ok(())
            }
            Err(e) => {
                let message = e.to_string();
                self.registration_error = Some(message.clone());
                Err(message)
            }
        }
    }

    pub fn last_outcome(&self) -> &ServeOutcome {
        self.last.as_ref().expect("No request has been made")
    }

    pub fn last_response(&self) -> &Value {
        self.last_outcome()
            .response()
            .expect("The last request was not matched")
    }

    pub fn parse_pattern(json: &str) -> RequestPattern {
        serde_json::from_str(json).expect("Invalid request pattern")
    }
}
