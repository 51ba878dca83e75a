//! Static analysis of a mapping set.
//!
//! Selection is first-match over `(priority, newest first)`, so a mapping
//! can be registered successfully and still never be served. This module
//! detects the common cases:
//!
//! - Duplicate ID detection
//! - Exact duplicates (an identical pattern takes precedence)
//! - Mappings shadowed by a catch-all with higher precedence
//! - Catch-all mappings
//! - Scenario states declared without a scenario name

use super::types::StubMapping;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::HashMap;
use uuid::Uuid;

/// Warning about a mapping that may not behave as intended.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MappingWarning {
    pub warning_type: WarningType,
    pub message: String,
    /// Position of the mapping in the analyzed input
    pub index: usize,
    pub mapping_id: Uuid,
    /// The mapping this one conflicts with, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WarningType {
    /// Mapping with same ID appears earlier in the input
    DuplicateId,
    /// Another mapping with the same pattern takes precedence
    ExactDuplicate,
    /// A catch-all with higher precedence answers every request first
    Shadowed,
    /// Mapping matches every request
    CatchAll,
    /// `requiredScenarioState` / `newScenarioState` without `scenarioName`
    ScenarioStateWithoutName,
}

/// Result of mapping analysis
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub warnings: Vec<MappingWarning>,
}

impl AnalysisResult {
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Warnings raised for, or caused by, the given mapping.
    pub fn concerning(&self, id: Uuid) -> Vec<MappingWarning> {
        self.warnings
            .iter()
            .filter(|w| w.mapping_id == id || w.related_id == Some(id))
            .cloned()
            .collect()
    }
}

/// Whether both mappings are gated identically by scenario state.
fn same_gate(a: &StubMapping, b: &StubMapping) -> bool {
    a.scenario_name == b.scenario_name && a.required_scenario_state == b.required_scenario_state
}

/// A mapping that answers every request whenever it is eligible, regardless of state.
fn is_unconditional_catch_all(mapping: &StubMapping) -> bool {
    mapping.request.is_catch_all()
        && (mapping.scenario_name.is_none() || mapping.required_scenario_state.is_none())
}

/// Analyze mappings given in registration order (oldest first).
pub fn analyze_mappings(mappings: &[StubMapping], default_priority: i32) -> AnalysisResult {
    let mut result = AnalysisResult::default();

    let mut seen_ids: HashMap<Uuid, usize> = HashMap::new();
    for (index, mapping) in mappings.iter().enumerate() {
        if let Some(&first) = seen_ids.get(&mapping.id) {
            result.warnings.push(MappingWarning {
                warning_type: WarningType::DuplicateId,
                message: format!(
                    "Mapping at index {index} has duplicate ID '{}' (same as mapping at index {first})",
                    mapping.id
                ),
                index,
                mapping_id: mapping.id,
                related_id: None,
            });
        } else {
            seen_ids.insert(mapping.id, index);
        }

        if mapping.has_orphan_scenario_state() {
            result.warnings.push(MappingWarning {
                warning_type: WarningType::ScenarioStateWithoutName,
                message: format!(
                    "Mapping '{}' declares scenario state without 'scenarioName'; it is served regardless of scenario state",
                    mapping.display_name()
                ),
                index,
                mapping_id: mapping.id,
                related_id: None,
            });
        }

        if mapping.request.is_catch_all() {
            result.warnings.push(MappingWarning {
                warning_type: WarningType::CatchAll,
                message: format!(
                    "Mapping '{}' has no request constraints and will match ALL requests",
                    mapping.display_name()
                ),
                index,
                mapping_id: mapping.id,
                related_id: None,
            });
        }
    }

    // Selection order: priority ascending, most recent first
    let mut order: Vec<usize> = (0..mappings.len()).collect();
    order.sort_by_key(|&i| (mappings[i].effective_priority(default_priority), Reverse(i)));

    for (position, &index) in order.iter().enumerate() {
        let mapping = &mappings[index];
        for &earlier in &order[..position] {
            let winner = &mappings[earlier];
            if winner.id == mapping.id {
                continue;
            }
            if winner.request == mapping.request && same_gate(winner, mapping) {
                result.warnings.push(MappingWarning {
                    warning_type: WarningType::ExactDuplicate,
                    message: format!(
                        "Mapping '{}' has the same request pattern as '{}', which takes precedence; it will never be served",
                        mapping.display_name(),
                        winner.display_name()
                    ),
                    index,
                    mapping_id: mapping.id,
                    related_id: Some(winner.id),
                });
                break;
            }
            if is_unconditional_catch_all(winner) {
                result.warnings.push(MappingWarning {
                    warning_type: WarningType::Shadowed,
                    message: format!(
                        "Mapping '{}' is shadowed by catch-all '{}', which takes precedence",
                        mapping.display_name(),
                        winner.display_name()
                    ),
                    index,
                    mapping_id: mapping.id,
                    related_id: Some(winner.id),
                });
                break;
            }
        }
    }

    result
}
