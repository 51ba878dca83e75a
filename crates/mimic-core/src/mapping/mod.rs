//! Stub mappings: data model, registry and static analysis.

pub mod analysis;
pub mod registry;
pub mod types;

pub use analysis::{analyze_mappings, AnalysisResult, MappingWarning, WarningType};
pub use registry::{MappingRegistry, RegisteredMapping, Snapshot};
pub use types::{parse_mappings, parse_mappings_value, StubMapping, DEFAULT_PRIORITY};
