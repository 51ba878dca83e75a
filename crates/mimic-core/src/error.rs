//! Error types for mapping configuration, registry mutation and verification.
//!
//! Match-time problems (malformed request bodies and the like) are never
//! reported through these types: they become non-exact match results.

use uuid::Uuid;

/// Configuration errors detected when a mapping is parsed or compiled.
#[derive(Debug, thiserror::Error)]
pub enum MappingError {
    #[error("Invalid regular expression '{pattern}': {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("Invalid JSONPath expression '{expression}': {message}")]
    InvalidJsonPath { expression: String, message: String },
    #[error("Invalid XPath expression '{expression}': {message}")]
    InvalidXPath { expression: String, message: String },
    #[error("Invalid JSON document in pattern: {0}")]
    InvalidJson(String),
    #[error("Invalid XML document in pattern: {0}")]
    InvalidXml(String),
    #[error("Invalid base64 operand for binaryEqualTo: {0}")]
    InvalidBase64(#[from] base64::DecodeError),
    #[error("Invalid URL template '{0}'")]
    InvalidUrlTemplate(String),
    #[error("Unknown custom matcher '{0}'")]
    UnknownCustomMatcher(String),
    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),
    #[error("Invalid mapping JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors returned by registry and scenario mutations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Stub mapping {0} not found")]
    MappingNotFound(Uuid),
    #[error("Stub mapping {0} is already registered")]
    DuplicateId(Uuid),
    #[error("Scenario '{0}' not found")]
    ScenarioNotFound(String),
    #[error(transparent)]
    Mapping(#[from] MappingError),
}

/// A verification query that did not find the expected number of requests.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct VerificationError {
    pub expected: String,
    pub actual: usize,
    pub message: String,
}
