//! Core types for the linting library.

use mimic_core::mapping::DEFAULT_PRIORITY;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Severity level of a lint issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// The mapping would be rejected at registration.
    Error,
    /// The mapping loads but will probably not behave as intended.
    Warning,
    Info,
}

impl Severity {
    pub fn label(&self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        }
    }
}

/// Identifies a mapping in issue output: its position in the file and,
/// when known, its name or id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingRef {
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// A single lint issue found during validation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LintIssue {
    pub severity: Severity,
    /// Error code (e.g., "E006", "W010").
    pub code: String,
    pub message: String,
    #[serde(serialize_with = "serialize_path")]
    pub file: PathBuf,
    /// Location within the file (e.g., "mappings[2].request")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Mapping the issue concerns, when it could be identified
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mapping: Option<MappingRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

fn serialize_path<S>(path: &Path, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&path.to_string_lossy())
}

impl LintIssue {
    fn new(
        severity: Severity,
        code: impl Into<String>,
        message: impl Into<String>,
        file: &Path,
    ) -> Self {
        Self {
            severity,
            code: code.into(),
            message: message.into(),
            file: file.to_path_buf(),
            location: None,
            mapping: None,
            suggestion: None,
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>, file: &Path) -> Self {
        Self::new(Severity::Error, code, message, file)
    }

    pub fn warning(code: impl Into<String>, message: impl Into<String>, file: &Path) -> Self {
        Self::new(Severity::Warning, code, message, file)
    }

    pub fn info(code: impl Into<String>, message: impl Into<String>, file: &Path) -> Self {
        Self::new(Severity::Info, code, message, file)
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_mapping(mut self, mapping: MappingRef) -> Self {
        self.mapping = Some(mapping);
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

/// Result of linting one or more files.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LintResult {
    pub issues: Vec<LintIssue>,
    pub files_checked: usize,
    /// Mappings that parsed and compiled successfully
    pub mappings_checked: usize,
    pub errors: usize,
    pub warnings: usize,
}

impl LintResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_issue(&mut self, issue: LintIssue) {
        match issue.severity {
            Severity::Error => self.errors += 1,
            Severity::Warning => self.warnings += 1,
            Severity::Info => {}
        }
        self.issues.push(issue);
    }

    pub fn has_errors(&self) -> bool {
        self.errors > 0
    }

    pub fn has_warnings(&self) -> bool {
        self.warnings > 0
    }

    /// No errors; warnings are allowed.
    pub fn is_valid(&self) -> bool {
        self.errors == 0
    }

    /// Issues with the given code, in the order they were found.
    pub fn with_code<'a>(&'a self, code: &'a str) -> impl Iterator<Item = &'a LintIssue> + 'a {
        self.issues.iter().filter(move |issue| issue.code == code)
    }

    pub fn merge(&mut self, other: LintResult) {
        self.issues.extend(other.issues);
        self.files_checked += other.files_checked;
        self.mappings_checked += other.mappings_checked;
        self.errors += other.errors;
        self.warnings += other.warnings;
    }
}

#[derive(Debug, Clone)]
pub struct LintOptions {
    pub verbose: bool,
    /// Priority assumed for mappings that declare none
    pub default_priority: i32,
    /// Custom matchers the target server provides; others are reported
    pub custom_matchers: Vec<String>,
}

impl Default for LintOptions {
    fn default() -> Self {
        Self {
            verbose: false,
            default_priority: DEFAULT_PRIORITY,
            custom_matchers: Vec::new(),
        }
    }
}
