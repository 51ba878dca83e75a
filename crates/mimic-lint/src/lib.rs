//! Offline validation of Mimic stub mapping files.
//!
//! Mapping files are checked with the same parser, pattern compiler and
//! static analysis the engine uses at registration time, so a file that
//! lints clean registers clean.
//!
//! # Example
//!
//! ```no_run
//! use mimic_lint::{lint_directory, lint_file, LintOptions};
//! use std::path::Path;
//!
//! let result = lint_file(Path::new("mappings/orders.json"), &LintOptions::default());
//!
//! // All files in a directory are analyzed as one mapping set
//! let result = lint_directory(Path::new("./mappings"), &LintOptions::default());
//!
//! if result.has_errors() {
//!     eprintln!("Found {} errors", result.errors);
//! }
//! ```

mod types;
mod validator;

use serde_json::Value;
use std::path::{Path, PathBuf};

pub use types::{LintIssue, LintOptions, LintResult, MappingRef, Severity};
pub use validator::{validate_document, validate_mapping, validate_mapping_set, LoadedMapping};

/// Why a mapping file could not be read as JSON.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Failed to read file: {0}")]
    Read(#[from] std::io::Error),
    #[error("Invalid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

impl LoadError {
    fn code(&self) -> &'static str {
        match self {
            Self::Read(_) => "E001",
            Self::Parse(_) => "E002",
        }
    }

    fn into_issue(self, file: &Path) -> LintIssue {
        let issue = LintIssue::error(self.code(), self.to_string(), file);
        match self {
            Self::Parse(_) => issue.with_suggestion("Check for JSON syntax errors"),
            Self::Read(_) => issue,
        }
    }
}

/// Read and parse a mapping file.
pub fn load_document(path: &Path) -> Result<Value, LoadError> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// JSON files under `path` (a file or a non-recursive directory), sorted.
pub fn collect_mapping_files(path: &Path) -> Result<Vec<PathBuf>, LoadError> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    let mut files: Vec<PathBuf> = std::fs::read_dir(path)?
        .flatten()
        .map(|entry| entry.path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();
    Ok(files)
}

fn lint_files(files: &[PathBuf], options: &LintOptions) -> LintResult {
    let mut result = LintResult::new();
    let mut loaded = Vec::new();

    for file in files {
        result.files_checked += 1;
        match load_document(file) {
            Ok(document) => {
                loaded.extend(validate_document(file, &document, &mut result, options));
            }
            Err(e) => result.add_issue(e.into_issue(file)),
        }
    }

    validate_mapping_set(&loaded, &mut result, options);
    result
}

/// Lint a single mapping file.
pub fn lint_file(path: &Path, options: &LintOptions) -> LintResult {
    lint_files(&[path.to_path_buf()], options)
}

/// Lint every JSON file in a directory (non-recursive) as one mapping set.
///
/// Shadowing and duplicate ids are detected across files, in file name
/// order, which is the order a loader registers them in.
pub fn lint_directory(path: &Path, options: &LintOptions) -> LintResult {
    match collect_mapping_files(path) {
        Ok(files) => lint_files(&files, options),
        Err(e) => {
            let mut result = LintResult::new();
            result.add_issue(e.into_issue(path));
            result
        }
    }
}

/// Lint a JSON string directly (useful for in-memory validation).
pub fn lint_json(json: &str, source_name: &str, options: &LintOptions) -> LintResult {
    match serde_json::from_str::<Value>(json) {
        Ok(value) => lint_value(&value, source_name, options),
        Err(e) => {
            let mut result = LintResult::new();
            result.files_checked = 1;
            result.add_issue(LoadError::from(e).into_issue(Path::new(source_name)));
            result
        }
    }
}

/// Lint an already parsed mappings document.
pub fn lint_value(value: &Value, source_name: &str, options: &LintOptions) -> LintResult {
    let mut result = LintResult::new();
    result.files_checked = 1;
    let file = Path::new(source_name);
    let loaded = validate_document(file, value, &mut result, options);
    validate_mapping_set(&loaded, &mut result, options);
    result
}
