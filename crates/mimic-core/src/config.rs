//! Engine configuration.

use crate::journal::JournalMode;
use crate::mapping::DEFAULT_PRIORITY;
use crate::near_miss::DEFAULT_LINE_WIDTH;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Narrowest column the plain-text diff renderer accepts.
pub(crate) const MIN_DIFF_LINE_WIDTH: usize = 20;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    #[serde(default)]
    pub journal: JournalConfig,

    /// How many near misses to report for an unmatched request
    #[serde(default = "default_near_miss_count")]
    pub near_miss_count: usize,

    /// Priority given to mappings that declare none
    #[serde(default = "default_priority")]
    pub default_priority: i32,

    /// Column width of the plain-text diff
    #[serde(default = "default_diff_line_width")]
    pub diff_line_width: usize,

    /// Compare HTTP methods ignoring case
    #[serde(default)]
    pub case_insensitive_methods: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JournalModeKind {
    Disabled,
    Bounded,
    #[default]
    Unbounded,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalConfig {
    #[serde(default)]
    pub mode: JournalModeKind,

    /// Maximum number of events kept by a bounded journal
    #[serde(default = "default_journal_capacity")]
    pub capacity: usize,
}

fn default_near_miss_count() -> usize {
    1
}

fn default_priority() -> i32 {
    DEFAULT_PRIORITY
}

fn default_diff_line_width() -> usize {
    DEFAULT_LINE_WIDTH
}

fn default_journal_capacity() -> usize {
    10_000
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            mode: JournalModeKind::default(),
            capacity: default_journal_capacity(),
        }
    }
}

impl JournalConfig {
    pub fn journal_mode(&self) -> JournalMode {
        match self.mode {
            JournalModeKind::Disabled => JournalMode::Disabled,
            JournalModeKind::Bounded => JournalMode::bounded(self.capacity),
            JournalModeKind::Unbounded => JournalMode::Unbounded,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            journal: JournalConfig::default(),
            near_miss_count: default_near_miss_count(),
            default_priority: default_priority(),
            diff_line_width: default_diff_line_width(),
            case_insensitive_methods: false,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a YAML or JSON file (chosen by extension).
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        let config: EngineConfig = if is_json {
            serde_json::from_str(&contents)
                .with_context(|| format!("Invalid JSON in {}", path.display()))?
        } else {
            serde_yaml::from_str(&contents)
                .with_context(|| format!("Invalid YAML in {}", path.display()))?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.journal.mode == JournalModeKind::Bounded && self.journal.capacity == 0 {
            anyhow::bail!(
                "'journal.capacity' must be greater than 0 for a bounded journal. \
                 Use mode 'disabled' to turn the journal off"
            );
        }
        if self.near_miss_count == 0 {
            anyhow::bail!("'nearMissCount' must be at least 1");
        }
        if self.diff_line_width < MIN_DIFF_LINE_WIDTH {
            anyhow::bail!(
                "'diffLineWidth' must be at least {MIN_DIFF_LINE_WIDTH}, got {}",
                self.diff_line_width
            );
        }
        Ok(())
    }
}
