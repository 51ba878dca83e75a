//! User-defined request matchers.
//!
//! A request pattern may reference a custom matcher by name:
//!
//! ```json
//! { "customMatcher": { "name": "has-tenant", "parameters": { "tenant": "acme" } } }
//! ```
//!
//! Names are resolved against a `CustomMatcherRegistry` when the pattern is
//! compiled. An unknown name is a configuration error.

use super::match_result::MatchResult;
use crate::request::Request;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Trait for pluggable request matchers.
pub trait CustomMatcher: Send + Sync {
    /// Name used to reference this matcher from a mapping.
    fn name(&self) -> &str;

    /// Evaluate the request using the parameters declared on the mapping.
    fn matches(&self, request: &Request, parameters: &Value) -> MatchResult;
}

/// Named custom matchers available to pattern compilation.
#[derive(Clone, Default)]
pub struct CustomMatcherRegistry {
    matchers: HashMap<String, Arc<dyn CustomMatcher>>,
}

impl CustomMatcherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a matcher, replacing any previous one with the same name.
    pub fn register(&mut self, matcher: Arc<dyn CustomMatcher>) {
        self.matchers.insert(matcher.name().to_string(), matcher);
    }

    pub fn with(mut self, matcher: impl CustomMatcher + 'static) -> Self {
        self.register(Arc::new(matcher));
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn CustomMatcher>> {
        self.matchers.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.matchers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }
}

impl fmt::Debug for CustomMatcherRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomMatcherRegistry")
            .field("matchers", &self.names())
            .finish()
    }
}
