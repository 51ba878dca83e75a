//! Request matching patterns.
//!
//! This module provides the matching grammar used by stub mappings:
//!
//! - `StringValuePattern` - declarative value matchers (equalTo, contains, regex, JSON/XML, ...)
//! - `CompiledValuePattern` - runtime form built once at registration
//! - `RequestPattern` / `CompiledRequestPattern` - composite matchers over a whole request
//! - `UrlPattern` - URL and path matchers
//! - `CustomMatcher` - user-supplied named matchers
//! - `MatchResult` - exactness plus a distance used for near-miss ranking

pub mod compiled;
pub mod custom;
pub mod json;
pub mod match_result;
pub mod matcher;
pub mod request_pattern;
pub mod string_pattern;
pub mod url;
pub mod xml;

pub use compiled::CompiledValuePattern;
pub use custom::{CustomMatcher, CustomMatcherRegistry};
pub use match_result::MatchResult;
pub use request_pattern::{
    Attribute, AttributeMatch, CompiledRequestPattern, CustomMatcherRef, RequestMatch,
    RequestMethod, RequestPattern,
};
pub use string_pattern::StringValuePattern;
pub use url::{CompiledUrlPattern, UrlPattern};
