//! URL matching.
//!
//! Equality-based matchers (`url`, `urlPath`) grade misses by edit distance
//! so the near-miss ranker can tell `/statu` from `/orders`. Regex and
//! template matchers are all-or-nothing.

use super::match_result::MatchResult;
use super::matcher::normalized_edit_distance;
use crate::error::MappingError;
use crate::request::Request;
use regex::Regex;
use std::collections::HashSet;
use std::sync::Arc;

/// Which part of the request URL a matcher inspects, and how.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum UrlPattern {
    /// Matches every URL
    #[default]
    Any,
    /// Path and query equal the operand (`url`)
    Url(String),
    /// Path and query match the regex (`urlPattern`)
    UrlRegex(String),
    /// Path equals the operand (`urlPath`)
    Path(String),
    /// Path matches the regex (`urlPathPattern`)
    PathRegex(String),
    /// Path matches a `/users/{id}` style template (`urlPathTemplate`)
    PathTemplate(String),
}

impl UrlPattern {
    /// Persisted key of this matcher, `None` for `Any`.
    pub fn key(&self) -> Option<&'static str> {
        match self {
            Self::Any => None,
            Self::Url(_) => Some("url"),
            Self::UrlRegex(_) => Some("urlPattern"),
            Self::Path(_) => Some("urlPath"),
            Self::PathRegex(_) => Some("urlPathPattern"),
            Self::PathTemplate(_) => Some("urlPathTemplate"),
        }
    }

    pub fn operand(&self) -> Option<&str> {
        match self {
            Self::Any => None,
            Self::Url(v)
            | Self::UrlRegex(v)
            | Self::Path(v)
            | Self::PathRegex(v)
            | Self::PathTemplate(v) => Some(v),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Any => "[any URL]".to_string(),
            Self::Url(v) | Self::Path(v) => v.clone(),
            Self::UrlRegex(v) | Self::PathRegex(v) => format!("[regex] {v}"),
            Self::PathTemplate(v) => format!("[template] {v}"),
        }
    }

    /// Whether the matcher inspects only the path (query excluded).
    fn path_only(&self) -> bool {
        matches!(self, Self::Path(_) | Self::PathRegex(_) | Self::PathTemplate(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
enum TemplateSegment {
    Literal(String),
    Variable(String),
}

#[derive(Debug, Clone)]
enum CompiledUrlKind {
    Any,
    Equals(String),
    Regex(Arc<Regex>),
    Template(Vec<TemplateSegment>),
}

/// Runtime form of a URL matcher.
#[derive(Debug, Clone)]
pub struct CompiledUrlPattern {
    source: UrlPattern,
    kind: CompiledUrlKind,
}

impl CompiledUrlPattern {
    pub fn compile(pattern: &UrlPattern) -> Result<Self, MappingError> {
        let kind = match pattern {
            UrlPattern::Any => CompiledUrlKind::Any,
            UrlPattern::Url(v) | UrlPattern::Path(v) => CompiledUrlKind::Equals(v.clone()),
            UrlPattern::UrlRegex(v) | UrlPattern::PathRegex(v) => {
                let regex = Regex::new(&format!("^(?:{v})$")).map_err(|source| {
                    MappingError::InvalidRegex {
                        pattern: v.clone(),
                        source,
                    }
                })?;
                CompiledUrlKind::Regex(Arc::new(regex))
            }
            UrlPattern::PathTemplate(v) => CompiledUrlKind::Template(parse_template(v)?),
        };
        Ok(Self {
            source: pattern.clone(),
            kind,
        })
    }

    pub fn source(&self) -> &UrlPattern {
        &self.source
    }

    /// The part of the request URL this matcher inspects.
    pub fn target<'r>(&self, request: &'r Request) -> &'r str {
        if self.source.path_only() {
            request.path()
        } else {
            request.url()
        }
    }

    pub fn is_match(&self, request: &Request) -> bool {
        let target = self.target(request);
        match &self.kind {
            CompiledUrlKind::Any => true,
            CompiledUrlKind::Equals(expected) => expected == target,
            CompiledUrlKind::Regex(regex) => regex.is_match(target),
            CompiledUrlKind::Template(segments) => template_matches(segments, target),
        }
    }

    pub fn match_request(&self, request: &Request) -> MatchResult {
        match &self.kind {
            CompiledUrlKind::Equals(expected) => {
                let target = self.target(request);
                if expected == target {
                    MatchResult::exact_match()
                } else {
                    MatchResult::partial(normalized_edit_distance(expected, target))
                }
            }
            _ => MatchResult::from_bool(self.is_match(request)),
        }
    }
}

fn parse_template(template: &str) -> Result<Vec<TemplateSegment>, MappingError> {
    let invalid = || MappingError::InvalidUrlTemplate(template.to_string());
    if !template.starts_with('/') {
        return Err(invalid());
    }

    let mut seen = HashSet::new();
    let mut segments = Vec::new();
    for part in template[1..].split('/') {
        if let Some(name) = part.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
            let valid = !name.is_empty()
                && name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
            if !valid || !seen.insert(name.to_string()) {
                return Err(invalid());
            }
            segments.push(TemplateSegment::Variable(name.to_string()));
        } else if part.contains('{') || part.contains('}') {
            return Err(invalid());
        } else {
            segments.push(TemplateSegment::Literal(part.to_string()));
        }
    }
    Ok(segments)
}

fn template_matches(segments: &[TemplateSegment], path: &str) -> bool {
    let Some(rest) = path.strip_prefix('/') else {
        return false;
    };
    let parts: Vec<&str> = rest.split('/').collect();
    parts.len() == segments.len()
        && segments.iter().zip(parts).all(|(segment, part)| match segment {
            TemplateSegment::Literal(literal) => literal == part,
            TemplateSegment::Variable(_) => !part.is_empty(),
        })
}
