//! Near-miss ranking for unmatched requests.
//!
//! Scenario state is ignored here: near misses are diagnostics, so every
//! mapping is compared with the request regardless of eligibility.

pub mod diff;

pub use diff::{render_plain, Diff, DiffLine, DEFAULT_LINE_WIDTH};

use crate::journal::ServeEvent;
use crate::mapping::RegisteredMapping;
use crate::pattern::{CompiledRequestPattern, MatchResult, RequestMatch, RequestPattern};
use crate::request::Request;
use serde::Serialize;
use std::sync::Arc;

/// A request and the pattern it came closest to matching.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NearMiss {
    pub request: Request,
    /// The stub the request was compared with; `None` for verification
    /// queries, which compare against a bare pattern
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stub_mapping: Option<crate::mapping::StubMapping>,
    pub request_pattern: RequestPattern,
    pub match_result: RequestMatch,
}

impl NearMiss {
    pub fn distance(&self) -> f64 {
        self.match_result.distance()
    }

    pub fn diff(&self) -> Diff {
        let stub = self.stub_mapping.as_ref().map(|m| m.display_name());
        Diff::from_match(stub, &self.match_result)
    }

    /// Plain-text side-by-side rendering of [`NearMiss::diff`].
    pub fn render(&self, width: usize) -> String {
        render_plain(&self.diff(), width)
    }
}

/// Stable sort by distance, keeping input order for ties, then truncate.
fn rank<T>(mut candidates: Vec<(MatchResult, T)>, limit: usize) -> Vec<T> {
    candidates.sort_by(|a, b| MatchResult::cmp_distance(&a.0, &b.0));
    candidates.truncate(limit);
    candidates.into_iter().map(|(_, item)| item).collect()
}

/// The `limit` mappings closest to `request`, closest first.
///
/// `mappings` must be in selection order; ties keep that order.
pub fn rank_mappings(
    mappings: &[Arc<RegisteredMapping>],
    request: &Request,
    limit: usize,
) -> Vec<NearMiss> {
    let candidates: Vec<_> = mappings
        .iter()
        .filter(|entry| entry.mapping().request.is_configured())
        .map(|entry| {
            let result = entry.pattern().match_request(request);
            (result.result.clone(), (entry, result))
        })
        .collect();

    rank(candidates, limit)
        .into_iter()
        .map(|(entry, match_result)| NearMiss {
            request: request.clone(),
            stub_mapping: Some(entry.mapping().clone()),
            request_pattern: entry.mapping().request.clone(),
            match_result,
        })
        .collect()
}

/// The `limit` journaled requests closest to `pattern`, closest first.
///
/// `events` are in arrival order; ties keep that order.
pub fn rank_requests(
    events: &[Arc<ServeEvent>],
    pattern: &CompiledRequestPattern,
    limit: usize,
) -> Vec<NearMiss> {
    let candidates: Vec<_> = events
        .iter()
        .map(|event| {
            let result = pattern.match_request(&event.request.request);
            (result.result.clone(), (event, result))
        })
        .collect();

    rank(candidates, limit)
        .into_iter()
        .map(|(event, match_result)| NearMiss {
            request: event.request.request.clone(),
            stub_mapping: None,
            request_pattern: pattern.source().clone(),
            match_result,
        })
        .collect()
}
