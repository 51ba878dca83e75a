//! Match results: an exactness flag plus a distance in `[0, 1]`.

use serde::Serialize;
use std::cmp::Ordering;

/// Outcome of evaluating a pattern against a value.
///
/// A distance of `0.0` is an exact match and `1.0` means no similarity at
/// all. Non-exact results always carry a strictly positive distance so that
/// near-miss ranking never confuses them with real matches.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    exact: bool,
    distance: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
}

/// Smallest distance a non-exact result may report.
const MIN_MISS_DISTANCE: f64 = 1e-6;

impl MatchResult {
    pub fn exact_match() -> Self {
        Self {
            exact: true,
            distance: 0.0,
            description: None,
        }
    }

    pub fn no_match() -> Self {
        Self {
            exact: false,
            distance: 1.0,
            description: None,
        }
    }

    /// Exact when `matched`, otherwise maximal distance.
    pub fn from_bool(matched: bool) -> Self {
        if matched {
            Self::exact_match()
        } else {
            Self::no_match()
        }
    }

    /// A non-exact result with a graded distance.
    pub fn partial(distance: f64) -> Self {
        Self {
            exact: false,
            distance: distance.clamp(MIN_MISS_DISTANCE, 1.0),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn is_exact(&self) -> bool {
        self.exact
    }

    pub fn distance(&self) -> f64 {
        self.distance
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// AND-combination: exact iff every child is exact, distance is the mean.
    ///
    /// An empty set aggregates to an exact match (nothing was constrained).
    pub fn aggregate(results: &[MatchResult]) -> Self {
        if results.is_empty() {
            return Self::exact_match();
        }
        let exact = results.iter().all(MatchResult::is_exact);
        let mean = results.iter().map(MatchResult::distance).sum::<f64>() / results.len() as f64;
        if exact {
            Self::exact_match()
        } else {
            Self::partial(mean)
        }
    }

    /// OR-combination: the best child wins.
    pub fn best(results: impl IntoIterator<Item = MatchResult>) -> Self {
        results
            .into_iter()
            .min_by(MatchResult::cmp_distance)
            .unwrap_or_else(Self::no_match)
    }

    /// Total order over results, ascending by distance.
    pub fn cmp_distance(a: &MatchResult, b: &MatchResult) -> Ordering {
        a.distance
            .total_cmp(&b.distance)
            .then_with(|| b.exact.cmp(&a.exact))
    }
}

impl PartialOrd for MatchResult {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(Self::cmp_distance(self, other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_is_mean_of_children() {
        let result = MatchResult::aggregate(&[
            MatchResult::exact_match(),
            MatchResult::no_match(),
            MatchResult::partial(0.5),
            MatchResult::exact_match(),
        ]);
        assert!(!result.is_exact());
        assert!((result.distance() - 0.375).abs() < 1e-9);
    }

    #[test]
    fn test_aggregate_empty_is_exact() {
        assert!(MatchResult::aggregate(&[]).is_exact());
    }

    #[test]
    fn test_partial_never_reports_zero() {
        let result = MatchResult::partial(0.0);
        assert!(!result.is_exact());
        assert!(result.distance() > 0.0);
        assert_eq!(MatchResult::partial(3.0).distance(), 1.0);
    }

    #[test]
    fn test_best_picks_smallest_distance() {
        let best = MatchResult::best(vec![
            MatchResult::partial(0.7),
            MatchResult::partial(0.2),
            MatchResult::no_match(),
        ]);
        assert!((best.distance() - 0.2).abs() < 1e-9);
        assert!(!MatchResult::best(Vec::new()).is_exact());
    }

    #[test]
    fn test_results_order_by_distance() {
        let mut results = vec![
            MatchResult::no_match(),
            MatchResult::exact_match(),
            MatchResult::partial(0.4),
        ];
        results.sort_by(MatchResult::cmp_distance);
        assert!(results[0].is_exact());
        assert!((results[1].distance() - 0.4).abs() < 1e-9);
        assert_eq!(results[2].distance(), 1.0);
    }
}
