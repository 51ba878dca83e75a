//! Prometheus metrics for the matching engine.
//!
//! Tracks selection outcomes, match latency, registry size, scenario
//! transitions and journal evictions. Collectors register in the default
//! registry on first use; `collect_metrics` renders the text format.

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_histogram, Counter,
    CounterVec, Encoder, Gauge, Histogram, TextEncoder,
};

lazy_static! {
    /// Requests evaluated by the selector, by outcome
    pub static ref REQUESTS_TOTAL: CounterVec = register_counter_vec!(
        "mimic_requests_total",
        "Total number of requests evaluated by the stub selector",
        &["outcome"]  // outcome: matched|unmatched
    )
    .unwrap();

    /// Time spent selecting a mapping for one request
    pub static ref MATCH_DURATION_SECONDS: Histogram = register_histogram!(
        "mimic_match_duration_seconds",
        "Histogram of stub selection time in seconds",
        vec![0.00001, 0.00005, 0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05]
    )
    .unwrap();

    /// Mappings currently registered
    pub static ref REGISTERED_MAPPINGS: Gauge = register_gauge!(
        "mimic_registered_mappings",
        "Number of stub mappings currently registered"
    )
    .unwrap();

    /// Scenario state transitions applied while serving
    pub static ref SCENARIO_TRANSITIONS_TOTAL: CounterVec = register_counter_vec!(
        "mimic_scenario_transitions_total",
        "Total number of scenario state transitions",
        &["scenario"]
    )
    .unwrap();

    /// Journal entries dropped by a bounded journal
    pub static ref JOURNAL_EVICTIONS_TOTAL: Counter = register_counter!(
        "mimic_journal_evictions_total",
        "Total number of serve events evicted from a bounded request journal"
    )
    .unwrap();
}

/// Collect and return all metrics in Prometheus text format
pub fn collect_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Helper to record a selection outcome and its duration
pub fn record_selection(matched: bool, duration_secs: f64) {
    let outcome = if matched { "matched" } else { "unmatched" };
    REQUESTS_TOTAL.with_label_values(&[outcome]).inc();
    MATCH_DURATION_SECONDS.observe(duration_secs);
}

/// Helper to set the registered mappings gauge
pub fn set_registered_mappings(count: usize) {
    REGISTERED_MAPPINGS.set(count as f64);
}

/// Helper to record a scenario transition
pub fn record_scenario_transition(scenario: &str) {
    SCENARIO_TRANSITIONS_TOTAL
        .with_label_values(&[scenario])
        .inc();
}

/// Helper to record journal evictions
pub fn record_journal_evictions(count: usize) {
    JOURNAL_EVICTIONS_TOTAL.inc_by(count as f64);
}
