use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec, IntCounterVec,
    TextEncoder,
};
use std::time::Duration;

lazy_static! {
    /// Uploads by outcome (distributed, deduplicated, failed, rejected).
    pub static ref UPLOAD_TOTAL: IntCounterVec = register_int_counter_vec!(
        "cdn_upload_total",
        "File uploads segmented by outcome",
        &["result"]
    )
    .expect("failed to register cdn_upload_total");

    /// Per-provider network calls segmented by operation and outcome.
    pub static ref PROVIDER_OPERATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "cdn_provider_operations_total",
        "Provider calls segmented by provider, operation and outcome",
        &["provider", "operation", "result"]
    )
    .expect("failed to register cdn_provider_operations_total");

    /// Routing decisions by the rule that produced them.
    pub static ref ROUTING_DECISIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "cdn_routing_decisions_total",
        "URL routing decisions segmented by selection rule",
        &["rule"]
    )
    .expect("failed to register cdn_routing_decisions_total");

    /// URL cache events (hit/miss/stale).
    pub static ref URL_CACHE_EVENTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "cdn_url_cache_events_total",
        "URL cache events segmented by outcome",
        &["event"]
    )
    .expect("failed to register cdn_url_cache_events_total");

    pub static ref PROBE_LATENCY_SECONDS: HistogramVec = register_histogram_vec!(
        "cdn_probe_latency_seconds",
        "Health probe latency per provider",
        &["provider"],
        vec![0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .expect("failed to register cdn_probe_latency_seconds");
}

pub fn record_upload(result: &str) {
    UPLOAD_TOTAL.with_label_values(&[result]).inc();
}

pub fn record_provider_operation(provider: &str, operation: &str, success: bool) {
    let result = if success { "success" } else { "failure" };
    PROVIDER_OPERATIONS_TOTAL
        .with_label_values(&[provider, operation, result])
        .inc();
}

pub fn record_routing_decision(rule: &str) {
    ROUTING_DECISIONS_TOTAL.with_label_values(&[rule]).inc();
}

pub fn record_url_cache_event(event: &str) {
    URL_CACHE_EVENTS_TOTAL.with_label_values(&[event]).inc();
}

pub fn observe_probe_latency(provider: &str, latency: Duration) {
    PROBE_LATENCY_SECONDS
        .with_label_values(&[provider])
        .observe(latency.as_secs_f64());
}

/// Render the default registry in the text exposition format
pub fn render() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
