// Prometheus metrics definitions for the shot counter backend.

use lazy_static::lazy_static;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // ── Gauges ───────────────────────────────────────────────────────

    /// Live WebSocket connections.
    pub static ref CONNECTED_WEBSOCKETS: IntGauge =
        IntGauge::new("shot_counter_connected_websockets", "Live WebSocket connections").unwrap();

    // ── Counters ─────────────────────────────────────────────────────

    /// Engine actions committed, by action.
    pub static ref ACTIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("shot_counter_actions_total", "Engine actions committed"),
        &["action"],
    )
    .unwrap();

    /// Engine actions rolled back, by action and error kind.
    pub static ref ACTION_FAILURES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("shot_counter_action_failures_total", "Engine actions rolled back"),
        &["action", "kind"],
    )
    .unwrap();

    /// Up-checks resolved, by outcome.
    pub static ref UP_CHECKS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("shot_counter_up_checks_total", "Up-checks resolved"),
        &["outcome"],
    )
    .unwrap();

    /// Fight events written by committed actions.
    pub static ref EVENTS_APPENDED_TOTAL: IntCounter = IntCounter::new(
        "shot_counter_events_appended_total",
        "Fight events appended",
    )
    .unwrap();

    /// Notifications pushed to WebSocket clients.
    pub static ref WEBSOCKET_MESSAGES_SENT_TOTAL: IntCounter = IntCounter::new(
        "shot_counter_websocket_messages_sent_total",
        "Total WebSocket messages sent",
    )
    .unwrap();

    // ── Histograms ───────────────────────────────────────────────────

    /// Engine action duration in seconds, by action.
    pub static ref ACTION_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "shot_counter_action_duration_seconds",
            "Engine action duration in seconds",
        )
        .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 1.0]),
        &["action"],
    )
    .unwrap();
}

/// Register all metrics with the custom registry. Call once at startup.
pub fn register_metrics() {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(CONNECTED_WEBSOCKETS.clone()),
        Box::new(ACTIONS_TOTAL.clone()),
        Box::new(ACTION_FAILURES_TOTAL.clone()),
        Box::new(UP_CHECKS_TOTAL.clone()),
        Box::new(EVENTS_APPENDED_TOTAL.clone()),
        Box::new(WEBSOCKET_MESSAGES_SENT_TOTAL.clone()),
        Box::new(ACTION_DURATION_SECONDS.clone()),
    ];

    for c in collectors {
        if let Err(e) = REGISTRY.register(c) {
            tracing::warn!(error = %e, "metric already registered");
        }
    }
}

/// Serialize all registered metrics to the Prometheus text exposition format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
