//! Prometheus metrics collection for fxchatd.
//!
//! Tracks connection counts, message throughput, validation failures,
//! backpressure drops, and notification outcomes.

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

/// Currently connected clients (connections, not distinct users).
pub static CONNECTED_CLIENTS: OnceLock<IntGauge> = OnceLock::new();

/// Messages routed through the hub, by kind (peer/channel).
pub static MESSAGES_ROUTED: OnceLock<IntCounterVec> = OnceLock::new();

/// Inbound messages rejected by validation, by error code.
pub static VALIDATION_FAILURES: OnceLock<IntCounterVec> = OnceLock::new();

/// Frames dropped because a connection's outbound queue was full.
pub static FRAMES_DROPPED: OnceLock<IntCounter> = OnceLock::new();

/// Notification dispatch attempts, by status (sent/failed/skipped).
pub static NOTIFICATIONS: OnceLock<IntCounterVec> = OnceLock::new();

/// Recipients reached per broadcast.
pub static BROADCAST_FANOUT: OnceLock<Histogram> = OnceLock::new();

/// Initialize the Prometheus metrics registry.
///
/// Must be called once at server startup before any metrics are recorded.
pub fn init() {
    let r = registry();

    macro_rules! register {
        ($metric:ident, $init:expr) => {
            let m = $init.expect(concat!(stringify!($metric), " creation failed"));
            if let Err(e) = r.register(Box::new(m.clone())) {
                tracing::warn!(error = %e, concat!("Failed to register metric ", stringify!($metric)));
            }
            let _ = $metric.set(m);
        };
    }

    register!(CONNECTED_CLIENTS, IntGauge::new("chat_connected_clients", "Currently connected clients"));
    register!(MESSAGES_ROUTED, IntCounterVec::new(Opts::new("chat_messages_routed_total", "Messages routed through the hub by kind"), &["kind"]));
    register!(VALIDATION_FAILURES, IntCounterVec::new(Opts::new("chat_validation_failures_total", "Inbound messages rejected by validation"), &["code"]));
    register!(FRAMES_DROPPED, IntCounter::new("chat_frames_dropped_total", "Frames dropped due to outbound backpressure"));
    register!(NOTIFICATIONS, IntCounterVec::new(Opts::new("chat_notifications_total", "Notification dispatch attempts by status"), &["status"]));
    register!(BROADCAST_FANOUT, Histogram::with_opts(
        HistogramOpts::new("chat_broadcast_fanout", "Recipients reached per broadcast")
            .buckets(vec![0.0, 1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0])));
}

/// Gather all metrics and encode them in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode Prometheus metrics");
        return String::new();
    }
    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Prometheus metrics were not valid UTF-8");
            String::new()
        }
    }
}

/// Set the connected-clients gauge.
#[inline]
pub fn set_connected_clients(count: i64) {
    if let Some(g) = CONNECTED_CLIENTS.get() {
        g.set(count);
    }
}

/// Record a routed message by kind ("peer" or "channel").
#[inline]
pub fn record_message(kind: &str) {
    if let Some(c) = MESSAGES_ROUTED.get() {
        c.with_label_values(&[kind]).inc();
    }
}

/// Record a validation failure by error code.
#[inline]
pub fn record_validation_failure(code: &str) {
    if let Some(c) = VALIDATION_FAILURES.get() {
        c.with_label_values(&[code]).inc();
    }
}

/// Record a frame dropped due to backpressure.
#[inline]
pub fn record_dropped_frame() {
    if let Some(c) = FRAMES_DROPPED.get() {
        c.inc();
    }
}

/// Record a notification attempt outcome.
#[inline]
pub fn record_notification(status: &str) {
    if let Some(c) = NOTIFICATIONS.get() {
        c.with_label_values(&[status]).inc();
    }
}

/// Record broadcast fan-out (queues reached by one broadcast).
#[inline]
pub fn record_fanout(recipients: usize) {
    if let Some(h) = BROADCAST_FANOUT.get() {
        h.observe(recipients as f64);
    }
}
