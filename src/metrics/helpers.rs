//! Metrics helper structs for convenient metric recording

use prometheus::{Encoder, TextEncoder};

use super::{
    AUTH_ATTEMPTS_TOTAL, BACKPRESSURE_WARNINGS_TOTAL, CONNECTIONS_ACTIVE,
    CONNECTIONS_AUTHENTICATED, CONNECTIONS_OPENED_TOTAL, ERROR_REPLIES_TOTAL,
    FRAMES_DELIVERED_TOTAL, FRAMES_FAILED_TOTAL, INACTIVE_REMOVED_TOTAL, REQUESTS_TOTAL,
    REQUEST_DURATION, ROOMS_ACTIVE, USERS_ONLINE,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Registry gauges and lifecycle counters
pub struct ConnectionMetrics;

impl ConnectionMetrics {
    pub fn record_opened() {
        CONNECTIONS_OPENED_TOTAL.inc();
    }

    pub fn record_auth(success: bool) {
        let result = if success { "success" } else { "failure" };
        AUTH_ATTEMPTS_TOTAL.with_label_values(&[result]).inc();
    }

    pub fn record_inactive_removed(count: u64) {
        INACTIVE_REMOVED_TOTAL.inc_by(count);
    }

    /// Refresh gauges from a registry snapshot
    pub fn set_gauges(total: usize, authenticated: usize, users: usize, rooms: usize) {
        CONNECTIONS_ACTIVE.set(total as i64);
        CONNECTIONS_AUTHENTICATED.set(authenticated as i64);
        USERS_ONLINE.set(users as i64);
        ROOMS_ACTIVE.set(rooms as i64);
    }
}

/// Transport write outcomes
pub struct DeliveryMetrics;

impl DeliveryMetrics {
    /// `target` is one of connection, user, room, broadcast
    pub fn record_delivered(target: &str, count: u64) {
        FRAMES_DELIVERED_TOTAL.with_label_values(&[target]).inc_by(count);
    }

    pub fn record_failed() {
        FRAMES_FAILED_TOTAL.inc();
    }

    pub fn record_backpressure() {
        BACKPRESSURE_WARNINGS_TOTAL.inc();
    }
}

/// Inbound request handling
pub struct DispatchMetrics;

impl DispatchMetrics {
    pub fn record_request(kind: &str, seconds: f64) {
        REQUESTS_TOTAL.with_label_values(&[kind]).inc();
        REQUEST_DURATION.with_label_values(&[kind]).observe(seconds);
    }

    pub fn record_error(code: &str) {
        ERROR_REPLIES_TOTAL.with_label_values(&[code]).inc();
    }
}
