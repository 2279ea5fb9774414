//! Prometheus metrics for the chat hub.
//!
//! - Connection metrics (active, authenticated, online users, rooms)
//! - Fan-out metrics (frames delivered and failed by target)
//! - Dispatch metrics (inbound requests by kind, error replies by code, latency)

mod helpers;

pub use helpers::{encode_metrics, ConnectionMetrics, DeliveryMetrics, DispatchMetrics};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, register_int_gauge,
    HistogramVec, IntCounter, IntCounterVec, IntGauge,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "chat";

lazy_static! {
    // ============================================================================
    // Connection Metrics
    // ============================================================================

    /// Open WebSocket connections, authenticated or not
    pub static ref CONNECTIONS_ACTIVE: IntGauge = register_int_gauge!(
        format!("{}_connections_active", METRIC_PREFIX),
        "Number of open WebSocket connections"
    ).unwrap();

    /// Connections bound to a user
    pub static ref CONNECTIONS_AUTHENTICATED: IntGauge = register_int_gauge!(
        format!("{}_connections_authenticated", METRIC_PREFIX),
        "Number of authenticated WebSocket connections"
    ).unwrap();

    /// Connections ever registered
    pub static ref CONNECTIONS_OPENED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_connections_opened_total", METRIC_PREFIX),
        "Total WebSocket connections registered"
    ).unwrap();

    /// Users with at least one live authenticated connection
    pub static ref USERS_ONLINE: IntGauge = register_int_gauge!(
        format!("{}_users_online", METRIC_PREFIX),
        "Number of users with a live authenticated connection"
    ).unwrap();

    /// Rooms with at least one subscriber
    pub static ref ROOMS_ACTIVE: IntGauge = register_int_gauge!(
        format!("{}_rooms_active", METRIC_PREFIX),
        "Number of conversations with at least one subscribed connection"
    ).unwrap();

    /// Authentication attempts by result
    pub static ref AUTH_ATTEMPTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_auth_attempts_total", METRIC_PREFIX),
        "Authentication attempts",
        &["result"]
    ).unwrap();

    /// Connections removed by the inactivity sweep
    pub static ref INACTIVE_REMOVED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_inactive_connections_removed_total", METRIC_PREFIX),
        "Total connections removed for inactivity"
    ).unwrap();

    // ============================================================================
    // Fan-out Metrics
    // ============================================================================

    /// Frames written to a transport, by target type
    pub static ref FRAMES_DELIVERED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_frames_delivered_total", METRIC_PREFIX),
        "Total outbound frames accepted by a transport",
        &["target"]
    ).unwrap();

    /// Transport write failures
    pub static ref FRAMES_FAILED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_frames_failed_total", METRIC_PREFIX),
        "Total outbound frames rejected by a transport"
    ).unwrap();

    /// Writes that left a connection's buffer above the backpressure threshold
    pub static ref BACKPRESSURE_WARNINGS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_backpressure_warnings_total", METRIC_PREFIX),
        "Total writes observed above the backpressure threshold"
    ).unwrap();

    // ============================================================================
    // Dispatch Metrics
    // ============================================================================

    /// Inbound requests by kind
    pub static ref REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_requests_total", METRIC_PREFIX),
        "Inbound requests by kind",
        &["kind"]
    ).unwrap();

    /// Error envelopes sent, by code
    pub static ref ERROR_REPLIES_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_error_replies_total", METRIC_PREFIX),
        "Error envelopes sent to clients",
        &["code"]
    ).unwrap();

    /// Handler latency by kind
    pub static ref REQUEST_DURATION: HistogramVec = register_histogram_vec!(
        format!("{}_request_duration_seconds", METRIC_PREFIX),
        "Time spent handling an inbound request",
        &["kind"],
        vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]
    ).unwrap();
}
