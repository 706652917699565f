//! Prometheus metrics for the messaging service.
//!
//! - Session metrics (active sessions, connected users, groups)
//! - Packet metrics (received by namespace, rejected, delivered)
//! - Connection lifecycle (opened, closed, duration, auth failures)
//! - Cluster forwarding

mod helpers;
mod listener;

pub use helpers::{encode_metrics, ClusterMetrics, ConnectionMetrics, PacketMetrics};
pub use listener::MetricsListener;

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "ara_im";

lazy_static! {
    // ============================================================================
    // Session Metrics
    // ============================================================================

    /// Sessions currently in the registry
    pub static ref SESSIONS_ACTIVE: IntGauge = register_int_gauge!(
        format!("{}_sessions_active", METRIC_PREFIX),
        "Number of registered sessions"
    ).unwrap();

    /// Distinct uids with at least one session
    pub static ref USERS_CONNECTED: IntGauge = register_int_gauge!(
        format!("{}_users_connected", METRIC_PREFIX),
        "Number of unique connected users"
    ).unwrap();

    /// Groups with at least one subscriber
    pub static ref GROUPS_ACTIVE: IntGauge = register_int_gauge!(
        format!("{}_groups_active", METRIC_PREFIX),
        "Number of groups with at least one subscriber"
    ).unwrap();

    // ============================================================================
    // Packet Metrics
    // ============================================================================

    pub static ref PACKETS_RECEIVED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_packets_received_total", METRIC_PREFIX),
        "Total packets received from clients",
        &["ns"]
    ).unwrap();

    pub static ref PACKETS_REJECTED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_packets_rejected_total", METRIC_PREFIX),
        "Total inbound packets answered with an error packet",
        &["reason"]
    ).unwrap();

    /// Per-recipient deliveries
    pub static ref PACKETS_DELIVERED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_packets_delivered_total", METRIC_PREFIX),
        "Total packets enqueued to recipient sessions",
        &["kind"]
    ).unwrap();

    pub static ref DELIVERY_FAILURES_TOTAL: IntCounter = register_int_counter!(
        format!("{}_delivery_failures_total", METRIC_PREFIX),
        "Total deliveries dropped because the recipient was closing or full"
    ).unwrap();

    pub static ref STORAGE_FAILURES_TOTAL: IntCounter = register_int_counter!(
        format!("{}_storage_failures_total", METRIC_PREFIX),
        "Total message storage failures"
    ).unwrap();

    // ============================================================================
    // Connection Metrics
    // ============================================================================

    pub static ref CONNECTIONS_OPENED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_connections_opened_total", METRIC_PREFIX),
        "Total WebSocket connections opened"
    ).unwrap();

    pub static ref CONNECTIONS_CLOSED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_connections_closed_total", METRIC_PREFIX),
        "Total WebSocket connections closed"
    ).unwrap();

    pub static ref AUTH_FAILURES_TOTAL: IntCounter = register_int_counter!(
        format!("{}_auth_failures_total", METRIC_PREFIX),
        "Total connections rejected during authentication"
    ).unwrap();

    pub static ref CONNECTION_DURATION: Histogram = register_histogram!(
        format!("{}_connection_duration_seconds", METRIC_PREFIX),
        "WebSocket connection duration in seconds",
        vec![1.0, 5.0, 10.0, 30.0, 60.0, 300.0, 600.0, 1800.0, 3600.0]
    ).unwrap();

    // ============================================================================
    // Cluster Metrics
    // ============================================================================

    pub static ref CLUSTER_MESSAGES_FORWARDED: IntCounter = register_int_counter!(
        format!("{}_cluster_messages_forwarded_total", METRIC_PREFIX),
        "Total packets published to other instances"
    ).unwrap();

    pub static ref CLUSTER_MESSAGES_RECEIVED: IntCounter = register_int_counter!(
        format!("{}_cluster_messages_received_total", METRIC_PREFIX),
        "Total packets received from other instances"
    ).unwrap();

    pub static ref CLUSTER_RECONNECTIONS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_cluster_reconnections_total", METRIC_PREFIX),
        "Total cluster subscription reconnect attempts"
    ).unwrap();
}
