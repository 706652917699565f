//! Metrics helper structs for convenient metric recording

use std::time::Duration;

use prometheus::{Encoder, TextEncoder};

use crate::packet::Packet;
use crate::session::IndexStats;

use super::{
    AUTH_FAILURES_TOTAL, CLUSTER_MESSAGES_FORWARDED, CLUSTER_MESSAGES_RECEIVED,
    CLUSTER_RECONNECTIONS_TOTAL, CONNECTIONS_CLOSED_TOTAL, CONNECTIONS_OPENED_TOTAL,
    CONNECTION_DURATION, DELIVERY_FAILURES_TOTAL, GROUPS_ACTIVE, PACKETS_DELIVERED_TOTAL,
    PACKETS_RECEIVED_TOTAL, PACKETS_REJECTED_TOTAL, SESSIONS_ACTIVE, STORAGE_FAILURES_TOTAL,
    USERS_CONNECTED,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

pub struct ConnectionMetrics;

impl ConnectionMetrics {
    pub fn record_opened() {
        CONNECTIONS_OPENED_TOTAL.inc();
    }

    pub fn record_closed(duration: Duration) {
        CONNECTIONS_CLOSED_TOTAL.inc();
        CONNECTION_DURATION.observe(duration.as_secs_f64());
    }

    pub fn record_auth_failure() {
        AUTH_FAILURES_TOTAL.inc();
    }

    /// Mirror the index sizes into the gauges
    pub fn set_index(stats: IndexStats) {
        SESSIONS_ACTIVE.set(stats.sessions as i64);
        USERS_CONNECTED.set(stats.users as i64);
        GROUPS_ACTIVE.set(stats.groups as i64);
    }
}

pub struct PacketMetrics;

impl PacketMetrics {
    pub fn record_received(packet: &Packet) {
        // Client-chosen namespaces must not become label values
        let ns = match packet {
            Packet::Unknown { .. } => "unknown",
            known => known.ns(),
        };
        PACKETS_RECEIVED_TOTAL.with_label_values(&[ns]).inc();
    }

    pub fn record_decode_failure() {
        PACKETS_REJECTED_TOTAL.with_label_values(&["decode"]).inc();
    }

    pub fn record_unknown_namespace() {
        PACKETS_REJECTED_TOTAL
            .with_label_values(&["unknown_namespace"])
            .inc();
    }

    pub fn record_rejected() {
        PACKETS_REJECTED_TOTAL.with_label_values(&["handler"]).inc();
    }

    /// `kind` is `private`, `group` or `cluster`
    pub fn record_delivered(kind: &str, count: u64) {
        if count > 0 {
            PACKETS_DELIVERED_TOTAL.with_label_values(&[kind]).inc_by(count);
        }
    }

    pub fn record_delivery_failed(count: u64) {
        DELIVERY_FAILURES_TOTAL.inc_by(count);
    }

    pub fn record_storage_failure() {
        STORAGE_FAILURES_TOTAL.inc();
    }
}

pub struct ClusterMetrics;

impl ClusterMetrics {
    pub fn record_forwarded() {
        CLUSTER_MESSAGES_FORWARDED.inc();
    }

    pub fn record_received() {
        CLUSTER_MESSAGES_RECEIVED.inc();
    }

    pub fn record_reconnect() {
        CLUSTER_RECONNECTIONS_TOTAL.inc();
    }
}
