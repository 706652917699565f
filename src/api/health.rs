//! Health check and statistics endpoints.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub sessions: SessionHealthResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster: Option<ClusterHealthResponse>,
}

#[derive(Debug, Serialize)]
pub struct SessionHealthResponse {
    pub total: usize,
    pub unique_users: usize,
    pub groups_count: usize,
}

#[derive(Debug, Serialize)]
pub struct ClusterHealthResponse {
    pub enabled: bool,
    pub server_id: String,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub sessions: usize,
    pub users: usize,
    pub groups: usize,
    pub namespaces: Vec<&'static str>,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let stats = state.registry.stats();

    let cluster = state.router.as_ref().map(|router| ClusterHealthResponse {
        enabled: true,
        server_id: router.server_id().to_string(),
    });

    // Cluster mode was requested but the transport could not be created
    let status = if state.settings.cluster.enabled && cluster.is_none() {
        "degraded"
    } else {
        "healthy"
    };

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        sessions: SessionHealthResponse {
            total: stats.sessions,
            unique_users: stats.users,
            groups_count: stats.groups,
        },
        cluster,
    })
}

pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let stats = state.registry.stats();
    let mut namespaces: Vec<&'static str> = state.dispatcher.namespaces().collect();
    namespaces.sort_unstable();

    Json(StatsResponse {
        sessions: stats.sessions,
        users: stats.users,
        groups: stats.groups,
        namespaces,
    })
}
