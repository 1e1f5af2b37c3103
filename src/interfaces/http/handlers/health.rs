//! Health check handler

use std::sync::Arc;
use std::time::Instant;

use axum::{extract::State, Json};
use serde::Serialize;

use crate::application::session::SharedSessionRegistry;

#[derive(Clone)]
pub struct HealthState {
    pub session_registry: SharedSessionRegistry,
    pub started_at: Arc<Instant>,
}

/// Service health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub connected_charge_points: Vec<String>,
}

pub async fn health_check(State(state): State<HealthState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        connected_charge_points: state.session_registry.connected_ids(),
    })
}
