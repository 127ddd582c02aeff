//! `GET /health` and `GET /ready` endpoint handlers.
//!
//! `/health` always answers `200` with a [`HealthResponse`] describing the
//! instance. `/ready` answers `200` once the flag client holds toggles and
//! `503` before that, for load-balancer readiness probes.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::client::EvaluationClient;
use crate::config::ResolvedConfig;

#[derive(Clone)]
pub struct HealthState {
    pub client: Arc<dyn EvaluationClient>,
    pub config: Arc<ResolvedConfig>,
    pub start_time: Instant,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub app_name: String,
    pub instance_id: String,
    pub ready: bool,
}

pub async fn health_handler(State(state): State<HealthState>) -> Json<HealthResponse> {
    let ready = state.client.is_ready();
    Json(HealthResponse {
        status: if ready { "healthy" } else { "starting" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        app_name: state.config.app_name.clone(),
        instance_id: state.config.instance_id.clone(),
        ready,
    })
}

pub async fn ready_handler(State(state): State<HealthState>) -> (StatusCode, &'static str) {
    if state.client.is_ready() {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready")
    }
}
