use axum::{extract::State, response::IntoResponse};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use sync_core::{SyncFlow, TriggerPolicy, TriggerStatus};

use crate::ApiResponse;

pub mod jobs;
pub mod triggers;

#[derive(Clone)]
pub struct AppState {
    pub flow: Arc<SyncFlow>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(flow: Arc<SyncFlow>) -> Self {
        Self {
            flow,
            started_at: Instant::now(),
        }
    }
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_seconds: u64,
}

#[derive(Serialize)]
pub struct FlowInfo {
    pub name: String,
    pub policy: TriggerPolicy,
    pub trigger: TriggerStatus,
    pub destinations: Vec<String>,
}

pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let response = HealthResponse {
        status: "healthy".to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
    };

    ApiResponse::success(response, "System is healthy")
}

pub async fn get_flow(State(state): State<AppState>) -> impl IntoResponse {
    let flow = &state.flow;
    let info = FlowInfo {
        name: flow.name().to_string(),
        policy: flow.policy(),
        trigger: flow.trigger_status().await,
        destinations: flow
            .runner()
            .adapters()
            .iter()
            .map(|a| a.name().to_string())
            .collect(),
    };

    ApiResponse::success(info, "Flow retrieved successfully")
}
