use axum::{extract::State, response::IntoResponse};
use serde::Serialize;
use sync_core::{JobId, JobResult};
use tracing::{info, warn};

use crate::{handlers::AppState, ApiResponse};

#[derive(Debug, Serialize)]
pub struct JobAccepted {
    pub job_id: JobId,
    pub records: usize,
}

/// Outbound-message endpoint: the body is the XML notification
pub async fn receive_notification(
    State(state): State<AppState>,
    body: String,
) -> ApiResponse<JobAccepted> {
    match state.flow.on_push(body).await {
        Ok(handle) => {
            info!(
                "[{}] Notification started job {}",
                state.flow.name(),
                handle.job_id
            );
            ApiResponse::success(
                JobAccepted {
                    job_id: handle.job_id,
                    records: handle.total,
                },
                "Notification accepted",
            )
        }
        Err(e) => {
            warn!("[{}] Notification rejected: {}", state.flow.name(), e);
            ApiResponse::from_error("Notification rejected", &e)
        }
    }
}

/// Run one poll tick now and wait for its batch
pub async fn run_poll(State(state): State<AppState>) -> impl IntoResponse {
    match state.flow.run_once().await {
        Ok(Some(result)) => {
            let message = if result.is_successful() {
                "Batch completed"
            } else {
                "Batch completed with failures"
            };
            ApiResponse::<Option<JobResult>>::success(Some(result), message)
        }
        Ok(None) => ApiResponse::success(None, "No changes"),
        Err(e) => ApiResponse::from_error("Poll failed", &e),
    }
}
