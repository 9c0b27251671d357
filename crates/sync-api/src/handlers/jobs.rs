use axum::{
    extract::{Path, State},
    response::IntoResponse,
};
use sync_core::{JobId, JobState};

use crate::{handlers::AppState, ApiResponse};

pub async fn list_jobs(State(state): State<AppState>) -> impl IntoResponse {
    let jobs = state.flow.runner().jobs().await;
    ApiResponse::success(jobs, "Jobs retrieved successfully")
}

pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResponse<JobState> {
    let job_id: JobId = match id.parse() {
        Ok(job_id) => job_id,
        Err(e) => return ApiResponse::from_error("Invalid job id", &e),
    };

    match state.flow.runner().job_state(job_id).await {
        Some(job) => ApiResponse::success(job, "Job retrieved successfully"),
        None => ApiResponse::not_found("Job"),
    }
}
