//! Job status handlers

use axum::{extract::{State, Path}, Json};

use flowguard_core::{JobKey, JobSnapshot};

use crate::{AppState, AppResult, AppError};

/// All known jobs, newest first
pub async fn list(State(state): State<AppState>) -> Json<Vec<JobSnapshot>> {
    Json(state.dispatcher.jobs())
}

/// Single job by key
pub async fn get(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> AppResult<Json<JobSnapshot>> {
    let job = state
        .dispatcher
        .status(&JobKey::from(key))
        .ok_or_else(|| AppError::NotFound("Job not found".to_string()))?;

    Ok(Json(job))
}
