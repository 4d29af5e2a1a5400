//! Alerts handlers

use axum::{extract::{State, Query}, Json};

use flowguard_core::Alert;

use crate::{AppState, AppResult, AppError};
use crate::models::AlertQuery;

/// Most recent alerts, oldest first
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<AlertQuery>,
) -> AppResult<Json<Vec<Alert>>> {
    let limit = query.limit();
    let store = state.store.clone();

    let alerts = tokio::task::spawn_blocking(move || store.read_recent(limit))
        .await
        .map_err(|e| AppError::InternalError(format!("alert read failed: {}", e)))?;

    Ok(Json(alerts))
}
