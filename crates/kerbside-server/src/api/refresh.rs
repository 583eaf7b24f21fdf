//! Refresh control endpoints.

use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

use crate::refresh::{RefreshStatus, RefreshTrigger};
use crate::state::AppState;

/// Trigger a refresh. 202 when a cycle started, 200 when one was already running.
pub async fn trigger(State(state): State<Arc<AppState>>) -> (StatusCode, Json<RefreshTrigger>) {
    let trigger = state.refresh().refresh_now();
    let status = if trigger.started {
        tracing::info!("On-demand refresh started");
        StatusCode::ACCEPTED
    } else {
        StatusCode::OK
    };
    (status, Json(trigger))
}

pub async fn status(State(state): State<Arc<AppState>>) -> Json<RefreshStatus> {
    Json(state.refresh().status())
}
