//! HTTP API for parking queries and refresh control.

pub mod parking;
pub mod refresh;
pub mod request_id;
mod routes;
pub mod stats;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::api::request_id::RequestId;
use crate::state::AppState;

/// Error response shared by every handler.
pub type ApiError = (StatusCode, Json<Value>);

pub fn routes() -> Router<Arc<AppState>> {
    routes::create_router()
}

pub(crate) fn error_response(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(json!({ "error": message.into() })))
}

/// Like [`error_response`], with the request id echoed in the body.
pub(crate) fn request_error(
    status: StatusCode,
    message: impl Into<String>,
    request_id: Option<&RequestId>,
) -> ApiError {
    let (status, Json(mut body)) = error_response(status, message);
    if let Some(request_id) = request_id {
        body["request_id"] = Value::String(request_id.to_string());
    }
    (status, Json(body))
}
