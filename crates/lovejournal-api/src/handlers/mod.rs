//! HTTP handlers.
//!
//! Every success body is wrapped as `{"result": ...}`.

pub mod account;
pub mod images;
pub mod jobs;
pub mod memories;
pub mod stats;

use axum::Json;
use serde::Serialize;

use crate::error::ApiError;

/// Success envelope.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub result: T,
}

pub type ApiResult<T> = Result<Json<Envelope<T>>, ApiError>;

pub(crate) fn ok<T>(result: T) -> ApiResult<T> {
    Ok(Json(Envelope { result }))
}

/// Liveness check.
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
