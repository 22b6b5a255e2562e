//! Job run history.

use axum::extract::{rejection::QueryRejection, Path, Query, State};
use serde::Deserialize;

use lovejournal_core::defaults::{AUDIT_HISTORY_LIMIT, AUDIT_HISTORY_MAX_LIMIT};
use lovejournal_core::RunAudit;

use super::{ok, ApiResult};
use crate::auth::RequireAuth;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

/// `GET /api/v1/jobs/:name/history?limit=N`
///
/// Admin only. Most recent runs first. `limit` is clamped to `1..=200`.
pub async fn job_history(
    State(state): State<AppState>,
    auth: RequireAuth,
    Path(name): Path<String>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> ApiResult<Vec<RunAudit>> {
    if !state.is_admin(&auth.uid) {
        return Err(ApiError::PermissionDenied(
            "job history is restricted to administrators".to_string(),
        ));
    }
    let Query(query) = query?;
    let limit = query
        .limit
        .unwrap_or(AUDIT_HISTORY_LIMIT)
        .clamp(1, AUDIT_HISTORY_MAX_LIMIT);

    let runs = state.store.audit.history(&name, limit).await?;
    ok(runs)
}
