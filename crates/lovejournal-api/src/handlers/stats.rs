//! On-demand per-user stats.

use axum::extract::State;

use lovejournal_core::UserStats;
use lovejournal_jobs::recompute_user_stats;

use super::{ok, ApiResult};
use crate::auth::RequireAuth;
use crate::state::AppState;

/// `POST /api/v1/stats/recompute`
pub async fn recompute_stats(
    State(state): State<AppState>,
    auth: RequireAuth,
) -> ApiResult<UserStats> {
    let stats = recompute_user_stats(&state.store, &auth.uid).await?;
    ok(stats)
}
