//! Account removal and restore.
//!
//! Removal only marks the user; the account reaper deletes the data once the
//! grace period has elapsed. Until then the caller may restore the account.

use axum::extract::State;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use lovejournal_core::{UserRecord, UserStatus};

use super::{ok, ApiResult};
use crate::auth::RequireAuth;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountStatusResponse {
    pub status: UserStatus,
    pub removed_at: Option<DateTime<Utc>>,
    /// When the account becomes eligible for permanent deletion.
    pub purge_after: Option<DateTime<Utc>>,
}

async fn load_user(state: &AppState, uid: &str) -> Result<UserRecord, ApiError> {
    state
        .store
        .users
        .get(uid)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("user {uid}")))
}

/// `POST /api/v1/account/remove`
///
/// Marks the caller removed. Repeating the call keeps the original
/// `removedAt`, so it cannot extend the grace period.
pub async fn remove_account(
    State(state): State<AppState>,
    auth: RequireAuth,
) -> ApiResult<AccountStatusResponse> {
    let user = load_user(&state, &auth.uid).await?;

    let removed_at = match (user.status, user.removed_at) {
        (UserStatus::Removed, Some(at)) => at,
        _ => {
            let now = Utc::now();
            state
                .store
                .users
                .set_status(&auth.uid, UserStatus::Removed, Some(now))
                .await?;
            info!(
                subsystem = "api",
                op = "remove_account",
                user_id = %auth.uid,
                "Account marked removed"
            );
            now
        }
    };

    ok(AccountStatusResponse {
        status: UserStatus::Removed,
        removed_at: Some(removed_at),
        purge_after: Some(removed_at + state.grace_period),
    })
}

/// `POST /api/v1/account/restore`
pub async fn restore_account(
    State(state): State<AppState>,
    auth: RequireAuth,
) -> ApiResult<AccountStatusResponse> {
    let user = load_user(&state, &auth.uid).await?;

    let removed_at = match (user.status, user.removed_at) {
        (UserStatus::Removed, Some(at)) => at,
        _ => {
            return Err(ApiError::InvalidArgument(
                "account is not pending removal".to_string(),
            ))
        }
    };
    if user.is_reapable(Utc::now() - state.grace_period) {
        return Err(ApiError::InvalidArgument(
            "grace period has elapsed".to_string(),
        ));
    }

    state
        .store
        .users
        .set_status(&auth.uid, UserStatus::Active, None)
        .await?;
    info!(
        subsystem = "api",
        op = "restore_account",
        user_id = %auth.uid,
        removed_at = %removed_at,
        "Account restored"
    );

    ok(AccountStatusResponse {
        status: UserStatus::Active,
        removed_at: None,
        purge_after: None,
    })
}
