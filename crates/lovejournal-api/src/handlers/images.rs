//! Single image deletion.

use axum::{extract::rejection::JsonRejection, extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use lovejournal_core::{belongs_to_user, public_id_from_reference, DeleteOutcome};

use super::{ok, ApiResult};
use crate::auth::RequireAuth;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteImageRequest {
    pub public_id: Option<String>,
    pub url: Option<String>,
    /// Memory whose image list should drop the reference.
    pub memory_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteImageResponse {
    pub public_id: String,
    /// False when the image was already gone.
    pub deleted: bool,
    pub reference_removed: bool,
}

/// `POST /api/v1/images/delete`
///
/// Deletes one image from the caller's folder. Deleting an image that no
/// longer exists succeeds with `deleted: false`.
pub async fn delete_image(
    State(state): State<AppState>,
    auth: RequireAuth,
    payload: Result<Json<DeleteImageRequest>, JsonRejection>,
) -> ApiResult<DeleteImageResponse> {
    let Json(req) = payload?;

    let reference = req
        .public_id
        .or(req.url)
        .filter(|r| !r.trim().is_empty())
        .ok_or_else(|| ApiError::InvalidArgument("publicId or url is required".to_string()))?;
    let public_id = public_id_from_reference(&reference).ok_or_else(|| {
        ApiError::InvalidArgument(format!("not an image reference: {reference}"))
    })?;

    if !belongs_to_user(&public_id, &state.root_folder, &auth.uid) {
        return Err(ApiError::PermissionDenied(
            "image is outside the caller's folder".to_string(),
        ));
    }

    // Check memory ownership before touching the image host.
    let memory = match req.memory_id {
        Some(id) => {
            let memory = state
                .store
                .memories
                .get(id)
                .await?
                .ok_or(lovejournal_core::Error::MemoryNotFound(id))?;
            if memory.user_id != auth.uid {
                return Err(ApiError::PermissionDenied(
                    "memory belongs to another user".to_string(),
                ));
            }
            Some(memory)
        }
        None => None,
    };

    let outcome = state.images.destroy(&public_id).await?;

    let mut reference_removed = false;
    if let Some(memory) = memory {
        let stored: Vec<&String> = memory
            .images
            .iter()
            .filter(|r| public_id_from_reference(r).as_deref() == Some(public_id.as_str()))
            .collect();
        for r in stored {
            reference_removed |= state.store.memories.remove_image(memory.id, r).await?;
        }
    }

    info!(
        subsystem = "api",
        op = "delete_image",
        user_id = %auth.uid,
        public_id = %public_id,
        outcome = ?outcome,
        reference_removed,
        "Image deleted"
    );

    ok(DeleteImageResponse {
        public_id,
        deleted: outcome == DeleteOutcome::Deleted,
        reference_removed,
    })
}
