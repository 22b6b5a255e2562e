//! Memory listing and creation.

use std::collections::HashMap;

use axum::{extract::rejection::JsonRejection, extract::State, Json};
use tracing::{debug, info};

use lovejournal_core::{
    aggregate_memories, belongs_to_user, collect_all, public_id_from_reference, user_folder,
    CreateMemoryRequest, Memory, MemoryView,
};

use super::{ok, ApiResult};
use crate::auth::RequireAuth;
use crate::error::ApiError;
use crate::state::AppState;

/// `GET /api/v1/memories`
///
/// Lists the caller's images, groups them into memories and merges the
/// stored record fields. Newest date first.
pub async fn list_memories(
    State(state): State<AppState>,
    auth: RequireAuth,
) -> ApiResult<Vec<MemoryView>> {
    let prefix = user_folder(&state.root_folder, &auth.uid);
    let images = collect_all(state.images.as_ref(), &prefix, state.max_image_pages).await?;

    let records: HashMap<String, Memory> = state
        .store
        .memories
        .list_for_user(&auth.uid)
        .await?
        .into_iter()
        .map(|m| (m.id.to_string(), m))
        .collect();

    let views = aggregate_memories(images, &records);
    debug!(
        subsystem = "api",
        op = "list_memories",
        user_id = %auth.uid,
        result_count = views.len(),
        "Aggregated memories"
    );
    ok(views)
}

/// `POST /api/v1/memories`
///
/// Stores a memory record for images that were already uploaded into the
/// caller's folder.
pub async fn create_memory(
    State(state): State<AppState>,
    auth: RequireAuth,
    payload: Result<Json<CreateMemoryRequest>, JsonRejection>,
) -> ApiResult<Memory> {
    let Json(req) = payload?;

    if req.title.trim().is_empty() {
        return Err(ApiError::InvalidArgument("title is required".to_string()));
    }
    for reference in &req.images {
        let public_id = public_id_from_reference(reference).ok_or_else(|| {
            ApiError::InvalidArgument(format!("not an image reference: {reference}"))
        })?;
        if !belongs_to_user(&public_id, &state.root_folder, &auth.uid) {
            return Err(ApiError::PermissionDenied(format!(
                "image {public_id} is outside the caller's folder"
            )));
        }
    }

    let memory = req.into_memory(&auth.uid);
    state.store.memories.insert(&memory).await?;

    info!(
        subsystem = "api",
        op = "create_memory",
        user_id = %auth.uid,
        memory_id = %memory.id,
        image_count = memory.images.len(),
        "Memory created"
    );
    ok(memory)
}
