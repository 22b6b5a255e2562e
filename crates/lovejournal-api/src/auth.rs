//! Bearer token authentication.

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use tracing::debug;

use crate::error::ApiError;
use crate::state::AppState;

/// Extractor that requires a valid identity token.
///
/// The `Authorization: Bearer <token>` header is verified against the
/// identity provider; the resolved uid is the caller for every owned
/// resource.
///
/// ```ignore
/// async fn handler(auth: RequireAuth) -> Result<Json<Value>, ApiError> {
///     let uid = auth.uid;
///     // ...
/// }
/// ```
#[derive(Debug, Clone)]
pub struct RequireAuth {
    pub uid: String,
}

#[axum::async_trait]
impl FromRequestParts<AppState> for RequireAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header_value = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());

        let token = match header_value {
            Some(value) if value.starts_with("Bearer ") => {
                value.trim_start_matches("Bearer ").trim()
            }
            _ => {
                return Err(ApiError::Unauthenticated(
                    "missing bearer token".to_string(),
                ))
            }
        };
        if token.is_empty() {
            return Err(ApiError::Unauthenticated("empty bearer token".to_string()));
        }

        let uid = state.identity.verify_token(token).await.map_err(|e| {
            debug!(subsystem = "api", component = "auth", error = %e, "Token rejected");
            match e {
                lovejournal_core::Error::Unauthorized(msg) => ApiError::Unauthenticated(msg),
                other => ApiError::from(other),
            }
        })?;

        Ok(RequireAuth { uid })
    }
}
