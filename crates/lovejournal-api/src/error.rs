//! HTTP error mapping.
//!
//! Every failure is rendered as `{"error": {"message": ..., "status": ...}}`.

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use tracing::error;

#[derive(Debug)]
pub enum ApiError {
    Unauthenticated(String),
    PermissionDenied(String),
    InvalidArgument(String),
    NotFound(String),
    Internal(lovejournal_core::Error),
}

impl ApiError {
    /// Wire status code string.
    pub fn status_code(&self) -> &'static str {
        match self {
            ApiError::Unauthenticated(_) => "UNAUTHENTICATED",
            ApiError::PermissionDenied(_) => "PERMISSION_DENIED",
            ApiError::InvalidArgument(_) => "INVALID_ARGUMENT",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Internal(_) => "INTERNAL",
        }
    }

    fn http_status(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ApiError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            ApiError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<lovejournal_core::Error> for ApiError {
    fn from(err: lovejournal_core::Error) -> Self {
        use lovejournal_core::Error;

        match err {
            Error::NotFound(msg) => ApiError::NotFound(msg),
            Error::UserNotFound(uid) => ApiError::NotFound(format!("user {uid}")),
            Error::MemoryNotFound(id) => ApiError::NotFound(format!("memory {id}")),
            Error::InvalidInput(msg) => ApiError::InvalidArgument(msg),
            Error::Unauthorized(msg) => ApiError::Unauthenticated(msg),
            Error::Forbidden(msg) => ApiError::PermissionDenied(msg),
            other => ApiError::Internal(other),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::InvalidArgument(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::InvalidArgument(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.http_status();
        let code = self.status_code();
        let message = match self {
            ApiError::Internal(err) => {
                // Internal details stay in the logs.
                error!(subsystem = "api", error = %err, "Request failed");
                "internal error".to_string()
            }
            ApiError::Unauthenticated(msg)
            | ApiError::PermissionDenied(msg)
            | ApiError::InvalidArgument(msg)
            | ApiError::NotFound(msg) => msg,
        };

        let body = Json(serde_json::json!({
            "error": {
                "message": message,
                "status": code,
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lovejournal_core::Error;

    #[test]
    fn test_core_errors_map_to_wire_status() {
        let cases = [
            (Error::NotFound("x".into()), "NOT_FOUND"),
            (Error::UserNotFound("u1".into()), "NOT_FOUND"),
            (Error::MemoryNotFound(uuid::Uuid::nil()), "NOT_FOUND"),
            (Error::InvalidInput("bad".into()), "INVALID_ARGUMENT"),
            (Error::Unauthorized("token".into()), "UNAUTHENTICATED"),
            (Error::Forbidden("folder".into()), "PERMISSION_DENIED"),
            (Error::ImageStore("boom".into()), "INTERNAL"),
            (Error::Internal("boom".into()), "INTERNAL"),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status_code(), expected);
        }
    }

    #[test]
    fn test_http_status_codes() {
        assert_eq!(
            ApiError::Unauthenticated("x".into())
                .into_response()
                .status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::PermissionDenied("x".into())
                .into_response()
                .status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::Internal(Error::Internal("x".into()))
                .into_response()
                .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
