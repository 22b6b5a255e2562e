//! Error types for the Love Journal backend.

use thiserror::Error;

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type shared by every crate in the workspace.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// User record not found
    #[error("User not found: {0}")]
    UserNotFound(String),

    /// Memory record not found
    #[error("Memory not found: {0}")]
    MemoryNotFound(uuid::Uuid),

    /// Image host rejected or failed a call
    #[error("Image store error: {0}")]
    ImageStore(String),

    /// Identity provider rejected or failed a call
    #[error("Identity provider error: {0}")]
    Identity(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Authentication failed
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Forbidden (authenticated but not allowed)
    #[error("Forbidden: {0}")]
    Forbidden(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_error_display_not_found() {
        let err = Error::NotFound("test resource".to_string());
        assert_eq!(err.to_string(), "Not found: test resource");
    }

    #[test]
    fn test_error_display_user_not_found() {
        let err = Error::UserNotFound("uid-123".to_string());
        assert_eq!(err.to_string(), "User not found: uid-123");
    }

    #[test]
    fn test_error_display_memory_not_found() {
        let id = Uuid::nil();
        let err = Error::MemoryNotFound(id);
        assert_eq!(err.to_string(), format!("Memory not found: {}", id));
    }

    #[test]
    fn test_error_display_image_store() {
        let err = Error::ImageStore("destroy love-journal/u1/a failed".to_string());
        assert_eq!(
            err.to_string(),
            "Image store error: destroy love-journal/u1/a failed"
        );
    }

    #[test]
    fn test_error_display_identity() {
        let err = Error::Identity("INVALID_ID_TOKEN".to_string());
        assert_eq!(err.to_string(), "Identity provider error: INVALID_ID_TOKEN");
    }

    #[test]
    fn test_error_display_unauthorized_and_forbidden() {
        assert_eq!(
            Error::Unauthorized("missing token".into()).to_string(),
            "Unauthorized: missing token"
        );
        assert_eq!(
            Error::Forbidden("not your image".into()).to_string(),
            "Forbidden: not your image"
        );
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let err: Error = json_err.into();
        match err {
            Error::Serialization(msg) => assert!(!msg.is_empty()),
            _ => panic!("Expected Serialization error"),
        }
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }

    #[test]
    fn test_error_debug_format() {
        let err = Error::NotFound("test".to_string());
        assert!(format!("{:?}", err).contains("NotFound"));
    }
}
