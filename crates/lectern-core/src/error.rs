//! Error types module
//!
//! All errors in the ingestion and rendering paths are unified under the
//! [`AppError`] enum. Ingestion-path variants map onto HTTP responses via the
//! [`ErrorMetadata`] trait; render-worker variants (`SourceNotFound`,
//! `ConvertFailed`, `UploadFailed`, `DbUpdateFailed`) are recorded against the
//! asset and logged rather than returned to a caller.
//!
//! The `Database` variant and `From<sqlx::Error>` are gated behind the `sqlx`
//! feature so pure-logic consumers can build without a database stack.

use std::io;

#[cfg(feature = "sqlx")]
use sqlx::Error as SqlxError;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like validation failures
    Debug,
    /// Warning level - for recoverable issues
    Warn,
    /// Error level - for unexpected failures
    Error,
}

/// Metadata for error responses - defines how an error should be presented.
/// This trait allows errors to self-describe their HTTP response characteristics.
pub trait ErrorMetadata {
    /// HTTP status code to return
    fn http_status_code(&self) -> u16;

    /// Machine-readable error code (e.g., "INVALID_REQUEST")
    fn error_code(&self) -> &'static str;

    /// Whether this error is recoverable (can be retried)
    fn is_recoverable(&self) -> bool;

    /// Suggested action for the client
    fn suggested_action(&self) -> Option<&'static str>;

    /// Client-facing message (may differ from internal error message)
    fn client_message(&self) -> String;

    /// Whether details should be hidden in production
    fn is_sensitive(&self) -> bool;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[source] SqlxError),

    #[cfg(not(feature = "sqlx"))]
    #[error("Database error: {0}")]
    Database(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("File too large: {0}")]
    PayloadTooLarge(String),

    #[error("Asset is still processing: {0}")]
    Locked(String),

    #[error("Source not found: {0}")]
    SourceNotFound(String),

    #[error("Conversion failed: {0}")]
    ConvertFailed(String),

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Database update failed: {0}")]
    DbUpdateFailed(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Internal error with source")]
    InternalWithSource {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

#[cfg(feature = "sqlx")]
impl From<SqlxError> for AppError {
    fn from(err: SqlxError) -> Self {
        AppError::Database(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalWithSource {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<io::Error> for AppError {
    fn from(err: io::Error) -> Self {
        AppError::Internal(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidRequest(format!("JSON parsing error: {}", err))
    }
}

impl From<uuid::Error> for AppError {
    fn from(err: uuid::Error) -> Self {
        AppError::InvalidRequest(format!("UUID parsing error: {}", err))
    }
}

/// Static metadata for each variant: (http_status, error_code, recoverable, suggested_action, sensitive, log_level).
/// Reduces duplication in the ErrorMetadata impl; client_message stays per-variant for dynamic content.
fn app_error_static_metadata(
    err: &AppError,
) -> (
    u16,
    &'static str,
    bool,
    Option<&'static str>,
    bool,
    LogLevel,
) {
    match err {
        AppError::Database(_) => (
            500,
            "DATABASE_ERROR",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
        AppError::Storage(_) => (
            500,
            "STORAGE_ERROR",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
        AppError::InvalidRequest(_) => (
            400,
            "INVALID_REQUEST",
            false,
            Some("Check request parameters and try again"),
            false,
            LogLevel::Debug,
        ),
        AppError::Forbidden(_) => (
            403,
            "FORBIDDEN",
            false,
            Some("Verify you have management rights on the target container"),
            false,
            LogLevel::Debug,
        ),
        AppError::NotFound(_) => (
            404,
            "NOT_FOUND",
            false,
            Some("Verify the resource ID exists"),
            false,
            LogLevel::Debug,
        ),
        AppError::PayloadTooLarge(_) => (
            413,
            "PAYLOAD_TOO_LARGE",
            false,
            Some("Reduce file size or use chunked upload"),
            false,
            LogLevel::Debug,
        ),
        AppError::Locked(_) => (
            423,
            "STILL_PROCESSING",
            true,
            Some("Poll again once rendering has completed"),
            false,
            LogLevel::Debug,
        ),
        AppError::SourceNotFound(_) => (
            500,
            "SOURCE_NOT_FOUND",
            false,
            Some("Replay the render job after re-staging the source"),
            true,
            LogLevel::Error,
        ),
        AppError::ConvertFailed(_) => (
            500,
            "CONVERT_FAILED",
            false,
            Some("Check the source document format"),
            true,
            LogLevel::Error,
        ),
        AppError::UploadFailed(_) => (
            500,
            "UPLOAD_FAILED",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
        AppError::DbUpdateFailed(_) => (
            500,
            "DB_UPDATE_FAILED",
            true,
            Some("Replay the render job"),
            true,
            LogLevel::Error,
        ),
        AppError::Internal(_) => (
            500,
            "INTERNAL_ERROR",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
        AppError::InternalWithSource { .. } => (
            500,
            "INTERNAL_ERROR",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
    }
}

impl AppError {
    /// Get the error type name for detailed error responses
    pub fn error_type(&self) -> &str {
        match self {
            AppError::Database(_) => "Database",
            AppError::Storage(_) => "Storage",
            AppError::InvalidRequest(_) => "InvalidRequest",
            AppError::Forbidden(_) => "Forbidden",
            AppError::NotFound(_) => "NotFound",
            AppError::PayloadTooLarge(_) => "PayloadTooLarge",
            AppError::Locked(_) => "Locked",
            AppError::SourceNotFound(_) => "SourceNotFound",
            AppError::ConvertFailed(_) => "ConvertFailed",
            AppError::UploadFailed(_) => "UploadFailed",
            AppError::DbUpdateFailed(_) => "DbUpdateFailed",
            AppError::Internal(_) => "Internal",
            AppError::InternalWithSource { .. } => "Internal",
        }
    }

    /// Get detailed error information including error chain
    pub fn detailed_message(&self) -> String {
        use std::error::Error;

        let mut details = self.to_string();

        let mut source = self.source();
        let mut depth = 0;
        while let Some(err) = source {
            depth += 1;
            if depth > 5 {
                details.push_str("\n  ... (truncated)");
                break;
            }
            details.push_str(&format!("\n  Caused by: {}", err));
            source = err.source();
        }

        details
    }

    /// Stable failure label stored on the asset when a render step fails.
    /// Render-step variants map onto their step names; anything else is "RENDER_FAILED".
    pub fn render_failure_code(&self) -> &'static str {
        match self {
            AppError::SourceNotFound(_) => "SOURCE_NOT_FOUND",
            AppError::ConvertFailed(_) => "CONVERT_FAILED",
            AppError::UploadFailed(_) => "UPLOAD_FAILED",
            AppError::DbUpdateFailed(_) => "DB_UPDATE_FAILED",
            _ => "RENDER_FAILED",
        }
    }
}

impl ErrorMetadata for AppError {
    fn http_status_code(&self) -> u16 {
        app_error_static_metadata(self).0
    }

    fn error_code(&self) -> &'static str {
        app_error_static_metadata(self).1
    }

    fn is_recoverable(&self) -> bool {
        app_error_static_metadata(self).2
    }

    fn suggested_action(&self) -> Option<&'static str> {
        app_error_static_metadata(self).3
    }

    fn is_sensitive(&self) -> bool {
        app_error_static_metadata(self).4
    }

    fn log_level(&self) -> LogLevel {
        app_error_static_metadata(self).5
    }

    fn client_message(&self) -> String {
        match self {
            AppError::Database(_) => "Failed to access database".to_string(),
            AppError::Storage(_) => "Failed to access storage".to_string(),
            AppError::InvalidRequest(ref msg) => msg.clone(),
            AppError::Forbidden(ref msg) => msg.clone(),
            AppError::NotFound(ref msg) => msg.clone(),
            AppError::PayloadTooLarge(ref msg) => msg.clone(),
            AppError::Locked(ref msg) => msg.clone(),
            AppError::SourceNotFound(_) => "Source document unavailable".to_string(),
            AppError::ConvertFailed(_) => "Failed to convert document".to_string(),
            AppError::UploadFailed(_) => "Failed to store rendered document".to_string(),
            AppError::DbUpdateFailed(_) => "Failed to record render result".to_string(),
            AppError::Internal(_) => "Internal server error".to_string(),
            AppError::InternalWithSource { .. } => "Internal server error".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_metadata_invalid_request() {
        let err = AppError::InvalidRequest("chunk index out of range".to_string());
        assert_eq!(err.http_status_code(), 400);
        assert_eq!(err.error_code(), "INVALID_REQUEST");
        assert!(!err.is_recoverable());
        assert_eq!(err.client_message(), "chunk index out of range");
        assert!(!err.is_sensitive());
        assert_eq!(err.log_level(), LogLevel::Debug);
    }

    #[test]
    fn test_error_metadata_forbidden() {
        let err = AppError::Forbidden("not the session owner".to_string());
        assert_eq!(err.http_status_code(), 403);
        assert_eq!(err.error_code(), "FORBIDDEN");
        assert_eq!(err.client_message(), "not the session owner");
    }

    #[test]
    fn test_error_metadata_locked_is_not_fatal() {
        let err = AppError::Locked("document is still rendering".to_string());
        assert_eq!(err.http_status_code(), 423);
        assert_eq!(err.error_code(), "STILL_PROCESSING");
        assert!(err.is_recoverable());
        assert_eq!(err.log_level(), LogLevel::Debug);
    }

    #[test]
    fn test_render_failure_codes() {
        assert_eq!(
            AppError::SourceNotFound("x".into()).render_failure_code(),
            "SOURCE_NOT_FOUND"
        );
        assert_eq!(
            AppError::ConvertFailed("x".into()).render_failure_code(),
            "CONVERT_FAILED"
        );
        assert_eq!(
            AppError::UploadFailed("x".into()).render_failure_code(),
            "UPLOAD_FAILED"
        );
        assert_eq!(
            AppError::DbUpdateFailed("x".into()).render_failure_code(),
            "DB_UPDATE_FAILED"
        );
        assert_eq!(
            AppError::Internal("x".into()).render_failure_code(),
            "RENDER_FAILED"
        );
    }

    #[test]
    fn test_sensitive_errors_hide_details() {
        let err = AppError::ConvertFailed("soffice exited with status 1".to_string());
        assert!(err.is_sensitive());
        assert_eq!(err.client_message(), "Failed to convert document");
    }

    #[test]
    fn test_detailed_message_includes_chain() {
        let source = anyhow::anyhow!("disk full");
        let err = AppError::InternalWithSource {
            message: "write failed".to_string(),
            source,
        };
        let details = err.detailed_message();
        assert!(details.contains("Caused by: disk full"));
    }
}
