use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use thiserror::Error; // Use thiserror for cleaner error definitions

// --- Domain/Infrastructure Errors ---

#[derive(Error, Debug)]
pub enum RepoError {
    #[error("{0} not found")]
    NotFound(String),

    /// A conditional write lost against a concurrent one, or the record is in
    /// a state that does not allow the operation.
    #[error("Conflicting update: {0}")]
    Conflict(String),

    #[error("Stored data could not be parsed: {0}")]
    DataCorruption(String),

    #[error("Config change rejected: {0}")]
    InvalidChange(#[from] crate::site_config::ConfigChangeError),

    #[error("Database backend error: {0}")]
    BackendError(#[from] anyhow::Error), // Wrap Anyhow errors from DB layer
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("File upload failed: {0}")]
    UploadFailed(String), // Pass specific reason

    #[error("File not found with key: {0}")]
    NotFound(String),

    #[error("Storage quota exceeded: {needed} bytes needed, {remaining} bytes remaining")]
    QuotaExceeded { needed: u64, remaining: u64 },

    #[error("Storage backend error: {0}")]
    BackendError(#[from] anyhow::Error), // Wrap Anyhow errors from Storage layer
}

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("File is empty")]
    Empty,
    #[error("Unsupported file type: {0}")]
    UnsupportedType(String),
    #[error("File is {size} bytes, the limit is {max} bytes")]
    TooLarge { size: usize, max: usize },
    #[error("Could not decode image: {0}")]
    Decode(#[source] image::ImageError),
    #[error("Could not encode image: {0}")]
    Encode(#[source] image::ImageError),
}

// --- Web Layer Error ---

#[derive(Error, Debug)]
pub enum AppError {
    // Input validation / request parsing errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Missing form field: {0}")]
    MissingFormField(String),
    #[error("Invalid JSON body: {0}")]
    JsonRejection(#[from] axum::extract::rejection::JsonRejection),
    #[error("Invalid query string: {0}")]
    QueryRejection(#[from] axum::extract::rejection::QueryRejection),
    #[error("Error processing multipart form data: {0}")]
    MultipartError(#[from] axum::extract::multipart::MultipartError),
    #[error("Invalid ID format: {0}")]
    InvalidUuid(#[from] uuid::Error),
    #[error("Admin credentials required")]
    Unauthorized,
    #[error("Profile was edited recently; next edit allowed at {next_allowed}")]
    CooldownActive { next_allowed: DateTime<Utc> },

    // Domain/Service level errors (mapped from RepoError/StorageError)
    #[error("{0} not found")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Could not save gallery data")]
    RepositoryError(#[source] RepoError), // Source allows seeing underlying RepoError
    #[error("Could not perform file storage operation")]
    StorageError(#[source] StorageError), // Source allows seeing underlying StorageError
    #[error("Storage quota exceeded")]
    QuotaExceeded(#[source] StorageError),
    #[error("Provider not configured: {0}")]
    ProviderUnavailable(String),

    // Configuration / Startup errors
    #[error("Configuration error: {0}")]
    ConfigError(String), // Keep simple string for now
    #[error("Initialization error: {0}")]
    InitError(String),

    // Generic Internal Server Error
    #[error("Internal server error: {0}")]
    InternalServerError(String), // Catch-all or specific internal issues
}

// --- Conversions from Domain Errors to AppError ---

impl From<RepoError> for AppError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound(what) => AppError::NotFound(what),
            RepoError::Conflict(msg) => AppError::Conflict(msg),
            RepoError::InvalidChange(e) => e.into(),
            e @ (RepoError::DataCorruption(_) | RepoError::BackendError(_)) => {
                AppError::RepositoryError(e)
            }
        }
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            e @ StorageError::QuotaExceeded { .. } => AppError::QuotaExceeded(e),
            e => AppError::StorageError(e),
        }
    }
}

impl From<MediaError> for AppError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::Encode(e) => AppError::InternalServerError(format!("image encode failed: {}", e)),
            other => AppError::InvalidInput(other.to_string()),
        }
    }
}

// Add From impl for ConfigError if Config::load can fail in main
impl From<crate::config::ConfigError> for AppError {
    fn from(err: crate::config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InitError(err.to_string())
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::InternalServerError(format!("background task failed: {}", err))
    }
}

/// Joins an error and all of its sources into one line.
pub fn error_chain(err: &dyn std::error::Error) -> String {
    let mut parts = vec![err.to_string()];
    let mut source = err.source();
    while let Some(inner) = source {
        parts.push(inner.to_string());
        source = inner.source();
    }
    parts.join(": ")
}

// --- Axum Response Implementation ---

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message, details) = match &self {
            // 4xx Client Errors
            AppError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg.clone(), None),
            AppError::MissingFormField(field) => (StatusCode::BAD_REQUEST, format!("Missing form field: {}", field), None),
            AppError::JsonRejection(e) => (StatusCode::BAD_REQUEST, "Invalid JSON body".to_string(), Some(e.body_text())),
            AppError::QueryRejection(e) => (StatusCode::BAD_REQUEST, "Invalid query string".to_string(), Some(e.body_text())),
            AppError::MultipartError(e) => (StatusCode::BAD_REQUEST, format!("Invalid multipart form data: {}", e), None),
            AppError::InvalidUuid(e) => (StatusCode::BAD_REQUEST, format!("Invalid ID format: {}", e), None),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Admin credentials required".to_string(), None),
            AppError::CooldownActive { next_allowed } => (
                StatusCode::TOO_MANY_REQUESTS,
                "Profile can only be edited once per cooldown period".to_string(),
                Some(format!("next edit allowed at {}", next_allowed.to_rfc3339())),
            ),
            AppError::NotFound(what) => (StatusCode::NOT_FOUND, format!("{} not found", what), None),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone(), None),

            // 5xx Server Errors
            AppError::RepositoryError(e) => {
                tracing::error!(error.source = ?e, "Repository error occurred");
                (StatusCode::INTERNAL_SERVER_ERROR, "Database operation failed".to_string(), Some(error_chain(e)))
            },
            AppError::StorageError(e) => {
                tracing::error!(error.source = ?e, "Storage error occurred");
                (StatusCode::INTERNAL_SERVER_ERROR, "File storage operation failed".to_string(), Some(error_chain(e)))
            },
            AppError::QuotaExceeded(e) => (StatusCode::INSUFFICIENT_STORAGE, "Storage quota exceeded".to_string(), Some(e.to_string())),
            AppError::ProviderUnavailable(what) => (StatusCode::SERVICE_UNAVAILABLE, format!("{} is not configured", what), None),
            AppError::ConfigError(msg) => {
                tracing::error!("Configuration error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Server configuration error".to_string(), None)
            },
            AppError::InitError(msg) => {
                tracing::error!("Initialization error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Server initialization error".to_string(), None)
            }
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal server error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "An internal server error occurred".to_string(), Some(msg.clone()))
            }
        };

        if status.is_server_error() {
            tracing::error!(error.message=%error_message, error.detail=%self, "Responding with error");
        } else {
            tracing::warn!(error.message=%error_message, error.status=%status, "Rejecting request");
        }

        // Build JSON response
        let body = match details {
            Some(details) => serde_json::json!({ "error": error_message, "details": details }),
            None => serde_json::json!({ "error": error_message }),
        };
        (status, Json(body)).into_response()
    }
}
