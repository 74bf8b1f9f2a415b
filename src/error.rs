use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsuccessful HTTP status: {0}")]
    Unsuccessful(reqwest::StatusCode),

    #[error("no images available")]
    NoImages,

    #[error("Not found: {0}")]
    NotFound(String),

    /// A metadata row exists but its blob does not.
    #[error("image {id} has no blob ({hash})")]
    MissingBlob { id: i64, hash: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Whether this is the store rejecting a second row for an existing fingerprint.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            AppError::Database(sqlx::Error::Database(e)) => e.is_unique_violation(),
            _ => false,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error".to_string())
            }
            AppError::Io(e) => {
                tracing::error!("IO error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "IO error".to_string())
            }
            AppError::Request(e) => {
                tracing::error!("Request error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "External request error".to_string())
            }
            AppError::Json(e) => {
                tracing::error!("JSON error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Serialization error".to_string())
            }
            AppError::Unsuccessful(status) => {
                tracing::error!("Unsuccessful upstream status: {}", status);
                (StatusCode::INTERNAL_SERVER_ERROR, "External request error".to_string())
            }
            AppError::NoImages => {
                tracing::warn!("Random image requested but none are available");
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::MissingBlob { id, hash } => {
                tracing::error!(
                    id = *id,
                    hash = %hash,
                    "CONSISTENCY FAILURE: image row exists without a blob"
                );
                (StatusCode::INTERNAL_SERVER_ERROR, "Something went wrong".to_string())
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg.clone())
            }
        };

        (status, message).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
