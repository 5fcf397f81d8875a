use crate::blob_store::BlobError;
use crate::document_store::DocumentError;
use crate::metadata_store::EntityKind;
use thiserror::Error;

/// Errors surfaced by content operations
#[derive(Error, Debug)]
pub enum ContentError {
    #[error("{0}")]
    Validation(String),

    #[error("Invalid image encoding: {0}")]
    InvalidEncoding(String),

    #[error("Failed to save image: {0}")]
    ImagePersistFailed(String),

    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: String },

    #[error("{kind} {id} already exists")]
    Duplicate { kind: EntityKind, id: String },

    #[error("Content store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Request body too large: {0}")]
    PayloadTooLarge(String),
}

impl ContentError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Stable machine-readable code for API error bodies
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::InvalidEncoding(_) => "INVALID_ENCODING",
            Self::ImagePersistFailed(_) => "IMAGE_PERSIST_FAILED",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Duplicate { .. } => "DUPLICATE",
            Self::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            Self::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
        }
    }
}

impl From<BlobError> for ContentError {
    fn from(err: BlobError) -> Self {
        match err {
            BlobError::InvalidEncoding(_) | BlobError::Empty => {
                Self::InvalidEncoding(err.to_string())
            }
            BlobError::InvalidRef(_) | BlobError::Io { .. } => {
                Self::ImagePersistFailed(err.to_string())
            }
        }
    }
}

impl From<DocumentError> for ContentError {
    fn from(err: DocumentError) -> Self {
        match err {
            DocumentError::BlankKey => Self::Validation("key is required".to_string()),
            other => Self::StoreUnavailable(other.to_string()),
        }
    }
}

impl From<sqlx::Error> for ContentError {
    fn from(err: sqlx::Error) -> Self {
        Self::StoreUnavailable(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for ContentError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        Self::StoreUnavailable(err.to_string())
    }
}
