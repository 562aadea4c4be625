use service_core::error::AppError;
use thiserror::Error;

/// Failure kinds of the document lifecycle operations.
///
/// Every variant is distinct enough for a caller to tell "not signed in" apart
/// from "network problem" apart from "file is corrupted".
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("no authenticated owner is available")]
    MissingOwner,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("index {index} is not valid for a snapshot of {len} documents")]
    InvalidIndex { index: usize, len: usize },

    #[error("document not found: {0}")]
    NotFound(String),

    #[error("blob store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("network error: {0}")]
    NetworkError(String),

    #[error("could not resolve a download location: {0}")]
    LocatorResolutionFailed(String),

    #[error("fetched bytes are not a valid document: {0}")]
    CorruptArtifact(String),

    #[error("local storage error: {0}")]
    LocalStorage(#[from] std::io::Error),
}

impl DocumentError {
    /// Short stable label, used for metrics and structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            DocumentError::MissingOwner => "missing_owner",
            DocumentError::InvalidInput(_) => "invalid_input",
            DocumentError::InvalidIndex { .. } => "invalid_index",
            DocumentError::NotFound(_) => "not_found",
            DocumentError::StoreUnavailable(_) => "store_unavailable",
            DocumentError::NetworkError(_) => "network_error",
            DocumentError::LocatorResolutionFailed(_) => "locator_resolution_failed",
            DocumentError::CorruptArtifact(_) => "corrupt_artifact",
            DocumentError::LocalStorage(_) => "local_storage",
        }
    }
}

impl From<validator::ValidationErrors> for DocumentError {
    fn from(err: validator::ValidationErrors) -> Self {
        DocumentError::InvalidInput(err.to_string())
    }
}

impl From<DocumentError> for AppError {
    fn from(err: DocumentError) -> Self {
        match err {
            DocumentError::MissingOwner => {
                AppError::Unauthorized(anyhow::anyhow!("Missing X-User-ID header"))
            }
            DocumentError::InvalidInput(msg) => AppError::BadRequest(anyhow::anyhow!(msg)),
            e @ DocumentError::InvalidIndex { .. } => AppError::Conflict(anyhow::Error::new(e)),
            DocumentError::NotFound(msg) => {
                AppError::NotFound(anyhow::anyhow!("Document not found: {}", msg))
            }
            DocumentError::StoreUnavailable(msg) => AppError::ServiceUnavailable(msg),
            DocumentError::NetworkError(msg) => AppError::BadGateway(msg),
            DocumentError::LocatorResolutionFailed(msg) => {
                AppError::BadGateway(format!("download location unavailable: {}", msg))
            }
            e @ DocumentError::CorruptArtifact(_) => {
                AppError::UnprocessableEntity(anyhow::Error::new(e))
            }
            DocumentError::LocalStorage(e) => AppError::InternalError(anyhow::Error::new(e)),
        }
    }
}
