use thiserror::Error;

/// Errors raised while moving a document through the ingestion pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("backend timed out: {0}")]
    BackendTimeout(String),

    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("index corruption for document {document_id}: {details}")]
    IndexCorruption {
        document_id: String,
        details: String,
    },
}

impl PipelineError {
    /// Transient errors are eligible for a bounded retry at the coordinator
    /// level; everything else is reported immediately.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PipelineError::BackendTimeout(_) | PipelineError::BackendUnavailable(_)
        )
    }

    /// Map a transport error from an outbound backend call onto the taxonomy.
    pub fn from_transport(backend: &str, error: reqwest::Error) -> Self {
        if error.is_timeout() {
            PipelineError::BackendTimeout(format!("{backend}: {error}"))
        } else if error.is_connect() {
            PipelineError::BackendUnavailable(format!("{backend}: {error}"))
        } else {
            PipelineError::BackendResponse {
                backend: backend.to_string(),
                details: error.to_string(),
            }
        }
    }
}

/// Errors raised while serving a search query.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("{backend} unavailable: {details}")]
    BackendUnavailable { backend: String, details: String },

    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },
}

/// The classification backend replied with something that is not the
/// requested JSON schema. Always resolved locally with the documented
/// fallback value, never surfaced to callers as an error.
#[derive(Debug, Error)]
#[error("classification response did not match schema: {0}")]
pub struct ParseFailure(pub String);

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
