use crate::error::PipelineError;
use async_trait::async_trait;

/// Text-in, text-out generation backend used for classification and
/// simulated OCR. Implementations make exactly one outbound call per
/// invocation; retry policy lives with the coordinator.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, PipelineError>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

/// Text-in, fixed-length-vector-out embedding backend.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, PipelineError>;

    fn dimensions(&self) -> usize;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

/// Best-effort text recognition for image and scanned formats. The contract
/// is plausible text for the given media type, not byte-exact ground truth.
#[async_trait]
pub trait OcrBackend: Send + Sync {
    async fn recognize(
        &self,
        bytes: &[u8],
        media_type: &str,
        filename: &str,
    ) -> Result<String, PipelineError>;
}
