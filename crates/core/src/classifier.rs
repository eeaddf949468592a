use crate::error::{ParseFailure, PipelineError};
use crate::models::Classification;
use crate::traits::GenerationBackend;
use std::sync::Arc;
use tracing::warn;

/// Derives structured metadata from extracted text by prompting the
/// generation backend for a fixed JSON schema.
pub struct Classifier {
    backend: Arc<dyn GenerationBackend>,
    prefix_chars: usize,
}

impl Classifier {
    pub fn new(backend: Arc<dyn GenerationBackend>, prefix_chars: usize) -> Self {
        Self {
            backend,
            prefix_chars,
        }
    }

    /// Never propagates an error: backend failures and undecodable replies
    /// both resolve to [`Classification::fallback`].
    pub async fn classify(&self, text: &str) -> Classification {
        match self.try_classify(text).await {
            Ok(classification) => classification,
            Err(error) => {
                warn!(%error, "classification degraded to fallback");
                Classification::fallback()
            }
        }
    }

    /// Single backend call. `Err` is reserved for transport failures the
    /// coordinator may retry; an undecodable reply is resolved here with the
    /// documented fallback, never surfaced as an error.
    pub async fn try_classify(&self, text: &str) -> Result<Classification, PipelineError> {
        let prompt = self.build_prompt(text);
        let raw = self.backend.generate(&prompt).await?;

        Ok(match parse_classification(&raw) {
            Ok(classification) => classification,
            Err(failure) => {
                warn!(%failure, "classification reply did not decode, using fallback");
                Classification::fallback()
            }
        })
    }

    /// Truncation is deterministic: the first `prefix_chars` characters,
    /// with the full length passed alongside for context.
    fn build_prompt(&self, text: &str) -> String {
        let prefix: String = text.chars().take(self.prefix_chars).collect();
        format!(
            "Classify the following document text into appropriate categories and \
             extract key metadata. The document is {} characters long; the text \
             begins: \"{prefix}\"\n\n\
             Return the result as JSON with the following structure:\n\
             {{\n\
               \"category\": \"The primary category (e.g., Invoice, Contract, Report, etc.)\",\n\
               \"tags\": [\"tag1\", \"tag2\", \"tag3\"],\n\
               \"summary\": \"A brief summary of the document content\",\n\
               \"entities\": [\"List of key entities mentioned\"],\n\
               \"confidence\": 0.95\n\
             }}",
            text.chars().count()
        )
    }
}

/// Strict JSON decode of a backend reply. Pure; the fallback on failure is
/// the caller's decision, not hidden in here.
pub fn parse_classification(raw: &str) -> Result<Classification, ParseFailure> {
    let mut classification: Classification = serde_json::from_str(raw.trim())
        .map_err(|error| ParseFailure(error.to_string()))?;
    classification.confidence = classification.confidence.clamp(0.0, 1.0);
    Ok(classification)
}
