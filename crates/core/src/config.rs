use std::time::Duration;

/// Process-wide configuration for the ingestion and search pipeline.
///
/// Built once at startup and injected into the components that talk to
/// external backends; nothing in the pipeline reads ambient configuration
/// ad hoc.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Base URL of the text-generation backend (classification + simulated OCR).
    pub generation_url: String,
    /// Model identifier passed to the text-generation backend.
    pub generation_model: String,
    /// Base URL of the embedding backend.
    pub embedding_url: String,
    /// Model identifier passed to the embedding backend.
    pub embedding_model: String,
    /// Dimensionality of the vectors the embedding backend produces.
    pub embedding_dimensions: usize,
    /// Hard timeout applied to every outbound backend call.
    pub request_timeout: Duration,
    /// Deterministic prefix length the classifier feeds to the backend.
    pub classify_prefix_chars: usize,
    /// Bounded retries for transient backend failures, coordinator-level only.
    pub max_retries: usize,
    /// Base delay between retries; grows linearly per attempt.
    pub retry_backoff: Duration,
    /// Characters of context kept on either side of a keyword match in snippets.
    pub snippet_context_chars: usize,
    /// Maximum hits returned per query.
    pub search_top_k: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            generation_url: "http://localhost:11434".to_string(),
            generation_model: "llama3.1".to_string(),
            embedding_url: "http://localhost:11434".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            embedding_dimensions: 768,
            request_timeout: Duration::from_secs(30),
            classify_prefix_chars: 500,
            max_retries: 2,
            retry_backoff: Duration::from_millis(250),
            snippet_context_chars: 100,
            search_top_k: 10,
        }
    }
}
