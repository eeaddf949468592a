pub mod backends;
pub mod classifier;
pub mod config;
pub mod error;
pub mod extractor;
pub mod index;
pub mod models;
pub mod pipeline;
pub mod search;
pub mod store;
pub mod traits;

pub use backends::{GenerativeOcr, OllamaEmbedder, OllamaGenerator};
pub use classifier::{parse_classification, Classifier};
pub use config::PipelineConfig;
pub use error::{ParseFailure, PipelineError, SearchError};
pub use extractor::{Extraction, Extractor};
pub use index::{build_term_weights, tokenize, IndexEntry, Indexer, SearchIndex, TAG_BOOST};
pub use models::{
    Classification, Document, DocumentStatus, ExtractedText, QueryFilters, SearchMode,
    SearchQuery, SearchResult,
};
pub use pipeline::{IngestionOutcome, PipelineCoordinator};
pub use search::{build_snippet, cosine_similarity, SearchService, FILENAME_WEIGHT};
pub use store::{digest_bytes, DocumentStore};
pub use traits::{EmbeddingBackend, GenerationBackend, OcrBackend};
