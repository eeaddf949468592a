pub mod ocr;
pub mod ollama;

pub use ocr::GenerativeOcr;
pub use ollama::{OllamaEmbedder, OllamaGenerator};
