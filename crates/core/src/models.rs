use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a document as it moves through the ingestion pipeline.
///
/// `Indexed` and `Failed` are terminal. Extraction and classification
/// failures do not reach `Failed`; they degrade to fallback values and the
/// pipeline continues, so `Failed` only marks documents that could not be
/// indexed at all.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Uploaded,
    Extracting,
    Extracted,
    Classifying,
    Classified,
    Indexed,
    Failed,
}

/// A stored document. Immutable once created except for `status`; the raw
/// bytes live in an external blob store referenced by `raw_content_ref`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub filename: String,
    pub media_type: String,
    pub byte_size: u64,
    pub uploaded_at: DateTime<Utc>,
    pub raw_content_ref: String,
    pub status: DocumentStatus,
}

impl Document {
    /// A freshly accepted upload: new opaque id, current timestamp,
    /// `Uploaded` status.
    pub fn new(
        filename: impl Into<String>,
        media_type: impl Into<String>,
        byte_size: u64,
        raw_content_ref: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            filename: filename.into(),
            media_type: media_type.into(),
            byte_size,
            uploaded_at: Utc::now(),
            raw_content_ref: raw_content_ref.into(),
            status: DocumentStatus::Uploaded,
        }
    }
}

/// Plain text produced by extraction. Exactly one per document; recomputed
/// on re-processing, replacing the prior value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedText {
    pub document_id: String,
    pub text: String,
    pub extracted_at: DateTime<Utc>,
}

/// Structured metadata produced by the classification backend.
///
/// Every field carries a serde default so a schema-conformant response with
/// missing fields decodes to that field's empty value; a response that is
/// not valid JSON at all is resolved by the caller via [`Classification::fallback`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub entities: Vec<String>,
    #[serde(default)]
    pub confidence: f32,
}

impl Classification {
    /// The fixed value substituted when the classification backend fails or
    /// returns something that does not decode.
    pub fn fallback() -> Self {
        Self {
            category: "Uncategorized".to_string(),
            tags: vec!["unclassified".to_string()],
            summary: String::new(),
            entities: Vec::new(),
            confidence: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    Keyword,
    Semantic,
}

/// Exact-match predicates applied to results after scoring. They never
/// influence the score itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueryFilters {
    pub category: Option<String>,
    pub media_type: Option<String>,
}

impl QueryFilters {
    pub fn matches(&self, category: &str, media_type: &str) -> bool {
        self.category.as_deref().map_or(true, |want| want == category)
            && self.media_type.as_deref().map_or(true, |want| want == media_type)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    pub text: String,
    pub mode: SearchMode,
    pub filters: QueryFilters,
    pub top_k: usize,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>, mode: SearchMode) -> Self {
        Self {
            text: text.into(),
            mode,
            filters: QueryFilters::default(),
            top_k: 10,
        }
    }
}

/// One ranked hit. Ephemeral, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub document_id: String,
    pub filename: String,
    pub media_type: String,
    pub category: String,
    pub score: f64,
    pub snippet: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_classification_matches_documented_value() {
        let fallback = Classification::fallback();
        assert_eq!(fallback.category, "Uncategorized");
        assert_eq!(fallback.tags, vec!["unclassified".to_string()]);
        assert_eq!(fallback.summary, "");
        assert!(fallback.entities.is_empty());
        assert_eq!(fallback.confidence, 0.5);
    }

    #[test]
    fn filters_default_to_match_everything() {
        let filters = QueryFilters::default();
        assert!(filters.matches("Invoice", "application/pdf"));
    }

    #[test]
    fn filters_require_exact_category_and_media_type() {
        let filters = QueryFilters {
            category: Some("Invoice".to_string()),
            media_type: Some("application/pdf".to_string()),
        };
        assert!(filters.matches("Invoice", "application/pdf"));
        assert!(!filters.matches("Report", "application/pdf"));
        assert!(!filters.matches("Invoice", "image/png"));
    }
}
