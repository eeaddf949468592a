use crate::error::SearchError;
use crate::index::{tokenize, SearchIndex};
use crate::models::{Document, SearchMode, SearchQuery, SearchResult};
use crate::store::DocumentStore;
use crate::traits::EmbeddingBackend;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::warn;

/// Weight of a query term matching the filename as a substring.
pub const FILENAME_WEIGHT: f32 = 2.0;

/// Serves keyword and semantic queries over the index. Read-only; every
/// query works on a snapshot and never blocks ingestion.
pub struct SearchService {
    index: Arc<SearchIndex>,
    documents: Arc<DocumentStore>,
    embedder: Arc<dyn EmbeddingBackend>,
    snippet_context: usize,
}

struct ScoredHit {
    document: Document,
    category: String,
    score: f64,
    uploaded_at: DateTime<Utc>,
    snippet_needle: Option<String>,
}

impl SearchService {
    pub fn new(
        index: Arc<SearchIndex>,
        documents: Arc<DocumentStore>,
        embedder: Arc<dyn EmbeddingBackend>,
        snippet_context: usize,
    ) -> Self {
        Self {
            index,
            documents,
            embedder,
            snippet_context,
        }
    }

    /// Ordered, finite result sequence; callers re-issue for pagination.
    /// An empty query returns an empty result set, not all documents.
    pub async fn query(&self, query: &SearchQuery) -> Result<Vec<SearchResult>, SearchError> {
        let text = query.text.trim();
        if text.is_empty() {
            return Ok(Vec::new());
        }

        let mut hits = match query.mode {
            SearchMode::Keyword => self.score_keyword(text),
            SearchMode::Semantic => self.score_semantic(text).await?,
        };

        hits.sort_by(|left, right| {
            right
                .score
                .total_cmp(&left.score)
                .then_with(|| right.uploaded_at.cmp(&left.uploaded_at))
        });

        // Filters are post-filters: applied after scoring, never part of it.
        hits.retain(|hit| query.filters.matches(&hit.category, &hit.document.media_type));
        hits.truncate(query.top_k);

        Ok(hits
            .into_iter()
            .map(|hit| self.into_result(hit))
            .collect())
    }

    fn score_keyword(&self, text: &str) -> Vec<ScoredHit> {
        let terms = tokenize(text);
        let mut hits = Vec::new();

        for (document_id, entry) in self.index.snapshot() {
            let Some(document) = self.documents.document(&document_id) else {
                warn!(%document_id, "index entry without a document record, skipping");
                continue;
            };

            let filename = document.filename.to_lowercase();
            let mut score = 0f32;
            let mut needle = None;

            for term in &terms {
                if let Some(weight) = entry.terms.get(term) {
                    score += weight;
                    if needle.is_none() {
                        needle = Some(term.clone());
                    }
                }
                if filename.contains(term) {
                    score += FILENAME_WEIGHT;
                    if needle.is_none() {
                        needle = Some(term.clone());
                    }
                }
            }

            if score > 0.0 {
                hits.push(self.hit(document, f64::from(score), needle));
            }
        }

        hits
    }

    /// Documents without a computed vector are excluded, never approximated.
    async fn score_semantic(&self, text: &str) -> Result<Vec<ScoredHit>, SearchError> {
        let query_vector = self.embedder.embed(text).await.map_err(|error| {
            let backend = self.embedder.name().to_string();
            let details = error.to_string();
            if error.is_transient() {
                SearchError::BackendUnavailable { backend, details }
            } else {
                SearchError::BackendResponse { backend, details }
            }
        })?;

        let mut hits = Vec::new();
        for (document_id, entry) in self.index.snapshot() {
            let Some(vector) = entry.vector else {
                continue;
            };
            if vector.len() != query_vector.len() {
                warn!(%document_id, "vector dimension mismatch, skipping");
                continue;
            }
            let Some(document) = self.documents.document(&document_id) else {
                warn!(%document_id, "index entry without a document record, skipping");
                continue;
            };

            let score = cosine_similarity(&query_vector, &vector);
            hits.push(self.hit(document, score, None));
        }

        Ok(hits)
    }

    fn hit(&self, document: Document, score: f64, snippet_needle: Option<String>) -> ScoredHit {
        let category = self
            .documents
            .classification(&document.id)
            .map(|classification| classification.category)
            .unwrap_or_else(|| "Uncategorized".to_string());

        ScoredHit {
            uploaded_at: document.uploaded_at,
            category,
            score,
            snippet_needle,
            document,
        }
    }

    fn into_result(&self, hit: ScoredHit) -> SearchResult {
        let text = self
            .documents
            .extracted_text(&hit.document.id)
            .map(|extracted| extracted.text)
            .unwrap_or_default();

        SearchResult {
            snippet: build_snippet(&text, hit.snippet_needle.as_deref(), self.snippet_context),
            document_id: hit.document.id,
            filename: hit.document.filename,
            media_type: hit.document.media_type,
            category: hit.category,
            score: hit.score,
        }
    }
}

pub fn cosine_similarity(left: &[f32], right: &[f32]) -> f64 {
    let mut dot = 0f64;
    let mut left_norm = 0f64;
    let mut right_norm = 0f64;

    for (a, b) in left.iter().zip(right.iter()) {
        dot += f64::from(*a) * f64::from(*b);
        left_norm += f64::from(*a) * f64::from(*a);
        right_norm += f64::from(*b) * f64::from(*b);
    }

    let denominator = left_norm.sqrt() * right_norm.sqrt();
    if denominator == 0.0 {
        0.0
    } else {
        dot / denominator
    }
}

/// Bounded excerpt of matching context: the text around the first needle
/// occurrence when one is present, otherwise the leading portion.
pub fn build_snippet(text: &str, needle: Option<&str>, context: usize) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let position = needle.and_then(|needle| {
        let lowered = trimmed.to_lowercase();
        // Byte offsets in the lowered copy only line up when folding did not
        // change lengths; otherwise fall back to a case-sensitive find.
        if lowered.len() == trimmed.len() {
            lowered.find(&needle.to_lowercase()).map(|pos| (pos, needle.len()))
        } else {
            trimmed.find(needle).map(|pos| (pos, needle.len()))
        }
    });

    match position {
        Some((pos, needle_len)) => {
            let mut start = pos.saturating_sub(context);
            while start > 0 && !trimmed.is_char_boundary(start) {
                start -= 1;
            }
            let mut end = (pos + needle_len + context).min(trimmed.len());
            while end < trimmed.len() && !trimmed.is_char_boundary(end) {
                end += 1;
            }

            let mut snippet = String::new();
            if start > 0 {
                snippet.push_str("...");
            }
            snippet.push_str(&trimmed[start..end]);
            if end < trimmed.len() {
                snippet.push_str("...");
            }
            snippet
        }
        None => {
            let limit = context * 2;
            if trimmed.chars().count() <= limit {
                trimmed.to_string()
            } else {
                let head: String = trimmed.chars().take(limit).collect();
                format!("{head}...")
            }
        }
    }
}
