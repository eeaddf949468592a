use crate::error::PipelineError;
use crate::models::Classification;
use crate::traits::EmbeddingBackend;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Weight applied to terms coming from classification tags and category.
/// They are more specific signals than free body text.
pub const TAG_BOOST: f32 = 3.0;

/// Searchable representation of one document: a term-to-weight map for
/// keyword mode and, once embedded, a fixed-length vector for semantic mode.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub terms: HashMap<String, f32>,
    pub vector: Option<Vec<f32>>,
}

/// The shared index. Entries are replaced wholesale, one map operation per
/// mutation, so writes for the same document id serialize on the shard lock
/// while writes for different ids proceed concurrently. Readers work on
/// snapshots and never block on ingestion of unrelated documents.
#[derive(Default)]
pub struct SearchIndex {
    entries: DashMap<String, IndexEntry>,
}

impl SearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, document_id: &str, entry: IndexEntry) {
        self.entries.insert(document_id.to_string(), entry);
    }

    /// Idempotent; returns whether an entry was present.
    pub fn remove(&self, document_id: &str) -> bool {
        self.entries.remove(document_id).is_some()
    }

    pub fn get(&self, document_id: &str) -> Option<IndexEntry> {
        self.entries.get(document_id).map(|entry| entry.clone())
    }

    pub fn contains(&self, document_id: &str) -> bool {
        self.entries.contains_key(document_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of all entries for a read-only scoring pass.
    pub fn snapshot(&self) -> Vec<(String, IndexEntry)> {
        self.entries
            .iter()
            .map(|item| (item.key().clone(), item.value().clone()))
            .collect()
    }
}

/// Case-folded tokens split on non-alphanumeric boundaries.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|character: char| !character.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Term->weight map for one document: body tokens count once per occurrence,
/// tag and category tokens add [`TAG_BOOST`] on top.
pub fn build_term_weights(text: &str, classification: &Classification) -> HashMap<String, f32> {
    let mut terms: HashMap<String, f32> = HashMap::new();

    for token in tokenize(text) {
        *terms.entry(token).or_insert(0.0) += 1.0;
    }

    let boosted = classification
        .tags
        .iter()
        .map(String::as_str)
        .chain(std::iter::once(classification.category.as_str()));

    for signal in boosted {
        for token in tokenize(signal) {
            *terms.entry(token).or_insert(0.0) += TAG_BOOST;
        }
    }

    terms
}

/// Maintains the search index. `upsert` replaces a document's postings and
/// vector entirely; `remove` is an idempotent no-op when the id is absent.
pub struct Indexer {
    index: Arc<SearchIndex>,
    embedder: Arc<dyn EmbeddingBackend>,
}

impl Indexer {
    pub fn new(index: Arc<SearchIndex>, embedder: Arc<dyn EmbeddingBackend>) -> Self {
        Self { index, embedder }
    }

    /// Builds the full entry before touching the index, so a cancelled or
    /// failed upsert never leaves a half-written entry behind. An embedding
    /// failure is not an indexing failure: the keyword postings still land
    /// and the document stays out of semantic results until embedded.
    pub async fn upsert(
        &self,
        document_id: &str,
        text: &str,
        classification: &Classification,
    ) -> Result<(), PipelineError> {
        if document_id.is_empty() {
            return Err(PipelineError::InvalidInput(
                "document id must not be empty".to_string(),
            ));
        }

        let terms = build_term_weights(text, classification);

        let vector = if text.trim().is_empty() {
            None
        } else {
            match self.embedder.embed(text).await {
                Ok(vector) => Some(vector),
                Err(error) => {
                    warn!(
                        %document_id,
                        backend = self.embedder.name(),
                        %error,
                        "embedding unavailable, indexing keyword-only"
                    );
                    None
                }
            }
        };

        self.index.insert(document_id, IndexEntry { terms, vector });
        Ok(())
    }

    pub fn remove(&self, document_id: &str) -> bool {
        self.index.remove(document_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use async_trait::async_trait;

    struct FakeEmbedder {
        available: bool,
    }

    #[async_trait]
    impl EmbeddingBackend for FakeEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, PipelineError> {
            if !self.available {
                return Err(PipelineError::BackendUnavailable(
                    "embedding backend is down".to_string(),
                ));
            }
            // Deterministic toy embedding: letter histogram, normalized.
            let mut vector = vec![0f32; 26];
            for character in text.to_lowercase().chars() {
                if character.is_ascii_lowercase() {
                    vector[(character as u8 - b'a') as usize] += 1.0;
                }
            }
            let magnitude = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
            if magnitude > 0.0 {
                for value in &mut vector {
                    *value /= magnitude;
                }
            }
            Ok(vector)
        }

        fn dimensions(&self) -> usize {
            26
        }

        fn name(&self) -> &str {
            "fake-embed"
        }
    }

    fn indexer(index: Arc<SearchIndex>, available: bool) -> Indexer {
        Indexer::new(index, Arc::new(FakeEmbedder { available }))
    }

    fn classification(category: &str, tags: &[&str]) -> Classification {
        Classification {
            category: category.to_string(),
            tags: tags.iter().map(|tag| tag.to_string()).collect(),
            summary: String::new(),
            entities: Vec::new(),
            confidence: 0.9,
        }
    }

    #[test]
    fn tokenize_case_folds_and_splits_on_nonalphanumeric() {
        assert_eq!(
            tokenize("Invoice #12345 — Total Due $450.00"),
            vec!["invoice", "12345", "total", "due", "450", "00"]
        );
    }

    #[test]
    fn tags_and_category_are_boosted_over_body_terms() {
        let terms = build_term_weights(
            "quarterly figures",
            &classification("Report", &["finance"]),
        );
        assert_eq!(terms["quarterly"], 1.0);
        assert_eq!(terms["finance"], TAG_BOOST);
        assert_eq!(terms["report"], TAG_BOOST);
    }

    #[test]
    fn body_occurrence_of_a_tag_term_stacks_with_the_boost() {
        let terms = build_term_weights("invoice totals", &classification("Invoice", &[]));
        assert_eq!(terms["invoice"], 1.0 + TAG_BOOST);
    }

    #[tokio::test]
    async fn upsert_is_idempotent() {
        let index = Arc::new(SearchIndex::new());
        let indexer = indexer(Arc::clone(&index), true);
        let class = classification("Invoice", &["billing"]);

        indexer.upsert("doc-1", "Invoice body", &class).await.unwrap();
        let first = index.get("doc-1").unwrap();

        indexer.upsert("doc-1", "Invoice body", &class).await.unwrap();
        let second = index.get("doc-1").unwrap();

        assert_eq!(index.len(), 1);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn upsert_replaces_stale_postings_entirely() {
        let index = Arc::new(SearchIndex::new());
        let indexer = indexer(Arc::clone(&index), true);
        let class = classification("Report", &[]);

        indexer.upsert("doc-1", "alpha beta", &class).await.unwrap();
        indexer.upsert("doc-1", "gamma", &class).await.unwrap();

        let entry = index.get("doc-1").unwrap();
        assert!(!entry.terms.contains_key("alpha"));
        assert!(entry.terms.contains_key("gamma"));
    }

    #[tokio::test]
    async fn embedding_failure_still_indexes_keyword_postings() {
        let index = Arc::new(SearchIndex::new());
        let indexer = indexer(Arc::clone(&index), false);

        indexer
            .upsert("doc-1", "alpha beta", &classification("Report", &[]))
            .await
            .unwrap();

        let entry = index.get("doc-1").unwrap();
        assert!(entry.terms.contains_key("alpha"));
        assert!(entry.vector.is_none());
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let index = Arc::new(SearchIndex::new());
        let indexer = indexer(Arc::clone(&index), true);

        indexer
            .upsert("doc-1", "alpha", &classification("Report", &[]))
            .await
            .unwrap();

        assert!(indexer.remove("doc-1"));
        assert!(!indexer.remove("doc-1"));
        assert!(index.is_empty());
    }

    #[tokio::test]
    async fn empty_document_id_is_rejected() {
        let index = Arc::new(SearchIndex::new());
        let indexer = indexer(index, true);
        let result = indexer
            .upsert("", "alpha", &classification("Report", &[]))
            .await;
        assert!(matches!(result, Err(PipelineError::InvalidInput(_))));
    }
}
