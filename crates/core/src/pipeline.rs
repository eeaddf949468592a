use crate::classifier::Classifier;
use crate::error::PipelineError;
use crate::extractor::{Extraction, Extractor};
use crate::index::{Indexer, SearchIndex};
use crate::models::{Classification, Document, DocumentStatus};
use crate::store::DocumentStore;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

/// What an ingestion run produced. `extraction_failure` carries the recorded
/// reason when extraction degraded to empty text.
#[derive(Debug, Clone)]
pub struct IngestionOutcome {
    pub document: Document,
    pub classification: Classification,
    pub extraction_failure: Option<String>,
}

/// Sequences extract -> classify -> index for each document and persists
/// intermediate records after every stage, so an interrupted ingestion
/// resumes from the last completed stage instead of re-extracting.
///
/// Retry policy for transient backend failures lives here, not inside the
/// Extractor or Classifier: each of those makes a single outbound call per
/// invocation.
pub struct PipelineCoordinator {
    store: Arc<DocumentStore>,
    index: Arc<SearchIndex>,
    extractor: Arc<Extractor>,
    classifier: Arc<Classifier>,
    indexer: Indexer,
    max_retries: usize,
    retry_backoff: Duration,
}

impl PipelineCoordinator {
    pub fn new(
        store: Arc<DocumentStore>,
        index: Arc<SearchIndex>,
        extractor: Arc<Extractor>,
        classifier: Arc<Classifier>,
        indexer: Indexer,
        max_retries: usize,
        retry_backoff: Duration,
    ) -> Self {
        Self {
            store,
            index,
            extractor,
            classifier,
            indexer,
            max_retries,
            retry_backoff,
        }
    }

    /// Registers the document and runs the full pipeline on it.
    pub async fn ingest(
        &self,
        document: Document,
        bytes: &[u8],
    ) -> Result<IngestionOutcome, PipelineError> {
        self.store.insert_document(document.clone());
        self.resume(&document.id, bytes).await
    }

    /// Runs the pipeline from the last completed stage. Stages whose records
    /// already exist (ExtractedText, Classification) are not re-run;
    /// indexing always runs so the index converges on the stored records.
    pub async fn resume(
        &self,
        document_id: &str,
        bytes: &[u8],
    ) -> Result<IngestionOutcome, PipelineError> {
        let document = self.store.document(document_id).ok_or_else(|| {
            PipelineError::InvalidInput(format!("unknown document: {document_id}"))
        })?;

        // An index entry may only exist alongside an ExtractedText record.
        // A violation is fatal to this document alone.
        if self.index.contains(document_id) && self.store.extracted_text(document_id).is_none() {
            self.index.remove(document_id);
            self.store.set_status(document_id, DocumentStatus::Failed);
            let corruption = PipelineError::IndexCorruption {
                document_id: document_id.to_string(),
                details: "index entry present without extracted text".to_string(),
            };
            error!(%document_id, %corruption, "dropping corrupt index entry");
            return Err(corruption);
        }

        let (text, extraction_failure) = match self.store.extracted_text(document_id) {
            Some(existing) => (existing.text, None),
            None => {
                self.store
                    .set_status(document_id, DocumentStatus::Extracting);

                let extraction = match self
                    .with_retry("extract", || {
                        self.extractor
                            .try_extract(bytes, &document.media_type, &document.filename)
                    })
                    .await
                {
                    Ok(extraction) => extraction,
                    Err(transient) => {
                        warn!(%document_id, %transient, "extraction retries exhausted");
                        Extraction::failed(transient.to_string())
                    }
                };

                self.store.put_text(document_id, extraction.text.clone());
                self.store
                    .set_status(document_id, DocumentStatus::Extracted);
                (extraction.text, extraction.failure)
            }
        };

        let classification = match self.store.classification(document_id) {
            Some(existing) => existing,
            None => {
                self.store
                    .set_status(document_id, DocumentStatus::Classifying);

                let classification = match self
                    .with_retry("classify", || self.classifier.try_classify(&text))
                    .await
                {
                    Ok(classification) => classification,
                    Err(transient) => {
                        warn!(%document_id, %transient, "classification retries exhausted");
                        Classification::fallback()
                    }
                };

                self.store
                    .put_classification(document_id, classification.clone());
                self.store
                    .set_status(document_id, DocumentStatus::Classified);
                classification
            }
        };

        match self.indexer.upsert(document_id, &text, &classification).await {
            Ok(()) => {
                self.store.set_status(document_id, DocumentStatus::Indexed);
                info!(
                    %document_id,
                    category = %classification.category,
                    "document indexed"
                );
            }
            Err(fatal) => {
                self.store.set_status(document_id, DocumentStatus::Failed);
                error!(%document_id, %fatal, "indexing failed, document unsearchable");
                return Err(fatal);
            }
        }

        let document = self.store.document(document_id).ok_or_else(|| {
            PipelineError::InvalidInput(format!("document vanished mid-ingest: {document_id}"))
        })?;

        Ok(IngestionOutcome {
            document,
            classification,
            extraction_failure,
        })
    }

    /// Deletes the document and its index entry together. Idempotent.
    pub fn remove(&self, document_id: &str) -> Option<Document> {
        self.indexer.remove(document_id);
        self.store.remove(document_id)
    }

    async fn with_retry<T, MakeAttempt, Attempt>(
        &self,
        operation: &str,
        mut make_attempt: MakeAttempt,
    ) -> Result<T, PipelineError>
    where
        MakeAttempt: FnMut() -> Attempt,
        Attempt: Future<Output = Result<T, PipelineError>>,
    {
        let mut attempt = 0usize;
        loop {
            match make_attempt().await {
                Ok(value) => return Ok(value),
                Err(transient) if transient.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(%operation, attempt, %transient, "transient backend failure, retrying");
                    sleep(self.retry_backoff * attempt as u32).await;
                }
                Err(fatal) => return Err(fatal),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{QueryFilters, SearchMode, SearchQuery};
    use crate::search::SearchService;
    use crate::traits::{EmbeddingBackend, GenerationBackend, OcrBackend};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const INVOICE_JSON: &str = r#"{"category":"Invoice","tags":["billing","finance"],"summary":"Invoice for services","entities":["Acme"],"confidence":0.93}"#;

    #[derive(Clone)]
    enum Reply {
        Ok(String),
        Transient(String),
    }

    struct ScriptedGenerator {
        replies: Mutex<VecDeque<Reply>>,
        calls: AtomicUsize,
    }

    impl ScriptedGenerator {
        fn new(replies: Vec<Reply>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl GenerationBackend for ScriptedGenerator {
        async fn generate(&self, _prompt: &str) -> Result<String, PipelineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let reply = self.replies.lock().unwrap().pop_front();
            match reply {
                Some(Reply::Ok(text)) => Ok(text),
                Some(Reply::Transient(details)) => {
                    Err(PipelineError::BackendUnavailable(details))
                }
                None => Err(PipelineError::BackendUnavailable(
                    "script exhausted".to_string(),
                )),
            }
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    struct FixedOcr {
        text: String,
    }

    #[async_trait]
    impl OcrBackend for FixedOcr {
        async fn recognize(
            &self,
            _bytes: &[u8],
            _media_type: &str,
            _filename: &str,
        ) -> Result<String, PipelineError> {
            Ok(self.text.clone())
        }
    }

    struct FakeEmbedder;

    #[async_trait]
    impl EmbeddingBackend for FakeEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, PipelineError> {
            let mut vector = vec![0f32; 8];
            for (position, byte) in text.bytes().enumerate() {
                vector[position % 8] += f32::from(byte) / 255.0;
            }
            Ok(vector)
        }

        fn dimensions(&self) -> usize {
            8
        }

        fn name(&self) -> &str {
            "fake-embed"
        }
    }

    struct Harness {
        store: Arc<DocumentStore>,
        index: Arc<SearchIndex>,
        generator: Arc<ScriptedGenerator>,
        coordinator: PipelineCoordinator,
    }

    fn harness(replies: Vec<Reply>, ocr_text: &str) -> Harness {
        let store = Arc::new(DocumentStore::new());
        let index = Arc::new(SearchIndex::new());
        let generator = Arc::new(ScriptedGenerator::new(replies));
        let embedder: Arc<dyn EmbeddingBackend> = Arc::new(FakeEmbedder);

        let extractor = Arc::new(Extractor::new(Arc::new(FixedOcr {
            text: ocr_text.to_string(),
        })));
        let classifier = Arc::new(Classifier::new(
            Arc::clone(&generator) as Arc<dyn GenerationBackend>,
            500,
        ));
        let indexer = Indexer::new(Arc::clone(&index), Arc::clone(&embedder));

        let coordinator = PipelineCoordinator::new(
            Arc::clone(&store),
            Arc::clone(&index),
            extractor,
            classifier,
            indexer,
            2,
            Duration::from_millis(1),
        );

        Harness {
            store,
            index,
            generator,
            coordinator,
        }
    }

    impl Harness {
        fn search_service(&self) -> SearchService {
            SearchService::new(
                Arc::clone(&self.index),
                Arc::clone(&self.store),
                Arc::new(FakeEmbedder),
                100,
            )
        }
    }

    fn document(id: &str, filename: &str, media_type: &str, byte_size: u64) -> Document {
        Document {
            id: id.to_string(),
            filename: filename.to_string(),
            media_type: media_type.to_string(),
            byte_size,
            uploaded_at: Utc::now(),
            raw_content_ref: format!("blobs/{id}"),
            status: DocumentStatus::Uploaded,
        }
    }

    #[tokio::test]
    async fn full_ingest_makes_a_pdf_keyword_searchable_with_snippet() {
        let invoice_text = "Invoice #12345 — Total Due $450.00";
        let harness = harness(vec![Reply::Ok(INVOICE_JSON.to_string())], invoice_text);

        // Unparseable bytes force the OCR path, the way a scanned PDF would.
        let outcome = harness
            .coordinator
            .ingest(
                document("doc-1", "invoice-001.pdf", "application/pdf", 14),
                b"%PDF-1.4\n%scan",
            )
            .await
            .unwrap();

        assert_eq!(outcome.classification.category, "Invoice");
        assert_eq!(
            harness.store.status("doc-1"),
            Some(DocumentStatus::Indexed)
        );

        let results = harness
            .search_service()
            .query(&SearchQuery::new("invoice", SearchMode::Keyword))
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].document_id, "doc-1");
        assert_eq!(results[0].category, "Invoice");
        assert!(results[0].snippet.contains("Invoice #12345"));
    }

    #[tokio::test]
    async fn undecodable_classification_degrades_but_stays_searchable() {
        let harness = harness(vec![Reply::Ok("not json".to_string())], "");

        let outcome = harness
            .coordinator
            .ingest(
                document("doc-1", "notes.txt", "text/plain", 10),
                b"meeting notes about budget",
            )
            .await
            .unwrap();

        assert_eq!(outcome.classification, Classification::fallback());
        assert_eq!(
            harness.store.status("doc-1"),
            Some(DocumentStatus::Indexed)
        );

        let results = harness
            .search_service()
            .query(&SearchQuery::new("budget", SearchMode::Keyword))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].category, "Uncategorized");
    }

    #[tokio::test]
    async fn transient_classification_failure_is_retried() {
        let harness = harness(
            vec![
                Reply::Transient("connection reset".to_string()),
                Reply::Ok(INVOICE_JSON.to_string()),
            ],
            "",
        );

        let outcome = harness
            .coordinator
            .ingest(
                document("doc-1", "invoice.txt", "text/plain", 10),
                b"Invoice body",
            )
            .await
            .unwrap();

        assert_eq!(outcome.classification.category, "Invoice");
        assert_eq!(harness.generator.calls(), 2);
    }

    #[tokio::test]
    async fn exhausted_retries_fall_back_and_still_index() {
        let harness = harness(
            vec![
                Reply::Transient("down".to_string()),
                Reply::Transient("down".to_string()),
                Reply::Transient("down".to_string()),
            ],
            "",
        );

        let outcome = harness
            .coordinator
            .ingest(
                document("doc-1", "notes.txt", "text/plain", 5),
                b"alpha",
            )
            .await
            .unwrap();

        assert_eq!(outcome.classification, Classification::fallback());
        assert_eq!(harness.generator.calls(), 3);
        assert_eq!(
            harness.store.status("doc-1"),
            Some(DocumentStatus::Indexed)
        );
    }

    #[tokio::test]
    async fn resume_skips_completed_stages() {
        let harness = harness(vec![], "");

        let mut doc = document("doc-1", "notes.txt", "text/plain", 5);
        doc.status = DocumentStatus::Classified;
        harness.store.insert_document(doc);
        harness.store.put_text("doc-1", "alpha beta".to_string());
        harness.store.put_classification(
            "doc-1",
            Classification {
                category: "Report".to_string(),
                tags: Vec::new(),
                summary: String::new(),
                entities: Vec::new(),
                confidence: 0.8,
            },
        );

        let outcome = harness.coordinator.resume("doc-1", b"").await.unwrap();

        // Extraction and classification records were reused untouched.
        assert_eq!(harness.generator.calls(), 0);
        assert_eq!(outcome.classification.category, "Report");
        assert_eq!(
            harness.store.status("doc-1"),
            Some(DocumentStatus::Indexed)
        );
        assert!(harness.index.contains("doc-1"));
    }

    #[tokio::test]
    async fn resume_unknown_document_is_invalid_input() {
        let harness = harness(vec![], "");
        let result = harness.coordinator.resume("missing", b"").await;
        assert!(matches!(result, Err(PipelineError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn index_entry_without_extracted_text_is_corruption() {
        let harness = harness(vec![], "");

        harness
            .store
            .insert_document(document("doc-1", "a.txt", "text/plain", 1));
        harness.index.insert(
            "doc-1",
            crate::index::IndexEntry {
                terms: Default::default(),
                vector: None,
            },
        );

        let result = harness.coordinator.resume("doc-1", b"x").await;

        assert!(matches!(
            result,
            Err(PipelineError::IndexCorruption { .. })
        ));
        assert_eq!(harness.store.status("doc-1"), Some(DocumentStatus::Failed));
        assert!(!harness.index.contains("doc-1"));
    }

    #[tokio::test]
    async fn remove_clears_both_result_sets_and_is_idempotent() {
        let harness = harness(vec![Reply::Ok(INVOICE_JSON.to_string())], "");

        harness
            .coordinator
            .ingest(
                document("doc-1", "invoice.txt", "text/plain", 12),
                b"Invoice body",
            )
            .await
            .unwrap();

        assert!(harness.coordinator.remove("doc-1").is_some());
        assert!(harness.coordinator.remove("doc-1").is_none());

        let service = harness.search_service();
        let keyword = service
            .query(&SearchQuery {
                text: "invoice".to_string(),
                mode: SearchMode::Keyword,
                filters: QueryFilters::default(),
                top_k: 10,
            })
            .await
            .unwrap();
        let semantic = service
            .query(&SearchQuery::new("invoice", SearchMode::Semantic))
            .await
            .unwrap();

        assert!(keyword.is_empty());
        assert!(semantic.is_empty());
    }
}
