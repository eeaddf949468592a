use crate::models::{Classification, Document, DocumentStatus, ExtractedText};
use chrono::Utc;
use dashmap::DashMap;
use sha2::{Digest, Sha256};

/// Logical records the pipeline persists between stages: the document
/// itself plus its derived ExtractedText and Classification. The concrete
/// storage engine behind this registry is out of scope; this in-process
/// implementation keeps the records the pipeline needs to resume from the
/// last completed stage.
#[derive(Default)]
pub struct DocumentStore {
    documents: DashMap<String, Document>,
    texts: DashMap<String, ExtractedText>,
    classifications: DashMap<String, Classification>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_document(&self, document: Document) {
        self.documents.insert(document.id.clone(), document);
    }

    pub fn document(&self, document_id: &str) -> Option<Document> {
        self.documents.get(document_id).map(|doc| doc.clone())
    }

    pub fn set_status(&self, document_id: &str, status: DocumentStatus) {
        if let Some(mut document) = self.documents.get_mut(document_id) {
            document.status = status;
        }
    }

    pub fn status(&self, document_id: &str) -> Option<DocumentStatus> {
        self.documents.get(document_id).map(|doc| doc.status)
    }

    /// Exactly one ExtractedText per document; re-processing replaces it.
    pub fn put_text(&self, document_id: &str, text: String) {
        self.texts.insert(
            document_id.to_string(),
            ExtractedText {
                document_id: document_id.to_string(),
                text,
                extracted_at: Utc::now(),
            },
        );
    }

    pub fn extracted_text(&self, document_id: &str) -> Option<ExtractedText> {
        self.texts.get(document_id).map(|text| text.clone())
    }

    /// One current Classification per document, overwritten whole.
    pub fn put_classification(&self, document_id: &str, classification: Classification) {
        self.classifications
            .insert(document_id.to_string(), classification);
    }

    pub fn classification(&self, document_id: &str) -> Option<Classification> {
        self.classifications
            .get(document_id)
            .map(|class| class.clone())
    }

    /// Removes the document and everything derived from it. Idempotent.
    pub fn remove(&self, document_id: &str) -> Option<Document> {
        self.texts.remove(document_id);
        self.classifications.remove(document_id);
        self.documents
            .remove(document_id)
            .map(|(_id, document)| document)
    }

    /// Whether any stored document still points at this blob. Identical
    /// uploads share one content-addressed blob, so the blob outlives any
    /// single document referencing it.
    pub fn blob_referenced(&self, raw_content_ref: &str) -> bool {
        self.documents
            .iter()
            .any(|document| document.raw_content_ref == raw_content_ref)
    }
}

/// Content checksum used as a stable raw-content reference component.
pub fn digest_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document(id: &str) -> Document {
        Document {
            id: id.to_string(),
            filename: format!("{id}.txt"),
            media_type: "text/plain".to_string(),
            byte_size: 3,
            uploaded_at: Utc::now(),
            raw_content_ref: format!("blobs/{id}"),
            status: DocumentStatus::Uploaded,
        }
    }

    #[test]
    fn remove_cascades_to_derived_records() {
        let store = DocumentStore::new();
        store.insert_document(document("doc-1"));
        store.put_text("doc-1", "body".to_string());
        store.put_classification("doc-1", Classification::fallback());

        assert!(store.remove("doc-1").is_some());
        assert!(store.document("doc-1").is_none());
        assert!(store.extracted_text("doc-1").is_none());
        assert!(store.classification("doc-1").is_none());

        // Second removal is a no-op.
        assert!(store.remove("doc-1").is_none());
    }

    #[test]
    fn reprocessing_replaces_the_extracted_text() {
        let store = DocumentStore::new();
        store.insert_document(document("doc-1"));
        store.put_text("doc-1", "first".to_string());
        store.put_text("doc-1", "second".to_string());
        assert_eq!(store.extracted_text("doc-1").unwrap().text, "second");
    }

    #[test]
    fn shared_blob_stays_referenced_until_the_last_document_is_removed() {
        let store = DocumentStore::new();
        let mut first = document("doc-1");
        let mut second = document("doc-2");
        first.raw_content_ref = "blobs/shared".to_string();
        second.raw_content_ref = "blobs/shared".to_string();
        store.insert_document(first);
        store.insert_document(second);

        store.remove("doc-1");
        assert!(store.blob_referenced("blobs/shared"));

        store.remove("doc-2");
        assert!(!store.blob_referenced("blobs/shared"));
    }

    #[test]
    fn digest_is_reproducible() {
        assert_eq!(digest_bytes(b"abc"), digest_bytes(b"abc"));
        assert_ne!(digest_bytes(b"abc"), digest_bytes(b"abd"));
    }
}
