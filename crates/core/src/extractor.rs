use crate::error::PipelineError;
use crate::traits::OcrBackend;
use lopdf::Document as PdfDocument;
use std::sync::Arc;
use tracing::{debug, warn};

const DOCX_MEDIA_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
const XLSX_MEDIA_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Outcome of a text extraction attempt. `text` may be empty when extraction
/// failed; the reason is recorded instead of propagated, so downstream
/// stages can proceed with degraded input.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub text: String,
    pub failure: Option<String>,
}

impl Extraction {
    pub fn ok(text: String) -> Self {
        Self {
            text,
            failure: None,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            text: String::new(),
            failure: Some(reason.into()),
        }
    }
}

/// Converts raw document bytes into plain text.
///
/// PDF text layers are read directly; pages without a text layer, images,
/// and office formats go through the OCR backend best-effort. Nothing here
/// persists anything; storing the result is the caller's job.
pub struct Extractor {
    ocr: Arc<dyn OcrBackend>,
}

impl Extractor {
    pub fn new(ocr: Arc<dyn OcrBackend>) -> Self {
        Self { ocr }
    }

    /// Never fails hard: any error becomes an empty extraction with a
    /// recorded reason.
    pub async fn extract(&self, bytes: &[u8], media_type: &str, filename: &str) -> Extraction {
        match self.try_extract(bytes, media_type, filename).await {
            Ok(extraction) => extraction,
            Err(error) => {
                warn!(%filename, %media_type, %error, "extraction degraded to empty text");
                Extraction::failed(error.to_string())
            }
        }
    }

    /// Single extraction attempt. `Err` is reserved for transient backend
    /// failures the coordinator may retry; every other problem is resolved
    /// here as an empty extraction with a recorded reason.
    pub async fn try_extract(
        &self,
        bytes: &[u8],
        media_type: &str,
        filename: &str,
    ) -> Result<Extraction, PipelineError> {
        if bytes.is_empty() {
            return Ok(Extraction::failed("file has no content"));
        }

        if media_type == "application/pdf" {
            match extract_pdf_text(bytes) {
                Ok(text) if !text.trim().is_empty() => return Ok(Extraction::ok(text)),
                Ok(_) => debug!(%filename, "pdf has no text layer, falling back to ocr"),
                Err(reason) => debug!(%filename, %reason, "pdf parse failed, falling back to ocr"),
            }
            return self.recognize(bytes, media_type, filename).await;
        }

        if is_textual(media_type) {
            return Ok(Extraction::ok(
                String::from_utf8_lossy(bytes).into_owned(),
            ));
        }

        if media_type.starts_with("image/")
            || media_type == DOCX_MEDIA_TYPE
            || media_type == XLSX_MEDIA_TYPE
        {
            return self.recognize(bytes, media_type, filename).await;
        }

        Ok(Extraction::failed(format!(
            "unsupported media type: {media_type}"
        )))
    }

    async fn recognize(
        &self,
        bytes: &[u8],
        media_type: &str,
        filename: &str,
    ) -> Result<Extraction, PipelineError> {
        match self.ocr.recognize(bytes, media_type, filename).await {
            Ok(text) if !text.trim().is_empty() => Ok(Extraction::ok(text)),
            Ok(_) => Ok(Extraction::failed("ocr backend produced no text")),
            Err(error) if error.is_transient() => Err(error),
            Err(error) => Ok(Extraction::failed(error.to_string())),
        }
    }
}

fn is_textual(media_type: &str) -> bool {
    media_type.starts_with("text/")
        || matches!(
            media_type,
            "application/json" | "application/xml" | "application/csv"
        )
}

/// Pull the text layer out of a PDF, page by page.
fn extract_pdf_text(bytes: &[u8]) -> Result<String, String> {
    let document = PdfDocument::load_mem(bytes).map_err(|error| error.to_string())?;

    let mut text = String::new();
    for (page_no, _page_id) in document.get_pages() {
        let page_text = document
            .extract_text(&[page_no])
            .map_err(|error| error.to_string())?;

        if !page_text.trim().is_empty() {
            text.push_str(&page_text);
            text.push('\n');
        }
    }

    Ok(text)
}
