use axum::extract::{DefaultBodyLimit, Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::Utc;
use doc_search_core::{
    digest_bytes, Classifier, Document, DocumentStore, Extractor, GenerativeOcr, Indexer,
    OllamaEmbedder, OllamaGenerator, PipelineConfig, PipelineCoordinator, QueryFilters,
    SearchError, SearchIndex, SearchMode, SearchQuery, SearchResult, SearchService,
};
use doc_search_core::{EmbeddingBackend, GenerationBackend, OcrBackend};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

/// Media types the upload endpoint accepts, matching what the extractor can
/// do something useful with.
const ACCEPTED_MEDIA_TYPES: &[&str] = &[
    "application/pdf",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/tiff",
    "text/plain",
];

#[derive(Clone)]
pub struct AppState {
    coordinator: Arc<PipelineCoordinator>,
    classifier: Arc<Classifier>,
    extractor: Arc<Extractor>,
    search: Arc<SearchService>,
    store: Arc<DocumentStore>,
    upload_dir: Arc<PathBuf>,
    search_top_k: usize,
}

impl AppState {
    pub fn new(config: &PipelineConfig, upload_dir: PathBuf) -> Self {
        let generator: Arc<dyn GenerationBackend> = Arc::new(OllamaGenerator::new(config));
        let embedder: Arc<dyn EmbeddingBackend> = Arc::new(OllamaEmbedder::new(config));
        Self::with_backends(config, upload_dir, generator, embedder)
    }

    /// Wires the pipeline around explicit backend implementations. Tests
    /// inject fakes here; `new` plugs in the Ollama clients.
    pub fn with_backends(
        config: &PipelineConfig,
        upload_dir: PathBuf,
        generator: Arc<dyn GenerationBackend>,
        embedder: Arc<dyn EmbeddingBackend>,
    ) -> Self {
        let ocr: Arc<dyn OcrBackend> = Arc::new(GenerativeOcr::new(Arc::clone(&generator)));

        let store = Arc::new(DocumentStore::new());
        let index = Arc::new(SearchIndex::new());
        let extractor = Arc::new(Extractor::new(ocr));
        let classifier = Arc::new(Classifier::new(generator, config.classify_prefix_chars));
        let indexer = Indexer::new(Arc::clone(&index), Arc::clone(&embedder));

        let coordinator = Arc::new(PipelineCoordinator::new(
            Arc::clone(&store),
            Arc::clone(&index),
            Arc::clone(&extractor),
            Arc::clone(&classifier),
            indexer,
            config.max_retries,
            config.retry_backoff,
        ));
        let search = Arc::new(SearchService::new(
            index,
            Arc::clone(&store),
            embedder,
            config.snippet_context_chars,
        ));

        Self {
            coordinator,
            classifier,
            extractor,
            search,
            store,
            upload_dir: Arc::new(upload_dir),
            search_top_k: config.search_top_k,
        }
    }
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/classify", post(classify))
        .route("/ocr", post(ocr))
        .route("/search", get(search_keyword))
        .route("/search2", get(search_semantic))
        .route("/upload", post(upload))
        .route("/documents/:id", delete(remove_document))
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

async fn health() -> &'static str {
    "OK"
}

#[derive(Deserialize)]
struct ClassifyRequest {
    text: Option<String>,
}

/// POST /classify. The in-component fallback is still a 200; only transport
/// failures toward the backend become a 500.
async fn classify(
    State(state): State<AppState>,
    Json(request): Json<ClassifyRequest>,
) -> Response {
    let Some(text) = request.text.filter(|text| !text.trim().is_empty()) else {
        return error_response(StatusCode::BAD_REQUEST, "No text content provided");
    };

    match state.classifier.try_classify(&text).await {
        Ok(classification) => Json(json!({
            "success": true,
            "classification": classification,
            "processedAt": Utc::now().to_rfc3339(),
        }))
        .into_response(),
        Err(cause) => {
            error!(%cause, "classification request failed");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to classify document",
            )
        }
    }
}

/// POST /ocr. Multipart upload; returns extracted text without persisting
/// anything.
async fn ocr(State(state): State<AppState>, multipart: Multipart) -> Response {
    let file = match read_file_field(multipart).await {
        Ok(file) => file,
        Err(response) => return response,
    };
    let Some(file) = file else {
        return error_response(StatusCode::BAD_REQUEST, "No file provided");
    };

    let extraction = state
        .extractor
        .extract(&file.bytes, &file.media_type, &file.filename)
        .await;

    if let Some(reason) = &extraction.failure {
        warn!(filename = %file.filename, %reason, "ocr extraction degraded");
    }

    Json(json!({
        "success": true,
        "text": extraction.text,
        "metadata": {
            "filename": file.filename,
            "mediaType": file.media_type,
            "byteSize": file.bytes.len(),
            "processedAt": Utc::now().to_rfc3339(),
        },
    }))
    .into_response()
}

#[derive(Deserialize)]
struct SearchParams {
    keyword: Option<String>,
    category: Option<String>,
    media_type: Option<String>,
}

/// One hit in the search response, in the shape the dashboard consumes.
#[derive(Serialize)]
struct SearchHit {
    id: String,
    filename: String,
    content_type: String,
    #[serde(rename = "type")]
    category: String,
    snippet: String,
}

impl From<SearchResult> for SearchHit {
    fn from(result: SearchResult) -> Self {
        Self {
            id: result.document_id,
            filename: result.filename,
            content_type: result.media_type,
            category: result.category,
            snippet: result.snippet,
        }
    }
}

fn build_query(params: SearchParams, mode: SearchMode, top_k: usize) -> Option<SearchQuery> {
    let keyword = params.keyword.filter(|keyword| !keyword.trim().is_empty())?;
    Some(SearchQuery {
        text: keyword,
        mode,
        filters: QueryFilters {
            category: params.category,
            media_type: params.media_type,
        },
        top_k,
    })
}

/// GET /search?keyword=, keyword mode.
async fn search_keyword(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Response {
    let Some(query) = build_query(params, SearchMode::Keyword, state.search_top_k) else {
        return error_response(StatusCode::BAD_REQUEST, "Search keyword cannot be empty");
    };

    match state.search.query(&query).await {
        Ok(results) => {
            let hits: Vec<SearchHit> = results.into_iter().map(SearchHit::from).collect();
            Json(hits).into_response()
        }
        Err(cause) => {
            error!(%cause, "keyword search failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Search failed")
        }
    }
}

/// GET /search2?keyword=, semantic mode. An unreachable embedding backend
/// is surfaced as an empty result set with an explicit error indicator,
/// never silently degraded to keyword results.
async fn search_semantic(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Response {
    let Some(query) = build_query(params, SearchMode::Semantic, state.search_top_k) else {
        return error_response(StatusCode::BAD_REQUEST, "Search keyword cannot be empty");
    };

    match state.search.query(&query).await {
        Ok(results) => {
            let hits: Vec<SearchHit> = results.into_iter().map(SearchHit::from).collect();
            Json(json!({
                "status": "success",
                "results": hits,
                "count": hits.len(),
            }))
            .into_response()
        }
        Err(SearchError::BackendUnavailable { backend, details }) => {
            warn!(%backend, %details, "semantic search backend unavailable");
            Json(json!({
                "status": "error",
                "error": "BackendUnavailable",
                "message": format!("{backend} unavailable"),
                "results": [],
                "count": 0,
            }))
            .into_response()
        }
        Err(cause) => {
            error!(%cause, "semantic search failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Search failed")
        }
    }
}

/// POST /upload. Accepts a file, stores the blob, and runs the full
/// pipeline.
async fn upload(State(state): State<AppState>, multipart: Multipart) -> Response {
    let file = match read_file_field(multipart).await {
        Ok(file) => file,
        Err(response) => return response,
    };
    let Some(file) = file else {
        return error_response(StatusCode::BAD_REQUEST, "No file provided");
    };

    if !is_accepted_media_type(&file.media_type) {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Invalid file type. Only DOCX, XLSX, PDF, images, and plain text are supported.",
        );
    }

    // Content-addressed blob path so re-uploads of identical bytes reuse
    // the same stored object.
    let blob_path = state.upload_dir.join(digest_bytes(&file.bytes));
    if let Err(cause) = tokio::fs::write(&blob_path, &file.bytes).await {
        error!(%cause, "failed to store uploaded blob");
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to store file");
    }

    let document = Document::new(
        file.filename.clone(),
        file.media_type.clone(),
        file.bytes.len() as u64,
        blob_path.to_string_lossy().into_owned(),
    );
    let document_id = document.id.clone();

    match state.coordinator.ingest(document, &file.bytes).await {
        Ok(outcome) => Json(json!({
            "id": outcome.document.id,
            "filename": outcome.document.filename,
            "content_type": outcome.document.media_type,
            "type": outcome.classification.category,
        }))
        .into_response(),
        Err(cause) => {
            error!(%document_id, %cause, "ingestion failed");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error processing file",
            )
        }
    }
}

/// DELETE /documents/:id. Removes the document and its index entries, and
/// deletes the stored blob once no other document references it. Idempotent.
async fn remove_document(
    State(state): State<AppState>,
    Path(document_id): Path<String>,
) -> Response {
    match state.coordinator.remove(&document_id) {
        Some(document) => {
            // Identical uploads share one content-addressed blob; it may
            // only be deleted with the last document pointing at it.
            if !state.store.blob_referenced(&document.raw_content_ref) {
                if let Err(cause) = tokio::fs::remove_file(&document.raw_content_ref).await {
                    warn!(%document_id, %cause, "could not delete stored blob");
                }
            }
            Json(json!({ "removed": true })).into_response()
        }
        None => Json(json!({ "removed": false })).into_response(),
    }
}

struct UploadedFile {
    filename: String,
    media_type: String,
    bytes: Vec<u8>,
}

/// Pulls the `file` field out of a multipart body. `Ok(None)` when the field
/// is missing; `Err` carries a ready-made error response.
async fn read_file_field(mut multipart: Multipart) -> Result<Option<UploadedFile>, Response> {
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => return Ok(None),
            Err(cause) => {
                warn!(%cause, "malformed multipart body");
                return Err(error_response(
                    StatusCode::BAD_REQUEST,
                    "Invalid multipart body",
                ));
            }
        };

        if field.name() != Some("file") {
            continue;
        }

        let filename = field
            .file_name()
            .unwrap_or("upload.bin")
            .to_string();
        let media_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();

        return match field.bytes().await {
            Ok(bytes) => Ok(Some(UploadedFile {
                filename,
                media_type,
                bytes: bytes.to_vec(),
            })),
            Err(cause) => {
                warn!(%cause, "malformed multipart body");
                Err(error_response(
                    StatusCode::BAD_REQUEST,
                    "Invalid multipart body",
                ))
            }
        };
    }
}

fn is_accepted_media_type(media_type: &str) -> bool {
    ACCEPTED_MEDIA_TYPES.contains(&media_type)
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}
