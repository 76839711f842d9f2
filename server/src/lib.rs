use anyhow::Result;
use axum::{extract::{Path, Query, State}, http::{HeaderMap, StatusCode}, routing::{get, post}, Json, Router};
use docsearch_core::filename::{encode_filename, scan_folder};
use docsearch_core::timestamp::{format_timestamp, parse_timestamp};
use docsearch_core::tokenizer::query_terms;
use docsearch_core::{DocId, IndexError, InvertedIndex, NewDocument, SharedIndex};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::PathBuf;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    #[serde(default = "default_k")]
    pub k: usize,
}
fn default_k() -> usize { 10 }

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub took_s: f64,
    pub total_hits: usize,
    pub results: Vec<SearchHit>,
}

#[derive(Serialize)]
pub struct SearchHit {
    pub doc_id: DocId,
    pub title: String,
    pub author: String,
    pub keywords: String,
    pub timestamp: String,
    pub locator: String,
    pub matched_terms: u32,
    pub snippet: Option<String>,
}

#[derive(Serialize)]
pub struct DocResponse {
    pub doc_id: DocId,
    pub title: String,
    pub author: String,
    pub keywords: String,
    pub timestamp: String,
    pub locator: String,
    pub text: String,
}

#[derive(Deserialize)]
pub struct UploadRequest {
    pub body: String,
    pub title: String,
    pub author: String,
    pub keywords: String,
    /// Any layout accepted by `parse_timestamp`, e.g. `2024-05-01` or `2024-05-01 10:00:00`.
    pub date: String,
}

#[derive(Serialize)]
pub struct UploadResponse {
    pub doc_id: DocId,
    pub locator: String,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Snapshot loaded at startup and written by `/index/commit`.
    pub snapshot: PathBuf,
    /// Folder uploaded documents are written to, scanned at startup when no snapshot exists.
    pub documents: PathBuf,
    pub admin_token: Option<String>,
}

#[derive(Clone)]
pub struct AppState {
    pub index: SharedIndex,
    pub config: ServerConfig,
}

type ApiError = (StatusCode, String);

/// Restore the snapshot if there is one, otherwise index the documents folder.
pub fn open_index(config: &ServerConfig) -> Result<SharedIndex> {
    if config.snapshot.is_file() {
        let shared = SharedIndex::default();
        shared.load_from_path(&config.snapshot)?;
        return Ok(shared);
    }
    let mut index = InvertedIndex::new();
    if config.documents.is_dir() {
        scan_folder(&mut index, &config.documents)?;
    } else {
        tracing::info!(dir = %config.documents.display(), "no documents folder yet, starting empty");
    }
    Ok(SharedIndex::new(index))
}

pub fn build_app(config: ServerConfig) -> Result<Router> {
    let index = open_index(&config)?;
    Ok(build_router(AppState { index, config }))
}

pub fn build_router(state: AppState) -> Router {
    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", get(search_handler))
        .route("/doc/:doc_id", get(doc_handler))
        .route("/documents", post(upload_handler))
        .route("/index/commit", post(index_commit))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

pub async fn search_handler(State(state): State<AppState>, Query(params): Query<SearchParams>) -> Result<Json<SearchResponse>, ApiError> {
    if params.q.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "query must not be empty".into()));
    }
    let start = std::time::Instant::now();
    let k = params.k.clamp(1, 100);
    let highlighter = Highlighter::new(&params.q);

    let index = state.index.read();
    let hits = index.search_scored(&params.q);
    let total_hits = hits.len();
    let mut results = Vec::with_capacity(k.min(total_hits));
    for hit in hits.into_iter().take(k) {
        let meta = index.metadata(hit.doc_id).map_err(api_error)?;
        let snippet = index.document(hit.doc_id).ok().and_then(|body| highlighter.as_ref().map(|h| h.snippet(body)));
        results.push(SearchHit {
            doc_id: hit.doc_id,
            title: meta.title.clone(),
            author: meta.author.clone(),
            keywords: meta.keywords.clone(),
            timestamp: format_timestamp(meta.timestamp),
            locator: meta.locator.clone(),
            matched_terms: hit.matched_terms,
            snippet,
        });
    }
    drop(index);

    let took_s = start.elapsed().as_secs_f64();
    tracing::debug!(query = %params.q, total_hits, took_s, "search served");
    Ok(Json(SearchResponse { query: params.q, took_s, total_hits, results }))
}

pub async fn doc_handler(State(state): State<AppState>, Path(doc_id): Path<DocId>) -> Result<Json<DocResponse>, ApiError> {
    let index = state.index.read();
    let meta = index.metadata(doc_id).map_err(api_error)?;
    let text = index.document(doc_id).map_err(api_error)?;
    Ok(Json(DocResponse {
        doc_id,
        title: meta.title.clone(),
        author: meta.author.clone(),
        keywords: meta.keywords.clone(),
        timestamp: format_timestamp(meta.timestamp),
        locator: meta.locator.clone(),
        text: text.to_string(),
    }))
}

/// Store the uploaded body under an encoded file name, then index it with that path as locator.
pub async fn upload_handler(State(state): State<AppState>, Json(req): Json<UploadRequest>) -> Result<(StatusCode, Json<UploadResponse>), ApiError> {
    let missing: Vec<&str> = [("body", &req.body), ("title", &req.title), ("author", &req.author), ("keywords", &req.keywords), ("date", &req.date)]
        .into_iter()
        .filter(|(_, v)| v.trim().is_empty())
        .map(|(k, _)| k)
        .collect();
    if !missing.is_empty() {
        return Err((StatusCode::BAD_REQUEST, format!("missing fields: {}", missing.join(", "))));
    }
    let timestamp = parse_timestamp(&req.date).map_err(api_error)?;

    let dir = &state.config.documents;
    std::fs::create_dir_all(dir).map_err(|e| api_error(e.into()))?;
    let path = dir.join(encode_filename(&req.title, &req.author, timestamp));
    if path.parent() != Some(dir.as_path()) {
        return Err((StatusCode::BAD_REQUEST, "title and author must form a plain file name".into()));
    }
    write_new(&path, &req.body)?;
    let locator = path.to_string_lossy().into_owned();

    let added = state.index.add_document(NewDocument {
        body: &req.body,
        title: &req.title,
        author: &req.author,
        keywords: &req.keywords,
        timestamp,
        locator: &locator,
    });
    let doc_id = match added {
        Ok(id) => id,
        Err(err) => {
            let _ = std::fs::remove_file(&path);
            return Err(api_error(err));
        }
    };
    tracing::info!(doc_id, %locator, "document uploaded");
    Ok((StatusCode::CREATED, Json(UploadResponse { doc_id, locator })))
}

/// Never replaces an existing document file.
fn write_new(path: &std::path::Path, body: &str) -> Result<(), ApiError> {
    let mut file = match std::fs::OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            return Err((StatusCode::CONFLICT, "a document with this title, author and date already exists".into()));
        }
        Err(e) => return Err(api_error(e.into())),
    };
    file.write_all(body.as_bytes()).map_err(|e| api_error(e.into()))
}

async fn index_commit(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<serde_json::Value>, ApiError> {
    authorize(&state, &headers)?;
    state.index.save_to_path(&state.config.snapshot).map_err(api_error)?;
    Ok(Json(serde_json::json!({
        "snapshot": state.config.snapshot.to_string_lossy(),
        "num_docs": state.index.len(),
    })))
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let required = match &state.config.admin_token {
        Some(t) => t,
        None => return Err((StatusCode::UNAUTHORIZED, "ADMIN_TOKEN not set".into())),
    };
    let provided = headers.get("X-ADMIN-TOKEN").and_then(|v| v.to_str().ok()).unwrap_or("");
    if provided == required {
        Ok(())
    } else {
        Err((StatusCode::UNAUTHORIZED, "invalid admin token".into()))
    }
}

fn api_error(err: IndexError) -> ApiError {
    let status = match &err {
        IndexError::NotFound(_) => StatusCode::NOT_FOUND,
        IndexError::MalformedTimestamp { .. } | IndexError::InvalidFileName(_) => StatusCode::BAD_REQUEST,
        IndexError::CorruptData(_) | IndexError::IdsExhausted | IndexError::Io(_) => {
            tracing::error!(%err, "request failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, err.to_string())
}

/// Builds excerpts around the first query term in a body, with every term wrapped in `<em>`.
struct Highlighter {
    pattern: Regex,
}

const SNIPPET_BEFORE: usize = 100;
const SNIPPET_AFTER: usize = 200;

impl Highlighter {
    fn new(query: &str) -> Option<Self> {
        let terms = query_terms(query);
        if terms.is_empty() {
            return None;
        }
        let alternatives: Vec<String> = terms.iter().map(|t| regex::escape(t)).collect();
        let pattern = Regex::new(&format!(r"(?i)\b(?:{})\b", alternatives.join("|"))).ok()?;
        Some(Self { pattern })
    }

    fn snippet(&self, body: &str) -> String {
        let (start, end) = match self.pattern.find(body) {
            Some(m) => (
                floor_boundary(body, m.start().saturating_sub(SNIPPET_BEFORE)),
                floor_boundary(body, (m.start() + SNIPPET_AFTER).min(body.len())),
            ),
            None => (0, floor_boundary(body, SNIPPET_AFTER.min(body.len()))),
        };
        self.pattern.replace_all(&body[start..end], "<em>$0</em>").into_owned()
    }
}

fn floor_boundary(s: &str, mut idx: usize) -> usize {
    while !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snippet_highlights_whole_terms() {
        let h = Highlighter::new("the Ocean").unwrap();
        let s = h.snippet("Oceans aside, the ocean's depths hide creatures.");
        assert_eq!(s, "Oceans aside, the <em>ocean</em>'s depths hide creatures.");
    }

    #[test]
    fn snippet_respects_char_boundaries() {
        let h = Highlighter::new("zeta").unwrap();
        // three-byte chars put both window edges inside a character
        let body = format!("{}zeta{}", "€".repeat(50), "€".repeat(100));
        let s = h.snippet(&body);
        assert!(s.starts_with('€'));
        assert!(s.contains("<em>zeta</em>"));
        assert!(Highlighter::new("the of").is_none());
    }
}
