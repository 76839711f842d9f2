use axum::body::{Body, Bytes};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use docsearch_core::filename::encode_filename;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use server::{build_app, ServerConfig};
use std::fs;
use std::path::Path;
use tempfile::tempdir;
use time::macros::datetime;
use tower::ServiceExt;

fn config(dir: &Path, token: Option<&str>) -> ServerConfig {
    ServerConfig {
        snapshot: dir.join("index.bin"),
        documents: dir.join("documents"),
        admin_token: token.map(str::to_string),
    }
}

async fn call(app: &Router, req: Request<Body>) -> (StatusCode, Bytes) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    (status, body)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    let (status, body) = call(app, Request::get(uri).body(Body::empty()).unwrap()).await;
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

async fn upload(app: &Router, doc: Value) -> (StatusCode, Value) {
    let req = Request::post("/documents")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(doc.to_string()))
        .unwrap();
    let (status, body) = call(app, req).await;
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

fn ids(json: &Value) -> Vec<u64> {
    json["results"].as_array().unwrap().iter().map(|r| r["doc_id"].as_u64().unwrap()).collect()
}

#[tokio::test]
async fn upload_then_search_ranks_results() {
    let dir = tempdir().unwrap();
    let app = build_app(config(dir.path(), None)).unwrap();

    let (status, first) = upload(&app, json!({
        "body": "AI research", "title": "AI research", "author": "Emma Clark", "keywords": "ai, ml", "date": "2024-01-01"
    })).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(first["doc_id"], 0);
    let locator = first["locator"].as_str().unwrap();
    assert_eq!(fs::read_to_string(locator).unwrap(), "AI research");

    let (status, _) = upload(&app, json!({
        "body": "History notes", "title": "History notes", "author": "Liu Wei", "keywords": "history", "date": "2024-01-02 09:30:00"
    })).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, json) = get(&app, "/search?q=ai").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ids(&json), vec![0]);
    assert_eq!(json["results"][0]["snippet"], "<em>AI</em> research");

    let (_, json) = get(&app, "/search?q=ai%20history").await;
    assert_eq!(ids(&json), vec![1, 0]);
    assert_eq!(json["total_hits"], 2);

    let (_, json) = get(&app, "/search?q=ai%20history&k=1").await;
    assert_eq!(ids(&json), vec![1]);
    assert_eq!(json["total_hits"], 2);

    let (_, json) = get(&app, "/search?q=volcano").await;
    assert!(ids(&json).is_empty());
}

#[tokio::test]
async fn rejects_bad_uploads_without_side_effects() {
    let dir = tempdir().unwrap();
    let app = build_app(config(dir.path(), None)).unwrap();

    let (status, _) = upload(&app, json!({
        "body": "text", "title": "T", "author": "A", "keywords": "k", "date": "someday"
    })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = upload(&app, json!({
        "body": "text", "title": "", "author": "A", "keywords": "k", "date": "2024-01-01"
    })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert!(!dir.path().join("documents").exists());
    let (status, body) = upload(&app, json!({
        "body": "text", "title": "T", "author": "A", "keywords": "k", "date": "2024-01-01"
    })).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["doc_id"], 0);
}

#[tokio::test]
async fn doc_lookup_and_not_found() {
    let dir = tempdir().unwrap();
    let docs = dir.path().join("documents");
    fs::create_dir_all(&docs).unwrap();
    let name = encode_filename("Ocean Depths", "John Doe", datetime!(2024-01-01 0:00 UTC));
    fs::write(docs.join(&name), "The ocean's depths hide creatures.\n").unwrap();
    let app = build_app(config(dir.path(), None)).unwrap();

    let (status, json) = get(&app, "/doc/0").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["title"], "Ocean Depths");
    assert_eq!(json["author"], "john doe");
    assert_eq!(json["timestamp"], "2024-01-01T00:00:00Z");
    assert!(json["locator"].as_str().unwrap().ends_with(&name));

    let (status, _) = get(&app, "/doc/7").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = get(&app, "/search?q=").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn commit_requires_token_and_survives_restart() {
    let dir = tempdir().unwrap();
    let app = build_app(config(dir.path(), Some("secret"))).unwrap();
    upload(&app, json!({
        "body": "Quantum computing", "title": "Quantum", "author": "Liu Wei", "keywords": "physics", "date": "2024-03-01"
    })).await;

    let (status, _) = call(&app, Request::post("/index/commit").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(!dir.path().join("index.bin").exists());

    let req = Request::post("/index/commit").header("X-ADMIN-TOKEN", "secret").body(Body::empty()).unwrap();
    let (status, _) = call(&app, req).await;
    assert_eq!(status, StatusCode::OK);

    // the uploaded file is gone, so only the snapshot can bring the document back
    fs::remove_dir_all(dir.path().join("documents")).unwrap();
    let restarted = build_app(config(dir.path(), None)).unwrap();
    let (_, json) = get(&restarted, "/search?q=physics").await;
    assert_eq!(ids(&json), vec![0]);
}

#[tokio::test]
async fn upload_names_stay_inside_documents_folder() {
    let dir = tempdir().unwrap();
    let app = build_app(config(dir.path(), None)).unwrap();

    let (status, body) = upload(&app, json!({
        "body": "breakout", "title": "../escaped", "author": "A/B\\C", "keywords": "k", "date": "2024-01-01"
    })).await;
    assert_eq!(status, StatusCode::CREATED);
    let locator = Path::new(body["locator"].as_str().unwrap());
    assert_eq!(locator.parent(), Some(dir.path().join("documents").as_path()));
    assert_eq!(fs::read_to_string(locator).unwrap(), "breakout");

    let mut root: Vec<_> = fs::read_dir(dir.path()).unwrap().map(|e| e.unwrap().file_name()).collect();
    root.sort();
    assert_eq!(root, vec!["documents"]);

    let (_, json) = get(&app, "/doc/0").await;
    assert_eq!(json["title"], "../escaped");
    assert_eq!(json["author"], "a/b\\c");
}

#[tokio::test]
async fn duplicate_upload_is_a_conflict() {
    let dir = tempdir().unwrap();
    let app = build_app(config(dir.path(), None)).unwrap();
    let doc = |body: &str| json!({
        "body": body, "title": "Same", "author": "Emma Clark", "keywords": "k", "date": "2024-01-01"
    });

    let (status, first) = upload(&app, doc("original text")).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = upload(&app, doc("replacement text")).await;
    assert_eq!(status, StatusCode::CONFLICT);

    assert_eq!(fs::read_to_string(first["locator"].as_str().unwrap()).unwrap(), "original text");
    assert_eq!(fs::read_dir(dir.path().join("documents")).unwrap().count(), 1);
    let (_, json) = get(&app, "/search?q=same").await;
    assert_eq!(ids(&json), vec![0]);
    let (status, _) = get(&app, "/doc/1").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
