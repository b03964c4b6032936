//! HTTP API tests against an in-process router (in-memory index, hash embedder, no judge)

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use civic_qa_config::{EmbeddingProvider, Settings};
use civic_qa_server::{build_state, create_router};

async fn app() -> Router {
    let mut settings = Settings::default();
    settings.index.in_memory = true;
    settings.embedding.provider = EmbeddingProvider::Hash;
    settings.embedding.dimension = 256;
    settings.gate.semantic_enabled = false;
    settings.validator.enabled = false;

    let state = build_state(settings).await.unwrap();
    create_router(state)
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn seed(app: &Router) {
    let (status, body) = call(
        app,
        "POST",
        "/api/sync",
        Some(json!({
            "action": "bulk_sync",
            "content": [
                {"id": 1, "question": "Bagaimana cara mengurus KTP baru?", "answer": "ans-ktp", "category": "kependudukan"},
                {"id": 2, "question": "Kapan batas pembayaran PBB tahunan?", "answer": "ans-pbb", "category": "pajak"},
                {"id": 3, "question": "Dimana lokasi posyandu terdekat?", "answer": "ans-posyandu", "category": "kesehatan"}
            ]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["total_synced"], 3);
    assert_eq!(body["message"], "Berhasil sinkronisasi 3 data Knowledge Bank");
}

#[tokio::test]
async fn search_returns_success_envelope() {
    let app = app().await;
    seed(&app).await;

    let (status, body) = call(
        &app,
        "POST",
        "/api/search",
        Some(json!({
            "question": "Bagaimana cara mengurus KTP baru di Kota Medan?",
            "wa_number": "628123456789"
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");

    let top = &body["data"]["similar_questions"][0];
    assert_eq!(top["id"], 1);
    assert_eq!(top["answer"], "ans-ktp");
    assert_eq!(top["note"], "auto_accepted_by_dense");

    let metadata = &body["data"]["metadata"];
    assert_eq!(metadata["category"], "kependudukan");
    assert_eq!(metadata["wa_number"], "628123456789");

    for key in ["ai_domain_sec", "embedding_sec", "qdrant_sec", "ai_relevance_sec", "total_sec"] {
        assert!(body["timing"][key].is_number(), "missing timing key {}", key);
    }
}

#[tokio::test]
async fn search_unmatched_question_is_low_confidence() {
    let app = app().await;
    seed(&app).await;

    let (status, body) = call(
        &app,
        "POST",
        "/api/search",
        Some(json!({ "question": "Jadwal pengangkutan sampah rumah tangga" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "low_confidence");
    assert!(body["data"].is_null());
    assert!(body["thresholds"]["high"].is_number());
}

#[tokio::test]
async fn search_out_of_scope_place_is_rejected_by_gate() {
    let app = app().await;
    seed(&app).await;

    let (status, body) = call(&app, "POST", "/api/search", Some(json!({ "question": "Jakarta" }))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "low_confidence");
    assert_eq!(body["timing"]["embedding_sec"], 0.0);
    assert_eq!(body["timing"]["qdrant_sec"], 0.0);
}

#[tokio::test]
async fn search_requires_question() {
    let app = app().await;

    let (status, body) = call(&app, "POST", "/api/search", Some(json!({ "question": "   " }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");
    assert_eq!(body["kind"], "invalid_input");

    let (status, body) = call(&app, "POST", "/api/search", Some(json!({ "wa_number": "62811" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "invalid_input");
}

#[tokio::test]
async fn search_rejects_malformed_json() {
    let app = app().await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/search")
        .header("content-type", "application/json")
        .body(Body::from("{ not json"))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn sync_add_update_delete_round() {
    let app = app().await;

    let (status, body) = call(
        &app,
        "POST",
        "/api/sync",
        Some(json!({
            "action": "add",
            "content": {"id": 7, "question": "Syarat izin mendirikan bangunan", "answer": "ans-7", "category": "perizinan"}
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], 7);
    assert_eq!(body["message"], "Data berhasil ditambahkan ke Knowledge Bank");

    let (_, health) = call(&app, "GET", "/health", None).await;
    assert_eq!(health["checks"]["index"]["count"], 1);

    let (status, body) = call(
        &app,
        "POST",
        "/api/sync",
        Some(json!({
            "action": "update",
            "content": {"id": 7, "question": "Syarat izin usaha mikro", "answer": "ans-7b"}
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Data berhasil diupdate di Knowledge Bank");

    let (_, health) = call(&app, "GET", "/health", None).await;
    assert_eq!(health["checks"]["index"]["count"], 1);

    let (status, body) = call(
        &app,
        "POST",
        "/api/sync",
        Some(json!({ "action": "delete", "content": {"id": 7} })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Data berhasil dihapus dari Knowledge Bank");

    let (_, health) = call(&app, "GET", "/health", None).await;
    assert_eq!(health["checks"]["index"]["count"], 0);
}

#[tokio::test]
async fn sync_accepts_loose_cms_payloads() {
    let app = app().await;

    let (status, body) = call(
        &app,
        "POST",
        "/api/sync",
        Some(json!({
            "action": "add",
            "content": {"id": "8", "question": "Bagaimana cara mengurus KTP baru?", "answer": "ans-8", "category": 3}
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], 8);

    let (status, body) = call(
        &app,
        "POST",
        "/api/sync",
        Some(json!({
            "action": "update",
            "content": {"id": 8, "question": "Bagaimana cara mengurus KTP baru?", "answer": "ans-8", "category": "Kependudukan"}
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], 8);

    let (status, body) = call(
        &app,
        "POST",
        "/api/search",
        Some(json!({ "question": "Bagaimana cara mengurus KTP baru?", "category_id": "KEPENDUDUKAN" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["data"]["similar_questions"][0]["id"], 8);

    let (status, _) = call(
        &app,
        "POST",
        "/api/sync",
        Some(json!({ "action": "delete", "content": {"id": "8"} })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, health) = call(&app, "GET", "/health", None).await;
    assert_eq!(health["checks"]["index"]["count"], 0);
}

#[tokio::test]
async fn sync_rejects_unknown_action_and_blank_question() {
    let app = app().await;

    let (status, body) = call(
        &app,
        "POST",
        "/api/sync",
        Some(json!({ "action": "purge", "content": {} })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");
    assert!(body["message"].as_str().unwrap().contains("Action 'purge' tidak dikenali"));

    let (status, body) = call(
        &app,
        "POST",
        "/api/sync",
        Some(json!({
            "action": "add",
            "content": {"id": 9, "question": "  ", "answer": "x"}
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "invalid_input");
}

#[tokio::test]
async fn health_and_readiness() {
    let app = app().await;

    let (status, body) = call(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = call(&app, "GET", "/ready", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
    assert_eq!(body["checks"]["judge"]["status"], "disabled");
}
