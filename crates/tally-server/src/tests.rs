//! Server API tests

use super::*;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use chrono::Duration;
use http_body_util::BodyExt;
use tally_core::auth;
use tally_core::db::Database;
use tally_core::models::NewTransaction;
use tally_core::test_utils::{MockExtractionServer, MockReplies};
use tempfile::TempDir;
use tower::ServiceExt;

const WIDGET_REPLY: &str = r#"{"invoice_date":"2024-01-05","due_date":null,"items":[{"name":"Widget","quantity":1,"price":50,"total":50}],"total_amount":"50.00"}"#;

const BOUNDARY: &str = "tally-test-boundary";

struct TestApp {
    app: Router,
    db: Database,
    uploads: TempDir,
}

fn setup_test_app(processor: Option<RemoteInvoiceProcessor>) -> TestApp {
    let db = Database::in_memory().unwrap();
    let uploads = TempDir::new().unwrap();
    let app = create_router_with_options(
        db.clone(),
        None,
        ServerConfig::default(),
        processor,
        uploads.path().to_path_buf(),
    );
    TestApp { app, db, uploads }
}

/// Register a user directly and return (user_id, session token)
fn login_as(db: &Database, username: &str) -> (i64, String) {
    let user = auth::register_user(
        db,
        username,
        &format!("{}@example.com", username),
        "s3cret",
    )
    .unwrap();
    let token = auth::start_session(db, user.id, Duration::hours(1)).unwrap();
    (user.id, token)
}

fn stored_invoice(user_id: i64, total: f64) -> NewTransaction {
    NewTransaction {
        user_id,
        invoice_date: None,
        due_date: None,
        total_amount: total,
        items: vec![],
        filename: "20240105_120000_invoice.png".into(),
        raw_text: Some("Invoice".into()),
    }
}

async fn get_body_json(response: axum::response::Response) -> serde_json::Value {
    let body = response.into_body();
    let bytes = body.collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn get_with_token(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn upload_request(token: &str, field: &str, filename: &str, bytes: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
            BOUNDARY, field, filename
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method("POST")
        .uri("/api/invoices")
        .header("authorization", format!("Bearer {}", token))
        .header(
            "content-type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

fn uploaded_files(dir: &TempDir) -> Vec<String> {
    std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect()
}

// ========== Auth API Tests ==========

#[tokio::test]
async fn test_register() {
    let t = setup_test_app(None);

    let response = t
        .app
        .oneshot(post_json(
            "/api/register",
            serde_json::json!({"username": "alice", "email": "alice@example.com", "password": "s3cret"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let json = get_body_json(response).await;
    assert_eq!(json["username"], "alice");
    assert!(json.get("password_hash").is_none());
}

#[tokio::test]
async fn test_register_duplicates_conflict() {
    let t = setup_test_app(None);
    login_as(&t.db, "alice");

    let response = t
        .app
        .clone()
        .oneshot(post_json(
            "/api/register",
            serde_json::json!({"username": "alice", "email": "new@example.com", "password": "pw"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let json = get_body_json(response).await;
    assert_eq!(json["error"], "Username already exists.");

    let response = t
        .app
        .oneshot(post_json(
            "/api/register",
            serde_json::json!({"username": "alice2", "email": "alice@example.com", "password": "pw"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let json = get_body_json(response).await;
    assert_eq!(json["error"], "Email already registered.");
}

#[tokio::test]
async fn test_register_missing_fields() {
    let t = setup_test_app(None);

    let response = t
        .app
        .oneshot(post_json(
            "/api/register",
            serde_json::json!({"username": "alice"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(t.db.list_users().unwrap().is_empty());
}

#[tokio::test]
async fn test_login_sets_cookie_and_token_works() {
    let t = setup_test_app(None);
    auth::register_user(&t.db, "alice", "alice@example.com", "s3cret").unwrap();

    let response = t
        .app
        .clone()
        .oneshot(post_json(
            "/api/login",
            serde_json::json!({"username": "alice", "password": "s3cret"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let cookie = response
        .headers()
        .get("set-cookie")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(cookie.starts_with("tally_session="));
    assert!(cookie.contains("HttpOnly"));

    let json = get_body_json(response).await;
    let token = json["token"].as_str().unwrap().to_string();
    assert_eq!(json["user"]["username"], "alice");

    // Bearer token
    let response = t
        .app
        .clone()
        .oneshot(get_with_token("/api/me", &token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(get_body_json(response).await["username"], "alice");

    // Cookie
    let response = t
        .app
        .oneshot(
            Request::builder()
                .uri("/api/me")
                .header("cookie", format!("theme=dark; tally_session={}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_login_invalid_credentials() {
    let t = setup_test_app(None);
    auth::register_user(&t.db, "alice", "alice@example.com", "s3cret").unwrap();

    let response = t
        .app
        .oneshot(post_json(
            "/api/login",
            serde_json::json!({"username": "alice", "password": "wrong"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = get_body_json(response).await;
    assert_eq!(json["error"], "Invalid username or password.");
}

#[tokio::test]
async fn test_protected_routes_require_session() {
    let t = setup_test_app(None);

    for uri in [
        "/api/me",
        "/api/dashboard",
        "/api/transactions",
        "/api/transactions/1",
        "/api/advice",
    ] {
        let response = t
            .app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "uri: {}", uri);
    }

    let response = t
        .app
        .oneshot(get_with_token("/api/me", "not-a-real-token"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_ends_session() {
    let t = setup_test_app(None);
    let (_, token) = login_as(&t.db, "alice");

    let response = t
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/logout")
                .header("authorization", format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = response.headers().get("set-cookie").unwrap();
    assert!(cookie.to_str().unwrap().contains("Max-Age=0"));

    let response = t
        .app
        .oneshot(get_with_token("/api/me", &token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_security_headers() {
    let t = setup_test_app(None);

    let response = t
        .app
        .oneshot(Request::builder().uri("/api/me").body(Body::empty()).unwrap())
        .await
        .unwrap();

    let headers = response.headers();
    assert_eq!(headers.get("x-content-type-options").unwrap(), "nosniff");
    assert_eq!(headers.get("x-frame-options").unwrap(), "DENY");
    assert!(headers.get("content-security-policy").is_some());
}

// ========== Invoice Upload Tests ==========

#[tokio::test]
async fn test_upload_invoice() {
    let server = MockExtractionServer::start(MockReplies::new(
        r#"{"text": "Invoice #1 Total: $50"}"#,
        WIDGET_REPLY,
    ))
    .await;
    let t = setup_test_app(Some(server.processor()));
    let (user_id, token) = login_as(&t.db, "alice");

    let response = t
        .app
        .oneshot(upload_request(&token, "file", "My Invoice.PNG", b"fake png"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let json = get_body_json(response).await;
    assert_eq!(json["total_amount"], 50.0);
    assert_eq!(json["invoice_date"], "2024-01-05");
    assert_eq!(json["items"][0]["name"], "Widget");
    assert_eq!(json["raw_text"], "Invoice #1 Total: $50");

    // Stored as <YYYYmmdd_HHMMSS>_<8 hex>_<sanitized name>
    let filename = json["filename"].as_str().unwrap();
    assert!(filename.ends_with("_My_Invoice.PNG"), "filename: {}", filename);
    assert_eq!(filename.len(), "20240105_120000_0123abcd_My_Invoice.PNG".len());
    assert_eq!(uploaded_files(&t.uploads), vec![filename.to_string()]);

    assert_eq!(t.db.count_transactions(user_id).unwrap(), 1);
    assert_eq!(server.uploads()[0].file_name.as_deref(), Some(filename));
}

#[tokio::test]
async fn test_uploads_with_same_name_stay_separate() {
    let server = MockExtractionServer::start(MockReplies::new(
        r#"{"text": "Invoice #1 Total: $50"}"#,
        WIDGET_REPLY,
    ))
    .await;
    let t = setup_test_app(Some(server.processor()));
    let (_, alice_token) = login_as(&t.db, "alice");
    let (_, bob_token) = login_as(&t.db, "bob");

    let response = t
        .app
        .clone()
        .oneshot(upload_request(&alice_token, "file", "invoice.png", b"ALICE"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let alice_file = get_body_json(response).await["filename"]
        .as_str()
        .unwrap()
        .to_string();

    let response = t
        .app
        .clone()
        .oneshot(upload_request(&bob_token, "file", "invoice.png", b"BOB"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let json = get_body_json(response).await;
    let bob_file = json["filename"].as_str().unwrap().to_string();
    let bob_tx = json["id"].as_i64().unwrap();

    assert_ne!(alice_file, bob_file);
    let alice_path = t.uploads.path().join(&alice_file);
    assert_eq!(std::fs::read(&alice_path).unwrap(), b"ALICE");
    assert_eq!(std::fs::read(t.uploads.path().join(&bob_file)).unwrap(), b"BOB");

    // Bob deleting his invoice leaves Alice's image alone
    let response = t
        .app
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/transactions/{}", bob_tx))
                .header("authorization", format!("Bearer {}", bob_token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(alice_path.exists());
    assert_eq!(uploaded_files(&t.uploads), vec![alice_file]);
}

#[tokio::test]
async fn test_upload_rejects_disallowed_extension() {
    let server = MockExtractionServer::start(MockReplies::new("text", WIDGET_REPLY)).await;
    let t = setup_test_app(Some(server.processor()));
    let (user_id, token) = login_as(&t.db, "alice");

    let response = t
        .app
        .oneshot(upload_request(&token, "file", "invoice.pdf", b"%PDF"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = get_body_json(response).await;
    assert_eq!(json["error"], "Invalid file type. Please upload an image file.");

    assert_eq!(server.ocr_calls(), 0);
    assert!(uploaded_files(&t.uploads).is_empty());
    assert_eq!(t.db.count_transactions(user_id).unwrap(), 0);
}

#[tokio::test]
async fn test_upload_without_file_field() {
    let server = MockExtractionServer::start(MockReplies::new("text", WIDGET_REPLY)).await;
    let t = setup_test_app(Some(server.processor()));
    let (_, token) = login_as(&t.db, "alice");

    let response = t
        .app
        .oneshot(upload_request(&token, "attachment", "invoice.png", b"png"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = get_body_json(response).await;
    assert_eq!(json["error"], "No file selected.");
}

#[tokio::test]
async fn test_upload_processing_failure_removes_file() {
    let server =
        MockExtractionServer::start(MockReplies::new("down", WIDGET_REPLY).with_ocr_status(500))
            .await;
    let t = setup_test_app(Some(server.processor()));
    let (user_id, token) = login_as(&t.db, "alice");

    let response = t
        .app
        .oneshot(upload_request(&token, "file", "invoice.jpg", b"fake jpg"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let json = get_body_json(response).await;
    assert_eq!(json["error"], "Failed to process invoice. Please try again.");

    assert_eq!(server.ocr_calls(), 1);
    assert_eq!(server.gemini_calls(), 0);
    assert!(uploaded_files(&t.uploads).is_empty());
    assert_eq!(t.db.count_transactions(user_id).unwrap(), 0);
}

#[tokio::test]
async fn test_upload_malformed_reply_is_bad_gateway() {
    let server = MockExtractionServer::start(MockReplies::new(
        "Invoice",
        r#"{"items": {"name": "Widget"}}"#,
    ))
    .await;
    let t = setup_test_app(Some(server.processor()));
    let (_, token) = login_as(&t.db, "alice");

    let response = t
        .app
        .oneshot(upload_request(&token, "file", "invoice.gif", b"GIF89a"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert!(uploaded_files(&t.uploads).is_empty());
}

#[tokio::test]
async fn test_upload_without_pipeline_configured() {
    let t = setup_test_app(None);
    let (_, token) = login_as(&t.db, "alice");

    let response = t
        .app
        .oneshot(upload_request(&token, "file", "invoice.png", b"png"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

// ========== Transaction API Tests ==========

#[tokio::test]
async fn test_list_transactions_pagination() {
    let t = setup_test_app(None);
    let (user_id, token) = login_as(&t.db, "alice");
    for i in 0..12 {
        t.db.insert_transaction(&stored_invoice(user_id, i as f64))
            .unwrap();
    }

    let response = t
        .app
        .clone()
        .oneshot(get_with_token("/api/transactions", &token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["transactions"].as_array().unwrap().len(), 10);
    assert_eq!(json["page"], 1);
    assert_eq!(json["per_page"], 10);
    assert_eq!(json["total"], 12);
    assert_eq!(json["pages"], 2);
    assert_eq!(json["has_prev"], false);
    assert_eq!(json["has_next"], true);

    let response = t
        .app
        .clone()
        .oneshot(get_with_token("/api/transactions?page=2", &token))
        .await
        .unwrap();
    let json = get_body_json(response).await;
    assert_eq!(json["transactions"].as_array().unwrap().len(), 2);
    assert_eq!(json["has_next"], false);

    let response = t
        .app
        .oneshot(get_with_token("/api/transactions?page=7", &token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert!(json["transactions"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_transactions_are_private() {
    let t = setup_test_app(None);
    let (alice, alice_token) = login_as(&t.db, "alice");
    let (_, bob_token) = login_as(&t.db, "bob");
    let id = t.db.insert_transaction(&stored_invoice(alice, 42.0)).unwrap();
    let uri = format!("/api/transactions/{}", id);

    let response = t
        .app
        .clone()
        .oneshot(get_with_token(&uri, &bob_token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = t
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(&uri)
                .header("authorization", format!("Bearer {}", bob_token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = t
        .app
        .clone()
        .oneshot(get_with_token("/api/transactions", &bob_token))
        .await
        .unwrap();
    let json = get_body_json(response).await;
    assert_eq!(json["total"], 0);

    let response = t
        .app
        .oneshot(get_with_token(&uri, &alice_token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(get_body_json(response).await["total_amount"], 42.0);
}

#[tokio::test]
async fn test_delete_transaction_removes_image() {
    let t = setup_test_app(None);
    let (user_id, token) = login_as(&t.db, "alice");
    let invoice = stored_invoice(user_id, 10.0);
    std::fs::write(t.uploads.path().join(&invoice.filename), b"png").unwrap();
    let id = t.db.insert_transaction(&invoice).unwrap();
    let uri = format!("/api/transactions/{}", id);

    let response = t
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(&uri)
                .header("authorization", format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(uploaded_files(&t.uploads).is_empty());

    let response = t
        .app
        .oneshot(get_with_token(&uri, &token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ========== Dashboard & Advice Tests ==========

#[tokio::test]
async fn test_dashboard() {
    let t = setup_test_app(None);
    let (user_id, token) = login_as(&t.db, "alice");
    for total in [10.0, 20.0, 30.0, 40.0, 50.0, 60.0] {
        t.db.insert_transaction(&stored_invoice(user_id, total))
            .unwrap();
    }

    let response = t
        .app
        .oneshot(get_with_token("/api/dashboard", &token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = get_body_json(response).await;
    assert_eq!(json["recent_transactions"].as_array().unwrap().len(), 5);
    assert_eq!(json["monthly_total"], 210.0);
}

#[tokio::test]
async fn test_advice_without_transactions() {
    let t = setup_test_app(None);
    let (_, token) = login_as(&t.db, "alice");

    let response = t
        .app
        .oneshot(get_with_token("/api/advice", &token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = get_body_json(response).await;
    assert_eq!(
        json["advice_text"],
        tally_core::advice::NO_DATA_ADVICE
    );
    assert_eq!(json["total_transactions"], 0);
    assert_eq!(json["monthly_spending"], 0.0);
}

#[tokio::test]
async fn test_advice_with_transactions() {
    let t = setup_test_app(None);
    let (user_id, token) = login_as(&t.db, "alice");
    t.db.insert_transaction(&stored_invoice(user_id, 250.0))
        .unwrap();

    let response = t
        .app
        .oneshot(get_with_token("/api/advice", &token))
        .await
        .unwrap();

    let json = get_body_json(response).await;
    assert_eq!(json["total_transactions"], 1);
    assert_eq!(json["avg_transaction"], 250.0);
    let advice = json["advice_text"].as_str().unwrap();
    assert!(advice.contains("average transaction amount is quite high"));
}
