//! Test utilities for tally-core
//!
//! This module provides a mock extraction server that speaks both remote
//! wire formats (RapidAPI OCR and Gemini generateContent), for integration
//! tests in this crate and in tally-server.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::{
    extract::{Multipart, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use serde_json::Value;
use tokio::sync::oneshot;

use crate::extraction::{gemini, ocr, GeminiClient, OcrClient, RemoteInvoiceProcessor};

/// API key the mock server expects on both endpoints
pub const MOCK_API_KEY: &str = "test-key";

/// Canned replies served by [`MockExtractionServer`]
#[derive(Debug, Clone)]
pub struct MockReplies {
    pub ocr_status: u16,
    pub ocr_body: String,
    pub gemini_status: u16,
    pub gemini_body: String,
}

impl MockReplies {
    /// OCR returns `ocr_body` verbatim; the model generates `generated_text`
    pub fn new(ocr_body: &str, generated_text: &str) -> Self {
        Self {
            ocr_status: 200,
            ocr_body: ocr_body.to_string(),
            gemini_status: 200,
            gemini_body: gemini_envelope(generated_text),
        }
    }

    /// Make the OCR endpoint fail with `status`
    pub fn with_ocr_status(mut self, status: u16) -> Self {
        self.ocr_status = status;
        self
    }

    /// Make the generateContent endpoint fail with `status`
    pub fn with_gemini_status(mut self, status: u16) -> Self {
        self.gemini_status = status;
        self
    }

    /// Replace the whole generateContent response body
    pub fn with_gemini_body(mut self, body: &str) -> Self {
        self.gemini_body = body.to_string();
        self
    }
}

/// Wrap `generated_text` in a generateContent response envelope
pub fn gemini_envelope(generated_text: &str) -> String {
    serde_json::json!({
        "candidates": [{"content": {"parts": [{"text": generated_text}]}}]
    })
    .to_string()
}

/// An image upload received by the mock OCR endpoint
#[derive(Debug, Clone)]
pub struct ReceivedUpload {
    pub file_name: Option<String>,
    pub size: usize,
}

struct MockState {
    replies: MockReplies,
    ocr_calls: AtomicUsize,
    gemini_calls: AtomicUsize,
    uploads: Mutex<Vec<ReceivedUpload>>,
    prompts: Mutex<Vec<String>>,
}

/// Mock OCR + generative-language server for testing
pub struct MockExtractionServer {
    addr: SocketAddr,
    state: Arc<MockState>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockExtractionServer {
    /// Start the mock server on an available port
    pub async fn start(replies: MockReplies) -> Self {
        let state = Arc::new(MockState {
            replies,
            ocr_calls: AtomicUsize::new(0),
            gemini_calls: AtomicUsize::new(0),
            uploads: Mutex::new(Vec::new()),
            prompts: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/ocr", post(handle_ocr))
            .route("/generate", post(handle_generate))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            state,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    pub fn ocr_url(&self) -> String {
        format!("http://{}/ocr", self.addr)
    }

    pub fn gemini_url(&self) -> String {
        format!("http://{}/generate", self.addr)
    }

    /// OCR client pointed at this server
    pub fn ocr_client(&self) -> OcrClient {
        OcrClient::new(&self.ocr_url(), MOCK_API_KEY, ocr::DEFAULT_OCR_HOST)
    }

    /// Gemini client pointed at this server
    pub fn gemini_client(&self) -> GeminiClient {
        GeminiClient::new(&self.gemini_url(), MOCK_API_KEY)
    }

    /// Full pipeline pointed at this server
    pub fn processor(&self) -> RemoteInvoiceProcessor {
        RemoteInvoiceProcessor::new(self.ocr_client(), self.gemini_client())
    }

    pub fn ocr_calls(&self) -> usize {
        self.state.ocr_calls.load(Ordering::SeqCst)
    }

    pub fn gemini_calls(&self) -> usize {
        self.state.gemini_calls.load(Ordering::SeqCst)
    }

    /// Uploads received by the OCR endpoint
    pub fn uploads(&self) -> Vec<ReceivedUpload> {
        self.state.uploads.lock().unwrap().clone()
    }

    /// Prompts received by the generateContent endpoint
    pub fn prompts(&self) -> Vec<String> {
        self.state.prompts.lock().unwrap().clone()
    }

    /// Stop the mock server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockExtractionServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// An OCR client that can never connect (nothing listens on port 1)
pub fn unreachable_ocr_client() -> OcrClient {
    OcrClient::new("http://127.0.0.1:1/ocr", MOCK_API_KEY, ocr::DEFAULT_OCR_HOST)
}

fn has_header(headers: &HeaderMap, name: &str, expected: &str) -> bool {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v == expected)
        .unwrap_or(false)
}

/// RapidAPI OCR endpoint
async fn handle_ocr(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> impl IntoResponse {
    state.ocr_calls.fetch_add(1, Ordering::SeqCst);

    if !has_header(&headers, ocr::API_KEY_HEADER, MOCK_API_KEY)
        || !has_header(&headers, ocr::API_HOST_HEADER, ocr::DEFAULT_OCR_HOST)
    {
        return (StatusCode::UNAUTHORIZED, "missing RapidAPI headers".to_string());
    }

    let mut received = None;
    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() == Some(ocr::IMAGE_FIELD) {
            let file_name = field.file_name().map(|s| s.to_string());
            let size = field.bytes().await.map(|b| b.len()).unwrap_or(0);
            received = Some(ReceivedUpload { file_name, size });
        }
    }

    let Some(upload) = received else {
        return (StatusCode::BAD_REQUEST, "missing image field".to_string());
    };
    state.uploads.lock().unwrap().push(upload);

    let status =
        StatusCode::from_u16(state.replies.ocr_status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, state.replies.ocr_body.clone())
}

/// Gemini generateContent endpoint
async fn handle_generate(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(request): Json<Value>,
) -> impl IntoResponse {
    state.gemini_calls.fetch_add(1, Ordering::SeqCst);

    if !has_header(&headers, gemini::API_KEY_HEADER, MOCK_API_KEY) {
        return (
            StatusCode::UNAUTHORIZED,
            [(header::CONTENT_TYPE, "application/json")],
            r#"{"error": "missing api key"}"#.to_string(),
        );
    }

    if let Some(prompt) = request["contents"][0]["parts"][0]["text"].as_str() {
        state.prompts.lock().unwrap().push(prompt.to_string());
    }

    let status = StatusCode::from_u16(state.replies.gemini_status)
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        [(header::CONTENT_TYPE, "application/json")],
        state.replies.gemini_body.clone(),
    )
}
