//! Gemini generateContent adapter
//!
//! Sends the OCR text inside a fixed prompt and parses the generated reply
//! into an [`InvoiceExtraction`].

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::InvoiceExtraction;

use super::parsing::parse_invoice_reply;
use super::StructuredExtractor;

/// Default model when `GEMINI_MODEL` is not set
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";

/// Base URL for model endpoints
const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Header carrying the API key
pub const API_KEY_HEADER: &str = "X-goog-api-key";

/// Build the extraction prompt for `invoice_text`
pub fn build_prompt(invoice_text: &str) -> String {
    format!(
        r#"
    Extract the following information from the invoice text and return it in valid JSON format:
    - invoice_date (format: YYYY-MM-DD, or null if not found)
    - due_date (format: YYYY-MM-DD, or null if not found)
    - items (array of objects with: name, quantity, price, total)
    - total_amount (numeric value only, no currency symbols)

    Return only valid JSON in this exact format:
    {{
      "invoice_date": "YYYY-MM-DD or null",
      "due_date": "YYYY-MM-DD or null",
      "items": [
        {{"name": "item name", "quantity": 1, "price": 10.00, "total": 10.00}}
      ],
      "total_amount": 100.00
    }}

    Invoice text:
    {invoice_text}

    "#
    )
}

/// Client for the generative-language `generateContent` endpoint
#[derive(Clone)]
pub struct GeminiClient {
    http_client: Client,
    endpoint: String,
    api_key: String,
}

impl GeminiClient {
    /// Create a client for a full `...:generateContent` endpoint URL
    pub fn new(endpoint: &str, api_key: &str) -> Self {
        Self {
            http_client: Client::new(),
            endpoint: endpoint.to_string(),
            api_key: api_key.to_string(),
        }
    }

    /// Create a client for a named model on the public endpoint
    pub fn for_model(model: &str, api_key: &str) -> Self {
        Self::new(
            &format!("{}/{}:generateContent", GEMINI_BASE_URL, model),
            api_key,
        )
    }

    /// Create from environment variables
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())?;

        match std::env::var("GEMINI_URL").ok().filter(|u| !u.is_empty()) {
            Some(url) => Some(Self::new(&url, &api_key)),
            None => {
                let model = std::env::var("GEMINI_MODEL")
                    .unwrap_or_else(|_| DEFAULT_GEMINI_MODEL.to_string());
                Some(Self::for_model(&model, &api_key))
            }
        }
    }

    /// Endpoint URL (for logging)
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Send `prompt` and return the generated text
    pub async fn generate(&self, prompt: &str) -> Result<String> {
        let request = GenerateContentRequest {
            contents: vec![RequestContent {
                parts: vec![RequestPart {
                    text: prompt.to_string(),
                }],
            }],
        };

        let response = self
            .http_client
            .post(&self.endpoint)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::GenerationUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::GenerationUnavailable(format!(
                "generateContent returned {}",
                status
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::GenerationUnavailable(e.to_string()))?;

        let envelope: serde_json::Value = serde_json::from_str(&body).map_err(|e| {
            Error::GenerationUnavailable(format!("Response body is not JSON: {}", e))
        })?;
        let envelope: GenerateContentResponse = serde_json::from_value(envelope)
            .map_err(|e| Error::MalformedResponse(format!("Unexpected response shape: {}", e)))?;

        let text = envelope.first_text().ok_or_else(|| {
            Error::MalformedResponse("Missing candidates[0].content.parts[0].text".into())
        })?;

        if text.is_empty() {
            return Err(Error::GenerationUnavailable(
                "Empty response from AI service".into(),
            ));
        }

        debug!("Gemini response: {}", text);
        Ok(text)
    }
}

#[async_trait]
impl StructuredExtractor for GeminiClient {
    async fn extract_structured_data(&self, raw_text: &str) -> Result<InvoiceExtraction> {
        let prompt = build_prompt(raw_text);
        let reply = self.generate(&prompt).await?;
        parse_invoice_reply(&reply)
    }
}

/// Request body: `{"contents":[{"parts":[{"text": ...}]}]}`
#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<RequestContent>,
}

#[derive(Debug, Serialize)]
struct RequestContent {
    parts: Vec<RequestPart>,
}

#[derive(Debug, Serialize)]
struct RequestPart {
    text: String,
}

/// Response envelope
///
/// Every level is optional on the wire; only the first candidate's first
/// part is read.
#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

impl GenerateContentResponse {
    fn first_text(self) -> Option<String> {
        self.candidates
            .into_iter()
            .next()?
            .content?
            .parts
            .into_iter()
            .next()?
            .text
    }
}
