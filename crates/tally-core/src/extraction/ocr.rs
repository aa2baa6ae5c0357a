//! RapidAPI OCR adapter
//!
//! Posts the image as multipart form data and resolves the reply into plain
//! text. The service answers either `{"text": "..."}` or a bare text body.

use std::path::Path;

use async_trait::async_trait;
use reqwest::{multipart, Client};
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};

use super::TextExtractor;

/// Default RapidAPI host for the OCR service
pub const DEFAULT_OCR_HOST: &str = "ocr-extract-text.p.rapidapi.com";

/// Header carrying the API key
pub const API_KEY_HEADER: &str = "x-rapidapi-key";

/// Header carrying the API host identifier
pub const API_HOST_HEADER: &str = "x-rapidapi-host";

/// Multipart field carrying the image bytes
pub const IMAGE_FIELD: &str = "image";

/// Client for the OCR endpoint
#[derive(Clone)]
pub struct OcrClient {
    http_client: Client,
    url: String,
    api_key: String,
    api_host: String,
}

impl OcrClient {
    pub fn new(url: &str, api_key: &str, api_host: &str) -> Self {
        Self {
            http_client: Client::new(),
            url: url.to_string(),
            api_key: api_key.to_string(),
            api_host: api_host.to_string(),
        }
    }

    /// Create from environment variables
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("RAPIDAPI_KEY")
            .ok()
            .filter(|k| !k.is_empty())?;
        let api_host =
            std::env::var("RAPIDAPI_HOST").unwrap_or_else(|_| DEFAULT_OCR_HOST.to_string());
        let url = std::env::var("OCR_URL")
            .ok()
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| format!("https://{}/ocr", api_host));
        Some(Self::new(&url, &api_key, &api_host))
    }

    /// Endpoint URL (for logging)
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Send image bytes to the OCR service and return the resolved text
    pub async fn extract_text_from_bytes(&self, file_name: &str, bytes: Vec<u8>) -> Result<String> {
        let part = multipart::Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(mime_for(file_name))
            .map_err(|e| Error::ExtractionUnavailable(e.to_string()))?;
        let form = multipart::Form::new().part(IMAGE_FIELD, part);

        let response = self
            .http_client
            .post(&self.url)
            .header(API_KEY_HEADER, &self.api_key)
            .header(API_HOST_HEADER, &self.api_host)
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::ExtractionUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::ExtractionUnavailable(format!(
                "OCR service returned {}",
                status
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::ExtractionUnavailable(e.to_string()))?;

        let text = resolve_ocr_text(&body);
        if text.trim().is_empty() {
            return Err(Error::EmptyExtraction);
        }

        debug!(chars = text.len(), "OCR response resolved");
        Ok(text)
    }
}

#[async_trait]
impl TextExtractor for OcrClient {
    async fn extract_text(&self, image_path: &Path) -> Result<String> {
        let bytes = std::fs::read(image_path)?;
        let file_name = image_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| IMAGE_FIELD.to_string());
        self.extract_text_from_bytes(&file_name, bytes).await
    }
}

/// Pick the text out of an OCR response body
///
/// A JSON object with a `text` key yields that value; anything else yields
/// the body unchanged.
pub fn resolve_ocr_text(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(fields)) if fields.contains_key("text") => match &fields["text"] {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        },
        _ => body.to_string(),
    }
}

fn mime_for(file_name: &str) -> &'static str {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        _ => "application/octet-stream",
    }
}
