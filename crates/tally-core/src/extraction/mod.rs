//! Invoice extraction pipeline
//!
//! Turns an uploaded invoice image into an [`InvoiceExtraction`] by chaining
//! two remote services. Nothing here runs a model locally; both stages are
//! HTTP adapters with tolerant post-processing.
//!
//! # Architecture
//!
//! - `TextExtractor` trait: image file -> raw OCR text (`OcrClient`)
//! - `StructuredExtractor` trait: raw text -> typed record (`GeminiClient`)
//! - `InvoiceProcessor`: sequences both stages and wraps any failure in
//!   `Error::InvoiceProcessingFailed`
//! - `MockTextExtractor` / `MockStructuredExtractor`: canned doubles for tests
//!
//! # Configuration
//!
//! Environment variables:
//! - `RAPIDAPI_KEY`: OCR API key (required)
//! - `RAPIDAPI_HOST`: OCR API host header (default: ocr-extract-text.p.rapidapi.com)
//! - `OCR_URL`: OCR endpoint (default: `https://<RAPIDAPI_HOST>/ocr`)
//! - `GEMINI_API_KEY`: generative-language API key (required)
//! - `GEMINI_MODEL`: model name (default: gemini-2.0-flash)
//! - `GEMINI_URL`: full generateContent endpoint (overrides `GEMINI_MODEL`)

pub mod gemini;
mod mock;
pub mod ocr;
pub mod parsing;

pub use gemini::GeminiClient;
pub use mock::{MockStructuredExtractor, MockTextExtractor};
pub use ocr::OcrClient;

use std::path::Path;

use async_trait::async_trait;
use tracing::{debug, error, info};

use crate::error::{Error, Result};
use crate::models::InvoiceExtraction;

/// Converts an image on local disk into raw text
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Extract text from the image at `image_path`
    ///
    /// Fails with `ExtractionUnavailable` when the service cannot be used and
    /// with `EmptyExtraction` when it returns only whitespace.
    async fn extract_text(&self, image_path: &Path) -> Result<String>;
}

/// Converts raw invoice text into a typed record
#[async_trait]
pub trait StructuredExtractor: Send + Sync {
    /// Extract invoice fields from `raw_text`
    ///
    /// The returned record has an empty `raw_text`; the orchestrator attaches it.
    async fn extract_structured_data(&self, raw_text: &str) -> Result<InvoiceExtraction>;
}

/// Sequences text extraction and structured extraction for one upload
#[derive(Clone)]
pub struct InvoiceProcessor<T, S> {
    text: T,
    structured: S,
}

/// Production pipeline: RapidAPI OCR followed by Gemini
pub type RemoteInvoiceProcessor = InvoiceProcessor<OcrClient, GeminiClient>;

impl<T, S> InvoiceProcessor<T, S>
where
    T: TextExtractor,
    S: StructuredExtractor,
{
    pub fn new(text: T, structured: S) -> Self {
        Self { text, structured }
    }

    pub fn text_extractor(&self) -> &T {
        &self.text
    }

    pub fn structured_extractor(&self) -> &S {
        &self.structured
    }

    /// Process the invoice image at `image_path`
    ///
    /// Returns the fully populated record, `raw_text` included. Every adapter
    /// failure is logged and surfaced as `Error::InvoiceProcessingFailed`.
    pub async fn process_invoice(&self, image_path: &Path) -> Result<InvoiceExtraction> {
        match self.run(image_path).await {
            Ok(extraction) => {
                info!(
                    path = %image_path.display(),
                    items = extraction.items.len(),
                    total = extraction.total_amount,
                    "Invoice processed"
                );
                Ok(extraction)
            }
            Err(e) => {
                error!(path = %image_path.display(), error = %e, "Invoice processing error");
                Err(Error::processing_failed(e))
            }
        }
    }

    async fn run(&self, image_path: &Path) -> Result<InvoiceExtraction> {
        let text = self.text.extract_text(image_path).await?;
        debug!(chars = text.len(), "OCR text extracted");

        let extraction = self.structured.extract_structured_data(&text).await?;
        Ok(extraction.with_raw_text(text))
    }
}

impl RemoteInvoiceProcessor {
    /// Create the remote pipeline from environment variables
    ///
    /// Returns None unless both `RAPIDAPI_KEY` and `GEMINI_API_KEY` are set.
    pub fn from_env() -> Option<Self> {
        let ocr = OcrClient::from_env()?;
        let gemini = GeminiClient::from_env()?;
        Some(Self::new(ocr, gemini))
    }
}
