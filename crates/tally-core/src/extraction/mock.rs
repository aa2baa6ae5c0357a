//! Mock extractors for testing
//!
//! Canned replies for both pipeline stages, with call counters so tests can
//! assert which stages actually ran.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::models::InvoiceExtraction;

use super::parsing::parse_invoice_reply;
use super::{StructuredExtractor, TextExtractor};

/// Text extractor returning a fixed result
#[derive(Clone)]
pub struct MockTextExtractor {
    reply: std::result::Result<String, String>,
    calls: Arc<AtomicUsize>,
}

impl MockTextExtractor {
    /// Always return `text` (blank text still yields `EmptyExtraction`)
    pub fn returning(text: &str) -> Self {
        Self {
            reply: Ok(text.to_string()),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Always fail as if the OCR service were unreachable
    pub fn failing(reason: &str) -> Self {
        Self {
            reply: Err(reason.to_string()),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of times `extract_text` was called
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextExtractor for MockTextExtractor {
    async fn extract_text(&self, _image_path: &Path) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.reply {
            Ok(text) if text.trim().is_empty() => Err(Error::EmptyExtraction),
            Ok(text) => Ok(text.clone()),
            Err(reason) => Err(Error::ExtractionUnavailable(reason.clone())),
        }
    }
}

/// Structured extractor that runs the real reply parser over a canned model reply
#[derive(Clone)]
pub struct MockStructuredExtractor {
    reply: String,
    calls: Arc<AtomicUsize>,
}

impl MockStructuredExtractor {
    /// Pretend the model generated `reply`
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of times `extract_structured_data` was called
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StructuredExtractor for MockStructuredExtractor {
    async fn extract_structured_data(&self, _raw_text: &str) -> Result<InvoiceExtraction> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        parse_invoice_reply(&self.reply)
    }
}
