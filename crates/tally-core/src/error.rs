//! Error types for Tally

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// OCR service could not be reached or answered with a non-success status
    #[error("OCR service unavailable: {0}")]
    ExtractionUnavailable(String),

    /// OCR answered, but the resolved text was blank
    #[error("No text extracted from image")]
    EmptyExtraction,

    /// Generative-language service could not be reached, failed, or produced nothing
    #[error("AI service unavailable: {0}")]
    GenerationUnavailable(String),

    /// A reply decoded as JSON but did not have the expected shape
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Caller-facing wrapper for any failure inside the extraction pipeline
    #[error("Failed to process invoice: {message}")]
    InvoiceProcessingFailed {
        message: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),
}

impl Error {
    /// Wrap a pipeline failure into `InvoiceProcessingFailed`.
    ///
    /// Already-wrapped errors are returned unchanged.
    pub fn processing_failed(source: Error) -> Self {
        match source {
            already @ Error::InvoiceProcessingFailed { .. } => already,
            other => Error::InvoiceProcessingFailed {
                message: other.to_string(),
                source: Box::new(other),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
