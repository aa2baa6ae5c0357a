//! Tally Core Library
//!
//! Shared functionality for the Tally invoice-driven spending tracker:
//! - Invoice extraction pipeline (remote OCR followed by a generative model)
//! - Database access and migrations
//! - Accounts and login sessions
//! - Rule-based spending advice

pub mod advice;
pub mod auth;
pub mod db;
pub mod error;
pub mod extraction;
pub mod models;

/// Test utilities including a mock OCR / generateContent server
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use advice::{analyze_spending, generate_spending_advice, SpendingAdvice, SpendingStats};
pub use db::Database;
pub use error::{Error, Result};
pub use extraction::{
    GeminiClient, InvoiceProcessor, OcrClient, RemoteInvoiceProcessor, StructuredExtractor,
    TextExtractor,
};
pub use models::{InvoiceExtraction, LineItem, Transaction, TransactionPage, User};
