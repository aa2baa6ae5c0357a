//! Domain models for Tally

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One purchased entry within an invoice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct LineItem {
    pub name: String,
    pub quantity: f64,
    pub price: f64,
    pub total: f64,
}

/// Structured data extracted from one invoice image
///
/// Produced fresh for every upload by the extraction pipeline. The
/// persistence layer copies it into a [`NewTransaction`]; it carries no
/// identity of its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct InvoiceExtraction {
    pub invoice_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    /// Line items in the order the model returned them
    pub items: Vec<LineItem>,
    /// Always finite and non-negative
    pub total_amount: f64,
    /// Verbatim OCR output, kept as an audit trail
    pub raw_text: String,
}

impl InvoiceExtraction {
    /// Attach the OCR text that produced this record
    pub fn with_raw_text(mut self, raw_text: impl Into<String>) -> Self {
        self.raw_text = raw_text.into();
        self
    }
}

/// A registered user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    /// Argon2id PHC string; never sent to clients
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// New user for registration
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

/// An authenticated login session
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// A processed invoice stored against its owner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub user_id: i64,
    pub invoice_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub total_amount: f64,
    pub items: Vec<LineItem>,
    /// Stored upload filename (timestamp-prefixed)
    pub filename: String,
    pub processed_at: DateTime<Utc>,
    pub raw_text: Option<String>,
}

impl Transaction {
    /// Whether the invoice is past its due date as of `today`
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.due_date.map(|due| due < today).unwrap_or(false)
    }
}

/// New transaction for insertion
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub user_id: i64,
    pub invoice_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub total_amount: f64,
    pub items: Vec<LineItem>,
    pub filename: String,
    pub raw_text: Option<String>,
}

impl NewTransaction {
    /// Build a row from an extraction result for `user_id`
    pub fn from_extraction(user_id: i64, filename: &str, extraction: &InvoiceExtraction) -> Self {
        Self {
            user_id,
            invoice_date: extraction.invoice_date,
            due_date: extraction.due_date,
            total_amount: extraction.total_amount,
            items: extraction.items.clone(),
            filename: filename.to_string(),
            raw_text: Some(extraction.raw_text.clone()),
        }
    }
}

/// One page of a user's transactions, newest first
#[derive(Debug, Clone, Serialize)]
pub struct TransactionPage {
    pub transactions: Vec<Transaction>,
    pub page: i64,
    pub per_page: i64,
    pub total: i64,
    pub pages: i64,
    pub has_prev: bool,
    pub has_next: bool,
}

impl TransactionPage {
    pub fn new(transactions: Vec<Transaction>, page: i64, per_page: i64, total: i64) -> Self {
        let pages = if total == 0 {
            0
        } else {
            (total + per_page - 1) / per_page
        };
        Self {
            transactions,
            page,
            per_page,
            total,
            pages,
            has_prev: page > 1,
            has_next: page < pages,
        }
    }
}

/// Dashboard summary for the landing page
#[derive(Debug, Clone, Serialize)]
pub struct DashboardSummary {
    pub recent_transactions: Vec<Transaction>,
    pub monthly_total: f64,
}
