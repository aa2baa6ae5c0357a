//! Transaction operations
//!
//! Every query is scoped to one user; a transaction is never visible to
//! anyone but its owner.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rusqlite::{params, OptionalExtension};

use super::{format_datetime, parse_datetime, Database};
use crate::error::Result;
use crate::models::{DashboardSummary, LineItem, NewTransaction, Transaction, TransactionPage};

/// Columns selected for every transaction query, in `row_to_transaction` order
const TRANSACTION_COLUMNS: &str = "id, user_id, invoice_date, due_date, total_amount, items_json,
     filename, processed_at, raw_text";

impl Database {
    /// Insert a processed invoice, stamped with the current time
    pub fn insert_transaction(&self, tx: &NewTransaction) -> Result<i64> {
        self.insert_transaction_at(tx, Utc::now())
    }

    /// Insert a processed invoice with an explicit processing timestamp
    pub fn insert_transaction_at(
        &self,
        tx: &NewTransaction,
        processed_at: DateTime<Utc>,
    ) -> Result<i64> {
        let conn = self.conn()?;
        let items_json = serde_json::to_string(&tx.items)?;

        conn.execute(
            r#"
            INSERT INTO transactions (user_id, invoice_date, due_date, total_amount, items_json, filename, processed_at, raw_text)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                tx.user_id,
                tx.invoice_date.map(|d| d.to_string()),
                tx.due_date.map(|d| d.to_string()),
                tx.total_amount,
                items_json,
                tx.filename,
                format_datetime(&processed_at),
                tx.raw_text,
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    /// Get one of a user's transactions
    pub fn get_transaction(&self, user_id: i64, id: i64) -> Result<Option<Transaction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM transactions WHERE id = ? AND user_id = ?",
            TRANSACTION_COLUMNS
        ))?;

        let tx = stmt
            .query_row(params![id, user_id], |row| Self::row_to_transaction(row))
            .optional()?;

        Ok(tx)
    }

    /// Delete one of a user's transactions, returning whether a row was removed
    pub fn delete_transaction(&self, user_id: i64, id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM transactions WHERE id = ? AND user_id = ?",
            params![id, user_id],
        )?;
        Ok(deleted > 0)
    }

    /// Most recently processed transactions for a user
    pub fn recent_transactions(&self, user_id: i64, limit: i64) -> Result<Vec<Transaction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM transactions WHERE user_id = ?
             ORDER BY processed_at DESC, id DESC LIMIT ?",
            TRANSACTION_COLUMNS
        ))?;

        let transactions = stmt
            .query_map(params![user_id, limit], |row| Self::row_to_transaction(row))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(transactions)
    }

    /// All transactions for a user, newest first
    pub fn list_all_transactions(&self, user_id: i64) -> Result<Vec<Transaction>> {
        self.recent_transactions(user_id, -1)
    }

    /// One page of a user's transactions, newest first
    ///
    /// Pages are 1-based. A page past the end is returned empty rather than
    /// treated as an error.
    pub fn list_transactions_page(
        &self,
        user_id: i64,
        page: i64,
        per_page: i64,
    ) -> Result<TransactionPage> {
        let page = page.max(1);
        let per_page = per_page.max(1);
        let offset = (page - 1).saturating_mul(per_page);

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM transactions WHERE user_id = ?
             ORDER BY processed_at DESC, id DESC LIMIT ? OFFSET ?",
            TRANSACTION_COLUMNS
        ))?;

        let transactions = stmt
            .query_map(params![user_id, per_page, offset], |row| {
                Self::row_to_transaction(row)
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let total = self.count_transactions(user_id)?;

        Ok(TransactionPage::new(transactions, page, per_page, total))
    }

    /// Count a user's transactions
    pub fn count_transactions(&self, user_id: i64) -> Result<i64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM transactions WHERE user_id = ?",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Sum of totals processed on or after `since`
    pub fn spending_since(&self, user_id: i64, since: NaiveDate) -> Result<f64> {
        let conn = self.conn()?;
        let since = since.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc();
        let total: Option<f64> = conn.query_row(
            "SELECT SUM(total_amount) FROM transactions WHERE user_id = ? AND processed_at >= ?",
            params![user_id, format_datetime(&since)],
            |row| row.get(0),
        )?;
        Ok(total.unwrap_or(0.0))
    }

    /// Recent invoices plus this month's spending
    pub fn dashboard_summary(&self, user_id: i64, today: NaiveDate) -> Result<DashboardSummary> {
        let month_start = today.with_day(1).unwrap_or(today);
        Ok(DashboardSummary {
            recent_transactions: self.recent_transactions(user_id, 5)?,
            monthly_total: self.spending_since(user_id, month_start)?,
        })
    }

    pub(crate) fn row_to_transaction(row: &rusqlite::Row) -> rusqlite::Result<Transaction> {
        let invoice_date_str: Option<String> = row.get(2)?;
        let due_date_str: Option<String> = row.get(3)?;
        let items_json: Option<String> = row.get(5)?;
        let processed_at_str: String = row.get(7)?;
        Ok(Transaction {
            id: row.get(0)?,
            user_id: row.get(1)?,
            invoice_date: invoice_date_str.and_then(|s| parse_date(&s)),
            due_date: due_date_str.and_then(|s| parse_date(&s)),
            total_amount: row.get(4)?,
            items: parse_items_json(items_json.as_deref()),
            filename: row.get(6)?,
            processed_at: parse_datetime(&processed_at_str),
            raw_text: row.get(8)?,
        })
    }
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

/// Stored line items; unreadable JSON shows as no items
fn parse_items_json(json: Option<&str>) -> Vec<LineItem> {
    json.and_then(|s| serde_json::from_str(s).ok())
        .unwrap_or_default()
}
