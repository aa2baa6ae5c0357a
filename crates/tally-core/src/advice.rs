//! Rule-based spending advice
//!
//! Summarizes a user's stored transactions and turns the numbers into a
//! few plain-language suggestions. No model is involved.

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use crate::db::Database;
use crate::error::Result;

/// Shown when a user has nothing to analyze yet
pub const NO_DATA_ADVICE: &str =
    "No transaction data available yet. Upload some invoices to get personalized advice!";

const HIGH_AVERAGE_ADVICE: &str =
    "Your average transaction amount is quite high. Consider reviewing if all expenses are necessary.";
const HIGH_MONTHLY_ADVICE: &str =
    "Your monthly spending is significant. Consider creating a budget to track your expenses better.";
const MANY_TRANSACTIONS_ADVICE: &str =
    "You have many transactions. Consider consolidating purchases to reduce fees and better track spending.";
const MONTH_HEAVY_ADVICE: &str =
    "A large portion of your spending happened this month. Monitor your expenses closely.";
const GENERIC_ADVICE: [&str; 2] = [
    "Keep track of your expenses regularly to maintain good financial health.",
    "Consider setting monthly spending limits for different categories.",
];

/// Spending statistics for one user
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct SpendingStats {
    pub total_spending: f64,
    pub avg_transaction: f64,
    pub total_transactions: i64,
    /// Spending processed since the first of the current month
    pub monthly_spending: f64,
}

/// Statistics plus the advice derived from them
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpendingAdvice {
    #[serde(flatten)]
    pub stats: SpendingStats,
    pub advice_text: String,
}

/// Turn statistics into advice text
///
/// Each rule that fires contributes one sentence, in a fixed order. When none
/// fire, two generic tips are given instead.
pub fn generate_spending_advice(stats: &SpendingStats) -> String {
    let mut points = Vec::new();

    if stats.avg_transaction > 100.0 {
        points.push(HIGH_AVERAGE_ADVICE);
    }
    if stats.monthly_spending > 1000.0 {
        points.push(HIGH_MONTHLY_ADVICE);
    }
    if stats.total_transactions > 20 {
        points.push(MANY_TRANSACTIONS_ADVICE);
    }
    if stats.monthly_spending > stats.total_spending * 0.5 {
        points.push(MONTH_HEAVY_ADVICE);
    }

    if points.is_empty() {
        points.extend(GENERIC_ADVICE);
    }

    points.join(" ")
}

/// Compute statistics and advice for `user_id` as of `today`
pub fn analyze_spending(db: &Database, user_id: i64, today: NaiveDate) -> Result<SpendingAdvice> {
    let transactions = db.list_all_transactions(user_id)?;

    if transactions.is_empty() {
        return Ok(SpendingAdvice {
            stats: SpendingStats::default(),
            advice_text: NO_DATA_ADVICE.to_string(),
        });
    }

    let month_start = today.with_day(1).unwrap_or(today);
    let total_spending: f64 = transactions.iter().map(|t| t.total_amount).sum();
    let monthly_spending: f64 = transactions
        .iter()
        .filter(|t| t.processed_at.date_naive() >= month_start)
        .map(|t| t.total_amount)
        .sum();

    let stats = SpendingStats {
        total_spending,
        avg_transaction: total_spending / transactions.len() as f64,
        total_transactions: transactions.len() as i64,
        monthly_spending,
    };

    Ok(SpendingAdvice {
        advice_text: generate_spending_advice(&stats),
        stats,
    })
}
