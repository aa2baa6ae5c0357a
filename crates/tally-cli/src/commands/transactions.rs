//! Transaction command implementations

use anyhow::Result;
use chrono::Utc;
use tally_core::db::Database;

use super::{find_user, truncate};

/// Transactions per page, matching the web API
const PER_PAGE: i64 = 10;

pub fn cmd_transactions_list(db: &Database, username: &str, page: i64) -> Result<()> {
    let user = find_user(db, username)?;
    let page = db.list_transactions_page(user.id, page, PER_PAGE)?;

    if page.total == 0 {
        println!("No transactions found. Process an invoice with:");
        println!("  tally process invoice.png --user {}", user.username);
        return Ok(());
    }

    println!();
    println!(
        "📝 Transactions for {} (page {} of {}, {} total)",
        user.username, page.page, page.pages, page.total
    );
    println!("   ─────────────────────────────────────────────────────────────");

    let today = Utc::now().date_naive();
    for tx in &page.transactions {
        let date = tx
            .invoice_date
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string());
        let due = match tx.due_date {
            Some(due) if tx.is_overdue(today) => format!("\x1b[31mdue {} (overdue)\x1b[0m", due),
            Some(due) => format!("due {}", due),
            None => String::new(),
        };
        let items = tx
            .items
            .iter()
            .map(|i| i.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        println!(
            "   {:>4} │ {:<10} │ {:>10} │ {} {}",
            tx.id,
            date,
            format!("${:.2}", tx.total_amount),
            truncate(&items, 40),
            due
        );
    }

    if page.has_next {
        println!();
        println!("   Next page: tally transactions --user {} --page {}", user.username, page.page + 1);
    }

    Ok(())
}
