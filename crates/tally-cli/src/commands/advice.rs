//! Spending advice command

use anyhow::Result;
use chrono::Utc;
use tally_core::{advice::analyze_spending, db::Database};

use super::find_user;

pub fn cmd_advice(db: &Database, username: &str) -> Result<()> {
    let user = find_user(db, username)?;
    let result = analyze_spending(db, user.id, Utc::now().date_naive())?;
    let stats = result.stats;

    println!();
    println!("💡 Spending Advice for {}", user.username);
    println!("   ─────────────────────────────");
    println!("   Transactions:      {}", stats.total_transactions);
    println!("   Total spending:    ${:.2}", stats.total_spending);
    println!("   Average:           ${:.2}", stats.avg_transaction);
    println!("   This month:        ${:.2}", stats.monthly_spending);
    println!();
    println!("   {}", result.advice_text);

    Ok(())
}
