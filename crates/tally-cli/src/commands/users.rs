//! User management commands

use anyhow::{Context, Result};
use tally_core::{auth, db::Database};

/// Environment variable read when `--password` is not given
pub const PASSWORD_ENV: &str = "TALLY_PASSWORD";

/// Read the new user's password from `TALLY_PASSWORD`
pub fn password_from_env() -> Result<String> {
    std::env::var(PASSWORD_ENV)
        .ok()
        .filter(|p| !p.is_empty())
        .with_context(|| format!("No password given. Pass --password or set {}", PASSWORD_ENV))
}

pub fn cmd_users_add(db: &Database, username: &str, email: &str, password: &str) -> Result<()> {
    let user = auth::register_user(db, username, email, password)?;
    println!("✅ Created user {} (id {})", user.username, user.id);
    Ok(())
}

pub fn cmd_users_list(db: &Database) -> Result<()> {
    let users = db.list_users()?;

    if users.is_empty() {
        println!("No users yet. Create one with:");
        println!("  tally users add <username> <email> --password <password>");
        return Ok(());
    }

    println!();
    println!("👤 Users");
    println!("   ─────────────────────────────────────────────");

    for user in users {
        println!(
            "   {:>4} │ {:<20} │ {}",
            user.id, user.username, user.email
        );
    }

    Ok(())
}
