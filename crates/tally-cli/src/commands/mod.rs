//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `advice` - Spending statistics and advice
//! - `core` - Init and shared utilities (open_db, find_user)
//! - `process` - Run the extraction pipeline on an image
//! - `serve` - Web server command
//! - `transactions` - Per-user transaction listing
//! - `users` - User management (add, list)

pub mod advice;
pub mod core;
pub mod process;
pub mod serve;
pub mod transactions;
pub mod users;

// Re-export command functions for main.rs
pub use advice::*;
pub use core::*;
pub use process::*;
pub use serve::*;
pub use transactions::*;
pub use users::*;

/// Truncate a string to a maximum length, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
