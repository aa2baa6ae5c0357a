//! HTTP request handlers organized by domain
//!
//! Each submodule contains handlers for a specific API area.

pub mod advice;
pub mod auth;
pub mod dashboard;
pub mod invoices;
pub mod transactions;

// Re-export all handlers for use in router
pub use advice::*;
pub use auth::*;
pub use dashboard::*;
pub use invoices::*;
pub use transactions::*;
