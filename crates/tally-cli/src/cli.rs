//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Tally - Turn invoice photos into a spending history
#[derive(Parser)]
#[command(name = "tally")]
#[command(about = "Invoice-driven personal spending tracker", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path
    #[arg(long, default_value = "tally.db", global = true)]
    pub db: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable database encryption (not recommended for production)
    ///
    /// By default, the database is encrypted using SQLCipher.
    /// Set TALLY_DB_KEY environment variable with your passphrase.
    /// Use --no-encrypt only for development or testing.
    #[arg(long, global = true)]
    pub no_encrypt: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database
    Init,

    /// Start the web server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Directory for uploaded invoice images
        ///
        /// Defaults to TALLY_UPLOADS_DIR, then static/uploads.
        #[arg(long)]
        uploads_dir: Option<PathBuf>,

        /// Directory containing static files to serve (e.g., ui/dist)
        #[arg(long)]
        static_dir: Option<PathBuf>,

        /// Allowed CORS origin (repeatable)
        #[arg(long = "allow-origin")]
        allowed_origins: Vec<String>,

        /// Hours a login session stays valid
        #[arg(long, default_value = "24")]
        session_ttl_hours: i64,

        /// Mark the session cookie Secure (use when served over HTTPS)
        #[arg(long)]
        secure_cookies: bool,
    },

    /// Extract an invoice image and print the result as JSON
    ///
    /// Requires RAPIDAPI_KEY and GEMINI_API_KEY.
    Process {
        /// Invoice image to process
        image: PathBuf,

        /// Store the result as a transaction for this user
        #[arg(short, long)]
        user: Option<String>,

        /// Uploads directory the stored image is copied into
        ///
        /// Defaults to TALLY_UPLOADS_DIR, then static/uploads.
        #[arg(long)]
        uploads_dir: Option<PathBuf>,
    },

    /// Manage users
    Users {
        #[command(subcommand)]
        action: UsersAction,
    },

    /// List a user's transactions, newest first
    Transactions {
        /// Username
        #[arg(short, long)]
        user: String,

        /// Page number (10 per page)
        #[arg(long, default_value = "1")]
        page: i64,
    },

    /// Show spending statistics and advice for a user
    Advice {
        /// Username
        #[arg(short, long)]
        user: String,
    },
}

#[derive(Subcommand)]
pub enum UsersAction {
    /// Create a user
    Add {
        /// Username (must be unique)
        username: String,

        /// Email address (must be unique)
        email: String,

        /// Password (falls back to TALLY_PASSWORD)
        #[arg(long)]
        password: Option<String>,
    },

    /// List users
    List,
}
