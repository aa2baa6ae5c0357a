//! Server command implementation

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tally_server::ServerConfig;

use super::open_db;

pub async fn cmd_serve(
    db_path: &Path,
    host: &str,
    port: u16,
    no_encrypt: bool,
    uploads_dir: Option<PathBuf>,
    static_dir: Option<&Path>,
    config: ServerConfig,
) -> Result<()> {
    let uploads_dir = uploads_dir.unwrap_or_else(tally_server::uploads_dir_from_env);

    println!("🚀 Starting Tally web server...");
    println!("   Database: {}", db_path.display());
    println!("   Listening: http://{}:{}", host, port);
    println!("   Uploads: {}", uploads_dir.display());
    if let Some(dir) = static_dir {
        println!("   Static files: {}", dir.display());
    }
    println!(
        "   🔒 Sessions: {}h{}",
        config.session_ttl_hours,
        if config.secure_cookies {
            ", secure cookies"
        } else {
            ""
        }
    );
    if !config.allowed_origins.is_empty() {
        println!("   🌐 CORS origins: {}", config.allowed_origins.join(", "));
    }
    if tally_core::RemoteInvoiceProcessor::from_env().is_none() {
        println!("   💡 Tip: Set RAPIDAPI_KEY and GEMINI_API_KEY to enable invoice uploads");
    }
    if no_encrypt {
        println!("   ⚠️  Encryption DISABLED (--no-encrypt)");
    }
    println!();
    println!("   Press Ctrl+C to stop");

    let db = open_db(db_path, no_encrypt)?;

    let static_dir_str = static_dir
        .map(|p| p.to_str().context("static_dir path must be valid UTF-8"))
        .transpose()?;
    tally_server::serve_with_config(db, host, port, static_dir_str, config, uploads_dir).await?;

    Ok(())
}
