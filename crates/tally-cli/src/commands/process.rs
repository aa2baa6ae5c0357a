//! Invoice processing command

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tally_core::{
    db::Database,
    extraction::{InvoiceProcessor, StructuredExtractor, TextExtractor},
    models::{InvoiceExtraction, NewTransaction, User},
    RemoteInvoiceProcessor,
};
use tracing::{info, warn};

use super::{find_user, open_db};

pub async fn cmd_process(
    db_path: &Path,
    image: &Path,
    username: Option<&str>,
    no_encrypt: bool,
    uploads_dir: Option<PathBuf>,
) -> Result<()> {
    // Resolve the user before spending any API calls
    let target = match username {
        Some(name) => {
            let db = open_db(db_path, no_encrypt)?;
            let user = find_user(&db, name)?;
            Some((db, user))
        }
        None => None,
    };

    let processor = RemoteInvoiceProcessor::from_env()
        .context("Invoice extraction is not configured. Set RAPIDAPI_KEY and GEMINI_API_KEY.")?;

    let uploads_dir = uploads_dir.unwrap_or_else(tally_server::uploads_dir_from_env);
    let store = target.as_ref().map(|(db, user)| StoreTarget {
        db,
        user,
        uploads_dir: &uploads_dir,
    });

    let (extraction, stored_id) = process_image(&processor, image, store).await?;

    println!("{}", serde_json::to_string_pretty(&extraction)?);

    if let (Some(id), Some((_, user))) = (stored_id, target.as_ref()) {
        eprintln!("✅ Stored as transaction {} for {}", id, user.username);
    }

    Ok(())
}

/// Where a processed invoice is recorded
pub struct StoreTarget<'a> {
    pub db: &'a Database,
    pub user: &'a User,
    /// Uploads directory shared with the web server
    pub uploads_dir: &'a Path,
}

/// Run the pipeline on `image`, optionally storing the result for a user
///
/// When storing, the image is copied into the uploads directory under a
/// unique name, the same way web uploads are saved. Returns the extraction
/// and, when stored, the new transaction ID.
pub async fn process_image<T, S>(
    processor: &InvoiceProcessor<T, S>,
    image: &Path,
    target: Option<StoreTarget<'_>>,
) -> Result<(InvoiceExtraction, Option<i64>)>
where
    T: TextExtractor,
    S: StructuredExtractor,
{
    if !image.is_file() {
        anyhow::bail!("Image not found: {}", image.display());
    }

    info!(path = %image.display(), store = target.is_some(), "Processing invoice");
    let extraction = processor.process_invoice(image).await?;

    let stored_id = match target {
        Some(target) => Some(store_invoice(&target, image, &extraction)?),
        None => None,
    };

    Ok((extraction, stored_id))
}

fn store_invoice(
    target: &StoreTarget<'_>,
    image: &Path,
    extraction: &InvoiceExtraction,
) -> Result<i64> {
    let original_name = image
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let bytes = std::fs::read(image)
        .with_context(|| format!("Failed to read image: {}", image.display()))?;
    let filename = tally_server::save_upload(target.uploads_dir, &original_name, &bytes)
        .with_context(|| {
            format!(
                "Failed to copy image into {}",
                target.uploads_dir.display()
            )
        })?;

    let tx = NewTransaction::from_extraction(target.user.id, &filename, extraction);
    match target.db.insert_transaction(&tx) {
        Ok(id) => Ok(id),
        Err(e) => {
            let path = target.uploads_dir.join(&filename);
            if let Err(remove_err) = std::fs::remove_file(&path) {
                warn!(path = %path.display(), error = %remove_err, "Failed to remove copied image");
            }
            Err(e.into())
        }
    }
}
