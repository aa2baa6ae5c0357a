//! Invoice upload handler

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{AppError, AppState, CurrentUser, MAX_UPLOAD_SIZE};
use tally_core::models::{NewTransaction, Transaction};

/// Image extensions accepted for upload (compared case-insensitively)
pub const ALLOWED_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "gif", "bmp"];

/// Multipart field carrying the invoice image
const FILE_FIELD: &str = "file";

/// Whether `filename` has an allowed image extension
pub fn allowed_file(filename: &str) -> bool {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ALLOWED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Reduce a client-supplied filename to a safe basename
///
/// Directory components are dropped and only ASCII letters, digits, `-` and
/// `_` survive in the stem; whitespace becomes `_`. The extension is kept.
pub fn sanitize_filename(filename: &str) -> String {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    let (stem, ext) = match base.rsplit_once('.') {
        Some((stem, ext)) => (stem, Some(ext)),
        None => (base, None),
    };

    let stem: String = stem
        .chars()
        .filter_map(|c| match c {
            c if c.is_ascii_alphanumeric() || c == '-' || c == '_' => Some(c),
            c if c.is_whitespace() => Some('_'),
            _ => None,
        })
        .collect();
    let stem = stem.trim_matches('_');
    let stem = if stem.is_empty() { "invoice" } else { stem };

    let ext: Option<String> = ext
        .map(|e| e.chars().filter(|c| c.is_ascii_alphanumeric()).collect())
        .filter(|e: &String| !e.is_empty());

    match ext {
        Some(ext) => format!("{}.{}", stem, ext),
        None => stem.to_string(),
    }
}

/// Fresh on-disk name: `<YYYYmmdd_HHMMSS>_<8 hex>_<sanitized name>`
pub fn stored_filename(original_name: &str) -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!(
        "{}_{}_{}",
        Utc::now().format("%Y%m%d_%H%M%S"),
        &id[..8],
        sanitize_filename(original_name)
    )
}

/// Attempts at finding an unused name before giving up
const MAX_NAME_ATTEMPTS: usize = 5;

/// Write `bytes` into `dir` under a new unique name and return that name
///
/// Files are opened with `create_new`, so an existing upload is never
/// overwritten.
pub fn save_upload(dir: &Path, original_name: &str, bytes: &[u8]) -> std::io::Result<String> {
    std::fs::create_dir_all(dir)?;

    for _ in 0..MAX_NAME_ATTEMPTS {
        let filename = stored_filename(original_name);
        let path = dir.join(&filename);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                if let Err(e) = file.write_all(bytes) {
                    drop(file);
                    let _ = std::fs::remove_file(&path);
                    return Err(e);
                }
                return Ok(filename);
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }

    Err(std::io::Error::new(
        ErrorKind::AlreadyExists,
        "could not find an unused upload name",
    ))
}

/// Removes a saved upload when dropped, unless `keep` was called
struct UploadGuard {
    path: Option<PathBuf>,
}

impl UploadGuard {
    fn new(path: PathBuf) -> Self {
        Self { path: Some(path) }
    }

    fn path(&self) -> &Path {
        self.path.as_deref().unwrap_or(Path::new(""))
    }

    fn keep(mut self) {
        self.path = None;
    }
}

impl Drop for UploadGuard {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            if let Err(e) = std::fs::remove_file(&path) {
                warn!(path = %path.display(), error = %e, "Failed to remove upload");
            }
        }
    }
}

/// POST /api/invoices - Upload an invoice image, extract it and store the result
pub async fn upload_invoice(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<Transaction>), AppError> {
    let Some(processor) = state.processor.as_ref() else {
        return Err(AppError::service_unavailable(
            "Invoice processing is not configured",
        ));
    };

    let mut upload: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::bad_request(&format!("Failed to read form field: {}", e)))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let filename = field.file_name().unwrap_or("").to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|_| AppError::bad_request("Failed to read file data"))?;

        if bytes.len() > MAX_UPLOAD_SIZE {
            return Err(AppError::bad_request(&format!(
                "File too large. Maximum size is {} MB",
                MAX_UPLOAD_SIZE / 1024 / 1024
            )));
        }

        upload = Some((filename, bytes.to_vec()));
    }

    let Some((original_name, bytes)) = upload.filter(|(name, _)| !name.is_empty()) else {
        return Err(AppError::bad_request("No file selected."));
    };

    if !allowed_file(&original_name) {
        return Err(AppError::bad_request(
            "Invalid file type. Please upload an image file.",
        ));
    }

    let filename = save_upload(&state.uploads_dir, &original_name, &bytes)
        .map_err(|e| AppError::internal(&format!("Failed to save upload: {}", e)))?;
    let guard = UploadGuard::new(state.uploads_dir.join(&filename));

    let extraction = processor.process_invoice(guard.path()).await?;

    let id = state
        .db
        .insert_transaction(&NewTransaction::from_extraction(user.id, &filename, &extraction))?;
    let transaction = state
        .db
        .get_transaction(user.id, id)?
        .ok_or_else(|| AppError::internal("Transaction not found after creation"))?;

    guard.keep();

    info!(
        user_id = user.id,
        transaction_id = id,
        total = transaction.total_amount,
        "Invoice stored"
    );

    Ok((StatusCode::CREATED, Json(transaction)))
}
