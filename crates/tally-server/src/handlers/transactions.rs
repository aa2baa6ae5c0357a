//! Transaction handlers
//!
//! Every route is scoped to the authenticated user; another user's
//! transaction IDs behave exactly like missing ones.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::Deserialize;
use tracing::{info, warn};

use crate::{AppError, AppState, CurrentUser, SuccessResponse, TRANSACTIONS_PER_PAGE};
use tally_core::models::{Transaction, TransactionPage};

/// Query parameters for listing transactions
#[derive(Debug, Deserialize)]
pub struct TransactionQuery {
    /// 1-based page number
    #[serde(default = "default_page")]
    pub page: i64,
}

fn default_page() -> i64 {
    1
}

/// GET /api/transactions - List the user's transactions, newest first
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Query(params): Query<TransactionQuery>,
) -> Result<Json<TransactionPage>, AppError> {
    let page = state
        .db
        .list_transactions_page(user.id, params.page, TRANSACTIONS_PER_PAGE)?;
    Ok(Json(page))
}

/// GET /api/transactions/:id - Get a single transaction
pub async fn get_transaction(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<Json<Transaction>, AppError> {
    let tx = state
        .db
        .get_transaction(user.id, id)?
        .ok_or_else(|| AppError::not_found("Transaction not found"))?;
    Ok(Json(tx))
}

/// DELETE /api/transactions/:id - Delete a transaction and its stored image
pub async fn delete_transaction(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<Json<SuccessResponse>, AppError> {
    let tx = state
        .db
        .get_transaction(user.id, id)?
        .ok_or_else(|| AppError::not_found("Transaction not found"))?;

    if !state.db.delete_transaction(user.id, id)? {
        return Err(AppError::not_found("Transaction not found"));
    }

    // Only remove the image if it really lives inside the uploads directory
    let image_path = state.uploads_dir.join(&tx.filename);
    if let (Ok(path), Ok(uploads_dir)) = (
        std::fs::canonicalize(&image_path),
        std::fs::canonicalize(&state.uploads_dir),
    ) {
        if path.starts_with(&uploads_dir) {
            if let Err(e) = std::fs::remove_file(&path) {
                warn!(path = %path.display(), error = %e, "Failed to remove invoice image");
            }
        }
    }

    info!(user_id = user.id, transaction_id = id, "Transaction deleted");

    Ok(Json(SuccessResponse { success: true }))
}
