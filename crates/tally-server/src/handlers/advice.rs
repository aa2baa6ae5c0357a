//! Spending advice handler

use std::sync::Arc;

use axum::{extract::State, Extension, Json};
use chrono::Utc;

use crate::{AppError, AppState, CurrentUser};
use tally_core::advice::{analyze_spending, SpendingAdvice};

/// GET /api/advice - Spending statistics with rule-based advice
pub async fn get_advice(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<Json<SpendingAdvice>, AppError> {
    let advice = analyze_spending(&state.db, user.id, Utc::now().date_naive())?;
    Ok(Json(advice))
}
