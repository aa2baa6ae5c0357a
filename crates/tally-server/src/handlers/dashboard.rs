//! Dashboard handler

use std::sync::Arc;

use axum::{extract::State, Extension, Json};
use chrono::Utc;

use crate::{AppError, AppState, CurrentUser};
use tally_core::models::DashboardSummary;

/// GET /api/dashboard - Recent invoices and this month's spending
pub async fn get_dashboard(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<Json<DashboardSummary>, AppError> {
    let today = Utc::now().date_naive();
    let summary = state.db.dashboard_summary(user.id, today)?;
    Ok(Json(summary))
}
