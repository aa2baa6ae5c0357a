//! Authentication-related handlers

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    expired_session_cookie, session_cookie, session_token, AppError, AppState, CurrentUser,
    SuccessResponse,
};
use tally_core::{auth, models::User};

/// Registration request body
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Login request body
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// Response for a successful login
#[derive(Serialize)]
pub struct LoginResponse {
    /// Session token, also set as the session cookie
    pub token: String,
    pub user: User,
}

/// POST /api/register - Create an account
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<User>), AppError> {
    let user = auth::register_user(&state.db, &req.username, &req.email, &req.password)?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// POST /api/login - Start a session
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = auth::authenticate(&state.db, &req.username, &req.password)?;
    let ttl = Duration::hours(state.config.session_ttl_hours);
    let token = auth::start_session(&state.db, user.id, ttl)?;

    info!(user_id = user.id, "User logged in");

    let cookie = session_cookie(&token, &state.config);
    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(LoginResponse { token, user }),
    ))
}

/// POST /api/logout - End the current session
pub async fn logout(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<impl IntoResponse, AppError> {
    if let Some(token) = session_token(request.headers()) {
        auth::end_session(&state.db, &token)?;
    }

    Ok((
        [(header::SET_COOKIE, expired_session_cookie())],
        Json(SuccessResponse { success: true }),
    ))
}

/// GET /api/me - Get the currently authenticated user
pub async fn get_me(Extension(CurrentUser(user)): Extension<CurrentUser>) -> Json<User> {
    Json(user)
}
