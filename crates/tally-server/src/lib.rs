//! Tally Web Server
//!
//! Axum-based REST API for the Tally invoice-driven spending tracker.
//!
//! Security features:
//! - Session authentication (Argon2id passwords, hashed session tokens)
//! - Restrictive CORS policy
//! - Upload validation (extension allow-list, sanitized names, size limit)
//! - Per-user data isolation on every transaction route
//! - Sanitized error responses

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Request, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::{
    cors::CorsLayer, services::ServeDir, set_header::SetResponseHeaderLayer, trace::TraceLayer,
};
use tracing::{error, info, warn};

use tally_core::db::Database;
use tally_core::models::User;
use tally_core::RemoteInvoiceProcessor;

mod handlers;

pub use handlers::{allowed_file, sanitize_filename, save_upload};

/// Maximum invoice upload size (10 MB)
pub const MAX_UPLOAD_SIZE: usize = 10 * 1024 * 1024;

/// Transactions shown per page
pub const TRANSACTIONS_PER_PAGE: i64 = 10;

/// Cookie carrying the session token
pub const SESSION_COOKIE: &str = "tally_session";

/// Environment variable overriding the uploads directory
pub const UPLOADS_DIR_ENV: &str = "TALLY_UPLOADS_DIR";

/// Uploads directory when nothing else is configured
pub const DEFAULT_UPLOADS_DIR: &str = "static/uploads";

/// Server configuration
#[derive(Clone)]
pub struct ServerConfig {
    /// Allowed CORS origins (empty = same-origin only)
    pub allowed_origins: Vec<String>,
    /// How long a login session stays valid
    pub session_ttl_hours: i64,
    /// Mark the session cookie `Secure` (set when served over HTTPS)
    pub secure_cookies: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![],
            session_ttl_hours: 24,
            secure_cookies: false,
        }
    }
}

/// Shared application state
pub struct AppState {
    pub db: Database,
    pub config: ServerConfig,
    /// Remote extraction pipeline; None when API keys are not configured
    pub processor: Option<RemoteInvoiceProcessor>,
    /// Where uploaded invoice images are stored
    pub uploads_dir: PathBuf,
}

/// The user a request was authenticated as, inserted by `auth_middleware`
#[derive(Clone)]
pub struct CurrentUser(pub User);

/// Pull the session token from the cookie or an `Authorization: Bearer` header
pub(crate) fn session_token(headers: &HeaderMap) -> Option<String> {
    let from_cookie = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().strip_prefix(SESSION_COOKIE)?.strip_prefix('='))
        .find(|token| !token.is_empty())
        .map(|token| token.to_string());

    from_cookie.or_else(|| {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|auth| auth.strip_prefix("Bearer "))
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty())
    })
}

/// Authentication middleware - resolves the session token to a user
///
/// Requests without a live session are rejected with 401 before reaching a
/// handler. On success the user is available to handlers as
/// `Extension<CurrentUser>`.
async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let user = match session_token(request.headers()) {
        Some(token) => match tally_core::auth::session_user(&state.db, &token) {
            Ok(user) => user,
            Err(e) => {
                error!(error = %e, "Session lookup failed");
                return AppError::internal("An internal error occurred").into_response();
            }
        },
        None => None,
    };

    let Some(user) = user else {
        warn!(path = %request.uri().path(), "Unauthorized request - no valid session");
        return AppError::unauthorized("Authentication required").into_response();
    };

    request.extensions_mut().insert(CurrentUser(user));
    next.run(request).await
}

/// Build the `Set-Cookie` value for a new session
pub(crate) fn session_cookie(token: &str, config: &ServerConfig) -> String {
    let mut cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE,
        token,
        config.session_ttl_hours * 3600
    );
    if config.secure_cookies {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Build the `Set-Cookie` value that clears the session cookie
pub(crate) fn expired_session_cookie() -> String {
    format!(
        "{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0",
        SESSION_COOKIE
    )
}

/// Success response
#[derive(Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Uploads directory from `TALLY_UPLOADS_DIR`, or the default
pub fn uploads_dir_from_env() -> PathBuf {
    std::env::var(UPLOADS_DIR_ENV)
        .ok()
        .filter(|d| !d.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_UPLOADS_DIR))
}

/// Create the application router
///
/// The extraction pipeline is configured from the environment.
pub fn create_router(
    db: Database,
    static_dir: Option<&str>,
    config: ServerConfig,
    uploads_dir: PathBuf,
) -> Router {
    let processor = RemoteInvoiceProcessor::from_env();
    match processor {
        Some(ref p) => info!(
            ocr = %p.text_extractor().url(),
            gemini = %p.structured_extractor().endpoint(),
            "Invoice extraction configured"
        ),
        None => info!(
            "Invoice extraction not configured (set RAPIDAPI_KEY and GEMINI_API_KEY to enable uploads)"
        ),
    }

    create_router_with_options(db, static_dir, config, processor, uploads_dir)
}

/// Create the application router with an explicit pipeline (for testing)
pub fn create_router_with_options(
    db: Database,
    static_dir: Option<&str>,
    config: ServerConfig,
    processor: Option<RemoteInvoiceProcessor>,
    uploads_dir: PathBuf,
) -> Router {
    let state = Arc::new(AppState {
        db,
        config: config.clone(),
        processor,
        uploads_dir,
    });

    let public_routes = Router::new()
        .route("/register", post(handlers::register))
        .route("/login", post(handlers::login));

    let protected_routes = Router::new()
        // Auth
        .route("/logout", post(handlers::logout))
        .route("/me", get(handlers::get_me))
        // Dashboard
        .route("/dashboard", get(handlers::get_dashboard))
        // Invoices
        .route(
            "/invoices",
            post(handlers::upload_invoice)
                // Multipart framing adds a little on top of the file itself
                .layer(DefaultBodyLimit::max(MAX_UPLOAD_SIZE + 64 * 1024)),
        )
        // Transactions
        .route("/transactions", get(handlers::list_transactions))
        .route(
            "/transactions/:id",
            get(handlers::get_transaction).delete(handlers::delete_transaction),
        )
        // Advice
        .route("/advice", get(handlers::get_advice))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    // Build CORS layer
    let cors = if config.allowed_origins.is_empty() {
        // Restrictive default: only allow same-origin
        CorsLayer::new()
            .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
    } else {
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
            .allow_credentials(true)
    };

    // CSP: same-origin scripts, inline styles, uploaded images from self
    let csp_value = HeaderValue::from_static(
        "default-src 'self'; script-src 'self'; style-src 'self' 'unsafe-inline'; img-src 'self' blob: data:; font-src 'self'; connect-src 'self'; frame-ancestors 'none'"
    );

    let mut app = Router::new()
        .nest("/api", public_routes.merge(protected_routes))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        // Security headers
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_XSS_PROTECTION,
            HeaderValue::from_static("1; mode=block"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::CONTENT_SECURITY_POLICY,
            csp_value,
        ));

    // Serve a bundled frontend if a directory was provided
    if let Some(dir) = static_dir {
        app = app.fallback_service(ServeDir::new(dir));
    }

    app
}

/// Start the server
pub async fn serve(
    db: Database,
    host: &str,
    port: u16,
    static_dir: Option<&str>,
) -> anyhow::Result<()> {
    serve_with_config(
        db,
        host,
        port,
        static_dir,
        ServerConfig::default(),
        uploads_dir_from_env(),
    )
    .await
}

/// Start the server with custom configuration
pub async fn serve_with_config(
    db: Database,
    host: &str,
    port: u16,
    static_dir: Option<&str>,
    config: ServerConfig,
    uploads_dir: PathBuf,
) -> anyhow::Result<()> {
    match db.purge_expired_sessions(chrono::Utc::now()) {
        Ok(count) if count > 0 => info!("Purged {} expired session(s)", count),
        Ok(_) => {}
        Err(e) => warn!("Failed to purge expired sessions: {}", e),
    }

    std::fs::create_dir_all(&uploads_dir)?;
    info!(dir = %uploads_dir.display(), "Storing uploads");

    let app = create_router(db, static_dir, config, uploads_dir);
    let addr = format!("{}:{}", host, port);

    info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// Error Handling
// ============================================================================

/// Application error type with proper HTTP status codes
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
    internal: Option<anyhow::Error>,
}

impl AppError {
    fn with_status(status: StatusCode, msg: &str) -> Self {
        Self {
            status,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn bad_request(msg: &str) -> Self {
        Self::with_status(StatusCode::BAD_REQUEST, msg)
    }

    pub fn unauthorized(msg: &str) -> Self {
        Self::with_status(StatusCode::UNAUTHORIZED, msg)
    }

    pub fn not_found(msg: &str) -> Self {
        Self::with_status(StatusCode::NOT_FOUND, msg)
    }

    pub fn conflict(msg: &str) -> Self {
        Self::with_status(StatusCode::CONFLICT, msg)
    }

    pub fn internal(msg: &str) -> Self {
        Self::with_status(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    pub fn service_unavailable(msg: &str) -> Self {
        Self::with_status(StatusCode::SERVICE_UNAVAILABLE, msg)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log the full internal error if present
        if let Some(err) = &self.internal {
            if self.status.is_server_error() {
                error!(error = %err, status = %self.status, "Request failed");
            } else {
                warn!(error = %err, status = %self.status, "Request rejected");
            }
        }

        let body = Json(serde_json::json!({
            "error": self.message
        }));

        (self.status, body).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        use tally_core::Error as CoreError;

        let err = err.into();
        let (status, message) = match err.downcast_ref::<CoreError>() {
            Some(CoreError::InvalidData(msg)) => (StatusCode::BAD_REQUEST, msg.clone()),
            Some(CoreError::Unauthorized(msg)) => (StatusCode::UNAUTHORIZED, msg.clone()),
            Some(CoreError::NotFound(msg)) => (StatusCode::NOT_FOUND, msg.clone()),
            Some(CoreError::Conflict(msg)) => (StatusCode::CONFLICT, msg.clone()),
            // Upstream OCR / model failure; the detail stays in the log
            Some(CoreError::InvoiceProcessingFailed { .. }) => (
                StatusCode::BAD_GATEWAY,
                "Failed to process invoice. Please try again.".to_string(),
            ),
            // Return generic message to client
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "An internal error occurred".to_string(),
            ),
        };

        Self {
            status,
            message,
            // Keep full error for logging
            internal: Some(err),
        }
    }
}

#[cfg(test)]
mod tests;
