//! Accounts and login sessions
//!
//! Passwords are stored as Argon2id PHC strings. Session tokens are random,
//! handed to the client once, and stored only as a SHA-256 digest.

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{Duration, Utc};
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::{NewUser, User};

/// Message returned for any failed login, whichever part was wrong
pub const INVALID_CREDENTIALS: &str = "Invalid username or password.";

/// Hash a password with Argon2id and a fresh random salt
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::encode_b64(Uuid::new_v4().as_bytes())
        .map_err(|e| Error::Encryption(format!("Failed to create salt: {}", e)))?;

    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| Error::Encryption(format!("Failed to hash password: {}", e)))?;

    Ok(hash.to_string())
}

/// Check `password` against a stored PHC string
///
/// An unparseable stored hash never verifies.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// Generate a new opaque session token (256 random bits, hex)
pub fn generate_session_token() -> String {
    format!(
        "{}{}",
        Uuid::new_v4().simple(),
        Uuid::new_v4().simple()
    )
}

/// Digest stored in place of a session token
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Register a new user
pub fn register_user(db: &Database, username: &str, email: &str, password: &str) -> Result<User> {
    let username = username.trim();
    let email = email.trim();

    if username.is_empty() || email.is_empty() || password.is_empty() {
        return Err(Error::InvalidData(
            "Username, email and password are required.".into(),
        ));
    }

    let id = db.create_user(&NewUser {
        username: username.to_string(),
        email: email.to_string(),
        password_hash: hash_password(password)?,
    })?;

    info!(user_id = id, username, "User registered");

    db.get_user(id)?
        .ok_or_else(|| Error::NotFound(format!("User {}", id)))
}

/// Check a username and password
pub fn authenticate(db: &Database, username: &str, password: &str) -> Result<User> {
    match db.get_user_by_username(username.trim())? {
        Some(user) if verify_password(password, &user.password_hash) => Ok(user),
        _ => {
            warn!(username, "Failed login attempt");
            Err(Error::Unauthorized(INVALID_CREDENTIALS.into()))
        }
    }
}

/// Start a session for `user_id`, returning the raw token
pub fn start_session(db: &Database, user_id: i64, ttl: Duration) -> Result<String> {
    let token = generate_session_token();
    db.create_session(&hash_token(&token), user_id, Utc::now() + ttl)?;
    Ok(token)
}

/// Resolve a raw session token to its user, if the session is still live
pub fn session_user(db: &Database, token: &str) -> Result<Option<User>> {
    let Some(session) = db.get_session(&hash_token(token), Utc::now())? else {
        return Ok(None);
    };
    db.get_user(session.user_id)
}

/// End the session for a raw token
pub fn end_session(db: &Database, token: &str) -> Result<bool> {
    db.delete_session(&hash_token(token))
}
