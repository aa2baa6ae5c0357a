//! Session operations
//!
//! Only the SHA-256 digest of a session token is stored. Lookups take the
//! digest too; the raw token never reaches the database.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use super::{format_datetime, parse_datetime, Database};
use crate::error::Result;
use crate::models::Session;

impl Database {
    /// Record a new session for `user_id`
    pub fn create_session(
        &self,
        token_hash: &str,
        user_id: i64,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO sessions (token_hash, user_id, created_at, expires_at) VALUES (?, ?, ?, ?)",
            params![
                token_hash,
                user_id,
                format_datetime(&Utc::now()),
                format_datetime(&expires_at)
            ],
        )?;
        Ok(())
    }

    /// Look up a live session; expired sessions are treated as absent
    pub fn get_session(&self, token_hash: &str, now: DateTime<Utc>) -> Result<Option<Session>> {
        let conn = self.conn()?;
        let session = conn
            .query_row(
                "SELECT user_id, created_at, expires_at FROM sessions
                 WHERE token_hash = ? AND expires_at > ?",
                params![token_hash, format_datetime(&now)],
                |row| {
                    let created_at: String = row.get(1)?;
                    let expires_at: String = row.get(2)?;
                    Ok(Session {
                        user_id: row.get(0)?,
                        created_at: parse_datetime(&created_at),
                        expires_at: parse_datetime(&expires_at),
                    })
                },
            )
            .optional()?;

        Ok(session)
    }

    /// End a session, returning whether it existed
    pub fn delete_session(&self, token_hash: &str) -> Result<bool> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM sessions WHERE token_hash = ?",
            params![token_hash],
        )?;
        Ok(deleted > 0)
    }

    /// Remove sessions that expired before `now`
    pub fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn()?;
        let purged = conn.execute(
            "DELETE FROM sessions WHERE expires_at <= ?",
            params![format_datetime(&now)],
        )?;
        Ok(purged)
    }
}
