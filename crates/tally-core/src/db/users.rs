//! User operations

use rusqlite::{params, OptionalExtension};

use super::{parse_datetime, Database};
use crate::error::{Error, Result};
use crate::models::{NewUser, User};

const USER_COLUMNS: &str = "id, username, email, password_hash, created_at";

impl Database {
    /// Create a user, rejecting a taken username or email
    pub fn create_user(&self, user: &NewUser) -> Result<i64> {
        if self.get_user_by_username(&user.username)?.is_some() {
            return Err(Error::Conflict("Username already exists.".into()));
        }
        if self.get_user_by_email(&user.email)?.is_some() {
            return Err(Error::Conflict("Email already registered.".into()));
        }

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO users (username, email, password_hash) VALUES (?, ?, ?)",
            params![user.username, user.email, user.password_hash],
        )?;

        Ok(conn.last_insert_rowid())
    }

    /// Get a user by ID
    pub fn get_user(&self, id: i64) -> Result<Option<User>> {
        self.find_user("id = ?", params![id])
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        self.find_user("username = ?", params![username])
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.find_user("email = ?", params![email])
    }

    /// List all users, oldest first
    pub fn list_users(&self) -> Result<Vec<User>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM users ORDER BY id",
            USER_COLUMNS
        ))?;

        let users = stmt
            .query_map([], |row| Self::row_to_user(row))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(users)
    }

    fn find_user(&self, predicate: &str, params: &[&dyn rusqlite::ToSql]) -> Result<Option<User>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM users WHERE {}",
            USER_COLUMNS, predicate
        ))?;

        let user = stmt
            .query_row(params, |row| Self::row_to_user(row))
            .optional()?;

        Ok(user)
    }

    fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
        let created_at_str: String = row.get(4)?;
        Ok(User {
            id: row.get(0)?,
            username: row.get(1)?,
            email: row.get(2)?,
            password_hash: row.get(3)?,
            created_at: parse_datetime(&created_at_str),
        })
    }
}
