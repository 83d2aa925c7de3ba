#![forbid(unsafe_code)]

use crate::session::{hex, session_token};
use crate::{Row, Store, StoreError, unix_secs};
use mt_core::FieldType;
use mt_core::names;
use mt_core::value::number;
use rand::Rng as _;
use sha2::Digest as _;

pub const DEFAULT_SESSION_WINDOW_SECS: i64 = 3600;

/// Column of `ejaUsers` holding the last token handed to the user.
const TOKEN_COLUMN: &str = "ejaSessionToken";

/// Stored form of a password: lowercase hex SHA-256.
pub fn password_digest(plain: &str) -> String {
    let mut hasher = sha2::Sha256::new();
    hasher.update(plain.as_bytes());
    hex(&hasher.finalize())
}

impl Store {
    pub fn user_by_credentials(&self, username: &str, password: &str) -> Result<Row, StoreError> {
        self.row(
            "SELECT * FROM ejaUsers WHERE username=? AND password=?",
            &crate::args![username, password_digest(password)],
        )
    }

    pub fn user_by_id(&self, id: i64) -> Result<Row, StoreError> {
        self.row("SELECT * FROM ejaUsers WHERE ejaId=?", &crate::args![id])
    }

    pub fn user_by_username(&self, username: &str) -> Result<Row, StoreError> {
        self.row(
            "SELECT * FROM ejaUsers WHERE username=?",
            &crate::args![username],
        )
    }

    /// Replaces the password of `user` with the digest of `plain`.
    pub fn password_update(&self, user: i64, plain: &str) -> Result<(), StoreError> {
        self.run(
            "UPDATE ejaUsers SET password=? WHERE ejaId=?",
            &crate::args![password_digest(plain), user],
        )?;
        Ok(())
    }

    /// Starts a session: stores a fresh seed for the user, drops the previous
    /// continuation state and returns the token for the current window.
    pub fn session_init(&self, user: i64, window_secs: i64) -> Result<String, StoreError> {
        let seed = hex(&rand::rng().random::<[u8; 32]>());
        self.run(
            "UPDATE ejaUsers SET ejaSession=? WHERE ejaId=?",
            &crate::args![seed.as_str(), user],
        )?;
        self.run(
            "DELETE FROM ejaSessions WHERE ejaOwner=?",
            &crate::args![user],
        )?;
        self.issue_token(user, &seed, window_secs)
    }

    /// Token of `user` for the current window, empty when the user has no session.
    pub fn session_refresh(&self, user: i64, window_secs: i64) -> Result<String, StoreError> {
        let seed = self.value(
            "SELECT ejaSession FROM ejaUsers WHERE ejaId=?",
            &crate::args![user],
        )?;
        if seed.is_empty() {
            return Ok(String::new());
        }
        self.issue_token(user, &seed, window_secs)
    }

    /// Resolves a token issued in the current or the previous window.
    ///
    /// The last issued token is indexed. Only a previous-window token whose
    /// user has since been handed a newer one falls back to a scan over seeds.
    pub fn user_by_session_token(&self, token: &str, window_secs: i64) -> Result<Row, StoreError> {
        if token.is_empty() {
            return Ok(Row::new());
        }
        self.ensure_token_column()?;
        let window = current_window(window_secs);

        let issued = self.row(
            &format!("SELECT ejaId, ejaSession FROM ejaUsers WHERE {TOKEN_COLUMN}=? AND ejaSession != ''"),
            &crate::args![token],
        )?;
        if !issued.is_empty() {
            let seed = issued.get("ejaSession").map(String::as_str).unwrap_or_default();
            if session_token(seed, window) == token || session_token(seed, window - 1) == token {
                return self.user_by_id(row_id(&issued));
            }
            return Ok(Row::new());
        }

        let candidates = self.rows(
            "SELECT ejaId, ejaSession FROM ejaUsers WHERE ejaSession IS NOT NULL AND ejaSession != ''",
            &[],
        )?;
        for candidate in candidates {
            let seed = candidate.get("ejaSession").map(String::as_str).unwrap_or_default();
            if session_token(seed, window - 1) == token {
                return self.user_by_id(row_id(&candidate));
            }
        }
        Ok(Row::new())
    }

    fn issue_token(&self, user: i64, seed: &str, window_secs: i64) -> Result<String, StoreError> {
        self.ensure_token_column()?;
        let token = session_token(seed, current_window(window_secs));
        self.run(
            &format!("UPDATE ejaUsers SET {TOKEN_COLUMN}=? WHERE ejaId=?"),
            &crate::args![token.as_str(), user],
        )?;
        Ok(token)
    }

    /// Adds the indexed token column to `ejaUsers` once per connection.
    pub(crate) fn ensure_token_column(&self) -> Result<(), StoreError> {
        if self.token_ready.get() {
            return Ok(());
        }
        match self.field_add(names::USERS, TOKEN_COLUMN, &FieldType::Text) {
            Ok(()) | Err(StoreError::FieldExists(_)) => {}
            Err(err) => return Err(err),
        }
        self.run(
            &format!("CREATE INDEX IF NOT EXISTS ejaUsersSessionToken ON ejaUsers ({TOKEN_COLUMN})"),
            &[],
        )?;
        self.token_ready.set(true);
        Ok(())
    }
}

fn row_id(row: &Row) -> i64 {
    row.get("ejaId").map(|id| number(id)).unwrap_or_default()
}

fn current_window(window_secs: i64) -> i64 {
    unix_secs() / window_secs.max(1)
}
