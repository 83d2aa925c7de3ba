#![forbid(unsafe_code)]

use crate::{Row, Store, StoreError, now};
use mt_core::names;
use mt_core::FieldType;
use sha2::Digest as _;

/// Names of the per-user continuation entries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SessionKey {
    ModuleId,
    ModuleName,
    Owner,
    Owners,
    Language,
    RecordId,
    SearchLimit,
    SearchOffset,
    SearchOrder,
    SqlQuery64,
    SqlQueryArgs,
    Link,
}

impl SessionKey {
    pub const SEARCH: [Self; 5] = [
        Self::SqlQuery64,
        Self::SqlQueryArgs,
        Self::SearchLimit,
        Self::SearchOffset,
        Self::SearchOrder,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ModuleId => "ejaModuleId",
            Self::ModuleName => "ejaModuleName",
            Self::Owner => "ejaOwner",
            Self::Owners => "ejaOwners",
            Self::Language => "ejaLanguage",
            Self::RecordId => "ejaId",
            Self::SearchLimit => "SearchLimit",
            Self::SearchOffset => "SearchOffset",
            Self::SearchOrder => "SearchOrder",
            Self::SqlQuery64 => "SqlQuery64",
            Self::SqlQueryArgs => "SqlQueryArgs",
            Self::Link => "Link",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        [
            Self::ModuleId,
            Self::ModuleName,
            Self::Owner,
            Self::Owners,
            Self::Language,
            Self::RecordId,
            Self::SearchLimit,
            Self::SearchOffset,
            Self::SearchOrder,
            Self::SqlQuery64,
            Self::SqlQueryArgs,
            Self::Link,
        ]
        .into_iter()
        .find(|key| key.as_str() == value)
    }
}

/// Per-user key/value continuation state. Every entry is last-write-wins per
/// `(owner, key, sub)`.
pub trait SessionStore {
    fn session_put(&self, owner: i64, key: SessionKey, value: &str, sub: &str)
    -> Result<(), StoreError>;

    /// Removes the persisted entries of `keys`.
    fn session_clear(&self, owner: i64, keys: &[SessionKey]) -> Result<(), StoreError>;

    /// Re-derives the working state of `owner` for `module_id` and returns it in write order.
    fn session_load(&self, owner: i64, module_id: i64) -> Result<Vec<Row>, StoreError>;

    /// Drops every entry of `owner` and invalidates the session token.
    fn session_reset(&self, owner: i64) -> Result<(), StoreError>;

    fn session_clean_search(&self, owner: i64) -> Result<(), StoreError> {
        self.session_clear(owner, &SessionKey::SEARCH)
    }

    fn session_clean_link(&self, owner: i64) -> Result<(), StoreError> {
        self.session_clean_search(owner)?;
        self.session_clear(owner, &[SessionKey::Link])
    }

    /// Stores query arguments one entry per position, replacing the previous list.
    fn session_put_args(&self, owner: i64, args: &[String]) -> Result<(), StoreError> {
        self.session_clear(owner, &[SessionKey::SqlQueryArgs])?;
        for (index, arg) in args.iter().enumerate() {
            self.session_put(owner, SessionKey::SqlQueryArgs, arg, &index.to_string())?;
        }
        Ok(())
    }
}

impl Store {
    fn ensure_session_tables(&self) -> Result<(), StoreError> {
        if self.session_ready.get() {
            return Ok(());
        }
        self.table_add(names::SESSION_TRANSIENT, true)?;
        for column in ["name", "value", "sub"] {
            match self.field_add(names::SESSION_TRANSIENT, column, &FieldType::Text) {
                Ok(()) | Err(StoreError::FieldExists(_)) => {}
                Err(err) => return Err(err),
            }
        }
        self.session_ready.set(true);
        Ok(())
    }

    fn session_put_transient(
        &self,
        owner: i64,
        key: SessionKey,
        value: &str,
        sub: &str,
    ) -> Result<(), StoreError> {
        self.ensure_session_tables()?;
        self.run(
            "DELETE FROM ejaSession WHERE ejaOwner=? AND name=? AND sub=?",
            &crate::args![owner, key.as_str(), sub],
        )?;
        self.run(
            "INSERT INTO ejaSession (ejaId, ejaOwner, ejaLog, name, value, sub) VALUES (NULL, ?, ?, ?, ?, ?)",
            &crate::args![owner, now(), key.as_str(), value, sub],
        )?;
        Ok(())
    }
}

impl SessionStore for Store {
    fn session_put(
        &self,
        owner: i64,
        key: SessionKey,
        value: &str,
        sub: &str,
    ) -> Result<(), StoreError> {
        self.session_put_transient(owner, key, value, sub)?;
        self.run(
            "DELETE FROM ejaSessions WHERE ejaOwner=? AND name=? AND sub=?",
            &crate::args![owner, key.as_str(), sub],
        )?;
        self.run(
            "INSERT INTO ejaSessions (ejaId, ejaOwner, ejaLog, name, value, sub) VALUES (NULL, ?, ?, ?, ?, ?)",
            &crate::args![owner, now(), key.as_str(), value, sub],
        )?;
        Ok(())
    }

    fn session_clear(&self, owner: i64, keys: &[SessionKey]) -> Result<(), StoreError> {
        if keys.is_empty() {
            return Ok(());
        }
        let placeholders = vec!["?"; keys.len()].join(",");
        let mut args = vec![mt_core::Value::from(owner)];
        args.extend(keys.iter().map(|key| mt_core::Value::from(key.as_str())));
        self.run(
            &format!("DELETE FROM ejaSessions WHERE ejaOwner=? AND name IN ({placeholders})"),
            &args,
        )?;
        Ok(())
    }

    fn session_load(&self, owner: i64, module_id: i64) -> Result<Vec<Row>, StoreError> {
        self.ensure_session_tables()?;
        self.run(
            "DELETE FROM ejaSession WHERE ejaOwner=?",
            &crate::args![owner],
        )?;
        self.session_clear(owner, &[SessionKey::RecordId, SessionKey::Owners])?;
        self.run(
            r#"
            INSERT INTO ejaSession (ejaOwner, ejaLog, name, value, sub)
            SELECT ejaOwner, ejaLog, name, value, sub FROM ejaSessions WHERE ejaOwner=? ORDER BY ejaId ASC
            "#,
            &crate::args![owner],
        )?;

        let user = self.user_by_id(owner)?;
        let field = |key: &str| user.get(key).cloned().unwrap_or_default();
        self.session_put(owner, SessionKey::ModuleId, &module_id.to_string(), "")?;
        self.session_put(
            owner,
            SessionKey::ModuleName,
            &self.module_name_by_id(module_id)?,
            "",
        )?;
        self.session_put(owner, SessionKey::Owner, &field(names::ID), "")?;
        self.session_put(owner, SessionKey::Language, &field("ejaLanguage"), "")?;
        for id in self.owners(owner, module_id) {
            let id = id.to_string();
            self.session_put(owner, SessionKey::Owners, &id, &id)?;
        }

        self.rows(
            "SELECT * FROM ejaSession WHERE ejaOwner=? ORDER BY ejaLog ASC, ejaId ASC",
            &crate::args![owner],
        )
    }

    fn session_reset(&self, owner: i64) -> Result<(), StoreError> {
        self.run(
            "DELETE FROM ejaSessions WHERE ejaOwner=?",
            &crate::args![owner],
        )?;
        if self.session_ready.get() {
            self.run(
                "DELETE FROM ejaSession WHERE ejaOwner=?",
                &crate::args![owner],
            )?;
        }
        self.ensure_token_column()?;
        self.run(
            "UPDATE ejaUsers SET ejaSession='', ejaSessionToken='' WHERE ejaId=?",
            &crate::args![owner],
        )?;
        Ok(())
    }
}

/// Token handed to clients: `sha256(seed ":" window)` in lowercase hex.
pub fn session_token(seed: &str, window: i64) -> String {
    let mut hasher = sha2::Sha256::new();
    hasher.update(seed.as_bytes());
    hasher.update(b":");
    hasher.update(window.to_string().as_bytes());
    hex(&hasher.finalize())
}

pub(crate) fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}
