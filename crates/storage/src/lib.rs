#![forbid(unsafe_code)]

mod clock;
mod commands;
mod crud;
mod error;
mod links;
mod modules;
mod options;
mod owners;
mod requests;
mod schema;
mod search;
mod session;
mod setup;
mod transfer;
mod translate;
mod tree;
mod types;
mod users;

pub use clock::{now, unix_secs};
pub use commands::command_exists;
pub use crud::stored_value;
pub use error::StoreError;
pub use links::LinkKind;
pub use options::{SelectOption, label_for, parse_select_options};
pub use owners::MAX_DELEGATION_DEPTH;
pub use requests::*;
pub use search::{count_query, order_and_limit, order_is_valid};
pub use session::{SessionKey, SessionStore, session_token};
pub use setup::{SetupRequest, setup};
pub use transfer::{ModuleDefinition, ModuleField, ModuleSettings, ModuleTranslation};
pub use types::*;
pub use users::{DEFAULT_SESSION_WINDOW_SECS, password_digest};

pub use mt_core::Value;

use mt_core::ident::validate_identifier;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OptionalExtension, params_from_iter};
use std::cell::Cell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// One result row, every column rendered as text.
pub type Row = BTreeMap<String, String>;

#[derive(Debug)]
pub struct Store {
    conn: Connection,
    path: PathBuf,
    translation_debug: bool,
    session_ready: Cell<bool>,
    token_ready: Cell<bool>,
}

impl Store {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            "#,
        )?;

        Ok(Self {
            conn,
            path,
            translation_debug: false,
            session_ready: Cell::new(false),
            token_ready: Cell::new(false),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing translations render as `{word}` instead of `word`.
    pub fn set_translation_debug(&mut self, enabled: bool) {
        self.translation_debug = enabled;
    }

    pub fn run(&self, sql: &str, args: &[Value]) -> Result<RunResult, StoreError> {
        let result = self
            .conn
            .execute(sql, params_from_iter(args.iter().map(sql_value)))
            .map(|changes| RunResult {
                changes: i64::try_from(changes).unwrap_or(i64::MAX),
                last_id: self.conn.last_insert_rowid(),
            });
        logged(sql, args, result)
    }

    /// First column of the first row; empty when the query yields nothing.
    pub fn value(&self, sql: &str, args: &[Value]) -> Result<String, StoreError> {
        let result = self
            .conn
            .query_row(sql, params_from_iter(args.iter().map(sql_value)), |row| {
                row.get_ref(0).map(column_text)
            })
            .optional()
            .map(Option::unwrap_or_default);
        logged(sql, args, result)
    }

    pub fn row(&self, sql: &str, args: &[Value]) -> Result<Row, StoreError> {
        Ok(self.rows(sql, args)?.into_iter().next().unwrap_or_default())
    }

    pub fn rows(&self, sql: &str, args: &[Value]) -> Result<Vec<Row>, StoreError> {
        logged(sql, args, self.query_rows(sql, args))
    }

    pub fn cols(&self, sql: &str) -> Result<Vec<String>, StoreError> {
        let result = self.conn.prepare(sql).map(|stmt| {
            stmt.column_names()
                .into_iter()
                .map(str::to_string)
                .collect::<Vec<_>>()
        });
        logged(sql, &[], result)
    }

    fn query_rows(&self, sql: &str, args: &[Value]) -> rusqlite::Result<Vec<Row>> {
        let mut stmt = self.conn.prepare(sql)?;
        let names = stmt
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect::<Vec<_>>();
        let mut rows = stmt.query(params_from_iter(args.iter().map(sql_value)))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut record = Row::new();
            for (index, name) in names.iter().enumerate() {
                record.insert(name.clone(), column_text(row.get_ref(index)?));
            }
            out.push(record);
        }
        Ok(out)
    }

    /// Ids from the first column of every row.
    pub(crate) fn id_list(&self, sql: &str, args: &[Value]) -> Result<Vec<i64>, StoreError> {
        let result = self.conn.prepare(sql).and_then(|mut stmt| {
            let mut rows = stmt.query(params_from_iter(args.iter().map(sql_value)))?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                out.push(mt_core::value::number(&column_text(row.get_ref(0)?)));
            }
            Ok(out)
        });
        logged(sql, args, result)
    }

    pub(crate) fn number(&self, sql: &str, args: &[Value]) -> Result<i64, StoreError> {
        Ok(mt_core::value::number(&self.value(sql, args)?))
    }
}

fn logged<T>(sql: &str, args: &[Value], result: rusqlite::Result<T>) -> Result<T, StoreError> {
    result.map_err(|err| {
        tracing::error!(sql = sql.trim(), args = ?args, error = %err, "sql statement failed");
        StoreError::Sql(err)
    })
}

fn sql_value(value: &Value) -> rusqlite::types::Value {
    match value {
        Value::Text(text) => rusqlite::types::Value::Text(text.clone()),
        Value::Integer(number) => rusqlite::types::Value::Integer(*number),
        Value::Decimal(number) => rusqlite::types::Value::Real(*number),
        Value::Boolean(flag) => rusqlite::types::Value::Integer(i64::from(*flag)),
    }
}

fn column_text(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => String::new(),
        ValueRef::Integer(number) => number.to_string(),
        ValueRef::Real(number) => number.to_string(),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => String::from_utf8_lossy(bytes).into_owned(),
    }
}

fn identifier(name: &str) -> Result<&str, StoreError> {
    validate_identifier(name).map_err(|_| StoreError::InvalidIdentifier(name.to_string()))?;
    Ok(name)
}

/// Builds a positional argument slice from heterogeneous values.
#[macro_export]
macro_rules! args {
    ($($value:expr),* $(,)?) => {
        [$($crate::Value::from($value)),*]
    };
}
