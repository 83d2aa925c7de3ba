#![forbid(unsafe_code)]

#[derive(Debug)]
pub enum StoreError {
    Io(std::io::Error),
    Sql(rusqlite::Error),
    Json(serde_json::Error),
    InvalidInput(&'static str),
    InvalidIdentifier(String),
    ModuleNotFound,
    TableMissing(String),
    FieldExists(String),
    UnknownField(String),
    UnknownCommand(String),
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Io(_) => "STORAGE_IO",
            Self::Sql(_) => "STORAGE_SQL",
            Self::Json(_) => "INVALID_JSON",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::InvalidIdentifier(_) => "INVALID_IDENTIFIER",
            Self::ModuleNotFound => "MODULE_NOT_FOUND",
            Self::TableMissing(_) => "TABLE_MISSING",
            Self::FieldExists(_) => "FIELD_EXISTS",
            Self::UnknownField(_) => "UNKNOWN_FIELD",
            Self::UnknownCommand(_) => "UNKNOWN_COMMAND",
        }
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "io: {err}"),
            Self::Sql(err) => write!(f, "sqlite: {err}"),
            Self::Json(err) => write!(f, "json: {err}"),
            Self::InvalidInput(message) => write!(f, "invalid input: {message}"),
            Self::InvalidIdentifier(name) => write!(f, "invalid identifier: {name:?}"),
            Self::ModuleNotFound => write!(f, "module not found"),
            Self::TableMissing(name) => write!(f, "table does not exist: {name}"),
            Self::FieldExists(name) => write!(f, "field already exists: {name}"),
            Self::UnknownField(name) => write!(f, "field not found: {name}"),
            Self::UnknownCommand(name) => write!(f, "unknown command: {name}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Sql(err) => Some(err),
            Self::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sql(value)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}
