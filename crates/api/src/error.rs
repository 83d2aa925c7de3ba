#![forbid(unsafe_code)]

use crate::Response;
use mt_storage::StoreError;

#[derive(Debug)]
pub enum ApiError {
    Store(StoreError),
    /// No user could be resolved. Carries the partial response (alerts included).
    NotAuthorized(Box<Response>),
    Config(String),
    Io(std::io::Error),
    Json(serde_json::Error),
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Store(err) => err.code(),
            Self::NotAuthorized(_) => "ejaNotAuthorized",
            Self::Config(_) => "INVALID_CONFIG",
            Self::Io(_) => "IO",
            Self::Json(_) => "INVALID_JSON",
        }
    }

    /// The response rendered before the request was rejected, if any.
    pub fn response(&self) -> Option<&Response> {
        match self {
            Self::NotAuthorized(response) => Some(response),
            _ => None,
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store(err) => write!(f, "{err}"),
            Self::NotAuthorized(_) => write!(f, "not authorized"),
            Self::Config(message) => write!(f, "config: {message}"),
            Self::Io(err) => write!(f, "io: {err}"),
            Self::Json(err) => write!(f, "json: {err}"),
        }
    }
}

impl std::error::Error for ApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            Self::Io(err) => Some(err),
            Self::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<std::io::Error> for ApiError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}
