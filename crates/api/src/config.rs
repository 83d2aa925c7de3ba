#![forbid(unsafe_code)]

use crate::ApiError;
use mt_storage::{DEFAULT_SESSION_WINDOW_SECS, SetupRequest, order_is_valid};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_SEARCH_LIMIT: i64 = 15;
pub const DEFAULT_SEARCH_ORDER: &str = "ejaId DESC";
const DEFAULT_SETUP_USER: &str = "admin";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn from_str(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "error" => Some(Self::Error),
            "warn" | "warning" => Some(Self::Warn),
            "info" => Some(Self::Info),
            "debug" => Some(Self::Debug),
            "trace" => Some(Self::Trace),
            _ => None,
        }
    }

    pub fn parse(value: Option<&str>) -> Self {
        value.and_then(Self::from_str).unwrap_or(Self::Info)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub db_name: PathBuf,
    pub language: String,
    pub log_level: LogLevel,
    pub session_window_secs: i64,
    pub default_search_limit: i64,
    pub default_search_order: String,
    pub translation_debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_name: PathBuf::from("metatable.db"),
            language: "en".to_string(),
            log_level: LogLevel::Info,
            session_window_secs: DEFAULT_SESSION_WINDOW_SECS,
            default_search_limit: DEFAULT_SEARCH_LIMIT,
            default_search_order: DEFAULT_SEARCH_ORDER.to_string(),
            translation_debug: false,
        }
    }
}

/// Keys accepted in a `--config` JSON file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    db_name: Option<PathBuf>,
    language: Option<String>,
    log_level: Option<String>,
    session_window_secs: Option<i64>,
    default_search_limit: Option<i64>,
    default_search_order: Option<String>,
    translation_debug: Option<bool>,
}

/// What the binary was asked to do.
#[derive(Clone, Debug)]
pub enum Invocation {
    Serve(Config),
    Setup {
        config: Config,
        request: SetupRequest,
    },
    Help,
    Version,
}

impl Invocation {
    pub fn from_env() -> Result<Self, ApiError> {
        Self::parse(std::env::args().skip(1), |key| std::env::var(key).ok())
    }

    /// Layers defaults, the `--config` file, environment variables and flags, in that order.
    pub fn parse<I, F>(args: I, env: F) -> Result<Self, ApiError>
    where
        I: IntoIterator<Item = String>,
        F: Fn(&str) -> Option<String>,
    {
        let args = args.into_iter().collect::<Vec<_>>();
        if args.iter().any(|arg| matches!(arg.as_str(), "-h" | "--help")) {
            return Ok(Self::Help);
        }
        if args.iter().any(|arg| matches!(arg.as_str(), "-V" | "--version")) {
            return Ok(Self::Version);
        }

        let mut config = Config::default();
        if let Some(path) = config_path(&args)? {
            apply_file(&mut config, &path)?;
        }
        apply_env(&mut config, &env)?;

        let mut setup = false;
        let mut request = SetupRequest {
            user: DEFAULT_SETUP_USER.to_string(),
            ..SetupRequest::default()
        };
        let mut iter = args.into_iter();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--config" => {
                    flag_value(&mut iter, &arg)?;
                }
                "--db-name" => config.db_name = PathBuf::from(flag_value(&mut iter, &arg)?),
                "--language" => config.language = flag_value(&mut iter, &arg)?,
                "--log-level" => config.log_level = log_level(&flag_value(&mut iter, &arg)?)?,
                "--session-window" => {
                    config.session_window_secs = integer(&arg, &flag_value(&mut iter, &arg)?)?;
                }
                "--translation-debug" => config.translation_debug = true,
                "--setup" => setup = true,
                "--setup-user" => request.user = flag_value(&mut iter, &arg)?,
                "--setup-pass" => request.pass = flag_value(&mut iter, &arg)?,
                "--setup-path" => {
                    request.definitions = Some(PathBuf::from(flag_value(&mut iter, &arg)?));
                }
                other => return Err(ApiError::Config(format!("unknown flag: {other}"))),
            }
        }

        validate(&config)?;
        if !setup {
            return Ok(Self::Serve(config));
        }
        if request.pass.is_empty() {
            return Err(ApiError::Config("--setup requires --setup-pass".to_string()));
        }
        Ok(Self::Setup { config, request })
    }
}

fn config_path(args: &[String]) -> Result<Option<PathBuf>, ApiError> {
    let Some(index) = args.iter().position(|arg| arg == "--config") else {
        return Ok(None);
    };
    args.get(index + 1)
        .map(|path| Some(PathBuf::from(path)))
        .ok_or_else(|| ApiError::Config("--config requires a value".to_string()))
}

fn apply_file(config: &mut Config, path: &Path) -> Result<(), ApiError> {
    let raw = std::fs::read_to_string(path)?;
    let file: FileConfig = serde_json::from_str(&raw)
        .map_err(|err| ApiError::Config(format!("{}: {err}", path.display())))?;
    if let Some(value) = file.db_name {
        config.db_name = value;
    }
    if let Some(value) = file.language {
        config.language = value;
    }
    if let Some(value) = file.log_level {
        config.log_level = log_level(&value)?;
    }
    if let Some(value) = file.session_window_secs {
        config.session_window_secs = value;
    }
    if let Some(value) = file.default_search_limit {
        config.default_search_limit = value;
    }
    if let Some(value) = file.default_search_order {
        config.default_search_order = value;
    }
    if let Some(value) = file.translation_debug {
        config.translation_debug = value;
    }
    Ok(())
}

fn apply_env(config: &mut Config, env: &impl Fn(&str) -> Option<String>) -> Result<(), ApiError> {
    if let Some(value) = env("METATABLE_DB").filter(|v| !v.trim().is_empty()) {
        config.db_name = PathBuf::from(value);
    }
    if let Some(value) = env("METATABLE_LANGUAGE").filter(|v| !v.trim().is_empty()) {
        config.language = value;
    }
    if let Some(value) = env("METATABLE_LOG_LEVEL").filter(|v| !v.trim().is_empty()) {
        config.log_level = log_level(&value)?;
    }
    if let Some(value) = env("METATABLE_SESSION_WINDOW").filter(|v| !v.trim().is_empty()) {
        config.session_window_secs = integer("METATABLE_SESSION_WINDOW", &value)?;
    }
    Ok(())
}

fn validate(config: &Config) -> Result<(), ApiError> {
    if config.session_window_secs < 1 {
        return Err(ApiError::Config("session window must be positive".to_string()));
    }
    if config.default_search_limit < 1 {
        return Err(ApiError::Config("default search limit must be positive".to_string()));
    }
    if !order_is_valid(&config.default_search_order) {
        return Err(ApiError::Config(format!(
            "invalid default search order: {:?}",
            config.default_search_order
        )));
    }
    Ok(())
}

fn flag_value(iter: &mut impl Iterator<Item = String>, flag: &str) -> Result<String, ApiError> {
    iter.next()
        .ok_or_else(|| ApiError::Config(format!("{flag} requires a value")))
}

fn log_level(value: &str) -> Result<LogLevel, ApiError> {
    LogLevel::from_str(value).ok_or_else(|| ApiError::Config(format!("invalid log level: {value}")))
}

fn integer(name: &str, value: &str) -> Result<i64, ApiError> {
    value
        .trim()
        .parse::<i64>()
        .map_err(|_| ApiError::Config(format!("{name} expects an integer, got {value:?}")))
}
