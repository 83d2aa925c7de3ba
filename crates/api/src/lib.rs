#![forbid(unsafe_code)]

pub mod config;
pub mod entry;
mod error;
pub mod logging;
mod orchestrator;
pub mod plugins;
mod request;
mod response;

pub use config::{Config, Invocation, LogLevel};
pub use error::ApiError;
pub use orchestrator::{NoSso, SSO_TOKEN_VALUE, SsoResolver, handle, run, run_with};
pub use request::Request;
pub use response::Response;
