#![forbid(unsafe_code)]

use crate::{ApiError, Config, Request, handle};
use serde::Deserialize;
use serde_json::{Value, json};
use std::io::{BufRead, BufReader, Write};

/// A request line: the request itself plus transport-level options.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Incoming {
    #[serde(flatten)]
    request: Request,
    keep_session: Option<bool>,
}

/// Runs one newline-delimited request and renders its envelope.
pub fn handle_line(config: &Config, raw: &str) -> Value {
    let incoming = match serde_json::from_str::<Incoming>(raw) {
        Ok(incoming) => incoming,
        Err(err) => return error_envelope(&ApiError::from(err)),
    };
    let action = incoming.request.action.clone();
    match handle(config, incoming.request, incoming.keep_session.unwrap_or(true)) {
        Ok(response) => json!({ "ok": true, "result": response }),
        Err(err) => {
            if !matches!(err, ApiError::NotAuthorized(_)) {
                tracing::error!(action = %action, code = err.code(), error = %err, "request failed");
            }
            error_envelope(&err)
        }
    }
}

fn error_envelope(err: &ApiError) -> Value {
    let mut envelope = json!({
        "ok": false,
        "error": { "code": err.code(), "message": err.to_string() },
    });
    if let Some(response) = err.response()
        && let Ok(result) = serde_json::to_value(response)
    {
        envelope["result"] = result;
    }
    envelope
}

/// Reads requests until EOF. Blank lines are skipped.
pub fn serve<R: BufRead, W: Write>(config: &Config, reader: R, writer: &mut W) -> Result<(), ApiError> {
    for line in reader.lines() {
        let line = line?;
        let raw = line.trim();
        if raw.is_empty() {
            continue;
        }
        let response = handle_line(config, raw);
        write_newline_json(writer, &response)?;
    }
    Ok(())
}

pub fn run_stdio(config: &Config) -> Result<(), ApiError> {
    let stdin = std::io::stdin();
    let reader = BufReader::new(stdin.lock());
    let mut stdout = std::io::stdout().lock();
    tracing::info!(db = %config.db_name.display(), "serving requests on stdio");
    serve(config, reader, &mut stdout)
}

fn write_newline_json<W: Write>(writer: &mut W, resp: &Value) -> Result<(), ApiError> {
    writeln!(writer, "{}", serde_json::to_string(resp)?)?;
    writer.flush()?;
    Ok(())
}
