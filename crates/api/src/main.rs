#![forbid(unsafe_code)]

use mt_api::{Invocation, entry, logging};
use mt_storage::Store;

const SERVER_NAME: &str = "metatable";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

fn usage() -> &'static str {
    "metatable: metadata-driven CRUD engine (SQLite, newline JSON on stdio)\n\n\
USAGE:\n\
  metatable [--config FILE] [--db-name PATH] [--language LANG]\n\
            [--log-level error|warn|info|debug|trace] [--session-window SECS]\n\
            [--translation-debug]\n\
  metatable --setup --setup-pass PASS [--setup-user USER] [--setup-path DIR]\n\
\n\
FLAGS:\n\
  -h, --help       Print this help and exit\n\
  -V, --version    Print version and exit\n\
\n\
ENV:\n\
  METATABLE_DB, METATABLE_LANGUAGE, METATABLE_LOG_LEVEL, METATABLE_SESSION_WINDOW\n\
  RUST_LOG overrides the log level.\n"
}

fn version_line() -> String {
    format!("{SERVER_NAME} {SERVER_VERSION}")
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    match Invocation::from_env()? {
        Invocation::Help => print!("{}", usage()),
        Invocation::Version => println!("{}", version_line()),
        Invocation::Setup { config, request } => {
            logging::init(config.log_level);
            let store = Store::open(&config.db_name)?;
            let admin = mt_storage::setup(&store, &request)?;
            tracing::info!(db = %config.db_name.display(), admin, "database ready");
        }
        Invocation::Serve(config) => {
            logging::init(config.log_level);
            entry::run_stdio(&config)?;
        }
    }
    Ok(())
}
