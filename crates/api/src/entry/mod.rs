#![forbid(unsafe_code)]

mod stdio;

pub use stdio::{handle_line, run_stdio, serve};
