//! JSON output for the CLI
//!
//! - Success: one JSON object on stdout
//! - Failure: one JSON object on stderr
//! - UTF-8 only

use std::io::{self, Write};

use serde_json::{json, Value};

use super::errors::{CliError, CliResult};

/// `{"status": "ok", "data": ...}`
pub fn response_json(data: Value) -> Value {
    json!({
        "status": "ok",
        "data": data
    })
}

/// `{"error": code, "message": ...}`
pub fn error_json(error: &CliError) -> Value {
    json!({
        "error": error.code_str(),
        "message": error.message()
    })
}

/// Write a success response to stdout
pub fn write_response(data: Value) -> CliResult<()> {
    let mut stdout = io::stdout();
    serde_json::to_writer(&mut stdout, &response_json(data))?;
    writeln!(stdout)?;
    stdout.flush()?;
    Ok(())
}

/// Write an error response to stderr. Failures to write are ignored;
/// there is nowhere left to report them.
pub fn write_error(error: &CliError) {
    let mut stderr = io::stderr();
    let _ = serde_json::to_writer(&mut stderr, &error_json(error));
    let _ = writeln!(stderr);
    let _ = stderr.flush();
}
