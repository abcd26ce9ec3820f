//! CLI module for mycoquery
//!
//! Provides command-line interface for:
//! - parse: Show the terms of a search string
//! - sql: Show the SQL a query would run
//! - save: Intern a query in the configured store
//! - cleanup: Delete stale persisted queries
//! - reverse-order: Flip an ORDER BY clause

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{cleanup, parse, run, run_command, save, sql};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{error_json, response_json, write_error, write_response};
