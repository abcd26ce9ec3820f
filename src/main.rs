//! mycoquery CLI entry point
//!
//! This is a minimal entrypoint that:
//! 1. Parses CLI arguments and dispatches (via cli::run)
//! 2. Prints errors to stderr as JSON
//! 3. Exits with non-zero on failure
//!
//! All logic is delegated to the CLI module.

use mycoquery::cli;

fn main() {
    if let Err(e) = cli::run() {
        cli::write_error(&e);
        std::process::exit(1);
    }
}
