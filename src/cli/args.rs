//! CLI argument definitions using clap
//!
//! Commands:
//! - mycoquery parse <pattern>
//! - mycoquery sql --model <M> [--flavor <F>] [--params <JSON>]
//! - mycoquery save --config <path> --model <M> [--flavor <F>] [--params <JSON>]
//! - mycoquery cleanup --config <path>
//! - mycoquery reverse-order <order>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// mycoquery - build, save and inspect persisted queries
#[derive(Parser, Debug)]
#[command(name = "mycoquery")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Parse a free-text search string and print its terms
    Parse {
        /// The search string, e.g. 'Agaricus user:rolf date:2013'
        pattern: String,
    },

    /// Validate a query and print the SQL it would run
    Sql {
        /// Model name, e.g. Observation
        #[arg(long)]
        model: String,

        /// Flavor name; the model's default when omitted
        #[arg(long, default_value = "default")]
        flavor: String,

        /// Params as a JSON object
        #[arg(long, default_value = "{}")]
        params: String,

        /// Scripted backend fixture used for lookups
        #[arg(long)]
        fixture: Option<PathBuf>,
    },

    /// Save a query in the configured store and print its token
    Save {
        /// Path to configuration file
        #[arg(long, default_value = "./mycoquery.json")]
        config: PathBuf,

        #[arg(long)]
        model: String,

        #[arg(long, default_value = "default")]
        flavor: String,

        #[arg(long, default_value = "{}")]
        params: String,

        #[arg(long)]
        fixture: Option<PathBuf>,
    },

    /// Delete stale persisted queries
    Cleanup {
        /// Path to configuration file
        #[arg(long, default_value = "./mycoquery.json")]
        config: PathBuf,
    },

    /// Print an ORDER BY clause with every direction flipped
    ReverseOrder {
        order: String,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
