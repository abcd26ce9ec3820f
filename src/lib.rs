//! mycoquery - persisted, coercible queries over a relational store
//!
//! A query is a model, a flavor and a set of validated params. The engine
//! builds its SQL, runs it, pages and steps through the results, coerces it
//! to related models, and interns it so it can be resumed by token. The
//! pattern search front end turns free-text search strings into queries.

/// A lazily compiled regex for a literal pattern.
macro_rules! static_regex {
    ($name:ident, $pat:expr) => {
        fn $name() -> &'static regex::Regex {
            static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
            RE.get_or_init(|| regex::Regex::new($pat).expect("static regex"))
        }
    };
}

pub mod backend;
pub mod cli;
pub mod config;
pub mod observability;
pub mod pattern_search;
pub mod query;
pub mod schema;
pub mod store;
