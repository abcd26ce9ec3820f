//! Pattern search
//!
//! Turns a free-text search string such as
//! `Agaricus user:rolf date:2013 has_specimen:yes` into the params of a
//! query. Bare words become the `pattern`; every `var:value` term goes
//! through a typed value parser, and names, locations, projects, species
//! lists and users are resolved to ids through the engine's directory.
//!
//! # Usage
//!
//! ```ignore
//! use mycoquery::pattern_search::ObservationSearch;
//!
//! let search = ObservationSearch::new(&engine, "Agaricus user:rolf date:2013")?;
//! let ids = search.results()?;
//! ```

mod errors;
mod parser;
mod search;
mod term;

pub use errors::{PatternSearchError, PatternSearchResult};
pub use parser::{parse_next_term, Parser, PATTERN_VAR};
pub use search::{NameSearch, NameTerms, ObservationSearch, ObservationTerms, PatternSearch, SearchModel};
pub use term::{dequote, quote, Term};
