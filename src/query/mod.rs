//! Query subsystem
//!
//! A query is identified by a model, a flavor and a set of params. The
//! engine validates the params against the flavor's declaration, builds the
//! SQL clauses, and optionally interns the normalized descriptor so the
//! same query can be resumed later by a small integer token.
//!
//! # Usage
//!
//! ```ignore
//! use mycoquery::query::{QueryArgs, QueryEngine};
//! use mycoquery::schema::ModelKind;
//!
//! let mut query = engine.lookup_and_save(
//!     ModelKind::Observation,
//!     "by_user",
//!     QueryArgs::new().with("user", 2),
//! )?;
//! let ids = query.result_ids()?;
//! let images = query.coerce(ModelKind::Image)?;
//! ```

mod args;
mod builder;
mod clauses;
mod coerce;
mod descriptor;
mod engine;
mod errors;
mod google;
mod order;
mod paginate;
mod params;
mod query;
mod registry;
mod results;
mod sequence;

pub use args::{QueryArgs, RawParam};
pub use clauses::{
    and_clause, clean_id_set, clean_pattern, or_clause, reverse_order, split_top_level, ClauseSet,
    OrderOverride, SqlOverrides,
};
pub use descriptor::QueryDescriptor;
pub use engine::QueryEngine;
pub use errors::{QueryError, QueryErrorCode, QueryResult, Severity};
pub use google::{google_conditions, google_parse, GoogleSearch};
pub use order::apply_by;
pub use paginate::Paginator;
pub use params::{DefaultValue, ParamKind, ParamSpec, ParamValue};
pub use query::Query;
pub use registry::{
    allowed_flavors, default_flavor, find_spec, is_allowed, param_specs, Flavor, RAW_SQL_PARAMS,
};
pub use results::{can_include, Record};
pub use sequence::Moved;
