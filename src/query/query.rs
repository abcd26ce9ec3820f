//! The Query object
//!
//! A [`Query`] is a validated descriptor plus its clauses, built eagerly
//! when the engine looks it up. Results, hydrated records and cursor state
//! are filled lazily and live as long as the Query does. Execution lives in
//! `results`, cursor movement in `sequence`, paging in `paginate` and model
//! coercion in `coerce`.

use std::collections::BTreeMap;
use std::fmt;

use super::builder;
use super::clauses::{ClauseSet, SqlOverrides};
use super::descriptor::QueryDescriptor;
use super::engine::QueryEngine;
use super::errors::QueryResult;
use super::params::ParamValue;
use super::registry::Flavor;
use super::results::Record;
use crate::schema::ModelKind;

#[derive(Clone)]
pub struct Query {
    pub(crate) engine: QueryEngine,
    pub(crate) descriptor: QueryDescriptor,
    pub(crate) clauses: ClauseSet,

    /// Id of the PersistedQuery, once saved
    pub(crate) record_id: Option<u64>,

    /// PersistedQuery id of the outer query, for chained traversal
    pub(crate) outer_id: Option<u64>,
    pub(crate) outer: Option<Box<Query>>,

    pub(crate) result_ids: Option<Vec<i64>>,
    pub(crate) records: BTreeMap<i64, Record>,

    pub(crate) current_id: Option<i64>,
    pub(crate) saved_current_id: Option<i64>,
}

impl Query {
    pub(crate) fn new(engine: QueryEngine, descriptor: QueryDescriptor) -> QueryResult<Self> {
        let built = builder::build(&descriptor, engine.directory().as_ref())?;
        Ok(Self {
            engine,
            descriptor,
            clauses: built.clauses,
            record_id: None,
            outer_id: built.outer_id,
            outer: None,
            result_ids: built.result_ids,
            records: BTreeMap::new(),
            current_id: None,
            saved_current_id: None,
        })
    }

    pub fn model(&self) -> ModelKind {
        self.descriptor.model()
    }

    pub fn flavor(&self) -> Flavor {
        self.descriptor.flavor()
    }

    pub fn descriptor(&self) -> &QueryDescriptor {
        &self.descriptor
    }

    pub fn params(&self) -> &BTreeMap<String, ParamValue> {
        self.descriptor.params()
    }

    pub fn clauses(&self) -> &ClauseSet {
        &self.clauses
    }

    pub fn engine(&self) -> &QueryEngine {
        &self.engine
    }

    /// Token of the PersistedQuery, if this query has been saved.
    pub fn record_id(&self) -> Option<u64> {
        self.record_id
    }

    pub fn is_saved(&self) -> bool {
        self.record_id.is_some()
    }

    /// Title from the `title` param, or one generated from the model and
    /// flavor.
    pub fn title(&self) -> String {
        builder::title(&self.descriptor)
    }

    /// The SELECT this query executes by default.
    pub fn sql(&self) -> QueryResult<String> {
        self.sql_with(&SqlOverrides::new())
    }

    pub fn sql_with(&self, overrides: &SqlOverrides) -> QueryResult<String> {
        self.clauses.to_sql(self.model(), overrides)
    }

    /// Sorted, distinct tables the query reads.
    pub fn tables_used(&self) -> QueryResult<Vec<String>> {
        self.clauses.tables_used(self.model())
    }

    pub fn uses_table(&self, table: &str) -> QueryResult<bool> {
        Ok(self.tables_used()?.iter().any(|t| t == table))
    }

    /// Canonical serialized descriptor.
    pub fn serialize(&self) -> QueryResult<String> {
        self.descriptor.serialize()
    }

    /// Whether two queries would resolve to the same PersistedQuery.
    pub fn same_descriptor(&self, other: &Query) -> bool {
        self.descriptor == other.descriptor
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("model", &self.model())
            .field("flavor", &self.flavor())
            .field("params", self.params())
            .field("record_id", &self.record_id)
            .field("outer_id", &self.outer_id)
            .field("current_id", &self.current_id)
            .field("num_cached_ids", &self.result_ids.as_ref().map(Vec::len))
            .finish()
    }
}
