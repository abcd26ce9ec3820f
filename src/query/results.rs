//! Execution and the result cache
//!
//! Every select primitive renders the query's clauses with per-call
//! overrides merged on top, so none of them changes the query. The ordered
//! id list and the hydrated records are memoized on the query.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use super::clauses::{clean_id_set, ClauseSet, SqlOverrides};
use super::errors::{QueryError, QueryResult};
use super::query::Query;
use crate::backend::{value_as_i64, BackendResult, Row, SqlBackend};
use crate::observability::{log_event_with_fields, Event};
use crate::schema::{JoinColumn, JoinError, JoinGraph, ModelKind};

/// One hydrated row with any eager-loaded associations.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: i64,
    pub row: Row,
    /// Association table name -> associated rows
    pub associations: BTreeMap<String, Vec<Row>>,
}

impl Record {
    pub fn new(id: i64, row: Row) -> Self {
        Self {
            id,
            row,
            associations: BTreeMap::new(),
        }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.row.get(column)
    }

    /// Rows loaded for `association`; empty if it was not included.
    pub fn association(&self, association: &str) -> &[Row] {
        self.associations
            .get(association)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

/// Run one statement against the backend, logging it.
pub(crate) fn run<T>(
    query: &Query,
    sql: &str,
    f: impl FnOnce(&dyn SqlBackend, &str) -> BackendResult<T>,
) -> QueryResult<T> {
    let model = query.model();
    log_event_with_fields(Event::QueryExecuted, &[("model", model.as_str()), ("sql", sql)]);
    query.engine.metrics().increment_executions();
    f(query.engine.backend().as_ref(), sql).map_err(|e| {
        let message = e.to_string();
        log_event_with_fields(
            Event::QueryFailed,
            &[("model", model.as_str()), ("error", &message), ("sql", sql)],
        );
        QueryError::from(e)
    })
}

impl Query {
    fn execute<T>(
        &self,
        overrides: &SqlOverrides,
        f: impl FnOnce(&dyn SqlBackend, &str) -> BackendResult<T>,
    ) -> QueryResult<T> {
        let sql = self.sql_with(overrides)?;
        run(self, &sql, f)
    }

    /// Number of distinct matches. Grouping and ordering are dropped.
    pub fn select_count(&self, overrides: &SqlOverrides) -> QueryResult<i64> {
        let table = self.model().table_name();
        let inner = overrides
            .select
            .clone()
            .or_else(|| self.clauses.select.clone())
            .unwrap_or_else(|| format!("DISTINCT {}.id", table));
        let counting = SqlOverrides {
            select: Some(format!("COUNT({})", inner)),
            group: Some(String::new()),
            order: Some(super::clauses::OrderOverride::Set(String::new())),
            ..overrides.clone()
        };
        let value = self.execute(&counting, |b, sql| b.select_value(sql))?;
        Ok(value.as_ref().and_then(value_as_i64).unwrap_or(0))
    }

    pub fn select_value(&self, overrides: &SqlOverrides) -> QueryResult<Option<Value>> {
        self.execute(overrides, |b, sql| b.select_value(sql))
    }

    pub fn select_values(&self, overrides: &SqlOverrides) -> QueryResult<Vec<Value>> {
        self.execute(overrides, |b, sql| b.select_values(sql))
    }

    pub fn select_rows(&self, overrides: &SqlOverrides) -> QueryResult<Vec<Vec<Value>>> {
        self.execute(overrides, |b, sql| b.select_rows(sql))
    }

    /// Every row as a column map.
    pub fn select_all(&self, overrides: &SqlOverrides) -> QueryResult<Vec<Map<String, Value>>> {
        let rows = self.execute(overrides, |b, sql| b.select_all(sql))?;
        Ok(rows.iter().map(Row::to_map).collect())
    }

    pub fn select_one(&self, overrides: &SqlOverrides) -> QueryResult<Option<Map<String, Value>>> {
        let row = self.execute(overrides, |b, sql| b.select_one(sql))?;
        Ok(row.as_ref().map(Row::to_map))
    }

    pub fn select_ids(&self, overrides: &SqlOverrides) -> QueryResult<Vec<i64>> {
        self.execute(overrides, |b, sql| b.select_ids(sql))
    }

    /// Full matching records, bypassing the cache.
    pub fn find(&self, overrides: &SqlOverrides) -> QueryResult<Vec<Record>> {
        let table = self.model().table_name();
        let with_rows = SqlOverrides {
            select: Some(format!("DISTINCT {}.*", table)),
            ..overrides.clone()
        };
        let rows = self.execute(&with_rows, |b, sql| b.select_all(sql))?;
        Ok(rows
            .into_iter()
            .filter_map(|row| row.id().map(|id| Record::new(id, row)))
            .collect())
    }

    // ----------------------------------------------------------------
    //  Result cache
    // ----------------------------------------------------------------

    /// Ordered ids of every match. Executes once, then reads the cache.
    pub fn result_ids(&mut self) -> QueryResult<Vec<i64>> {
        if let Some(ids) = &self.result_ids {
            self.engine.metrics().increment_cache_hits();
            return Ok(ids.clone());
        }
        let ids = self.select_ids(&SqlOverrides::new())?;
        self.result_ids = Some(ids.clone());
        Ok(ids)
    }

    /// Every match, hydrated.
    pub fn results(&mut self) -> QueryResult<Vec<Record>> {
        let ids = self.result_ids()?;
        self.instantiate(&ids, &[])
    }

    pub fn num_results(&mut self) -> QueryResult<usize> {
        Ok(self.result_ids()?.len())
    }

    /// Position of `id` in the results.
    pub fn index_of(&mut self, id: i64) -> QueryResult<Option<usize>> {
        Ok(self.result_ids()?.iter().position(|x| *x == id))
    }

    /// Seed the id cache; later reads do not execute.
    pub fn set_result_ids(&mut self, ids: Vec<i64>) {
        self.result_ids = Some(ids);
    }

    /// Seed both the id cache and the record cache.
    pub fn set_results(&mut self, records: Vec<Record>) {
        self.result_ids = Some(records.iter().map(|r| r.id).collect());
        for record in records {
            self.records.insert(record.id, record);
        }
    }

    /// Forget every memoized value.
    pub fn clear_cache(&mut self) {
        self.result_ids = None;
        self.records.clear();
    }

    /// Records for `ids`, in the given order. Only ids missing from the
    /// cache are fetched, and `include` associations are loaded for those
    /// fresh records only. Ids with no row are skipped.
    pub fn instantiate(&mut self, ids: &[i64], include: &[&str]) -> QueryResult<Vec<Record>> {
        let mut missing: Vec<i64> = ids
            .iter()
            .copied()
            .filter(|id| !self.records.contains_key(id))
            .collect();
        missing.sort_unstable();
        missing.dedup();

        if !missing.is_empty() {
            let model = self.model();
            let table = model.table_name();
            let mut clauses = ClauseSet::new();
            clauses.add_where(format!("{}.id IN ({})", table, clean_id_set(&missing)));
            let overrides = SqlOverrides::new()
                .select(format!("DISTINCT {}.*", table))
                .order("");
            let sql = clauses.to_sql(model, &overrides)?;
            let rows = run(self, &sql, |b, sql| b.select_all(sql))?;
            let mut fresh: Vec<Record> = rows
                .into_iter()
                .filter_map(|row| row.id().map(|id| Record::new(id, row)))
                .collect();
            for association in include {
                self.eager_load(&mut fresh, association)?;
            }
            for record in fresh {
                self.records.insert(record.id, record);
            }
        }

        Ok(ids
            .iter()
            .filter_map(|id| self.records.get(id).cloned())
            .collect())
    }

    /// Load one association for `records` with a single statement.
    fn eager_load(&self, records: &mut [Record], association: &str) -> QueryResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        let model = self.model();
        let table = model.table_name();
        let ids: Vec<i64> = records.iter().map(|r| r.id).collect();

        // (owner column on the associated row, key read from our row)
        let (condition, link) = if let Some(JoinColumn::Key(column)) = JoinGraph::edge(table, association) {
            let keys: Vec<i64> = records
                .iter()
                .filter_map(|r| r.get(column).and_then(value_as_i64))
                .collect();
            (
                format!("{}.id IN ({})", association, clean_id_set(&keys)),
                Link::BelongsTo(column),
            )
        } else {
            match JoinGraph::edge(association, table) {
                Some(JoinColumn::Key(column)) => (
                    format!("{}.{} IN ({})", association, column, clean_id_set(&ids)),
                    Link::HasMany(column.to_string()),
                ),
                Some(JoinColumn::Polymorphic(prefix)) => (
                    format!(
                        "{a}.{p}_id IN ({ids}) AND {a}.{p}_type = '{m}'",
                        a = association,
                        p = prefix,
                        ids = clean_id_set(&ids),
                        m = model.as_str()
                    ),
                    Link::HasMany(format!("{}_id", prefix)),
                ),
                None => {
                    return Err(JoinError::UnknownEdge {
                        from: table.to_string(),
                        to: association.to_string(),
                    }
                    .into())
                }
            }
        };

        let sql = format!("SELECT {a}.* FROM `{a}` WHERE {c}", a = association, c = condition);
        let rows = run(self, &sql, |b, sql| b.select_all(sql))?;

        for record in records.iter_mut() {
            let matched: Vec<Row> = match &link {
                Link::BelongsTo(column) => {
                    let key = record.get(column).and_then(value_as_i64);
                    rows.iter().filter(|row| key.is_some() && row.id() == key).cloned().collect()
                }
                Link::HasMany(column) => rows
                    .iter()
                    .filter(|row| row.get(column).and_then(value_as_i64) == Some(record.id))
                    .cloned()
                    .collect(),
            };
            record.associations.insert(association.to_string(), matched);
        }
        Ok(())
    }
}

enum Link {
    /// Our row holds the associated id in this column
    BelongsTo(&'static str),
    /// The associated rows point back at us through this column
    HasMany(String),
}

/// Whether `model` can eager-load `association` directly.
pub fn can_include(model: ModelKind, association: &str) -> bool {
    let table = model.table_name();
    matches!(JoinGraph::edge(table, association), Some(JoinColumn::Key(_)))
        || JoinGraph::edge(association, table).is_some()
}
