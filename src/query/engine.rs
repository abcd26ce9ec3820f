//! Query engine
//!
//! The engine owns the collaborators every query needs: the SQL backend,
//! the persisted query store, the directory used for existence checks and
//! name lookups, the configuration and the counters. It is cheap to clone;
//! every [`Query`] carries a handle to the engine that built it.
//!
//! Lookup is transient. Saving interns the canonical descriptor in the
//! store, so two lookups with equivalent arguments share one token.

use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use super::args::QueryArgs;
use super::descriptor::QueryDescriptor;
use super::errors::{QueryError, QueryResult};
use super::query::Query;
use crate::backend::SqlBackend;
use crate::config::EngineConfig;
use crate::observability::{log_event_with_fields, Event, MetricsRegistry};
use crate::schema::{Directory, ModelKind, SqlDirectory};
use crate::store::{FileQueryStore, MemQueryStore, QueryStore};

struct EngineInner {
    backend: Arc<dyn SqlBackend>,
    store: Arc<dyn QueryStore>,
    directory: Arc<dyn Directory>,
    config: EngineConfig,
    metrics: MetricsRegistry,
    last_cleanup: Mutex<Option<DateTime<Utc>>>,
}

#[derive(Clone)]
pub struct QueryEngine {
    inner: Arc<EngineInner>,
}

impl QueryEngine {
    pub fn new(
        backend: Arc<dyn SqlBackend>,
        store: Arc<dyn QueryStore>,
        directory: Arc<dyn Directory>,
        config: EngineConfig,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                backend,
                store,
                directory,
                config,
                metrics: MetricsRegistry::new(),
                last_cleanup: Mutex::new(None),
            }),
        }
    }

    /// Engine over `backend`, with the store the configuration names and a
    /// directory that reads through the same backend.
    pub fn from_config(config: EngineConfig, backend: Arc<dyn SqlBackend>) -> Self {
        let store: Arc<dyn QueryStore> = match &config.store_path {
            Some(path) => Arc::new(FileQueryStore::new(path)),
            None => Arc::new(MemQueryStore::new()),
        };
        let directory = Arc::new(SqlDirectory::new(backend.clone()));
        Self::new(backend, store, directory, config)
    }

    /// Engine with an in-memory store and default configuration.
    pub fn in_memory(backend: Arc<dyn SqlBackend>, directory: Arc<dyn Directory>) -> Self {
        Self::new(
            backend,
            Arc::new(MemQueryStore::new()),
            directory,
            EngineConfig::default(),
        )
    }

    pub fn backend(&self) -> &Arc<dyn SqlBackend> {
        &self.inner.backend
    }

    pub fn store(&self) -> &Arc<dyn QueryStore> {
        &self.inner.store
    }

    pub fn directory(&self) -> &Arc<dyn Directory> {
        &self.inner.directory
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn metrics(&self) -> &MetricsRegistry {
        &self.inner.metrics
    }

    /// Validate `args` against the model and flavor and build a transient
    /// query. Nothing is written to the store.
    pub fn lookup(&self, model: ModelKind, flavor: &str, args: QueryArgs) -> QueryResult<Query> {
        self.inner.metrics.increment_lookups();
        let built = QueryDescriptor::build(model, flavor, &args)
            .and_then(|descriptor| Query::new(self.clone(), descriptor));
        match built {
            Ok(query) => {
                log_event_with_fields(
                    Event::QueryLookup,
                    &[("model", model.as_str()), ("flavor", query.flavor().as_str())],
                );
                Ok(query)
            }
            Err(e) => {
                log_event_with_fields(
                    Event::QueryRejected,
                    &[
                        ("model", model.as_str()),
                        ("flavor", flavor),
                        ("code", e.code().code()),
                        ("message", e.message()),
                    ],
                );
                Err(e)
            }
        }
    }

    /// Like [`lookup`](Self::lookup), then intern the query in the store.
    /// Equivalent arguments always yield the same token.
    pub fn lookup_and_save(&self, model: ModelKind, flavor: &str, args: QueryArgs) -> QueryResult<Query> {
        let mut query = self.lookup(model, flavor, args)?;
        let now = Utc::now();
        self.maybe_cleanup(now);

        let blob = query.serialize()?;
        let (record, created) =
            self.inner
                .store
                .find_or_create(query.model(), query.flavor().as_str(), &blob, now)?;
        let id = record.id.to_string();
        if created {
            self.inner.metrics.increment_saves();
            log_event_with_fields(
                Event::QuerySaved,
                &[("model", model.as_str()), ("flavor", query.flavor().as_str()), ("id", &id)],
            );
        } else {
            self.inner.metrics.increment_dedup_hits();
        }
        query.record_id = Some(record.id);
        Ok(query)
    }

    /// Re-hydrate a saved query from its token and record the use.
    pub fn find_saved(&self, id: u64) -> QueryResult<Query> {
        self.inner
            .store
            .find(id)?
            .ok_or_else(|| QueryError::not_found("id", format!("Query #{}", id)))?;
        let record = self.inner.store.touch(id, Utc::now())?;
        let query = self.hydrate(id, &record.descriptor)?;
        log_event_with_fields(
            Event::QueryResumed,
            &[("id", &id.to_string()), ("access_count", &record.access_count.to_string())],
        );
        Ok(query)
    }

    /// Re-hydrate without recording a use. Used for outer queries, which the
    /// caller never asked for directly.
    pub(crate) fn load_saved(&self, id: u64) -> QueryResult<Query> {
        let record = self
            .inner
            .store
            .find(id)?
            .ok_or_else(|| QueryError::not_found("outer", format!("Query #{}", id)))?;
        self.hydrate(id, &record.descriptor)
    }

    fn hydrate(&self, id: u64, blob: &str) -> QueryResult<Query> {
        let descriptor = QueryDescriptor::from_blob(blob)?;
        let mut query = Query::new(self.clone(), descriptor)?;
        query.record_id = Some(id);
        Ok(query)
    }

    /// Delete stale persisted queries now.
    pub fn cleanup(&self, now: DateTime<Utc>) -> QueryResult<usize> {
        let deleted = self
            .inner
            .store
            .cleanup(&self.inner.config.cleanup_policy(), now)?;
        self.inner.metrics.add_cleanup_deleted(deleted as u64);
        log_event_with_fields(Event::StoreCleanup, &[("deleted", &deleted.to_string())]);
        if let Ok(mut last) = self.inner.last_cleanup.lock() {
            *last = Some(now);
        }
        Ok(deleted)
    }

    /// Run cleanup when the configured interval has passed since the last
    /// run. Failures are logged and otherwise ignored; saving must not fail
    /// because housekeeping did.
    fn maybe_cleanup(&self, now: DateTime<Utc>) {
        let due = {
            let last = match self.inner.last_cleanup.lock() {
                Ok(guard) => *guard,
                Err(poisoned) => *poisoned.into_inner(),
            };
            last.map_or(true, |at| now - at >= self.inner.config.cleanup_interval())
        };
        if due {
            if let Err(e) = self.cleanup(now) {
                log_event_with_fields(
                    Event::QueryFailed,
                    &[("operation", "cleanup"), ("message", e.message())],
                );
            }
        }
    }
}

impl fmt::Debug for QueryEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryEngine")
            .field("store", &self.inner.store)
            .field("config", &self.inner.config)
            .finish()
    }
}

#[cfg(test)]
impl QueryEngine {
    pub(crate) fn for_tests() -> Self {
        Self::for_tests_with(Arc::new(crate::backend::ScriptedBackend::new()))
    }

    pub(crate) fn for_tests_with(backend: Arc<dyn SqlBackend>) -> Self {
        Self::in_memory(backend, Arc::new(crate::schema::MemDirectory::new()))
    }

    pub(crate) fn for_tests_with_directory(
        backend: Arc<dyn SqlBackend>,
        directory: crate::schema::MemDirectory,
    ) -> Self {
        Self::in_memory(backend, Arc::new(directory))
    }
}
