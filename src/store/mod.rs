//! # Persisted Query Store
//!
//! Durable dedup table for query descriptors. Each distinct normalized
//! descriptor is stored once and identified by an integer id, which callers
//! carry across requests as a query token.
//!
//! Implementations must make `find_or_create` atomic: two callers racing on
//! the same descriptor get the same record.

mod errors;
mod file;
mod memory;

pub use errors::{StoreError, StoreResult};
pub use file::FileQueryStore;
pub use memory::MemQueryStore;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::schema::ModelKind;

/// One interned descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedQuery {
    pub id: u64,
    pub model: ModelKind,
    pub flavor: String,
    /// Serialized normalized descriptor; the dedup key.
    pub descriptor: String,
    pub access_count: u64,
    pub last_used_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl PersistedQuery {
    pub fn new(id: u64, model: ModelKind, flavor: &str, descriptor: &str, now: DateTime<Utc>) -> Self {
        Self {
            id,
            model,
            flavor: flavor.to_string(),
            descriptor: descriptor.to_string(),
            access_count: 0,
            last_used_at: now,
            created_at: now,
        }
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.access_count += 1;
        self.last_used_at = now;
    }
}

/// Which records `cleanup` deletes.
///
/// Never-resumed records expire after `unused_max_age`; records that have
/// been resumed at least once expire after `used_max_age`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanupPolicy {
    pub unused_max_age: Duration,
    pub used_max_age: Duration,
}

impl CleanupPolicy {
    pub fn new(unused_max_age: Duration, used_max_age: Duration) -> Self {
        Self {
            unused_max_age,
            used_max_age,
        }
    }

    pub fn is_stale(&self, record: &PersistedQuery, now: DateTime<Utc>) -> bool {
        let max_age = if record.access_count == 0 {
            self.unused_max_age
        } else {
            self.used_max_age
        };
        record.last_used_at < now - max_age
    }
}

impl Default for CleanupPolicy {
    fn default() -> Self {
        Self::new(Duration::hours(1), Duration::days(1))
    }
}

/// Storage for persisted queries.
pub trait QueryStore: Send + Sync + std::fmt::Debug {
    /// Return the record for `descriptor`, creating it if needed. The flag is
    /// true when a new record was created.
    fn find_or_create(
        &self,
        model: ModelKind,
        flavor: &str,
        descriptor: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<(PersistedQuery, bool)>;

    fn find(&self, id: u64) -> StoreResult<Option<PersistedQuery>>;

    fn find_by_descriptor(&self, descriptor: &str) -> StoreResult<Option<PersistedQuery>>;

    /// Record one use: bumps `access_count` and `last_used_at`.
    fn touch(&self, id: u64, now: DateTime<Utc>) -> StoreResult<PersistedQuery>;

    /// Delete stale records and return how many went.
    fn cleanup(&self, policy: &CleanupPolicy, now: DateTime<Utc>) -> StoreResult<usize>;

    fn count(&self) -> StoreResult<usize>;

    /// Insert a fully-formed record. Fails if the id or descriptor is taken.
    fn insert(&self, record: PersistedQuery) -> StoreResult<()>;
}
