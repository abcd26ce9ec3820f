//! In-memory persisted-query store

use std::sync::RwLock;

use chrono::{DateTime, Utc};

use super::errors::{StoreError, StoreResult};
use super::{CleanupPolicy, PersistedQuery, QueryStore};
use crate::schema::ModelKind;

#[derive(Debug, Default)]
struct Inner {
    records: Vec<PersistedQuery>,
    next_id: u64,
}

/// Process-local store. Find-or-create runs under one write lock.
#[derive(Debug, Default)]
pub struct MemQueryStore {
    inner: RwLock<Inner>,
}

impl MemQueryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl QueryStore for MemQueryStore {
    fn find_or_create(
        &self,
        model: ModelKind,
        flavor: &str,
        descriptor: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<(PersistedQuery, bool)> {
        let mut inner = self.inner.write().map_err(|_| StoreError::LockPoisoned)?;
        if let Some(existing) = inner.records.iter().find(|r| r.descriptor == descriptor) {
            return Ok((existing.clone(), false));
        }
        inner.next_id += 1;
        let record = PersistedQuery::new(inner.next_id, model, flavor, descriptor, now);
        inner.records.push(record.clone());
        Ok((record, true))
    }

    fn find(&self, id: u64) -> StoreResult<Option<PersistedQuery>> {
        let inner = self.inner.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(inner.records.iter().find(|r| r.id == id).cloned())
    }

    fn find_by_descriptor(&self, descriptor: &str) -> StoreResult<Option<PersistedQuery>> {
        let inner = self.inner.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(inner.records.iter().find(|r| r.descriptor == descriptor).cloned())
    }

    fn touch(&self, id: u64, now: DateTime<Utc>) -> StoreResult<PersistedQuery> {
        let mut inner = self.inner.write().map_err(|_| StoreError::LockPoisoned)?;
        let record = inner
            .records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(StoreError::NotFound(id))?;
        record.touch(now);
        Ok(record.clone())
    }

    fn cleanup(&self, policy: &CleanupPolicy, now: DateTime<Utc>) -> StoreResult<usize> {
        let mut inner = self.inner.write().map_err(|_| StoreError::LockPoisoned)?;
        let before = inner.records.len();
        inner.records.retain(|r| !policy.is_stale(r, now));
        Ok(before - inner.records.len())
    }

    fn count(&self) -> StoreResult<usize> {
        let inner = self.inner.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(inner.records.len())
    }

    fn insert(&self, record: PersistedQuery) -> StoreResult<()> {
        let mut inner = self.inner.write().map_err(|_| StoreError::LockPoisoned)?;
        if inner
            .records
            .iter()
            .any(|r| r.id == record.id || r.descriptor == record.descriptor)
        {
            return Err(StoreError::AlreadyExists(record.id));
        }
        inner.next_id = inner.next_id.max(record.id);
        inner.records.push(record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_find_or_create_dedups() {
        let store = MemQueryStore::new();
        let now = Utc::now();
        let (a, created_a) = store.find_or_create(ModelKind::Name, "all", "{\"a\":1}", now).unwrap();
        let (b, created_b) = store.find_or_create(ModelKind::Name, "all", "{\"a\":1}", now).unwrap();
        let (c, _) = store.find_or_create(ModelKind::Name, "all", "{\"a\":2}", now).unwrap();

        assert!(created_a);
        assert!(!created_b);
        assert_eq!(a.id, b.id);
        assert_ne!(a.id, c.id);
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn test_concurrent_find_or_create() {
        let store = Arc::new(MemQueryStore::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    store
                        .find_or_create(ModelKind::Observation, "all", "same", Utc::now())
                        .unwrap()
                        .0
                        .id
                })
            })
            .collect();
        let ids: Vec<u64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(ids.iter().all(|id| *id == ids[0]));
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_touch_and_missing() {
        let store = MemQueryStore::new();
        let now = Utc::now();
        let (r, _) = store.find_or_create(ModelKind::User, "all", "u", now).unwrap();
        let touched = store.touch(r.id, now).unwrap();
        assert_eq!(touched.access_count, 1);
        assert_eq!(store.touch(99, now).unwrap_err(), StoreError::NotFound(99));
    }

    #[test]
    fn test_insert_rejects_duplicates() {
        let store = MemQueryStore::new();
        let now = Utc::now();
        store
            .insert(PersistedQuery::new(5, ModelKind::Name, "all", "x", now))
            .unwrap();
        assert!(store
            .insert(PersistedQuery::new(6, ModelKind::Name, "all", "x", now))
            .is_err());
        let (next, _) = store.find_or_create(ModelKind::Name, "all", "y", now).unwrap();
        assert_eq!(next.id, 6);
    }

    #[test]
    fn test_created_ids_follow_inserted_ones() {
        let store = MemQueryStore::new();
        let now = Utc::now();
        store
            .insert(PersistedQuery::new(40, ModelKind::Name, "all", "imported", now))
            .unwrap();
        let (created, _) = store.find_or_create(ModelKind::Name, "all", "new", now).unwrap();
        assert_eq!(created.id, 41);
        assert!(store
            .insert(PersistedQuery::new(41, ModelKind::Name, "all", "other", now))
            .is_err());
    }
}
