//! JSON file-backed persisted-query store
//!
//! The whole table lives in one JSON file, together with the last id
//! handed out so ids are never reused after cleanup. Every mutation holds
//! a `<file>.lock` sidecar created with exclusive-create, so separate
//! processes sharing the file serialize their load-modify-rename cycles.
//! The new table is written to a temp file and renamed over the original,
//! so readers never see a half-written table.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration as StdDuration, Instant, SystemTime};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::{StoreError, StoreResult};
use super::{CleanupPolicy, PersistedQuery, QueryStore};
use crate::schema::ModelKind;

/// How long a writer waits for another to release the lock.
const LOCK_TIMEOUT: StdDuration = StdDuration::from_secs(10);
const LOCK_RETRY: StdDuration = StdDuration::from_millis(5);
/// A lock file this old was left by a writer that died holding it.
const STALE_LOCK: StdDuration = StdDuration::from_secs(30);

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    last_id: u64,
    queries: Vec<PersistedQuery>,
}

impl StoreFile {
    fn allocate_id(&mut self) -> u64 {
        let highest = self.queries.iter().map(|r| r.id).max().unwrap_or(0);
        self.last_id = self.last_id.max(highest) + 1;
        self.last_id
    }
}

/// Exclusive hold on the sidecar lock file; released on drop.
#[derive(Debug)]
struct FileLock {
    path: PathBuf,
}

impl FileLock {
    fn acquire(path: &Path) -> StoreResult<Self> {
        let deadline = Instant::now() + LOCK_TIMEOUT;
        loop {
            match OpenOptions::new().write(true).create_new(true).open(path) {
                Ok(_) => {
                    return Ok(Self {
                        path: path.to_path_buf(),
                    })
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    if Self::is_stale(path) {
                        let _ = fs::remove_file(path);
                        continue;
                    }
                    if Instant::now() >= deadline {
                        return Err(StoreError::Io(format!(
                            "Timed out waiting for query store lock {}",
                            path.display()
                        )));
                    }
                    thread::sleep(LOCK_RETRY);
                }
                Err(e) => {
                    return Err(StoreError::Io(format!(
                        "Failed to create query store lock: {}",
                        e
                    )))
                }
            }
        }
    }

    fn is_stale(path: &Path) -> bool {
        fs::metadata(path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok())
            .map_or(false, |age| age > STALE_LOCK)
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

#[derive(Debug)]
pub struct FileQueryStore {
    path: PathBuf,
    lock_path: PathBuf,
    lock: Mutex<()>,
}

impl FileQueryStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let mut lock_path = path.clone().into_os_string();
        lock_path.push(".lock");
        Self {
            path,
            lock_path: PathBuf::from(lock_path),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    /// Run `f` on the loaded table with both the in-process and the
    /// cross-process lock held.
    fn with_table<T>(&self, f: impl FnOnce(&mut StoreFile) -> StoreResult<(T, bool)>) -> StoreResult<T> {
        let _guard = self.lock.lock().map_err(|_| StoreError::LockPoisoned)?;
        fs::create_dir_all(self.dir())
            .map_err(|e| StoreError::Io(format!("Failed to create query store directory: {}", e)))?;
        let _file_lock = FileLock::acquire(&self.lock_path)?;

        let mut table = self.load_table()?;
        let (value, dirty) = f(&mut table)?;
        if dirty {
            self.save_table(&table)?;
        }
        Ok(value)
    }

    fn read_table(&self) -> StoreResult<StoreFile> {
        let _guard = self.lock.lock().map_err(|_| StoreError::LockPoisoned)?;
        self.load_table()
    }

    fn load_table(&self) -> StoreResult<StoreFile> {
        if !self.path.exists() {
            return Ok(StoreFile::default());
        }

        let content = fs::read_to_string(&self.path)
            .map_err(|e| StoreError::Io(format!("Failed to read query store: {}", e)))?;

        if content.trim().is_empty() {
            return Ok(StoreFile::default());
        }

        serde_json::from_str(&content)
            .map_err(|e| StoreError::Corrupt(format!("Failed to parse query store: {}", e)))
    }

    fn save_table(&self, table: &StoreFile) -> StoreResult<()> {
        let content = serde_json::to_string_pretty(table)
            .map_err(|e| StoreError::Io(format!("Failed to serialize queries: {}", e)))?;

        let tmp = self.dir().join(format!(".queries-{}.tmp", Uuid::new_v4()));
        fs::write(&tmp, content)
            .map_err(|e| StoreError::Io(format!("Failed to write query store: {}", e)))?;
        fs::rename(&tmp, &self.path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            StoreError::Io(format!("Failed to replace query store: {}", e))
        })
    }
}

impl QueryStore for FileQueryStore {
    fn find_or_create(
        &self,
        model: ModelKind,
        flavor: &str,
        descriptor: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<(PersistedQuery, bool)> {
        self.with_table(|table| {
            if let Some(existing) = table.queries.iter().find(|r| r.descriptor == descriptor) {
                return Ok(((existing.clone(), false), false));
            }
            let id = table.allocate_id();
            let record = PersistedQuery::new(id, model, flavor, descriptor, now);
            table.queries.push(record.clone());
            Ok(((record, true), true))
        })
    }

    fn find(&self, id: u64) -> StoreResult<Option<PersistedQuery>> {
        Ok(self.read_table()?.queries.into_iter().find(|r| r.id == id))
    }

    fn find_by_descriptor(&self, descriptor: &str) -> StoreResult<Option<PersistedQuery>> {
        Ok(self
            .read_table()?
            .queries
            .into_iter()
            .find(|r| r.descriptor == descriptor))
    }

    fn touch(&self, id: u64, now: DateTime<Utc>) -> StoreResult<PersistedQuery> {
        self.with_table(|table| {
            let record = table
                .queries
                .iter_mut()
                .find(|r| r.id == id)
                .ok_or(StoreError::NotFound(id))?;
            record.touch(now);
            Ok((record.clone(), true))
        })
    }

    fn cleanup(&self, policy: &CleanupPolicy, now: DateTime<Utc>) -> StoreResult<usize> {
        self.with_table(|table| {
            let before = table.queries.len();
            table.queries.retain(|r| !policy.is_stale(r, now));
            let deleted = before - table.queries.len();
            Ok((deleted, deleted > 0))
        })
    }

    fn count(&self) -> StoreResult<usize> {
        Ok(self.read_table()?.queries.len())
    }

    fn insert(&self, record: PersistedQuery) -> StoreResult<()> {
        self.with_table(|table| {
            if table
                .queries
                .iter()
                .any(|r| r.id == record.id || r.descriptor == record.descriptor)
            {
                return Err(StoreError::AlreadyExists(record.id));
            }
            table.last_id = table.last_id.max(record.id);
            table.queries.push(record);
            Ok(((), true))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("queries.json");
        let now = Utc::now();

        let id = {
            let store = FileQueryStore::new(&path);
            store
                .find_or_create(ModelKind::Observation, "by_user", "{\"user\":1}", now)
                .unwrap()
                .0
                .id
        };

        let reopened = FileQueryStore::new(&path);
        let (again, created) = reopened
            .find_or_create(ModelKind::Observation, "by_user", "{\"user\":1}", now)
            .unwrap();
        assert!(!created);
        assert_eq!(again.id, id);
        assert_eq!(reopened.find(id).unwrap().unwrap().flavor, "by_user");
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let dir = TempDir::new().unwrap();
        let store = FileQueryStore::new(dir.path().join("queries.json"));
        let now = Utc::now();
        store.find_or_create(ModelKind::Name, "all", "a", now).unwrap();
        store.find_or_create(ModelKind::Name, "all", "b", now).unwrap();

        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["queries.json".to_string()]);
    }

    #[test]
    fn test_cleanup_rewrites_file() {
        let dir = TempDir::new().unwrap();
        let store = FileQueryStore::new(dir.path().join("queries.json"));
        let now = Utc::now();
        store
            .insert(PersistedQuery::new(1, ModelKind::Name, "all", "old", now - Duration::hours(2)))
            .unwrap();
        store.find_or_create(ModelKind::Name, "all", "fresh", now).unwrap();

        assert_eq!(store.cleanup(&CleanupPolicy::default(), now).unwrap(), 1);
        assert_eq!(store.count().unwrap(), 1);
        assert!(store.find_by_descriptor("old").unwrap().is_none());
    }

    #[test]
    fn test_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("queries.json");
        fs::write(&path, "not json").unwrap();
        let store = FileQueryStore::new(&path);
        assert!(matches!(store.count().unwrap_err(), StoreError::Corrupt(_)));
    }

    #[test]
    fn test_ids_not_reused_after_cleanup() {
        let dir = TempDir::new().unwrap();
        let store = FileQueryStore::new(dir.path().join("queries.json"));
        let old = Utc::now() - Duration::hours(2);
        let (a, _) = store.find_or_create(ModelKind::Name, "all", "a", old).unwrap();
        let (b, _) = store.find_or_create(ModelKind::Name, "all", "b", old).unwrap();
        assert_eq!(store.cleanup(&CleanupPolicy::default(), Utc::now()).unwrap(), 2);
        assert_eq!(store.count().unwrap(), 0);

        let (c, created) = store.find_or_create(ModelKind::Name, "all", "c", Utc::now()).unwrap();
        assert!(created);
        assert!(c.id > a.id && c.id > b.id);
        assert!(store.find(a.id).unwrap().is_none());
    }

    #[test]
    fn test_stale_lock_is_broken() {
        let dir = TempDir::new().unwrap();
        let store = FileQueryStore::new(dir.path().join("queries.json"));
        let lock = fs::File::create(dir.path().join("queries.json.lock")).unwrap();
        lock.set_modified(SystemTime::now() - StdDuration::from_secs(120)).unwrap();
        drop(lock);

        store.find_or_create(ModelKind::Name, "all", "a", Utc::now()).unwrap();
        assert!(!dir.path().join("queries.json.lock").exists());
    }
}
