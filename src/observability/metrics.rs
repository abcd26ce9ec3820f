//! Engine counters
//!
//! - Counters only, monotonic
//! - Reset only when the registry is created
//! - Thread-safe, lock-free

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Registry of operational counters owned by one engine.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    /// Transient queries built
    lookups: AtomicU64,
    /// Persisted queries created
    saves: AtomicU64,
    /// lookup_and_save calls answered by an existing record
    dedup_hits: AtomicU64,
    /// Statements sent to the backend
    executions: AtomicU64,
    /// Result reads answered from the memoized cache
    cache_hits: AtomicU64,
    /// Successful coercions
    coercions: AtomicU64,
    /// Coercion requests with no mapping
    coercions_unsupported: AtomicU64,
    /// Persisted queries removed by cleanup
    cleanup_deleted: AtomicU64,
    /// Patterns parsed into terms
    patterns_parsed: AtomicU64,
    /// Patterns rejected by the parser
    patterns_rejected: AtomicU64,
}

impl MetricsRegistry {
    /// Create a new registry with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_lookups(&self) {
        self.lookups.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_saves(&self) {
        self.saves.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_dedup_hits(&self) {
        self.dedup_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_executions(&self) {
        self.executions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_cache_hits(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_coercions(&self) {
        self.coercions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_coercions_unsupported(&self) {
        self.coercions_unsupported.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_cleanup_deleted(&self, n: u64) {
        self.cleanup_deleted.fetch_add(n, Ordering::Relaxed);
    }

    pub fn increment_patterns_parsed(&self) {
        self.patterns_parsed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_patterns_rejected(&self) {
        self.patterns_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Get all counters as a point-in-time snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            lookups: self.lookups.load(Ordering::Relaxed),
            saves: self.saves.load(Ordering::Relaxed),
            dedup_hits: self.dedup_hits.load(Ordering::Relaxed),
            executions: self.executions.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            coercions: self.coercions.load(Ordering::Relaxed),
            coercions_unsupported: self.coercions_unsupported.load(Ordering::Relaxed),
            cleanup_deleted: self.cleanup_deleted.load(Ordering::Relaxed),
            patterns_parsed: self.patterns_parsed.load(Ordering::Relaxed),
            patterns_rejected: self.patterns_rejected.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of all counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub lookups: u64,
    pub saves: u64,
    pub dedup_hits: u64,
    pub executions: u64,
    pub cache_hits: u64,
    pub coercions: u64,
    pub coercions_unsupported: u64,
    pub cleanup_deleted: u64,
    pub patterns_parsed: u64,
    pub patterns_rejected: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_registry_is_zero() {
        let metrics = MetricsRegistry::new();
        assert_eq!(metrics.snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_counters_increment() {
        let metrics = MetricsRegistry::new();
        metrics.increment_lookups();
        metrics.increment_lookups();
        metrics.increment_executions();
        metrics.add_cleanup_deleted(3);

        let snap = metrics.snapshot();
        assert_eq!(snap.lookups, 2);
        assert_eq!(snap.executions, 1);
        assert_eq!(snap.cleanup_deleted, 3);
        assert_eq!(snap.saves, 0);
    }

    #[test]
    fn test_snapshot_serializes() {
        let metrics = MetricsRegistry::new();
        metrics.increment_coercions();
        let json = serde_json::to_value(metrics.snapshot()).unwrap();
        assert_eq!(json["coercions"], 1);
        assert_eq!(json["dedup_hits"], 0);
    }
}
