//! Periodic log archiving.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info};

use super::predicate::Predicate;
use super::store::LogStore;
use crate::config::LimiterConfig;
use crate::error::Result;

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Entries copied into the history table.
    pub archived: usize,
    /// Batch inserts issued.
    pub batches: usize,
}

/// Relocates log entries older than the counting window from the active
/// table to the history table, keeping the active table small.
///
/// The sweep is a two-phase copy-then-delete, not a transactional move: a
/// crash after the inserts but before the delete leaves entries in both
/// tables (duplicated, never lost), and re-running the sweep is safe because
/// the store tolerates re-inserting already-archived entries. Intended to
/// run on an external schedule, possibly concurrent with evaluations.
pub struct Archiver {
    config: LimiterConfig,
    store: Arc<dyn LogStore>,
}

impl Archiver {
    pub fn new(config: LimiterConfig, store: Arc<dyn LogStore>) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, store })
    }

    /// Archive expired entries, using the current wall clock.
    pub async fn sweep(&self) -> Result<SweepReport> {
        self.sweep_at(Utc::now()).await
    }

    /// Archive entries created before `now - duration`.
    ///
    /// The delete reuses the cutoff computed here, never a fresh one:
    /// entries inserted while the copy phase runs must not match the delete.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        if !self.config.history_backup {
            return Ok(SweepReport::default());
        }

        let cutoff = now - Duration::minutes(self.config.duration);
        let expired = self
            .store
            .select_where(&Predicate::new().created_before(cutoff))
            .await?;

        if expired.is_empty() {
            debug!(cutoff = %cutoff, "Nothing to archive");
            return Ok(SweepReport::default());
        }

        let mut batches = 0;
        for chunk in expired.chunks(self.config.insert_chunk_size) {
            self.store
                .batch_insert(&self.config.history_table, chunk)
                .await?;
            batches += 1;
            debug!(batch = batches, rows = chunk.len(), "Archived batch");
        }

        self.store
            .delete_where(&Predicate::new().created_before(cutoff))
            .await?;

        info!(
            archived = expired.len(),
            batches = batches,
            cutoff = %cutoff,
            "Sweep complete"
        );
        Ok(SweepReport {
            archived: expired.len(),
            batches,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limit::entry::RequestLogEntry;
    use crate::limit::memory::MemoryStore;
    use std::collections::BTreeMap;

    fn entry(created_at: DateTime<Utc>) -> RequestLogEntry {
        RequestLogEntry::new(
            created_at,
            "/orders".to_string(),
            "203.0.113.9".to_string(),
            None,
            BTreeMap::new(),
            BTreeMap::new(),
        )
    }

    fn test_config(insert_chunk_size: usize) -> LimiterConfig {
        LimiterConfig {
            duration: 5,
            insert_chunk_size,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_sweep_moves_only_expired_entries() {
        let config = test_config(50);
        let store = Arc::new(MemoryStore::new(config.table.clone()));
        let t = Utc::now();

        store.insert(entry(t - Duration::minutes(10))).await.unwrap();
        store.insert(entry(t - Duration::minutes(6))).await.unwrap();
        store.insert(entry(t - Duration::minutes(1))).await.unwrap();

        let archiver = Archiver::new(config, store.clone()).unwrap();
        let report = archiver.sweep_at(t).await.unwrap();

        assert_eq!(report.archived, 2);
        assert_eq!(store.table_len("rate_limiter"), 1);
        assert_eq!(store.table_len("rate_limiter_history"), 2);
    }

    #[tokio::test]
    async fn test_sweep_batches_by_chunk_size() {
        let config = test_config(1);
        let store = Arc::new(MemoryStore::new(config.table.clone()));
        let t = Utc::now();

        store.insert(entry(t - Duration::minutes(10))).await.unwrap();
        store.insert(entry(t - Duration::minutes(6))).await.unwrap();
        store.insert(entry(t - Duration::minutes(1))).await.unwrap();

        let archiver = Archiver::new(config, store.clone()).unwrap();
        let report = archiver.sweep_at(t).await.unwrap();

        // Two expired entries with a chunk size of one: exactly two batches.
        assert_eq!(report.batches, 2);
        assert_eq!(report.archived, 2);
    }

    #[tokio::test]
    async fn test_sweep_noop_when_backup_disabled() {
        let config = LimiterConfig {
            history_backup: false,
            ..test_config(50)
        };
        let store = Arc::new(MemoryStore::new(config.table.clone()));
        let t = Utc::now();

        store.insert(entry(t - Duration::minutes(10))).await.unwrap();

        let archiver = Archiver::new(config, store.clone()).unwrap();
        let report = archiver.sweep_at(t).await.unwrap();

        assert_eq!(report, SweepReport::default());
        assert_eq!(store.table_len("rate_limiter"), 1);
        assert_eq!(store.table_len("rate_limiter_history"), 0);
    }

    #[tokio::test]
    async fn test_sweep_noop_when_nothing_expired() {
        let config = test_config(50);
        let store = Arc::new(MemoryStore::new(config.table.clone()));
        let t = Utc::now();

        store.insert(entry(t - Duration::minutes(1))).await.unwrap();

        let archiver = Archiver::new(config, store.clone()).unwrap();
        let report = archiver.sweep_at(t).await.unwrap();

        assert_eq!(report.archived, 0);
        assert_eq!(store.table_len("rate_limiter"), 1);
    }

    #[tokio::test]
    async fn test_rerunning_sweep_with_same_cutoff_is_idempotent() {
        let config = test_config(50);
        let store = Arc::new(MemoryStore::new(config.table.clone()));
        let t = Utc::now();
        let old = entry(t - Duration::minutes(10));

        // Simulate a crash between copy and delete: the entry is already in
        // history but still active.
        store.insert(old.clone()).await.unwrap();
        store
            .batch_insert("rate_limiter_history", &[old])
            .await
            .unwrap();

        let archiver = Archiver::new(config, store.clone()).unwrap();
        archiver.sweep_at(t).await.unwrap();

        assert_eq!(store.table_len("rate_limiter"), 0);
        assert_eq!(store.table_len("rate_limiter_history"), 1);
    }

    #[tokio::test]
    async fn test_sweep_preserves_entry_contents() {
        let config = test_config(50);
        let store = Arc::new(MemoryStore::new(config.table.clone()));
        let t = Utc::now();
        let old = entry(t - Duration::minutes(10));
        let id = old.id;

        store.insert(old).await.unwrap();
        let archiver = Archiver::new(config, store.clone()).unwrap();
        archiver.sweep_at(t).await.unwrap();

        let history = store.table_entries("rate_limiter_history");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, id);
        assert_eq!(history[0].request_url, "/orders");
    }
}
