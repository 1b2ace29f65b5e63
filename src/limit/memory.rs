//! In-memory log store adapter.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;

use super::entry::RequestLogEntry;
use super::predicate::Predicate;
use super::store::LogStore;
use crate::error::Result;

/// An in-process [`LogStore`] keyed by table name.
///
/// Used by the test suite and by embedders that do not need persistence
/// across restarts. All reads and writes go through a single lock, so this
/// adapter serializes the evaluator's check-then-write sequence and cannot
/// over-admit under concurrency; external stores make no such promise.
pub struct MemoryStore {
    active_table: String,
    tables: RwLock<HashMap<String, Vec<RequestLogEntry>>>,
}

impl MemoryStore {
    /// Create a store whose active table has the given name.
    pub fn new(active_table: impl Into<String>) -> Self {
        Self {
            active_table: active_table.into(),
            tables: RwLock::new(HashMap::new()),
        }
    }

    /// Number of entries in the named table.
    pub fn table_len(&self, table: &str) -> usize {
        self.tables
            .read()
            .get(table)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Snapshot of the named table's entries.
    pub fn table_entries(&self, table: &str) -> Vec<RequestLogEntry> {
        self.tables.read().get(table).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl LogStore for MemoryStore {
    async fn count(&self, predicate: &Predicate) -> Result<u64> {
        let tables = self.tables.read();
        let entries = tables.get(&self.active_table);
        Ok(entries
            .map(|entries| entries.iter().filter(|e| predicate.matches(e)).count() as u64)
            .unwrap_or(0))
    }

    async fn latest_blocked_till(&self, predicate: &Predicate) -> Result<Option<DateTime<Utc>>> {
        let tables = self.tables.read();
        let entries = tables.get(&self.active_table);
        Ok(entries.and_then(|entries| {
            entries
                .iter()
                .filter(|e| predicate.matches(e))
                .filter_map(|e| e.blocked_till)
                .max()
        }))
    }

    async fn insert(&self, entry: RequestLogEntry) -> Result<()> {
        let mut tables = self.tables.write();
        tables
            .entry(self.active_table.clone())
            .or_default()
            .push(entry);
        Ok(())
    }

    async fn select_where(&self, predicate: &Predicate) -> Result<Vec<RequestLogEntry>> {
        let tables = self.tables.read();
        let entries = tables.get(&self.active_table);
        Ok(entries
            .map(|entries| {
                entries
                    .iter()
                    .filter(|e| predicate.matches(e))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn batch_insert(&self, table: &str, entries: &[RequestLogEntry]) -> Result<()> {
        let mut tables = self.tables.write();
        let rows = tables.entry(table.to_string()).or_default();
        for entry in entries {
            // Replaying an interrupted sweep re-inserts already-archived
            // entries; replace by id instead of duplicating.
            match rows.iter_mut().find(|row| row.id == entry.id) {
                Some(row) => *row = entry.clone(),
                None => rows.push(entry.clone()),
            }
        }
        Ok(())
    }

    async fn delete_where(&self, predicate: &Predicate) -> Result<()> {
        let mut tables = self.tables.write();
        if let Some(entries) = tables.get_mut(&self.active_table) {
            entries.retain(|e| !predicate.matches(e));
        }
        Ok(())
    }
}
