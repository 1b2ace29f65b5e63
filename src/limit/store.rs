//! Log store trait for abstracting the persistence backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::entry::RequestLogEntry;
use super::predicate::Predicate;
use crate::error::Result;

/// Append-only store of request log entries.
///
/// Adapters translate [`Predicate`]s into their own query language; whatever
/// that language is, the selected rows must be exactly those
/// [`Predicate::matches`] accepts. The core performs no retries: any failure
/// surfaces as a `Storage` error to the caller.
#[async_trait]
pub trait LogStore: Send + Sync {
    /// Count active entries matching the predicate.
    async fn count(&self, predicate: &Predicate) -> Result<u64>;

    /// The latest `blocked_till` among active entries matching the
    /// predicate, or `None` if nothing matches.
    ///
    /// "Latest" means maximum: when several blocks match, the one expiring
    /// last wins. Adapters must not rely on row order.
    async fn latest_blocked_till(&self, predicate: &Predicate) -> Result<Option<DateTime<Utc>>>;

    /// Append one entry to the active table.
    async fn insert(&self, entry: RequestLogEntry) -> Result<()>;

    /// Select active entries matching the predicate.
    async fn select_where(&self, predicate: &Predicate) -> Result<Vec<RequestLogEntry>>;

    /// Append a batch of entries to the named table.
    ///
    /// Re-inserting an entry that is already present (same id) must be
    /// tolerated, so that an interrupted archive sweep can be re-run.
    async fn batch_insert(&self, table: &str, entries: &[RequestLogEntry]) -> Result<()>;

    /// Delete active entries matching the predicate.
    async fn delete_where(&self, predicate: &Predicate) -> Result<()>;
}
