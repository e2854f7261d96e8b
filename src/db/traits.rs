// ResultStore trait: backend-agnostic async interface for result storage.
//
// Implementors: SqliteStore (rusqlite), JsonDirStore (one file per result),
// PgStore (sqlx). Writes are idempotent overwrites keyed by (date, algorithm).

use anyhow::Result;
use async_trait::async_trait;

use super::models::StoredResultSummary;
use crate::topics::{ResultKey, TopicModelResult};

#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Create tables / directories. Safe to call on every startup.
    async fn initialize(&self) -> Result<()>;

    /// Save a result, replacing any previous result with the same key.
    async fn save_result(&self, result: &TopicModelResult) -> Result<()>;

    /// Load the result for a key, if one was stored.
    async fn load_result(&self, key: ResultKey) -> Result<Option<TopicModelResult>>;

    /// All stored results, newest date first, then by algorithm.
    async fn list_results(&self) -> Result<Vec<StoredResultSummary>>;
}
