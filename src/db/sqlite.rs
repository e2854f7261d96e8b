// SqliteStore: rusqlite backend implementing ResultStore.
//
// The Connection is wrapped in tokio::sync::Mutex because Connection is !Sync.
// Trait methods lock the mutex, do synchronous rusqlite work, and return.

use anyhow::Result;
use async_trait::async_trait;
use rusqlite::Connection;
use tokio::sync::Mutex;

use super::models::StoredResultSummary;
use super::traits::ResultStore;
use crate::topics::{ResultKey, TopicModelResult};

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Wrap an already-opened rusqlite Connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// A fresh in-memory database with the schema applied.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        super::schema::create_tables(&conn)?;
        Ok(Self::new(conn))
    }

    pub async fn table_count(&self) -> Result<i64> {
        let conn = self.conn.lock().await;
        super::schema::table_count(&conn)
    }
}

#[async_trait]
impl ResultStore for SqliteStore {
    async fn initialize(&self) -> Result<()> {
        let conn = self.conn.lock().await;
        super::schema::create_tables(&conn)
    }

    async fn save_result(&self, result: &TopicModelResult) -> Result<()> {
        let conn = self.conn.lock().await;
        super::queries::upsert_result(&conn, result)
    }

    async fn load_result(&self, key: ResultKey) -> Result<Option<TopicModelResult>> {
        let conn = self.conn.lock().await;
        super::queries::get_result(&conn, key)
    }

    async fn list_results(&self) -> Result<Vec<StoredResultSummary>> {
        let conn = self.conn.lock().await;
        super::queries::list_results(&conn)
    }
}
