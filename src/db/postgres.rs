// PgStore: PostgreSQL backend implementing ResultStore.
//
// Uses a sqlx PgPool with runtime parameter binding (no compile-time
// macros, so DATABASE_URL isn't needed at build time). Results live in a
// JSONB column; the listing columns are duplicated next to it.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx_core::pool::Pool;
use sqlx_core::row::Row;
use sqlx_postgres::Postgres;

use super::models::StoredResultSummary;
use super::traits::ResultStore;
use crate::topics::{ResultKey, TopicModelResult};

pub type PgPool = Pool<Postgres>;

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect to PostgreSQL and run migrations.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Run pending migrations under a session-level advisory lock so two
    /// processes starting together don't apply the same migration twice.
    ///
    /// The lock is bound to the session that took it, so lock and unlock
    /// run on one dedicated connection. Unlock always runs, even when a
    /// migration fails.
    async fn run_migrations(&self) -> Result<()> {
        // ASCII "RASSEGNA" as a big-endian i64
        const MIGRATION_LOCK_KEY: i64 = 0x5241535345474E41_u64 as i64;

        let mut lock_conn = self
            .pool
            .acquire()
            .await
            .context("Failed to acquire connection for migration advisory lock")?;

        sqlx_core::query::query("SELECT pg_advisory_lock($1)")
            .bind(MIGRATION_LOCK_KEY)
            .execute(&mut *lock_conn)
            .await
            .context("Failed to acquire migration advisory lock")?;

        let migration_result: Result<()> = async {
            sqlx_core::query::query(
                "CREATE TABLE IF NOT EXISTS schema_version (
                    version INTEGER PRIMARY KEY,
                    applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                )",
            )
            .execute(&self.pool)
            .await?;

            let migrations = [
                (1, include_str!("../../migrations/postgres/0001_topic_results.sql")),
                (2, include_str!("../../migrations/postgres/0002_assigned_articles.sql")),
            ];

            for (version, sql) in migrations {
                let applied: bool = sqlx_core::query::query(
                    "SELECT COUNT(*) > 0 FROM schema_version WHERE version = $1",
                )
                .bind(version)
                .fetch_one(&self.pool)
                .await
                .map(|row| row.get::<bool, _>(0))?;

                if !applied {
                    // Schema change and schema_version insert commit together
                    let mut tx = self.pool.begin().await?;
                    sqlx_core::raw_sql::raw_sql(sql).execute(&mut *tx).await?;
                    tx.commit().await?;
                }
            }

            Ok(())
        }
        .await;

        let unlock_result = sqlx_core::query::query("SELECT pg_advisory_unlock($1)")
            .bind(MIGRATION_LOCK_KEY)
            .execute(&mut *lock_conn)
            .await
            .context("Failed to release migration advisory lock");

        migration_result?;
        unlock_result?;

        Ok(())
    }
}

#[async_trait]
impl ResultStore for PgStore {
    async fn initialize(&self) -> Result<()> {
        self.run_migrations().await
    }

    async fn save_result(&self, result: &TopicModelResult) -> Result<()> {
        let json = serde_json::to_value(result).context("Failed to serialize topic result")?;
        sqlx_core::query::query(
            "INSERT INTO topic_results
                (run_date, algorithm, num_articles, num_topics, assigned_articles, result_json, stored_at)
             VALUES ($1, $2, $3, $4, $5, $6, NOW())
             ON CONFLICT(run_date, algorithm) DO UPDATE SET
                num_articles = $3,
                num_topics = $4,
                assigned_articles = $5,
                result_json = $6,
                stored_at = NOW()",
        )
        .bind(result.run_date)
        .bind(result.algorithm.as_str())
        .bind(i32::try_from(result.document_count).context("num_articles exceeds i32 range")?)
        .bind(i32::try_from(result.num_topics).context("num_topics exceeds i32 range")?)
        .bind(i32::try_from(result.assigned_count()).context("assigned_articles exceeds i32 range")?)
        .bind(&json)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_result(&self, key: ResultKey) -> Result<Option<TopicModelResult>> {
        let row = sqlx_core::query::query(
            "SELECT result_json FROM topic_results WHERE run_date = $1 AND algorithm = $2",
        )
        .bind(key.date)
        .bind(key.algorithm.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => {
                let json: serde_json::Value = r.get(0);
                let result = serde_json::from_value(json)
                    .with_context(|| format!("Stored result {key} does not match the result schema"))?;
                Ok(Some(result))
            }
            None => Ok(None),
        }
    }

    async fn list_results(&self) -> Result<Vec<StoredResultSummary>> {
        let rows = sqlx_core::query::query(
            "SELECT run_date, algorithm, num_articles, num_topics, assigned_articles,
                    to_char(stored_at, 'YYYY-MM-DD HH24:MI:SS') as stored_at
             FROM topic_results
             ORDER BY run_date DESC, algorithm ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| -> Result<StoredResultSummary> {
                Ok(StoredResultSummary {
                    date: r.get::<NaiveDate, _>(0),
                    algorithm: r.get::<String, _>(1).parse()?,
                    num_articles: r.get::<i32, _>(2).max(0) as usize,
                    num_topics: r.get::<i32, _>(3).max(0) as usize,
                    assigned_articles: r.get::<i32, _>(4).max(0) as usize,
                    stored_at: Some(r.get::<String, _>(5)),
                })
            })
            .collect()
    }
}
