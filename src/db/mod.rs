// Result storage: SQLite, a directory of JSON files, or PostgreSQL.
//
// SQLite uses rusqlite with the "bundled" feature so there's no system
// SQLite dependency; the file lives wherever RASSEGNA_DB_PATH points
// (defaults to ./rassegna.db). JSON results go to RASSEGNA_OUTPUT_DIR.
// Postgres is behind the `postgres` feature.

pub mod json;
pub mod keyed;
pub mod models;
pub mod traits;

#[cfg(feature = "sqlite")]
pub mod queries;
#[cfg(feature = "sqlite")]
pub mod schema;
#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use json::JsonDirStore;
pub use keyed::KeyedStore;
pub use traits::ResultStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

#[cfg(feature = "postgres")]
pub use postgres::PgStore;

#[cfg(feature = "sqlite")]
use anyhow::{Context, Result};
#[cfg(feature = "sqlite")]
use rusqlite::Connection;
#[cfg(feature = "sqlite")]
use std::path::Path;

/// Open (or create) the SQLite database and run migrations.
///
/// Called by `rassegna init` and by `process` so a first run just works.
#[cfg(feature = "sqlite")]
pub fn initialize_sqlite(db_path: &str) -> Result<SqliteStore> {
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory for database: {}", db_path))?;
        }
    }

    let conn = Connection::open(db_path)
        .with_context(|| format!("Failed to open database at {}", db_path))?;

    // WAL mode for better concurrent read performance
    conn.pragma_update(None, "journal_mode", "WAL")?;

    schema::create_tables(&conn)?;

    Ok(SqliteStore::new(conn))
}

/// Open an existing SQLite database (fails if it doesn't exist yet).
#[cfg(feature = "sqlite")]
pub fn open_sqlite(db_path: &str) -> Result<SqliteStore> {
    if !Path::new(db_path).exists() {
        anyhow::bail!(
            "Database not found at {}. Run `rassegna init` first.",
            db_path
        );
    }

    let conn = Connection::open(db_path)
        .with_context(|| format!("Failed to open database at {}", db_path))?;
    conn.pragma_update(None, "journal_mode", "WAL")?;

    Ok(SqliteStore::new(conn))
}

/// Connect to PostgreSQL, running migrations.
#[cfg(feature = "postgres")]
pub async fn connect_postgres(database_url: &str) -> anyhow::Result<PgStore> {
    PgStore::connect(database_url).await
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    use chrono::NaiveDate;

    use crate::topics::compose::{ArticleRef, TopicEntry, TopicModelResult};
    use crate::topics::traits::Algorithm;

    /// A fresh, unique directory under the system temp dir.
    pub(crate) fn scratch_dir(name: &str) -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("rassegna-{name}-{}-{nanos}", std::process::id()))
    }

    /// A small hand-built result for storage tests.
    pub(crate) fn sample_result(date: &str, algorithm: Algorithm) -> TopicModelResult {
        TopicModelResult {
            run_date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            algorithm,
            document_count: 3,
            num_topics: 1,
            topics: vec![TopicEntry {
                topic_id: 0,
                words: vec!["governo".into(), "legge".into()],
                weights: vec![0.6, 0.4],
                label: "Governo".into(),
                articles: vec![ArticleRef {
                    article_id: "a1".into(),
                    title: "Il governo approva".into(),
                    newspaper: "Corriere".into(),
                    url: "https://example.org/a1".into(),
                    summary: String::new(),
                }],
                newspaper_counts: BTreeMap::from([("Corriere".into(), 1), ("Stampa".into(), 0)]),
                newspaper_weights: BTreeMap::from([("Corriere".into(), 0.5), ("Stampa".into(), 0.0)]),
            }],
        }
    }
}
