// Database schema: table creation and migrations.
//
// A `schema_version` table tracks which migrations have run, and each
// migration is a function that executes SQL statements.

use anyhow::{Context, Result};
use rusqlite::Connection;

/// Create all tables if they don't exist yet. Idempotent.
pub fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- One composed result per run date and algorithm
        CREATE TABLE IF NOT EXISTS topic_results (
            run_date TEXT NOT NULL,            -- YYYY-MM-DD
            algorithm TEXT NOT NULL,           -- lda / nmf / bertopic
            num_articles INTEGER NOT NULL,
            num_topics INTEGER NOT NULL,
            result_json TEXT NOT NULL,
            stored_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (run_date, algorithm)
        );
        ",
    )
    .context("Failed to create database tables")?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [1],
    )?;

    // Migration v2: track how many articles landed under a topic, so
    // listings can show coverage without parsing result_json.
    run_migration(conn, 2, |c| {
        c.execute_batch(
            "ALTER TABLE topic_results ADD COLUMN assigned_articles INTEGER NOT NULL DEFAULT 0;",
        )
    })?;

    // Migration v3: listing by algorithm
    run_migration(conn, 3, |c| {
        c.execute_batch(
            "CREATE INDEX IF NOT EXISTS idx_results_algorithm ON topic_results(algorithm, run_date);",
        )
    })?;

    Ok(())
}

/// Run a migration if it hasn't been applied yet.
fn run_migration<F>(conn: &Connection, version: i64, migrate: F) -> Result<()>
where
    F: FnOnce(&Connection) -> rusqlite::Result<()>,
{
    let already_applied: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM schema_version WHERE version = ?1",
        [version],
        |row| row.get(0),
    )?;

    if !already_applied {
        migrate(conn).with_context(|| format!("Migration v{version} failed"))?;
        conn.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            [version],
        )?;
    }

    Ok(())
}

/// Count the number of tables in the database (for init confirmation).
pub fn table_count(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
        [],
        |row| row.get(0),
    )?;
    Ok(count)
}
