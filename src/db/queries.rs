// Database queries for the topic_results table.
//
// Every SQLite interaction goes through this module; SqliteStore only
// locks the connection and calls in here.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};

use super::models::StoredResultSummary;
use crate::topics::{ResultKey, TopicModelResult};

/// Insert or replace the result for its (date, algorithm) key.
pub fn upsert_result(conn: &Connection, result: &TopicModelResult) -> Result<()> {
    let json = result.to_json().context("Failed to serialize topic result")?;
    conn.execute(
        "INSERT INTO topic_results
            (run_date, algorithm, num_articles, num_topics, assigned_articles, result_json, stored_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, datetime('now'))
         ON CONFLICT(run_date, algorithm) DO UPDATE SET
            num_articles = ?3,
            num_topics = ?4,
            assigned_articles = ?5,
            result_json = ?6,
            stored_at = datetime('now')",
        params![
            date_key(result.run_date),
            result.algorithm.as_str(),
            result.document_count as i64,
            result.num_topics as i64,
            result.assigned_count() as i64,
            json,
        ],
    )?;
    Ok(())
}

/// Load a stored result by key.
pub fn get_result(conn: &Connection, key: ResultKey) -> Result<Option<TopicModelResult>> {
    let mut stmt =
        conn.prepare("SELECT result_json FROM topic_results WHERE run_date = ?1 AND algorithm = ?2")?;
    let json: Option<String> = stmt
        .query_row(params![date_key(key.date), key.algorithm.as_str()], |row| row.get(0))
        .optional()?;

    match json {
        Some(json) => {
            let result = TopicModelResult::from_json(&json)
                .with_context(|| format!("Stored result {key} is not valid JSON"))?;
            Ok(Some(result))
        }
        None => Ok(None),
    }
}

/// List stored results, newest date first.
pub fn list_results(conn: &Connection) -> Result<Vec<StoredResultSummary>> {
    let mut stmt = conn.prepare(
        "SELECT run_date, algorithm, num_articles, num_topics, assigned_articles, stored_at
         FROM topic_results
         ORDER BY run_date DESC, algorithm ASC",
    )?;

    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, i64>(2)?,
            row.get::<_, i64>(3)?,
            row.get::<_, i64>(4)?,
            row.get::<_, String>(5)?,
        ))
    })?;

    let mut summaries = Vec::new();
    for row in rows {
        let (date, algorithm, num_articles, num_topics, assigned, stored_at) = row?;
        summaries.push(StoredResultSummary {
            date: parse_date_key(&date)?,
            algorithm: algorithm.parse()?,
            num_articles: num_articles.max(0) as usize,
            num_topics: num_topics.max(0) as usize,
            assigned_articles: assigned.max(0) as usize,
            stored_at: Some(stored_at),
        });
    }
    Ok(summaries)
}

pub(crate) fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub(crate) fn parse_date_key(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| format!("Invalid stored run date '{s}'"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::create_tables;
    use crate::db::test_support::sample_result;
    use crate::topics::traits::Algorithm;

    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();
        conn
    }

    #[test]
    fn test_result_roundtrip() {
        let conn = test_db();
        let result = sample_result("2024-03-01", Algorithm::Lda);
        assert!(get_result(&conn, result.key()).unwrap().is_none());

        upsert_result(&conn, &result).unwrap();
        assert_eq!(get_result(&conn, result.key()).unwrap(), Some(result));
    }

    #[test]
    fn test_upsert_overwrites_same_key() {
        let conn = test_db();
        let mut result = sample_result("2024-03-01", Algorithm::Nmf);
        upsert_result(&conn, &result).unwrap();

        result.document_count = 9;
        upsert_result(&conn, &result).unwrap();

        let listed = list_results(&conn).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].num_articles, 9);
        assert_eq!(get_result(&conn, result.key()).unwrap().unwrap().document_count, 9);
    }

    #[test]
    fn test_list_results_newest_first() {
        let conn = test_db();
        upsert_result(&conn, &sample_result("2024-03-01", Algorithm::Nmf)).unwrap();
        upsert_result(&conn, &sample_result("2024-03-02", Algorithm::Lda)).unwrap();
        upsert_result(&conn, &sample_result("2024-03-01", Algorithm::Lda)).unwrap();

        let keys: Vec<String> = list_results(&conn)
            .unwrap()
            .iter()
            .map(|s| s.key().to_string())
            .collect();
        assert_eq!(keys, vec!["2024-03-02/lda", "2024-03-01/lda", "2024-03-01/nmf"]);
        assert_eq!(list_results(&conn).unwrap()[0].assigned_articles, 1);
    }
}
