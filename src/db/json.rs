// JsonDirStore: one pretty-printed JSON file per result.
//
// Files are named `topics_{YYYY-MM-DD}_{algorithm}.json` inside the output
// directory. Writes go to a temporary file first and are renamed into
// place, so a reader never sees half a result.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::models::{DateSummary, StoredResultSummary};
use super::traits::ResultStore;
use crate::topics::{ResultKey, TopicModelResult};

const FILE_PREFIX: &str = "topics_";
const FILE_SUFFIX: &str = ".json";

pub struct JsonDirStore {
    dir: PathBuf,
}

impl JsonDirStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: ResultKey) -> PathBuf {
        self.dir.join(file_name(key))
    }
}

pub fn file_name(key: ResultKey) -> String {
    format!(
        "{FILE_PREFIX}{}_{}{FILE_SUFFIX}",
        key.date.format("%Y-%m-%d"),
        key.algorithm
    )
}

/// Parse a result file name back into its key. Anything else in the
/// directory (summaries, temp files) yields None.
pub fn parse_file_name(name: &str) -> Option<ResultKey> {
    let stem = name.strip_prefix(FILE_PREFIX)?.strip_suffix(FILE_SUFFIX)?;
    let (date, algorithm) = stem.split_once('_')?;
    let date = chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
    let algorithm = algorithm.parse().ok()?;
    Some(ResultKey::new(date, algorithm))
}

/// Write `contents` to `path` via a sibling temp file and a rename.
/// The temp file never outlives a failed write.
async fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    if let Err(e) = tokio::fs::write(&tmp, contents).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e).with_context(|| format!("Failed to write {}", tmp.display()));
    }
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e).with_context(|| format!("Failed to move {} into place", path.display()));
    }
    Ok(())
}

/// Write the per-date summary (`{date: {num_topics, num_articles}}`).
pub async fn write_summary(path: &Path, summary: &BTreeMap<String, DateSummary>) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
    }
    let json = serde_json::to_string_pretty(summary)?;
    write_atomic(path, json.as_bytes()).await
}

#[async_trait]
impl ResultStore for JsonDirStore {
    async fn initialize(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create output directory {}", self.dir.display()))
    }

    async fn save_result(&self, result: &TopicModelResult) -> Result<()> {
        let path = self.path_for(result.key());
        let json = result.to_json().context("Failed to serialize topic result")?;
        write_atomic(&path, json.as_bytes()).await?;
        debug!(path = %path.display(), "Wrote topic result");
        Ok(())
    }

    async fn load_result(&self, key: ResultKey) -> Result<Option<TopicModelResult>> {
        let path = self.path_for(key);
        let json = match tokio::fs::read_to_string(&path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("Failed to read {}", path.display())),
        };
        let result = TopicModelResult::from_json(&json)
            .with_context(|| format!("{} is not a valid topic result", path.display()))?;
        Ok(Some(result))
    }

    async fn list_results(&self) -> Result<Vec<StoredResultSummary>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to list {}", self.dir.display()))
            }
        };

        let mut summaries = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(key) = name.to_str().and_then(parse_file_name) else {
                continue;
            };
            match self.load_result(key).await {
                Ok(Some(result)) => {
                    let mut summary = StoredResultSummary::from(&result);
                    summary.stored_at = entry
                        .metadata()
                        .await
                        .ok()
                        .and_then(|m| m.modified().ok())
                        .map(|t| DateTime::<Utc>::from(t).format("%Y-%m-%d %H:%M:%S").to_string());
                    summaries.push(summary);
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, file = ?name, "Skipping unreadable result file"),
            }
        }

        summaries.sort_by(|a, b| b.date.cmp(&a.date).then(a.algorithm.cmp(&b.algorithm)));
        Ok(summaries)
    }
}
