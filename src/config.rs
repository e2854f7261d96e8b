use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};

use crate::backends::vocabulary::Language;
use crate::backends::{embeddings, BackendSettings, DEFAULT_SEED};
use crate::topics::traits::Algorithm;

/// Where composed results are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    /// Local SQLite file (default)
    Sqlite,
    /// One JSON file per result under the output directory
    Json,
    /// PostgreSQL at DATABASE_URL (requires the `postgres` feature)
    Postgres,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(StorageBackend::Sqlite),
            "json" => Ok(StorageBackend::Json),
            "postgres" | "postgresql" => Ok(StorageBackend::Postgres),
            other => anyhow::bail!("Unknown storage type '{other}' (expected sqlite, json or postgres)"),
        }
    }
}

/// Central configuration loaded from environment variables.
///
/// The .env file is loaded automatically at startup via dotenvy. Unset
/// variables take their defaults; set-but-invalid ones are errors.
#[derive(Debug, Clone)]
pub struct Config {
    pub algorithm: Algorithm,
    pub n_topics: usize,
    /// Backends to try, in order, when `algorithm` fails
    pub fallback: Vec<Algorithm>,
    pub storage: StorageBackend,
    pub db_path: String,
    pub database_url: Option<String>,
    /// Directory for JSON results and summaries
    pub output_dir: PathBuf,
    /// Directory containing the sentence model
    pub model_dir: PathBuf,
    pub language: Language,
    /// Newspapers that should appear in every matrix, even with no articles
    pub newspapers: Vec<String>,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let algorithm = match var("TOPIC_ALGORITHM") {
            Some(v) => v.parse().context("Invalid TOPIC_ALGORITHM")?,
            None => Algorithm::Lda,
        };

        let n_topics = match var("NUM_TOPICS") {
            Some(v) => {
                let n: usize = v
                    .parse()
                    .with_context(|| format!("Invalid NUM_TOPICS '{v}' (expected a positive integer)"))?;
                if n == 0 {
                    anyhow::bail!("NUM_TOPICS must be positive");
                }
                n
            }
            None => 10,
        };

        let fallback = match var("TOPIC_FALLBACK") {
            Some(v) => parse_algorithm_list(&v).context("Invalid TOPIC_FALLBACK")?,
            None => Vec::new(),
        };

        let storage = match var("STORAGE_TYPE") {
            Some(v) => v.parse()?,
            None => StorageBackend::Sqlite,
        };

        let language = match var("TOPIC_LANGUAGE") {
            Some(v) => v.parse().context("Invalid TOPIC_LANGUAGE")?,
            None => Language::Italian,
        };

        let newspapers = var("RASSEGNA_NEWSPAPERS")
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            algorithm,
            n_topics,
            fallback,
            storage,
            db_path: var("RASSEGNA_DB_PATH").unwrap_or_else(|| "./rassegna.db".to_string()),
            database_url: var("DATABASE_URL"),
            output_dir: var("RASSEGNA_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data/topics")),
            model_dir: var("RASSEGNA_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(embeddings::default_model_dir),
            language,
            newspapers,
        })
    }

    /// Settings for constructing topic backends.
    pub fn backend_settings(&self) -> BackendSettings {
        BackendSettings {
            language: self.language,
            model_dir: self.model_dir.clone(),
            seed: DEFAULT_SEED,
        }
    }

    /// Check that Postgres storage has a usable URL.
    pub fn require_database_url(&self) -> Result<&str> {
        match self.database_url.as_deref() {
            Some(url) if url.starts_with("postgres://") || url.starts_with("postgresql://") => Ok(url),
            Some(_) => anyhow::bail!("DATABASE_URL must start with postgres:// or postgresql://"),
            None => anyhow::bail!(
                "STORAGE_TYPE=postgres but DATABASE_URL is not set. Add it to your .env file."
            ),
        }
    }
}

/// Parse a comma-separated list of algorithm names.
pub fn parse_algorithm_list(s: &str) -> Result<Vec<Algorithm>> {
    s.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(Algorithm::from_str)
        .collect()
}
