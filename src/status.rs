// System status display: store location and stored results.

use anyhow::Result;
use std::path::Path;

use crate::backends::embeddings;
use crate::config::{Config, StorageBackend};
use crate::db::ResultStore;
use crate::output::terminal;

/// Display system status to the terminal.
pub async fn show(store: &dyn ResultStore, config: &Config) -> Result<()> {
    match config.storage {
        StorageBackend::Sqlite => {
            let size = std::fs::metadata(&config.db_path)
                .map(|m| format_bytes(m.len()))
                .unwrap_or_else(|_| "unknown".to_string());
            println!("Store: SQLite at {} ({})", config.db_path, size);
        }
        StorageBackend::Json => println!("Store: JSON files in {}", config.output_dir.display()),
        StorageBackend::Postgres => println!("Store: PostgreSQL"),
    }

    println!(
        "Default run: {} with {} topics{}",
        config.algorithm,
        config.n_topics,
        if config.fallback.is_empty() {
            String::new()
        } else {
            let chain: Vec<&str> = config.fallback.iter().map(|a| a.as_str()).collect();
            format!(", falling back to {}", chain.join(" → "))
        }
    );

    if embeddings::embedding_files_present(&config.model_dir) {
        println!("Sentence model: present in {}", config.model_dir.display());
    } else {
        println!("Sentence model: not found in {}", config.model_dir.display());
        println!("  bertopic runs need precomputed article embeddings without it");
    }

    let summaries = store.list_results().await?;
    println!("Stored results: {}", summaries.len());
    if !summaries.is_empty() {
        println!();
        terminal::display_stored(&summaries);
    }

    Ok(())
}

/// Whether the configured store exists yet (only meaningful for SQLite).
pub fn store_exists(config: &Config) -> bool {
    match config.storage {
        StorageBackend::Sqlite => Path::new(&config.db_path).exists(),
        StorageBackend::Json | StorageBackend::Postgres => true,
    }
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }
}
