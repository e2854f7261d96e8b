use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use rassegna::backends::create_backend;
use rassegna::config::{self, Config, StorageBackend};
use rassegna::db::{self, models, KeyedStore, ResultStore};
use rassegna::ingest;
use rassegna::output::terminal;
use rassegna::pipeline::{run_batch, BackendFactory, BatchJob, BatchOptions, RunContext};
use rassegna::topics::{Algorithm, PipelineError, ResultKey, TopicModelResult};

/// Rassegna: daily topic modeling for the news.
///
/// Discovers the day's topics across newspapers and records how much
/// attention each newspaper gives each topic.
#[derive(Parser)]
#[command(name = "rassegna", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the configured result store
    Init,

    /// Run topic modeling over preprocessed articles and store the results
    Process {
        /// JSON array or JSON Lines file of preprocessed articles
        #[arg(long)]
        input: PathBuf,

        /// Run date, YYYY-MM-DD (default: today)
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Also process this many days before the run date
        #[arg(long)]
        days: Option<u32>,

        /// Topic algorithm: lda, nmf or bertopic (default: TOPIC_ALGORITHM)
        #[arg(long)]
        algorithm: Option<Algorithm>,

        /// Requested number of topics (default: NUM_TOPICS)
        #[arg(long)]
        topics: Option<usize>,

        /// Comma-separated backends to try when the first fails (default: TOPIC_FALLBACK)
        #[arg(long)]
        fallback: Option<String>,

        /// Number of runs to execute in parallel (default: 2)
        #[arg(long, default_value = "2")]
        concurrency: usize,

        /// Write a {date: {num_topics, num_articles}} summary here
        #[arg(long)]
        summary: Option<PathBuf>,
    },

    /// Show a stored result
    Show {
        /// Run date, YYYY-MM-DD
        #[arg(long)]
        date: NaiveDate,

        /// Topic algorithm: lda, nmf or bertopic (default: TOPIC_ALGORITHM)
        #[arg(long)]
        algorithm: Option<Algorithm>,
    },

    /// Show store status and list stored results
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if missing)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("rassegna=info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            let config = Config::load()?;
            info!(storage = ?config.storage, "Initializing result store");
            init_store(&config).await?;
            match config.storage {
                StorageBackend::Sqlite => println!("Database initialized at: {}", config.db_path),
                StorageBackend::Json => {
                    println!("Output directory ready: {}", config.output_dir.display())
                }
                StorageBackend::Postgres => println!("PostgreSQL schema is up to date"),
            }
            println!("\nNext: rassegna process --input <articles.jsonl>");
        }

        Commands::Process {
            input,
            date,
            days,
            algorithm,
            topics,
            fallback,
            concurrency,
            summary,
        } => {
            let mut config = Config::load()?;
            if let Some(alg) = algorithm {
                config.algorithm = alg;
            }
            if let Some(n) = topics {
                if n == 0 {
                    anyhow::bail!("--topics must be positive");
                }
                config.n_topics = n;
            }
            if let Some(list) = fallback {
                config.fallback = config::parse_algorithm_list(&list).context("Invalid --fallback")?;
            }

            let documents = ingest::load_documents(&input)?;
            let end = date.unwrap_or_else(|| chrono::Local::now().date_naive());
            let dates = match days {
                Some(n) => ingest::date_range(end, n),
                None => vec![end],
            };

            let groups = ingest::group_by_date(&documents, &dates);
            if groups.is_empty() {
                anyhow::bail!(
                    "No articles in {} for the requested date(s) ending {}",
                    input.display(),
                    end
                );
            }

            let jobs: Vec<BatchJob> = groups
                .into_iter()
                .map(|(run_date, docs)| BatchJob {
                    context: RunContext::new(run_date, config.n_topics, docs)
                        .with_declared_sources(config.newspapers.clone()),
                    algorithm: config.algorithm,
                })
                .collect();

            let store: Arc<dyn ResultStore> = Arc::new(KeyedStore::new(init_store(&config).await?));
            let settings = config.backend_settings();
            let factory: BackendFactory = Arc::new(move |alg: Algorithm| create_backend(alg, &settings));
            let options = BatchOptions {
                fallback: config.fallback.clone(),
                concurrency,
                show_progress: jobs.len() > 1,
            };

            println!(
                "Modeling {} day(s) with {} ({} topics requested)...",
                jobs.len(),
                config.algorithm,
                config.n_topics
            );
            let reports = run_batch(jobs, factory, Some(store), &options).await;

            let mut produced: Vec<&TopicModelResult> = Vec::new();
            for report in &reports {
                match &report.outcome {
                    Ok(run) => {
                        terminal::display_result(&run.result);
                        produced.push(&run.result);
                    }
                    Err(PipelineError::PersistenceFailure { result, .. }) => {
                        println!(
                            "  {} result for {} could not be stored; showing it anyway",
                            "Warning:".yellow(),
                            report.requested
                        );
                        terminal::display_result(result);
                    }
                    Err(_) => {}
                }
            }
            terminal::display_batch(&reports);

            let summary_path = summary.or_else(|| {
                (config.storage == StorageBackend::Json).then(|| {
                    config
                        .output_dir
                        .join(format!("summary_{}.json", chrono::Local::now().format("%Y%m%d")))
                })
            });
            if let Some(path) = summary_path {
                db::json::write_summary(&path, &models::date_summary(produced.iter().copied())).await?;
                println!("Saved summary to {}", path.display());
            }

            if reports.iter().all(|r| !r.is_success()) {
                anyhow::bail!("All {} topic runs failed", reports.len());
            }
        }

        Commands::Show { date, algorithm } => {
            let config = Config::load()?;
            let store = open_store(&config).await?;
            let key = ResultKey::new(date, algorithm.unwrap_or(config.algorithm));
            match store.load_result(key).await? {
                Some(result) => terminal::display_result(&result),
                None => anyhow::bail!("No stored result for {key}. Run `rassegna process` first."),
            }
        }

        Commands::Status => {
            let config = Config::load()?;
            if !rassegna::status::store_exists(&config) {
                println!("Store: not initialized");
                println!("\nRun `rassegna init` to set it up.");
                return Ok(());
            }
            let store = open_store(&config).await?;
            rassegna::status::show(store.as_ref(), &config).await?;
        }
    }

    Ok(())
}

/// Open the configured store; it must already exist.
async fn open_store(config: &Config) -> Result<Arc<dyn ResultStore>> {
    match config.storage {
        StorageBackend::Sqlite => open_sqlite(config),
        StorageBackend::Json => Ok(Arc::new(db::JsonDirStore::new(&config.output_dir))),
        StorageBackend::Postgres => connect_postgres(config).await,
    }
}

/// Open the configured store, creating tables or directories as needed.
async fn init_store(config: &Config) -> Result<Arc<dyn ResultStore>> {
    match config.storage {
        StorageBackend::Sqlite => init_sqlite(config),
        StorageBackend::Json => {
            let store = db::JsonDirStore::new(&config.output_dir);
            store.initialize().await?;
            Ok(Arc::new(store))
        }
        StorageBackend::Postgres => connect_postgres(config).await,
    }
}

#[cfg(feature = "sqlite")]
fn open_sqlite(config: &Config) -> Result<Arc<dyn ResultStore>> {
    Ok(Arc::new(db::open_sqlite(&config.db_path)?))
}

#[cfg(feature = "sqlite")]
fn init_sqlite(config: &Config) -> Result<Arc<dyn ResultStore>> {
    Ok(Arc::new(db::initialize_sqlite(&config.db_path)?))
}

#[cfg(not(feature = "sqlite"))]
fn open_sqlite(_config: &Config) -> Result<Arc<dyn ResultStore>> {
    anyhow::bail!(
        "STORAGE_TYPE=sqlite but the 'sqlite' feature is not compiled in.\n\
         Rebuild with default features, or set STORAGE_TYPE=json."
    )
}

#[cfg(not(feature = "sqlite"))]
fn init_sqlite(config: &Config) -> Result<Arc<dyn ResultStore>> {
    open_sqlite(config)
}

/// Connect to PostgreSQL (runs migrations).
#[cfg(feature = "postgres")]
async fn connect_postgres(config: &Config) -> Result<Arc<dyn ResultStore>> {
    let url = config.require_database_url()?;
    info!("Using PostgreSQL backend");
    Ok(Arc::new(db::connect_postgres(url).await?))
}

#[cfg(not(feature = "postgres"))]
async fn connect_postgres(config: &Config) -> Result<Arc<dyn ResultStore>> {
    config.require_database_url()?;
    anyhow::bail!(
        "STORAGE_TYPE=postgres but the 'postgres' feature is not compiled in.\n\
         Rebuild with: cargo build --features postgres"
    )
}
