mod display;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use labelwave_ai::{ProviderConfig, ProviderRegistry};
use labelwave_core::Taxonomy;
use labelwave_pipeline::{RetryPolicy, RunController, RunOptions};
use labelwave_store::{CheckpointStore, DuckStore, FileCheckpoint, RecordTable};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "labelwave",
    version,
    about = "Label unprocessed text records with several LLM providers in parallel"
)]
struct Cli {
    /// DuckDB database holding the records
    #[arg(long, env = "LABELWAVE_DB")]
    db: PathBuf,

    /// Table holding the records
    #[arg(long, default_value = "posts")]
    table: String,

    #[arg(long, default_value = "id")]
    id_column: String,

    /// Text sent to the backends
    #[arg(long, default_value = "content")]
    content_column: String,

    /// Fallback text when content is empty
    #[arg(long)]
    title_column: Option<String>,

    /// Label column whose NULL marks a record as unprocessed
    #[arg(long, default_value = "intent")]
    pending_column: String,

    /// Process at most this many records
    #[arg(long)]
    limit: Option<usize>,

    /// Plan batches and exit without calling any backend
    #[arg(long)]
    dry_run: bool,

    /// Skip results whose self-reported confidence is below this value
    #[arg(long)]
    min_confidence: Option<f32>,

    #[arg(long, default_value_t = labelwave_pipeline::DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    #[arg(long, default_value_t = labelwave_pipeline::DEFAULT_PAGE_SIZE)]
    page_size: usize,

    /// Progress file for resuming interrupted runs
    #[arg(long, default_value = "labelwave-progress.json")]
    checkpoint: PathBuf,

    /// Keep progress in a table of the records database instead of a file
    #[arg(long, conflicts_with = "checkpoint")]
    db_checkpoint: bool,

    /// JSON taxonomy file (defaults to the built-in UGC taxonomy)
    #[arg(long)]
    taxonomy: Option<PathBuf>,

    /// Calls per batch, first call included
    #[arg(long, default_value_t = 4)]
    max_attempts: u32,

    #[arg(long, default_value_t = 120)]
    call_timeout_secs: u64,

    /// Comma-separated OpenAI API keys, one provider per key
    #[arg(long, env = "OPENAI_API_KEYS", hide_env_values = true)]
    openai_keys: Option<String>,

    /// Comma-separated Anthropic API keys, one provider per key
    #[arg(long, env = "ANTHROPIC_API_KEYS", hide_env_values = true)]
    anthropic_keys: Option<String>,

    /// Comma-separated Gemini API keys, one provider per key
    #[arg(long, env = "GEMINI_API_KEYS", hide_env_values = true)]
    gemini_keys: Option<String>,
}

impl Cli {
    fn record_table(&self) -> RecordTable {
        RecordTable {
            table: self.table.clone(),
            id_column: self.id_column.clone(),
            content_column: self.content_column.clone(),
            title_column: self.title_column.clone(),
            pending_column: self.pending_column.clone(),
            ..RecordTable::default()
        }
    }

    fn run_options(&self) -> RunOptions {
        RunOptions {
            batch_size: self.batch_size,
            page_size: self.page_size,
            limit: self.limit,
            dry_run: self.dry_run,
            min_confidence: self.min_confidence,
            retry: RetryPolicy {
                max_attempts: self.max_attempts,
                call_timeout: Duration::from_secs(self.call_timeout_secs),
                ..RetryPolicy::default()
            },
        }
    }

    fn provider_config(&self) -> ProviderConfig {
        ProviderConfig {
            http_timeout: Duration::from_secs(self.call_timeout_secs),
            ..ProviderConfig::from_key_lists(
                self.openai_keys.as_deref(),
                self.anthropic_keys.as_deref(),
                self.gemini_keys.as_deref(),
            )
        }
    }

    fn load_taxonomy(&self) -> Result<Taxonomy> {
        let Some(path) = &self.taxonomy else {
            return Ok(Taxonomy::default_ugc());
        };
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("reading taxonomy {}", path.display()))?;
        Taxonomy::from_json(&json).with_context(|| format!("invalid taxonomy {}", path.display()))
    }

    /// Open the database and add any missing label columns. Dry runs need
    /// them too: the pending filter reads a label column.
    fn open_store(&self, taxonomy: &Taxonomy) -> Result<DuckStore> {
        let store = DuckStore::open_persistent(&self.db, self.record_table())
            .with_context(|| format!("opening {}", self.db.display()))?;
        store
            .ensure_label_columns(taxonomy)
            .context("adding label columns")?;
        Ok(store)
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    info!("labelwave v{}", env!("CARGO_PKG_VERSION"));

    let taxonomy = cli.load_taxonomy()?;
    let store = Arc::new(cli.open_store(&taxonomy)?);
    let checkpoint: Arc<dyn CheckpointStore> = if cli.db_checkpoint {
        store.clone()
    } else {
        Arc::new(FileCheckpoint::new(&cli.checkpoint))
    };

    let options = cli.run_options();
    display::print_header(&cli.db, &cli.table, &options);

    let controller = RunController::new(
        ProviderRegistry::new(cli.provider_config()),
        store,
        checkpoint,
        taxonomy,
    )
    .on_wave(display::print_progress);

    tokio::select! {
        summary = controller.run(&options) => {
            let summary = summary.context("labelling run failed")?;
            display::print_summary(&summary);
            Ok(ExitCode::SUCCESS)
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted; the in-flight wave is dropped and will be redone on the next run");
            Ok(ExitCode::from(130))
        }
    }
}
