//! Run controller: fetch, plan, dispatch wave by wave, persist, checkpoint.

use std::sync::Arc;
use std::time::Duration;

use labelwave_ai::ProviderRegistry;
use labelwave_core::{Taxonomy, split};
use labelwave_store::{CheckpointStore, RecordStore};
use tokio::time::Instant;
use tracing::info;

use crate::dispatch::Dispatcher;
use crate::source::{DEFAULT_PAGE_SIZE, fetch_unprocessed};
use crate::stats::RunStatistics;
use crate::writer::PersistenceWriter;
use crate::{PipelineError, RetryPolicy};

/// Records per backend call unless configured otherwise.
pub const DEFAULT_BATCH_SIZE: usize = 20;

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub batch_size: usize,
    pub page_size: usize,
    /// Upper bound on records fetched for this run.
    pub limit: Option<usize>,
    /// Plan batches without calling backends or writing anything.
    pub dry_run: bool,
    pub min_confidence: Option<f32>,
    pub retry: RetryPolicy,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            page_size: DEFAULT_PAGE_SIZE,
            limit: None,
            dry_run: false,
            min_confidence: None,
            retry: RetryPolicy::default(),
        }
    }
}

/// Emitted after each wave has been persisted and checkpointed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaveProgress {
    pub wave: usize,
    pub total_waves: usize,
    pub completed_batches: usize,
    pub total_batches: usize,
    pub processed: usize,
    pub errors: usize,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub providers: Vec<String>,
    /// Records fetched from the store.
    pub fetched: usize,
    /// Records left after dropping checkpointed ids.
    pub pending: usize,
    pub batches: usize,
    pub waves: usize,
    pub dry_run: bool,
    pub checkpoint_cleared: bool,
    pub stats: RunStatistics,
}

type ProgressHook = Box<dyn Fn(&WaveProgress) + Send + Sync>;

pub struct RunController {
    registry: ProviderRegistry,
    records: Arc<dyn RecordStore>,
    checkpoint: Arc<dyn CheckpointStore>,
    taxonomy: Taxonomy,
    on_wave: Option<ProgressHook>,
}

impl RunController {
    pub fn new(
        registry: ProviderRegistry,
        records: Arc<dyn RecordStore>,
        checkpoint: Arc<dyn CheckpointStore>,
        taxonomy: Taxonomy,
    ) -> Self {
        Self {
            registry,
            records,
            checkpoint,
            taxonomy,
            on_wave: None,
        }
    }

    /// Call `hook` after every settled wave.
    pub fn on_wave(mut self, hook: impl Fn(&WaveProgress) + Send + Sync + 'static) -> Self {
        self.on_wave = Some(Box::new(hook));
        self
    }

    pub async fn run(&self, options: &RunOptions) -> Result<RunSummary, PipelineError> {
        let started = Instant::now();

        let providers = self.registry.discover()?;
        if providers.is_empty() {
            return Err(PipelineError::NoProviders);
        }
        let names: Vec<String> = providers.iter().map(|p| p.name().to_string()).collect();
        let mut stats = RunStatistics::new(names.iter().map(String::as_str), &self.taxonomy);

        let progress = self
            .checkpoint
            .load()
            .await
            .map_err(PipelineError::Checkpoint)?;
        if !progress.is_empty() {
            info!(processed = progress.len(), "resuming from checkpoint");
        }

        let fetched = fetch_unprocessed(self.records.as_ref(), options.page_size, options.limit)
            .await
            .map_err(PipelineError::Storage)?;
        let fetched_count = fetched.len();
        let truncated = options.limit.is_some_and(|limit| fetched_count >= limit);

        let (done, pending): (Vec<_>, Vec<_>) =
            fetched.into_iter().partition(|r| progress.contains(r.id));
        stats.skipped = done.len();
        let pending_count = pending.len();

        let batches = split(pending, options.batch_size);
        let dispatcher = Dispatcher::new(&providers, &options.retry, &self.taxonomy);
        let width = dispatcher.wave_width();
        let total_batches = batches.len();
        let total_waves = total_batches.div_ceil(width);
        info!(
            providers = providers.len(),
            fetched = fetched_count,
            skipped = stats.skipped,
            pending = pending_count,
            batches = total_batches,
            waves = total_waves,
            dry_run = options.dry_run,
            "run planned"
        );

        let mut summary = RunSummary {
            providers: names,
            fetched: fetched_count,
            pending: pending_count,
            batches: total_batches,
            waves: total_waves,
            dry_run: options.dry_run,
            checkpoint_cleared: false,
            stats,
        };
        if options.dry_run {
            summary.stats.elapsed = started.elapsed();
            return Ok(summary);
        }

        let writer = PersistenceWriter::new(self.records.as_ref(), options.min_confidence);
        let mut remaining = batches.into_iter().peekable();
        let mut wave = 0;
        let mut completed_batches = 0;

        while remaining.peek().is_some() {
            wave += 1;
            let current: Vec<_> = remaining.by_ref().take(width).collect();
            completed_batches += current.len();

            let outcomes = dispatcher.run_wave(current).await;
            let stats = &mut summary.stats;
            let mut settled = Vec::new();
            for outcome in outcomes {
                let size = outcome.batch.len();
                let results = outcome.result.unwrap_or_default();
                let report = writer.apply(&results).await;

                let written: Vec<_> = results
                    .iter()
                    .filter(|r| report.written.contains(&r.record_id))
                    .collect();
                stats.record_labels(written);
                let success = report.success_count();
                let filtered = report.filtered.len();
                let error = size.saturating_sub(success + filtered);
                stats.record_batch(outcome.provider, outcome.elapsed, success, error, filtered);
                settled.extend(report.settled_ids());
            }

            self.checkpoint
                .append(&settled)
                .await
                .map_err(PipelineError::Checkpoint)?;

            let event = WaveProgress {
                wave,
                total_waves,
                completed_batches,
                total_batches,
                processed: stats.processed,
                errors: stats.errors,
                elapsed: started.elapsed(),
            };
            info!(
                wave,
                total_waves,
                processed = event.processed,
                errors = event.errors,
                "wave settled"
            );
            if let Some(hook) = &self.on_wave {
                hook(&event);
            }
        }

        summary.stats.elapsed = started.elapsed();

        // Clear only when every fetched record was written this run. Failed,
        // filtered and previously skipped records are still pending in the
        // store, and records past the fetch limit were never read.
        if !truncated && summary.stats.processed == fetched_count {
            self.checkpoint
                .clear()
                .await
                .map_err(PipelineError::Checkpoint)?;
            summary.checkpoint_cleared = true;
            info!("all pending records processed, checkpoint cleared");
        }

        Ok(summary)
    }
}
