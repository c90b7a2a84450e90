//! Wave dispatch: one batch per provider, all in flight together.

use std::time::Duration;

use futures::future::join_all;
use labelwave_ai::{Prompt, Provider, ProviderError};
use labelwave_core::{Batch, LabelResult, Taxonomy};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::RetryPolicy;
use crate::parse::{MalformedResponse, parse};

/// Why a batch produced no results.
#[derive(Debug, Error)]
pub enum BatchFailure {
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),
    #[error("malformed response: {0}")]
    Malformed(#[from] MalformedResponse),
}

/// Settled state of one dispatched batch.
#[derive(Debug)]
pub struct BatchOutcome {
    /// Index into the provider list of the provider that handled the batch.
    pub provider: usize,
    pub batch: Batch,
    pub elapsed: Duration,
    pub result: Result<Vec<LabelResult>, BatchFailure>,
}

pub struct Dispatcher<'a> {
    providers: &'a [Provider],
    policy: &'a RetryPolicy,
    taxonomy: &'a Taxonomy,
}

impl<'a> Dispatcher<'a> {
    pub fn new(providers: &'a [Provider], policy: &'a RetryPolicy, taxonomy: &'a Taxonomy) -> Self {
        Self {
            providers,
            policy,
            taxonomy,
        }
    }

    /// Batches per wave: one per provider.
    pub fn wave_width(&self) -> usize {
        self.providers.len().max(1)
    }

    /// Run one wave and wait for every batch in it to settle.
    ///
    /// Batch *k* goes to provider *k mod P*. Callers pass at most
    /// [`wave_width`](Self::wave_width) batches so no provider has two calls
    /// in flight; any excess is handled the same way but shares providers.
    pub async fn run_wave(&self, batches: Vec<Batch>) -> Vec<BatchOutcome> {
        if self.providers.is_empty() {
            return Vec::new();
        }
        let calls = batches.into_iter().enumerate().map(|(k, batch)| {
            let index = k % self.providers.len();
            self.dispatch(index, batch)
        });
        join_all(calls).await
    }

    async fn dispatch(&self, index: usize, batch: Batch) -> BatchOutcome {
        let provider = &self.providers[index];
        let prompt = Prompt::for_batch(self.taxonomy, &batch);
        let started = Instant::now();

        let result = match self.policy.call(provider, &prompt).await {
            Ok(raw) => {
                debug!(provider = provider.name(), bytes = raw.len(), "response received");
                parse(&raw, &batch, self.taxonomy).map_err(|e| {
                    debug!(provider = provider.name(), raw = %raw, "unparseable response");
                    BatchFailure::from(e)
                })
            }
            Err(e) => Err(BatchFailure::Provider(e)),
        };
        if let Err(e) = &result {
            warn!(
                provider = provider.name(),
                records = batch.len(),
                error = %e,
                "batch failed"
            );
        }

        BatchOutcome {
            provider: index,
            batch,
            elapsed: started.elapsed(),
            result,
        }
    }
}
