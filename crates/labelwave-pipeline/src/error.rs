use labelwave_ai::ProviderError;
use labelwave_store::StoreError;
use thiserror::Error;

/// Errors that abort a run. Everything else degrades into statistics.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no usable classification providers configured")]
    NoProviders,

    #[error("provider setup failed: {0}")]
    ProviderSetup(#[from] ProviderError),

    #[error("record store: {0}")]
    Storage(#[source] StoreError),

    #[error("checkpoint store: {0}")]
    Checkpoint(#[source] StoreError),
}
