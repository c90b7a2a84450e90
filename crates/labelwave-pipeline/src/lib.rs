//! The labelling pipeline: pages unprocessed records out of a record store,
//! fans batches out across providers one wave at a time, repairs and
//! validates replies, writes labels back, and checkpoints after every wave.

mod dispatch;
mod error;
pub mod parse;
mod retry;
mod run;
pub mod source;
mod stats;
mod writer;

#[cfg(test)]
mod testing;

pub use dispatch::{BatchFailure, BatchOutcome, Dispatcher};
pub use error::PipelineError;
pub use parse::{MalformedResponse, parse};
pub use retry::{DEFAULT_CALL_TIMEOUT, RetryPolicy};
pub use run::{DEFAULT_BATCH_SIZE, RunController, RunOptions, RunSummary, WaveProgress};
pub use source::{DEFAULT_PAGE_SIZE, fetch_unprocessed};
pub use stats::{ProviderStats, RunStatistics, TOP_VALUES};
pub use writer::{PersistenceWriter, WriteReport};
