//! Storage layer: the record store the pipeline reads from and writes labels
//! to, and the checkpoint store that makes runs resumable.

mod checkpoint;
mod error;
mod records;

pub use checkpoint::{CheckpointStore, FileCheckpoint, MemoryCheckpoint};
pub use error::StoreError;
pub use records::{MemoryRecordStore, RecordStore, RecordTable};

#[cfg(feature = "duckdb")]
mod duck;
#[cfg(feature = "duckdb")]
pub use duck::DuckStore;
