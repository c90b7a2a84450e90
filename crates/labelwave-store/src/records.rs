//! Record store contract.
//!
//! The pipeline reads records whose pending label column is unset, in id
//! order, one page at a time, and writes validated labels back one record at
//! a time. Writes are independent: there is no cross-record transaction.

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use labelwave_core::{LabelResult, LabelValue, Record};

use crate::StoreError;

/// Read/write access to the records being labelled.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// One page of unlabelled records, ordered by id ascending.
    async fn fetch_pending(&self, offset: usize, limit: usize) -> Result<Vec<Record>, StoreError>;

    /// Write every label field of `result` plus `analyzed_at`.
    ///
    /// Returns `false` when no row with that id exists.
    async fn update_labels(
        &self,
        result: &LabelResult,
        analyzed_at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;
}

/// Where records live in a relational store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordTable {
    pub table: String,
    pub id_column: String,
    pub content_column: String,
    pub title_column: Option<String>,
    /// Label column whose NULL marks a record as unprocessed.
    pub pending_column: String,
    pub analyzed_at_column: String,
}

impl Default for RecordTable {
    fn default() -> Self {
        Self {
            table: "posts".into(),
            id_column: "id".into(),
            content_column: "content".into(),
            title_column: Some("title".into()),
            pending_column: "intent".into(),
            analyzed_at_column: "analyzed_at".into(),
        }
    }
}

#[derive(Debug, Clone)]
struct MemoryRow {
    record: Record,
    labels: Option<BTreeMap<String, LabelValue>>,
}

/// In-memory record store for tests and dry runs.
///
/// Individual ids can be made to fail on write, and reads can be made to
/// fail wholesale, to exercise the pipeline's error paths.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    rows: Mutex<BTreeMap<i64, MemoryRow>>,
    failing_writes: Mutex<HashSet<i64>>,
    fail_reads: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryRecordStore {
    pub fn new(records: impl IntoIterator<Item = Record>) -> Self {
        let rows = records
            .into_iter()
            .map(|record| {
                (
                    record.id,
                    MemoryRow {
                        record,
                        labels: None,
                    },
                )
            })
            .collect();
        Self {
            rows: Mutex::new(rows),
            ..Self::default()
        }
    }

    /// Make writes for `id` return an error.
    pub fn fail_writes_for(&self, id: i64) {
        if let Ok(mut ids) = self.failing_writes.lock() {
            ids.insert(id);
        }
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Labels written for `id`, if any.
    pub fn labels(&self, id: i64) -> Option<BTreeMap<String, LabelValue>> {
        self.rows.lock().ok()?.get(&id)?.labels.clone()
    }

    /// Number of records still without labels.
    pub fn pending_count(&self) -> usize {
        self.rows
            .lock()
            .map(|rows| rows.values().filter(|r| r.labels.is_none()).count())
            .unwrap_or(0)
    }

    /// Total successful `update_labels` calls, including overwrites.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

fn poisoned() -> StoreError {
    StoreError::Other("memory store lock poisoned".into())
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn fetch_pending(&self, offset: usize, limit: usize) -> Result<Vec<Record>, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Other("memory store reads disabled".into()));
        }
        let rows = self.rows.lock().map_err(|_| poisoned())?;
        Ok(rows
            .values()
            .filter(|row| row.labels.is_none())
            .skip(offset)
            .take(limit)
            .map(|row| row.record.clone())
            .collect())
    }

    async fn update_labels(
        &self,
        result: &LabelResult,
        _analyzed_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        if self
            .failing_writes
            .lock()
            .map_err(|_| poisoned())?
            .contains(&result.record_id)
        {
            return Err(StoreError::WriteRejected(result.record_id));
        }
        let mut rows = self.rows.lock().map_err(|_| poisoned())?;
        match rows.get_mut(&result.record_id) {
            Some(row) => {
                row.labels = Some(result.fields.clone());
                self.writes.fetch_add(1, Ordering::SeqCst);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
