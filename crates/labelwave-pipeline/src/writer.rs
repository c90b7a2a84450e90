//! Persistence writer: validated labels back into the record store.

use chrono::Utc;
use labelwave_core::LabelResult;
use labelwave_store::RecordStore;
use tracing::{debug, warn};

/// What happened to each result handed to [`PersistenceWriter::apply`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WriteReport {
    pub written: Vec<i64>,
    /// Below the confidence threshold; deliberately not written.
    pub filtered: Vec<i64>,
    pub failed: Vec<i64>,
}

impl WriteReport {
    pub fn success_count(&self) -> usize {
        self.written.len()
    }

    /// Ids the run may treat as done: written or deliberately filtered.
    pub fn settled_ids(&self) -> impl Iterator<Item = i64> + '_ {
        self.written.iter().chain(&self.filtered).copied()
    }
}

pub struct PersistenceWriter<'a> {
    store: &'a dyn RecordStore,
    min_confidence: Option<f32>,
}

impl<'a> PersistenceWriter<'a> {
    pub fn new(store: &'a dyn RecordStore, min_confidence: Option<f32>) -> Self {
        Self {
            store,
            min_confidence,
        }
    }

    fn passes(&self, result: &LabelResult) -> bool {
        match (self.min_confidence, result.confidence) {
            (Some(min), Some(c)) => c >= min,
            _ => true,
        }
    }

    /// Write results one record at a time.
    ///
    /// A failed write (error, or no row with that id) is logged and counted;
    /// it never stops the remaining writes and is never retried.
    pub async fn apply(&self, results: &[LabelResult]) -> WriteReport {
        let mut report = WriteReport::default();
        for result in results {
            let id = result.record_id;
            if !self.passes(result) {
                debug!(id, confidence = ?result.confidence, "below confidence threshold, skipped");
                report.filtered.push(id);
                continue;
            }
            match self.store.update_labels(result, Utc::now()).await {
                Ok(true) => report.written.push(id),
                Ok(false) => {
                    warn!(id, "label write matched no row");
                    report.failed.push(id);
                }
                Err(e) => {
                    warn!(id, error = %e, "label write failed");
                    report.failed.push(id);
                }
            }
        }
        report
    }
}
