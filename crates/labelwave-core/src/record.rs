//! Records, batches, and label results exchanged between pipeline stages.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Placeholder rendered for records with neither content nor title.
pub const EMPTY_CONTENT: &str = "(no content)";

/// A text record owned by the record store.
///
/// The pipeline only reads `id`, `content` and `title`; label columns are
/// written back through the store and never read here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: i64,
    pub content: Option<String>,
    /// Auxiliary prompt context, used when `content` is empty.
    pub title: Option<String>,
}

impl Record {
    pub fn new(id: i64, content: impl Into<String>) -> Self {
        Self {
            id,
            content: Some(content.into()),
            title: None,
        }
    }

    /// Text sent to a backend: content, then title, then a placeholder.
    pub fn text(&self) -> &str {
        self.content
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .or_else(|| self.title.as_deref().filter(|s| !s.trim().is_empty()))
            .unwrap_or(EMPTY_CONTENT)
    }
}

/// An ordered group of records submitted together in one backend call.
///
/// Order is significant: it is the fallback key when a backend's claimed
/// ids cannot be trusted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    records: Vec<Record>,
}

impl Batch {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn ids(&self) -> Vec<i64> {
        self.records.iter().map(|r| r.id).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Split records into fixed-size batches, preserving input order.
///
/// The last batch may be shorter. A `batch_size` of zero is treated as one.
pub fn split(records: Vec<Record>, batch_size: usize) -> Vec<Batch> {
    let size = batch_size.max(1);
    let mut batches = Vec::with_capacity(records.len().div_ceil(size));
    let mut iter = records.into_iter().peekable();
    while iter.peek().is_some() {
        batches.push(Batch::new(iter.by_ref().take(size).collect()));
    }
    batches
}

/// A validated label value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LabelValue {
    Text(String),
    List(Vec<String>),
}

impl LabelValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::List(_) => None,
        }
    }
}

/// Validated labels for one record, keyed by taxonomy field name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelResult {
    pub record_id: i64,
    pub fields: BTreeMap<String, LabelValue>,
    /// Self-reported confidence in `[0, 1]`, when the backend supplied one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

impl LabelResult {
    /// Text value of a field, if present and textual.
    pub fn text(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(LabelValue::as_text)
    }
}
