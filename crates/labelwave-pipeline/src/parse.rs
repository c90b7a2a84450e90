//! Response parsing, identity repair, and field validation.
//!
//! Backend replies are untrusted free text. The parser locates a JSON array
//! in the reply, decides whether the ids the backend claims can be trusted,
//! and coerces every field into the taxonomy. It never panics: anything it
//! cannot use becomes either a field default or a [`MalformedResponse`].

use std::collections::HashSet;

use labelwave_core::{Batch, FieldKind, LabelResult, LabelValue, Taxonomy};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MalformedResponse {
    #[error("no JSON array found in response")]
    NoArray,
    #[error("array element {0} is not an object")]
    NotAnObject(usize),
}

/// Parse a raw reply for `batch` into validated label results.
///
/// When every claimed id belongs to the batch, entries are keyed by their
/// claims (a repeated id keeps its first entry). Otherwise entry *i* is
/// assigned to record *i* of the batch, up to the shorter of the two.
pub fn parse(
    raw: &str,
    batch: &Batch,
    taxonomy: &Taxonomy,
) -> Result<Vec<LabelResult>, MalformedResponse> {
    let entries = find_array(raw).ok_or(MalformedResponse::NoArray)?;
    let entries = entries
        .iter()
        .enumerate()
        .map(|(i, v)| v.as_object().ok_or(MalformedResponse::NotAnObject(i)))
        .collect::<Result<Vec<_>, _>>()?;

    let batch_ids: HashSet<i64> = batch.records().iter().map(|r| r.id).collect();
    let claims: Vec<Option<i64>> = entries.iter().map(|e| claimed_id(e)).collect();
    let trusted = claims
        .iter()
        .all(|c| c.is_some_and(|id| batch_ids.contains(&id)));

    let mut results = Vec::with_capacity(entries.len().min(batch.len()));
    if trusted {
        let mut seen = HashSet::new();
        for (entry, id) in entries.iter().zip(&claims) {
            let Some(id) = *id else { continue };
            if seen.insert(id) {
                results.push(validate(id, entry, taxonomy));
            }
        }
    } else {
        debug!(
            claimed = ?claims,
            expected = ?batch.ids(),
            "claimed ids do not match batch, mapping by position"
        );
        for (entry, record) in entries.iter().zip(batch.records()) {
            results.push(validate(record.id, entry, taxonomy));
        }
    }
    Ok(results)
}

/// The first non-empty array of objects in `raw`, falling back to the first
/// complete JSON array of any shape.
///
/// Bracketed prose such as footnotes (`[1]`, `[5, 9]`) ahead of the payload
/// is skipped. Text after the array (prose, closing markdown fences) is
/// ignored.
fn find_array(raw: &str) -> Option<Vec<Value>> {
    let mut first = None;
    for (start, _) in raw.match_indices('[') {
        let mut stream = serde_json::Deserializer::from_str(&raw[start..]).into_iter::<Value>();
        let Some(Ok(Value::Array(items))) = stream.next() else {
            continue;
        };
        if !items.is_empty() && items.iter().all(Value::is_object) {
            return Some(items);
        }
        first.get_or_insert(items);
    }
    first
}

/// Ids arrive as numbers or numeric strings depending on the backend.
fn claimed_id(entry: &Map<String, Value>) -> Option<i64> {
    match entry.get("id")? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn validate(record_id: i64, entry: &Map<String, Value>, taxonomy: &Taxonomy) -> LabelResult {
    let fields = taxonomy
        .fields
        .iter()
        .map(|field| {
            let raw = entry.get(&field.name);
            let value = match &field.kind {
                FieldKind::Choice { .. } => {
                    let choice = field.kind.resolve_choice(raw.and_then(Value::as_str));
                    LabelValue::Text(choice.unwrap_or_default().to_string())
                }
                FieldKind::Text { max_chars } => LabelValue::Text(
                    raw.and_then(Value::as_str)
                        .map(|s| s.trim().chars().take(*max_chars).collect())
                        .unwrap_or_default(),
                ),
                FieldKind::Keywords { max_items } => LabelValue::List(
                    raw.and_then(Value::as_array)
                        .map(|items| {
                            items
                                .iter()
                                .filter_map(Value::as_str)
                                .take(*max_items)
                                .map(str::to_string)
                                .collect()
                        })
                        .unwrap_or_default(),
                ),
            };
            (field.name.clone(), value)
        })
        .collect();

    let confidence = entry
        .get("confidence")
        .and_then(Value::as_f64)
        .filter(|c| (0.0..=1.0).contains(c))
        .map(|c| c as f32);

    LabelResult {
        record_id,
        fields,
        confidence,
    }
}
