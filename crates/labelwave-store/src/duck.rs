//! DuckDB record store and checkpoint table.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use arrow::array::{
    Array, Int32Array, Int64Array, LargeStringArray, StringArray, StringViewArray,
};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use duckdb::Connection;
use duckdb::types::Value;
use labelwave_core::{LabelResult, LabelValue, Progress, Record, Taxonomy};
use tracing::{debug, info};

use crate::{CheckpointStore, RecordStore, RecordTable, StoreError};

const CHECKPOINT_TABLE: &str = "labelwave_checkpoint";

/// DuckDB store holding the records to label.
///
/// Records are read in pages through Arrow result batches; labels are
/// written back with one `UPDATE` per record. The same database can also
/// hold the run checkpoint (see the [`CheckpointStore`] impl), which keeps
/// progress next to the data it describes.
///
/// Supports both in-memory (ephemeral) and persistent (file-backed) modes.
pub struct DuckStore {
    conn: Mutex<Connection>,
    table: RecordTable,
}

impl DuckStore {
    /// Open an in-memory DuckDB database.
    pub fn open(table: RecordTable) -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Mutex::new(conn),
            table,
        })
    }

    /// Open or create a persistent DuckDB database at the given path.
    pub fn open_persistent(path: &Path, table: RecordTable) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        info!(path = %path.display(), table = %table.table, "opened record store");
        Ok(Self {
            conn: Mutex::new(conn),
            table,
        })
    }

    pub fn table(&self) -> &RecordTable {
        &self.table
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Other("duckdb connection lock poisoned".into()))
    }

    /// Add a VARCHAR column per taxonomy field and the `analyzed_at` column,
    /// skipping columns that already exist.
    pub fn ensure_label_columns(&self, taxonomy: &Taxonomy) -> Result<(), StoreError> {
        let table = quote_ident(&self.table.table);
        let mut sql = String::new();
        for field in &taxonomy.fields {
            sql.push_str(&format!(
                "ALTER TABLE {table} ADD COLUMN IF NOT EXISTS {} VARCHAR;\n",
                quote_ident(&field.name)
            ));
        }
        sql.push_str(&format!(
            "ALTER TABLE {table} ADD COLUMN IF NOT EXISTS {} TIMESTAMP;\n",
            quote_ident(&self.table.analyzed_at_column)
        ));
        self.conn()?.execute_batch(&sql)?;
        Ok(())
    }

    /// Number of records whose pending column is still NULL.
    pub fn pending_count(&self) -> Result<usize, StoreError> {
        let sql = format!(
            "SELECT count(*)::BIGINT AS cnt FROM {} WHERE {} IS NULL",
            quote_ident(&self.table.table),
            quote_ident(&self.table.pending_column)
        );
        let batches = self.query_arrow(&sql)?;
        let batch = batches
            .first()
            .ok_or_else(|| StoreError::Other("count query returned no batches".into()))?;
        let count = get_i64(batch, "cnt", 0)?
            .ok_or_else(|| StoreError::Other("count query returned NULL".into()))?;
        Ok(count as usize)
    }

    // ── Escape hatches ──

    /// Execute arbitrary SQL and return Arrow RecordBatches.
    pub fn query_arrow(&self, sql: &str) -> Result<Vec<RecordBatch>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let batches: Vec<RecordBatch> = stmt.query_arrow([])?.collect();
        Ok(batches)
    }

    /// Execute one or more statements with no result (DDL, seeding).
    pub fn execute_batch(&self, sql: &str) -> Result<(), StoreError> {
        self.conn()?.execute_batch(sql)?;
        Ok(())
    }

    fn select_page_sql(&self, offset: usize, limit: usize) -> String {
        let t = &self.table;
        let title = match &t.title_column {
            Some(col) => format!("CAST({} AS VARCHAR)", quote_ident(col)),
            None => "NULL::VARCHAR".to_string(),
        };
        format!(
            "SELECT CAST({id} AS BIGINT) AS id, CAST({content} AS VARCHAR) AS content, {title} AS title
             FROM {table}
             WHERE {pending} IS NULL
             ORDER BY {id} ASC
             LIMIT {limit} OFFSET {offset}",
            id = quote_ident(&t.id_column),
            content = quote_ident(&t.content_column),
            table = quote_ident(&t.table),
            pending = quote_ident(&t.pending_column),
        )
    }

    fn ensure_checkpoint_table(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {CHECKPOINT_TABLE} (
                id           BIGINT PRIMARY KEY,
                processed_ms BIGINT NOT NULL
            )"
        ))?;
        Ok(())
    }
}

#[async_trait]
impl RecordStore for DuckStore {
    async fn fetch_pending(&self, offset: usize, limit: usize) -> Result<Vec<Record>, StoreError> {
        let batches = self.query_arrow(&self.select_page_sql(offset, limit))?;
        let mut records = Vec::with_capacity(limit);
        for batch in &batches {
            for row in 0..batch.num_rows() {
                let Some(id) = get_i64(batch, "id", row)? else {
                    continue;
                };
                records.push(Record {
                    id,
                    content: get_string(batch, "content", row)?,
                    title: get_string(batch, "title", row)?,
                });
            }
        }
        debug!(offset, limit, fetched = records.len(), "fetched pending page");
        Ok(records)
    }

    async fn update_labels(
        &self,
        result: &LabelResult,
        analyzed_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut assignments = Vec::with_capacity(result.fields.len() + 1);
        let mut params: Vec<Value> = Vec::with_capacity(result.fields.len() + 2);
        for (name, value) in &result.fields {
            assignments.push(format!("{} = ?", quote_ident(name)));
            params.push(Value::Text(match value {
                LabelValue::Text(s) => s.clone(),
                LabelValue::List(items) => serde_json::to_string(items)?,
            }));
        }
        assignments.push(format!(
            "{} = CAST(? AS TIMESTAMP)",
            quote_ident(&self.table.analyzed_at_column)
        ));
        params.push(Value::Text(
            analyzed_at.format("%Y-%m-%d %H:%M:%S%.6f").to_string(),
        ));
        params.push(Value::BigInt(result.record_id));

        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ?",
            quote_ident(&self.table.table),
            assignments.join(", "),
            quote_ident(&self.table.id_column),
        );
        let conn = self.conn()?;
        let updated = conn.execute(&sql, duckdb::params_from_iter(params))?;
        Ok(updated > 0)
    }
}

#[async_trait]
impl CheckpointStore for DuckStore {
    async fn load(&self) -> Result<Progress, StoreError> {
        {
            let conn = self.conn()?;
            Self::ensure_checkpoint_table(&conn)?;
        }
        let batches = self.query_arrow(&format!(
            "SELECT id, processed_ms FROM {CHECKPOINT_TABLE}"
        ))?;
        let mut progress = Progress::default();
        let mut latest: Option<i64> = None;
        for batch in &batches {
            for row in 0..batch.num_rows() {
                if let Some(id) = get_i64(batch, "id", row)? {
                    progress.processed_ids.insert(id);
                }
                if let Some(ms) = get_i64(batch, "processed_ms", row)? {
                    latest = latest.max(Some(ms));
                }
            }
        }
        progress.last_updated = latest.and_then(DateTime::<Utc>::from_timestamp_millis);
        Ok(progress)
    }

    async fn append(&self, ids: &[i64]) -> Result<(), StoreError> {
        let mut conn = self.conn()?;
        Self::ensure_checkpoint_table(&conn)?;
        let now = Utc::now().timestamp_millis();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {CHECKPOINT_TABLE} (id, processed_ms)
                 VALUES (?, ?)
                 ON CONFLICT DO NOTHING"
            ))?;
            for id in ids {
                stmt.execute(duckdb::params![*id, now])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.conn()?
            .execute_batch(&format!("DROP TABLE IF EXISTS {CHECKPOINT_TABLE}"))?;
        info!("checkpoint table dropped");
        Ok(())
    }
}

/// Quote an SQL identifier, doubling embedded quotes.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

// ── Arrow extraction helpers ──

fn column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a dyn Array, StoreError> {
    batch
        .column_by_name(name)
        .map(|c| c.as_ref())
        .ok_or_else(|| StoreError::Column {
            column: name.to_string(),
            detail: "missing from result".into(),
        })
}

/// Extract an integer id (handles Int64 and Int32).
fn get_i64(batch: &RecordBatch, name: &str, row: usize) -> Result<Option<i64>, StoreError> {
    let col = column(batch, name)?;
    if col.is_null(row) {
        return Ok(None);
    }
    if let Some(arr) = col.as_any().downcast_ref::<Int64Array>() {
        return Ok(Some(arr.value(row)));
    }
    if let Some(arr) = col.as_any().downcast_ref::<Int32Array>() {
        return Ok(Some(arr.value(row) as i64));
    }
    Err(StoreError::Column {
        column: name.to_string(),
        detail: format!("expected integer, got {:?}", col.data_type()),
    })
}

/// Extract a string value (handles Utf8, LargeUtf8 and Utf8View).
fn get_string(batch: &RecordBatch, name: &str, row: usize) -> Result<Option<String>, StoreError> {
    let col = column(batch, name)?;
    if col.is_null(row) {
        return Ok(None);
    }
    let any = col.as_any();
    let value = any
        .downcast_ref::<StringArray>()
        .map(|arr| arr.value(row).to_string())
        .or_else(|| {
            any.downcast_ref::<LargeStringArray>()
                .map(|arr| arr.value(row).to_string())
        })
        .or_else(|| {
            any.downcast_ref::<StringViewArray>()
                .map(|arr| arr.value(row).to_string())
        });
    match value {
        Some(v) => Ok(Some(v)),
        None => Err(StoreError::Column {
            column: name.to_string(),
            detail: format!("expected string, got {:?}", col.data_type()),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn seeded(n: i64) -> DuckStore {
        let store = DuckStore::open(RecordTable::default()).unwrap();
        store
            .execute_batch(
                "CREATE TABLE posts (id BIGINT PRIMARY KEY, title VARCHAR, content VARCHAR, intent VARCHAR)",
            )
            .unwrap();
        for id in 1..=n {
            store
                .execute_batch(&format!(
                    "INSERT INTO posts VALUES ({id}, 'title {id}', 'content {id}', NULL)"
                ))
                .unwrap();
        }
        store
            .ensure_label_columns(&Taxonomy::default_ugc())
            .unwrap();
        store
    }

    fn labels(id: i64, intent: &str) -> LabelResult {
        LabelResult {
            record_id: id,
            fields: BTreeMap::from([
                ("intent".to_string(), LabelValue::Text(intent.into())),
                (
                    "paired_keywords".to_string(),
                    LabelValue::List(vec!["stir fry".into(), "dinner".into()]),
                ),
            ]),
            confidence: None,
        }
    }

    #[tokio::test]
    async fn fetch_pending_pages_in_id_order() {
        let store = seeded(5);
        let first = store.fetch_pending(0, 3).await.unwrap();
        assert_eq!(first.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(first[0].content.as_deref(), Some("content 1"));
        assert_eq!(first[0].title.as_deref(), Some("title 1"));

        let second = store.fetch_pending(3, 3).await.unwrap();
        assert_eq!(second.iter().map(|r| r.id).collect::<Vec<_>>(), vec![4, 5]);
    }

    #[tokio::test]
    async fn fresh_table_needs_label_columns_before_fetch() {
        let store = DuckStore::open(RecordTable::default()).unwrap();
        store
            .execute_batch(
                "CREATE TABLE posts (id BIGINT, title VARCHAR, content VARCHAR);
                 INSERT INTO posts VALUES (1, 't', 'c'), (2, 't', 'c');",
            )
            .unwrap();
        assert!(store.fetch_pending(0, 10).await.is_err());

        store
            .ensure_label_columns(&Taxonomy::default_ugc())
            .unwrap();
        store
            .ensure_label_columns(&Taxonomy::default_ugc())
            .unwrap();
        let records = store.fetch_pending(0, 10).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(store.pending_count().unwrap(), 2);
    }

    #[tokio::test]
    async fn update_labels_clears_pending() {
        let store = seeded(3);
        assert!(store.update_labels(&labels(2, "question"), Utc::now()).await.unwrap());
        assert_eq!(store.pending_count().unwrap(), 2);

        let batches = store
            .query_arrow("SELECT intent, paired_keywords FROM posts WHERE id = 2")
            .unwrap();
        assert_eq!(get_string(&batches[0], "intent", 0).unwrap().as_deref(), Some("question"));
        assert_eq!(
            get_string(&batches[0], "paired_keywords", 0).unwrap().as_deref(),
            Some(r#"["stir fry","dinner"]"#)
        );

        let pending = store.fetch_pending(0, 10).await.unwrap();
        assert!(pending.iter().all(|r| r.id != 2));
    }

    #[tokio::test]
    async fn update_missing_row_reports_false() {
        let store = seeded(1);
        assert!(!store.update_labels(&labels(42, "other"), Utc::now()).await.unwrap());
    }

    #[tokio::test]
    async fn labels_are_bound_not_interpolated() {
        let store = seeded(1);
        let result = labels(1, "it's'); DROP TABLE posts; --");
        assert!(store.update_labels(&result, Utc::now()).await.unwrap());
        assert_eq!(store.pending_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn checkpoint_table_roundtrip() {
        let store = seeded(0);
        assert!(CheckpointStore::load(&store).await.unwrap().is_empty());

        store.append(&[3, 1, 2]).await.unwrap();
        store.append(&[2, 4]).await.unwrap();
        let progress = CheckpointStore::load(&store).await.unwrap();
        assert_eq!(progress.len(), 4);
        assert!(progress.last_updated.is_some());

        store.clear().await.unwrap();
        assert!(CheckpointStore::load(&store).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn persistent_store_survives_reopen() {
        let tmp = tempfile::TempDir::new().unwrap();
        let db_path = tmp.path().join("records.duckdb");

        let store = DuckStore::open_persistent(&db_path, RecordTable::default()).unwrap();
        store
            .execute_batch("CREATE TABLE posts (id BIGINT, title VARCHAR, content VARCHAR, intent VARCHAR)")
            .unwrap();
        store
            .execute_batch("INSERT INTO posts VALUES (1, NULL, 'a', NULL), (2, NULL, 'b', NULL)")
            .unwrap();
        store.ensure_label_columns(&Taxonomy::default_ugc()).unwrap();
        store.append(&[1]).await.unwrap();
        drop(store);

        let store = DuckStore::open_persistent(&db_path, RecordTable::default()).unwrap();
        assert_eq!(store.pending_count().unwrap(), 2);
        assert!(CheckpointStore::load(&store).await.unwrap().contains(1));
    }

    #[test]
    fn quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("intent"), "\"intent\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }
}
