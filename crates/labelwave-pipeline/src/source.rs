//! Paged read of unprocessed records.

use labelwave_core::Record;
use labelwave_store::{RecordStore, StoreError};
use tracing::debug;

/// Records per page when the caller does not choose.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Read unprocessed records page by page, in id order.
///
/// Stops at the first short page or once `limit` records are collected; the
/// result never exceeds `limit`. Read errors are returned as-is.
pub async fn fetch_unprocessed(
    store: &dyn RecordStore,
    page_size: usize,
    limit: Option<usize>,
) -> Result<Vec<Record>, StoreError> {
    let page_size = page_size.max(1);
    let mut records = Vec::new();
    let mut offset = 0;

    loop {
        let page = store.fetch_pending(offset, page_size).await?;
        let fetched = page.len();
        debug!(offset, fetched, "fetched page");
        records.extend(page);
        offset += fetched;

        if let Some(limit) = limit
            && records.len() >= limit
        {
            records.truncate(limit);
            break;
        }
        if fetched < page_size {
            break;
        }
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use labelwave_store::MemoryRecordStore;

    use super::*;

    fn store(n: i64) -> MemoryRecordStore {
        MemoryRecordStore::new((1..=n).map(|id| Record::new(id, format!("post {id}"))))
    }

    #[tokio::test]
    async fn reads_all_pages() {
        let records = fetch_unprocessed(&store(25), 10, None).await.unwrap();
        assert_eq!(records.len(), 25);
        assert_eq!(records.first().map(|r| r.id), Some(1));
        assert_eq!(records.last().map(|r| r.id), Some(25));
    }

    #[tokio::test]
    async fn exact_multiple_needs_one_empty_page() {
        let records = fetch_unprocessed(&store(20), 10, None).await.unwrap();
        assert_eq!(records.len(), 20);
    }

    #[tokio::test]
    async fn limit_truncates_mid_page() {
        let records = fetch_unprocessed(&store(25), 10, Some(13)).await.unwrap();
        assert_eq!(records.iter().map(|r| r.id).collect::<Vec<_>>(), (1..=13).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn empty_store() {
        assert!(fetch_unprocessed(&store(0), 10, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn read_failure_propagates() {
        let store = store(5);
        store.set_fail_reads(true);
        assert!(fetch_unprocessed(&store, 10, None).await.is_err());
    }
}
