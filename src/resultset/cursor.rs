//! Lazy cursor over a resultset

use super::ResultSet;
use crate::error::Result;
use crate::value::Row;
use std::collections::VecDeque;

/// Iterates a resultset's rows, running the query on first use
///
/// Without a batch size the whole result is fetched by the first `next()`.
/// With one, rows are fetched a window at a time inside the resultset's own
/// window, and storage is only asked again once the buffer is drained.
#[derive(Debug)]
pub struct Cursor {
    resultset: ResultSet,
    buffer: VecDeque<Row>,
    executed: bool,
    exhausted: bool,
    /// Rows fetched since the last reset
    fetched: u64,
}

impl Cursor {
    pub(crate) fn new(resultset: ResultSet) -> Self {
        Self {
            resultset,
            buffer: VecDeque::new(),
            executed: false,
            exhausted: false,
            fetched: 0,
        }
    }

    /// Next row, or `None` once every row has been returned
    pub async fn next(&mut self) -> Result<Option<Row>> {
        if self.buffer.is_empty() && !self.exhausted {
            self.fetch().await?;
        }
        Ok(self.buffer.pop_front())
    }

    /// Drain every remaining row
    pub async fn collect_all(&mut self) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        while let Some(row) = self.next().await? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Forget buffered rows; the next `next()` runs the query again
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.executed = false;
        self.exhausted = false;
        self.fetched = 0;
    }

    pub fn is_executed(&self) -> bool {
        self.executed
    }

    pub fn resultset(&self) -> &ResultSet {
        &self.resultset
    }

    async fn fetch(&mut self) -> Result<()> {
        let mut spec = self.resultset.build_select()?;

        let rows = match self.resultset.options.cursor_batch_size {
            None => {
                let rows = self.resultset.fetch(&spec).await?;
                self.exhausted = true;
                rows
            }
            Some(batch) => {
                let remaining = spec.limit.map(|limit| limit.saturating_sub(self.fetched));
                let take = remaining.map_or(batch, |r| r.min(batch));
                if take == 0 {
                    self.exhausted = true;
                    return Ok(());
                }
                let offset = spec.offset.unwrap_or(0).saturating_add(self.fetched);
                spec.offset = (offset > 0).then_some(offset);
                spec.limit = Some(take);

                let rows = self.resultset.fetch(&spec).await?;
                self.fetched += rows.len() as u64;
                if (rows.len() as u64) < take {
                    self.exhausted = true;
                }
                rows
            }
        };

        tracing::trace!(source = %self.resultset.source_name(), rows = rows.len(), "cursor fetched");
        self.executed = true;
        self.buffer.extend(rows);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo;
    use crate::resultset::ResultSetOptions;
    use crate::storage::MemoryStorage;
    use crate::value::Value;
    use rsql::OrderBy;
    use std::sync::Arc;

    async fn tracks(batch: Option<u64>) -> ResultSet {
        let registry = demo::registry().unwrap();
        let storage = MemoryStorage::new(&registry);
        demo::seed(&storage).await.unwrap();
        ResultSet::new(
            "Track",
            Arc::new(registry),
            Arc::new(storage),
            ResultSetOptions {
                cursor_batch_size: batch,
                ..Default::default()
            },
        )
        .order_by([OrderBy::asc("trackid")])
    }

    #[tokio::test]
    async fn test_cursor_drains_then_stays_empty() {
        let rs = tracks(None).await;
        let mut cursor = rs.cursor();
        assert!(!cursor.is_executed());

        let first = cursor.next().await.unwrap().unwrap();
        assert!(cursor.is_executed());
        assert_eq!(first.get("title"), Some(&Value::from("Girls & Boys")));

        assert_eq!(cursor.collect_all().await.unwrap().len(), 5);
        assert!(cursor.next().await.unwrap().is_none());
        assert!(cursor.next().await.unwrap().is_none());

        cursor.reset();
        assert!(!cursor.is_executed());
        assert_eq!(cursor.collect_all().await.unwrap().len(), 6);
    }

    #[tokio::test]
    async fn test_batched_cursor_respects_window() {
        let rs = tracks(Some(2)).await;
        let all = rs.cursor().collect_all().await.unwrap();
        assert_eq!(all, rs.all().await.unwrap());

        let windowed = rs.offset(1).rows(3);
        let rows = windowed.cursor().collect_all().await.unwrap();
        assert_eq!(rows, windowed.all().await.unwrap());
        assert_eq!(rows.len(), 3);
    }

    #[tokio::test]
    async fn test_build_errors_surface_on_first_next() {
        let rs = tracks(None).await.columns(["nope"]);
        let mut cursor = rs.cursor();
        assert!(cursor.next().await.is_err());
        assert!(!cursor.is_executed());
    }
}
