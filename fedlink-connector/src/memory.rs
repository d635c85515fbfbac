//! In-memory cursor and connection.
//!
//! Backs the tests and any caller that already has rows in memory.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::connection::{Connection, QueryParams};
use crate::context::QueryContext;
use crate::cursor::{ColumnDescriptor, NativeCursor};
use crate::describe::DescribeRows;
use crate::error::{ConnectorError, Result};
use crate::native::{scan_into, Acceptor, NativeValue};

/// One result set: column descriptors plus rows of optional values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub columns: Vec<ColumnDescriptor>,
    pub rows: Vec<Vec<Option<NativeValue>>>,
}

impl ResultSet {
    pub fn new(columns: Vec<ColumnDescriptor>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn with_row(mut self, row: Vec<Option<NativeValue>>) -> Self {
        self.rows.push(row);
        self
    }
}

/// Cursor over prepared result sets.
#[derive(Debug)]
pub struct MemoryCursor {
    sets: Vec<ResultSet>,
    set: usize,
    /// Rows consumed from the current set; the current row is `row - 1`.
    row: usize,
    fail_after: Option<usize>,
    rows_served: usize,
    closes: Arc<AtomicUsize>,
    closed: bool,
}

impl MemoryCursor {
    pub fn new(sets: Vec<ResultSet>) -> Self {
        let sets = if sets.is_empty() {
            vec![ResultSet::default()]
        } else {
            sets
        };
        Self {
            sets,
            set: 0,
            row: 0,
            fail_after: None,
            rows_served: 0,
            closes: Arc::new(AtomicUsize::new(0)),
            closed: false,
        }
    }

    /// Make `next` fail with a transport error after `rows` rows in total.
    pub fn fail_after(mut self, rows: usize) -> Self {
        self.fail_after = Some(rows);
        self
    }

    /// Counter of effective `close` calls (repeat calls are not counted).
    pub fn close_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.closes)
    }

    fn current(&self) -> &ResultSet {
        &self.sets[self.set]
    }
}

#[async_trait]
impl NativeCursor for MemoryCursor {
    fn columns(&self) -> &[ColumnDescriptor] {
        &self.current().columns
    }

    async fn next_result_set(&mut self) -> Result<bool> {
        if self.closed || self.set + 1 >= self.sets.len() {
            return Ok(false);
        }
        self.set += 1;
        self.row = 0;
        Ok(true)
    }

    async fn next(&mut self) -> Result<bool> {
        if self.closed {
            return Err(ConnectorError::cursor_protocol("cursor is closed"));
        }
        if self.fail_after.is_some_and(|n| self.rows_served >= n) {
            return Err(ConnectorError::transport("connection reset by peer"));
        }
        if self.row >= self.current().rows.len() {
            return Ok(false);
        }
        self.row += 1;
        self.rows_served += 1;
        Ok(true)
    }

    async fn scan(&mut self, acceptors: &mut [Acceptor]) -> Result<()> {
        let row = self
            .row
            .checked_sub(1)
            .and_then(|i| self.sets[self.set].rows.get(i))
            .ok_or_else(|| ConnectorError::cursor_protocol("scan without a current row"))?;
        scan_into(acceptors, row.iter().cloned())
    }

    async fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// Connection answering every query with the same prepared result sets.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnection {
    database: String,
    table: String,
    sets: Vec<ResultSet>,
    description: Vec<(String, String)>,
}

impl MemoryConnection {
    pub fn new(database: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            table: table.into(),
            ..Self::default()
        }
    }

    pub fn with_result_sets(mut self, sets: Vec<ResultSet>) -> Self {
        self.sets = sets;
        self
    }

    /// Rows returned for the describe pseudo-query.
    pub fn with_description<N: Into<String>, T: Into<String>>(
        mut self,
        rows: impl IntoIterator<Item = (N, T)>,
    ) -> Self {
        self.description = rows.into_iter().map(|(n, t)| (n.into(), t.into())).collect();
        self
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn query(
        &self,
        params: &QueryParams,
        ctx: &QueryContext,
    ) -> Result<Box<dyn NativeCursor>> {
        if ctx.is_cancelled() {
            return Err(ConnectorError::Cancelled);
        }
        if params.query_text == self.describe_query().query_text {
            return Ok(Box::new(DescribeRows::new(self.description.clone())));
        }
        Ok(Box::new(MemoryCursor::new(self.sets.clone())))
    }

    fn from(&self) -> (&str, &str) {
        (&self.database, &self.table)
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::NativeKind;

    fn one_column() -> Vec<ColumnDescriptor> {
        vec![ColumnDescriptor::new("n", "int", NativeKind::Int64)]
    }

    #[tokio::test]
    async fn test_iterates_result_sets() {
        let mut cursor = MemoryCursor::new(vec![
            ResultSet::new(one_column()).with_row(vec![Some(1i64.into())]),
            ResultSet::new(one_column()),
        ]);
        let mut acceptors = [Acceptor::new(NativeKind::Int64)];

        assert!(cursor.next().await.unwrap());
        cursor.scan(&mut acceptors).await.unwrap();
        assert_eq!(acceptors[0].take(), Some(NativeValue::Int64(1)));
        assert!(!cursor.next().await.unwrap());
        assert!(cursor.next_result_set().await.unwrap());
        assert!(!cursor.next().await.unwrap());
        assert!(!cursor.next_result_set().await.unwrap());
    }

    #[tokio::test]
    async fn test_close_counted_once() {
        let mut cursor = MemoryCursor::new(vec![]);
        let closes = cursor.close_counter();
        cursor.close().await.unwrap();
        cursor.close().await.unwrap();
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let mut cursor = MemoryCursor::new(vec![ResultSet::new(one_column())
            .with_row(vec![Some(1i64.into())])
            .with_row(vec![Some(2i64.into())])])
        .fail_after(1);
        assert!(cursor.next().await.unwrap());
        assert!(matches!(
            cursor.next().await,
            Err(ConnectorError::Transport(_))
        ));
    }
}
