//! Native cursor contract.

use async_trait::async_trait;

use fedlink_tabular::LogicalColumn;

use crate::appender::ConverterCollection;
use crate::error::Result;
use crate::native::{Acceptor, NativeKind};
use crate::transformer::RowTransformer;

/// One column of the cursor's current result set, as the backend reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub name: String,
    /// Backend type name, as understood by the backend's type mapper.
    pub native_type: String,
    /// Scalar kind written into this column's acceptor.
    pub kind: NativeKind,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, native_type: impl Into<String>, kind: NativeKind) -> Self {
        Self {
            name: name.into(),
            native_type: native_type.into(),
            kind,
        }
    }
}

/// Backend row-iteration handle.
///
/// Lifecycle: the cursor starts positioned on its first result set, then
/// `{next_result_set?, next, scan}*`, then `close`. A cursor that needs
/// several native round trips (continuation tokens) hides them behind `next`.
#[async_trait]
pub trait NativeCursor: Send {
    /// Columns of the current result set.
    fn columns(&self) -> &[ColumnDescriptor];

    /// Advance to the next result set. `false` once there are none left.
    async fn next_result_set(&mut self) -> Result<bool>;

    /// Advance to the next row of the current result set.
    ///
    /// `Ok(false)` means the result set is exhausted; an error is sticky and
    /// ends iteration.
    async fn next(&mut self) -> Result<bool>;

    /// Write the current row into `acceptors`, one per column.
    async fn scan(&mut self, acceptors: &mut [Acceptor]) -> Result<()>;

    /// Release the cursor. Calling it again is a no-op.
    async fn close(&mut self) -> Result<()>;

    /// Native kinds of the current result set, in column order.
    fn native_kinds(&self) -> Vec<NativeKind> {
        self.columns().iter().map(|c| c.kind).collect()
    }

    /// Bind `columns` to this cursor's acceptor kinds.
    fn make_transformer(
        &self,
        columns: &[LogicalColumn],
        converters: &ConverterCollection,
    ) -> Result<RowTransformer> {
        RowTransformer::build(&self.native_kinds(), columns, converters)
    }
}
