//! Table description for backends without a catalog.
//!
//! [`DescribeRows`] serves literal `(column_name, data_type)` pairs through the
//! [`NativeCursor`] contract. It never goes through a type mapper or value
//! converter; [`describe_table`] is what turns the pairs into logical columns.

use async_trait::async_trait;

use fedlink_tabular::LogicalColumn;

use crate::connection::Connection;
use crate::context::QueryContext;
use crate::cursor::{ColumnDescriptor, NativeCursor};
use crate::error::{ConnectorError, Result};
use crate::logging::log_close_error;
use crate::native::{scan_into, Acceptor, NativeKind, NativeValue};
use crate::type_mapper::{TypeMapper, TypeMappingSettings};

pub const COLUMN_NAME: &str = "column_name";
pub const DATA_TYPE: &str = "data_type";

/// Fixed two-column row source.
#[derive(Debug, Clone)]
pub struct DescribeRows {
    columns: [ColumnDescriptor; 2],
    rows: Vec<(String, String)>,
    /// Index of the current row; `None` before the first `next`.
    pos: Option<usize>,
    closed: bool,
}

impl DescribeRows {
    pub fn new<I, N, T>(rows: I) -> Self
    where
        I: IntoIterator<Item = (N, T)>,
        N: Into<String>,
        T: Into<String>,
    {
        Self {
            columns: [
                ColumnDescriptor::new(COLUMN_NAME, "varchar", NativeKind::String),
                ColumnDescriptor::new(DATA_TYPE, "varchar", NativeKind::String),
            ],
            rows: rows
                .into_iter()
                .map(|(n, t)| (n.into(), t.into()))
                .collect(),
            pos: None,
            closed: false,
        }
    }

    pub fn rows(&self) -> &[(String, String)] {
        &self.rows
    }
}

#[async_trait]
impl NativeCursor for DescribeRows {
    fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    async fn next_result_set(&mut self) -> Result<bool> {
        Ok(false)
    }

    async fn next(&mut self) -> Result<bool> {
        if self.closed {
            return Ok(false);
        }
        let next = self.pos.map_or(0, |p| p + 1);
        self.pos = Some(next.min(self.rows.len()));
        Ok(next < self.rows.len())
    }

    async fn scan(&mut self, acceptors: &mut [Acceptor]) -> Result<()> {
        let (name, data_type) = self
            .pos
            .and_then(|p| self.rows.get(p))
            .ok_or_else(|| ConnectorError::cursor_protocol("scan without a current row"))?;
        scan_into(
            acceptors,
            [
                Some(NativeValue::String(name.clone())),
                Some(NativeValue::String(data_type.clone())),
            ],
        )
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

/// Describe the connection's table as logical columns.
///
/// Runs the connection's describe pseudo-query, reads each
/// `(column_name, data_type)` row through two string acceptors and maps the
/// pair with `mapper`. The cursor is closed on every path.
pub async fn describe_table(
    connection: &dyn Connection,
    mapper: &dyn TypeMapper,
    settings: &TypeMappingSettings,
    ctx: &QueryContext,
) -> Result<Vec<LogicalColumn>> {
    let params = connection.describe_query();
    let mut cursor = connection.query(&params, ctx).await?;
    let result = read_description(cursor.as_mut(), mapper, settings, ctx).await;
    log_close_error(cursor.close().await, "close describe cursor");

    let columns = result?;
    let (database, table) = connection.from();
    tracing::debug!(database, table, columns = columns.len(), "table described");
    Ok(columns)
}

async fn read_description(
    cursor: &mut dyn NativeCursor,
    mapper: &dyn TypeMapper,
    settings: &TypeMappingSettings,
    ctx: &QueryContext,
) -> Result<Vec<LogicalColumn>> {
    let kinds = cursor.native_kinds();
    if kinds != [NativeKind::String, NativeKind::String] {
        return Err(ConnectorError::cursor_protocol(format!(
            "describe query must return two string columns, got {:?}",
            kinds
        )));
    }

    let mut acceptors = [
        Acceptor::new(NativeKind::String),
        Acceptor::new(NativeKind::String),
    ];
    let mut columns = Vec::new();
    while ctx.run(cursor.next()).await? {
        ctx.run(cursor.scan(&mut acceptors)).await?;
        let name = take_string(&mut acceptors[0], COLUMN_NAME)?;
        let data_type = take_string(&mut acceptors[1], DATA_TYPE)?;
        columns.push(mapper.map_column(&name, &data_type, settings)?);
    }
    Ok(columns)
}

fn take_string(acceptor: &mut Acceptor, field: &str) -> Result<String> {
    match acceptor.take() {
        Some(NativeValue::String(s)) => Ok(s),
        _ => Err(ConnectorError::malformed_row(format!(
            "describe row has no {}",
            field
        ))),
    }
}
