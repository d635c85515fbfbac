//! Streamed MySQL rows.
//!
//! [`pump`] owns the connection while a statement runs and forwards the
//! result header, then each row, as [`Frame`]s over a bounded channel.
//! [`MySqlRows`] is the receiving end and decodes values lazily in `scan`.
//! Closing the cursor closes the channel, which stops the pump at its next
//! send and releases the connection.

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use mysql_async::consts::{ColumnFlags, ColumnType};
use mysql_async::prelude::Queryable;
use mysql_async::{Conn, Params, Value};
use tokio::sync::{mpsc, OwnedMutexGuard};
use tokio::task::JoinHandle;

use fedlink_connector::{scan_into, Acceptor, ColumnDescriptor, ConnectorError, NativeCursor, NativeValue};

use crate::error::{MySqlError, Result};
use crate::type_mapper::MySqlType;

/// Collation id of the `binary` character set.
const BINARY_CHARSET: u16 = 63;

/// One message from the statement task.
#[derive(Debug)]
pub enum Frame {
    /// Column names and type names, sent once before any row.
    Header(Vec<(String, String)>),
    Row(Vec<Value>),
    Failed(MySqlError),
}

/// Type name for result-set column metadata, in the form the type mapper
/// parses.
pub fn native_type_name(column_type: ColumnType, flags: ColumnFlags, charset: u16) -> String {
    use ColumnType::*;

    let binary = charset == BINARY_CHARSET;
    let (base, integer) = match column_type {
        MYSQL_TYPE_TINY => ("tinyint", true),
        MYSQL_TYPE_SHORT => ("smallint", true),
        MYSQL_TYPE_INT24 => ("mediumint", true),
        MYSQL_TYPE_LONG => ("int", true),
        MYSQL_TYPE_LONGLONG => ("bigint", true),
        MYSQL_TYPE_FLOAT => ("float", false),
        MYSQL_TYPE_DOUBLE => ("double", false),
        MYSQL_TYPE_DATE | MYSQL_TYPE_NEWDATE => ("date", false),
        MYSQL_TYPE_DATETIME | MYSQL_TYPE_DATETIME2 => ("datetime", false),
        MYSQL_TYPE_TIMESTAMP | MYSQL_TYPE_TIMESTAMP2 => ("timestamp", false),
        MYSQL_TYPE_VARCHAR | MYSQL_TYPE_VAR_STRING | MYSQL_TYPE_STRING if binary => {
            ("varbinary", false)
        }
        MYSQL_TYPE_VARCHAR | MYSQL_TYPE_VAR_STRING | MYSQL_TYPE_STRING => ("varchar", false),
        MYSQL_TYPE_TINY_BLOB | MYSQL_TYPE_MEDIUM_BLOB | MYSQL_TYPE_LONG_BLOB | MYSQL_TYPE_BLOB
            if binary =>
        {
            ("blob", false)
        }
        MYSQL_TYPE_TINY_BLOB | MYSQL_TYPE_MEDIUM_BLOB | MYSQL_TYPE_LONG_BLOB | MYSQL_TYPE_BLOB => {
            ("text", false)
        }
        MYSQL_TYPE_JSON => ("json", false),
        MYSQL_TYPE_ENUM => ("enum", false),
        MYSQL_TYPE_SET => ("set", false),
        other => {
            let name = format!("{:?}", other);
            return name
                .trim_start_matches("MYSQL_TYPE_")
                .to_ascii_lowercase();
        }
    };
    if integer && flags.contains(ColumnFlags::UNSIGNED_FLAG) {
        format!("{} unsigned", base)
    } else {
        base.to_string()
    }
}

/// Run `query` on the guarded connection and forward its result.
pub(crate) async fn pump(
    mut conn: OwnedMutexGuard<Option<Conn>>,
    query: String,
    params: Params,
    frames: mpsc::Sender<Frame>,
) {
    let Some(conn) = conn.as_mut() else {
        let _ = frames
            .send(Frame::Failed(MySqlError::driver("connection is closed")))
            .await;
        return;
    };
    let streamed = async {
        let mut result = conn.exec_iter(query.as_str(), params).await?;
        let header = result
            .columns_ref()
            .iter()
            .map(|c| {
                (
                    c.name_str().into_owned(),
                    native_type_name(c.column_type(), c.flags(), c.character_set()),
                )
            })
            .collect();
        if frames.send(Frame::Header(header)).await.is_err() {
            return Ok(());
        }
        while let Some(mut row) = result.next().await? {
            let values = (0..row.len())
                .map(|idx| row.take::<Value, _>(idx).unwrap_or(Value::NULL))
                .collect();
            if frames.send(Frame::Row(values)).await.is_err() {
                // Cursor closed; the driver discards the rest on next use.
                break;
            }
        }
        Ok::<(), MySqlError>(())
    };
    if let Err(e) = streamed.await {
        let _ = frames.send(Frame::Failed(e)).await;
    }
}

fn integer(value: &Value) -> Result<i128> {
    match value {
        Value::Int(v) => Ok(i128::from(*v)),
        Value::UInt(v) => Ok(i128::from(*v)),
        Value::Bytes(b) => std::str::from_utf8(b)
            .ok()
            .and_then(|s| s.trim().parse::<i128>().ok())
            .ok_or_else(|| MySqlError::decode(format!("'{}' is not an integer", String::from_utf8_lossy(b)))),
        other => Err(MySqlError::decode(format!("expected an integer, got {:?}", other))),
    }
}

fn float(value: &Value) -> Result<f64> {
    match value {
        Value::Float(v) => Ok(f64::from(*v)),
        Value::Double(v) => Ok(*v),
        Value::Int(v) => Ok(*v as f64),
        Value::UInt(v) => Ok(*v as f64),
        Value::Bytes(b) => std::str::from_utf8(b)
            .ok()
            .and_then(|s| s.trim().parse::<f64>().ok())
            .ok_or_else(|| MySqlError::decode(format!("'{}' is not a number", String::from_utf8_lossy(b)))),
        other => Err(MySqlError::decode(format!("expected a number, got {:?}", other))),
    }
}

fn narrow<T: TryFrom<i128>>(value: i128, ty: MySqlType) -> Result<T> {
    T::try_from(value).map_err(|_| MySqlError::decode(format!("{} out of range for {:?}", value, ty)))
}

/// `None` for the zero date, which has no calendar value.
fn calendar_date(year: u16, month: u8, day: u8) -> Result<Option<NaiveDate>> {
    if year == 0 && month == 0 && day == 0 {
        return Ok(None);
    }
    NaiveDate::from_ymd_opt(i32::from(year), u32::from(month), u32::from(day))
        .map(Some)
        .ok_or_else(|| MySqlError::decode(format!("invalid date {:04}-{:02}-{:02}", year, month, day)))
}

fn temporal(value: Value, ty: MySqlType) -> Result<Option<NativeValue>> {
    match value {
        Value::Date(year, month, day, hour, minute, second, micros) => {
            let Some(date) = calendar_date(year, month, day)? else {
                return Ok(None);
            };
            if ty == MySqlType::Date {
                return Ok(Some(NativeValue::Date(date)));
            }
            date.and_hms_micro_opt(u32::from(hour), u32::from(minute), u32::from(second), micros)
                .map(|dt| Some(NativeValue::DateTime(dt)))
                .ok_or_else(|| MySqlError::decode(format!("invalid time of day in {}", date)))
        }
        Value::Bytes(b) => {
            let text = String::from_utf8(b).map_err(|e| MySqlError::decode(e.to_string()))?;
            if text.starts_with("0000-00-00") {
                return Ok(None);
            }
            let parsed = if ty == MySqlType::Date {
                NaiveDate::parse_from_str(&text, "%Y-%m-%d").map(NativeValue::Date)
            } else {
                NaiveDateTime::parse_from_str(&text, "%Y-%m-%d %H:%M:%S%.f").map(NativeValue::DateTime)
            };
            parsed
                .map(Some)
                .map_err(|e| MySqlError::decode(format!("'{}': {}", text, e)))
        }
        other => Err(MySqlError::decode(format!("expected a date, got {:?}", other))),
    }
}

/// Decode one wire value for a column of type `ty`.
pub fn decode_value(value: Value, ty: MySqlType) -> Result<Option<NativeValue>> {
    use MySqlType as T;

    if value == Value::NULL {
        return Ok(None);
    }
    let decoded = match ty {
        T::TinyInt { unsigned: false } => NativeValue::Int8(narrow(integer(&value)?, ty)?),
        T::TinyInt { unsigned: true } => NativeValue::Uint8(narrow(integer(&value)?, ty)?),
        T::SmallInt { unsigned: false } => NativeValue::Int16(narrow(integer(&value)?, ty)?),
        T::SmallInt { unsigned: true } => NativeValue::Uint16(narrow(integer(&value)?, ty)?),
        T::Int { unsigned: false } => NativeValue::Int32(narrow(integer(&value)?, ty)?),
        T::Int { unsigned: true } => NativeValue::Uint32(narrow(integer(&value)?, ty)?),
        T::BigInt { unsigned: false } => NativeValue::Int64(narrow(integer(&value)?, ty)?),
        T::BigInt { unsigned: true } => NativeValue::Uint64(narrow(integer(&value)?, ty)?),
        T::Float => NativeValue::Float32(float(&value)? as f32),
        T::Double => NativeValue::Float64(float(&value)?),
        T::Text => match value {
            Value::Bytes(b) => {
                NativeValue::String(String::from_utf8(b).map_err(|e| MySqlError::decode(e.to_string()))?)
            }
            other => return Err(MySqlError::decode(format!("expected text, got {:?}", other))),
        },
        T::Binary => match value {
            Value::Bytes(b) => NativeValue::Bytes(b),
            other => return Err(MySqlError::decode(format!("expected bytes, got {:?}", other))),
        },
        T::Date | T::DateTime => return temporal(value, ty),
    };
    Ok(Some(decoded))
}

/// Receiving end of a running statement.
pub struct MySqlRows {
    frames: mpsc::Receiver<Frame>,
    task: Option<JoinHandle<()>>,
    columns: Vec<ColumnDescriptor>,
    types: Vec<MySqlType>,
    current: Option<Vec<Value>>,
    rows: u64,
    done: bool,
    closed: bool,
}

impl std::fmt::Debug for MySqlRows {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlRows")
            .field("columns", &self.columns)
            .field("rows", &self.rows)
            .field("closed", &self.closed)
            .finish()
    }
}

impl MySqlRows {
    /// Wait for the result header. Column types the mapper rejects fail
    /// here, before any row is read.
    pub async fn open(mut frames: mpsc::Receiver<Frame>, task: Option<JoinHandle<()>>) -> Result<Self> {
        let header = match frames.recv().await {
            Some(Frame::Header(header)) => header,
            Some(Frame::Failed(e)) => return Err(e),
            Some(Frame::Row(_)) => return Err(MySqlError::driver("row arrived before the result header")),
            None => return Err(MySqlError::driver("statement ended before the result header")),
        };

        let mut columns = Vec::with_capacity(header.len());
        let mut types = Vec::with_capacity(header.len());
        for (name, native_type) in header {
            let ty = MySqlType::parse(&native_type)
                .map_err(|_| MySqlError::unsupported(format!("column '{}': {}", name, native_type)))?;
            columns.push(ColumnDescriptor::new(name, native_type, ty.native_kind()));
            types.push(ty);
        }

        Ok(Self {
            frames,
            task,
            columns,
            types,
            current: None,
            rows: 0,
            done: false,
            closed: false,
        })
    }

    pub fn rows_read(&self) -> u64 {
        self.rows
    }
}

#[async_trait]
impl NativeCursor for MySqlRows {
    fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    async fn next_result_set(&mut self) -> fedlink_connector::Result<bool> {
        Ok(false)
    }

    async fn next(&mut self) -> fedlink_connector::Result<bool> {
        self.current = None;
        if self.closed || self.done {
            return Ok(false);
        }
        match self.frames.recv().await {
            Some(Frame::Row(values)) => {
                if values.len() != self.types.len() {
                    self.done = true;
                    return Err(ConnectorError::malformed_row(format!(
                        "row has {} values, expected {}",
                        values.len(),
                        self.types.len()
                    )));
                }
                self.current = Some(values);
                self.rows += 1;
                Ok(true)
            }
            Some(Frame::Failed(e)) => {
                self.done = true;
                Err(e.into())
            }
            Some(Frame::Header(_)) => {
                self.done = true;
                Err(ConnectorError::cursor_protocol("unexpected second result header"))
            }
            None => {
                self.done = true;
                Ok(false)
            }
        }
    }

    async fn scan(&mut self, acceptors: &mut [Acceptor]) -> fedlink_connector::Result<()> {
        let row = self
            .current
            .take()
            .ok_or_else(|| ConnectorError::cursor_protocol("scan without a current row"))?;
        let values = row
            .into_iter()
            .zip(&self.types)
            .map(|(value, ty)| decode_value(value, *ty))
            .collect::<Result<Vec<_>>>()?;
        scan_into(acceptors, values)
    }

    async fn close(&mut self) -> fedlink_connector::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.frames.close();
        if let Some(task) = self.task.take() {
            task.await
                .map_err(|e| ConnectorError::transport(format!("statement task failed: {}", e)))?;
        }
        tracing::debug!(rows = self.rows, "mysql cursor closed");
        Ok(())
    }
}
