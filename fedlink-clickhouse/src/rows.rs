//! `JSONCompactEachRowWithNamesAndTypes` response decoding.
//!
//! The body is one JSON array per line: column names, column types, then one
//! line per row. The cursor pulls body chunks only as `next` needs them, so
//! at most one partial line plus one chunk is buffered at a time.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::{NaiveDate, NaiveDateTime};
use futures::stream::{self, StreamExt};
use serde_json::Value;

use fedlink_connector::{
    scan_into, Acceptor, ColumnDescriptor, ConnectorError, NativeCursor, NativeValue,
};

use crate::error::{ClickHouseError, Result};
use crate::transport::BodyStream;
use crate::types::ClickHouseType;

pub const FORMAT: &str = "JSONCompactEachRowWithNamesAndTypes";

const DATE_FORMAT: &str = "%Y-%m-%d";
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

pub struct JsonEachRowCursor {
    body: BodyStream,
    buf: BytesMut,
    /// Prefix of `buf` already known to hold no newline.
    searched: usize,
    eof: bool,
    columns: Vec<ColumnDescriptor>,
    types: Vec<ClickHouseType>,
    current: Option<Vec<Option<NativeValue>>>,
    rows: usize,
    closed: bool,
}

impl std::fmt::Debug for JsonEachRowCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonEachRowCursor")
            .field("columns", &self.columns)
            .field("buffered", &self.buf.len())
            .field("eof", &self.eof)
            .field("rows", &self.rows)
            .finish()
    }
}

impl JsonEachRowCursor {
    /// Read the two header lines. Fails on unknown column types.
    pub async fn open(body: BodyStream) -> Result<Self> {
        let mut cursor = Self {
            body,
            buf: BytesMut::new(),
            searched: 0,
            eof: false,
            columns: Vec::new(),
            types: Vec::new(),
            current: None,
            rows: 0,
            closed: false,
        };

        let names = cursor
            .next_line()
            .await?
            .ok_or_else(|| ClickHouseError::decode("response has no column names"))?;
        let names: Vec<String> = serde_json::from_slice(&names)
            .map_err(|e| ClickHouseError::decode(format!("column names: {}", e)))?;
        let type_names = cursor
            .next_line()
            .await?
            .ok_or_else(|| ClickHouseError::decode("response has no column types"))?;
        let type_names: Vec<String> = serde_json::from_slice(&type_names)
            .map_err(|e| ClickHouseError::decode(format!("column types: {}", e)))?;
        if names.len() != type_names.len() {
            return Err(ClickHouseError::decode(format!(
                "{} column names but {} types",
                names.len(),
                type_names.len()
            )));
        }

        for (name, type_name) in names.into_iter().zip(type_names) {
            let ty = ClickHouseType::parse(&type_name)?;
            cursor
                .columns
                .push(ColumnDescriptor::new(name, type_name, ty.native_kind()?));
            cursor.types.push(ty);
        }
        Ok(cursor)
    }

    /// Cursor over a body that is already in memory.
    pub async fn from_bytes(body: impl Into<Bytes>) -> Result<Self> {
        Self::open(stream::iter([Ok(body.into())]).boxed()).await
    }

    pub fn rows_read(&self) -> usize {
        self.rows
    }

    /// Next non-empty line, or `None` at the end of the body. A line that is
    /// not a JSON array is a server exception written mid-stream.
    async fn next_line(&mut self) -> Result<Option<Bytes>> {
        loop {
            let newline = self.buf[self.searched..].iter().position(|b| *b == b'\n');
            let line = match newline {
                Some(i) => {
                    let line = self.buf.split_to(self.searched + i + 1).freeze();
                    self.searched = 0;
                    line
                }
                None if self.eof => {
                    if self.buf.is_empty() {
                        return Ok(None);
                    }
                    self.searched = 0;
                    self.buf.split().freeze()
                }
                None => {
                    self.searched = self.buf.len();
                    match self.body.next().await {
                        Some(chunk) => self.buf.extend_from_slice(&chunk?),
                        None => self.eof = true,
                    }
                    continue;
                }
            };

            let trimmed = trim(&line);
            if trimmed.is_empty() {
                continue;
            }
            if trimmed[0] != b'[' {
                return Err(ClickHouseError::server(
                    200,
                    String::from_utf8_lossy(trimmed).into_owned(),
                ));
            }
            return Ok(Some(line));
        }
    }

    fn decode_row(&self, line: &[u8]) -> Result<Vec<Option<NativeValue>>> {
        let values: Vec<Value> = serde_json::from_slice(line)
            .map_err(|e| ClickHouseError::decode(format!("row {}: {}", self.rows + 1, e)))?;
        if values.len() != self.types.len() {
            return Err(ClickHouseError::decode(format!(
                "row {} has {} values, expected {}",
                self.rows + 1,
                values.len(),
                self.types.len()
            )));
        }
        values
            .into_iter()
            .zip(&self.types)
            .map(|(value, ty)| decode_value(ty, value))
            .collect()
    }
}

fn trim(line: &[u8]) -> &[u8] {
    let start = line
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(line.len());
    let end = line
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &line[start..end]
}

fn mismatch(ty: &ClickHouseType, value: &Value) -> ClickHouseError {
    ClickHouseError::decode(format!("{} value expected, got {}", ty, value))
}

fn integer<T: TryFrom<i128>>(ty: &ClickHouseType, value: &Value) -> Result<T> {
    // 64-bit integers are quoted by default.
    let wide: Option<i128> = match value {
        Value::Number(n) => n
            .as_i64()
            .map(i128::from)
            .or_else(|| n.as_u64().map(i128::from)),
        Value::String(s) => s.parse().ok(),
        _ => None,
    };
    wide.and_then(|w| T::try_from(w).ok())
        .ok_or_else(|| mismatch(ty, value))
}

fn float(ty: &ClickHouseType, value: &Value) -> Result<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        // nan and inf arrive quoted.
        Value::String(s) => s.parse().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| mismatch(ty, value))
}

/// Decode one JSON cell. `null` is an absent value for any type.
pub fn decode_value(ty: &ClickHouseType, value: Value) -> Result<Option<NativeValue>> {
    use ClickHouseType as C;

    if value.is_null() {
        return Ok(None);
    }
    let decoded = match ty.base() {
        C::Bool => match &value {
            Value::Bool(b) => NativeValue::Bool(*b),
            Value::Number(n) if n.as_u64() == Some(0) => NativeValue::Bool(false),
            Value::Number(n) if n.as_u64() == Some(1) => NativeValue::Bool(true),
            other => return Err(mismatch(ty, other)),
        },
        C::Int8 => NativeValue::Int8(integer(ty, &value)?),
        C::Int16 => NativeValue::Int16(integer(ty, &value)?),
        C::Int32 => NativeValue::Int32(integer(ty, &value)?),
        C::Int64 => NativeValue::Int64(integer(ty, &value)?),
        C::UInt8 => NativeValue::Uint8(integer(ty, &value)?),
        C::UInt16 => NativeValue::Uint16(integer(ty, &value)?),
        C::UInt32 => NativeValue::Uint32(integer(ty, &value)?),
        C::UInt64 => NativeValue::Uint64(integer(ty, &value)?),
        C::Float32 => NativeValue::Float32(float(ty, &value)? as f32),
        C::Float64 => NativeValue::Float64(float(ty, &value)?),
        C::String | C::FixedString(_) => match value {
            Value::String(s) => NativeValue::String(s),
            other => return Err(mismatch(ty, &other)),
        },
        C::Date | C::Date32 => {
            let s = value.as_str().ok_or_else(|| mismatch(ty, &value))?;
            NativeValue::Date(
                NaiveDate::parse_from_str(s, DATE_FORMAT)
                    .map_err(|e| ClickHouseError::decode(format!("date '{}': {}", s, e)))?,
            )
        }
        C::DateTime { .. } | C::DateTime64 { .. } => {
            let s = value.as_str().ok_or_else(|| mismatch(ty, &value))?;
            NativeValue::DateTime(
                NaiveDateTime::parse_from_str(s, DATETIME_FORMAT)
                    .map_err(|e| ClickHouseError::decode(format!("datetime '{}': {}", s, e)))?,
            )
        }
        C::Array(_) => match value {
            Value::Array(items) => NativeValue::StringList(
                items
                    .into_iter()
                    .map(|item| match item {
                        Value::String(s) => Ok(s),
                        other => Err(mismatch(ty, &other)),
                    })
                    .collect::<Result<_>>()?,
            ),
            other => return Err(mismatch(ty, &other)),
        },
        C::Nullable(_) | C::LowCardinality(_) => {
            return Err(ClickHouseError::unsupported(ty.to_string()))
        }
    };
    Ok(Some(decoded))
}

#[async_trait]
impl NativeCursor for JsonEachRowCursor {
    fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    async fn next_result_set(&mut self) -> fedlink_connector::Result<bool> {
        Ok(false)
    }

    async fn next(&mut self) -> fedlink_connector::Result<bool> {
        self.current = None;
        if self.closed {
            return Ok(false);
        }
        let Some(line) = self.next_line().await? else {
            return Ok(false);
        };
        self.current = Some(self.decode_row(&line)?);
        self.rows += 1;
        Ok(true)
    }

    async fn scan(&mut self, acceptors: &mut [Acceptor]) -> fedlink_connector::Result<()> {
        let row = self
            .current
            .take()
            .ok_or_else(|| ConnectorError::cursor_protocol("scan without a current row"))?;
        scan_into(acceptors, row)
    }

    async fn close(&mut self) -> fedlink_connector::Result<()> {
        if !self.closed {
            self.closed = true;
            // Dropping the body ends the HTTP response.
            self.body = stream::empty().boxed();
            self.buf = BytesMut::new();
            self.searched = 0;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fedlink_connector::NativeKind;

    fn body(lines: &[&str]) -> Bytes {
        Bytes::from(lines.join("\n"))
    }

    async fn rows(cursor: &mut JsonEachRowCursor) -> Vec<Vec<Option<NativeValue>>> {
        let mut acceptors: Vec<Acceptor> = cursor
            .native_kinds()
            .into_iter()
            .map(Acceptor::new)
            .collect();
        let mut out = Vec::new();
        while cursor.next().await.unwrap() {
            cursor.scan(&mut acceptors).await.unwrap();
            out.push(acceptors.iter_mut().map(Acceptor::take).collect());
        }
        out
    }

    #[tokio::test]
    async fn test_header_and_rows() {
        let mut cursor = JsonEachRowCursor::from_bytes(body(&[
            r#"["id","name","tags"]"#,
            r#"["UInt64","Nullable(String)","Array(String)"]"#,
            r#"["18446744073709551615","a",["x","y"]]"#,
            r#"[2,null,[]]"#,
            "",
        ]))
        .await
        .unwrap();
        assert_eq!(
            cursor.native_kinds(),
            vec![NativeKind::Uint64, NativeKind::String, NativeKind::StringList]
        );
        let rows = rows(&mut cursor).await;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][0], Some(NativeValue::Uint64(u64::MAX)));
        assert_eq!(rows[1][1], None);
        assert_eq!(rows[1][2], Some(NativeValue::StringList(vec![])));
    }

    #[test]
    fn test_temporal_and_float_values() {
        let dt = ClickHouseType::parse("DateTime64(3)").unwrap();
        assert_eq!(
            decode_value(&dt, Value::String("2024-02-29 12:00:01.250".into())).unwrap(),
            Some(NativeValue::DateTime(
                NaiveDate::from_ymd_opt(2024, 2, 29)
                    .unwrap()
                    .and_hms_milli_opt(12, 0, 1, 250)
                    .unwrap()
            ))
        );
        let d = ClickHouseType::Date32;
        assert_eq!(
            decode_value(&d, Value::String("1900-01-01".into())).unwrap(),
            Some(NativeValue::Date(NaiveDate::from_ymd_opt(1900, 1, 1).unwrap()))
        );
        let f = ClickHouseType::Float64;
        assert!(matches!(
            decode_value(&f, Value::String("inf".into())).unwrap(),
            Some(NativeValue::Float64(v)) if v.is_infinite()
        ));
    }

    #[test]
    fn test_bad_values() {
        let ty = ClickHouseType::Int8;
        assert!(decode_value(&ty, serde_json::json!(300)).is_err());
        assert!(decode_value(&ty, serde_json::json!("x")).is_err());
        assert!(decode_value(&ClickHouseType::Date, serde_json::json!("2024-13-01")).is_err());
    }

    #[tokio::test]
    async fn test_exception_mid_stream() {
        let mut cursor = JsonEachRowCursor::from_bytes(body(&[
            r#"["n"]"#,
            r#"["Int32"]"#,
            r#"[1]"#,
            "Code: 241. DB::Exception: Memory limit exceeded",
        ]))
        .await
        .unwrap();
        assert!(cursor.next().await.unwrap());
        assert!(matches!(
            cursor.next().await,
            Err(ConnectorError::Transport(msg)) if msg.contains("Memory limit")
        ));
    }

    #[tokio::test]
    async fn test_bad_header() {
        assert!(JsonEachRowCursor::from_bytes(Bytes::new()).await.is_err());
        assert!(
            JsonEachRowCursor::from_bytes(body(&[r#"["a"]"#, r#"["Int32","Int8"]"#]))
                .await
                .is_err()
        );
        assert!(matches!(
            JsonEachRowCursor::from_bytes(body(&[r#"["a"]"#, r#"["Decimal(9, 2)"]"#])).await,
            Err(ClickHouseError::UnsupportedType(_))
        ));
    }

    #[tokio::test]
    async fn test_rows_split_across_chunks() {
        let chunks = [
            "[\"n\",\"s\"]\n[\"Int32\",",
            "\"String\"]\n[1,\"a",
            "b\"]",
            "\n",
            "[2,\"c\"]",
        ];
        let pulled = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = std::sync::Arc::clone(&pulled);
        let body = stream::iter(chunks)
            .map(move |c| {
                counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Ok(Bytes::from(c))
            })
            .boxed();

        let mut cursor = JsonEachRowCursor::open(body).await.unwrap();
        assert_eq!(cursor.columns().len(), 2);
        assert_eq!(pulled.load(std::sync::atomic::Ordering::SeqCst), 2);

        assert!(cursor.next().await.unwrap());
        // The first row ends in the fourth chunk; the fifth is not read yet.
        assert_eq!(pulled.load(std::sync::atomic::Ordering::SeqCst), 4);
        let mut acceptors: Vec<Acceptor> = cursor
            .native_kinds()
            .into_iter()
            .map(Acceptor::new)
            .collect();
        cursor.scan(&mut acceptors).await.unwrap();
        assert_eq!(acceptors[1].take(), Some(NativeValue::String("ab".into())));

        // The last row has no trailing newline.
        let rest = rows(&mut cursor).await;
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0][0], Some(NativeValue::Int32(2)));
        assert_eq!(cursor.rows_read(), 2);
    }

    #[tokio::test]
    async fn test_body_error_surfaces_as_transport() {
        let body = stream::iter(vec![
            Ok(Bytes::from("[\"n\"]\n[\"Int32\"]\n[1]\n")),
            Err(ClickHouseError::http("request failed: connection reset")),
        ])
        .boxed();
        let mut cursor = JsonEachRowCursor::open(body).await.unwrap();
        assert!(cursor.next().await.unwrap());
        assert!(matches!(
            cursor.next().await,
            Err(ConnectorError::Transport(msg)) if msg.contains("reset")
        ));
        cursor.close().await.unwrap();
        assert!(!cursor.next().await.unwrap());
    }
}
