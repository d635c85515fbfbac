//! Native scalar values and acceptors.
//!
//! Backends describe every result column with a [`NativeKind`]: the smallest
//! native scalar that can hold any value the backend produces for that column.
//! The kind is resolved once when the row transformer is built; at row time the
//! cursor writes [`NativeValue`]s into [`Acceptor`] slots and no runtime type
//! inspection of destinations happens.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};

use crate::error::{ConnectorError, Result};

/// Closed set of native scalar kinds a cursor can scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeKind {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Float32,
    Float64,
    String,
    Bytes,
    Date,
    DateTime,
    /// Ordered list of strings (key-value list types).
    StringList,
    /// Field/value pairs (key-value hash types).
    StringMap,
}

/// One scanned native value.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeValue {
    Bool(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Uint8(u8),
    Uint16(u16),
    Uint32(u32),
    Uint64(u64),
    Float32(f32),
    Float64(f64),
    String(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    StringList(Vec<String>),
    StringMap(BTreeMap<String, String>),
}

impl NativeValue {
    pub fn kind(&self) -> NativeKind {
        match self {
            Self::Bool(_) => NativeKind::Bool,
            Self::Int8(_) => NativeKind::Int8,
            Self::Int16(_) => NativeKind::Int16,
            Self::Int32(_) => NativeKind::Int32,
            Self::Int64(_) => NativeKind::Int64,
            Self::Uint8(_) => NativeKind::Uint8,
            Self::Uint16(_) => NativeKind::Uint16,
            Self::Uint32(_) => NativeKind::Uint32,
            Self::Uint64(_) => NativeKind::Uint64,
            Self::Float32(_) => NativeKind::Float32,
            Self::Float64(_) => NativeKind::Float64,
            Self::String(_) => NativeKind::String,
            Self::Bytes(_) => NativeKind::Bytes,
            Self::Date(_) => NativeKind::Date,
            Self::DateTime(_) => NativeKind::DateTime,
            Self::StringList(_) => NativeKind::StringList,
            Self::StringMap(_) => NativeKind::StringMap,
        }
    }

    /// Approximate bytes this value occupies once appended to a column.
    pub fn estimated_size(&self) -> usize {
        match self {
            Self::Bool(_) | Self::Int8(_) | Self::Uint8(_) => 2,
            Self::Int16(_) | Self::Uint16(_) => 4,
            Self::Int32(_) | Self::Uint32(_) | Self::Float32(_) | Self::Date(_) => 8,
            Self::Int64(_) | Self::Uint64(_) | Self::Float64(_) | Self::DateTime(_) => 16,
            Self::String(s) => s.len() + 24,
            Self::Bytes(b) => b.len() + 24,
            Self::StringList(items) => 9 + items.iter().map(|s| s.len() + 24).sum::<usize>(),
            Self::StringMap(fields) => 1 + fields.values().map(|v| v.len() + 24).sum::<usize>(),
        }
    }
}

macro_rules! native_from {
    ($ty:ty, $variant:ident) => {
        impl From<$ty> for NativeValue {
            fn from(v: $ty) -> Self {
                Self::$variant(v)
            }
        }
    };
}

native_from!(bool, Bool);
native_from!(i8, Int8);
native_from!(i16, Int16);
native_from!(i32, Int32);
native_from!(i64, Int64);
native_from!(u8, Uint8);
native_from!(u16, Uint16);
native_from!(u32, Uint32);
native_from!(u64, Uint64);
native_from!(f32, Float32);
native_from!(f64, Float64);
native_from!(String, String);
native_from!(Vec<u8>, Bytes);
native_from!(NaiveDate, Date);
native_from!(NaiveDateTime, DateTime);
native_from!(Vec<String>, StringList);
native_from!(BTreeMap<String, String>, StringMap);

impl From<&str> for NativeValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

/// Reusable scan destination for one column.
///
/// The slot is written by `Scan` and emptied by the appender right after it
/// has been consumed, so a value never survives into the next row.
#[derive(Debug, Clone, PartialEq)]
pub struct Acceptor {
    kind: NativeKind,
    slot: Option<NativeValue>,
}

impl Acceptor {
    pub fn new(kind: NativeKind) -> Self {
        Self { kind, slot: None }
    }

    #[inline]
    pub fn kind(&self) -> NativeKind {
        self.kind
    }

    /// Store a scanned value (`None` = absent/null).
    pub fn put(&mut self, value: Option<NativeValue>) -> std::result::Result<(), NativeKind> {
        match value {
            Some(v) if v.kind() != self.kind => Err(v.kind()),
            value => {
                self.slot = value;
                Ok(())
            }
        }
    }

    /// Take the current value, leaving the slot empty.
    #[inline]
    pub fn take(&mut self) -> Option<NativeValue> {
        self.slot.take()
    }

    #[inline]
    pub fn peek(&self) -> Option<&NativeValue> {
        self.slot.as_ref()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slot.is_none()
    }
}

/// Write one row of values into the acceptors, position by position.
///
/// Cursor implementations use this from `scan`; arity and kind mismatches are
/// `MalformedRow`.
pub fn scan_into<I>(acceptors: &mut [Acceptor], values: I) -> Result<()>
where
    I: IntoIterator<Item = Option<NativeValue>>,
{
    let mut written = 0;
    for (idx, value) in values.into_iter().enumerate() {
        let acceptor = acceptors.get_mut(idx).ok_or_else(|| {
            ConnectorError::malformed_row(format!(
                "row has more values than the {} scan destinations",
                idx
            ))
        })?;
        let expected = acceptor.kind();
        acceptor
            .put(value)
            .map_err(|got| ConnectorError::kind_mismatch(idx, expected, got))?;
        written += 1;
    }
    if written != acceptors.len() {
        return Err(ConnectorError::malformed_row(format!(
            "row has {} values, expected {}",
            written,
            acceptors.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acceptor_put_take() {
        let mut a = Acceptor::new(NativeKind::Int64);
        a.put(Some(NativeValue::Int64(5))).unwrap();
        assert_eq!(a.peek(), Some(&NativeValue::Int64(5)));
        assert_eq!(a.take(), Some(NativeValue::Int64(5)));
        assert!(a.is_empty());

        assert_eq!(a.put(Some("x".into())), Err(NativeKind::String));
        assert!(a.is_empty());
    }

    #[test]
    fn test_scan_into_arity() {
        let mut acceptors = vec![
            Acceptor::new(NativeKind::String),
            Acceptor::new(NativeKind::Int32),
        ];
        scan_into(&mut acceptors, vec![Some("a".into()), None]).unwrap();
        assert_eq!(acceptors[0].peek(), Some(&NativeValue::String("a".into())));
        assert!(acceptors[1].is_empty());

        let err = scan_into(&mut acceptors, vec![Some("a".into())]).unwrap_err();
        assert!(matches!(err, ConnectorError::MalformedRow(_)));

        let err = scan_into(
            &mut acceptors,
            vec![Some("a".into()), Some(1i32.into()), None],
        )
        .unwrap_err();
        assert!(matches!(err, ConnectorError::MalformedRow(_)));
    }

    #[test]
    fn test_scan_into_kind_mismatch() {
        let mut acceptors = vec![Acceptor::new(NativeKind::Int32)];
        let err = scan_into(&mut acceptors, vec![Some(NativeValue::Int64(1))]).unwrap_err();
        assert!(err.to_string().contains("column 0"));
    }
}
