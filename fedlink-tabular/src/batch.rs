//! Columnar batch format for connector results.
//!
//! This module provides the columnar storage that every backend result set is
//! materialized into. A `ColumnBatch` is immutable once built and describes
//! itself with the ordered `LogicalColumn` list of the query.
//!
//! # Design
//!
//! - **Columnar storage**: Data is stored in typed `Vec` per column, not per-row
//! - **Strongly typed**: All column access is through the `Column` enum, no `dyn Any`
//! - **Nested types**: Structs keep one child column per member plus a validity
//!   vector; lists keep an offsets vector into a single child column

use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;

use crate::builder::MAX_PREALLOCATED_ROWS;
use crate::error::{Result, TabularError};
use crate::types::{LogicalColumn, LogicalType, PrimitiveType};

/// Schema for a column batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchSchema {
    /// Column definitions in output order.
    pub columns: Vec<LogicalColumn>,
    /// Lookup by name.
    name_to_index: HashMap<String, usize>,
}

impl BatchSchema {
    /// Create a new batch schema from column definitions.
    pub fn new(columns: Vec<LogicalColumn>) -> Self {
        let name_to_index = columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.name.clone(), i))
            .collect();

        Self {
            columns,
            name_to_index,
        }
    }

    /// Get column index by name.
    #[inline]
    pub fn index_by_name(&self, name: &str) -> Option<usize> {
        self.name_to_index.get(name).copied()
    }

    /// Number of columns in the schema.
    #[inline]
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Logical types in column order.
    pub fn logical_types(&self) -> Vec<LogicalType> {
        self.columns.iter().map(|c| c.logical_type.clone()).collect()
    }
}

/// Column storage - typed arrays with optional values (nullable).
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Bool(Vec<Option<bool>>),
    Int8(Vec<Option<i8>>),
    Int16(Vec<Option<i16>>),
    Int32(Vec<Option<i32>>),
    Int64(Vec<Option<i64>>),
    Uint8(Vec<Option<u8>>),
    Uint16(Vec<Option<u16>>),
    Uint32(Vec<Option<u32>>),
    Uint64(Vec<Option<u64>>),
    Float(Vec<Option<f32>>),
    Double(Vec<Option<f64>>),
    Bytes(Vec<Option<Vec<u8>>>),
    Utf8(Vec<Option<String>>),
    /// Date: days since 1970-01-01
    Date(Vec<Option<i32>>),
    /// Timestamp: microseconds since epoch (UTC)
    Timestamp(Vec<Option<i64>>),
    /// One child per struct member, all of `validity.len()` rows.
    Struct {
        children: Vec<Column>,
        validity: Vec<bool>,
    },
    /// Row `i` spans `values[offsets[i]..offsets[i + 1]]`; `offsets` starts with 0.
    List {
        offsets: Vec<usize>,
        values: Box<Column>,
        validity: Vec<bool>,
    },
}

impl Column {
    /// Create an empty column for the given logical type.
    pub fn empty(logical_type: &LogicalType) -> Self {
        Self::with_capacity(logical_type, 0)
    }

    /// Create an empty column with pre-allocated capacity, clamped to
    /// [`MAX_PREALLOCATED_ROWS`].
    ///
    /// Optional wrappers are transparent: nullability lives in the schema and
    /// every column can hold nulls.
    pub fn with_capacity(logical_type: &LogicalType, capacity: usize) -> Self {
        let capacity = capacity.min(MAX_PREALLOCATED_ROWS);
        match logical_type {
            LogicalType::Optional(inner) => Self::with_capacity(inner, capacity),
            LogicalType::Primitive(p) => match p {
                PrimitiveType::Bool => Self::Bool(Vec::with_capacity(capacity)),
                PrimitiveType::Int8 => Self::Int8(Vec::with_capacity(capacity)),
                PrimitiveType::Int16 => Self::Int16(Vec::with_capacity(capacity)),
                PrimitiveType::Int32 => Self::Int32(Vec::with_capacity(capacity)),
                PrimitiveType::Int64 => Self::Int64(Vec::with_capacity(capacity)),
                PrimitiveType::Uint8 => Self::Uint8(Vec::with_capacity(capacity)),
                PrimitiveType::Uint16 => Self::Uint16(Vec::with_capacity(capacity)),
                PrimitiveType::Uint32 => Self::Uint32(Vec::with_capacity(capacity)),
                PrimitiveType::Uint64 => Self::Uint64(Vec::with_capacity(capacity)),
                PrimitiveType::Float => Self::Float(Vec::with_capacity(capacity)),
                PrimitiveType::Double => Self::Double(Vec::with_capacity(capacity)),
                PrimitiveType::Bytes => Self::Bytes(Vec::with_capacity(capacity)),
                PrimitiveType::Utf8 => Self::Utf8(Vec::with_capacity(capacity)),
                PrimitiveType::Date => Self::Date(Vec::with_capacity(capacity)),
                PrimitiveType::Timestamp => Self::Timestamp(Vec::with_capacity(capacity)),
            },
            LogicalType::Struct(members) => Self::Struct {
                children: members
                    .iter()
                    .map(|m| Self::with_capacity(&m.logical_type, capacity))
                    .collect(),
                validity: Vec::with_capacity(capacity),
            },
            LogicalType::List(item) => {
                let mut offsets = Vec::with_capacity(capacity + 1);
                offsets.push(0);
                Self::List {
                    offsets,
                    values: Box::new(Self::with_capacity(item, capacity)),
                    validity: Vec::with_capacity(capacity),
                }
            }
        }
    }

    /// Get the number of rows in this column.
    #[inline]
    pub fn len(&self) -> usize {
        match self {
            Self::Bool(v) => v.len(),
            Self::Int8(v) => v.len(),
            Self::Int16(v) => v.len(),
            Self::Int32(v) | Self::Date(v) => v.len(),
            Self::Int64(v) | Self::Timestamp(v) => v.len(),
            Self::Uint8(v) => v.len(),
            Self::Uint16(v) => v.len(),
            Self::Uint32(v) => v.len(),
            Self::Uint64(v) => v.len(),
            Self::Float(v) => v.len(),
            Self::Double(v) => v.len(),
            Self::Bytes(v) => v.len(),
            Self::Utf8(v) => v.len(),
            Self::Struct { validity, .. } | Self::List { validity, .. } => validity.len(),
        }
    }

    /// Check if the column is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check if value at index is null (out-of-range indices count as null).
    pub fn is_null(&self, idx: usize) -> bool {
        fn slot<T>(v: &[Option<T>], idx: usize) -> bool {
            v.get(idx).map_or(true, |v| v.is_none())
        }
        match self {
            Self::Bool(v) => slot(v, idx),
            Self::Int8(v) => slot(v, idx),
            Self::Int16(v) => slot(v, idx),
            Self::Int32(v) | Self::Date(v) => slot(v, idx),
            Self::Int64(v) | Self::Timestamp(v) => slot(v, idx),
            Self::Uint8(v) => slot(v, idx),
            Self::Uint16(v) => slot(v, idx),
            Self::Uint32(v) => slot(v, idx),
            Self::Uint64(v) => slot(v, idx),
            Self::Float(v) => slot(v, idx),
            Self::Double(v) => slot(v, idx),
            Self::Bytes(v) => slot(v, idx),
            Self::Utf8(v) => slot(v, idx),
            Self::Struct { validity, .. } | Self::List { validity, .. } => {
                !validity.get(idx).copied().unwrap_or(false)
            }
        }
    }

    /// Whether this column's storage can hold values of `logical_type`.
    pub fn matches(&self, logical_type: &LogicalType) -> bool {
        match (self, logical_type.unwrap_optional()) {
            (Self::Struct { children, .. }, LogicalType::Struct(members)) => {
                children.len() == members.len()
                    && children
                        .iter()
                        .zip(members)
                        .all(|(c, m)| c.matches(&m.logical_type))
            }
            (Self::List { values, .. }, LogicalType::List(item)) => values.matches(item),
            (_, LogicalType::Primitive(p)) => self.primitive_type() == Some(*p),
            _ => false,
        }
    }

    /// Primitive type of a flat column; `None` for structs and lists.
    pub fn primitive_type(&self) -> Option<PrimitiveType> {
        let p = match self {
            Self::Bool(_) => PrimitiveType::Bool,
            Self::Int8(_) => PrimitiveType::Int8,
            Self::Int16(_) => PrimitiveType::Int16,
            Self::Int32(_) => PrimitiveType::Int32,
            Self::Int64(_) => PrimitiveType::Int64,
            Self::Uint8(_) => PrimitiveType::Uint8,
            Self::Uint16(_) => PrimitiveType::Uint16,
            Self::Uint32(_) => PrimitiveType::Uint32,
            Self::Uint64(_) => PrimitiveType::Uint64,
            Self::Float(_) => PrimitiveType::Float,
            Self::Double(_) => PrimitiveType::Double,
            Self::Bytes(_) => PrimitiveType::Bytes,
            Self::Utf8(_) => PrimitiveType::Utf8,
            Self::Date(_) => PrimitiveType::Date,
            Self::Timestamp(_) => PrimitiveType::Timestamp,
            Self::Struct { .. } | Self::List { .. } => return None,
        };
        Some(p)
    }

    /// Append a null cell. Struct children and list offsets stay aligned.
    pub fn push_null(&mut self) {
        match self {
            Self::Bool(v) => v.push(None),
            Self::Int8(v) => v.push(None),
            Self::Int16(v) => v.push(None),
            Self::Int32(v) | Self::Date(v) => v.push(None),
            Self::Int64(v) | Self::Timestamp(v) => v.push(None),
            Self::Uint8(v) => v.push(None),
            Self::Uint16(v) => v.push(None),
            Self::Uint32(v) => v.push(None),
            Self::Uint64(v) => v.push(None),
            Self::Float(v) => v.push(None),
            Self::Double(v) => v.push(None),
            Self::Bytes(v) => v.push(None),
            Self::Utf8(v) => v.push(None),
            Self::Struct { children, validity } => {
                for child in children.iter_mut() {
                    child.push_null();
                }
                validity.push(false);
            }
            Self::List {
                offsets, validity, ..
            } => {
                let last = offsets.last().copied().unwrap_or(0);
                offsets.push(last);
                validity.push(false);
            }
        }
    }

    /// Get boolean value at index (returns None if wrong type or null).
    #[inline]
    pub fn get_bool(&self, idx: usize) -> Option<bool> {
        match self {
            Self::Bool(v) => v.get(idx).and_then(|v| *v),
            _ => None,
        }
    }

    /// Get any integer value at index widened to i128 (None if wrong type or null).
    pub fn get_integer(&self, idx: usize) -> Option<i128> {
        match self {
            Self::Int8(v) => v.get(idx).and_then(|v| v.map(i128::from)),
            Self::Int16(v) => v.get(idx).and_then(|v| v.map(i128::from)),
            Self::Int32(v) | Self::Date(v) => v.get(idx).and_then(|v| v.map(i128::from)),
            Self::Int64(v) | Self::Timestamp(v) => v.get(idx).and_then(|v| v.map(i128::from)),
            Self::Uint8(v) => v.get(idx).and_then(|v| v.map(i128::from)),
            Self::Uint16(v) => v.get(idx).and_then(|v| v.map(i128::from)),
            Self::Uint32(v) => v.get(idx).and_then(|v| v.map(i128::from)),
            Self::Uint64(v) => v.get(idx).and_then(|v| v.map(i128::from)),
            _ => None,
        }
    }

    /// Get f64 value at index (returns None if wrong type or null).
    #[inline]
    pub fn get_f64(&self, idx: usize) -> Option<f64> {
        match self {
            Self::Double(v) => v.get(idx).and_then(|v| *v),
            Self::Float(v) => v.get(idx).and_then(|v| v.map(f64::from)),
            _ => None,
        }
    }

    /// Get string value at index (returns None if wrong type or null).
    #[inline]
    pub fn get_string(&self, idx: usize) -> Option<&str> {
        match self {
            Self::Utf8(v) => v.get(idx).and_then(|v| v.as_deref()),
            _ => None,
        }
    }

    /// Get bytes value at index (returns None if wrong type or null).
    #[inline]
    pub fn get_bytes(&self, idx: usize) -> Option<&[u8]> {
        match self {
            Self::Bytes(v) => v.get(idx).and_then(|v| v.as_deref()),
            _ => None,
        }
    }

    /// Child column of a struct.
    pub fn struct_child(&self, member: usize) -> Option<&Column> {
        match self {
            Self::Struct { children, .. } => children.get(member),
            _ => None,
        }
    }

    /// Range of child values for list row `idx` (None if not a list or null).
    pub fn list_range(&self, idx: usize) -> Option<Range<usize>> {
        match self {
            Self::List {
                offsets, validity, ..
            } if validity.get(idx).copied().unwrap_or(false) => {
                Some(offsets[idx]..offsets[idx + 1])
            }
            _ => None,
        }
    }

    /// Child values of a list column.
    pub fn list_values(&self) -> Option<&Column> {
        match self {
            Self::List { values, .. } => Some(values),
            _ => None,
        }
    }

    /// Approximate byte size of this column (for budget tracking).
    pub fn byte_size(&self) -> usize {
        match self {
            Self::Bool(v) => v.len() * 2, // Option<bool> is 2 bytes
            Self::Int8(v) => v.len() * 2,
            Self::Uint8(v) => v.len() * 2,
            Self::Int16(v) => v.len() * 4,
            Self::Uint16(v) => v.len() * 4,
            Self::Int32(v) | Self::Date(v) => v.len() * 8, // Option<i32> with alignment
            Self::Uint32(v) => v.len() * 8,
            Self::Float(v) => v.len() * 8,
            Self::Int64(v) | Self::Timestamp(v) => v.len() * 16,
            Self::Uint64(v) => v.len() * 16,
            Self::Double(v) => v.len() * 16,
            Self::Utf8(v) => v.iter().map(|s| s.as_ref().map_or(0, |s| s.len() + 24)).sum(),
            Self::Bytes(v) => v.iter().map(|b| b.as_ref().map_or(0, |b| b.len() + 24)).sum(),
            Self::Struct { children, validity } => {
                validity.len() + children.iter().map(|c| c.byte_size()).sum::<usize>()
            }
            Self::List {
                offsets,
                values,
                validity,
            } => validity.len() + offsets.len() * 8 + values.byte_size(),
        }
    }
}

/// Columnar batch of equal-length columns.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnBatch {
    /// Schema for this batch.
    pub schema: Arc<BatchSchema>,
    /// Column data in schema order.
    pub columns: Vec<Column>,
    /// Number of rows in the batch.
    pub num_rows: usize,
}

impl ColumnBatch {
    /// Create a new column batch.
    pub fn new(schema: Arc<BatchSchema>, columns: Vec<Column>) -> Result<Self> {
        if columns.len() != schema.num_columns() {
            return Err(TabularError::ColumnCount {
                expected: schema.num_columns(),
                actual: columns.len(),
            });
        }

        let num_rows = columns.first().map_or(0, |c| c.len());

        for (i, (col, def)) in columns.iter().zip(&schema.columns).enumerate() {
            if col.len() != num_rows {
                return Err(TabularError::RowCount {
                    column: i,
                    expected: num_rows,
                    actual: col.len(),
                });
            }
            if !col.matches(&def.logical_type) {
                return Err(TabularError::StorageMismatch {
                    column: def.name.clone(),
                    logical_type: def.logical_type.to_string(),
                });
            }
        }

        Ok(Self {
            schema,
            columns,
            num_rows,
        })
    }

    /// Create an empty batch with the given schema.
    pub fn empty(schema: Arc<BatchSchema>) -> Self {
        let columns = schema
            .columns
            .iter()
            .map(|c| Column::empty(&c.logical_type))
            .collect();
        Self {
            schema,
            columns,
            num_rows: 0,
        }
    }

    /// Get column by name.
    #[inline]
    pub fn column_by_name(&self, name: &str) -> Option<&Column> {
        self.schema.index_by_name(name).map(|i| &self.columns[i])
    }

    /// Get column by index.
    #[inline]
    pub fn column(&self, index: usize) -> Option<&Column> {
        self.columns.get(index)
    }

    /// Check if the batch is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.num_rows == 0
    }

    /// Approximate byte size of this batch (for budget tracking).
    pub fn byte_size(&self) -> usize {
        self.columns.iter().map(|c| c.byte_size()).sum()
    }
}
