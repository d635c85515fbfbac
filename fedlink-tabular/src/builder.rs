//! Column builders.
//!
//! A `ColumnBuilder` owns one column's storage for the duration of a batch.
//! Storage is pre-allocated to the batch capacity, up to
//! [`MAX_PREALLOCATED_ROWS`], so typical batches append without
//! reallocating; `finish()` hands the filled column out and leaves a fresh,
//! pre-allocated column in its place.

use crate::batch::Column;
use crate::error::{Result, TabularError};
use crate::types::LogicalType;

/// A scalar that can be appended to a flat column.
pub trait AppendValue: Sized {
    /// Push `Some(self)` onto `column`, failing if the column has another type.
    fn push_to(self, column: &mut Column) -> Result<()>;
}

macro_rules! impl_append_value {
    ($ty:ty, $($variant:ident)|+) => {
        impl AppendValue for $ty {
            #[inline]
            fn push_to(self, column: &mut Column) -> Result<()> {
                match column {
                    $(Column::$variant(v))|+ => {
                        v.push(Some(self));
                        Ok(())
                    }
                    other => Err(type_mismatch(stringify!($ty), other)),
                }
            }
        }
    };
}

impl_append_value!(bool, Bool);
impl_append_value!(i8, Int8);
impl_append_value!(i16, Int16);
impl_append_value!(i32, Int32 | Date);
impl_append_value!(i64, Int64 | Timestamp);
impl_append_value!(u8, Uint8);
impl_append_value!(u16, Uint16);
impl_append_value!(u32, Uint32);
impl_append_value!(u64, Uint64);
impl_append_value!(f32, Float);
impl_append_value!(f64, Double);
impl_append_value!(String, Utf8);
impl_append_value!(Vec<u8>, Bytes);

fn type_mismatch(value_type: &'static str, column: &Column) -> TabularError {
    let column_type = column
        .primitive_type()
        .map(|p| p.name())
        .unwrap_or("nested");
    TabularError::ValueType {
        value: value_type,
        column: column_type,
    }
}

/// Upper bound on rows reserved up front. Larger batches grow on demand.
pub const MAX_PREALLOCATED_ROWS: usize = 64 * 1024;

/// Builder for a single column of a batch.
#[derive(Debug, Clone)]
pub struct ColumnBuilder {
    logical_type: LogicalType,
    capacity: usize,
    column: Column,
}

impl ColumnBuilder {
    /// Create a builder pre-allocated for `capacity` rows, clamped to
    /// [`MAX_PREALLOCATED_ROWS`].
    pub fn new(logical_type: LogicalType, capacity: usize) -> Self {
        let capacity = capacity.min(MAX_PREALLOCATED_ROWS);
        let column = Column::with_capacity(&logical_type, capacity);
        Self {
            logical_type,
            capacity,
            column,
        }
    }

    pub fn logical_type(&self) -> &LogicalType {
        &self.logical_type
    }

    /// Rows appended since the last `finish()`.
    #[inline]
    pub fn len(&self) -> usize {
        self.column.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.column.is_empty()
    }

    #[inline]
    pub fn append_null(&mut self) {
        self.column.push_null();
    }

    /// Append a flat scalar value.
    #[inline]
    pub fn append<T: AppendValue>(&mut self, value: T) -> Result<()> {
        value.push_to(&mut self.column)
    }

    /// Append a struct row. `fill` receives the child columns in member order
    /// and must push exactly one cell onto each.
    pub fn append_struct<F>(&mut self, fill: F) -> Result<()>
    where
        F: FnOnce(&mut [Column]) -> Result<()>,
    {
        let rows = self.column.len();
        match &mut self.column {
            Column::Struct { children, validity } => {
                fill(children)?;
                let filled = children.iter().filter(|c| c.len() == rows + 1).count();
                if filled != children.len() {
                    return Err(TabularError::StructMembers {
                        members: children.len(),
                        filled,
                    });
                }
                validity.push(true);
                Ok(())
            }
            other => Err(type_mismatch("struct", other)),
        }
    }

    /// Append a list row from its items (`None` items are null elements).
    pub fn append_list<T, I>(&mut self, items: I) -> Result<()>
    where
        T: AppendValue,
        I: IntoIterator<Item = Option<T>>,
    {
        match &mut self.column {
            Column::List {
                offsets,
                values,
                validity,
            } => {
                for item in items {
                    match item {
                        Some(v) => v.push_to(values)?,
                        None => values.push_null(),
                    }
                }
                offsets.push(values.len());
                validity.push(true);
                Ok(())
            }
            other => Err(type_mismatch("list", other)),
        }
    }

    /// Approximate bytes accumulated in the current batch.
    #[inline]
    pub fn byte_size(&self) -> usize {
        self.column.byte_size()
    }

    /// Take the accumulated column, leaving a fresh pre-allocated one behind.
    pub fn finish(&mut self) -> Column {
        let fresh = Column::with_capacity(&self.logical_type, self.capacity);
        std::mem::replace(&mut self.column, fresh)
    }
}
