//! Appenders: move one acceptor's value into one column builder.
//!
//! [`ConverterCollection::appender`] resolves the `(NativeKind, LogicalType)`
//! pairing once per column when the row transformer is built. The returned
//! closure only runs the bound converter; it never inspects types per row.

use chrono::{NaiveDate, NaiveDateTime};
use fedlink_tabular::{AppendValue, Column, ColumnBuilder, LogicalType, PrimitiveType};

use crate::conversion::{
    BoolAsUint8, BytesToString, CheckedInt, DateTimeToMicros, DateTimeToString, DateToDays,
    DateToMicros, DateToString, FloatNarrow, FloatWiden, Identity, OutOfBoundsPolicy,
    StringToBytes, ValueConverter,
};
use crate::error::{ConnectorError, ConversionError, Result};
use crate::native::{Acceptor, NativeKind, NativeValue};

/// What an appender wrote for one cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Value,
    Null,
    /// The value did not fit and was replaced by null.
    OutOfBounds,
}

/// Per-column function moving the acceptor's value into the builder.
///
/// Always leaves the acceptor empty, whether or not appending succeeds.
pub type Appender =
    Box<dyn Fn(&mut Acceptor, &mut ColumnBuilder) -> Result<AppendOutcome> + Send + Sync>;

/// Extraction of a typed payload from a native value.
pub trait FromNative: Sized {
    fn from_native(value: NativeValue) -> std::result::Result<Self, NativeKind>;
}

macro_rules! impl_from_native {
    ($ty:ty, $variant:ident) => {
        impl FromNative for $ty {
            #[inline]
            fn from_native(value: NativeValue) -> std::result::Result<Self, NativeKind> {
                match value {
                    NativeValue::$variant(v) => Ok(v),
                    other => Err(other.kind()),
                }
            }
        }
    };
}

impl_from_native!(bool, Bool);
impl_from_native!(i8, Int8);
impl_from_native!(i16, Int16);
impl_from_native!(i32, Int32);
impl_from_native!(i64, Int64);
impl_from_native!(u8, Uint8);
impl_from_native!(u16, Uint16);
impl_from_native!(u32, Uint32);
impl_from_native!(u64, Uint64);
impl_from_native!(f32, Float32);
impl_from_native!(f64, Float64);
impl_from_native!(String, String);
impl_from_native!(Vec<u8>, Bytes);
impl_from_native!(NaiveDate, Date);
impl_from_native!(NaiveDateTime, DateTime);

/// Resolves appenders for `(native kind, logical type)` pairs.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConverterCollection {
    policy: OutOfBoundsPolicy,
}

impl ConverterCollection {
    pub fn new(policy: OutOfBoundsPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> OutOfBoundsPolicy {
        self.policy
    }

    /// Build the appender for one column.
    ///
    /// Fails with `UnsupportedType` when the pairing has no converter.
    pub fn appender(
        &self,
        column: &str,
        kind: NativeKind,
        logical_type: &LogicalType,
    ) -> Result<Appender> {
        let target = logical_type.unwrap_optional();
        let resolved = match target {
            LogicalType::Primitive(p) => self.primitive(column, kind, *p),
            LogicalType::List(item) => self.list(kind, item),
            LogicalType::Struct(members) => self.structure(kind, members),
            LogicalType::Optional(_) => None,
        };
        resolved.ok_or_else(|| {
            ConnectorError::unsupported_type(format!(
                "column '{}': no conversion from native {:?} to {}",
                column, kind, logical_type
            ))
        })
    }

    fn primitive(&self, column: &str, kind: NativeKind, target: PrimitiveType) -> Option<Appender> {
        use PrimitiveType as P;

        macro_rules! integer_target {
            ($in:ty) => {
                match target {
                    P::Int8 => Some(self.bind::<$in, i8, _>(column, CheckedInt::default())),
                    P::Int16 => Some(self.bind::<$in, i16, _>(column, CheckedInt::default())),
                    P::Int32 => Some(self.bind::<$in, i32, _>(column, CheckedInt::default())),
                    P::Int64 => Some(self.bind::<$in, i64, _>(column, CheckedInt::default())),
                    P::Uint8 => Some(self.bind::<$in, u8, _>(column, CheckedInt::default())),
                    P::Uint16 => Some(self.bind::<$in, u16, _>(column, CheckedInt::default())),
                    P::Uint32 => Some(self.bind::<$in, u32, _>(column, CheckedInt::default())),
                    P::Uint64 => Some(self.bind::<$in, u64, _>(column, CheckedInt::default())),
                    _ => None,
                }
            };
        }

        match (kind, target) {
            (NativeKind::Bool, P::Bool) => Some(self.bind::<bool, bool, _>(column, Identity)),
            (NativeKind::Bool, P::Uint8) => Some(self.bind::<bool, u8, _>(column, BoolAsUint8)),
            (NativeKind::Int8, _) => integer_target!(i8),
            (NativeKind::Int16, _) => integer_target!(i16),
            (NativeKind::Int32, _) => integer_target!(i32),
            (NativeKind::Int64, _) => integer_target!(i64),
            (NativeKind::Uint8, _) => integer_target!(u8),
            (NativeKind::Uint16, _) => integer_target!(u16),
            (NativeKind::Uint32, _) => integer_target!(u32),
            (NativeKind::Uint64, _) => integer_target!(u64),
            (NativeKind::Float32, P::Float) => Some(self.bind::<f32, f32, _>(column, Identity)),
            (NativeKind::Float32, P::Double) => Some(self.bind::<f32, f64, _>(column, FloatWiden)),
            (NativeKind::Float64, P::Double) => Some(self.bind::<f64, f64, _>(column, Identity)),
            (NativeKind::Float64, P::Float) => Some(self.bind::<f64, f32, _>(column, FloatNarrow)),
            (NativeKind::String, P::Utf8) => Some(self.bind::<String, String, _>(column, Identity)),
            (NativeKind::String, P::Bytes) => {
                Some(self.bind::<String, Vec<u8>, _>(column, StringToBytes))
            }
            (NativeKind::Bytes, P::Bytes) => {
                Some(self.bind::<Vec<u8>, Vec<u8>, _>(column, Identity))
            }
            (NativeKind::Bytes, P::Utf8) => {
                Some(self.bind::<Vec<u8>, String, _>(column, BytesToString))
            }
            (NativeKind::Date, P::Date) => Some(self.bind::<NaiveDate, i32, _>(column, DateToDays)),
            (NativeKind::Date, P::Timestamp) => {
                Some(self.bind::<NaiveDate, i64, _>(column, DateToMicros))
            }
            (NativeKind::Date, P::Utf8) => {
                Some(self.bind::<NaiveDate, String, _>(column, DateToString))
            }
            (NativeKind::DateTime, P::Timestamp) => {
                Some(self.bind::<NaiveDateTime, i64, _>(column, DateTimeToMicros))
            }
            (NativeKind::DateTime, P::Utf8) => {
                Some(self.bind::<NaiveDateTime, String, _>(column, DateTimeToString))
            }
            _ => None,
        }
    }

    /// Bind a converter into an appender closure.
    fn bind<In, Out, C>(&self, column: &str, conv: C) -> Appender
    where
        In: FromNative + 'static,
        Out: AppendValue + 'static,
        C: ValueConverter<In, Out> + 'static,
    {
        let column = column.to_string();
        let policy = self.policy;
        Box::new(move |acceptor, builder| {
            let Some(native) = acceptor.take() else {
                builder.append_null();
                return Ok(AppendOutcome::Null);
            };
            let value = In::from_native(native).map_err(|got| {
                ConnectorError::malformed_row(format!(
                    "column '{}': unexpected native {:?}",
                    column, got
                ))
            })?;
            match conv.convert(value) {
                Ok(out) => {
                    builder.append(out)?;
                    Ok(AppendOutcome::Value)
                }
                Err(ConversionError::OutOfTypeBounds(msg)) => match policy {
                    OutOfBoundsPolicy::Lenient => {
                        tracing::warn!(column = %column, reason = %msg, "value out of type bounds, appending null");
                        builder.append_null();
                        Ok(AppendOutcome::OutOfBounds)
                    }
                    OutOfBoundsPolicy::Strict => Err(ConnectorError::OutOfTypeBounds(format!(
                        "column '{}': {}",
                        column, msg
                    ))),
                },
                Err(ConversionError::Fatal(msg)) => Err(ConnectorError::Conversion(format!(
                    "column '{}': {}",
                    column, msg
                ))),
            }
        })
    }

    fn list(&self, kind: NativeKind, item: &LogicalType) -> Option<Appender> {
        if kind != NativeKind::StringList || item.as_primitive() != Some(PrimitiveType::Utf8) {
            return None;
        }
        Some(Box::new(|acceptor, builder| match acceptor.take() {
            None => {
                builder.append_null();
                Ok(AppendOutcome::Null)
            }
            Some(NativeValue::StringList(items)) => {
                builder.append_list(items.into_iter().map(Some))?;
                Ok(AppendOutcome::Value)
            }
            Some(other) => Err(ConnectorError::malformed_row(format!(
                "expected string list, got {:?}",
                other.kind()
            ))),
        }))
    }

    /// Hash fields fill struct members by name; absent fields become null
    /// members and fields without a member are dropped.
    fn structure(
        &self,
        kind: NativeKind,
        members: &[fedlink_tabular::StructMember],
    ) -> Option<Appender> {
        if kind != NativeKind::StringMap
            || members
                .iter()
                .any(|m| m.logical_type.as_primitive() != Some(PrimitiveType::Utf8))
        {
            return None;
        }
        let names: Vec<String> = members.iter().map(|m| m.name.clone()).collect();
        Some(Box::new(move |acceptor, builder| match acceptor.take() {
            None => {
                builder.append_null();
                Ok(AppendOutcome::Null)
            }
            Some(NativeValue::StringMap(mut fields)) => {
                builder.append_struct(|children: &mut [Column]| {
                    for (name, child) in names.iter().zip(children.iter_mut()) {
                        match fields.remove(name) {
                            Some(v) => v.push_to(child)?,
                            None => child.push_null(),
                        }
                    }
                    Ok(())
                })?;
                Ok(AppendOutcome::Value)
            }
            Some(other) => Err(ConnectorError::malformed_row(format!(
                "expected string map, got {:?}",
                other.kind()
            ))),
        }))
    }
}
