//! Value converters.
//!
//! A converter turns one native scalar into its logical representation. It
//! never sees nulls (absence is handled by the appender before conversion).
//! `ConversionError::OutOfTypeBounds` means the value is well-formed but does
//! not fit the target; `ConversionError::Fatal` means the value itself is bad.

use std::fmt::Display;
use std::marker::PhantomData;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::error::ConversionError;

/// Converts one native scalar into one logical scalar.
pub trait ValueConverter<In, Out>: Send + Sync {
    fn convert(&self, value: In) -> Result<Out, ConversionError>;
}

/// How out-of-bounds values are handled by appenders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutOfBoundsPolicy {
    /// Append a null cell, log a warning and keep going.
    #[default]
    Lenient,
    /// Fail the query.
    Strict,
}

/// Earliest date representable by `Date`/`Timestamp` columns.
pub fn min_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or(NaiveDate::MIN)
}

/// First date past the range of `Date`/`Timestamp` columns.
pub fn max_date_exclusive() -> NaiveDate {
    NaiveDate::from_ymd_opt(2106, 1, 1).unwrap_or(NaiveDate::MAX)
}

/// Passes the value through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl<T: Send + Sync> ValueConverter<T, T> for Identity {
    #[inline]
    fn convert(&self, value: T) -> Result<T, ConversionError> {
        Ok(value)
    }
}

/// Integer conversion checked against the destination's exact range.
#[derive(Debug, Clone, Copy)]
pub struct CheckedInt<In, Out>(PhantomData<fn(In) -> Out>);

impl<In, Out> Default for CheckedInt<In, Out> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

impl<In, Out> ValueConverter<In, Out> for CheckedInt<In, Out>
where
    In: Copy + Display,
    Out: TryFrom<In>,
{
    #[inline]
    fn convert(&self, value: In) -> Result<Out, ConversionError> {
        Out::try_from(value).map_err(|_| {
            ConversionError::out_of_bounds(format!(
                "{} does not fit {}",
                value,
                std::any::type_name::<Out>()
            ))
        })
    }
}

/// `f32 -> f64`, always lossless.
#[derive(Debug, Clone, Copy, Default)]
pub struct FloatWiden;

impl ValueConverter<f32, f64> for FloatWiden {
    #[inline]
    fn convert(&self, value: f32) -> Result<f64, ConversionError> {
        Ok(f64::from(value))
    }
}

/// `f64 -> f32`; finite values beyond the `f32` range are out of bounds.
/// Precision loss within range is accepted.
#[derive(Debug, Clone, Copy, Default)]
pub struct FloatNarrow;

impl ValueConverter<f64, f32> for FloatNarrow {
    fn convert(&self, value: f64) -> Result<f32, ConversionError> {
        if value.is_finite() && value.abs() > f64::from(f32::MAX) {
            return Err(ConversionError::out_of_bounds(format!(
                "{} exceeds f32 range",
                value
            )));
        }
        Ok(value as f32)
    }
}

/// `bool -> u8` for systems that encode booleans as a narrow integer.
#[derive(Debug, Clone, Copy, Default)]
pub struct BoolAsUint8;

impl ValueConverter<bool, u8> for BoolAsUint8 {
    #[inline]
    fn convert(&self, value: bool) -> Result<u8, ConversionError> {
        Ok(u8::from(value))
    }
}

/// Text stored as raw bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringToBytes;

impl ValueConverter<String, Vec<u8>> for StringToBytes {
    #[inline]
    fn convert(&self, value: String) -> Result<Vec<u8>, ConversionError> {
        Ok(value.into_bytes())
    }
}

/// Raw bytes that must be valid UTF-8.
#[derive(Debug, Clone, Copy, Default)]
pub struct BytesToString;

impl ValueConverter<Vec<u8>, String> for BytesToString {
    fn convert(&self, value: Vec<u8>) -> Result<String, ConversionError> {
        String::from_utf8(value)
            .map_err(|e| ConversionError::fatal(format!("invalid UTF-8: {}", e)))
    }
}

/// Date to days since epoch.
#[derive(Debug, Clone, Copy, Default)]
pub struct DateToDays;

impl ValueConverter<NaiveDate, i32> for DateToDays {
    fn convert(&self, value: NaiveDate) -> Result<i32, ConversionError> {
        check_date_range(value)?;
        let days = (value - min_date()).num_days();
        i32::try_from(days).map_err(|_| ConversionError::out_of_bounds(value.to_string()))
    }
}

/// Date to microseconds since epoch at midnight UTC.
#[derive(Debug, Clone, Copy, Default)]
pub struct DateToMicros;

impl ValueConverter<NaiveDate, i64> for DateToMicros {
    fn convert(&self, value: NaiveDate) -> Result<i64, ConversionError> {
        DateTimeToMicros.convert(value.and_time(NaiveTime::MIN))
    }
}

/// Datetime (interpreted as UTC) to microseconds since epoch.
#[derive(Debug, Clone, Copy, Default)]
pub struct DateTimeToMicros;

impl ValueConverter<NaiveDateTime, i64> for DateTimeToMicros {
    fn convert(&self, value: NaiveDateTime) -> Result<i64, ConversionError> {
        check_date_range(value.date())?;
        Ok(value.and_utc().timestamp_micros())
    }
}

/// Date rendered as `YYYY-MM-DD`. Any date is representable.
#[derive(Debug, Clone, Copy, Default)]
pub struct DateToString;

impl ValueConverter<NaiveDate, String> for DateToString {
    fn convert(&self, value: NaiveDate) -> Result<String, ConversionError> {
        Ok(value.format("%Y-%m-%d").to_string())
    }
}

/// Datetime rendered as ISO-8601 UTC with fractional seconds when present.
#[derive(Debug, Clone, Copy, Default)]
pub struct DateTimeToString;

impl ValueConverter<NaiveDateTime, String> for DateTimeToString {
    fn convert(&self, value: NaiveDateTime) -> Result<String, ConversionError> {
        Ok(value.format("%Y-%m-%dT%H:%M:%S%.fZ").to_string())
    }
}

fn check_date_range(date: NaiveDate) -> Result<(), ConversionError> {
    if date < min_date() || date >= max_date_exclusive() {
        return Err(ConversionError::out_of_bounds(format!(
            "date {} outside [{}, {})",
            date,
            min_date(),
            max_date_exclusive()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checked_int_narrowing() {
        let conv = CheckedInt::<i64, i8>::default();
        assert_eq!(conv.convert(127), Ok(127i8));
        assert_eq!(conv.convert(-128), Ok(-128i8));
        assert!(matches!(
            conv.convert(128),
            Err(ConversionError::OutOfTypeBounds(_))
        ));

        let conv = CheckedInt::<i32, u16>::default();
        assert!(matches!(
            conv.convert(-1),
            Err(ConversionError::OutOfTypeBounds(_))
        ));
        assert_eq!(conv.convert(65_535), Ok(u16::MAX));

        let conv = CheckedInt::<u64, i64>::default();
        assert!(conv.convert(u64::MAX).is_err());
        assert_eq!(conv.convert(i64::MAX as u64), Ok(i64::MAX));
    }

    #[test]
    fn test_float_conversions() {
        assert_eq!(FloatWiden.convert(1.5f32), Ok(1.5f64));
        assert_eq!(FloatWiden.convert(f32::MAX), Ok(f64::from(f32::MAX)));
        assert!(FloatNarrow.convert(1e300).is_err());
        assert_eq!(FloatNarrow.convert(0.25), Ok(0.25f32));
        assert!(FloatNarrow.convert(f64::INFINITY).unwrap().is_infinite());
    }

    #[test]
    fn test_bool_as_uint8() {
        assert_eq!(BoolAsUint8.convert(true), Ok(1));
        assert_eq!(BoolAsUint8.convert(false), Ok(0));
    }

    #[test]
    fn test_bytes_to_string_is_fatal_on_bad_utf8() {
        assert_eq!(BytesToString.convert(b"ok".to_vec()), Ok("ok".to_string()));
        assert!(matches!(
            BytesToString.convert(vec![0xff, 0xfe]),
            Err(ConversionError::Fatal(_))
        ));
    }

    #[test]
    fn test_dates() {
        let d = NaiveDate::from_ymd_opt(1970, 1, 11).unwrap();
        assert_eq!(DateToDays.convert(d), Ok(10));
        assert_eq!(DateToMicros.convert(d), Ok(10 * 86_400 * 1_000_000));
        assert_eq!(DateToString.convert(d), Ok("1970-01-11".to_string()));

        let before = NaiveDate::from_ymd_opt(1969, 12, 31).unwrap();
        assert!(matches!(
            DateToDays.convert(before),
            Err(ConversionError::OutOfTypeBounds(_))
        ));
        let after = NaiveDate::from_ymd_opt(2106, 1, 1).unwrap();
        assert!(DateToDays.convert(after).is_err());
        assert_eq!(DateToString.convert(before), Ok("1969-12-31".to_string()));
    }

    #[test]
    fn test_datetime() {
        let dt = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_micro_opt(12, 30, 0, 500)
            .unwrap();
        assert_eq!(
            DateTimeToMicros.convert(dt),
            Ok(dt.and_utc().timestamp_micros())
        );
        assert_eq!(
            DateTimeToString.convert(dt),
            Ok("2024-03-01T12:30:00.000500Z".to_string())
        );
    }
}
