//! ClickHouse type names.
//!
//! Parses the type strings ClickHouse reports (`Nullable(Int32)`,
//! `Array(LowCardinality(String))`, `DateTime64(3, 'UTC')`, ...) into a
//! [`ClickHouseType`] tree.

use std::fmt;
use std::str::FromStr;

use fedlink_connector::NativeKind;

use crate::error::{ClickHouseError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickHouseType {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    String,
    FixedString(usize),
    Date,
    Date32,
    DateTime {
        timezone: Option<String>,
    },
    DateTime64 {
        precision: u8,
        timezone: Option<String>,
    },
    Nullable(Box<ClickHouseType>),
    Array(Box<ClickHouseType>),
    LowCardinality(Box<ClickHouseType>),
}

impl ClickHouseType {
    pub fn parse(name: &str) -> Result<Self> {
        let name = name.trim();
        let (head, args) = match name.find('(') {
            Some(open) => {
                let inner = name[open + 1..]
                    .strip_suffix(')')
                    .ok_or_else(|| ClickHouseError::unsupported(format!("unbalanced type '{}'", name)))?;
                (&name[..open], Some(split_args(inner)))
            }
            None => (name, None),
        };

        let ty = match (head, args.as_deref()) {
            ("Bool" | "Boolean", None) => Self::Bool,
            ("Int8", None) => Self::Int8,
            ("Int16", None) => Self::Int16,
            ("Int32", None) => Self::Int32,
            ("Int64", None) => Self::Int64,
            ("UInt8", None) => Self::UInt8,
            ("UInt16", None) => Self::UInt16,
            ("UInt32", None) => Self::UInt32,
            ("UInt64", None) => Self::UInt64,
            ("Float32", None) => Self::Float32,
            ("Float64", None) => Self::Float64,
            ("String", None) => Self::String,
            ("FixedString", Some([n])) => Self::FixedString(
                n.parse()
                    .map_err(|_| ClickHouseError::unsupported(format!("bad FixedString length in '{}'", name)))?,
            ),
            ("Date", None) => Self::Date,
            ("Date32", None) => Self::Date32,
            ("DateTime", None) => Self::DateTime { timezone: None },
            ("DateTime", Some([tz])) => Self::DateTime {
                timezone: Some(unquote(tz)),
            },
            ("DateTime64", Some([p, rest @ ..])) if rest.len() <= 1 => {
                let precision: u8 = p
                    .parse()
                    .ok()
                    .filter(|p| *p <= 9)
                    .ok_or_else(|| ClickHouseError::unsupported(format!("bad DateTime64 precision in '{}'", name)))?;
                Self::DateTime64 {
                    precision,
                    timezone: rest.first().map(|tz| unquote(tz)),
                }
            }
            ("Nullable", Some([inner])) => Self::Nullable(Box::new(Self::parse(inner)?)),
            ("Array", Some([inner])) => Self::Array(Box::new(Self::parse(inner)?)),
            ("LowCardinality", Some([inner])) => Self::LowCardinality(Box::new(Self::parse(inner)?)),
            _ => return Err(ClickHouseError::unsupported(name.to_string())),
        };
        Ok(ty)
    }

    /// The type with `LowCardinality` and `Nullable` wrappers removed.
    pub fn base(&self) -> &ClickHouseType {
        match self {
            Self::Nullable(inner) | Self::LowCardinality(inner) => inner.base(),
            other => other,
        }
    }

    pub fn is_nullable(&self) -> bool {
        match self {
            Self::Nullable(_) => true,
            Self::LowCardinality(inner) => inner.is_nullable(),
            _ => false,
        }
    }

    /// Scalar kind the cursor writes for this column.
    ///
    /// Arrays are only representable when their items are non-null strings.
    pub fn native_kind(&self) -> Result<NativeKind> {
        let kind = match self.base() {
            Self::Bool => NativeKind::Bool,
            Self::Int8 => NativeKind::Int8,
            Self::Int16 => NativeKind::Int16,
            Self::Int32 => NativeKind::Int32,
            Self::Int64 => NativeKind::Int64,
            Self::UInt8 => NativeKind::Uint8,
            Self::UInt16 => NativeKind::Uint16,
            Self::UInt32 => NativeKind::Uint32,
            Self::UInt64 => NativeKind::Uint64,
            Self::Float32 => NativeKind::Float32,
            Self::Float64 => NativeKind::Float64,
            Self::String | Self::FixedString(_) => NativeKind::String,
            Self::Date | Self::Date32 => NativeKind::Date,
            Self::DateTime { .. } | Self::DateTime64 { .. } => NativeKind::DateTime,
            Self::Array(item) if !item.is_nullable() && item.native_kind()? == NativeKind::String => {
                NativeKind::StringList
            }
            other => return Err(ClickHouseError::unsupported(other.to_string())),
        };
        Ok(kind)
    }
}

impl FromStr for ClickHouseType {
    type Err = ClickHouseError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ClickHouseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool => f.write_str("Bool"),
            Self::Int8 => f.write_str("Int8"),
            Self::Int16 => f.write_str("Int16"),
            Self::Int32 => f.write_str("Int32"),
            Self::Int64 => f.write_str("Int64"),
            Self::UInt8 => f.write_str("UInt8"),
            Self::UInt16 => f.write_str("UInt16"),
            Self::UInt32 => f.write_str("UInt32"),
            Self::UInt64 => f.write_str("UInt64"),
            Self::Float32 => f.write_str("Float32"),
            Self::Float64 => f.write_str("Float64"),
            Self::String => f.write_str("String"),
            Self::FixedString(n) => write!(f, "FixedString({})", n),
            Self::Date => f.write_str("Date"),
            Self::Date32 => f.write_str("Date32"),
            Self::DateTime { timezone: None } => f.write_str("DateTime"),
            Self::DateTime { timezone: Some(tz) } => write!(f, "DateTime('{}')", tz),
            Self::DateTime64 {
                precision,
                timezone: None,
            } => write!(f, "DateTime64({})", precision),
            Self::DateTime64 {
                precision,
                timezone: Some(tz),
            } => write!(f, "DateTime64({}, '{}')", precision, tz),
            Self::Nullable(inner) => write!(f, "Nullable({})", inner),
            Self::Array(inner) => write!(f, "Array({})", inner),
            Self::LowCardinality(inner) => write!(f, "LowCardinality({})", inner),
        }
    }
}

/// Split on top-level commas, ignoring commas inside parentheses or quotes.
fn split_args(s: &str) -> Vec<&str> {
    let mut args = Vec::new();
    let (mut depth, mut quoted, mut start) = (0usize, false, 0);
    for (i, c) in s.char_indices() {
        match c {
            '\'' => quoted = !quoted,
            '(' if !quoted => depth += 1,
            ')' if !quoted => depth = depth.saturating_sub(1),
            ',' if !quoted && depth == 0 => {
                args.push(s[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    args.push(s[start..].trim());
    args
}

fn unquote(s: &str) -> String {
    s.trim_matches('\'').to_string()
}
