//! MySQL column types to logical columns.
//!
//! Type names are accepted in the `information_schema.columns.column_type`
//! form (`int(10) unsigned`, `varchar(255)`, `datetime(6)`). MySQL reports
//! nullability separately from the type, so every column maps to an
//! optional logical type.

use fedlink_connector::{NativeKind, Result, TypeMapper, TypeMappingSettings};
use fedlink_tabular::{LogicalColumn, LogicalType, PrimitiveType};

use crate::error::MySqlError;

/// Parsed MySQL column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MySqlType {
    TinyInt { unsigned: bool },
    SmallInt { unsigned: bool },
    /// `mediumint`, `int` and `integer`.
    Int { unsigned: bool },
    BigInt { unsigned: bool },
    Float,
    Double,
    /// Character strings, `json`, `enum` and `set`.
    Text,
    /// Binary strings and blobs.
    Binary,
    Date,
    /// `datetime` and `timestamp`.
    DateTime,
}

impl MySqlType {
    pub fn parse(name: &str) -> crate::error::Result<Self> {
        let lower = name.trim().to_ascii_lowercase();
        // Length, precision and enum members sit in parentheses; modifiers
        // such as `unsigned` follow them.
        let (base, modifiers) = match (lower.find('('), lower.rfind(')')) {
            (Some(open), Some(close)) if open < close => (&lower[..open], &lower[close + 1..]),
            _ => match lower.split_once(' ') {
                Some((base, rest)) => (base, rest),
                None => (lower.as_str(), ""),
            },
        };
        let unsigned = modifiers.split_whitespace().any(|m| m == "unsigned");

        Ok(match base.trim() {
            "tinyint" => Self::TinyInt { unsigned },
            "smallint" => Self::SmallInt { unsigned },
            "mediumint" | "int" | "integer" => Self::Int { unsigned },
            "bigint" => Self::BigInt { unsigned },
            "float" => Self::Float,
            "double" | "real" => Self::Double,
            "char" | "varchar" | "tinytext" | "text" | "mediumtext" | "longtext" | "json"
            | "enum" | "set" => Self::Text,
            "binary" | "varbinary" | "tinyblob" | "blob" | "mediumblob" | "longblob" => {
                Self::Binary
            }
            "date" => Self::Date,
            "datetime" | "timestamp" => Self::DateTime,
            _ => return Err(MySqlError::unsupported(name.trim())),
        })
    }

    /// Kind the cursor scans for this type.
    pub fn native_kind(&self) -> NativeKind {
        match *self {
            Self::TinyInt { unsigned: false } => NativeKind::Int8,
            Self::TinyInt { unsigned: true } => NativeKind::Uint8,
            Self::SmallInt { unsigned: false } => NativeKind::Int16,
            Self::SmallInt { unsigned: true } => NativeKind::Uint16,
            Self::Int { unsigned: false } => NativeKind::Int32,
            Self::Int { unsigned: true } => NativeKind::Uint32,
            Self::BigInt { unsigned: false } => NativeKind::Int64,
            Self::BigInt { unsigned: true } => NativeKind::Uint64,
            Self::Float => NativeKind::Float32,
            Self::Double => NativeKind::Float64,
            Self::Text => NativeKind::String,
            Self::Binary => NativeKind::Bytes,
            Self::Date => NativeKind::Date,
            Self::DateTime => NativeKind::DateTime,
        }
    }

    pub fn logical_type(&self, settings: &TypeMappingSettings) -> LogicalType {
        let primitive = match self.native_kind() {
            NativeKind::Int8 => PrimitiveType::Int8,
            NativeKind::Uint8 => PrimitiveType::Uint8,
            NativeKind::Int16 => PrimitiveType::Int16,
            NativeKind::Uint16 => PrimitiveType::Uint16,
            NativeKind::Int32 => PrimitiveType::Int32,
            NativeKind::Uint32 => PrimitiveType::Uint32,
            NativeKind::Int64 => PrimitiveType::Int64,
            NativeKind::Uint64 => PrimitiveType::Uint64,
            NativeKind::Float32 => PrimitiveType::Float,
            NativeKind::Float64 => PrimitiveType::Double,
            NativeKind::Bytes => PrimitiveType::Bytes,
            NativeKind::Date => return LogicalType::optional(settings.date_type()),
            NativeKind::DateTime => return LogicalType::optional(settings.timestamp_type()),
            _ => PrimitiveType::Utf8,
        };
        LogicalType::optional(LogicalType::primitive(primitive))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlTypeMapper;

impl TypeMapper for MySqlTypeMapper {
    fn map_column(
        &self,
        name: &str,
        native_type: &str,
        settings: &TypeMappingSettings,
    ) -> Result<LogicalColumn> {
        let ty = MySqlType::parse(native_type)?;
        Ok(LogicalColumn::new(name, ty.logical_type(settings)))
    }
}
