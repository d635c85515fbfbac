//! Type mapper contract.
//!
//! Each backend implements [`TypeMapper`] once. The mapper is a pure function
//! of the native type descriptor and the caller's [`TypeMappingSettings`]; it
//! never falls back to a default type for an unknown descriptor.

use serde::{Deserialize, Serialize};

use fedlink_tabular::{LogicalColumn, LogicalType, PrimitiveType};

use crate::error::Result;

/// How temporal native types are exposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateTimeFormat {
    /// `Date` / `Timestamp` logical types (bounded range).
    #[default]
    Native,
    /// ISO-8601 `Utf8`; any native value is representable.
    String,
}

/// Caller-supplied mapping rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TypeMappingSettings {
    pub date_time_format: DateTimeFormat,
}

impl TypeMappingSettings {
    /// Logical type for a native date column under these settings.
    pub fn date_type(&self) -> LogicalType {
        match self.date_time_format {
            DateTimeFormat::Native => LogicalType::primitive(PrimitiveType::Date),
            DateTimeFormat::String => LogicalType::primitive(PrimitiveType::Utf8),
        }
    }

    /// Logical type for a native datetime column under these settings.
    pub fn timestamp_type(&self) -> LogicalType {
        match self.date_time_format {
            DateTimeFormat::Native => LogicalType::primitive(PrimitiveType::Timestamp),
            DateTimeFormat::String => LogicalType::primitive(PrimitiveType::Utf8),
        }
    }
}

/// Maps a backend's native column type descriptor to a logical column.
pub trait TypeMapper: Send + Sync {
    /// Fails with `ConnectorError::UnsupportedType` when the descriptor has no mapping.
    fn map_column(
        &self,
        name: &str,
        native_type: &str,
        settings: &TypeMappingSettings,
    ) -> Result<LogicalColumn>;
}
