//! ClickHouse types to logical columns.

use fedlink_connector::{ConnectorError, Result, TypeMapper, TypeMappingSettings};
use fedlink_tabular::{LogicalColumn, LogicalType, PrimitiveType};

use crate::types::ClickHouseType;

#[derive(Debug, Clone, Copy, Default)]
pub struct ClickHouseTypeMapper;

impl ClickHouseTypeMapper {
    pub fn new() -> Self {
        Self
    }

    /// Logical type for a parsed ClickHouse type. Only non-nullable source
    /// columns map to non-optional logical types.
    pub fn logical_type(ty: &ClickHouseType, settings: &TypeMappingSettings) -> LogicalType {
        use ClickHouseType as C;
        use PrimitiveType as P;

        let p = |p| LogicalType::primitive(p);
        match ty {
            C::Bool => p(P::Bool),
            C::Int8 => p(P::Int8),
            C::Int16 => p(P::Int16),
            C::Int32 => p(P::Int32),
            C::Int64 => p(P::Int64),
            C::UInt8 => p(P::Uint8),
            C::UInt16 => p(P::Uint16),
            C::UInt32 => p(P::Uint32),
            C::UInt64 => p(P::Uint64),
            C::Float32 => p(P::Float),
            C::Float64 => p(P::Double),
            C::String => p(P::Utf8),
            C::FixedString(_) => p(P::Bytes),
            C::Date | C::Date32 => settings.date_type(),
            C::DateTime { .. } | C::DateTime64 { .. } => settings.timestamp_type(),
            C::Nullable(inner) => LogicalType::optional(Self::logical_type(inner, settings)),
            C::LowCardinality(inner) => Self::logical_type(inner, settings),
            C::Array(item) => LogicalType::list(Self::logical_type(item, settings)),
        }
    }
}

impl TypeMapper for ClickHouseTypeMapper {
    fn map_column(
        &self,
        name: &str,
        native_type: &str,
        settings: &TypeMappingSettings,
    ) -> Result<LogicalColumn> {
        let ty = ClickHouseType::parse(native_type)?;
        // Reject what the cursor could not scan, so failures happen here.
        ty.native_kind().map_err(|e| {
            ConnectorError::unsupported_type(format!("column '{}': {}", name, e))
        })?;
        Ok(LogicalColumn::new(name, Self::logical_type(&ty, settings)))
    }
}
