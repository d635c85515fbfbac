//! Redis type names to logical columns.

use fedlink_connector::{ConnectorError, Result, TypeMapper, TypeMappingSettings};
use fedlink_tabular::{LogicalColumn, LogicalType, PrimitiveType, StructMember};

/// Maps the type names produced by the describe synthesis.
///
/// Every column is optional: any key may lack a value of the column's type.
#[derive(Debug, Clone, Copy, Default)]
pub struct RedisTypeMapper;

impl RedisTypeMapper {
    pub fn new() -> Self {
        Self
    }
}

fn utf8() -> LogicalType {
    LogicalType::primitive(PrimitiveType::Utf8)
}

fn hash_members(type_name: &str) -> Option<Vec<StructMember>> {
    let inner = type_name.strip_prefix("hash<")?.strip_suffix('>')?;
    Some(
        inner
            .split(',')
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(|f| StructMember::new(f, LogicalType::optional(utf8())))
            .collect(),
    )
}

impl TypeMapper for RedisTypeMapper {
    fn map_column(
        &self,
        name: &str,
        native_type: &str,
        _settings: &TypeMappingSettings,
    ) -> Result<LogicalColumn> {
        let logical = match native_type {
            "string" | "varchar" => utf8(),
            "int" => LogicalType::primitive(PrimitiveType::Int64),
            "float" => LogicalType::primitive(PrimitiveType::Double),
            "bool" => LogicalType::primitive(PrimitiveType::Bool),
            "list" => LogicalType::list(utf8()),
            other => match hash_members(other) {
                Some(members) => LogicalType::structure(members),
                None => {
                    return Err(ConnectorError::unsupported_type(format!(
                        "Redis type '{}' of column '{}'",
                        other, name
                    )))
                }
            },
        };
        Ok(LogicalColumn::new(name, LogicalType::optional(logical)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(native: &str) -> Result<LogicalColumn> {
        RedisTypeMapper.map_column("c", native, &TypeMappingSettings::default())
    }

    #[test]
    fn test_scalars() {
        assert_eq!(
            map("varchar").unwrap().logical_type,
            LogicalType::optional(utf8())
        );
        assert_eq!(
            map("int").unwrap().logical_type.unwrap_optional(),
            &LogicalType::primitive(PrimitiveType::Int64)
        );
        assert_eq!(
            map("list").unwrap().logical_type.unwrap_optional(),
            &LogicalType::list(utf8())
        );
    }

    #[test]
    fn test_hash() {
        let column = map("hash<a,b>").unwrap();
        match column.logical_type.unwrap_optional() {
            LogicalType::Struct(members) => {
                let names: Vec<_> = members.iter().map(|m| m.name.as_str()).collect();
                assert_eq!(names, vec!["a", "b"]);
            }
            other => panic!("expected struct, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_is_unsupported() {
        assert!(matches!(map("set"), Err(ConnectorError::UnsupportedType(_))));
        assert!(matches!(map("hash<a"), Err(ConnectorError::UnsupportedType(_))));
    }
}
