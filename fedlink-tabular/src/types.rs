//! Logical type system shared by every backend.
//!
//! Every column produced by the connector carries exactly one [`LogicalType`],
//! fixed for the lifetime of the query. Types are closed and recursive:
//! primitives, optional wrappers, structs and lists.

use std::fmt;

/// Scalar kinds of the logical type system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Float,
    Double,
    Bytes,
    Utf8,
    /// Days since 1970-01-01
    Date,
    /// Microseconds since epoch (UTC)
    Timestamp,
}

impl PrimitiveType {
    /// Whether this is an integer type (signed or unsigned).
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            Self::Int8
                | Self::Int16
                | Self::Int32
                | Self::Int64
                | Self::Uint8
                | Self::Uint16
                | Self::Uint32
                | Self::Uint64
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Bool => "Bool",
            Self::Int8 => "Int8",
            Self::Int16 => "Int16",
            Self::Int32 => "Int32",
            Self::Int64 => "Int64",
            Self::Uint8 => "Uint8",
            Self::Uint16 => "Uint16",
            Self::Uint32 => "Uint32",
            Self::Uint64 => "Uint64",
            Self::Float => "Float",
            Self::Double => "Double",
            Self::Bytes => "Bytes",
            Self::Utf8 => "Utf8",
            Self::Date => "Date",
            Self::Timestamp => "Timestamp",
        }
    }
}

/// A named member of a struct type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructMember {
    pub name: String,
    pub logical_type: LogicalType,
}

impl StructMember {
    pub fn new(name: impl Into<String>, logical_type: LogicalType) -> Self {
        Self {
            name: name.into(),
            logical_type,
        }
    }
}

/// Logical (output) type of a column.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LogicalType {
    Primitive(PrimitiveType),
    /// Nullable wrapper. Cells of a non-optional column may still be null when
    /// a value could not be represented (out-of-bounds recovery).
    Optional(Box<LogicalType>),
    Struct(Vec<StructMember>),
    List(Box<LogicalType>),
}

impl LogicalType {
    pub fn primitive(kind: PrimitiveType) -> Self {
        Self::Primitive(kind)
    }

    pub fn optional(inner: LogicalType) -> Self {
        // Optional(Optional(T)) collapses; nothing downstream distinguishes the two.
        match inner {
            Self::Optional(_) => inner,
            other => Self::Optional(Box::new(other)),
        }
    }

    pub fn list(item: LogicalType) -> Self {
        Self::List(Box::new(item))
    }

    pub fn structure(members: Vec<StructMember>) -> Self {
        Self::Struct(members)
    }

    #[inline]
    pub fn is_optional(&self) -> bool {
        matches!(self, Self::Optional(_))
    }

    /// Strip an optional wrapper, if any.
    pub fn unwrap_optional(&self) -> &LogicalType {
        match self {
            Self::Optional(inner) => inner,
            other => other,
        }
    }

    /// The primitive kind after stripping an optional wrapper.
    pub fn as_primitive(&self) -> Option<PrimitiveType> {
        match self.unwrap_optional() {
            Self::Primitive(p) => Some(*p),
            _ => None,
        }
    }
}

impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primitive(p) => f.write_str(p.name()),
            Self::Optional(inner) => write!(f, "Optional<{}>", inner),
            Self::List(item) => write!(f, "List<{}>", item),
            Self::Struct(members) => {
                f.write_str("Struct<")?;
                for (i, m) in members.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}:{}", m.name, m.logical_type)?;
                }
                f.write_str(">")
            }
        }
    }
}

/// A named, typed output column.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LogicalColumn {
    pub name: String,
    pub logical_type: LogicalType,
}

impl LogicalColumn {
    pub fn new(name: impl Into<String>, logical_type: LogicalType) -> Self {
        Self {
            name: name.into(),
            logical_type,
        }
    }
}
