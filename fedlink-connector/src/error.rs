//! Error types for the connector core.
//!
//! Only `OutOfTypeBounds` is ever recovered (as a null cell, in lenient mode).
//! Every other kind is terminal for the query: the paging engine moves to
//! `Failed`, closes the cursor and hands the error back to the caller.

use thiserror::Error;

use crate::native::NativeKind;

/// Errors from connector operations.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// Native type has no mapping (raised at construction, never at row time)
    #[error("Unsupported type: {0}")]
    UnsupportedType(String),

    /// Value does not fit the target representation (strict mode only)
    #[error("Value out of type bounds: {0}")]
    OutOfTypeBounds(String),

    /// Scan produced a value the row transformer was not built for
    #[error("Malformed row: {0}")]
    MalformedRow(String),

    /// Value of unexpected shape or encoding; never recovered
    #[error("Conversion error: {0}")]
    Conversion(String),

    /// Native cursor I/O failure (network, timeout, backend-side error)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Query text the backend's command translation cannot handle
    #[error("Invalid query: {0}")]
    Query(String),

    /// Cursor or multi-result-set protocol in an unexpected state
    #[error("Cursor protocol error: {0}")]
    CursorProtocol(String),

    /// The caller cancelled the query
    #[error("Query cancelled")]
    Cancelled,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Column builder or batch assembly error
    #[error(transparent)]
    Tabular(#[from] fedlink_tabular::TabularError),
}

impl ConnectorError {
    pub fn unsupported_type(msg: impl Into<String>) -> Self {
        Self::UnsupportedType(msg.into())
    }

    pub fn malformed_row(msg: impl Into<String>) -> Self {
        Self::MalformedRow(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    pub fn cursor_protocol(msg: impl Into<String>) -> Self {
        Self::CursorProtocol(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// A scan destination of the wrong kind for the value being written.
    pub fn kind_mismatch(column: usize, expected: NativeKind, got: NativeKind) -> Self {
        Self::MalformedRow(format!(
            "column {}: acceptor holds {:?}, scanned value is {:?}",
            column, expected, got
        ))
    }

    /// Whether this error terminated the query because the caller asked it to.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Result type for connector operations.
pub type Result<T> = std::result::Result<T, ConnectorError>;

/// Failure of a single value conversion.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversionError {
    /// The value cannot be represented in the target width or precision.
    #[error("value out of type bounds: {0}")]
    OutOfTypeBounds(String),

    /// The value has an unexpected shape or encoding.
    #[error("conversion failed: {0}")]
    Fatal(String),
}

impl ConversionError {
    pub fn out_of_bounds(msg: impl Into<String>) -> Self {
        Self::OutOfTypeBounds(msg.into())
    }

    pub fn fatal(msg: impl Into<String>) -> Self {
        Self::Fatal(msg.into())
    }
}
