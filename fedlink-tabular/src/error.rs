//! Errors raised while assembling columns and batches.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TabularError {
    /// `ColumnBatch::new` got a different number of columns than the schema
    #[error("batch has {actual} columns, schema has {expected}")]
    ColumnCount { expected: usize, actual: usize },

    /// Columns of one batch disagree on the row count
    #[error("column {column} has {actual} rows, batch has {expected}")]
    RowCount {
        column: usize,
        expected: usize,
        actual: usize,
    },

    /// Column storage does not fit the schema's logical type
    #[error("column '{column}' storage does not match type {logical_type}")]
    StorageMismatch {
        column: String,
        logical_type: String,
    },

    /// A value was appended to a builder of another type
    #[error("cannot append {value} to {column} column")]
    ValueType {
        value: &'static str,
        column: &'static str,
    },

    /// A struct append left some member columns without a cell
    #[error("struct append filled {filled} of {members} member columns")]
    StructMembers { members: usize, filled: usize },
}

pub type Result<T> = std::result::Result<T, TabularError>;
