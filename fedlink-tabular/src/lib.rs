//! Logical types, column builders and columnar batches for fedlink.
//!
//! This crate provides the output vocabulary shared by every backend connector:
//! a closed, recursive logical type system and the columnar batches that native
//! result sets are materialized into.
//!
//! # Design
//!
//! - **Columnar storage**: Data is stored in typed `Vec` per column, not per-row
//! - **Strongly typed**: All column access is through the `Column` enum, no `dyn Any`
//! - **Pre-allocated builders**: `ColumnBuilder` reserves a batch worth of rows up front
//! - **No Arrow dependency**: batches are plain Rust data

pub mod batch;
pub mod builder;
pub mod error;
pub mod types;

pub use batch::{BatchSchema, Column, ColumnBatch};
pub use builder::{AppendValue, ColumnBuilder, MAX_PREALLOCATED_ROWS};
pub use error::{Result, TabularError};
pub use types::{LogicalColumn, LogicalType, PrimitiveType, StructMember};
