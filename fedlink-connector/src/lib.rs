//! Row materialization and type conversion core for fedlink connectors.
//!
//! A backend connection hands out a [`NativeCursor`]; the [`PagingEngine`]
//! pulls its rows through a [`RowTransformer`] and emits bounded
//! [`ColumnBatch`](fedlink_tabular::ColumnBatch)es of the logical type system.
//!
//! # Modules
//!
//! - [`native`] - closed native scalar set and reusable acceptor slots
//! - [`conversion`] - value converters and the out-of-bounds policy
//! - [`appender`] - per-column appenders resolved once per `(native, logical)` pair
//! - [`transformer`] - acceptors bound to appenders for one result set
//! - [`type_mapper`] - backend type-mapping contract and settings
//! - [`cursor`] / [`connection`] - contracts with backend collaborators
//! - [`paging`] - batch boundary policy and the cursor-driving state machine
//! - [`describe`] - synthesized `(column_name, data_type)` rows
//! - [`memory`] - in-memory cursor and connection
//!
//! # Example
//!
//! ```ignore
//! let cursor = connection.query(&QueryParams::new("SELECT * FROM t"), &ctx).await?;
//! let binder = SchemaBinder::new(mapper, config.type_mapping, config.conversion.converters());
//! let mut engine = PagingEngine::open(cursor, binder, config.paging, ctx).await?;
//! while let Some(batch) = engine.next_batch().await? {
//!     consume(batch);
//! }
//! engine.close().await?;
//! ```

pub mod appender;
pub mod config;
pub mod connection;
pub mod context;
pub mod conversion;
pub mod cursor;
pub mod describe;
pub mod error;
pub mod logging;
pub mod memory;
pub mod native;
pub mod paging;
pub mod secret;
pub mod transformer;
pub mod type_mapper;

pub use appender::{AppendOutcome, Appender, ConverterCollection};
pub use config::{ClickHouseConfig, ConnectorConfig, ConversionConfig, MySqlConfig, RedisConfig};
pub use connection::{Connection, ConnectionManager, ConnectionParams, QueryArgs, QueryParams};
pub use context::QueryContext;
pub use conversion::{OutOfBoundsPolicy, ValueConverter};
pub use cursor::{ColumnDescriptor, NativeCursor};
pub use describe::{describe_table, DescribeRows};
pub use error::{ConnectorError, ConversionError, Result};
pub use logging::{init_logging, log_close_error, LoggingConfig, QueryLogger};
pub use memory::{MemoryConnection, MemoryCursor, ResultSet};
pub use native::{scan_into, Acceptor, NativeKind, NativeValue};
pub use paging::{PagingConfig, PagingEngine, PagingState, ReadStats, SchemaBinder};
pub use secret::SecretValue;
pub use transformer::{RowSummary, RowTransformer};
pub use type_mapper::{DateTimeFormat, TypeMapper, TypeMappingSettings};
