//! ClickHouse backend for fedlink.
//!
//! Queries go over the HTTP interface with
//! `FORMAT JSONCompactEachRowWithNamesAndTypes`; the response's header lines
//! give the column names and ClickHouse type names, which
//! [`ClickHouseTypeMapper`] maps to logical columns.

pub mod connection;
pub mod error;
pub mod rows;
pub mod transport;
pub mod type_mapper;
pub mod types;

pub use connection::{
    render_query, ClickHouseConnection, ClickHouseConnectionManager, MemoryTransportFactory,
    ReqwestTransportFactory, TransportFactory,
};
pub use error::{ClickHouseError, Result};
pub use rows::{decode_value, JsonEachRowCursor, FORMAT};
pub use transport::{HttpTransport, MemoryTransport, ReqwestTransport};
pub use type_mapper::ClickHouseTypeMapper;
pub use types::ClickHouseType;
