//! MySQL backend for fedlink.
//!
//! Queries run as prepared statements over the binary protocol. A
//! background task reads rows off the wire into a bounded channel
//! ([`rows`]), so a slow consumer holds back the server rather than
//! buffering the result set.

pub mod connection;
pub mod error;
pub mod rows;
pub mod type_mapper;

pub use connection::{bind_args, connect_options, MySqlConnection, MySqlConnectionManager};
pub use error::{MySqlError, Result};
pub use rows::{decode_value, native_type_name, Frame, MySqlRows};
pub use type_mapper::{MySqlType, MySqlTypeMapper};
