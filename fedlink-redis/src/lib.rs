//! Redis backend for fedlink.
//!
//! A Redis database is exposed as one table whose rows are keys. The layout
//! comes from sampling the keyspace ([`describe`]), SELECT text is turned
//! into a command plan ([`command`]), and SCAN is driven as a continuation
//! cursor ([`rows`]). [`server`] talks to a live Redis; the in-memory
//! client in [`client`] backs tests.

pub mod client;
pub mod command;
pub mod connection;
pub mod describe;
pub mod error;
pub mod rows;
pub mod server;
pub mod type_mapper;

pub use client::{glob_match, KeyType, KeyValueClient, MemoryKeyValueClient};
pub use command::{parse_select, CommandTranslator, RedisCommand, SelectStatement, SelectTranslator};
pub use connection::{ClientFactory, MemoryClientFactory, RedisConnection, RedisConnectionManager};
pub use describe::{sample_layout, KeyspaceLayout};
pub use error::{RedisError, Result};
pub use rows::{hash_get, hash_get_all, RedisField, ScanRows};
pub use server::{connection_info, ServerClient, ServerClientFactory};
pub use type_mapper::RedisTypeMapper;
