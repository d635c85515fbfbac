//! Connector configuration.
//!
//! Loaded from JSON. Every section and field has a default, so a file only
//! needs to carry the values it wants to change.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::appender::ConverterCollection;
use crate::conversion::OutOfBoundsPolicy;
use crate::error::{ConnectorError, Result};
use crate::logging::LoggingConfig;
use crate::paging::PagingConfig;
use crate::type_mapper::TypeMappingSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    pub out_of_bounds: OutOfBoundsPolicy,
}

impl ConversionConfig {
    pub fn converters(&self) -> ConverterCollection {
        ConverterCollection::new(self.out_of_bounds)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub ping_timeout_ms: u64,
    /// `COUNT` hint for each SCAN round trip.
    pub scan_count: usize,
    /// Keys sampled to synthesize a table description.
    pub describe_sample_size: usize,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            ping_timeout_ms: 5_000,
            scan_count: 100,
            describe_sample_size: 1_000,
        }
    }
}

impl RedisConfig {
    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClickHouseConfig {
    pub ping_timeout_ms: u64,
    /// Upper bound for one HTTP request, response body included.
    pub request_timeout_ms: u64,
    /// Idle keep-alive connections kept per server.
    pub max_idle_connections: usize,
    /// Requests in flight at once, response streams included.
    pub max_open_connections: usize,
    /// Idle connections are dropped after this long.
    pub idle_connection_timeout_ms: u64,
    /// Ask the server for compressed response bodies.
    pub compression: bool,
}

impl Default for ClickHouseConfig {
    fn default() -> Self {
        Self {
            ping_timeout_ms: 5_000,
            request_timeout_ms: 30_000,
            max_idle_connections: 5,
            max_open_connections: 10,
            idle_connection_timeout_ms: 60 * 60 * 1_000,
            compression: true,
        }
    }
}

impl ClickHouseConfig {
    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn idle_connection_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_connection_timeout_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MySqlConfig {
    /// Bound on connecting, TLS handshake and session setup.
    pub open_connection_timeout_ms: u64,
    /// Rows read ahead of the consumer.
    pub prefetch_rows: usize,
}

impl Default for MySqlConfig {
    fn default() -> Self {
        Self {
            open_connection_timeout_ms: 5_000,
            prefetch_rows: 1_024,
        }
    }
}

impl MySqlConfig {
    pub fn open_connection_timeout(&self) -> Duration {
        Duration::from_millis(self.open_connection_timeout_ms)
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectorConfig {
    pub paging: PagingConfig,
    pub conversion: ConversionConfig,
    pub type_mapping: TypeMappingSettings,
    pub logging: LoggingConfig,
    pub redis: RedisConfig,
    pub clickhouse: ClickHouseConfig,
    pub mysql: MySqlConfig,
}

impl ConnectorConfig {
    /// Parse and validate a JSON document. Blank input yields the defaults.
    pub fn from_json_str(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_json::from_str(content)
            .map_err(|e| ConnectorError::config(format!("invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConnectorError::config(format!("failed to read {}: {}", path.display(), e))
        })?;
        tracing::debug!(path = %path.display(), "loading connector config");
        Self::from_json_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        self.paging.validate()?;
        if self.redis.scan_count == 0 {
            return Err(ConnectorError::config("redis.scan_count must be > 0"));
        }
        if self.redis.describe_sample_size == 0 {
            return Err(ConnectorError::config(
                "redis.describe_sample_size must be > 0",
            ));
        }
        if self.redis.ping_timeout_ms == 0 || self.clickhouse.ping_timeout_ms == 0 {
            return Err(ConnectorError::config("ping timeouts must be > 0"));
        }
        if self.clickhouse.request_timeout_ms == 0 {
            return Err(ConnectorError::config(
                "clickhouse.request_timeout_ms must be > 0",
            ));
        }
        if self.clickhouse.max_open_connections == 0 {
            return Err(ConnectorError::config(
                "clickhouse.max_open_connections must be > 0",
            ));
        }
        if self.mysql.open_connection_timeout_ms == 0 {
            return Err(ConnectorError::config(
                "mysql.open_connection_timeout_ms must be > 0",
            ));
        }
        if self.mysql.prefetch_rows == 0 {
            return Err(ConnectorError::config("mysql.prefetch_rows must be > 0"));
        }
        Ok(())
    }
}
