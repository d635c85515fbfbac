//! Logging setup and query logging helpers.

use std::fmt::Display;

use serde::{Deserialize, Serialize};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::native::NativeValue;

/// Log output style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
}

/// Logging section of the connector configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directives; `RUST_LOG` wins when set.
    pub filter: Option<String>,
    /// Level used when neither `filter` nor `RUST_LOG` is set.
    pub default_level: String,
    pub format: LogFormat,
    /// Dump query text and arguments at debug level.
    pub enable_query_logging: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: None,
            default_level: "info".to_string(),
            format: LogFormat::default(),
            enable_query_logging: false,
        }
    }
}

/// Install the global tracing subscriber.
///
/// Safe to call more than once; only the first call installs anything.
pub fn init_logging(config: &LoggingConfig) {
    if tracing::dispatcher::has_been_set() {
        tracing::debug!("tracing subscriber already initialized, skipping");
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match &config.filter {
        Some(directives) if !directives.is_empty() => EnvFilter::new(directives),
        _ => EnvFilter::new(&config.default_level),
    });

    let fmt_layer = match config.format {
        LogFormat::Compact => tracing_subscriber::fmt::layer().compact().boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer().pretty().boxed(),
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}

/// Per-connection query logger.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryLogger {
    enabled: bool,
}

impl QueryLogger {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn from_config(config: &LoggingConfig) -> Self {
        Self::new(config.enable_query_logging)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Log query text and arguments when query logging is on.
    pub fn dump(&self, query: &str, args: &[NativeValue]) {
        if !self.enabled {
            return;
        }
        tracing::debug!(query, args = ?args, "query");
    }
}

/// Log a failed close without propagating it.
pub fn log_close_error<E: Display>(result: std::result::Result<(), E>, what: &str) {
    if let Err(e) = result {
        tracing::error!(error = %e, what, "close failed");
    }
}
