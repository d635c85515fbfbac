//! Connection and connection manager contracts.
//!
//! Transport, authentication and pooling live behind these traits; the core
//! only ever sees a [`NativeCursor`].

use async_trait::async_trait;

use crate::context::QueryContext;
use crate::cursor::NativeCursor;
use crate::error::Result;
use crate::logging::log_close_error;
use crate::native::NativeValue;
use crate::secret::SecretValue;

/// Positional query arguments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryArgs {
    values: Vec<NativeValue>,
}

impl QueryArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, value: impl Into<NativeValue>) {
        self.values.push(value.into());
    }

    pub fn values(&self) -> &[NativeValue] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryParams {
    pub query_text: String,
    pub args: QueryArgs,
}

impl QueryParams {
    pub fn new(query_text: impl Into<String>) -> Self {
        Self {
            query_text: query_text.into(),
            args: QueryArgs::new(),
        }
    }

    pub fn with_arg(mut self, value: impl Into<NativeValue>) -> Self {
        self.args.push(value);
        self
    }
}

/// Where and as whom to connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub table: String,
    pub username: Option<String>,
    pub password: Option<SecretValue>,
    pub use_tls: bool,
}

impl ConnectionParams {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            database: String::new(),
            table: String::new(),
            username: None,
            password: None,
            use_tls: false,
        }
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: SecretValue) -> Self {
        self.username = Some(username.into());
        self.password = Some(password);
        self
    }

    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// A backend connection. Serves at most one in-flight cursor at a time.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Run a query; the returned cursor is positioned on its first result set.
    async fn query(&self, params: &QueryParams, ctx: &QueryContext)
        -> Result<Box<dyn NativeCursor>>;

    /// `(database name, table name)` this connection reads.
    fn from(&self) -> (&str, &str);

    /// Pseudo-query returning `(column_name, data_type)` string rows.
    fn describe_query(&self) -> QueryParams {
        let (_, table) = self.from();
        QueryParams::new(format!("DESCRIBE {}", table))
    }

    async fn close(&self) -> Result<()>;
}

/// Creates and releases backend connections.
#[async_trait]
pub trait ConnectionManager: Send + Sync {
    async fn make(
        &self,
        params: &ConnectionParams,
        ctx: &QueryContext,
    ) -> Result<Vec<Box<dyn Connection>>>;

    /// Close every connection; failures are logged, never returned.
    async fn release(&self, connections: Vec<Box<dyn Connection>>) {
        for conn in connections {
            log_close_error(conn.close().await, "close connection");
        }
    }
}
