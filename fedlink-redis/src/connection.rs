//! Redis connection and connection manager.

use std::sync::Arc;

use async_trait::async_trait;

use fedlink_connector::{
    Connection, ConnectionManager, ConnectionParams, ConnectorError, DescribeRows, NativeCursor,
    QueryContext, QueryLogger, QueryParams, RedisConfig, Result,
};

use crate::client::{KeyValueClient, MemoryKeyValueClient};
use crate::command::{CommandTranslator, RedisCommand, SelectTranslator};
use crate::describe::{sample_layout, KeyspaceLayout};
use crate::rows::{hash_get, hash_get_all, ScanRows};

/// One Redis database exposed as a table.
pub struct RedisConnection {
    client: Arc<dyn KeyValueClient>,
    translator: Arc<dyn CommandTranslator>,
    logger: QueryLogger,
    config: RedisConfig,
    key_pattern: String,
    database: String,
    table: String,
}

impl std::fmt::Debug for RedisConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisConnection")
            .field("database", &self.database)
            .field("table", &self.table)
            .field("key_pattern", &self.key_pattern)
            .finish()
    }
}

impl RedisConnection {
    pub fn new(
        client: Arc<dyn KeyValueClient>,
        config: RedisConfig,
        logger: QueryLogger,
        database: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        let key_pattern = "*".to_string();
        Self {
            client,
            translator: Arc::new(SelectTranslator::new(key_pattern.clone(), config.scan_count)),
            logger,
            config,
            key_pattern,
            database: database.into(),
            table: table.into(),
        }
    }

    /// Replace the SELECT translation strategy.
    pub fn with_translator(mut self, translator: Arc<dyn CommandTranslator>) -> Self {
        self.translator = translator;
        self
    }

    /// Restrict the table to keys matching `pattern`. Resets the translator.
    pub fn with_key_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.key_pattern = pattern.into();
        self.translator = Arc::new(SelectTranslator::new(
            self.key_pattern.clone(),
            self.config.scan_count,
        ));
        self
    }

    pub async fn sample(&self) -> Result<KeyspaceLayout> {
        Ok(sample_layout(
            self.client.as_ref(),
            &self.key_pattern,
            self.config.scan_count,
            self.config.describe_sample_size,
        )
        .await?)
    }

    async fn open(&self, command: RedisCommand, ctx: &QueryContext) -> Result<Box<dyn NativeCursor>> {
        match command {
            RedisCommand::Scan {
                pattern,
                count,
                limit,
                columns,
            } => {
                let layout = ctx.run(self.sample()).await?;
                let fields = layout.project(&columns).map_err(ConnectorError::query)?;
                Ok(Box::new(ScanRows::new(
                    Arc::clone(&self.client),
                    pattern,
                    count,
                    limit,
                    fields,
                    &layout.hash_fields,
                )))
            }
            RedisCommand::HashGetAll { key, limit } => {
                let cursor = ctx
                    .run(async {
                        hash_get_all(self.client.as_ref(), &key, limit)
                            .await
                            .map_err(ConnectorError::from)
                    })
                    .await?;
                Ok(Box::new(cursor))
            }
            RedisCommand::HashGet { key, fields, limit } => {
                let cursor = ctx
                    .run(async {
                        hash_get(self.client.as_ref(), &key, &fields, limit)
                            .await
                            .map_err(ConnectorError::from)
                    })
                    .await?;
                Ok(Box::new(cursor))
            }
        }
    }
}

fn is_describe(query: &str) -> bool {
    query
        .trim_start()
        .get(..9)
        .is_some_and(|head| head.eq_ignore_ascii_case("describe "))
}

#[async_trait]
impl Connection for RedisConnection {
    async fn query(
        &self,
        params: &QueryParams,
        ctx: &QueryContext,
    ) -> Result<Box<dyn NativeCursor>> {
        self.logger.dump(&params.query_text, params.args.values());

        if is_describe(&params.query_text) {
            let layout = ctx.run(self.sample()).await?;
            return Ok(Box::new(DescribeRows::new(layout.describe_rows())));
        }

        let command = self.translator.translate(&params.query_text).map_err(|e| {
            tracing::debug!(error = %e, "failed to translate query");
            ConnectorError::from(e)
        })?;
        tracing::debug!(?command, "redis command");
        self.open(command, ctx).await
    }

    fn from(&self) -> (&str, &str) {
        (&self.database, &self.table)
    }

    async fn close(&self) -> Result<()> {
        Ok(self.client.close().await?)
    }
}

/// Builds a client for an endpoint.
#[async_trait]
pub trait ClientFactory: Send + Sync {
    async fn connect(&self, params: &ConnectionParams) -> Result<Arc<dyn KeyValueClient>>;
}

/// Hands out one shared in-memory keyspace.
#[derive(Debug, Clone, Default)]
pub struct MemoryClientFactory {
    client: Arc<MemoryKeyValueClient>,
}

impl MemoryClientFactory {
    pub fn new(client: Arc<MemoryKeyValueClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ClientFactory for MemoryClientFactory {
    async fn connect(&self, _params: &ConnectionParams) -> Result<Arc<dyn KeyValueClient>> {
        Ok(self.client.clone())
    }
}

pub struct RedisConnectionManager {
    factory: Arc<dyn ClientFactory>,
    config: RedisConfig,
    logger: QueryLogger,
}

impl std::fmt::Debug for RedisConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisConnectionManager")
            .field("config", &self.config)
            .finish()
    }
}

impl RedisConnectionManager {
    pub fn new(factory: Arc<dyn ClientFactory>, config: RedisConfig, logger: QueryLogger) -> Self {
        Self {
            factory,
            config,
            logger,
        }
    }
}

#[async_trait]
impl ConnectionManager for RedisConnectionManager {
    async fn make(
        &self,
        params: &ConnectionParams,
        ctx: &QueryContext,
    ) -> Result<Vec<Box<dyn Connection>>> {
        // Connecting and the first PING share one deadline.
        let connect_ctx = ctx.child_with_timeout(self.config.ping_timeout());
        let connected = connect_ctx
            .run(async {
                let client = match self.factory.connect(params).await {
                    Ok(client) => client,
                    Err(e) => return Err(e),
                };
                match client.ping().await {
                    Ok(()) => Ok(client),
                    Err(e) => {
                        fedlink_connector::log_close_error(
                            client.close().await,
                            "close redis client",
                        );
                        Err(ConnectorError::from(e))
                    }
                }
            })
            .await;
        let client = match connected {
            Ok(client) => client,
            Err(ConnectorError::Config(msg)) => return Err(ConnectorError::Config(msg)),
            Err(e) => {
                tracing::warn!(endpoint = %params.endpoint(), error = %e, "redis connect failed");
                return Err(match e {
                    ConnectorError::Cancelled => e,
                    other => ConnectorError::transport(format!(
                        "failed to connect to Redis at {}: {}",
                        params.endpoint(),
                        other
                    )),
                });
            }
        };
        tracing::debug!(endpoint = %params.endpoint(), tls = params.use_tls, "redis connected");

        let connection: Box<dyn Connection> = Box::new(RedisConnection::new(
            client,
            self.config,
            self.logger,
            params.database.clone(),
            params.table.clone(),
        ));
        Ok(vec![connection])
    }
}
