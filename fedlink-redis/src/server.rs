//! Key-value client backed by a live Redis server.
//!
//! Connections always target database 0. TLS verifies the server
//! certificate against the platform roots.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use redis::aio::MultiplexedConnection;
use redis::{ConnectionAddr, ConnectionInfo, RedisConnectionInfo};

use fedlink_connector::ConnectionParams;

use crate::client::{KeyType, KeyValueClient};
use crate::connection::ClientFactory;
use crate::error::{RedisError, Result};

fn client_error(err: redis::RedisError) -> RedisError {
    RedisError::client(err.to_string())
}

/// Address and credentials for `params`.
pub fn connection_info(params: &ConnectionParams) -> fedlink_connector::Result<ConnectionInfo> {
    let password = params.password.as_ref().map(|p| p.resolve()).transpose()?;
    let addr = if params.use_tls {
        ConnectionAddr::TcpTls {
            host: params.host.clone(),
            port: params.port,
            insecure: false,
            tls_params: None,
        }
    } else {
        ConnectionAddr::Tcp(params.host.clone(), params.port)
    };
    Ok(ConnectionInfo {
        addr,
        redis: RedisConnectionInfo {
            db: 0,
            username: params.username.clone(),
            password,
            ..Default::default()
        },
    })
}

/// Multiplexed connection to one server.
pub struct ServerClient {
    endpoint: String,
    connection: Mutex<Option<MultiplexedConnection>>,
}

impl std::fmt::Debug for ServerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerClient")
            .field("endpoint", &self.endpoint)
            .field("open", &self.connection.lock().is_some())
            .finish()
    }
}

impl ServerClient {
    pub async fn connect(params: &ConnectionParams) -> fedlink_connector::Result<Self> {
        let info = connection_info(params)?;
        let client = redis::Client::open(info).map_err(client_error)?;
        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(client_error)?;
        Ok(Self {
            endpoint: params.endpoint(),
            connection: Mutex::new(Some(connection)),
        })
    }

    fn connection(&self) -> Result<MultiplexedConnection> {
        self.connection
            .lock()
            .clone()
            .ok_or_else(|| RedisError::client(format!("connection to {} is closed", self.endpoint)))
    }
}

#[async_trait]
impl KeyValueClient for ServerClient {
    async fn ping(&self) -> Result<()> {
        let mut conn = self.connection()?;
        let reply: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(client_error)?;
        if reply != "PONG" {
            return Err(RedisError::reply(format!("PING answered {}", reply)));
        }
        Ok(())
    }

    async fn scan(&self, cursor: u64, pattern: &str, count: usize) -> Result<(Vec<String>, u64)> {
        let mut conn = self.connection()?;
        let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(count)
            .query_async(&mut conn)
            .await
            .map_err(client_error)?;
        Ok((keys, next))
    }

    async fn key_type(&self, key: &str) -> Result<KeyType> {
        let mut conn = self.connection()?;
        let name: String = redis::cmd("TYPE")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(client_error)?;
        parse_key_type(&name)
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection()?;
        let value: Option<String> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(client_error)?;
        Ok(value)
    }

    async fn hgetall(&self, key: &str) -> Result<BTreeMap<String, String>> {
        let mut conn = self.connection()?;
        let fields: BTreeMap<String, String> = redis::cmd("HGETALL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(client_error)?;
        Ok(fields)
    }

    async fn hmget(&self, key: &str, fields: &[String]) -> Result<Vec<Option<String>>> {
        if fields.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.connection()?;
        let values: Vec<Option<String>> = redis::cmd("HMGET")
            .arg(key)
            .arg(fields)
            .query_async(&mut conn)
            .await
            .map_err(client_error)?;
        Ok(values)
    }

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>> {
        let mut conn = self.connection()?;
        let items: Vec<String> = redis::cmd("LRANGE")
            .arg(key)
            .arg(start)
            .arg(stop)
            .query_async(&mut conn)
            .await
            .map_err(client_error)?;
        Ok(items)
    }

    async fn close(&self) -> Result<()> {
        self.connection.lock().take();
        Ok(())
    }
}

fn parse_key_type(name: &str) -> Result<KeyType> {
    Ok(match name {
        "string" => KeyType::String,
        "list" => KeyType::List,
        "hash" => KeyType::Hash,
        "set" => KeyType::Set,
        "zset" => KeyType::ZSet,
        "stream" => KeyType::Stream,
        "none" => KeyType::None,
        other => return Err(RedisError::reply(format!("unknown key type '{}'", other))),
    })
}

/// Opens a [`ServerClient`] per connection request.
#[derive(Debug, Clone, Copy, Default)]
pub struct ServerClientFactory;

#[async_trait]
impl ClientFactory for ServerClientFactory {
    async fn connect(
        &self,
        params: &ConnectionParams,
    ) -> fedlink_connector::Result<Arc<dyn KeyValueClient>> {
        Ok(Arc::new(ServerClient::connect(params).await?))
    }
}
