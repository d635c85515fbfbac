//! HTTP transport to a ClickHouse server.
//!
//! [`HttpTransport`] is the seam between the connection and the network:
//! [`ReqwestTransport`] talks to the real HTTP interface, and
//! [`MemoryTransport`] answers from canned bodies.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;
use reqwest::Client;
use tokio::sync::Semaphore;

use fedlink_connector::{ClickHouseConfig, ConnectionParams};

use crate::error::{ClickHouseError, Result};

/// Response body, delivered in chunks as they arrive.
pub type BodyStream = BoxStream<'static, Result<Bytes>>;

#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Run `query`. The status is checked before the body is handed out.
    async fn post(&self, query: &str) -> Result<BodyStream>;

    async fn ping(&self) -> Result<()>;

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// ClickHouse HTTP interface over reqwest.
///
/// At most `max_open_connections` requests run at once; a request holds its
/// slot until its body stream is dropped.
pub struct ReqwestTransport {
    client: Client,
    url: String,
    query_url: String,
    database: String,
    username: Option<String>,
    password: Option<String>,
    slots: Arc<Semaphore>,
}

impl ReqwestTransport {
    pub fn new(params: &ConnectionParams, config: &ClickHouseConfig) -> Result<Self> {
        let scheme = if params.use_tls { "https" } else { "http" };
        let password = params
            .password
            .as_ref()
            .map(|p| p.resolve())
            .transpose()
            .map_err(|e| ClickHouseError::Config(e.to_string()))?;

        let client = Client::builder()
            .connect_timeout(config.ping_timeout())
            .timeout(config.request_timeout())
            .pool_max_idle_per_host(config.max_idle_connections)
            .pool_idle_timeout(config.idle_connection_timeout())
            .gzip(config.compression)
            .build()
            .map_err(|e| ClickHouseError::Config(format!("failed to create HTTP client: {}", e)))?;

        let url = format!("{}://{}/", scheme, params.endpoint());
        let query_url = if config.compression {
            format!("{}?enable_http_compression=1", url)
        } else {
            url.clone()
        };
        Ok(Self {
            client,
            url,
            query_url,
            database: params.database.clone(),
            username: params.username.clone(),
            password,
            slots: Arc::new(Semaphore::new(config.max_open_connections.max(1))),
        })
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let mut builder = builder;
        if !self.database.is_empty() {
            builder = builder.header("X-ClickHouse-Database", &self.database);
        }
        if let Some(user) = &self.username {
            builder = builder.header("X-ClickHouse-User", user);
        }
        if let Some(password) = &self.password {
            builder = builder.header("X-ClickHouse-Key", password);
        }
        builder
    }
}

impl fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReqwestTransport")
            .field("url", &self.url)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("has_password", &self.password.is_some())
            .field("free_slots", &self.slots.available_permits())
            .finish()
    }
}

fn send_error(e: reqwest::Error) -> ClickHouseError {
    if e.is_timeout() {
        ClickHouseError::http(format!("request timeout: {}", e))
    } else if e.is_connect() {
        ClickHouseError::http(format!("failed to connect: {}", e))
    } else {
        ClickHouseError::http(format!("request failed: {}", e))
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn post(&self, query: &str) -> Result<BodyStream> {
        let slot = Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .map_err(|_| ClickHouseError::http("transport is closed"))?;

        let response = self
            .request(self.client.post(&self.query_url))
            .body(query.to_string())
            .send()
            .await
            .map_err(send_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClickHouseError::server(status.as_u16(), body.trim()));
        }
        Ok(response
            .bytes_stream()
            .map(move |chunk| {
                let _slot = &slot;
                chunk.map_err(send_error)
            })
            .boxed())
    }

    async fn ping(&self) -> Result<()> {
        let url = format!("{}ping", self.url);
        let response = self
            .request(self.client.get(&url))
            .send()
            .await
            .map_err(send_error)?;
        if !response.status().is_success() {
            return Err(ClickHouseError::server(
                response.status().as_u16(),
                "ping failed",
            ));
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.slots.close();
        Ok(())
    }
}

/// Canned responses keyed by query prefix.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    responses: Mutex<Vec<(String, Vec<Bytes>)>>,
    queries: Mutex<Vec<String>>,
    unavailable: AtomicBool,
    closed: AtomicBool,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer queries starting with `prefix` with `body`. Earlier
    /// registrations win.
    pub fn respond(&self, prefix: impl Into<String>, body: impl Into<Bytes>) {
        self.respond_chunked(prefix, vec![body.into()]);
    }

    /// Like [`respond`](Self::respond), delivering the body in the given
    /// chunks.
    pub fn respond_chunked(&self, prefix: impl Into<String>, chunks: Vec<Bytes>) {
        self.responses.lock().push((prefix.into(), chunks));
    }

    /// Queries received so far, in order.
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().clone()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ClickHouseError::http("failed to connect: connection refused"));
        }
        Ok(())
    }
}

#[async_trait]
impl HttpTransport for MemoryTransport {
    async fn post(&self, query: &str) -> Result<BodyStream> {
        self.check()?;
        self.queries.lock().push(query.to_string());
        let chunks = self
            .responses
            .lock()
            .iter()
            .find(|(prefix, _)| query.starts_with(prefix.as_str()))
            .map(|(_, chunks)| chunks.clone())
            .ok_or_else(|| {
                ClickHouseError::server(
                    404,
                    format!("Code: 60. DB::Exception: no canned response for '{}'", query),
                )
            })?;
        Ok(stream::iter(chunks.into_iter().map(Ok)).boxed())
    }

    async fn ping(&self) -> Result<()> {
        self.check()
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
