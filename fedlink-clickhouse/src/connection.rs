//! ClickHouse connection and connection manager.

use std::sync::Arc;

use async_trait::async_trait;

use fedlink_connector::{
    log_close_error, ClickHouseConfig, Connection, ConnectionManager, ConnectionParams,
    ConnectorError, NativeCursor, NativeValue, QueryContext, QueryLogger, QueryParams, Result,
};

use crate::rows::{JsonEachRowCursor, FORMAT};
use crate::transport::{HttpTransport, MemoryTransport, ReqwestTransport};

pub struct ClickHouseConnection {
    transport: Arc<dyn HttpTransport>,
    logger: QueryLogger,
    database: String,
    table: String,
}

impl std::fmt::Debug for ClickHouseConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClickHouseConnection")
            .field("database", &self.database)
            .field("table", &self.table)
            .finish()
    }
}

impl ClickHouseConnection {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        logger: QueryLogger,
        database: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            logger,
            database: database.into(),
            table: table.into(),
        }
    }
}

/// Quote a string as a ClickHouse literal.
fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'"))
}

fn literal(value: &NativeValue) -> Result<String> {
    let rendered = match value {
        NativeValue::Bool(b) => b.to_string(),
        NativeValue::Int8(v) => v.to_string(),
        NativeValue::Int16(v) => v.to_string(),
        NativeValue::Int32(v) => v.to_string(),
        NativeValue::Int64(v) => v.to_string(),
        NativeValue::Uint8(v) => v.to_string(),
        NativeValue::Uint16(v) => v.to_string(),
        NativeValue::Uint32(v) => v.to_string(),
        NativeValue::Uint64(v) => v.to_string(),
        NativeValue::Float32(v) => v.to_string(),
        NativeValue::Float64(v) => v.to_string(),
        NativeValue::String(s) => quote(s),
        NativeValue::Date(d) => quote(&d.format("%Y-%m-%d").to_string()),
        NativeValue::DateTime(dt) => quote(&dt.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
        NativeValue::StringList(items) => format!(
            "[{}]",
            items.iter().map(|s| quote(s)).collect::<Vec<_>>().join(", ")
        ),
        other => {
            return Err(ConnectorError::query(format!(
                "cannot bind {:?} argument",
                other.kind()
            )))
        }
    };
    Ok(rendered)
}

/// Lexical region of the query text being copied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Region {
    Code,
    /// Inside a quoted string or identifier closed by this character.
    Quoted(char),
    LineComment,
    BlockComment,
}

/// Substitute `?` placeholders in plain query text with rendered arguments,
/// then request the row format the cursor decodes. String literals, quoted
/// identifiers and comments are copied untouched.
pub fn render_query(params: &QueryParams) -> Result<String> {
    let text = params.query_text.trim().trim_end_matches(';').trim_end();
    let mut args = params.args.values().iter();
    let mut out = String::with_capacity(text.len() + FORMAT.len() + 8);
    let mut region = Region::Code;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match region {
            Region::Code => match c {
                '\'' | '"' | '`' => region = Region::Quoted(c),
                '-' if chars.peek() == Some(&'-') => region = Region::LineComment,
                '/' if chars.peek() == Some(&'*') => {
                    out.push(c);
                    out.extend(chars.next());
                    region = Region::BlockComment;
                    continue;
                }
                '?' => {
                    let arg = args.next().ok_or_else(|| {
                        ConnectorError::query("more placeholders than query arguments")
                    })?;
                    out.push_str(&literal(arg)?);
                    continue;
                }
                _ => {}
            },
            Region::Quoted(close) => {
                if c == '\\' {
                    out.push(c);
                    out.extend(chars.next());
                    continue;
                }
                if c == close {
                    region = Region::Code;
                }
            }
            Region::LineComment => {
                if c == '\n' {
                    region = Region::Code;
                }
            }
            Region::BlockComment => {
                if c == '*' && chars.peek() == Some(&'/') {
                    out.push(c);
                    out.extend(chars.next());
                    region = Region::Code;
                    continue;
                }
            }
        }
        out.push(c);
    }

    if args.next().is_some() {
        return Err(ConnectorError::query("more query arguments than placeholders"));
    }
    // A trailing line comment would swallow the FORMAT clause.
    out.push_str(if region == Region::LineComment { "\nFORMAT " } else { " FORMAT " });
    out.push_str(FORMAT);
    Ok(out)
}

#[async_trait]
impl Connection for ClickHouseConnection {
    async fn query(
        &self,
        params: &QueryParams,
        ctx: &QueryContext,
    ) -> Result<Box<dyn NativeCursor>> {
        self.logger.dump(&params.query_text, params.args.values());
        let query = render_query(params)?;

        let body = ctx
            .run(async {
                self.transport
                    .post(&query)
                    .await
                    .map_err(ConnectorError::from)
            })
            .await?;
        let cursor = ctx
            .run(async {
                JsonEachRowCursor::open(body)
                    .await
                    .map_err(ConnectorError::from)
            })
            .await?;
        tracing::debug!(columns = cursor.columns().len(), "clickhouse response header read");
        Ok(Box::new(cursor))
    }

    fn from(&self) -> (&str, &str) {
        (&self.database, &self.table)
    }

    fn describe_query(&self) -> QueryParams {
        QueryParams::new(
            "SELECT name, type FROM system.columns WHERE database = ? AND table = ? ORDER BY position",
        )
        .with_arg(self.database.as_str())
        .with_arg(self.table.as_str())
    }

    async fn close(&self) -> Result<()> {
        Ok(self.transport.close().await?)
    }
}

/// Builds a transport for an endpoint.
pub trait TransportFactory: Send + Sync {
    fn connect(
        &self,
        params: &ConnectionParams,
        config: &ClickHouseConfig,
    ) -> Result<Arc<dyn HttpTransport>>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReqwestTransportFactory;

impl TransportFactory for ReqwestTransportFactory {
    fn connect(
        &self,
        params: &ConnectionParams,
        config: &ClickHouseConfig,
    ) -> Result<Arc<dyn HttpTransport>> {
        Ok(Arc::new(ReqwestTransport::new(params, config)?))
    }
}

/// Hands out one shared in-memory transport.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransportFactory {
    transport: Arc<MemoryTransport>,
}

impl MemoryTransportFactory {
    pub fn new(transport: Arc<MemoryTransport>) -> Self {
        Self { transport }
    }
}

impl TransportFactory for MemoryTransportFactory {
    fn connect(
        &self,
        _params: &ConnectionParams,
        _config: &ClickHouseConfig,
    ) -> Result<Arc<dyn HttpTransport>> {
        Ok(self.transport.clone())
    }
}

pub struct ClickHouseConnectionManager {
    factory: Arc<dyn TransportFactory>,
    config: ClickHouseConfig,
    logger: QueryLogger,
}

impl std::fmt::Debug for ClickHouseConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClickHouseConnectionManager")
            .field("config", &self.config)
            .finish()
    }
}

impl ClickHouseConnectionManager {
    pub fn new(
        factory: Arc<dyn TransportFactory>,
        config: ClickHouseConfig,
        logger: QueryLogger,
    ) -> Self {
        Self {
            factory,
            config,
            logger,
        }
    }
}

#[async_trait]
impl ConnectionManager for ClickHouseConnectionManager {
    async fn make(
        &self,
        params: &ConnectionParams,
        ctx: &QueryContext,
    ) -> Result<Vec<Box<dyn Connection>>> {
        let transport = self.factory.connect(params, &self.config)?;

        let ping_ctx = ctx.child_with_timeout(self.config.ping_timeout());
        let ping = ping_ctx
            .run(async { transport.ping().await.map_err(ConnectorError::from) })
            .await;
        if let Err(e) = ping {
            tracing::warn!(endpoint = %params.endpoint(), error = %e, "clickhouse ping failed");
            log_close_error(transport.close().await, "close clickhouse transport");
            return Err(match e {
                ConnectorError::Cancelled => e,
                other => ConnectorError::transport(format!("conn ping {}: {}", params.endpoint(), other)),
            });
        }
        tracing::debug!(endpoint = %params.endpoint(), database = %params.database, "clickhouse connected");

        let connection: Box<dyn Connection> = Box::new(ClickHouseConnection::new(
            transport,
            self.logger,
            params.database.clone(),
            params.table.clone(),
        ));
        Ok(vec![connection])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_placeholders() {
        let params = QueryParams::new("SELECT * FROM t WHERE a = ? AND b = '?' AND c = ?;")
            .with_arg("it's")
            .with_arg(5i64);
        assert_eq!(
            render_query(&params).unwrap(),
            "SELECT * FROM t WHERE a = 'it\\'s' AND b = '?' AND c = 5 FORMAT JSONCompactEachRowWithNamesAndTypes"
        );
    }

    #[test]
    fn test_render_skips_identifiers_and_comments() {
        let params = QueryParams::new(
            "SELECT `a?`, \"b?\" FROM t /* c? */ WHERE x = ? -- trailing ?",
        )
        .with_arg(1i64);
        assert_eq!(
            render_query(&params).unwrap(),
            "SELECT `a?`, \"b?\" FROM t /* c? */ WHERE x = 1 -- trailing ?\nFORMAT JSONCompactEachRowWithNamesAndTypes"
        );

        let params = QueryParams::new("SELECT ? -- x\nWHERE y = ?")
            .with_arg(1i64)
            .with_arg(2i64);
        assert_eq!(
            render_query(&params).unwrap(),
            "SELECT 1 -- x\nWHERE y = 2 FORMAT JSONCompactEachRowWithNamesAndTypes"
        );
    }

    #[test]
    fn test_render_arity_mismatch() {
        let params = QueryParams::new("SELECT ?");
        assert!(matches!(render_query(&params), Err(ConnectorError::Query(_))));
        let params = QueryParams::new("SELECT 1").with_arg(1i64);
        assert!(matches!(render_query(&params), Err(ConnectorError::Query(_))));
    }
}
