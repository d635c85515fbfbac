//! MySQL connection and connection manager.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Datelike, Timelike};
use mysql_async::prelude::Queryable;
use mysql_async::{Conn, Opts, OptsBuilder, Params, SslOpts, Value};
use tokio::sync::{mpsc, Mutex};

use fedlink_connector::{
    Connection, ConnectionManager, ConnectionParams, ConnectorError, MySqlConfig, NativeCursor,
    NativeValue, QueryContext, QueryLogger, QueryParams, Result,
};

use crate::error::MySqlError;
use crate::rows::{pump, MySqlRows};

/// Driver value for a query argument.
fn bind_value(value: &NativeValue) -> Result<Value> {
    Ok(match value {
        NativeValue::Bool(b) => Value::Int(i64::from(*b)),
        NativeValue::Int8(v) => Value::Int(i64::from(*v)),
        NativeValue::Int16(v) => Value::Int(i64::from(*v)),
        NativeValue::Int32(v) => Value::Int(i64::from(*v)),
        NativeValue::Int64(v) => Value::Int(*v),
        NativeValue::Uint8(v) => Value::UInt(u64::from(*v)),
        NativeValue::Uint16(v) => Value::UInt(u64::from(*v)),
        NativeValue::Uint32(v) => Value::UInt(u64::from(*v)),
        NativeValue::Uint64(v) => Value::UInt(*v),
        NativeValue::Float32(v) => Value::Float(*v),
        NativeValue::Float64(v) => Value::Double(*v),
        NativeValue::String(s) => Value::Bytes(s.as_bytes().to_vec()),
        NativeValue::Bytes(b) => Value::Bytes(b.clone()),
        NativeValue::Date(d) => Value::Date(year(d.year())?, d.month() as u8, d.day() as u8, 0, 0, 0, 0),
        NativeValue::DateTime(dt) => Value::Date(
            year(dt.year())?,
            dt.month() as u8,
            dt.day() as u8,
            dt.hour() as u8,
            dt.minute() as u8,
            dt.second() as u8,
            dt.nanosecond() / 1_000,
        ),
        other => {
            return Err(ConnectorError::query(format!(
                "cannot bind {:?} argument",
                other.kind()
            )))
        }
    })
}

fn year(year: i32) -> Result<u16> {
    u16::try_from(year)
        .ok()
        .filter(|y| *y <= 9999)
        .ok_or_else(|| ConnectorError::query(format!("year {} is outside the MySQL range", year)))
}

/// Positional statement parameters for `params`.
pub fn bind_args(params: &QueryParams) -> Result<Params> {
    let values = params.args.values();
    if values.is_empty() {
        return Ok(Params::Empty);
    }
    Ok(Params::Positional(
        values.iter().map(bind_value).collect::<Result<Vec<_>>>()?,
    ))
}

/// Driver options for `params`: password authentication, TLS with
/// certificate verification when requested, no unix sockets.
pub fn connect_options(params: &ConnectionParams) -> Result<Opts> {
    if params.host.contains('/') {
        return Err(ConnectorError::config("unix socket connections are unsupported"));
    }
    let (Some(username), Some(password)) = (&params.username, &params.password) else {
        return Err(ConnectorError::config(
            "MySQL requires a username and password",
        ));
    };
    let password = password.resolve()?;

    let mut builder = OptsBuilder::default()
        .ip_or_hostname(params.host.clone())
        .tcp_port(params.port)
        .prefer_socket(false)
        .user(Some(username.clone()))
        .pass(Some(password));
    if !params.database.is_empty() {
        builder = builder.db_name(Some(params.database.clone()));
    }
    if params.use_tls {
        builder = builder.ssl_opts(Some(SslOpts::default()));
    }
    Ok(Opts::from(builder))
}

/// One MySQL session bound to a table.
pub struct MySqlConnection {
    conn: Arc<Mutex<Option<Conn>>>,
    logger: QueryLogger,
    config: MySqlConfig,
    database: String,
    table: String,
}

impl std::fmt::Debug for MySqlConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlConnection")
            .field("database", &self.database)
            .field("table", &self.table)
            .finish()
    }
}

impl MySqlConnection {
    pub fn new(
        conn: Conn,
        config: MySqlConfig,
        logger: QueryLogger,
        database: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            conn: Arc::new(Mutex::new(Some(conn))),
            logger,
            config,
            database: database.into(),
            table: table.into(),
        }
    }
}

#[async_trait]
impl Connection for MySqlConnection {
    async fn query(
        &self,
        params: &QueryParams,
        ctx: &QueryContext,
    ) -> Result<Box<dyn NativeCursor>> {
        self.logger.dump(&params.query_text, params.args.values());
        let args = bind_args(params)?;

        // Waits for the previous cursor to release the session.
        let guard = ctx
            .run(async { Ok::<_, ConnectorError>(Arc::clone(&self.conn).lock_owned().await) })
            .await?;
        if guard.is_none() {
            return Err(ConnectorError::transport("connection is closed"));
        }

        let (tx, rx) = mpsc::channel(self.config.prefetch_rows);
        let task = tokio::spawn(pump(guard, params.query_text.clone(), args, tx));
        let cursor = ctx
            .run(async {
                MySqlRows::open(rx, Some(task))
                    .await
                    .map_err(ConnectorError::from)
            })
            .await?;
        tracing::debug!(columns = cursor.columns().len(), "mysql result header read");
        Ok(Box::new(cursor))
    }

    fn from(&self) -> (&str, &str) {
        (&self.database, &self.table)
    }

    fn describe_query(&self) -> QueryParams {
        QueryParams::new(
            "SELECT column_name, column_type FROM information_schema.columns \
             WHERE table_schema = ? AND table_name = ? ORDER BY ordinal_position",
        )
        .with_arg(self.database.as_str())
        .with_arg(self.table.as_str())
    }

    async fn close(&self) -> Result<()> {
        let conn = self.conn.lock().await.take();
        if let Some(conn) = conn {
            conn.disconnect()
                .await
                .map_err(|e| ConnectorError::from(MySqlError::from(e)))?;
        }
        Ok(())
    }
}

pub struct MySqlConnectionManager {
    config: MySqlConfig,
    logger: QueryLogger,
}

impl std::fmt::Debug for MySqlConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlConnectionManager")
            .field("config", &self.config)
            .finish()
    }
}

impl MySqlConnectionManager {
    pub fn new(config: MySqlConfig, logger: QueryLogger) -> Self {
        Self { config, logger }
    }
}

/// Open a session and pin it to UTC so temporal values come back unshifted.
async fn open_session(opts: Opts) -> std::result::Result<Conn, MySqlError> {
    let mut conn = Conn::new(opts).await?;
    if let Err(e) = conn.query_drop("SET time_zone = 'UTC'").await {
        fedlink_connector::log_close_error(conn.disconnect().await, "close mysql connection");
        return Err(MySqlError::driver(format!("set time zone: {}", e)));
    }
    Ok(conn)
}

#[async_trait]
impl ConnectionManager for MySqlConnectionManager {
    async fn make(
        &self,
        params: &ConnectionParams,
        ctx: &QueryContext,
    ) -> Result<Vec<Box<dyn Connection>>> {
        let opts = connect_options(params)?;

        let open_ctx = ctx.child_with_timeout(self.config.open_connection_timeout());
        let conn = open_ctx
            .run(async { open_session(opts).await.map_err(ConnectorError::from) })
            .await
            .map_err(|e| {
                tracing::warn!(endpoint = %params.endpoint(), error = %e, "mysql connect failed");
                match e {
                    ConnectorError::Cancelled => e,
                    other => ConnectorError::transport(format!(
                        "connect to MySQL at {}: {}",
                        params.endpoint(),
                        other
                    )),
                }
            })?;
        tracing::debug!(endpoint = %params.endpoint(), tls = params.use_tls, "mysql connected");

        let connection: Box<dyn Connection> = Box::new(MySqlConnection::new(
            conn,
            self.config,
            self.logger,
            params.database.clone(),
            params.table.clone(),
        ));
        Ok(vec![connection])
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use fedlink_connector::SecretValue;

    use super::*;

    fn params() -> ConnectionParams {
        ConnectionParams::new("db.internal", 3306)
            .with_database("shop")
            .with_table("orders")
            .with_credentials("reader", SecretValue::inline("s3cret"))
    }

    #[test]
    fn test_connect_options() {
        let opts = connect_options(&params()).unwrap();
        assert_eq!(opts.ip_or_hostname(), "db.internal");
        assert_eq!(opts.tcp_port(), 3306);
        assert_eq!(opts.user(), Some("reader"));
        assert_eq!(opts.pass(), Some("s3cret"));
        assert_eq!(opts.db_name(), Some("shop"));
        assert!(opts.ssl_opts().is_none());

        let mut tls = params();
        tls.use_tls = true;
        assert!(connect_options(&tls).unwrap().ssl_opts().is_some());
    }

    #[test]
    fn test_connect_options_rejected() {
        let anonymous = ConnectionParams::new("db.internal", 3306);
        assert!(matches!(connect_options(&anonymous), Err(ConnectorError::Config(_))));

        let socket = ConnectionParams::new("/var/run/mysqld/mysqld.sock", 0)
            .with_credentials("reader", SecretValue::inline("s3cret"));
        assert!(matches!(connect_options(&socket), Err(ConnectorError::Config(_))));
    }

    #[test]
    fn test_bind_args() {
        let params = QueryParams::new("SELECT * FROM t WHERE a = ? AND b = ? AND c = ?")
            .with_arg(7u32)
            .with_arg("x")
            .with_arg(
                NaiveDate::from_ymd_opt(2024, 1, 2)
                    .unwrap()
                    .and_hms_micro_opt(3, 4, 5, 6)
                    .unwrap(),
            );
        match bind_args(&params).unwrap() {
            Params::Positional(values) => assert_eq!(
                values,
                vec![
                    Value::UInt(7),
                    Value::Bytes(b"x".to_vec()),
                    Value::Date(2024, 1, 2, 3, 4, 5, 6),
                ]
            ),
            other => panic!("expected positional params, got {:?}", other),
        }
        assert!(matches!(bind_args(&QueryParams::new("SELECT 1")).unwrap(), Params::Empty));

        let list = QueryParams::new("SELECT ?").with_arg(NativeValue::StringList(vec![]));
        assert!(matches!(bind_args(&list), Err(ConnectorError::Query(_))));
    }
}
