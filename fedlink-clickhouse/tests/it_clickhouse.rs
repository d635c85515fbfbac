//! ClickHouse backend end to end over the in-memory HTTP transport.

use std::sync::Arc;

use bytes::Bytes;
use futures::TryStreamExt;

use fedlink_clickhouse::{
    ClickHouseConnection, ClickHouseConnectionManager, ClickHouseTypeMapper, MemoryTransport,
    MemoryTransportFactory,
};
use fedlink_connector::{
    describe_table, ClickHouseConfig, Connection, ConnectionManager, ConnectionParams,
    ConnectorError, ConverterCollection, DateTimeFormat, OutOfBoundsPolicy, PagingConfig,
    PagingEngine, QueryContext, QueryLogger, QueryParams, SchemaBinder, TypeMappingSettings,
};
use fedlink_tabular::{ColumnBatch, LogicalType, PrimitiveType};

const EVENTS: &str = concat!(
    r#"["id","kind","at","day","tags","small"]"#,
    "\n",
    r#"["UInt64","LowCardinality(Nullable(String))","DateTime64(3)","Date32","Array(String)","Nullable(Int64)"]"#,
    "\n",
    r#"["1","click","2024-01-02 03:04:05.678","2024-01-02",["a"],"7"]"#,
    "\n",
    r#"["2",null,"2024-01-02 03:04:06.000","1969-12-31",[],"9223372036854775807"]"#,
    "\n",
);

fn connection(transport: Arc<MemoryTransport>) -> ClickHouseConnection {
    ClickHouseConnection::new(transport, QueryLogger::new(true), "analytics", "events")
}

fn binder(format: DateTimeFormat, policy: OutOfBoundsPolicy) -> SchemaBinder {
    SchemaBinder::new(
        Arc::new(ClickHouseTypeMapper),
        TypeMappingSettings {
            date_time_format: format,
        },
        ConverterCollection::new(policy),
    )
}

async fn run(
    conn: &ClickHouseConnection,
    query: QueryParams,
    binder: SchemaBinder,
) -> std::result::Result<Vec<ColumnBatch>, ConnectorError> {
    let ctx = QueryContext::new();
    let cursor = conn.query(&query, &ctx).await?;
    let engine = PagingEngine::open(cursor, binder, PagingConfig::default(), ctx).await?;
    engine.into_stream().try_collect().await
}

#[tokio::test]
async fn events_through_paging_engine() {
    let transport = Arc::new(MemoryTransport::new());
    transport.respond("SELECT", EVENTS);
    let conn = connection(Arc::clone(&transport));

    let batches = run(
        &conn,
        QueryParams::new("SELECT * FROM events WHERE id > ?").with_arg(0i64),
        binder(DateTimeFormat::Native, OutOfBoundsPolicy::Lenient),
    )
    .await
    .unwrap();
    assert_eq!(
        transport.queries(),
        vec!["SELECT * FROM events WHERE id > 0 FORMAT JSONCompactEachRowWithNamesAndTypes"]
    );

    let batch = &batches[0];
    assert_eq!(batch.num_rows, 2);
    let id = batch.column_by_name("id").unwrap();
    assert_eq!(id.get_integer(1), Some(2));
    let kind = batch.column_by_name("kind").unwrap();
    assert_eq!(kind.get_string(0), Some("click"));
    assert!(kind.is_null(1));
    let at = batch.column_by_name("at").unwrap();
    assert_eq!(at.get_integer(0), Some(1_704_164_645_678_000));
    // 1969-12-31 is below the Date range: recovered as null.
    let day = batch.column_by_name("day").unwrap();
    assert_eq!(day.get_integer(0), Some(19_724));
    assert!(day.is_null(1));
    let small = batch.column_by_name("small").unwrap();
    assert_eq!(small.get_integer(1), Some(i64::MAX as i128));
    let tags = batch.column_by_name("tags").unwrap();
    assert_eq!(tags.list_range(0), Some(0..1));
    assert_eq!(tags.list_range(1), Some(1..1));
}

#[tokio::test]
async fn chunked_response_pages_like_a_whole_one() {
    let transport = Arc::new(MemoryTransport::new());
    let chunks = EVENTS
        .as_bytes()
        .chunks(7)
        .map(Bytes::copy_from_slice)
        .collect();
    transport.respond_chunked("SELECT", chunks);
    let conn = connection(transport);

    let config = PagingConfig {
        rows_per_batch: 1,
        ..PagingConfig::default()
    };
    let ctx = QueryContext::new();
    let cursor = conn
        .query(&QueryParams::new("SELECT * FROM events"), &ctx)
        .await
        .unwrap();
    let engine = PagingEngine::open(
        cursor,
        binder(DateTimeFormat::Native, OutOfBoundsPolicy::Lenient),
        config,
        ctx,
    )
    .await
    .unwrap();
    let batches: Vec<ColumnBatch> = engine.into_stream().try_collect().await.unwrap();

    assert_eq!(batches.len(), 2);
    let at = batches[0].column_by_name("at").unwrap();
    assert_eq!(at.get_integer(0), Some(1_704_164_645_678_000));
    let kind = batches[1].column_by_name("kind").unwrap();
    assert!(kind.is_null(0));
}

#[tokio::test]
async fn strict_policy_fails_on_out_of_range_date() {
    let transport = Arc::new(MemoryTransport::new());
    transport.respond("SELECT", EVENTS);
    let conn = connection(transport);
    let err = run(
        &conn,
        QueryParams::new("SELECT * FROM events"),
        binder(DateTimeFormat::Native, OutOfBoundsPolicy::Strict),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ConnectorError::OutOfTypeBounds(_)));
}

#[tokio::test]
async fn string_date_format_renders_iso() {
    let transport = Arc::new(MemoryTransport::new());
    transport.respond("SELECT", EVENTS);
    let conn = connection(transport);
    let batches = run(
        &conn,
        QueryParams::new("SELECT * FROM events"),
        binder(DateTimeFormat::String, OutOfBoundsPolicy::Strict),
    )
    .await
    .unwrap();
    let day = batches[0].column_by_name("day").unwrap();
    assert_eq!(day.get_string(1), Some("1969-12-31"));
    assert_eq!(
        batches[0].schema.columns[2].logical_type,
        LogicalType::primitive(PrimitiveType::Utf8)
    );
}

#[tokio::test]
async fn unsupported_column_type_fails_at_query() {
    let transport = Arc::new(MemoryTransport::new());
    transport.respond("SELECT", "[\"price\"]\n[\"Decimal(9, 2)\"]\n[\"1.50\"]\n");
    let conn = connection(transport);
    let err = conn
        .query(&QueryParams::new("SELECT price FROM t"), &QueryContext::new())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ConnectorError::UnsupportedType(_)));
}

#[tokio::test]
async fn server_error_is_transport() {
    let transport = Arc::new(MemoryTransport::new());
    let conn = connection(transport);
    let err = conn
        .query(&QueryParams::new("SELECT 1"), &QueryContext::new())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ConnectorError::Transport(_)));
}

#[tokio::test]
async fn describe_through_system_columns() {
    let transport = Arc::new(MemoryTransport::new());
    transport.respond(
        "SELECT name, type FROM system.columns",
        concat!(
            "[\"name\",\"type\"]\n",
            "[\"String\",\"String\"]\n",
            "[\"id\",\"UInt64\"]\n",
            "[\"kind\",\"Nullable(String)\"]\n",
        ),
    );
    let conn = connection(Arc::clone(&transport));
    let columns = describe_table(
        &conn,
        &ClickHouseTypeMapper,
        &TypeMappingSettings::default(),
        &QueryContext::new(),
    )
    .await
    .unwrap();
    assert_eq!(columns.len(), 2);
    assert_eq!(
        columns[0].logical_type,
        LogicalType::primitive(PrimitiveType::Uint64)
    );
    assert!(columns[1].logical_type.is_optional());
    assert!(transport.queries()[0].contains("database = 'analytics' AND table = 'events'"));
}

#[tokio::test]
async fn manager_pings_and_releases() {
    let transport = Arc::new(MemoryTransport::new());
    let manager = ClickHouseConnectionManager::new(
        Arc::new(MemoryTransportFactory::new(Arc::clone(&transport))),
        ClickHouseConfig::default(),
        QueryLogger::default(),
    );
    let params = ConnectionParams::new("localhost", 8123)
        .with_database("analytics")
        .with_table("events");
    let connections = manager.make(&params, &QueryContext::new()).await.unwrap();
    assert_eq!(connections[0].from(), ("analytics", "events"));
    manager.release(connections).await;
    assert!(transport.is_closed());

    transport.set_unavailable(true);
    let err = manager
        .make(&params, &QueryContext::new())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ConnectorError::Transport(_)));
}
