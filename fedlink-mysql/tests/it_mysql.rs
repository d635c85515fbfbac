//! MySQL backend end to end: streamed rows through the paging engine and
//! connection manager failures.

use std::sync::Arc;

use futures::TryStreamExt;
use mysql_async::Value;
use tokio::sync::mpsc;

use fedlink_connector::{
    ConnectionManager, ConnectionParams, ConnectorError, ConverterCollection, DateTimeFormat,
    MySqlConfig, NativeCursor, OutOfBoundsPolicy, PagingConfig, PagingEngine, QueryContext,
    QueryLogger, SchemaBinder, SecretValue, TypeMappingSettings,
};
use fedlink_mysql::{Frame, MySqlConnectionManager, MySqlRows, MySqlTypeMapper};
use fedlink_tabular::{LogicalType, PrimitiveType};

fn binder(format: DateTimeFormat) -> SchemaBinder {
    SchemaBinder::new(
        Arc::new(MySqlTypeMapper),
        TypeMappingSettings {
            date_time_format: format,
        },
        ConverterCollection::new(OutOfBoundsPolicy::Strict),
    )
}

/// Feed frames from a task, as the statement pump does.
async fn rows(frames: Vec<Frame>, capacity: usize) -> MySqlRows {
    let (tx, rx) = mpsc::channel(capacity);
    let task = tokio::spawn(async move {
        for frame in frames {
            if tx.send(frame).await.is_err() {
                break;
            }
        }
    });
    MySqlRows::open(rx, Some(task)).await.unwrap()
}

fn orders(count: u64) -> Vec<Frame> {
    let mut frames = vec![Frame::Header(vec![
        ("id".to_string(), "bigint unsigned".to_string()),
        ("customer".to_string(), "varchar".to_string()),
        ("placed".to_string(), "datetime".to_string()),
    ])];
    for id in 0..count {
        frames.push(Frame::Row(vec![
            Value::UInt(id),
            if id % 2 == 0 {
                Value::Bytes(format!("c{}", id).into_bytes())
            } else {
                Value::NULL
            },
            Value::Date(2024, 3, 1, 12, 0, id as u8, 0),
        ]));
    }
    frames
}

#[tokio::test]
async fn streamed_rows_page_through_engine() {
    let cursor = rows(orders(5), 2).await;
    let config = PagingConfig {
        rows_per_batch: 2,
        ..PagingConfig::default()
    };
    let engine = PagingEngine::open(
        Box::new(cursor),
        binder(DateTimeFormat::Native),
        config,
        QueryContext::new(),
    )
    .await
    .unwrap();
    let batches: Vec<_> = engine.into_stream().try_collect().await.unwrap();

    assert_eq!(
        batches.iter().map(|b| b.num_rows).collect::<Vec<_>>(),
        vec![2, 2, 1]
    );
    assert_eq!(
        batches[0].schema.columns[0].logical_type,
        LogicalType::optional(LogicalType::primitive(PrimitiveType::Uint64))
    );
    assert_eq!(
        batches[0].schema.columns[2].logical_type,
        LogicalType::optional(LogicalType::primitive(PrimitiveType::Timestamp))
    );
    let customer = batches[0].column_by_name("customer").unwrap();
    assert_eq!(customer.get_string(0), Some("c0"));
    assert!(customer.is_null(1));
}

#[tokio::test]
async fn closing_early_stops_the_statement_task() {
    let mut cursor = rows(orders(1_000), 4).await;
    assert!(cursor.next().await.unwrap());
    // The feeding task is blocked on a full channel until close.
    cursor.close().await.unwrap();
    assert_eq!(cursor.rows_read(), 1);
    assert!(!cursor.next().await.unwrap());
}

#[tokio::test]
async fn refused_connection_is_transport_error() {
    let manager = MySqlConnectionManager::new(
        MySqlConfig {
            open_connection_timeout_ms: 2_000,
            ..MySqlConfig::default()
        },
        QueryLogger::default(),
    );
    // Nothing listens on port 1.
    let params = ConnectionParams::new("127.0.0.1", 1)
        .with_database("shop")
        .with_credentials("reader", SecretValue::inline("s3cret"));
    let err = manager
        .make(&params, &QueryContext::new())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ConnectorError::Transport(_)));
    assert!(err.to_string().contains("127.0.0.1:1"));
}

#[tokio::test]
async fn missing_credentials_fail_before_connecting() {
    let manager = MySqlConnectionManager::new(MySqlConfig::default(), QueryLogger::default());
    let params = ConnectionParams::new("127.0.0.1", 1).with_database("shop");
    let err = manager
        .make(&params, &QueryContext::new())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ConnectorError::Config(_)));
}
