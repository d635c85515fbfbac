//! Paging engine integration tests over the in-memory cursor.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::TryStreamExt;

use fedlink_connector::{
    describe_table, ColumnDescriptor, ConnectorError, ConverterCollection, MemoryConnection,
    MemoryCursor, NativeKind, NativeValue, OutOfBoundsPolicy, PagingConfig, PagingEngine,
    PagingState, QueryContext, Result, ResultSet, SchemaBinder, TypeMapper, TypeMappingSettings,
};
use fedlink_tabular::{ColumnBatch, LogicalColumn, LogicalType, PrimitiveType};

/// Small mapper standing in for a backend's.
struct TestMapper;

impl TypeMapper for TestMapper {
    fn map_column(
        &self,
        name: &str,
        native_type: &str,
        _settings: &TypeMappingSettings,
    ) -> Result<LogicalColumn> {
        let p = match native_type {
            "varchar" => PrimitiveType::Utf8,
            "int" => PrimitiveType::Int64,
            "tiny" => PrimitiveType::Int8,
            other => {
                return Err(ConnectorError::unsupported_type(format!(
                    "unknown test type {}",
                    other
                )))
            }
        };
        Ok(LogicalColumn::new(
            name,
            LogicalType::optional(LogicalType::primitive(p)),
        ))
    }
}

fn binder(policy: OutOfBoundsPolicy) -> SchemaBinder {
    SchemaBinder::new(
        Arc::new(TestMapper),
        TypeMappingSettings::default(),
        ConverterCollection::new(policy),
    )
}

fn varchar(name: &str) -> ColumnDescriptor {
    ColumnDescriptor::new(name, "varchar", NativeKind::String)
}

fn int(name: &str) -> ColumnDescriptor {
    ColumnDescriptor::new(name, "int", NativeKind::Int64)
}

fn paging(rows: usize) -> PagingConfig {
    PagingConfig {
        rows_per_batch: rows,
        ..PagingConfig::default()
    }
}

async fn open(
    sets: Vec<ResultSet>,
    policy: OutOfBoundsPolicy,
    config: PagingConfig,
) -> (PagingEngine, Arc<AtomicUsize>) {
    let cursor = MemoryCursor::new(sets);
    let closes = cursor.close_counter();
    let engine = PagingEngine::open(Box::new(cursor), binder(policy), config, QueryContext::new())
        .await
        .unwrap();
    (engine, closes)
}

async fn drain(engine: &mut PagingEngine) -> Vec<ColumnBatch> {
    let mut batches = Vec::new();
    while let Some(batch) = engine.next_batch().await.unwrap() {
        batches.push(batch);
    }
    batches
}

fn int_rows(n: i64) -> ResultSet {
    (0..n).fold(ResultSet::new(vec![int("n")]), |set, i| {
        set.with_row(vec![Some(NativeValue::Int64(i))])
    })
}

#[tokio::test]
async fn three_string_fields() {
    let set = ResultSet::new(vec![varchar("field1"), varchar("field2"), varchar("field3")])
        .with_row(vec![Some("a".into()), Some("b".into()), Some("".into())]);
    let (mut engine, closes) = open(vec![set], OutOfBoundsPolicy::Lenient, paging(100)).await;
    assert_eq!(engine.state(), PagingState::Idle);

    let batches = drain(&mut engine).await;
    assert_eq!(batches.len(), 1);
    let batch = &batches[0];
    assert_eq!(batch.num_rows, 1);
    for (i, expected) in ["a", "b", ""].iter().enumerate() {
        let column = batch.column(i).unwrap();
        assert!(!column.is_null(0));
        assert_eq!(column.get_string(0), Some(*expected));
    }
    assert_eq!(engine.state(), PagingState::Exhausted);
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn null_is_materialized_as_null() {
    let set = ResultSet::new(vec![varchar("s"), int("n")])
        .with_row(vec![None, Some(NativeValue::Int64(0))])
        .with_row(vec![Some("x".into()), None]);
    let (mut engine, _) = open(vec![set], OutOfBoundsPolicy::Lenient, paging(100)).await;
    let batch = engine.next_batch().await.unwrap().unwrap();

    let s = batch.column_by_name("s").unwrap();
    let n = batch.column_by_name("n").unwrap();
    assert!(s.is_null(0));
    assert_eq!(n.get_integer(0), Some(0));
    assert_eq!(s.get_string(1), Some("x"));
    assert!(n.is_null(1));
    assert_eq!(n.get_integer(1), None);
}

#[tokio::test]
async fn out_of_bounds_cell_becomes_null_in_lenient_mode() {
    let set = ResultSet::new(vec![
        ColumnDescriptor::new("small", "tiny", NativeKind::Int64),
        varchar("tag"),
    ])
    .with_row(vec![Some(NativeValue::Int64(7)), Some("a".into())])
    .with_row(vec![Some(NativeValue::Int64(300)), Some("b".into())])
    .with_row(vec![Some(NativeValue::Int64(-128)), Some("c".into())]);
    let (mut engine, _) = open(vec![set], OutOfBoundsPolicy::Lenient, paging(100)).await;
    let batch = engine.next_batch().await.unwrap().unwrap();

    assert_eq!(batch.num_rows, 3);
    let small = batch.column(0).unwrap();
    assert_eq!(small.get_integer(0), Some(7));
    assert!(small.is_null(1));
    assert_eq!(small.get_integer(2), Some(-128));
    assert_eq!(batch.column(1).unwrap().get_string(1), Some("b"));
    assert_eq!(engine.stats().out_of_bounds, 1);
}

#[tokio::test]
async fn strict_mode_fails_and_closes_once() {
    let set = ResultSet::new(vec![ColumnDescriptor::new("small", "tiny", NativeKind::Int64)])
        .with_row(vec![Some(NativeValue::Int64(1_000))]);
    let (mut engine, closes) = open(vec![set], OutOfBoundsPolicy::Strict, paging(100)).await;

    let err = engine.next_batch().await.unwrap_err();
    assert!(matches!(err, ConnectorError::OutOfTypeBounds(_)));
    assert_eq!(engine.state(), PagingState::Failed);
    assert_eq!(closes.load(Ordering::SeqCst), 1);

    assert!(engine.next_batch().await.unwrap().is_none());
    engine.close().await.unwrap();
    engine.close().await.unwrap();
    assert_eq!(engine.state(), PagingState::Closed);
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn row_bound_splits_on_row_boundaries() {
    let (mut engine, _) = open(vec![int_rows(25)], OutOfBoundsPolicy::Lenient, paging(10)).await;
    let batches = drain(&mut engine).await;

    let sizes: Vec<usize> = batches.iter().map(|b| b.num_rows).collect();
    assert_eq!(sizes, vec![10, 10, 5]);
    let values: Vec<i128> = batches
        .iter()
        .flat_map(|b| {
            let col = b.column(0).unwrap();
            (0..b.num_rows).filter_map(move |i| col.get_integer(i))
        })
        .collect();
    assert_eq!(values, (0..25).collect::<Vec<i128>>());
    assert_eq!(engine.stats().rows, 25);
    assert_eq!(engine.stats().batches, 3);
}

#[tokio::test]
async fn byte_bound_flushes_whole_rows() {
    let text = "x".repeat(40);
    let set = (0..5).fold(ResultSet::new(vec![varchar("s")]), |set, _| {
        set.with_row(vec![Some(text.as_str().into())])
    });
    let config = PagingConfig {
        rows_per_batch: 1_000,
        bytes_per_batch: 100,
    };
    let (mut engine, _) = open(vec![set], OutOfBoundsPolicy::Lenient, config).await;
    let sizes: Vec<usize> = drain(&mut engine).await.iter().map(|b| b.num_rows).collect();
    assert_eq!(sizes, vec![2, 2, 1]);
}

#[tokio::test]
async fn oversized_paging_config_is_rejected_at_open() {
    let cursor = MemoryCursor::new(vec![int_rows(3)]);
    let closes = cursor.close_counter();
    let config = PagingConfig {
        rows_per_batch: usize::MAX,
        bytes_per_batch: 1024,
    };
    let err = PagingEngine::open(
        Box::new(cursor),
        binder(OutOfBoundsPolicy::Lenient),
        config,
        QueryContext::new(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ConnectorError::Config(_)));
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn builders_are_sized_by_the_byte_budget() {
    let config = PagingConfig {
        rows_per_batch: 5_000_000,
        bytes_per_batch: 1024,
    };
    config.validate().unwrap();
    assert_eq!(config.capacity_hint(1), 128);
    assert_eq!(config.capacity_hint(4), 32);
    assert_eq!(config.capacity_hint(1_000), 1);
    assert_eq!(paging(10).capacity_hint(3), 10);

    let (mut engine, _) = open(vec![int_rows(3)], OutOfBoundsPolicy::Lenient, config).await;
    let batches = drain(&mut engine).await;
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].num_rows, 3);
}

#[tokio::test]
async fn empty_result_yields_one_empty_batch() {
    let set = ResultSet::new(vec![varchar("a"), int("b")]);
    let (mut engine, closes) = open(vec![set], OutOfBoundsPolicy::Lenient, paging(10)).await;
    let batches = drain(&mut engine).await;

    assert_eq!(batches.len(), 1);
    assert!(batches[0].is_empty());
    assert_eq!(batches[0].schema.num_columns(), 2);
    assert_eq!(batches[0].schema.columns[1].name, "b");
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn new_result_set_rebinds_schema() {
    let first = ResultSet::new(vec![varchar("column_name"), varchar("data_type")])
        .with_row(vec![Some("id".into()), Some("varchar".into())]);
    let second = ResultSet::new(vec![int("a"), int("b"), int("c")]).with_row(vec![
        Some(NativeValue::Int64(1)),
        None,
        Some(NativeValue::Int64(3)),
    ]);
    let (mut engine, _) = open(
        vec![first, second],
        OutOfBoundsPolicy::Lenient,
        paging(100),
    )
    .await;
    let batches = drain(&mut engine).await;

    assert_eq!(batches.len(), 2);
    assert_eq!(batches[0].schema.num_columns(), 2);
    assert_eq!(batches[1].schema.num_columns(), 3);
    assert!(batches[1].column(1).unwrap().is_null(0));
    assert_eq!(engine.stats().result_sets, 2);
}

#[tokio::test]
async fn transport_error_after_first_batch() {
    let cursor = MemoryCursor::new(vec![int_rows(10)]).fail_after(3);
    let closes = cursor.close_counter();
    let mut engine = PagingEngine::open(
        Box::new(cursor),
        binder(OutOfBoundsPolicy::Lenient),
        paging(2),
        QueryContext::new(),
    )
    .await
    .unwrap();

    assert_eq!(engine.next_batch().await.unwrap().unwrap().num_rows, 2);
    let err = engine.next_batch().await.unwrap_err();
    assert!(matches!(err, ConnectorError::Transport(_)));
    assert_eq!(engine.state(), PagingState::Failed);
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn cancellation_releases_cursor() {
    let cursor = MemoryCursor::new(vec![int_rows(5)]);
    let closes = cursor.close_counter();
    let ctx = QueryContext::new();
    let mut engine = PagingEngine::open(
        Box::new(cursor),
        binder(OutOfBoundsPolicy::Lenient),
        paging(2),
        ctx.clone(),
    )
    .await
    .unwrap();

    assert!(engine.next_batch().await.unwrap().is_some());
    ctx.cancel();
    let err = engine.next_batch().await.unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unsupported_type_fails_at_open() {
    let cursor = MemoryCursor::new(vec![ResultSet::new(vec![ColumnDescriptor::new(
        "g",
        "geometry",
        NativeKind::Bytes,
    )])]);
    let closes = cursor.close_counter();
    let err = PagingEngine::open(
        Box::new(cursor),
        binder(OutOfBoundsPolicy::Lenient),
        PagingConfig::default(),
        QueryContext::new(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ConnectorError::UnsupportedType(_)));
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn stream_yields_all_rows() {
    let (engine, closes) = open(vec![int_rows(7)], OutOfBoundsPolicy::Lenient, paging(3)).await;
    let batches: Vec<ColumnBatch> = engine.into_stream().try_collect().await.unwrap();
    assert_eq!(batches.iter().map(|b| b.num_rows).sum::<usize>(), 7);
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn dropping_engine_closes_cursor() {
    let (mut engine, closes) =
        open(vec![int_rows(5)], OutOfBoundsPolicy::Lenient, paging(2)).await;
    assert!(engine.next_batch().await.unwrap().is_some());
    drop(engine);
    for _ in 0..10 {
        if closes.load(Ordering::SeqCst) == 1 {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn describe_table_maps_each_row() {
    let conn = MemoryConnection::new("db", "example_table").with_description([
        ("id", "varchar"),
        ("field1", "varchar"),
        ("hits", "int"),
    ]);
    let columns = describe_table(
        &conn,
        &TestMapper,
        &TypeMappingSettings::default(),
        &QueryContext::new(),
    )
    .await
    .unwrap();

    let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["id", "field1", "hits"]);
    assert_eq!(
        columns[2].logical_type.as_primitive(),
        Some(PrimitiveType::Int64)
    );
}

#[tokio::test]
async fn describe_table_rejects_unknown_type() {
    let conn = MemoryConnection::new("db", "t").with_description([("p", "point")]);
    let err = describe_table(
        &conn,
        &TestMapper,
        &TypeMappingSettings::default(),
        &QueryContext::new(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ConnectorError::UnsupportedType(_)));
}
