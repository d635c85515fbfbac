//! Paging engine.
//!
//! Pulls rows from a [`NativeCursor`] through a [`RowTransformer`] and cuts
//! them into bounded [`ColumnBatch`]es. A batch is flushed as soon as either
//! the row bound or the byte estimate is reached, and always on a row
//! boundary.
//!
//! State machine:
//!
//! ```text
//! Idle -> Fetching -> (BatchReady | Exhausted | Failed) -> Closed
//!              ^            |
//!              +------------+
//! ```
//!
//! The cursor is released exactly once: when the engine reaches `Exhausted`
//! or `Failed`, on `close()`, or (if still held) when the engine is dropped.

use std::sync::Arc;

use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use tracing::Instrument;

use fedlink_tabular::{BatchSchema, ColumnBatch, ColumnBuilder, LogicalColumn};

use crate::appender::ConverterCollection;
use crate::context::QueryContext;
use crate::cursor::NativeCursor;
use crate::error::{ConnectorError, Result};
use crate::logging::log_close_error;
use crate::transformer::RowTransformer;
use crate::type_mapper::{TypeMapper, TypeMappingSettings};

/// Default maximum rows per batch.
pub const DEFAULT_ROWS_PER_BATCH: usize = 10_000;

/// Default byte budget per batch (4 MiB).
pub const DEFAULT_BYTES_PER_BATCH: usize = 4 * 1024 * 1024;

/// Largest accepted `rows_per_batch`.
pub const MAX_ROWS_PER_BATCH: usize = 10_000_000;

/// Largest accepted `bytes_per_batch` (1 GiB).
pub const MAX_BYTES_PER_BATCH: usize = 1024 * 1024 * 1024;

/// Smallest per-cell size assumed when sizing builders from the byte budget.
const MIN_CELL_BYTES: usize = 8;

/// Batch boundary policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PagingConfig {
    pub rows_per_batch: usize,
    pub bytes_per_batch: usize,
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self {
            rows_per_batch: DEFAULT_ROWS_PER_BATCH,
            bytes_per_batch: DEFAULT_BYTES_PER_BATCH,
        }
    }
}

impl PagingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.rows_per_batch == 0 {
            return Err(ConnectorError::config("paging.rows_per_batch must be > 0"));
        }
        if self.bytes_per_batch == 0 {
            return Err(ConnectorError::config("paging.bytes_per_batch must be > 0"));
        }
        if self.rows_per_batch > MAX_ROWS_PER_BATCH {
            return Err(ConnectorError::config(format!(
                "paging.rows_per_batch must be <= {}",
                MAX_ROWS_PER_BATCH
            )));
        }
        if self.bytes_per_batch > MAX_BYTES_PER_BATCH {
            return Err(ConnectorError::config(format!(
                "paging.bytes_per_batch must be <= {}",
                MAX_BYTES_PER_BATCH
            )));
        }
        Ok(())
    }

    /// Rows to reserve per builder: the row bound, or fewer when the byte
    /// budget cannot hold that many rows of `columns` cells.
    pub fn capacity_hint(&self, columns: usize) -> usize {
        let row_width = columns.max(1).saturating_mul(MIN_CELL_BYTES);
        self.rows_per_batch
            .min(self.bytes_per_batch / row_width)
            .max(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagingState {
    /// Transformer bound, no rows consumed.
    Idle,
    Fetching,
    /// A batch was handed out; more may follow.
    BatchReady,
    /// All result sets consumed.
    Exhausted,
    Failed,
    Closed,
}

/// Counters for one query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadStats {
    pub rows: u64,
    pub batches: u64,
    pub result_sets: u64,
    /// Cells replaced by null because the value did not fit.
    pub out_of_bounds: u64,
}

/// Maps a cursor's columns through the backend's type mapper and binds a
/// row transformer to them.
#[derive(Clone)]
pub struct SchemaBinder {
    mapper: Arc<dyn TypeMapper>,
    settings: TypeMappingSettings,
    converters: ConverterCollection,
}

impl std::fmt::Debug for SchemaBinder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaBinder")
            .field("settings", &self.settings)
            .field("converters", &self.converters)
            .finish_non_exhaustive()
    }
}

impl SchemaBinder {
    pub fn new(
        mapper: Arc<dyn TypeMapper>,
        settings: TypeMappingSettings,
        converters: ConverterCollection,
    ) -> Self {
        Self {
            mapper,
            settings,
            converters,
        }
    }

    /// Logical columns of the cursor's current result set.
    pub fn logical_columns(&self, cursor: &dyn NativeCursor) -> Result<Vec<LogicalColumn>> {
        cursor
            .columns()
            .iter()
            .map(|c| self.mapper.map_column(&c.name, &c.native_type, &self.settings))
            .collect()
    }

    pub fn bind(&self, cursor: &dyn NativeCursor) -> Result<RowTransformer> {
        let columns = self.logical_columns(cursor)?;
        cursor.make_transformer(&columns, &self.converters)
    }
}

/// Drives one query's cursor into batches.
pub struct PagingEngine {
    cursor: Option<Box<dyn NativeCursor>>,
    binder: SchemaBinder,
    config: PagingConfig,
    ctx: QueryContext,
    state: PagingState,
    transformer: RowTransformer,
    schema: Arc<BatchSchema>,
    builders: Vec<ColumnBuilder>,
    pending_rows: usize,
    pending_bytes: usize,
    /// The current result set has no more rows.
    result_set_done: bool,
    /// `next_result_set` returned false.
    cursor_done: bool,
    stats: ReadStats,
    span: tracing::Span,
}

impl std::fmt::Debug for PagingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PagingEngine")
            .field("state", &self.state)
            .field("config", &self.config)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl PagingEngine {
    /// Bind the first result set's transformer.
    ///
    /// On failure the cursor is closed before the error is returned.
    pub async fn open(
        mut cursor: Box<dyn NativeCursor>,
        binder: SchemaBinder,
        config: PagingConfig,
        ctx: QueryContext,
    ) -> Result<Self> {
        let bound = config
            .validate()
            .and_then(|_| binder.bind(cursor.as_ref()));
        let transformer = match bound {
            Ok(t) => t,
            Err(e) => {
                log_close_error(cursor.close().await, "close cursor");
                return Err(e);
            }
        };

        let span = tracing::debug_span!(
            "paging.query",
            columns = transformer.len(),
            rows_per_batch = config.rows_per_batch,
            bytes_per_batch = config.bytes_per_batch,
        );
        let schema = Arc::new(BatchSchema::new(transformer.columns().to_vec()));
        let builders = transformer.make_builders(config.capacity_hint(transformer.len()));

        Ok(Self {
            cursor: Some(cursor),
            binder,
            config,
            ctx,
            state: PagingState::Idle,
            transformer,
            schema,
            builders,
            pending_rows: 0,
            pending_bytes: 0,
            result_set_done: false,
            cursor_done: false,
            stats: ReadStats {
                result_sets: 1,
                ..ReadStats::default()
            },
            span,
        })
    }

    pub fn state(&self) -> PagingState {
        self.state
    }

    pub fn stats(&self) -> ReadStats {
        self.stats
    }

    /// Schema of the result set currently being read.
    pub fn schema(&self) -> &Arc<BatchSchema> {
        &self.schema
    }

    /// Next batch, or `None` once the cursor is exhausted.
    ///
    /// A query that produced no rows at all yields one empty batch carrying
    /// the schema. After an error, every further call returns `None`.
    pub async fn next_batch(&mut self) -> Result<Option<ColumnBatch>> {
        if matches!(
            self.state,
            PagingState::Exhausted | PagingState::Failed | PagingState::Closed
        ) {
            return Ok(None);
        }
        self.state = PagingState::Fetching;

        let span = self.span.clone();
        match self.fill().instrument(span).await {
            Ok(Some(batch)) => {
                self.state = PagingState::BatchReady;
                Ok(Some(batch))
            }
            Ok(None) => {
                self.state = PagingState::Exhausted;
                tracing::debug!(
                    parent: &self.span,
                    rows = self.stats.rows,
                    batches = self.stats.batches,
                    result_sets = self.stats.result_sets,
                    out_of_bounds = self.stats.out_of_bounds,
                    "cursor exhausted"
                );
                self.release().await;
                Ok(None)
            }
            Err(e) => {
                self.state = PagingState::Failed;
                if e.is_cancelled() {
                    tracing::debug!(parent: &self.span, "query cancelled");
                } else {
                    tracing::warn!(parent: &self.span, error = %e, "query failed");
                }
                self.transformer.reset();
                self.release().await;
                Err(e)
            }
        }
    }

    /// Release the cursor and move to `Closed`. A second call is a no-op.
    pub async fn close(&mut self) -> Result<()> {
        if self.state == PagingState::Closed {
            return Ok(());
        }
        self.state = PagingState::Closed;
        match self.cursor.take() {
            Some(mut cursor) => cursor.close().await,
            None => Ok(()),
        }
    }

    /// Stream of batches; the cursor is closed when the stream ends.
    pub fn into_stream(self) -> impl Stream<Item = Result<ColumnBatch>> + Send {
        stream::unfold(self, |mut engine| async move {
            match engine.next_batch().await {
                Ok(Some(batch)) => Some((Ok(batch), engine)),
                Ok(None) => {
                    log_close_error(engine.close().await, "close cursor");
                    None
                }
                Err(e) => Some((Err(e), engine)),
            }
        })
    }

    async fn fill(&mut self) -> Result<Option<ColumnBatch>> {
        loop {
            if self.cursor_done {
                return Ok(None);
            }

            if self.result_set_done {
                if self.pending_rows > 0 {
                    return self.flush().map(Some);
                }
                let Some(cursor) = self.cursor.as_mut() else {
                    return Err(ConnectorError::cursor_protocol("cursor already released"));
                };
                if self.ctx.run(cursor.next_result_set()).await? {
                    self.rebind()?;
                    continue;
                }
                self.cursor_done = true;
                if self.stats.batches == 0 {
                    return self.flush().map(Some);
                }
                return Ok(None);
            }

            if self.pending_rows >= self.config.rows_per_batch
                || self.pending_bytes >= self.config.bytes_per_batch
            {
                return self.flush().map(Some);
            }

            let Some(cursor) = self.cursor.as_mut() else {
                return Err(ConnectorError::cursor_protocol("cursor already released"));
            };
            if !self.ctx.run(cursor.next()).await? {
                self.result_set_done = true;
                continue;
            }
            self.ctx
                .run(cursor.scan(self.transformer.acceptors_mut()))
                .await?;

            let summary = self.transformer.append_row(&mut self.builders)?;
            self.pending_rows += 1;
            self.pending_bytes += summary.bytes;
            self.stats.rows += 1;
            self.stats.out_of_bounds += summary.out_of_bounds as u64;
        }
    }

    fn flush(&mut self) -> Result<ColumnBatch> {
        let columns = self.builders.iter_mut().map(|b| b.finish()).collect();
        let batch = ColumnBatch::new(Arc::clone(&self.schema), columns)?;
        tracing::trace!(rows = batch.num_rows, bytes = self.pending_bytes, "batch flushed");
        self.pending_rows = 0;
        self.pending_bytes = 0;
        self.stats.batches += 1;
        Ok(batch)
    }

    /// Swap in a transformer for the cursor's new result set.
    fn rebind(&mut self) -> Result<()> {
        let cursor = self
            .cursor
            .as_deref()
            .ok_or_else(|| ConnectorError::cursor_protocol("cursor already released"))?;
        let transformer = self.binder.bind(cursor)?;
        tracing::debug!(columns = transformer.len(), "result set rebound");
        self.schema = Arc::new(BatchSchema::new(transformer.columns().to_vec()));
        self.builders = transformer.make_builders(self.config.capacity_hint(transformer.len()));
        self.transformer = transformer;
        self.result_set_done = false;
        self.stats.result_sets += 1;
        Ok(())
    }

    async fn release(&mut self) {
        if let Some(mut cursor) = self.cursor.take() {
            log_close_error(cursor.close().await, "close cursor");
        }
    }
}

impl Drop for PagingEngine {
    fn drop(&mut self) {
        let Some(mut cursor) = self.cursor.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    log_close_error(cursor.close().await, "close cursor on drop");
                });
            }
            Err(_) => tracing::warn!("paging engine dropped outside a runtime; cursor not closed"),
        }
    }
}
