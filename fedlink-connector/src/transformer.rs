//! Row transformer: per-result-set acceptors bound to appenders.

use fedlink_tabular::{ColumnBuilder, LogicalColumn};

use crate::appender::{AppendOutcome, Appender, ConverterCollection};
use crate::error::{ConnectorError, Result};
use crate::native::{Acceptor, NativeKind};

/// Outcome of appending one row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowSummary {
    pub nulls: usize,
    pub out_of_bounds: usize,
    /// Estimated bytes the row added to the builders.
    pub bytes: usize,
}

/// Acceptors and appenders for one result set's schema.
///
/// `acceptors.len() == appenders.len() == columns.len()` holds for every
/// constructed transformer; `build` is the only constructor.
pub struct RowTransformer {
    columns: Vec<LogicalColumn>,
    acceptors: Vec<Acceptor>,
    appenders: Vec<Appender>,
}

impl std::fmt::Debug for RowTransformer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowTransformer")
            .field("columns", &self.columns)
            .field("acceptors", &self.acceptors)
            .finish_non_exhaustive()
    }
}

impl RowTransformer {
    /// Resolve every `(native kind, logical column)` pairing before any row is read.
    pub fn build(
        kinds: &[NativeKind],
        columns: &[LogicalColumn],
        converters: &ConverterCollection,
    ) -> Result<Self> {
        if kinds.len() != columns.len() {
            return Err(ConnectorError::unsupported_type(format!(
                "{} native columns but {} logical columns",
                kinds.len(),
                columns.len()
            )));
        }

        let mut acceptors = Vec::with_capacity(kinds.len());
        let mut appenders = Vec::with_capacity(kinds.len());
        for (kind, column) in kinds.iter().zip(columns) {
            appenders.push(converters.appender(&column.name, *kind, &column.logical_type)?);
            acceptors.push(Acceptor::new(*kind));
        }

        Ok(Self {
            columns: columns.to_vec(),
            acceptors,
            appenders,
        })
    }

    pub fn columns(&self) -> &[LogicalColumn] {
        &self.columns
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Scan destinations, in column order.
    #[inline]
    pub fn acceptors_mut(&mut self) -> &mut [Acceptor] {
        &mut self.acceptors
    }

    /// Builders matching this transformer's columns.
    pub fn make_builders(&self, capacity: usize) -> Vec<ColumnBuilder> {
        self.columns
            .iter()
            .map(|c| ColumnBuilder::new(c.logical_type.clone(), capacity))
            .collect()
    }

    /// Run every appender in column order against the scanned row.
    ///
    /// On error the remaining acceptors are cleared so nothing leaks into a
    /// later row.
    pub fn append_row(&mut self, builders: &mut [ColumnBuilder]) -> Result<RowSummary> {
        if builders.len() != self.appenders.len() {
            return Err(ConnectorError::malformed_row(format!(
                "{} builders for {} columns",
                builders.len(),
                self.appenders.len()
            )));
        }

        let mut summary = RowSummary {
            bytes: self
                .acceptors
                .iter()
                .filter_map(Acceptor::peek)
                .map(|v| v.estimated_size())
                .sum(),
            ..RowSummary::default()
        };
        let cells = self
            .appenders
            .iter()
            .zip(self.acceptors.iter_mut())
            .zip(builders.iter_mut());
        for ((append, acceptor), builder) in cells {
            match append(acceptor, builder) {
                Ok(AppendOutcome::Value) => {}
                Ok(AppendOutcome::Null) => summary.nulls += 1,
                Ok(AppendOutcome::OutOfBounds) => summary.out_of_bounds += 1,
                Err(e) => {
                    self.reset();
                    return Err(e);
                }
            }
        }
        Ok(summary)
    }

    /// Empty every acceptor slot.
    pub fn reset(&mut self) {
        for acceptor in &mut self.acceptors {
            acceptor.take();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversion::OutOfBoundsPolicy;
    use crate::native::{scan_into, NativeValue};
    use fedlink_tabular::{Column, LogicalType, PrimitiveType};

    fn col(name: &str, p: PrimitiveType) -> LogicalColumn {
        LogicalColumn::new(name, LogicalType::optional(LogicalType::primitive(p)))
    }

    #[test]
    fn test_arity_invariant() {
        let cc = ConverterCollection::default();
        let t = RowTransformer::build(
            &[NativeKind::String, NativeKind::Int64],
            &[col("a", PrimitiveType::Utf8), col("b", PrimitiveType::Int64)],
            &cc,
        )
        .unwrap();
        assert_eq!(t.len(), 2);
        assert_eq!(t.acceptors.len(), t.appenders.len());

        let err = RowTransformer::build(&[NativeKind::String], &[], &cc).unwrap_err();
        assert!(matches!(err, ConnectorError::UnsupportedType(_)));
    }

    #[test]
    fn test_fails_before_any_row() {
        let err = RowTransformer::build(
            &[NativeKind::String, NativeKind::Bool],
            &[col("a", PrimitiveType::Utf8), col("b", PrimitiveType::Double)],
            &ConverterCollection::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("column 'b'"));
    }

    #[test]
    fn test_bounds_failure_is_column_local() {
        let mut t = RowTransformer::build(
            &[NativeKind::Int64, NativeKind::Int64],
            &[col("narrow", PrimitiveType::Int8), col("wide", PrimitiveType::Int64)],
            &ConverterCollection::new(OutOfBoundsPolicy::Lenient),
        )
        .unwrap();
        let mut builders = t.make_builders(4);

        scan_into(
            t.acceptors_mut(),
            vec![Some(NativeValue::Int64(300)), Some(NativeValue::Int64(300))],
        )
        .unwrap();
        let summary = t.append_row(&mut builders).unwrap();
        assert_eq!(summary.out_of_bounds, 1);

        assert_eq!(builders[0].finish(), Column::Int8(vec![None]));
        assert_eq!(builders[1].finish(), Column::Int64(vec![Some(300)]));
    }

    #[test]
    fn test_error_clears_acceptors() {
        let mut t = RowTransformer::build(
            &[NativeKind::Int64, NativeKind::String],
            &[col("n", PrimitiveType::Int8), col("s", PrimitiveType::Utf8)],
            &ConverterCollection::new(OutOfBoundsPolicy::Strict),
        )
        .unwrap();
        let mut builders = t.make_builders(1);
        scan_into(
            t.acceptors_mut(),
            vec![Some(NativeValue::Int64(1_000)), Some("x".into())],
        )
        .unwrap();
        assert!(t.append_row(&mut builders).is_err());
        assert!(t.acceptors_mut().iter().all(Acceptor::is_empty));
    }
}
