//! Boundary with the storage/reader layer.
//!
//! The engine never decodes files itself. A reader hands it a `BatchSource`
//! that can report its shape and serve row ranges of selected columns; the
//! `Source` operator slices that range per segment and batch.

use std::fmt;
use std::ops::Range;

use crate::error::{Error, Result};
use crate::schema::DataType;
use crate::types::{Column, ColumnBatch};

/// Columnar data that can be read by row range.
pub trait BatchSource: Send + Sync + fmt::Debug {
    /// Total number of rows.
    fn num_rows(&self) -> u64;

    /// Types of every column, in storage order.
    fn column_types(&self) -> Vec<DataType>;

    /// Read `rows` of the listed `columns` (by storage index, repeats allowed).
    fn read(&self, columns: &[usize], rows: Range<u64>) -> Result<Vec<Column>>;
}

/// Fully materialized in-memory columns.
///
/// Used for test data and for intermediate results produced by partial
/// materialization.
#[derive(Debug, Clone)]
pub struct MemorySource {
    columns: Vec<Column>,
    rows: u64,
}

impl MemorySource {
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        let rows = columns.first().map(|c| c.len()).unwrap_or(0);
        let batch = ColumnBatch::new(columns);
        batch.validate()?;
        Ok(Self {
            columns: batch.columns,
            rows: rows as u64,
        })
    }

    /// Concatenate batches (row-wise) into one source of the given types.
    pub fn from_batches<'a>(
        types: &[DataType],
        batches: impl IntoIterator<Item = &'a ColumnBatch>,
    ) -> Result<Self> {
        let mut acc = ColumnBatch::new(types.iter().map(|t| Column::new(*t, vec![])).collect());
        for batch in batches {
            if batch.types() != types {
                return Err(Error::Schema(format!(
                    "batch types {:?} do not match source types {:?}",
                    batch.types(),
                    types
                )));
            }
            acc.append_rows(batch)?;
        }
        Self::new(acc.columns)
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }
}

impl BatchSource for MemorySource {
    fn num_rows(&self) -> u64 {
        self.rows
    }

    fn column_types(&self) -> Vec<DataType> {
        self.columns.iter().map(|c| c.data_type).collect()
    }

    fn read(&self, columns: &[usize], rows: Range<u64>) -> Result<Vec<Column>> {
        if rows.end > self.rows || rows.start > rows.end {
            return Err(Error::Source(format!(
                "row range {rows:?} outside 0..{}",
                self.rows
            )));
        }
        let (lo, hi) = (rows.start as usize, rows.end as usize);
        columns
            .iter()
            .map(|&idx| {
                let col = self.columns.get(idx).ok_or_else(|| {
                    Error::Source(format!(
                        "column {idx} out of range ({} columns)",
                        self.columns.len()
                    ))
                })?;
                Ok(Column::new(col.data_type, col.values[lo..hi].to_vec()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Scalar;

    #[test]
    fn reads_ranges_with_repeated_columns() {
        let src = MemorySource::new(vec![
            Column::new(DataType::Int64, (0..5).map(Scalar::I64).collect()),
            Column::new(DataType::Utf8, (0..5).map(|i| Scalar::Str(i.to_string())).collect()),
        ])
        .unwrap();

        let cols = src.read(&[1, 0, 1], 1..3).unwrap();
        assert_eq!(cols.len(), 3);
        assert_eq!(cols[1].values, vec![Scalar::I64(1), Scalar::I64(2)]);
        assert_eq!(cols[2].values, vec![Scalar::Str("1".into()), Scalar::Str("2".into())]);

        assert!(src.read(&[0], 4..6).is_err());
        assert!(src.read(&[2], 0..1).is_err());
    }

    #[test]
    fn rejects_ragged_columns() {
        let res = MemorySource::new(vec![
            Column::new(DataType::Int64, vec![Scalar::I64(1)]),
            Column::new(DataType::Int64, vec![]),
        ]);
        assert!(res.is_err());
    }
}
