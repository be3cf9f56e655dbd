//! Lightweight value/column/batch types shared by every layer.
//!
//! Execution crates move `ColumnBatch`es between operators. Values are boxed
//! per cell (`Scalar`); this keeps core free of Arrow while the engine is
//! still settling its physical layout.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::schema::DataType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Scalar {
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    Str(String),
    Bin(Vec<u8>),
}

impl Scalar {
    /// Data type of a non-null value. `Null` has no type of its own.
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Scalar::Null => None,
            Scalar::Bool(_) => Some(DataType::Boolean),
            Scalar::I64(_) => Some(DataType::Int64),
            Scalar::F64(_) => Some(DataType::Float64),
            Scalar::Str(_) => Some(DataType::Utf8),
            Scalar::Bin(_) => Some(DataType::Binary),
        }
    }

    /// True when the value may be stored in a column of type `dt`.
    pub fn conforms_to(&self, dt: DataType) -> bool {
        self.data_type().map_or(true, |own| own == dt)
    }

    /// The zero/non-zero test used by conditions and masks.
    pub fn is_truthy(&self) -> bool {
        match self {
            Scalar::Null => false,
            Scalar::Bool(b) => *b,
            Scalar::I64(v) => *v != 0,
            Scalar::F64(v) => *v != 0.0,
            Scalar::Str(s) => !s.is_empty(),
            Scalar::Bin(b) => !b.is_empty(),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::I64(v) => Some(*v as f64),
            Scalar::F64(v) => Some(*v),
            Scalar::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }
}

/// One typed column of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub data_type: DataType,
    pub values: Vec<Scalar>,
}

impl Column {
    pub fn new(data_type: DataType, values: Vec<Scalar>) -> Self {
        Self { data_type, values }
    }

    pub fn with_capacity(data_type: DataType, cap: usize) -> Self {
        Self {
            data_type,
            values: Vec::with_capacity(cap),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Index of the first value that does not conform to the column type.
    pub fn first_nonconforming(&self) -> Option<usize> {
        self.values
            .iter()
            .position(|v| !v.conforms_to(self.data_type))
    }
}

/// Fixed-row-count, multi-column buffer flowing between operators.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnBatch {
    pub columns: Vec<Column>,
}

impl ColumnBatch {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    pub fn num_rows(&self) -> usize {
        self.columns.first().map(|c| c.len()).unwrap_or(0)
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn types(&self) -> Vec<DataType> {
        self.columns.iter().map(|c| c.data_type).collect()
    }

    /// Drop all values while keeping column types and capacity.
    pub fn clear(&mut self) {
        for col in &mut self.columns {
            col.values.clear();
        }
    }

    /// Check that every column has the same length and every value conforms
    /// to its column type.
    pub fn validate(&self) -> Result<()> {
        let rows = self.num_rows();
        for (idx, col) in self.columns.iter().enumerate() {
            if col.len() != rows {
                return Err(Error::Schema(format!(
                    "column {idx} has {} rows, expected {rows}",
                    col.len()
                )));
            }
            if let Some(row) = col.first_nonconforming() {
                return Err(Error::Schema(format!(
                    "column {idx} row {row}: value {:?} is not {}",
                    col.values[row], col.data_type
                )));
            }
        }
        Ok(())
    }

    /// Append all rows of `other` below the rows of `self`.
    pub fn append_rows(&mut self, other: &ColumnBatch) -> Result<()> {
        if self.columns.len() != other.columns.len() {
            return Err(Error::Schema(format!(
                "cannot append batch with {} columns to batch with {}",
                other.columns.len(),
                self.columns.len()
            )));
        }
        for (dst, src) in self.columns.iter_mut().zip(&other.columns) {
            dst.values.extend(src.values.iter().cloned());
        }
        Ok(())
    }

    /// Read one row across all columns.
    pub fn row(&self, idx: usize) -> Vec<Scalar> {
        self.columns.iter().map(|c| c.values[idx].clone()).collect()
    }
}

/// Total order over scalars used by comparison operators.
///
/// Nulls sort first; values of different types order by variant.
pub fn scalar_cmp(a: &Scalar, b: &Scalar) -> Ordering {
    use Scalar::*;

    match (a, b) {
        (Null, Null) => Ordering::Equal,
        (Null, _) => Ordering::Less,
        (_, Null) => Ordering::Greater,
        (Bool(x), Bool(y)) => x.cmp(y),
        (I64(x), I64(y)) => x.cmp(y),
        (I64(_), F64(_)) | (F64(_), I64(_)) | (F64(_), F64(_)) => {
            let (x, y) = (a.as_f64().unwrap_or(f64::NAN), b.as_f64().unwrap_or(f64::NAN));
            if x.is_nan() && y.is_nan() {
                Ordering::Equal
            } else if x.is_nan() {
                Ordering::Greater
            } else if y.is_nan() {
                Ordering::Less
            } else {
                x.partial_cmp(&y).unwrap_or(Ordering::Equal)
            }
        }
        (Str(x), Str(y)) => x.cmp(y),
        (Bin(x), Bin(y)) => x.cmp(y),
        // Mixed types: order by variant order
        _ => scalar_type_order(a).cmp(&scalar_type_order(b)),
    }
}

/// Assign a numeric order to scalar types for mixed-type comparisons.
fn scalar_type_order(s: &Scalar) -> u8 {
    use Scalar::*;
    match s {
        Null => 0,
        Bool(_) => 1,
        I64(_) => 2,
        F64(_) => 3,
        Str(_) => 4,
        Bin(_) => 5,
    }
}
