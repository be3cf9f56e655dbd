//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use colflow_core::config::EngineConfig;
use colflow_core::schema::DataType;
use colflow_core::source::{BatchSource, MemorySource};
use colflow_core::types::{Column, ColumnBatch, Scalar};
use colflow_exec::Engine;

/// Rows in every generated column.
pub const LEN: u64 = 37;

pub fn int_column(values: impl IntoIterator<Item = i64>) -> Column {
    Column::new(DataType::Int64, values.into_iter().map(Scalar::I64).collect())
}

/// Three Int64 columns of `LEN` rows: `i`, `(3i) % 7`, `100 - i`.
pub fn data() -> Arc<dyn BatchSource> {
    let n = LEN as i64;
    Arc::new(
        MemorySource::new(vec![
            int_column(0..n),
            int_column((0..n).map(|i| (3 * i) % 7)),
            int_column((0..n).map(|i| 100 - i)),
        ])
        .expect("columns have equal length"),
    )
}

pub fn memory_source(columns: Vec<Column>) -> Arc<dyn BatchSource> {
    Arc::new(MemorySource::new(columns).expect("valid columns"))
}

pub fn engine(batch_size: usize, segments: usize, threads: usize) -> Engine {
    Engine::new(EngineConfig {
        batch_size,
        num_segments: segments,
        max_parallel_tasks: threads,
        ..EngineConfig::default()
    })
}

pub fn ints(batch: &ColumnBatch, col: usize) -> Vec<i64> {
    batch.columns[col]
        .values
        .iter()
        .map(|v| match v {
            Scalar::I64(x) => *x,
            other => panic!("not an integer: {other:?}"),
        })
        .collect()
}
