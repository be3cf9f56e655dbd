//! Per-chain batch pool built on top of the hard MemoryBudget.
//!
//! Operators obtain output buffers through the execution context, which
//! forwards to `BatchPool::acquire`. Buffers consumed downstream come back via
//! `recycle` and are reused for later batches of the same shape. Idle
//! buffers kept in the pool are charged to the budget.

use colflow_core::budget::BudgetGuard;
use colflow_core::schema::DataType;
use colflow_core::types::{Column, ColumnBatch};

use crate::error::Result;
use crate::guard::{BudgetGuardImpl, MemoryBudgetImpl};
use crate::tracking::PoolStats;

/// Accounted size of a batch: reserved capacity times the per-type width hint.
pub fn batch_bytes(batch: &ColumnBatch) -> usize {
    batch
        .columns
        .iter()
        .map(|c| c.values.capacity().max(c.values.len()) * c.data_type.width_hint())
        .sum()
}

/// Reusable buffers for one execution chain. Never shared between chains.
pub struct BatchPool {
    budget: MemoryBudgetImpl,
    free: Vec<ColumnBatch>,
    /// Accounts for every buffer sitting in `free`.
    idle: BudgetGuardImpl,
    max_idle: usize,
    stats: PoolStats,
}

impl BatchPool {
    pub fn new(budget: MemoryBudgetImpl, max_idle: usize) -> Self {
        let idle = budget.empty_guard("batch_pool");
        Self {
            budget,
            free: Vec::new(),
            idle,
            max_idle,
            stats: PoolStats::default(),
        }
    }

    /// An empty batch of the given column types with room for `rows` rows.
    pub fn acquire(&mut self, types: &[DataType], rows: usize) -> ColumnBatch {
        let pos = self
            .free
            .iter()
            .position(|b| b.columns.iter().map(|c| c.data_type).eq(types.iter().copied()));
        if let Some(pos) = pos {
            let mut batch = self.free.swap_remove(pos);
            let held = self.idle.bytes();
            self.idle.try_resize(held.saturating_sub(batch_bytes(&batch)));
            for col in &mut batch.columns {
                col.values.reserve(rows);
            }
            self.stats.reused += 1;
            return batch;
        }
        self.stats.allocated += 1;
        ColumnBatch::new(
            types
                .iter()
                .map(|t| Column::with_capacity(*t, rows))
                .collect(),
        )
    }

    /// Return a consumed buffer. It is kept only when the pool has room and
    /// the budget can carry it.
    pub fn recycle(&mut self, mut batch: ColumnBatch) {
        batch.clear();
        self.stats.recycled += 1;
        let bytes = batch_bytes(&batch);
        if self.free.len() < self.max_idle && self.idle.try_resize(self.idle.bytes() + bytes) {
            self.free.push(batch);
        } else {
            self.stats.discarded += 1;
        }
    }

    /// Charge an in-flight batch against the budget until the guard drops.
    pub fn charge(&self, batch: &ColumnBatch, tag: &'static str) -> Result<BudgetGuardImpl> {
        self.budget.acquire(batch_bytes(batch), tag)
    }

    pub fn stats(&self) -> PoolStats {
        self.stats
    }

    pub fn budget(&self) -> &MemoryBudgetImpl {
        &self.budget
    }
}
