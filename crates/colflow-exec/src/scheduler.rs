//! Segment scheduler: runs one task per segment on a scoped worker pool.
//!
//! Segment indices are handed out through a channel; each worker takes the
//! next index, builds and drains its chain, and reports back. Results are
//! gathered in segment order regardless of completion order. Once a segment
//! fails, workers stop picking up new segments and the failure with the
//! lowest segment index is returned.

use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam::channel;
use tracing::{debug, trace};

use colflow_core::id::SegmentId;
use colflow_operators::Segment;

use crate::runtime::ExecError;

#[derive(Debug, Clone, Copy)]
pub struct Scheduler {
    max_parallel: usize,
}

impl Scheduler {
    pub fn new(max_parallel: usize) -> Self {
        Self {
            max_parallel: max_parallel.max(1),
        }
    }

    pub fn max_parallel(&self) -> usize {
        self.max_parallel
    }

    /// Run `task` for segments `0..num_segments`, returning outputs in
    /// segment order.
    pub fn run_segments<T, F>(&self, num_segments: usize, task: F) -> Result<Vec<T>, ExecError>
    where
        T: Send,
        F: Fn(Segment) -> Result<T, ExecError> + Sync,
    {
        if num_segments == 0 {
            return Err(ExecError::Invalid("segment count must be > 0".into()));
        }

        let (work_tx, work_rx) = channel::unbounded::<usize>();
        for s in 0..num_segments {
            work_tx
                .send(s)
                .map_err(|e| ExecError::Invalid(format!("segment queue: {e}")))?;
        }
        drop(work_tx);

        let (done_tx, done_rx) = channel::unbounded::<(usize, Result<T, ExecError>)>();
        let failed = AtomicBool::new(false);
        let workers = self.max_parallel.min(num_segments);
        debug!(segments = num_segments, workers, "scheduling segments");

        crossbeam::scope(|scope| {
            for worker in 0..workers {
                let work_rx = work_rx.clone();
                let done_tx = done_tx.clone();
                let task = &task;
                let failed = &failed;
                scope.spawn(move |_| {
                    for s in work_rx.iter() {
                        if failed.load(Ordering::Acquire) {
                            break;
                        }
                        let segment = Segment {
                            id: SegmentId::new(s as u64),
                            count: num_segments,
                        };
                        trace!(worker, segment = s, "segment started");
                        let out = task(segment);
                        if out.is_err() {
                            failed.store(true, Ordering::Release);
                        }
                        trace!(worker, segment = s, ok = out.is_ok(), "segment finished");
                        if done_tx.send((s, out)).is_err() {
                            break;
                        }
                    }
                });
            }
        })
        .map_err(|_| ExecError::WorkerPanic)?;
        drop(done_tx);

        let mut slots: Vec<Option<T>> = (0..num_segments).map(|_| None).collect();
        let mut first_err: Option<(usize, ExecError)> = None;
        for (s, out) in done_rx.try_iter() {
            match out {
                Ok(v) => slots[s] = Some(v),
                Err(e) => {
                    if first_err.as_ref().map_or(true, |(prev, _)| s < *prev) {
                        first_err = Some((s, e));
                    }
                }
            }
        }
        if let Some((s, e)) = first_err {
            debug!(segment = s, error = %e, "segment failed");
            return Err(e);
        }
        slots
            .into_iter()
            .enumerate()
            .map(|(s, v)| {
                v.ok_or_else(|| ExecError::Invalid(format!("segment {s} produced no result")))
            })
            .collect()
    }
}
