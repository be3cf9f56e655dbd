//! Metrics hooks.
//!
//! Events go out as `tracing` records under a `colflow` span; wire a
//! subscriber in the embedding application to collect them.

use colflow_mem::PoolStats;
use colflow_operators::Segment;

pub fn emit_span(event: &str, key_values: &[(&str, String)]) {
    let span = tracing::trace_span!("colflow", event);
    let _entered = span.enter();
    for (k, v) in key_values {
        tracing::trace!(%event, %k, %v, "metric");
    }
}

/// Summary of one finished chain.
pub fn chain_finished(segment: Segment, rows: usize, pool: PoolStats, budget_peak: usize) {
    emit_span(
        "chain_finished",
        &[
            ("segment", segment.id.get().to_string()),
            ("rows", rows.to_string()),
            ("buffers_allocated", pool.allocated.to_string()),
            ("buffers_reused", pool.reused.to_string()),
            ("budget_peak_bytes", budget_peak.to_string()),
        ],
    );
}
