//! Operator behavior observed end to end through `Engine` and `Chain`.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use colflow_core::budget::MemoryBudget;
use colflow_core::config::EngineConfig;
use colflow_core::dag::{BinaryOp, Literal};
use colflow_core::make;
use colflow_core::schema::DataType;
use colflow_core::types::Scalar;
use colflow_exec::{ChainPlan, Engine, ExecError};
use colflow_mem::MemoryBudgetImpl;
use colflow_operators::{OpError, Segment};
use colflow_planner::MaterializeOptions;

use common::{engine, int_column, ints, memory_source};

#[test]
fn test_project_selects_and_reorders() {
    let three = make::union(
        &make::union(&make::range(1, 4), &make::range(4, 7)),
        &make::range(7, 10),
    );
    let root = make::project(&three, &[2, 0]);

    for opts in [MaterializeOptions::default(), MaterializeOptions::unoptimized()] {
        let out = engine(2, 2, 2).materialize(&root, &opts).unwrap();
        assert_eq!(ints(&out.batch, 0), vec![7, 8, 9]);
        assert_eq!(ints(&out.batch, 1), vec![1, 2, 3]);
    }
}

#[test]
fn test_ternary_fast_path_never_computes_false_branch() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let is_false = make::transform(&make::range(0, 20), DataType::Int64, move |row| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(row[0].clone())
    });
    let root = make::ternary(
        &make::constant(Literal::Int(1), 20),
        &make::range(100, 120),
        &is_false,
    );

    // unoptimized, so the constant condition is not folded away
    let out = engine(8, 3, 3)
        .materialize(&root, &MaterializeOptions::unoptimized())
        .unwrap();
    assert_eq!(ints(&out.batch, 0), (100..120).collect::<Vec<_>>());
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let plan = ChainPlan::new(&root);
    let mut chain = plan.instantiate(Segment::single(), 8, MemoryBudgetImpl::new(1 << 20));
    chain.run_to_batch().unwrap();
    let stats = chain.stats_for(&is_false).unwrap();
    assert_eq!(stats.batches, 0);
    assert_eq!(stats.skipped, 3);
    // the skip reaches the range feeding the transform
    let below = chain.stats_for(is_false.input(0)).unwrap();
    assert_eq!((below.batches, below.skipped), (0, 3));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_ternary_all_false_skips_true_branch() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let is_true = make::transform(&make::range(0, 10), DataType::Int64, move |row| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(row[0].clone())
    });
    let root = make::ternary(&make::constant(Literal::Int(0), 10), &is_true, &make::range(50, 60));
    let out = engine(4, 1, 1)
        .materialize(&root, &MaterializeOptions::unoptimized())
        .unwrap();
    assert_eq!(ints(&out.batch, 0), (50..60).collect::<Vec<_>>());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_ternary_mixed_selects_per_row() {
    let data = memory_source(vec![
        int_column([1, 0, 1]),
        int_column([10, 20, 30]),
        int_column([100, 200, 300]),
    ]);
    let col = |c| make::source_slice(data.clone(), &[c], 0, 3);
    let root = make::ternary(&col(0), &col(1), &col(2));

    let all = [
        MaterializeOptions::default(),
        MaterializeOptions::unoptimized(),
        MaterializeOptions::naive(),
    ];
    for opts in all {
        let out = engine(16, 1, 1).materialize(&root, &opts).unwrap();
        assert_eq!(ints(&out.batch, 0), vec![10, 200, 30]);
    }
}

#[test]
fn test_shared_branch_is_computed_once_for_all_consumers() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let shared = make::transform(&make::range(0, 12), DataType::Int64, move |row| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(row[0].clone())
    });
    // the ternary skips `shared`, but the union still needs it
    let ternary = make::ternary(&make::constant(Literal::Int(1), 12), &make::range(0, 12), &shared);
    let root = make::union(&ternary, &shared);

    let out = engine(5, 1, 1)
        .materialize(&root, &MaterializeOptions::unoptimized())
        .unwrap();
    assert_eq!(ints(&out.batch, 1), (0..12).collect::<Vec<_>>());
    assert_eq!(calls.load(Ordering::SeqCst), 12);
}

#[test]
fn test_linear_operators_preserve_row_order() {
    let r = make::range(0, 50);
    let doubled = make::transform(&r, DataType::Int64, |row| match &row[0] {
        Scalar::I64(v) => Ok(Scalar::I64(v * 2)),
        other => Err(format!("unexpected {other:?}")),
    });
    let sum = make::binary_transform(&doubled, &make::range(1000, 1050), BinaryOp::Add);
    let root = make::union(&sum, &make::project(&make::union(&r, &doubled), &[1]));

    let out = engine(7, 4, 2)
        .materialize(&root, &MaterializeOptions::default())
        .unwrap();
    let expected: Vec<i64> = (0..50).map(|i| 1000 + 3 * i).collect();
    assert_eq!(ints(&out.batch, 0), expected);
    assert_eq!(ints(&out.batch, 1), (0..50).map(|i| 2 * i).collect::<Vec<_>>());
}

#[test]
fn test_generalized_transform_fills_rows() {
    let root = make::generalized_transform(
        &make::range(1, 6),
        &[DataType::Int64, DataType::Utf8],
        |row, out| {
            let Scalar::I64(v) = row[0] else {
                return Err("expected an integer".into());
            };
            out[0] = Scalar::I64(v * v);
            out[1] = Scalar::Str(format!("#{v}"));
            Ok(())
        },
    );
    let out = engine(2, 2, 2)
        .materialize(&root, &MaterializeOptions::default())
        .unwrap();
    assert_eq!(ints(&out.batch, 0), vec![1, 4, 9, 16, 25]);
    assert_eq!(out.batch.columns[1].values[4], Scalar::Str("#5".into()));
}

#[test]
fn test_filter_keeps_rows_with_nonzero_mask() {
    let r = make::range(0, 30);
    let mask = make::binary_transform(&r, &make::constant(Literal::Int(3), 30), BinaryOp::Lt);
    let odd = make::transform(&r, DataType::Int64, |row| match &row[0] {
        Scalar::I64(v) => Ok(Scalar::I64(v % 2)),
        other => Err(format!("unexpected {other:?}")),
    });
    let root = make::union(
        &make::logical_filter(&r, &mask),
        &make::logical_filter(&make::range(100, 130), &mask),
    );
    let out = engine(4, 3, 2)
        .materialize(&root, &MaterializeOptions::default())
        .unwrap();
    assert_eq!(ints(&out.batch, 0), vec![0, 1, 2]);
    assert_eq!(ints(&out.batch, 1), vec![100, 101, 102]);

    let odd_rows = engine(4, 3, 2)
        .materialize(&make::logical_filter(&r, &odd), &MaterializeOptions::default())
        .unwrap();
    assert_eq!(ints(&odd_rows.batch, 0), (0..30).filter(|v| v % 2 == 1).collect::<Vec<_>>());
}

#[test]
fn test_callback_error_fails_the_run() {
    let root = make::transform(&make::range(0, 40), DataType::Int64, |row| match &row[0] {
        Scalar::I64(13) => Err("bad row 13".into()),
        v => Ok(v.clone()),
    });
    let err = engine(8, 4, 4)
        .materialize(&root, &MaterializeOptions::default())
        .unwrap_err();
    match err {
        ExecError::Operator(OpError::Callback { op, msg }) => {
            assert_eq!(op, "transform");
            assert_eq!(msg, "bad row 13");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_type_check_failures() {
    let wrong_type = make::transform(&make::range(0, 4), DataType::Utf8, |row| Ok(row[0].clone()));
    let err = engine(4, 1, 1)
        .materialize(&wrong_type, &MaterializeOptions::default())
        .unwrap_err();
    assert!(matches!(err, ExecError::Operator(OpError::Type { .. })), "{err}");

    let wrong_row = make::generalized_transform(
        &make::range(0, 4),
        &[DataType::Int64, DataType::Utf8],
        |row, out| {
            out[0] = row[0].clone();
            out[1] = row[0].clone();
            Ok(())
        },
    );
    let err = engine(4, 1, 1)
        .materialize(&wrong_row, &MaterializeOptions::default())
        .unwrap_err();
    assert!(matches!(err, ExecError::Operator(OpError::Type { .. })), "{err}");
}

#[test]
fn test_budget_exhaustion_is_an_error() {
    let engine = Engine::new(EngineConfig {
        mem_cap_bytes: 64,
        batch_size: 128,
        num_segments: 2,
        max_parallel_tasks: 2,
        ..EngineConfig::default()
    });
    let err = engine
        .materialize(&make::range(0, 1000), &MaterializeOptions::default())
        .unwrap_err();
    assert!(matches!(err, ExecError::Operator(OpError::Mem(_))), "{err}");
    assert_eq!(engine.budget().used_bytes(), 0);
}

#[test]
fn test_integer_overflow_is_reported() {
    let big = make::constant(Literal::Int(i64::MAX), 3);
    let root = make::binary_transform(&big, &make::constant(Literal::Int(1), 3), BinaryOp::Add);
    let err = engine(4, 1, 1)
        .materialize(&root, &MaterializeOptions::unoptimized())
        .unwrap_err();
    assert!(matches!(err, ExecError::Operator(OpError::Exec(_))), "{err}");
}
