//! Stage driver: runs each selected stage's rules to a fixpoint.
//!
//! One pass walks the DAG bottom-up. Every node is visited once per pass
//! (shared nodes included), its inputs are replaced by their rewritten
//! versions, and then the stage's rules are tried on it in registry order
//! until none applies. Passes repeat until a pass changes nothing.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, trace, warn};

use colflow_core::dag::{node_addr, PNode};

use crate::registry::{stage_name, RuleRegistry};
use crate::rules::RuleRef;

/// Rewrites applied at one node before moving on, per pass.
const MAX_LOCAL_REWRITES: usize = 64;

#[derive(Debug, Clone, Default, Serialize)]
pub struct StageReport {
    pub stage: usize,
    pub passes: usize,
    /// Rule name -> number of times it fired.
    pub rewrites: BTreeMap<&'static str, usize>,
    /// Stopped by the pass limit before reaching a fixpoint.
    pub truncated: bool,
}

impl StageReport {
    pub fn total_rewrites(&self) -> usize {
        self.rewrites.values().sum()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct OptimizationReport {
    pub stages: Vec<StageReport>,
}

impl OptimizationReport {
    pub fn total_rewrites(&self) -> usize {
        self.stages.iter().map(StageReport::total_rewrites).sum()
    }
}

/// Holds no state across calls beyond its rule set and limits.
pub struct OptimizationEngine {
    registry: RuleRegistry,
    max_passes: usize,
}

impl Default for OptimizationEngine {
    fn default() -> Self {
        Self::new(RuleRegistry::default(), 64)
    }
}

impl OptimizationEngine {
    pub fn new(registry: RuleRegistry, max_passes: usize) -> Self {
        Self {
            registry,
            max_passes: max_passes.max(1),
        }
    }

    pub fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    /// Run `stages` in the given order.
    pub fn optimize(&self, root: &PNode, stages: &[usize]) -> (PNode, OptimizationReport) {
        let mut report = OptimizationReport::default();
        let mut current = root.clone();
        for &stage in stages {
            let (next, stage_report) = self.run_stage(&current, stage);
            current = next;
            report.stages.push(stage_report);
        }
        (current, report)
    }

    pub fn run_stage(&self, root: &PNode, stage: usize) -> (PNode, StageReport) {
        self.run_stage_with(root, stage, self.registry.rules_for(stage))
    }

    /// Run one stage with an explicit rule order.
    pub fn run_stage_with(
        &self,
        root: &PNode,
        stage: usize,
        rules: &[RuleRef],
    ) -> (PNode, StageReport) {
        let mut report = StageReport {
            stage,
            ..StageReport::default()
        };
        let mut current = root.clone();
        if rules.is_empty() {
            return (current, report);
        }

        loop {
            if report.passes == self.max_passes {
                report.truncated = true;
                warn!(
                    stage,
                    name = stage_name(stage),
                    passes = report.passes,
                    "optimizer stage hit the pass limit before reaching a fixpoint"
                );
                break;
            }
            report.passes += 1;
            let mut pass = Pass {
                rules,
                memo: HashMap::new(),
                rewrites: &mut report.rewrites,
                changed: false,
            };
            let next = pass.visit(&current);
            let changed = pass.changed;
            current = next;
            if !changed {
                break;
            }
        }

        debug!(
            stage,
            name = stage_name(stage),
            passes = report.passes,
            rewrites = report.total_rewrites(),
            "optimizer stage done"
        );
        (current, report)
    }
}

struct Pass<'a> {
    rules: &'a [RuleRef],
    /// Original node address -> (original, rewritten). Holding the original
    /// keeps its address from being reused during the pass.
    memo: HashMap<usize, (PNode, PNode)>,
    rewrites: &'a mut BTreeMap<&'static str, usize>,
    changed: bool,
}

impl Pass<'_> {
    fn visit(&mut self, node: &PNode) -> PNode {
        if let Some((_, done)) = self.memo.get(&node_addr(node)) {
            return done.clone();
        }

        let inputs: Vec<PNode> = node.inputs().iter().map(|i| self.visit(i)).collect();
        let inputs_changed = inputs
            .iter()
            .zip(node.inputs())
            .any(|(new, old)| !Arc::ptr_eq(new, old));
        let mut current = if inputs_changed {
            self.changed = true;
            node.with_inputs(inputs)
        } else {
            node.clone()
        };

        for _ in 0..MAX_LOCAL_REWRITES {
            let Some((rule, next)) = self
                .rules
                .iter()
                .find_map(|r| r.rewrite(&current).map(|n| (r.name(), n)))
            else {
                break;
            };
            trace!(rule, from = %current.kind(), to = %next.kind(), "rewrite");
            *self.rewrites.entry(rule).or_default() += 1;
            self.changed = true;
            current = next;
        }

        self.memo
            .insert(node_addr(node), (node.clone(), current.clone()));
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::MAX_STAGE;
    use colflow_core::make;

    #[test]
    fn shared_nodes_are_rewritten_once() {
        let r = make::union(&make::range(0, 3), &make::range(0, 3));
        let shared = make::project(&make::project(&r, &[1, 0]), &[1, 0]);
        let root = make::union(&shared, &shared);

        let engine = OptimizationEngine::default();
        let (out, report) = engine.run_stage(&root, 1);
        // P[1,0](P[1,0] r) -> P[0,1] r -> r, reached once through the memo
        assert!(Arc::ptr_eq(out.input(0), out.input(1)));
        assert!(Arc::ptr_eq(out.input(0), &r));
        assert_eq!(report.rewrites.get("merge_projects"), Some(&1));
        assert_eq!(report.rewrites.get("eliminate_identity_project"), Some(&1));
    }

    #[test]
    fn untouched_plans_come_back_identical() {
        let root = make::range(0, 10);
        let engine = OptimizationEngine::default();
        let (out, report) = engine.optimize(&root, &(0..=MAX_STAGE).collect::<Vec<_>>());
        // only the tagging stage touches a bare range, and it does not qualify
        assert!(Arc::ptr_eq(&out, &root));
        assert_eq!(report.total_rewrites(), 0);
        assert!(report.stages.iter().all(|s| s.passes <= 1));
    }
}
