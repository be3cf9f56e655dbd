//! Rules grouped by optimizer stage.

use std::sync::Arc;

use crate::rules::{
    CollapseEmptyAppend, EliminateIdentityProject, FoldConstantTernary, MergeAppendedSources,
    MergeProjects, MergeSources, ProjectIntoSource, ProjectThroughAppend, ProjectThroughFilter,
    ProjectThroughUnion, RuleRef, SplitFilterOverUnion, SplitSourceColumns, TagDirectSource,
    UnionOfFilters, UnionOfProjects,
};

/// Highest stage number.
pub const MAX_STAGE: usize = 5;

/// Stages that are cheap enough to run while a plan is still being built.
pub const FIRST_PASS_STAGES: std::ops::RangeInclusive<usize> = 0..=1;

pub fn stage_name(stage: usize) -> &'static str {
    match stage {
        0 => "normalize",
        1 => "simplify",
        2 => "exchange",
        3 => "split",
        4 => "consolidate",
        5 => "tag",
        _ => "unknown",
    }
}

pub struct RuleRegistry {
    stages: Vec<Vec<RuleRef>>,
}

impl RuleRegistry {
    pub fn empty() -> Self {
        Self {
            stages: vec![Vec::new(); MAX_STAGE + 1],
        }
    }

    /// Add `rule` to every stage it declares, after the rules already there.
    ///
    /// # Panics
    ///
    /// When the rule names a stage above [`MAX_STAGE`].
    pub fn register(&mut self, rule: RuleRef) {
        for &stage in rule.stages() {
            assert!(
                stage <= MAX_STAGE,
                "rule {} registered for stage {stage} > {MAX_STAGE}",
                rule.name()
            );
            self.stages[stage].push(rule.clone());
        }
    }

    pub fn rules_for(&self, stage: usize) -> &[RuleRef] {
        self.stages.get(stage).map(Vec::as_slice).unwrap_or(&[])
    }
}

impl Default for RuleRegistry {
    fn default() -> Self {
        let mut reg = Self::empty();
        let rules: Vec<RuleRef> = vec![
            Arc::new(SplitSourceColumns),
            Arc::new(EliminateIdentityProject),
            Arc::new(MergeProjects),
            Arc::new(FoldConstantTernary),
            Arc::new(CollapseEmptyAppend),
            Arc::new(ProjectThroughUnion),
            Arc::new(ProjectThroughFilter),
            Arc::new(ProjectThroughAppend),
            Arc::new(UnionOfProjects),
            Arc::new(UnionOfFilters),
            Arc::new(SplitFilterOverUnion),
            Arc::new(MergeSources),
            Arc::new(MergeAppendedSources),
            Arc::new(ProjectIntoSource),
            Arc::new(TagDirectSource),
        ];
        for rule in rules {
            reg.register(rule);
        }
        reg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_stage_membership() {
        let reg = RuleRegistry::default();
        let names = |s| reg.rules_for(s).iter().map(|r| r.name()).collect::<Vec<_>>();
        assert_eq!(names(0), vec!["split_source_columns"]);
        assert!(names(3).contains(&"split_filter_over_union"));
        assert!(!names(3).contains(&"union_of_filters"));
        assert!(names(1).contains(&"collapse_empty_append"));
        assert!(names(2).contains(&"project_through_append"));
        assert!(names(4).contains(&"merge_appended_sources"));
        assert_eq!(names(5), vec!["tag_direct_source"]);
        assert!(reg.rules_for(MAX_STAGE + 1).is_empty());
    }
}
