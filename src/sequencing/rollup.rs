//! Bottom-up propagation of completion, satisfaction and measures.

use std::collections::{HashSet, VecDeque};

use chrono::{DateTime, Utc};

use super::objectives::GlobalObjectiveMap;
use super::rules::{apply_operator, combine, RuleEvaluator};
use super::tree::ActivityTree;
use crate::models::*;

/// Status dimensions rollup can change on a parent.
#[derive(Debug, Clone, PartialEq)]
struct RollupStatus {
    completion: CompletionStatus,
    success: SuccessStatus,
    measure: Option<f64>,
    progress: Option<f64>,
}

impl RollupStatus {
    fn of(activity: &Activity) -> Self {
        Self {
            completion: activity.tracking.completion_status,
            success: activity.tracking.success_status,
            measure: activity.tracking.objective_measure,
            progress: activity.tracking.progress_measure,
        }
    }
}

pub struct RollupEngine<'a> {
    tree: &'a mut ActivityTree,
    globals: &'a mut GlobalObjectiveMap,
    now: DateTime<Utc>,
    default_fallback: bool,
}

impl<'a> RollupEngine<'a> {
    pub fn new(
        tree: &'a mut ActivityTree,
        globals: &'a mut GlobalObjectiveMap,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            tree,
            globals,
            now,
            default_fallback: true,
        }
    }

    /// Whether the default aggregation applies when declared rules exist but
    /// none of them fire. Without declared rules the default always applies.
    pub fn with_default_fallback(mut self, enabled: bool) -> Self {
        self.default_fallback = enabled;
        self
    }

    /// Roll status up from `from`'s parent to the root.
    ///
    /// Stops at the first ancestor that blocks rollup entirely or whose status
    /// does not change. Objectives mapped to global ids are written for every
    /// activity whose status was touched, starting with `from` itself. When a
    /// global bucket changes, every other activity reading it is rolled up
    /// from as well, once per call.
    pub fn rollup(&mut self, from: &str) {
        if !self.tree.contains(from) {
            tracing::error!(activity = %from, "Rollup requested for an activity not in the tree");
            debug_assert!(false, "rollup on unknown activity {from}");
            return;
        }
        let mut pending = VecDeque::new();
        let mut visited = HashSet::from([from.to_string()]);

        let changed = self.write_globals(from);
        self.queue_readers(&changed, from, &mut pending);
        self.climb(from, &mut pending);

        while let Some(reader) = pending.pop_front() {
            if !visited.insert(reader.clone()) {
                continue;
            }
            tracing::debug!(activity = %reader, "Rolling up reader of a changed global objective");
            self.climb(&reader, &mut pending);
        }
    }

    fn climb(&mut self, from: &str, pending: &mut VecDeque<String>) {
        let mut cursor = self.tree.find(from).and_then(|a| a.parent.clone());
        while let Some(parent_id) = cursor {
            let Some(status) = self.evaluate_parent(&parent_id) else {
                tracing::debug!(activity = %parent_id, "Rollup blocked");
                break;
            };
            if !self.apply(&parent_id, status) {
                tracing::debug!(activity = %parent_id, "Rollup left status unchanged");
                break;
            }
            let changed = self.write_globals(&parent_id);
            self.queue_readers(&changed, &parent_id, pending);
            cursor = self.tree.find(&parent_id).and_then(|a| a.parent.clone());
        }
    }

    fn write_globals(&mut self, id: &str) -> Vec<String> {
        match self.tree.find(id) {
            Some(activity) => self.globals.write_from(activity),
            None => Vec::new(),
        }
    }

    fn queue_readers(&self, buckets: &[String], writer: &str, pending: &mut VecDeque<String>) {
        if buckets.is_empty() {
            return;
        }
        pending.extend(
            self.tree
                .activities()
                .filter(|a| a.id != writer && GlobalObjectiveMap::reads_any(a, buckets))
                .map(|a| a.id.clone()),
        );
    }

    fn apply(&mut self, id: &str, status: RollupStatus) -> bool {
        let Some(activity) = self.tree.find_mut(id) else {
            return false;
        };
        let before = RollupStatus::of(activity);
        if before == status {
            return false;
        }
        tracing::debug!(
            activity = %id,
            completion = status.completion.as_str(),
            success = status.success.as_str(),
            measure = ?status.measure,
            "Rollup changed status"
        );
        activity.tracking.completion_status = status.completion;
        activity.tracking.success_status = status.success;
        activity.tracking.objective_measure = status.measure;
        activity.tracking.progress_measure = status.progress;
        true
    }

    /// New status of a parent, or `None` when the parent takes no rollup.
    fn evaluate_parent(&self, parent_id: &str) -> Option<RollupStatus> {
        let tree: &ActivityTree = &*self.tree;
        let parent = tree.find(parent_id)?;
        let declaration = &parent.sequencing.rollup;
        if !declaration.objective_satisfied && !declaration.progress_completion {
            return None;
        }
        let children = tree.children(parent_id);
        if children.is_empty() {
            return None;
        }

        let evaluator = RuleEvaluator::new(tree, &*self.globals, self.now);
        let mut status = RollupStatus::of(parent);

        if declaration.objective_satisfied {
            if let Some(measure) = weighted_average(&children, declaration.measure_weighting, |c| {
                (
                    self.globals.effective(c, None).measure,
                    c.sequencing.rollup.objective_measure_weight,
                )
            }) {
                status.measure = Some(measure);
            }

            let by_measure = parent
                .primary_objective()
                .filter(|o| o.satisfied_by_measure)
                .and_then(|o| status.measure.map(|m| m >= o.min_normalized_measure));
            if let Some(satisfied) = by_measure {
                status.success = SuccessStatus::from_satisfied(Some(satisfied));
            } else if let Some(success) = self.satisfaction(parent, &children, &evaluator) {
                status.success = success;
            }
        }

        if declaration.progress_completion {
            if let Some(progress) = weighted_average(&children, declaration.measure_weighting, |c| {
                (c.tracking.progress_measure, c.sequencing.rollup.progress_weight)
            }) {
                status.progress = Some(progress);
            }
            if let Some(completion) = self.completion(parent, &children, &evaluator) {
                status.completion = completion;
            }
        }

        Some(status)
    }

    fn satisfaction(
        &self,
        parent: &Activity,
        children: &[&Activity],
        evaluator: &RuleEvaluator<'_>,
    ) -> Option<SuccessStatus> {
        let rules: Vec<&RollupRule> = parent
            .sequencing
            .rollup
            .rules
            .iter()
            .filter(|r| matches!(r.action, RollupAction::Satisfied | RollupAction::NotSatisfied))
            .collect();

        for rule in &rules {
            if self.rule_fires(rule, children, evaluator) {
                return Some(match rule.action {
                    RollupAction::Satisfied => SuccessStatus::Passed,
                    _ => SuccessStatus::Failed,
                });
            }
        }
        if !rules.is_empty() && !self.default_fallback {
            return None;
        }

        let for_satisfied = contributing(children, RollupAction::Satisfied, evaluator);
        let for_not_satisfied = contributing(children, RollupAction::NotSatisfied, evaluator);
        if for_satisfied.is_empty() && for_not_satisfied.is_empty() {
            return None;
        }
        let satisfied = |c: &&Activity| self.globals.effective(c, None).satisfied;

        if !for_satisfied.is_empty() && for_satisfied.iter().all(|c| satisfied(c) == Some(true)) {
            Some(SuccessStatus::Passed)
        } else if for_not_satisfied.iter().any(|c| satisfied(c) == Some(false)) {
            Some(SuccessStatus::Failed)
        } else {
            Some(SuccessStatus::Unknown)
        }
    }

    fn completion(
        &self,
        parent: &Activity,
        children: &[&Activity],
        evaluator: &RuleEvaluator<'_>,
    ) -> Option<CompletionStatus> {
        let rules: Vec<&RollupRule> = parent
            .sequencing
            .rollup
            .rules
            .iter()
            .filter(|r| matches!(r.action, RollupAction::Completed | RollupAction::Incomplete))
            .collect();

        for rule in &rules {
            if self.rule_fires(rule, children, evaluator) {
                return Some(match rule.action {
                    RollupAction::Completed => CompletionStatus::Completed,
                    _ => CompletionStatus::Incomplete,
                });
            }
        }
        if !rules.is_empty() && !self.default_fallback {
            return None;
        }

        let for_completed = contributing(children, RollupAction::Completed, evaluator);
        let for_incomplete = contributing(children, RollupAction::Incomplete, evaluator);

        if !for_completed.is_empty()
            && for_completed
                .iter()
                .all(|c| c.tracking.completion_status == CompletionStatus::Completed)
        {
            Some(CompletionStatus::Completed)
        } else if for_incomplete.iter().any(|c| {
            c.tracking.is_attempted()
                || c.tracking.completion_status != CompletionStatus::NotAttempted
        }) {
            Some(CompletionStatus::Incomplete)
        } else {
            None
        }
    }

    fn rule_fires(
        &self,
        rule: &RollupRule,
        children: &[&Activity],
        evaluator: &RuleEvaluator<'_>,
    ) -> bool {
        let considered = contributing(children, rule.action, evaluator);
        if considered.is_empty() || rule.conditions.is_empty() {
            return false;
        }

        let matching = considered
            .iter()
            .filter(|child| {
                let mut results = rule.conditions.iter().map(|c| {
                    apply_operator(evaluator.condition(child, c.condition, None, 0.0), c.operator)
                });
                combine(&mut results, rule.condition_combination) == Some(true)
            })
            .count();
        let total = considered.len();

        match rule.child_activity_set {
            ChildActivitySet::All => matching == total,
            ChildActivitySet::Any => matching > 0,
            ChildActivitySet::None => matching == 0,
            ChildActivitySet::AtLeastCount => matching >= rule.minimum_count as usize,
            ChildActivitySet::AtLeastPercent => {
                matching as f64 / total as f64 >= rule.minimum_percent
            }
        }
    }
}

/// Children that take part in rollup for `action`: tracked children whose
/// rollup consideration for that action is met.
fn contributing<'t>(
    children: &[&'t Activity],
    action: RollupAction,
    evaluator: &RuleEvaluator<'_>,
) -> Vec<&'t Activity> {
    children
        .iter()
        .copied()
        .filter(|child| child.is_tracked())
        .filter(|child| {
            let consideration = &child.sequencing.rollup_consideration;
            let requirement = match action {
                RollupAction::Satisfied => consideration.required_for_satisfied,
                RollupAction::NotSatisfied => consideration.required_for_not_satisfied,
                RollupAction::Completed => consideration.required_for_completed,
                RollupAction::Incomplete => consideration.required_for_incomplete,
                RollupAction::Unknown => return false,
            };
            match requirement {
                RollupRequirement::Always => true,
                RollupRequirement::IfAttempted => child.tracking.is_attempted(),
                RollupRequirement::IfNotSkipped => evaluator
                    .check(&child.id, RulePhase::PreCondition, &[RuleAction::Skip])
                    .is_none(),
                RollupRequirement::IfNotSuspended => !child.tracking.suspended,
            }
        })
        .collect()
}

/// Weighted mean over tracked children with positive weight. Unknown values
/// count as zero; the result is unknown when no child value is known.
fn weighted_average<F>(children: &[&Activity], weighting: MeasureWeighting, value: F) -> Option<f64>
where
    F: Fn(&Activity) -> (Option<f64>, f64),
{
    let mut total = 0.0;
    let mut weights = 0.0;
    let mut known = false;
    for child in children.iter().filter(|c| c.is_tracked()) {
        let (measure, weight) = value(child);
        let weight = match weighting {
            MeasureWeighting::Weighted => weight,
            MeasureWeighting::Unweighted => 1.0,
        };
        if weight <= 0.0 {
            continue;
        }
        weights += weight;
        if let Some(measure) = measure {
            total += measure * weight;
            known = true;
        }
    }
    (known && weights > 0.0).then(|| total / weights)
}
