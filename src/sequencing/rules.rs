//! Sequencing rule evaluation.
//!
//! Conditions are three-valued: `Some(true)`, `Some(false)` or `None` (unknown).
//! A rule fires only when its condition set evaluates to `Some(true)`; anything
//! unknown or unevaluable leaves the rule silent.

use chrono::{DateTime, Utc};

use super::limits;
use super::objectives::GlobalObjectiveMap;
use super::tree::ActivityTree;
use crate::models::*;

pub struct RuleEvaluator<'a> {
    tree: &'a ActivityTree,
    globals: &'a GlobalObjectiveMap,
    now: DateTime<Utc>,
}

impl<'a> RuleEvaluator<'a> {
    pub fn new(tree: &'a ActivityTree, globals: &'a GlobalObjectiveMap, now: DateTime<Utc>) -> Self {
        Self {
            tree,
            globals,
            now,
        }
    }

    /// Action of the first rule in `phase` whose conditions hold.
    pub fn evaluate(&self, id: &str, phase: RulePhase) -> Option<RuleAction> {
        self.first_match(id, phase, None)
    }

    /// Like [`evaluate`](Self::evaluate), restricted to rules whose action is one
    /// of `actions`. Declaration order still decides among them.
    pub fn check(&self, id: &str, phase: RulePhase, actions: &[RuleAction]) -> Option<RuleAction> {
        self.first_match(id, phase, Some(actions))
    }

    fn first_match(
        &self,
        id: &str,
        phase: RulePhase,
        actions: Option<&[RuleAction]>,
    ) -> Option<RuleAction> {
        let activity = self.tree.find(id)?;
        for rule in activity.sequencing.sequencing_rules.for_phase(phase) {
            if !rule.action.allowed_in(phase) {
                tracing::warn!(
                    activity = %id,
                    action = rule.action.as_str(),
                    phase = phase.as_str(),
                    "Ignoring sequencing rule with an action not valid in this phase"
                );
                continue;
            }
            if actions.is_some_and(|allowed| !allowed.contains(&rule.action)) {
                continue;
            }
            if self.rule_fires(activity, rule) {
                tracing::debug!(
                    activity = %id,
                    action = rule.action.as_str(),
                    phase = phase.as_str(),
                    "Sequencing rule fired"
                );
                return Some(rule.action);
            }
        }
        None
    }

    pub fn rule_fires(&self, activity: &Activity, rule: &SequencingRule) -> bool {
        if rule.conditions.is_empty() {
            return false;
        }
        let mut results = rule.conditions.iter().map(|c| {
            let value = self.condition(
                activity,
                c.condition,
                c.referenced_objective.as_deref(),
                c.measure_threshold,
            );
            apply_operator(value, c.operator)
        });
        combine(&mut results, rule.condition_combination) == Some(true)
    }

    /// Evaluate one atomic condition against an activity.
    pub fn condition(
        &self,
        activity: &Activity,
        kind: ConditionKind,
        objective: Option<&str>,
        threshold: f64,
    ) -> Option<bool> {
        let tracking = &activity.tracking;
        match kind {
            ConditionKind::Satisfied => self.globals.effective(activity, objective).satisfied,
            ConditionKind::ObjectiveStatusKnown => Some(
                self.globals
                    .effective(activity, objective)
                    .satisfied
                    .is_some(),
            ),
            ConditionKind::ObjectiveMeasureKnown => {
                Some(self.globals.effective(activity, objective).measure.is_some())
            }
            ConditionKind::ObjectiveMeasureGreaterThan => self
                .globals
                .effective(activity, objective)
                .measure
                .map(|m| m > threshold),
            ConditionKind::ObjectiveMeasureLessThan => self
                .globals
                .effective(activity, objective)
                .measure
                .map(|m| m < threshold),
            ConditionKind::Completed => tracking.completion_status.as_known(),
            ConditionKind::ActivityProgressKnown => {
                Some(tracking.completion_status.as_known().is_some())
            }
            ConditionKind::Attempted => Some(tracking.is_attempted()),
            ConditionKind::AttemptLimitExceeded => Some(limits::attempt_limit_exceeded(activity)),
            ConditionKind::TimeLimitExceeded => {
                Some(limits::time_limit_exceeded(activity, self.now))
            }
            ConditionKind::OutsideAvailableTimeRange => {
                Some(limits::outside_time_range(activity, self.now))
            }
            ConditionKind::Always => Some(true),
            ConditionKind::Unknown => {
                tracing::warn!(activity = %activity.id, "Unknown rule condition evaluates false");
                None
            }
        }
    }
}

pub(crate) fn apply_operator(value: Option<bool>, operator: ConditionOperator) -> Option<bool> {
    match operator {
        ConditionOperator::NoOp => value,
        ConditionOperator::Not => value.map(|v| !v),
    }
}

/// Combine three-valued condition results.
pub(crate) fn combine(
    results: &mut dyn Iterator<Item = Option<bool>>,
    combination: ConditionCombination,
) -> Option<bool> {
    match combination {
        ConditionCombination::All => {
            let mut outcome = Some(true);
            for value in results {
                match value {
                    Some(false) => return Some(false),
                    None => outcome = None,
                    Some(true) => {}
                }
            }
            outcome
        }
        ConditionCombination::Any => {
            let mut outcome = Some(false);
            for value in results {
                match value {
                    Some(true) => return Some(true),
                    None => outcome = None,
                    Some(false) => {}
                }
            }
            outcome
        }
    }
}
