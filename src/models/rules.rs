use serde::{Deserialize, Serialize};

use super::{default_true, default_weight};

// ============================================================
// Sequencing rules
// ============================================================

/// Ordered sequencing rule lists of an activity.
///
/// Lists are evaluated first-match-wins in declaration order and must never be
/// re-sorted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequencingRules {
    #[serde(default)]
    pub pre_condition: Vec<SequencingRule>,
    #[serde(default)]
    pub post_condition: Vec<SequencingRule>,
    #[serde(default)]
    pub exit: Vec<SequencingRule>,
}

impl SequencingRules {
    pub fn for_phase(&self, phase: RulePhase) -> &[SequencingRule] {
        match phase {
            RulePhase::PreCondition => &self.pre_condition,
            RulePhase::PostCondition => &self.post_condition,
            RulePhase::Exit => &self.exit,
        }
    }
}

/// A condition set paired with the action taken when it holds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequencingRule {
    #[serde(default)]
    pub condition_combination: ConditionCombination,
    pub conditions: Vec<RuleCondition>,
    pub action: RuleAction,
}

impl SequencingRule {
    pub fn new(action: RuleAction, conditions: Vec<RuleCondition>) -> Self {
        Self {
            condition_combination: ConditionCombination::All,
            conditions,
            action,
        }
    }

    pub fn any(mut self) -> Self {
        self.condition_combination = ConditionCombination::Any;
        self
    }
}

/// One atomic condition of a sequencing rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleCondition {
    pub condition: ConditionKind,
    #[serde(default)]
    pub operator: ConditionOperator,
    /// Objective the condition reads. `None` means the primary objective.
    #[serde(default)]
    pub referenced_objective: Option<String>,
    /// Threshold for the measure comparison conditions.
    #[serde(default)]
    pub measure_threshold: f64,
}

impl RuleCondition {
    pub fn new(condition: ConditionKind) -> Self {
        Self {
            condition,
            operator: ConditionOperator::NoOp,
            referenced_objective: None,
            measure_threshold: 0.0,
        }
    }

    pub fn not(condition: ConditionKind) -> Self {
        Self {
            operator: ConditionOperator::Not,
            ..Self::new(condition)
        }
    }

    pub fn on_objective(mut self, objective_id: impl Into<String>) -> Self {
        self.referenced_objective = Some(objective_id.into());
        self
    }

    pub fn threshold(mut self, threshold: f64) -> Self {
        self.measure_threshold = threshold;
        self
    }
}

/// Atomic condition kinds shared by sequencing and rollup rules.
///
/// Anything the manifest names that is not listed here deserializes to
/// [`ConditionKind::Unknown`], which never evaluates true.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ConditionKind {
    Satisfied,
    ObjectiveStatusKnown,
    ObjectiveMeasureKnown,
    ObjectiveMeasureGreaterThan,
    ObjectiveMeasureLessThan,
    Completed,
    ActivityProgressKnown,
    Attempted,
    AttemptLimitExceeded,
    TimeLimitExceeded,
    OutsideAvailableTimeRange,
    Always,
    #[serde(other)]
    Unknown,
}

impl ConditionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Satisfied => "satisfied",
            Self::ObjectiveStatusKnown => "objectiveStatusKnown",
            Self::ObjectiveMeasureKnown => "objectiveMeasureKnown",
            Self::ObjectiveMeasureGreaterThan => "objectiveMeasureGreaterThan",
            Self::ObjectiveMeasureLessThan => "objectiveMeasureLessThan",
            Self::Completed => "completed",
            Self::ActivityProgressKnown => "activityProgressKnown",
            Self::Attempted => "attempted",
            Self::AttemptLimitExceeded => "attemptLimitExceeded",
            Self::TimeLimitExceeded => "timeLimitExceeded",
            Self::OutsideAvailableTimeRange => "outsideAvailableTimeRange",
            Self::Always => "always",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ConditionOperator {
    #[default]
    NoOp,
    Not,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ConditionCombination {
    #[default]
    All,
    Any,
}

/// Where in the attempt lifecycle a rule list is evaluated.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum RulePhase {
    PreCondition,
    PostCondition,
    Exit,
}

impl RulePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PreCondition => "preCondition",
            Self::PostCondition => "postCondition",
            Self::Exit => "exit",
        }
    }
}

/// Actions a sequencing rule can take.
///
/// Each action is only meaningful in some phases; see [`RuleAction::allowed_in`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum RuleAction {
    Skip,
    Disabled,
    HiddenFromChoice,
    StopForwardTraversal,
    Exit,
    ExitParent,
    ExitAll,
    Retry,
    RetryAll,
    Continue,
    Previous,
    #[serde(other)]
    Unknown,
}

impl RuleAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Skip => "skip",
            Self::Disabled => "disabled",
            Self::HiddenFromChoice => "hiddenFromChoice",
            Self::StopForwardTraversal => "stopForwardTraversal",
            Self::Exit => "exit",
            Self::ExitParent => "exitParent",
            Self::ExitAll => "exitAll",
            Self::Retry => "retry",
            Self::RetryAll => "retryAll",
            Self::Continue => "continue",
            Self::Previous => "previous",
            Self::Unknown => "unknown",
        }
    }

    pub fn allowed_in(&self, phase: RulePhase) -> bool {
        match phase {
            RulePhase::PreCondition => matches!(
                self,
                Self::Skip | Self::Disabled | Self::HiddenFromChoice | Self::StopForwardTraversal
            ),
            RulePhase::PostCondition => matches!(
                self,
                Self::Exit
                    | Self::ExitParent
                    | Self::ExitAll
                    | Self::Retry
                    | Self::RetryAll
                    | Self::Continue
                    | Self::Previous
            ),
            RulePhase::Exit => matches!(self, Self::Exit | Self::ExitParent | Self::ExitAll),
        }
    }
}

// ============================================================
// Rollup rules
// ============================================================

/// Rollup behaviour declared by a parent activity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollupDeclaration {
    #[serde(default)]
    pub rules: Vec<RollupRule>,
    /// Roll satisfaction and measure up into this activity.
    #[serde(default = "default_true")]
    pub objective_satisfied: bool,
    /// Roll completion and progress up into this activity.
    #[serde(default = "default_true")]
    pub progress_completion: bool,
    /// How this activity averages its children's measures.
    #[serde(default)]
    pub measure_weighting: MeasureWeighting,
    /// Weight of this activity's measure in its parent's measure rollup.
    #[serde(default = "default_weight")]
    pub objective_measure_weight: f64,
    /// Weight of this activity's progress in its parent's progress rollup.
    #[serde(default = "default_weight")]
    pub progress_weight: f64,
}

impl Default for RollupDeclaration {
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            objective_satisfied: true,
            progress_completion: true,
            measure_weighting: MeasureWeighting::default(),
            objective_measure_weight: default_weight(),
            progress_weight: default_weight(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum MeasureWeighting {
    #[default]
    Weighted,
    Unweighted,
}

/// "If `child_activity_set` of the children meet `conditions`, apply `action`."
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollupRule {
    #[serde(default)]
    pub child_activity_set: ChildActivitySet,
    #[serde(default)]
    pub minimum_count: u32,
    /// Fraction in 0.0..=1.0.
    #[serde(default)]
    pub minimum_percent: f64,
    #[serde(default = "any_combination")]
    pub condition_combination: ConditionCombination,
    pub conditions: Vec<RollupCondition>,
    pub action: RollupAction,
}

fn any_combination() -> ConditionCombination {
    ConditionCombination::Any
}

impl RollupRule {
    pub fn new(
        child_activity_set: ChildActivitySet,
        conditions: Vec<RollupCondition>,
        action: RollupAction,
    ) -> Self {
        Self {
            child_activity_set,
            minimum_count: 0,
            minimum_percent: 0.0,
            condition_combination: ConditionCombination::Any,
            conditions,
            action,
        }
    }

    pub fn at_least_count(count: u32, conditions: Vec<RollupCondition>, action: RollupAction) -> Self {
        Self {
            minimum_count: count,
            ..Self::new(ChildActivitySet::AtLeastCount, conditions, action)
        }
    }

    pub fn at_least_percent(
        percent: f64,
        conditions: Vec<RollupCondition>,
        action: RollupAction,
    ) -> Self {
        Self {
            minimum_percent: percent,
            ..Self::new(ChildActivitySet::AtLeastPercent, conditions, action)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollupCondition {
    pub condition: ConditionKind,
    #[serde(default)]
    pub operator: ConditionOperator,
}

impl RollupCondition {
    pub fn new(condition: ConditionKind) -> Self {
        Self {
            condition,
            operator: ConditionOperator::NoOp,
        }
    }

    pub fn not(condition: ConditionKind) -> Self {
        Self {
            condition,
            operator: ConditionOperator::Not,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ChildActivitySet {
    #[default]
    All,
    Any,
    None,
    AtLeastCount,
    AtLeastPercent,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum RollupAction {
    Satisfied,
    NotSatisfied,
    Completed,
    Incomplete,
    #[serde(other)]
    Unknown,
}

impl RollupAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Satisfied => "satisfied",
            Self::NotSatisfied => "notSatisfied",
            Self::Completed => "completed",
            Self::Incomplete => "incomplete",
            Self::Unknown => "unknown",
        }
    }
}
