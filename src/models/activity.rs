use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::objective::{ObjectiveDeclaration, ObjectiveState};
use super::rules::{RollupDeclaration, SequencingRules};
use super::default_true;

/// One node of the parsed manifest as handed to the engine.
///
/// The manifest layer owns parsing and validation; by the time a descriptor
/// reaches the engine it is assumed well-formed. Children are kept in document
/// order, which is the tie-break for flow traversal and rule resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityDescriptor {
    pub id: String,
    #[serde(default)]
    pub title: String,
    /// Reference to launchable content. Pure aggregation nodes have none.
    #[serde(default)]
    pub resource: Option<String>,
    #[serde(flatten)]
    pub sequencing: SequencingDefinition,
    #[serde(default)]
    pub children: Vec<ActivityDescriptor>,
}

impl ActivityDescriptor {
    /// Create a descriptor with default sequencing and no children.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            resource: None,
            sequencing: SequencingDefinition::default(),
            children: Vec::new(),
        }
    }

    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    pub fn with_children(mut self, children: Vec<ActivityDescriptor>) -> Self {
        self.children = children;
        self
    }

    pub fn with_sequencing(mut self, sequencing: SequencingDefinition) -> Self {
        self.sequencing = sequencing;
        self
    }
}

/// Everything an activity declares about how it is sequenced.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequencingDefinition {
    #[serde(default)]
    pub control_mode: ControlMode,
    #[serde(default)]
    pub sequencing_rules: SequencingRules,
    #[serde(default)]
    pub rollup: RollupDeclaration,
    #[serde(default)]
    pub rollup_consideration: RollupConsideration,
    #[serde(default)]
    pub limit_conditions: LimitConditions,
    #[serde(default)]
    pub delivery_controls: DeliveryControls,
    #[serde(default)]
    pub objectives: Vec<ObjectiveDeclaration>,
    /// Hidden activities never take part in flow or choice.
    #[serde(default = "default_true")]
    pub visible: bool,
}

impl Default for SequencingDefinition {
    fn default() -> Self {
        Self {
            control_mode: ControlMode::default(),
            sequencing_rules: SequencingRules::default(),
            rollup: RollupDeclaration::default(),
            rollup_consideration: RollupConsideration::default(),
            limit_conditions: LimitConditions::default(),
            delivery_controls: DeliveryControls::default(),
            objectives: Vec::new(),
            visible: true,
        }
    }
}

/// Control mode flags governing how the children of an activity are navigated.
///
/// `flow` defaults to enabled so that packages without any sequencing
/// information can be walked linearly.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ControlMode {
    #[serde(default = "default_true")]
    pub choice: bool,
    #[serde(default = "default_true")]
    pub choice_exit: bool,
    #[serde(default = "default_true")]
    pub flow: bool,
    #[serde(default)]
    pub forward_only: bool,
    #[serde(default)]
    pub constrain_choice: bool,
    #[serde(default)]
    pub prevent_activation: bool,
}

impl Default for ControlMode {
    fn default() -> Self {
        Self {
            choice: true,
            choice_exit: true,
            flow: true,
            forward_only: false,
            constrain_choice: false,
            prevent_activation: false,
        }
    }
}

/// Limits that disable an activity for the current navigation once violated.
///
/// Durations are expressed in seconds.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LimitConditions {
    /// Maximum number of attempts. `None` or `0` means unlimited.
    #[serde(default)]
    pub attempt_limit: Option<u32>,
    #[serde(default)]
    pub attempt_absolute_duration_limit: Option<f64>,
    #[serde(default)]
    pub activity_absolute_duration_limit: Option<f64>,
    #[serde(default)]
    pub begin_time_limit: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time_limit: Option<DateTime<Utc>>,
}

/// Delivery controls of an activity.
///
/// - `tracked`: whether the activity contributes to rollup at all
/// - `completion_set_by_content`: when false, ending an attempt marks the activity completed
/// - `objective_set_by_content`: when false, ending an attempt marks the activity satisfied
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryControls {
    #[serde(default = "default_true")]
    pub tracked: bool,
    #[serde(default = "default_true")]
    pub completion_set_by_content: bool,
    #[serde(default = "default_true")]
    pub objective_set_by_content: bool,
}

impl Default for DeliveryControls {
    fn default() -> Self {
        Self {
            tracked: true,
            completion_set_by_content: true,
            objective_set_by_content: true,
        }
    }
}

/// When a child is included in its parent's rollup.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum RollupRequirement {
    #[default]
    Always,
    IfAttempted,
    IfNotSkipped,
    IfNotSuspended,
}

impl RollupRequirement {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Always => "always",
            Self::IfAttempted => "ifAttempted",
            Self::IfNotSkipped => "ifNotSkipped",
            Self::IfNotSuspended => "ifNotSuspended",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "always" => Some(Self::Always),
            "ifAttempted" => Some(Self::IfAttempted),
            "ifNotSkipped" => Some(Self::IfNotSkipped),
            "ifNotSuspended" => Some(Self::IfNotSuspended),
            _ => None,
        }
    }
}

/// Per-child rollup consideration, one requirement per rollup action.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RollupConsideration {
    #[serde(default)]
    pub required_for_satisfied: RollupRequirement,
    #[serde(default)]
    pub required_for_not_satisfied: RollupRequirement,
    #[serde(default)]
    pub required_for_completed: RollupRequirement,
    #[serde(default)]
    pub required_for_incomplete: RollupRequirement,
}

/// Completion status of an activity attempt.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum CompletionStatus {
    #[default]
    NotAttempted,
    Incomplete,
    Completed,
    Unknown,
}

impl CompletionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotAttempted => "not attempted",
            Self::Incomplete => "incomplete",
            Self::Completed => "completed",
            Self::Unknown => "unknown",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "not attempted" | "not_attempted" | "notAttempted" => Some(Self::NotAttempted),
            "incomplete" => Some(Self::Incomplete),
            "completed" => Some(Self::Completed),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }

    /// `Some(true)` for completed, `Some(false)` for incomplete, `None` when unknown.
    pub fn as_known(&self) -> Option<bool> {
        match self {
            Self::Completed => Some(true),
            Self::Incomplete => Some(false),
            Self::NotAttempted | Self::Unknown => None,
        }
    }
}

/// Success status of an activity attempt, mirrored by the primary objective.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SuccessStatus {
    Passed,
    Failed,
    #[default]
    Unknown,
}

impl SuccessStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Unknown => "unknown",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "passed" => Some(Self::Passed),
            "failed" => Some(Self::Failed),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }

    pub fn from_satisfied(satisfied: Option<bool>) -> Self {
        match satisfied {
            Some(true) => Self::Passed,
            Some(false) => Self::Failed,
            None => Self::Unknown,
        }
    }

    pub fn satisfied(&self) -> Option<bool> {
        match self {
            Self::Passed => Some(true),
            Self::Failed => Some(false),
            Self::Unknown => None,
        }
    }
}

/// Mutable per-activity tracking data.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrackingState {
    pub attempt_count: u32,
    pub attempt_active: bool,
    pub suspended: bool,
    pub completion_status: CompletionStatus,
    pub success_status: SuccessStatus,
    /// Normalized measure of the primary objective, -1.0..=1.0.
    pub objective_measure: Option<f64>,
    /// Progress measure, 0.0..=1.0.
    pub progress_measure: Option<f64>,
    pub location: Option<String>,
    /// Seconds spent in the current (or last) attempt.
    pub attempt_duration: f64,
    /// Seconds spent across all attempts.
    pub activity_duration: f64,
    pub attempt_started_at: Option<DateTime<Utc>>,
    /// State of non-primary objectives, keyed by objective id.
    pub objectives: BTreeMap<String, ObjectiveState>,
}

impl TrackingState {
    pub fn objective_satisfied(&self) -> Option<bool> {
        self.success_status.satisfied()
    }

    pub fn is_attempted(&self) -> bool {
        self.attempt_count > 0
    }

    /// Clear attempt data for a retry. The attempt counter and the activity-level
    /// duration survive.
    pub fn reset_for_retry(&mut self) {
        *self = Self {
            attempt_count: self.attempt_count,
            activity_duration: self.activity_duration,
            ..Self::default()
        };
    }
}

/// One node of the activity tree: declared definition plus tracking state.
///
/// Parent and children are stored as identifiers resolved through the owning
/// [`ActivityTree`](crate::sequencing::ActivityTree), never as references.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: String,
    pub title: String,
    pub resource: Option<String>,
    pub parent: Option<String>,
    pub children: Vec<String>,
    pub depth: usize,
    pub sequencing: SequencingDefinition,
    pub tracking: TrackingState,
}

impl Activity {
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Whether this activity is a launchable leaf, as opposed to a pure
    /// structural/aggregation node.
    pub fn is_tracked_resource(&self) -> bool {
        self.is_leaf() && self.resource.is_some()
    }

    pub fn is_tracked(&self) -> bool {
        self.sequencing.delivery_controls.tracked
    }

    pub fn control_mode(&self) -> &ControlMode {
        &self.sequencing.control_mode
    }

    pub fn primary_objective(&self) -> Option<&ObjectiveDeclaration> {
        self.sequencing.objectives.iter().find(|o| o.primary)
    }

    /// Resolve an objective reference; `None` means the primary objective.
    pub fn objective(&self, objective_id: Option<&str>) -> Option<&ObjectiveDeclaration> {
        match objective_id {
            None => self.primary_objective(),
            Some(id) => self.sequencing.objectives.iter().find(|o| o.id == id),
        }
    }

    fn is_primary_ref(&self, objective_id: Option<&str>) -> bool {
        match objective_id {
            None => true,
            Some(id) => self.primary_objective().is_some_and(|o| o.id == id),
        }
    }

    /// The locally tracked state of an objective, ignoring global mappings.
    pub fn local_objective(&self, objective_id: Option<&str>) -> ObjectiveState {
        if self.is_primary_ref(objective_id) {
            return ObjectiveState {
                satisfied: self.tracking.objective_satisfied(),
                measure: self.tracking.objective_measure,
            };
        }
        objective_id
            .and_then(|id| self.tracking.objectives.get(id))
            .cloned()
            .unwrap_or_default()
    }

    pub fn set_local_objective(&mut self, objective_id: Option<&str>, state: ObjectiveState) {
        if self.is_primary_ref(objective_id) {
            self.tracking.success_status = SuccessStatus::from_satisfied(state.satisfied);
            self.tracking.objective_measure = state.measure;
        } else if let Some(id) = objective_id {
            self.tracking.objectives.insert(id.to_string(), state);
        }
    }
}
