use serde::{Deserialize, Serialize};

use super::activity::{CompletionStatus, SuccessStatus};

/// Lifecycle of a sequencing session.
///
/// - `NotStarted`: Tree loaded, nothing delivered yet
/// - `Active`: An activity is current
/// - `Suspended`: The learner suspended; a bookmark is held on the root
/// - `Ended`: The root was exited; terminal
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    NotStarted,
    Active,
    Suspended,
    Ended,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::Active => "active",
            Self::Suspended => "suspended",
            Self::Ended => "ended",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "not_started" => Some(Self::NotStarted),
            "active" => Some(Self::Active),
            "suspended" => Some(Self::Suspended),
            "ended" => Some(Self::Ended),
            _ => None,
        }
    }
}

/// A navigation request issued by the host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "request", rename_all = "camelCase")]
pub enum NavigationRequest {
    Start,
    ResumeAll,
    Continue,
    Previous,
    Choice { target: String },
    Exit,
    ExitAll,
    Retry,
    RetryAll,
    Abandon,
    AbandonAll,
    SuspendAll,
}

impl NavigationRequest {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::ResumeAll => "resumeAll",
            Self::Continue => "continue",
            Self::Previous => "previous",
            Self::Choice { .. } => "choice",
            Self::Exit => "exit",
            Self::ExitAll => "exitAll",
            Self::Retry => "retry",
            Self::RetryAll => "retryAll",
            Self::Abandon => "abandon",
            Self::AbandonAll => "abandonAll",
            Self::SuspendAll => "suspendAll",
        }
    }

    /// Build a request from its name and optional target, as a host transport
    /// would receive it. `choice` requires a target.
    pub fn from_parts(name: &str, target: Option<&str>) -> Option<Self> {
        match (name, target) {
            ("start", _) => Some(Self::Start),
            ("resumeAll", _) => Some(Self::ResumeAll),
            ("continue", _) => Some(Self::Continue),
            ("previous", _) => Some(Self::Previous),
            ("choice", Some(target)) => Some(Self::Choice {
                target: target.to_string(),
            }),
            ("exit", _) => Some(Self::Exit),
            ("exitAll", _) => Some(Self::ExitAll),
            ("retry", _) => Some(Self::Retry),
            ("retryAll", _) => Some(Self::RetryAll),
            ("abandon", _) => Some(Self::Abandon),
            ("abandonAll", _) => Some(Self::AbandonAll),
            ("suspendAll", _) => Some(Self::SuspendAll),
            _ => None,
        }
    }
}

/// Answer to a navigation request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NavigationResult {
    pub success: bool,
    /// The activity that is current after the request, if any.
    pub target_activity: Option<String>,
    /// Human-readable reason for a failure.
    pub reason: Option<String>,
}

impl NavigationResult {
    pub fn ok(target_activity: Option<String>) -> Self {
        Self {
            success: true,
            target_activity,
            reason: None,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            target_activity: None,
            reason: Some(reason.into()),
        }
    }
}

/// Which navigation requests are currently valid.
///
/// Recomputed after every state-changing operation. Hosts must rely on this
/// vector rather than on raw control-mode flags.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AvailableNavigation {
    pub start: bool,
    pub resume_all: bool,
    #[serde(rename = "continue")]
    pub continue_: bool,
    pub previous: bool,
    pub choice: bool,
    pub exit: bool,
    pub suspend_all: bool,
    /// Activities a `choice` request may currently target, in document order.
    pub choice_targets: Vec<String>,
}

/// Aggregate counters over the activity tree.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TreeStats {
    pub total_activities: usize,
    pub leaf_count: usize,
    pub launchable_count: usize,
    pub attempted_count: usize,
    pub completed_count: usize,
    pub satisfied_count: usize,
    pub max_depth: usize,
}

/// Read-only view of a session for the host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SequencingSnapshot {
    pub session_state: SessionState,
    pub current_activity: Option<String>,
    pub suspended_activity: Option<String>,
    pub available_navigation: AvailableNavigation,
    pub activity_tree_stats: TreeStats,
    pub root_completion: CompletionStatus,
    pub root_success: SuccessStatus,
}

/// How content reported it is leaving.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ExitMode {
    #[default]
    Normal,
    Suspend,
    Logout,
    TimeOut,
}

impl ExitMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Suspend => "suspend",
            Self::Logout => "logout",
            Self::TimeOut => "time-out",
        }
    }

    /// Parse the run-time `exit` value. An empty string is a normal exit.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "" | "normal" => Some(Self::Normal),
            "suspend" => Some(Self::Suspend),
            "logout" => Some(Self::Logout),
            "time-out" | "timeout" | "timeOut" => Some(Self::TimeOut),
            _ => None,
        }
    }

    /// The navigation request this exit mode translates into.
    pub fn navigation_request(&self) -> NavigationRequest {
        match self {
            Self::Normal => NavigationRequest::Exit,
            Self::Suspend => NavigationRequest::SuspendAll,
            Self::Logout | Self::TimeOut => NavigationRequest::ExitAll,
        }
    }
}

/// Progress reported for an activity. All fields are optional for partial updates.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActivityProgress {
    pub completed: Option<bool>,
    pub satisfied: Option<bool>,
    /// Normalized measure, -1.0..=1.0.
    pub measure: Option<f64>,
    /// Progress measure, 0.0..=1.0.
    pub progress_measure: Option<f64>,
    /// Objective `satisfied`/`measure` apply to. `None` means the primary objective.
    pub objective_id: Option<String>,
}

/// Variable-change notifications from the run-time tracking layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RuntimeNotification {
    #[serde(rename_all = "camelCase")]
    CompletionStatusChanged {
        activity_id: String,
        value: CompletionStatus,
    },
    #[serde(rename_all = "camelCase")]
    SuccessStatusChanged {
        activity_id: String,
        value: SuccessStatus,
    },
    #[serde(rename_all = "camelCase")]
    ProgressMeasureChanged { activity_id: String, value: f64 },
    #[serde(rename_all = "camelCase")]
    LocationUpdated { activity_id: String, value: String },
    #[serde(rename_all = "camelCase")]
    ExitRequested {
        activity_id: String,
        exit_mode: ExitMode,
    },
}

impl RuntimeNotification {
    pub fn activity_id(&self) -> &str {
        match self {
            Self::CompletionStatusChanged { activity_id, .. }
            | Self::SuccessStatusChanged { activity_id, .. }
            | Self::ProgressMeasureChanged { activity_id, .. }
            | Self::LocationUpdated { activity_id, .. }
            | Self::ExitRequested { activity_id, .. } => activity_id,
        }
    }
}
