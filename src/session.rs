//! The sequencing session: one explicit context object per loaded course.
//!
//! A session owns its activity tree, the global objective map, the current
//! activity and the cached available-navigation vector. All tracking state is
//! mutated through the operations below; nothing else holds a reference into
//! the tree. Each operation runs to completion before the next is accepted.

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::error::{Result, SequencingError};
use crate::models::*;
use crate::sequencing::{ActivityTree, Clock, GlobalObjectiveMap, RuleEvaluator, SystemClock};

pub struct SequencingSession {
    pub(crate) tree: ActivityTree,
    pub(crate) globals: GlobalObjectiveMap,
    pub(crate) state: SessionState,
    pub(crate) current: Option<String>,
    pub(crate) available: AvailableNavigation,
    pub(crate) config: EngineConfig,
    pub(crate) clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for SequencingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SequencingSession")
            .field("state", &self.state)
            .field("current", &self.current)
            .field("activities", &self.tree.len())
            .finish()
    }
}

impl SequencingSession {
    /// Load a course with the default configuration and the system clock.
    pub fn new(course: &ActivityDescriptor) -> Result<Self> {
        Self::with_config(course, EngineConfig::default(), Arc::new(SystemClock))
    }

    pub fn with_config(
        course: &ActivityDescriptor,
        config: EngineConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let tree = ActivityTree::build(course)?;
        let mut session = Self {
            tree,
            globals: GlobalObjectiveMap::new(),
            state: SessionState::NotStarted,
            current: None,
            available: AvailableNavigation::default(),
            config,
            clock,
        };
        session.refresh_navigation();
        tracing::info!(
            root = %session.tree.root_id(),
            activities = session.tree.len(),
            "Course loaded"
        );
        Ok(session)
    }

    // ============================================================
    // Read access
    // ============================================================

    pub fn tree(&self) -> &ActivityTree {
        &self.tree
    }

    pub fn global_objectives(&self) -> &GlobalObjectiveMap {
        &self.globals
    }

    pub fn session_state(&self) -> SessionState {
        self.state
    }

    pub fn current_activity(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn available_navigation(&self) -> &AvailableNavigation {
        &self.available
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Snapshot of the session for the host. Two calls without an intervening
    /// request or progress update return identical snapshots.
    pub fn get_sequencing_state(&self) -> SequencingSnapshot {
        let root = self.tree.root();
        SequencingSnapshot {
            session_state: self.state,
            current_activity: self.current.clone(),
            suspended_activity: self.tree.suspended_activity().map(str::to_string),
            available_navigation: self.available.clone(),
            activity_tree_stats: self.tree.stats(),
            root_completion: root
                .map(|r| r.tracking.completion_status)
                .unwrap_or_default(),
            root_success: root.map(|r| r.tracking.success_status).unwrap_or_default(),
        }
    }

    /// Evaluate one rule phase of an activity against the current state.
    pub fn evaluate_rules(&self, activity_id: &str, phase: RulePhase) -> Result<Option<RuleAction>> {
        if !self.tree.contains(activity_id) {
            return Err(SequencingError::UnknownActivity(activity_id.to_string()));
        }
        let evaluator = RuleEvaluator::new(&self.tree, &self.globals, self.clock.now());
        Ok(evaluator.evaluate(activity_id, phase))
    }

    // ============================================================
    // Navigation
    // ============================================================

    /// Process a navigation request, reporting failures as a structured result.
    pub fn process_navigation(&mut self, request: &NavigationRequest) -> NavigationResult {
        match self.navigate(request) {
            Ok(target) => NavigationResult::ok(target),
            Err(e) => NavigationResult::failed(e.to_string()),
        }
    }

    /// Translate a content exit into a navigation request.
    ///
    /// Only the current activity may exit.
    pub fn handle_activity_exit(
        &mut self,
        activity_id: &str,
        exit_mode: ExitMode,
    ) -> Result<Option<String>> {
        self.require_known(activity_id)?;
        if self.current.as_deref() != Some(activity_id) {
            return Err(SequencingError::not_available(format!(
                "'{}' is not the current activity",
                activity_id
            )));
        }
        tracing::debug!(activity = %activity_id, exit_mode = exit_mode.as_str(), "Activity exit");
        self.navigate(&exit_mode.navigation_request())
    }

    // ============================================================
    // Progress updates
    // ============================================================

    /// Apply progress reported by content, then roll up.
    pub fn update_activity_progress(
        &mut self,
        activity_id: &str,
        progress: ActivityProgress,
    ) -> Result<()> {
        self.require_known(activity_id)?;
        if let Some(measure) = progress.measure {
            if !(-1.0..=1.0).contains(&measure) {
                return Err(SequencingError::InvalidValue {
                    field: "measure",
                    reason: format!("{} is outside -1.0..=1.0", measure),
                });
            }
        }
        if let Some(progress_measure) = progress.progress_measure {
            if !(0.0..=1.0).contains(&progress_measure) {
                return Err(SequencingError::InvalidValue {
                    field: "progressMeasure",
                    reason: format!("{} is outside 0.0..=1.0", progress_measure),
                });
            }
        }
        let objective_id = progress.objective_id.as_deref();
        if objective_id.is_some() {
            let declared = self
                .tree
                .find(activity_id)
                .and_then(|a| a.objective(objective_id))
                .is_some();
            if !declared {
                return Err(SequencingError::InvalidValue {
                    field: "objectiveId",
                    reason: format!(
                        "'{}' declares no objective '{}'",
                        activity_id,
                        objective_id.unwrap_or_default()
                    ),
                });
            }
        }

        let Some(activity) = self.tree.find_mut(activity_id) else {
            return Err(SequencingError::UnknownActivity(activity_id.to_string()));
        };
        if let Some(completed) = progress.completed {
            activity.tracking.completion_status = if completed {
                CompletionStatus::Completed
            } else {
                CompletionStatus::Incomplete
            };
        }
        if let Some(progress_measure) = progress.progress_measure {
            activity.tracking.progress_measure = Some(progress_measure);
        }
        if progress.satisfied.is_some() || progress.measure.is_some() {
            let mut objective = activity.local_objective(objective_id);
            if let Some(satisfied) = progress.satisfied {
                objective.satisfied = Some(satisfied);
            }
            if let Some(measure) = progress.measure {
                objective.measure = Some(measure);
                let by_measure = activity
                    .objective(objective_id)
                    .filter(|o| o.satisfied_by_measure)
                    .map(|o| measure >= o.min_normalized_measure);
                if let Some(satisfied) = by_measure {
                    objective.satisfied = Some(satisfied);
                }
            }
            activity.set_local_objective(objective_id, objective);
        }
        tracing::debug!(activity = %activity_id, ?progress, "Progress updated");

        self.after_progress(activity_id);
        Ok(())
    }

    pub fn completion_status_changed(
        &mut self,
        activity_id: &str,
        value: CompletionStatus,
    ) -> Result<()> {
        let activity = self
            .tree
            .find_mut(activity_id)
            .ok_or_else(|| SequencingError::UnknownActivity(activity_id.to_string()))?;
        activity.tracking.completion_status = value;
        self.after_progress(activity_id);
        Ok(())
    }

    pub fn success_status_changed(&mut self, activity_id: &str, value: SuccessStatus) -> Result<()> {
        self.update_activity_progress(
            activity_id,
            ActivityProgress {
                satisfied: value.satisfied(),
                ..ActivityProgress::default()
            },
        )?;
        // `Unknown` carries no satisfied flag, so clear it explicitly.
        if value == SuccessStatus::Unknown {
            if let Some(activity) = self.tree.find_mut(activity_id) {
                activity.tracking.success_status = SuccessStatus::Unknown;
            }
            self.after_progress(activity_id);
        }
        Ok(())
    }

    pub fn progress_measure_changed(&mut self, activity_id: &str, value: f64) -> Result<()> {
        self.update_activity_progress(
            activity_id,
            ActivityProgress {
                progress_measure: Some(value),
                ..ActivityProgress::default()
            },
        )
    }

    /// Store the content's location bookmark. Does not affect sequencing.
    pub fn update_activity_location(&mut self, activity_id: &str, value: impl Into<String>) -> Result<()> {
        let activity = self
            .tree
            .find_mut(activity_id)
            .ok_or_else(|| SequencingError::UnknownActivity(activity_id.to_string()))?;
        activity.tracking.location = Some(value.into());
        Ok(())
    }

    /// Dispatch a run-time notification. Exit notifications answer with the
    /// resulting navigation.
    pub fn apply_notification(
        &mut self,
        notification: RuntimeNotification,
    ) -> Result<Option<NavigationResult>> {
        match notification {
            RuntimeNotification::CompletionStatusChanged { activity_id, value } => {
                self.completion_status_changed(&activity_id, value)?;
                Ok(None)
            }
            RuntimeNotification::SuccessStatusChanged { activity_id, value } => {
                self.success_status_changed(&activity_id, value)?;
                Ok(None)
            }
            RuntimeNotification::ProgressMeasureChanged { activity_id, value } => {
                self.progress_measure_changed(&activity_id, value)?;
                Ok(None)
            }
            RuntimeNotification::LocationUpdated { activity_id, value } => {
                self.update_activity_location(&activity_id, value)?;
                Ok(None)
            }
            RuntimeNotification::ExitRequested {
                activity_id,
                exit_mode,
            } => {
                let result = match self.handle_activity_exit(&activity_id, exit_mode) {
                    Ok(target) => NavigationResult::ok(target),
                    Err(e) if e.is_navigation_failure() => NavigationResult::failed(e.to_string()),
                    Err(e) => return Err(e),
                };
                Ok(Some(result))
            }
        }
    }

    /// Roll up explicitly from an activity.
    pub fn rollup(&mut self, activity_id: &str) -> Result<()> {
        self.require_known(activity_id)?;
        self.rollup_from(activity_id);
        self.refresh_navigation();
        Ok(())
    }

    fn after_progress(&mut self, activity_id: &str) {
        if self.config.rollup_on_progress_update {
            self.rollup_from(activity_id);
        } else if let Some(activity) = self.tree.find(activity_id) {
            self.globals.write_from(activity);
        }
        self.refresh_navigation();
    }

    fn require_known(&self, activity_id: &str) -> Result<()> {
        if self.tree.contains(activity_id) {
            Ok(())
        } else {
            Err(SequencingError::UnknownActivity(activity_id.to_string()))
        }
    }
}
