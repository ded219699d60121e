//! Navigation request processing.
//!
//! Every request is validated against the current state before anything is
//! mutated, so a rejected request leaves the session exactly as it was. The
//! available-navigation vector is recomputed after every request.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use super::limits::{self, LimitViolation};
use super::rollup::RollupEngine;
use super::rules::RuleEvaluator;
use crate::error::{Result, SequencingError};
use crate::models::*;
use crate::session::SequencingSession;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Forward,
    Backward,
}

/// Follow-up request raised by post-condition or exit rules while an
/// attempt is being terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Redirect {
    None,
    Continue,
    Previous,
    Retry,
    RetryAll,
    ExitAll,
}

impl SequencingSession {
    /// Process a navigation request. Returns the activity that is current
    /// afterwards, or `None` when the session ended.
    pub fn navigate(&mut self, request: &NavigationRequest) -> Result<Option<String>> {
        tracing::debug!(
            request = request.as_str(),
            state = self.state.as_str(),
            current = ?self.current,
            "Processing navigation request"
        );

        let outcome = match request {
            NavigationRequest::Start => self.start(),
            NavigationRequest::ResumeAll => self.resume_all(),
            NavigationRequest::Continue => self.flow(Direction::Forward),
            NavigationRequest::Previous => self.flow(Direction::Backward),
            NavigationRequest::Choice { target } => self.choice(target),
            NavigationRequest::Exit => self.exit(),
            NavigationRequest::ExitAll => self.exit_all(),
            NavigationRequest::Retry => self.retry(),
            NavigationRequest::RetryAll => self.retry_all(),
            NavigationRequest::Abandon => self.abandon(),
            NavigationRequest::AbandonAll => self.abandon_all(),
            NavigationRequest::SuspendAll => self.suspend_all(),
        };

        match &outcome {
            Ok(target) => tracing::info!(
                request = request.as_str(),
                target = ?target,
                state = self.state.as_str(),
                "Navigation processed"
            ),
            Err(e) => tracing::warn!(request = request.as_str(), error = %e, "Navigation rejected"),
        }
        self.refresh_navigation();
        outcome
    }

    // ============================================================
    // Requests
    // ============================================================

    fn start(&mut self) -> Result<Option<String>> {
        if self.state != SessionState::NotStarted {
            return Err(SequencingError::not_available(format!(
                "start is only valid before the session begins (session is {})",
                self.state.as_str()
            )));
        }
        let root = self.tree.root_id().to_string();
        if !self.tree.is_leaf(&root)
            && !self.tree.find(&root).is_some_and(|r| r.control_mode().flow)
        {
            return Err(SequencingError::not_available(format!(
                "flow is not enabled on '{}'",
                root
            )));
        }
        let target = self.first_flow_leaf(&root).ok_or_else(|| {
            SequencingError::not_available("no activity in the course can be delivered")
        })?;

        self.deliver(&target);
        Ok(Some(target))
    }

    fn resume_all(&mut self) -> Result<Option<String>> {
        if self.state != SessionState::Suspended {
            return Err(SequencingError::not_available(format!(
                "resumeAll requires a suspended session (session is {})",
                self.state.as_str()
            )));
        }
        let bookmark = self
            .tree
            .suspended_activity()
            .map(str::to_string)
            .ok_or_else(|| SequencingError::not_available("no suspended activity to resume"))?;

        let now = self.now();
        for id in self.tree.path_from_root(&bookmark) {
            if let Some(activity) = self.tree.find_mut(&id) {
                activity.tracking.suspended = false;
                if activity.tracking.attempt_active && activity.tracking.attempt_started_at.is_none() {
                    activity.tracking.attempt_started_at = Some(now);
                }
            }
        }
        self.tree.set_suspended_activity(None);
        self.current = Some(bookmark.clone());
        self.state = SessionState::Active;
        Ok(Some(bookmark))
    }

    /// `continue` and `previous`.
    fn flow(&mut self, direction: Direction) -> Result<Option<String>> {
        let name = match direction {
            Direction::Forward => "continue",
            Direction::Backward => "previous",
        };
        let current = self.require_active(name)?;
        self.check_flow_from(&current, direction)?;

        // An active cluster is entered rather than left.
        if self.is_active_cluster(&current) {
            if let Some(target) = self.flow_target(&current, direction) {
                self.end_off_path(&target);
                self.deliver(&target);
            }
            return Ok(self.current.clone());
        }

        let redirect = self.terminate_current(true);
        match redirect {
            Redirect::None => self.flow_after_termination(direction),
            Redirect::Continue => self.flow_after_termination(Direction::Forward),
            other => self.follow(other),
        }
    }

    fn choice(&mut self, target: &str) -> Result<Option<String>> {
        let leaf = self.validate_choice(target)?;

        if self.state == SessionState::Active {
            if let Some(current) = self.current.clone() {
                if self.is_active(&current) && !self.is_active_cluster(&current) {
                    self.end_subtree(&current);
                    // Only exit requests survive a choice; flow and retry
                    // redirects are superseded by the chosen target.
                    match self.post_conditions() {
                        Redirect::ExitAll => {
                            self.end_session();
                            return Ok(None);
                        }
                        Redirect::None => {}
                        ignored => tracing::debug!(
                            redirect = ?ignored,
                            "Post-condition request superseded by choice"
                        ),
                    }
                }
            }
        }

        self.end_off_path(&leaf);
        self.deliver(&leaf);
        Ok(Some(leaf))
    }

    fn exit(&mut self) -> Result<Option<String>> {
        let current = self.require_active("exit")?;

        if self.is_active(&current) {
            let redirect = self.terminate_current(true);
            return self.follow(redirect);
        }

        // The current attempt already ended: exit moves up one level.
        match self.tree.find(&current).and_then(|a| a.parent.clone()) {
            Some(parent) => {
                self.exit_to(&parent);
                let redirect = self.post_conditions();
                self.follow(redirect)
            }
            None => {
                self.end_session();
                Ok(None)
            }
        }
    }

    fn exit_all(&mut self) -> Result<Option<String>> {
        if !matches!(self.state, SessionState::Active | SessionState::Suspended) {
            return Err(SequencingError::not_available(format!(
                "exitAll requires a started session (session is {})",
                self.state.as_str()
            )));
        }
        if let Some(current) = self.current.clone() {
            for id in self.tree.path_from_root(&current).iter().rev() {
                self.end_subtree(id);
                if let Some(action) = self.evaluator().evaluate(id, RulePhase::PostCondition) {
                    tracing::debug!(
                        activity = %id,
                        action = action.as_str(),
                        "Post-condition ignored during exitAll"
                    );
                }
            }
        }
        self.end_session();
        Ok(None)
    }

    fn retry(&mut self) -> Result<Option<String>> {
        let current = self.require_active("retry")?;
        let activity = self
            .tree
            .find(&current)
            .ok_or_else(|| SequencingError::UnknownActivity(current.clone()))?;

        if self
            .evaluator()
            .check(&current, RulePhase::PreCondition, &[RuleAction::Disabled])
            .is_some()
        {
            return Err(SequencingError::not_available(format!(
                "'{}' is disabled",
                current
            )));
        }
        if let Some(violation) = self.limit_violation(activity) {
            return Err(SequencingError::not_available(format!(
                "cannot retry '{}': {}",
                current,
                violation.as_str()
            )));
        }

        self.end_subtree(&current);
        self.tree.reset_subtree(&current);
        self.rollup_from(&current);
        self.deliver(&current);
        Ok(Some(current))
    }

    fn retry_all(&mut self) -> Result<Option<String>> {
        self.require_active("retryAll")?;
        let root = self.tree.root_id().to_string();
        if let Some(violation) = self.tree.find(&root).and_then(|r| self.limit_violation(r)) {
            return Err(SequencingError::not_available(format!(
                "cannot retry the course: {}",
                violation.as_str()
            )));
        }

        self.end_all_attempts();
        self.tree.reset_subtree(&root);
        self.deliver(&root);
        Ok(Some(root))
    }

    fn abandon(&mut self) -> Result<Option<String>> {
        let current = self.require_active("abandon")?;
        if self.is_active(&current) {
            self.end_subtree(&current);
        } else {
            match self.tree.find(&current).and_then(|a| a.parent.clone()) {
                Some(parent) => self.exit_to(&parent),
                None => {
                    self.end_session();
                    return Ok(None);
                }
            }
        }
        self.finish_if_root_exited();
        Ok(self.current.clone())
    }

    fn abandon_all(&mut self) -> Result<Option<String>> {
        if !matches!(self.state, SessionState::Active | SessionState::Suspended) {
            return Err(SequencingError::not_available(format!(
                "abandonAll requires a started session (session is {})",
                self.state.as_str()
            )));
        }
        self.end_session();
        Ok(None)
    }

    fn suspend_all(&mut self) -> Result<Option<String>> {
        let current = self.require_active("suspendAll")?;
        let now = self.now();
        for id in self.tree.path_from_root(&current) {
            if let Some(activity) = self.tree.find_mut(&id) {
                pause_timer(activity, now);
                activity.tracking.suspended = true;
            }
        }
        self.tree.set_suspended_activity(Some(current.clone()));
        self.state = SessionState::Suspended;
        Ok(Some(current))
    }

    // ============================================================
    // Validation
    // ============================================================

    fn require_active(&self, request: &str) -> Result<String> {
        if self.state != SessionState::Active {
            return Err(SequencingError::not_available(format!(
                "{} requires an active session (session is {})",
                request,
                self.state.as_str()
            )));
        }
        self.current
            .clone()
            .ok_or_else(|| SequencingError::not_available("there is no current activity"))
    }

    fn check_flow_from(&self, current: &str, direction: Direction) -> Result<()> {
        let flow_enabled = if self.is_active_cluster(current) {
            self.tree.find(current).is_some_and(|a| a.control_mode().flow)
        } else {
            self.tree.parent(current).is_some_and(|p| p.control_mode().flow)
        };
        if !flow_enabled {
            return Err(SequencingError::not_available(format!(
                "flow is not enabled around '{}'",
                current
            )));
        }

        if direction == Direction::Backward {
            if let Some(blocking) = self
                .tree
                .ancestors(current)
                .into_iter()
                .find(|a| a.control_mode().forward_only)
            {
                return Err(SequencingError::not_available(format!(
                    "'{}' only allows forward navigation",
                    blocking.id
                )));
            }
        }

        if self.flow_target(current, direction).is_none() {
            return Err(SequencingError::not_available(match direction {
                Direction::Forward => format!("no activity follows '{}'", current),
                Direction::Backward => format!("no activity precedes '{}'", current),
            }));
        }
        Ok(())
    }

    /// Check a choice target and resolve it to the leaf that would be delivered.
    fn validate_choice(&self, target: &str) -> Result<String> {
        let Some(target_activity) = self.tree.find(target) else {
            return Err(SequencingError::UnknownActivity(target.to_string()));
        };
        if !matches!(self.state, SessionState::NotStarted | SessionState::Active) {
            return Err(SequencingError::not_available(format!(
                "choice is not available while the session is {}",
                self.state.as_str()
            )));
        }

        let evaluator = self.evaluator();
        let path = self.tree.path_from_root(target);
        for id in &path {
            let Some(activity) = self.tree.find(id) else {
                continue;
            };
            if !activity.control_mode().choice {
                return Err(SequencingError::not_available(format!(
                    "choice is disabled at '{}'",
                    id
                )));
            }
            if !activity.sequencing.visible
                || evaluator
                    .check(id, RulePhase::PreCondition, &[RuleAction::HiddenFromChoice])
                    .is_some()
            {
                return Err(SequencingError::not_available(format!(
                    "'{}' is hidden from choice",
                    id
                )));
            }
            if evaluator
                .check(id, RulePhase::PreCondition, &[RuleAction::Disabled])
                .is_some()
            {
                return Err(SequencingError::not_available(format!("'{}' is disabled", id)));
            }

            let starts_attempt = !activity.tracking.attempt_active
                || (id == target && target_activity.is_leaf());
            if starts_attempt {
                if let Some(violation) = self.limit_violation(activity) {
                    return Err(SequencingError::not_available(format!(
                        "'{}': {}",
                        id,
                        violation.as_str()
                    )));
                }
            }
            if id != target
                && !activity.tracking.attempt_active
                && activity.control_mode().prevent_activation
            {
                return Err(SequencingError::not_available(format!(
                    "'{}' prevents activation of its children by choice",
                    id
                )));
            }
        }

        if self.state == SessionState::Active {
            if let Some(current) = self.current.as_deref() {
                self.check_choice_from(current, target, &path)?;
            }
        }

        if target_activity.is_leaf() {
            Ok(target.to_string())
        } else {
            self.first_flow_leaf(target).ok_or_else(|| {
                SequencingError::not_available(format!(
                    "no activity inside '{}' can be delivered",
                    target
                ))
            })
        }
    }

    /// Constraints that depend on where the learner currently is.
    fn check_choice_from(&self, current: &str, target: &str, target_path: &[String]) -> Result<()> {
        let current_path = self.tree.path_from_root(current);

        for id in &current_path {
            let Some(activity) = self.tree.find(id) else {
                continue;
            };
            if activity.tracking.attempt_active
                && !activity.control_mode().choice_exit
                && !self.tree.is_in_subtree(id, target)
            {
                return Err(SequencingError::not_available(format!(
                    "'{}' cannot be exited by choice",
                    id
                )));
            }
        }

        if let Some(common) = self.tree.common_ancestor(current, target) {
            let forward_only = self
                .tree
                .find(&common)
                .is_some_and(|a| a.control_mode().forward_only);
            let backward = match (self.tree.position(target), self.tree.position(current)) {
                (Some(t), Some(c)) => t < c,
                _ => false,
            };
            if forward_only && backward {
                return Err(SequencingError::not_available(format!(
                    "'{}' only allows forward navigation",
                    common
                )));
            }
        }

        // Constrained clusters only allow the current branch or its neighbours.
        for (depth, id) in current_path.iter().enumerate() {
            let (Some(branch), Some(target_branch)) =
                (current_path.get(depth + 1), target_path.get(depth + 1))
            else {
                continue;
            };
            if target_path.get(depth) != Some(id) || branch == target_branch {
                continue;
            }
            let Some(cluster) = self.tree.find(id) else {
                continue;
            };
            if !cluster.control_mode().constrain_choice {
                continue;
            }
            let index = |child: &String| cluster.children.iter().position(|c| c == child);
            let allowed = match (index(branch), index(target_branch)) {
                (Some(from), Some(to)) => {
                    to == from + 1 || (!cluster.control_mode().forward_only && to + 1 == from)
                }
                _ => false,
            };
            if !allowed {
                return Err(SequencingError::not_available(format!(
                    "'{}' constrains choice to neighbouring activities",
                    id
                )));
            }
        }
        Ok(())
    }

    fn limit_violation(&self, activity: &Activity) -> Option<LimitViolation> {
        if !self.config.enforce_limit_conditions {
            return None;
        }
        limits::check(activity, self.now())
    }

    // ============================================================
    // Flow traversal
    // ============================================================

    fn flow_target(&self, from: &str, direction: Direction) -> Option<String> {
        match direction {
            Direction::Forward => self.next_flow_leaf(from),
            Direction::Backward => self.previous_flow_leaf(from),
        }
    }

    /// First deliverable leaf after `from` in document order.
    fn next_flow_leaf(&self, from: &str) -> Option<String> {
        let start = if self.is_active_cluster(from) {
            self.tree.position(from)? + 1
        } else {
            self.tree.subtree_end(from)?
        };
        let evaluator = self.evaluator();
        let from_path = self.tree.path_from_root(from);
        let root = self.tree.root_id();

        for id in &self.tree.preorder()[start..] {
            if !self.tree.is_leaf(id) {
                continue;
            }
            let leaves_stopper = from_path
                .iter()
                .filter(|node| !self.tree.is_in_subtree(node, id))
                .any(|node| {
                    evaluator
                        .check(node, RulePhase::PreCondition, &[RuleAction::StopForwardTraversal])
                        .is_some()
                });
            if leaves_stopper {
                return None;
            }
            if self.flow_eligible(id, root, Direction::Forward, &evaluator) {
                return Some(id.clone());
            }
        }
        None
    }

    /// Last deliverable leaf before `from` in document order.
    fn previous_flow_leaf(&self, from: &str) -> Option<String> {
        let end = self.tree.position(from)?;
        let evaluator = self.evaluator();
        let root = self.tree.root_id();
        self.tree.preorder()[..end]
            .iter()
            .rev()
            .filter(|id| self.tree.is_leaf(id))
            .find(|id| self.flow_eligible(id, root, Direction::Backward, &evaluator))
            .cloned()
    }

    /// First deliverable leaf inside `cluster`, or the cluster itself if it
    /// is a leaf.
    fn first_flow_leaf(&self, cluster: &str) -> Option<String> {
        let evaluator = self.evaluator();
        self.tree
            .subtree_ids(cluster)
            .into_iter()
            .filter(|id| self.tree.is_leaf(id))
            .find(|id| self.flow_eligible(id, cluster, Direction::Forward, &evaluator))
    }

    /// Whether flow may deliver `leaf` when entering from `scope`.
    ///
    /// Nodes below `scope` must be reachable by flow from their parent. The
    /// leaf and every inactive cluster on the path must be visible, not
    /// skipped or disabled, and within its limits.
    fn flow_eligible(
        &self,
        leaf: &str,
        scope: &str,
        direction: Direction,
        evaluator: &RuleEvaluator<'_>,
    ) -> bool {
        let path = self.tree.path_from_root(leaf);
        let scope_depth = path.iter().position(|id| id == scope).unwrap_or(0);

        for (depth, id) in path.iter().enumerate() {
            let Some(activity) = self.tree.find(id) else {
                return false;
            };
            if depth > scope_depth {
                let Some(parent) = self.tree.find(&path[depth - 1]) else {
                    return false;
                };
                if !parent.control_mode().flow {
                    return false;
                }
                if direction == Direction::Backward && parent.control_mode().forward_only {
                    return false;
                }
            }
            // Delivering a leaf always starts a new attempt on it, so only
            // active clusters are exempt.
            if activity.tracking.attempt_active && !activity.is_leaf() {
                continue;
            }
            if depth > 0 && !activity.sequencing.visible {
                return false;
            }
            if evaluator
                .check(
                    id,
                    RulePhase::PreCondition,
                    &[RuleAction::Skip, RuleAction::Disabled],
                )
                .is_some()
            {
                return false;
            }
            if self.limit_violation(activity).is_some() {
                return false;
            }
        }
        true
    }

    // ============================================================
    // Attempts
    // ============================================================

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn evaluator(&self) -> RuleEvaluator<'_> {
        RuleEvaluator::new(&self.tree, &self.globals, self.now())
    }

    pub(crate) fn rollup_from(&mut self, id: &str) {
        let now = self.now();
        RollupEngine::new(&mut self.tree, &mut self.globals, now)
            .with_default_fallback(self.config.default_rollup_fallback)
            .rollup(id);
    }

    fn is_active(&self, id: &str) -> bool {
        self.tree
            .find(id)
            .is_some_and(|a| a.tracking.attempt_active)
    }

    fn is_active_cluster(&self, id: &str) -> bool {
        self.tree
            .find(id)
            .is_some_and(|a| !a.is_leaf() && a.tracking.attempt_active)
    }

    /// Make `target` current, starting attempts on every node of its path
    /// that has none.
    fn deliver(&mut self, target: &str) {
        let now = self.now();
        let mut seeded = Vec::new();
        for id in self.tree.path_from_root(target) {
            let Some(activity) = self.tree.find_mut(&id) else {
                continue;
            };
            activity.tracking.suspended = false;
            if activity.tracking.attempt_active {
                continue;
            }
            activity.tracking.attempt_count += 1;
            activity.tracking.attempt_active = true;
            activity.tracking.attempt_duration = 0.0;
            activity.tracking.attempt_started_at = Some(now);
            if self.globals.seed(activity) {
                seeded.push(id.clone());
            }
            tracing::debug!(
                activity = %id,
                attempt = activity.tracking.attempt_count,
                "Attempt started"
            );
        }
        // Deepest first, so each ancestor sees its seeded children.
        for id in seeded.iter().rev() {
            self.rollup_from(id);
        }
        self.tree.set_suspended_activity(None);
        self.current = Some(target.to_string());
        self.state = SessionState::Active;
    }

    /// End one attempt and roll up from it. No rules are evaluated.
    fn end_attempt(&mut self, id: &str) {
        let now = self.now();
        let Some(activity) = self.tree.find_mut(id) else {
            return;
        };
        if !activity.tracking.attempt_active {
            return;
        }
        pause_timer(activity, now);
        activity.tracking.attempt_active = false;
        activity.tracking.suspended = false;

        if activity.is_leaf() && activity.is_tracked() {
            let controls = activity.sequencing.delivery_controls;
            if !controls.completion_set_by_content
                && activity.tracking.completion_status != CompletionStatus::Completed
            {
                activity.tracking.completion_status = CompletionStatus::Completed;
            }
            if !controls.objective_set_by_content
                && activity.tracking.success_status == SuccessStatus::Unknown
            {
                activity.tracking.success_status = SuccessStatus::Passed;
            }
        }
        tracing::debug!(
            activity = %id,
            duration = activity.tracking.attempt_duration,
            "Attempt ended"
        );
        self.rollup_from(id);
    }

    /// End every active attempt in `id`'s subtree, deepest first.
    fn end_subtree(&mut self, id: &str) {
        for descendant in self.tree.subtree_ids(id).iter().rev() {
            self.end_attempt(descendant);
        }
    }

    /// End active attempts that are not on the path to `target`.
    fn end_off_path(&mut self, target: &str) {
        let keep: HashSet<String> = self.tree.path_from_root(target).into_iter().collect();
        let order = self.tree.preorder().to_vec();
        for id in order.iter().rev() {
            if !keep.contains(id) {
                self.end_attempt(id);
            }
        }
    }

    fn end_all_attempts(&mut self) {
        let root = self.tree.root_id().to_string();
        self.end_subtree(&root);
    }

    /// End attempts from the current activity up to and including `ancestor`,
    /// which becomes current.
    fn exit_to(&mut self, ancestor: &str) {
        let Some(current) = self.current.clone() else {
            return;
        };
        self.end_subtree(&current);
        for id in self.tree.path_from_root(&current).iter().rev() {
            self.end_attempt(id);
            if id == ancestor {
                break;
            }
        }
        self.current = Some(ancestor.to_string());
    }

    fn end_session(&mut self) {
        self.end_all_attempts();
        self.tree.set_suspended_activity(None);
        self.current = None;
        self.state = SessionState::Ended;
        tracing::info!("Session ended");
    }

    fn finish_if_root_exited(&mut self) {
        let root = self.tree.root_id().to_string();
        if self.current.as_deref() == Some(root.as_str()) && !self.is_active(&root) {
            self.end_session();
        }
    }

    // ============================================================
    // Termination
    // ============================================================

    /// End the current attempt and, if asked, run exit and post-condition rules.
    fn terminate_current(&mut self, run_rules: bool) -> Redirect {
        let Some(current) = self.current.clone() else {
            return Redirect::None;
        };
        if !self.is_active(&current) {
            return Redirect::None;
        }
        self.end_subtree(&current);
        if !run_rules {
            return Redirect::None;
        }
        if self.exit_rules(&current) == Redirect::ExitAll {
            return Redirect::ExitAll;
        }
        self.post_conditions()
    }

    /// Exit rules of the current activity's ancestors, outermost first.
    fn exit_rules(&mut self, current: &str) -> Redirect {
        let mut ancestors = self.tree.path_from_root(current);
        ancestors.pop();

        for ancestor in ancestors {
            let action = self.evaluator().evaluate(&ancestor, RulePhase::Exit);
            match action {
                Some(RuleAction::ExitAll) => return Redirect::ExitAll,
                Some(RuleAction::Exit) => {
                    self.exit_to(&ancestor);
                    return Redirect::None;
                }
                Some(RuleAction::ExitParent) => {
                    let target = self
                        .tree
                        .find(&ancestor)
                        .and_then(|a| a.parent.clone())
                        .unwrap_or(ancestor);
                    self.exit_to(&target);
                    return Redirect::None;
                }
                _ => {}
            }
        }
        Redirect::None
    }

    /// Post-condition rules of the current activity. `exitParent` climbs and
    /// re-evaluates on the parent; any other action is returned.
    fn post_conditions(&mut self) -> Redirect {
        loop {
            let Some(current) = self.current.clone() else {
                return Redirect::None;
            };
            let action = self.evaluator().evaluate(&current, RulePhase::PostCondition);
            match action {
                Some(RuleAction::ExitParent) => {
                    match self.tree.find(&current).and_then(|a| a.parent.clone()) {
                        Some(parent) => self.exit_to(&parent),
                        None => return Redirect::ExitAll,
                    }
                }
                Some(RuleAction::ExitAll) => return Redirect::ExitAll,
                Some(RuleAction::Retry) => return Redirect::Retry,
                Some(RuleAction::RetryAll) => return Redirect::RetryAll,
                Some(RuleAction::Continue) => return Redirect::Continue,
                Some(RuleAction::Previous) => return Redirect::Previous,
                _ => return Redirect::None,
            }
        }
    }

    fn follow(&mut self, redirect: Redirect) -> Result<Option<String>> {
        match redirect {
            Redirect::None => {
                self.finish_if_root_exited();
                Ok(self.current.clone())
            }
            Redirect::ExitAll => {
                self.end_session();
                Ok(None)
            }
            Redirect::Continue => self.flow_after_termination(Direction::Forward),
            Redirect::Previous => self.flow_after_termination(Direction::Backward),
            Redirect::Retry => self.retry_after_termination(),
            Redirect::RetryAll => match self.retry_all() {
                Ok(target) => Ok(target),
                Err(e) => {
                    tracing::warn!(error = %e, "Rule-requested retryAll not possible");
                    self.follow(Redirect::None)
                }
            },
        }
    }

    /// Move on by flow once the current attempt has ended. When nothing
    /// follows, the learner stays on the ended activity.
    fn flow_after_termination(&mut self, direction: Direction) -> Result<Option<String>> {
        let Some(current) = self.current.clone() else {
            return Ok(None);
        };
        match self.flow_target(&current, direction) {
            Some(target) => {
                self.end_off_path(&target);
                self.deliver(&target);
                Ok(Some(target))
            }
            None => {
                tracing::debug!(activity = %current, "No flow target after termination");
                self.follow(Redirect::None)
            }
        }
    }

    /// Retry requested by a post-condition rule on an ended attempt.
    fn retry_after_termination(&mut self) -> Result<Option<String>> {
        let Some(current) = self.current.clone() else {
            return Ok(None);
        };
        let violation = self.tree.find(&current).and_then(|a| self.limit_violation(a));
        if let Some(violation) = violation {
            tracing::warn!(
                activity = %current,
                reason = violation.as_str(),
                "Rule-requested retry not possible"
            );
            return self.follow(Redirect::None);
        }
        self.end_subtree(&current);
        self.tree.reset_subtree(&current);
        self.rollup_from(&current);
        self.deliver(&current);
        Ok(Some(current))
    }

    // ============================================================
    // Available navigation
    // ============================================================

    /// Recompute the available-navigation vector from the current state.
    pub(crate) fn refresh_navigation(&mut self) {
        self.available = self.compute_navigation();
    }

    fn compute_navigation(&self) -> AvailableNavigation {
        let mut available = AvailableNavigation::default();
        match self.state {
            SessionState::NotStarted => {
                let root = self.tree.root_id();
                available.start = (self.tree.is_leaf(root)
                    || self.tree.find(root).is_some_and(|r| r.control_mode().flow))
                    && self.first_flow_leaf(root).is_some();
            }
            SessionState::Suspended => {
                available.resume_all = self.tree.suspended_activity().is_some();
            }
            SessionState::Active => {
                if let Some(current) = self.current.as_deref() {
                    available.continue_ = self.check_flow_from(current, Direction::Forward).is_ok();
                    available.previous = self.check_flow_from(current, Direction::Backward).is_ok();
                    available.suspend_all = true;
                }
                available.exit = true;
            }
            SessionState::Ended => {}
        }

        if matches!(self.state, SessionState::NotStarted | SessionState::Active) {
            available.choice_targets = self
                .tree
                .preorder()
                .iter()
                .filter(|id| self.current.as_deref() != Some(id.as_str()))
                .filter(|id| self.validate_choice(id).is_ok())
                .cloned()
                .collect();
        }
        available.choice = !available.choice_targets.is_empty();
        available
    }
}

/// Fold time running since the attempt (re)started into the durations.
fn pause_timer(activity: &mut Activity, now: DateTime<Utc>) {
    if let Some(started) = activity.tracking.attempt_started_at.take() {
        let elapsed = (now - started).num_milliseconds().max(0) as f64 / 1000.0;
        activity.tracking.attempt_duration += elapsed;
        activity.tracking.activity_duration += elapsed;
    }
}
