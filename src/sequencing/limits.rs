//! Limit condition checks.
//!
//! A violated limit disables the activity for the navigation being processed;
//! it never fails a request on its own.

use chrono::{DateTime, Utc};

use crate::models::Activity;

/// Which limit an activity violates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitViolation {
    AttemptLimit,
    AttemptDuration,
    ActivityDuration,
    NotYetAvailable,
    NoLongerAvailable,
}

impl LimitViolation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AttemptLimit => "attempt limit exceeded",
            Self::AttemptDuration => "attempt duration limit exceeded",
            Self::ActivityDuration => "activity duration limit exceeded",
            Self::NotYetAvailable => "before begin time limit",
            Self::NoLongerAvailable => "after end time limit",
        }
    }
}

pub fn attempt_limit_exceeded(activity: &Activity) -> bool {
    match activity.sequencing.limit_conditions.attempt_limit {
        Some(limit) if limit > 0 => activity.tracking.attempt_count >= limit,
        _ => false,
    }
}

/// Seconds elapsed in the current attempt, including time still running.
pub fn attempt_elapsed(activity: &Activity, now: DateTime<Utc>) -> f64 {
    let running = activity
        .tracking
        .attempt_started_at
        .map(|started| (now - started).num_milliseconds().max(0) as f64 / 1000.0)
        .unwrap_or(0.0);
    activity.tracking.attempt_duration + running
}

fn running_seconds(activity: &Activity, now: DateTime<Utc>) -> f64 {
    attempt_elapsed(activity, now) - activity.tracking.attempt_duration
}

pub fn time_limit_exceeded(activity: &Activity, now: DateTime<Utc>) -> bool {
    time_limit_violation(activity, now).is_some()
}

fn time_limit_violation(activity: &Activity, now: DateTime<Utc>) -> Option<LimitViolation> {
    let limits = &activity.sequencing.limit_conditions;
    if let Some(limit) = limits.attempt_absolute_duration_limit {
        if attempt_elapsed(activity, now) >= limit {
            return Some(LimitViolation::AttemptDuration);
        }
    }
    if let Some(limit) = limits.activity_absolute_duration_limit {
        if activity.tracking.activity_duration + running_seconds(activity, now) >= limit {
            return Some(LimitViolation::ActivityDuration);
        }
    }
    None
}

pub fn outside_time_range(activity: &Activity, now: DateTime<Utc>) -> bool {
    time_range_violation(activity, now).is_some()
}

fn time_range_violation(activity: &Activity, now: DateTime<Utc>) -> Option<LimitViolation> {
    let limits = &activity.sequencing.limit_conditions;
    if limits.begin_time_limit.is_some_and(|begin| now < begin) {
        return Some(LimitViolation::NotYetAvailable);
    }
    if limits.end_time_limit.is_some_and(|end| now > end) {
        return Some(LimitViolation::NoLongerAvailable);
    }
    None
}

/// First violated limit of an activity that is about to start a new attempt.
pub fn check(activity: &Activity, now: DateTime<Utc>) -> Option<LimitViolation> {
    if attempt_limit_exceeded(activity) {
        return Some(LimitViolation::AttemptLimit);
    }
    // A fresh attempt has no elapsed time yet; only activity-level time counts.
    if let Some(limit) = activity.sequencing.limit_conditions.activity_absolute_duration_limit {
        if activity.tracking.activity_duration >= limit {
            return Some(LimitViolation::ActivityDuration);
        }
    }
    time_range_violation(activity, now)
}
