//! Global objective map: objectives shared across activities by identifier.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::{Activity, ObjectiveState};

/// Plain key → value store with last-write-wins semantics.
///
/// Written by rollup whenever a local objective mapped to a global id changes;
/// read by rule evaluation and when an activity is (re)activated.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GlobalObjectiveMap {
    objectives: BTreeMap<String, ObjectiveState>,
}

impl GlobalObjectiveMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state of a shared objective; unknown if never written.
    pub fn read(&self, shared_id: &str) -> ObjectiveState {
        self.objectives.get(shared_id).copied().unwrap_or_default()
    }

    pub fn write(&mut self, shared_id: &str, state: ObjectiveState) {
        tracing::debug!(
            shared_id,
            satisfied = ?state.satisfied,
            measure = ?state.measure,
            "Global objective written"
        );
        self.objectives.insert(shared_id.to_string(), state);
    }

    pub fn len(&self) -> usize {
        self.objectives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objectives.is_empty()
    }

    /// The state of an activity's objective as sequencing sees it: the local
    /// value, overridden by the mapped global value where the mapping reads it,
    /// with satisfaction derived from the measure when so declared.
    ///
    /// `objective_id` of `None` means the primary objective.
    pub fn effective(&self, activity: &Activity, objective_id: Option<&str>) -> ObjectiveState {
        let mut state = activity.local_objective(objective_id);
        let Some(declaration) = activity.objective(objective_id) else {
            return state;
        };

        if let Some(global_id) = &declaration.global_id {
            let global = self.read(global_id);
            if declaration.read_satisfied && global.satisfied.is_some() {
                state.satisfied = global.satisfied;
            }
            if declaration.read_measure && global.measure.is_some() {
                state.measure = global.measure;
            }
        }

        if declaration.satisfied_by_measure {
            if let Some(measure) = state.measure {
                state.satisfied = Some(measure >= declaration.min_normalized_measure);
            }
        }

        state
    }

    /// Push an activity's local objectives to the global buckets they map to.
    /// Only known values are written. Returns the ids of the buckets that changed.
    pub fn write_from(&mut self, activity: &Activity) -> Vec<String> {
        let mut changed = Vec::new();
        for declaration in &activity.sequencing.objectives {
            let Some(global_id) = &declaration.global_id else {
                continue;
            };
            let objective_id = Some(declaration.id.as_str());
            let local = activity.local_objective(objective_id);
            let mut global = self.read(global_id);
            let before = global;

            if declaration.write_satisfied && local.satisfied.is_some() {
                global.satisfied = local.satisfied;
            }
            if declaration.write_measure && local.measure.is_some() {
                global.measure = local.measure;
            }

            if global != before {
                self.write(global_id, global);
                changed.push(global_id.clone());
            }
        }
        changed
    }

    /// Whether `activity` reads any of the given buckets.
    pub fn reads_any(activity: &Activity, shared_ids: &[String]) -> bool {
        activity.sequencing.objectives.iter().any(|o| {
            (o.read_satisfied || o.read_measure)
                && o.global_id.as_ref().is_some_and(|g| shared_ids.contains(g))
        })
    }

    /// Seed an activity's local objectives from the global buckets it reads.
    /// Returns whether any local value changed.
    pub fn seed(&self, activity: &mut Activity) -> bool {
        let mut changed = false;
        let declarations = activity.sequencing.objectives.clone();
        for declaration in declarations {
            let Some(global_id) = &declaration.global_id else {
                continue;
            };
            let global = self.read(global_id);
            let objective_id = Some(declaration.id.as_str());
            let mut local = activity.local_objective(objective_id);
            if declaration.read_satisfied && global.satisfied.is_some() {
                local.satisfied = global.satisfied;
            }
            if declaration.read_measure && global.measure.is_some() {
                local.measure = global.measure;
            }
            if local != activity.local_objective(objective_id) {
                activity.set_local_objective(objective_id, local);
                changed = true;
            }
        }
        changed
    }
}
