use serde::{Deserialize, Serialize};

use super::default_true;

/// Satisfied flag and normalized measure of an objective.
///
/// Both fields are optional: `None` means the value is unknown, which is
/// distinct from "not satisfied".
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectiveState {
    pub satisfied: Option<bool>,
    pub measure: Option<f64>,
}

impl ObjectiveState {
    pub fn satisfied(satisfied: bool) -> Self {
        Self {
            satisfied: Some(satisfied),
            measure: None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.satisfied.is_none() && self.measure.is_none()
    }
}

/// An objective declared by an activity.
///
/// At most one objective per activity is `primary`; it mirrors the activity's
/// success status and measure. A `global_id` shares the objective with every
/// other activity that declares the same id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectiveDeclaration {
    pub id: String,
    #[serde(default)]
    pub primary: bool,
    /// Derive satisfaction from the measure instead of the reported status.
    #[serde(default)]
    pub satisfied_by_measure: bool,
    #[serde(default = "default_min_measure")]
    pub min_normalized_measure: f64,
    #[serde(default)]
    pub global_id: Option<String>,
    #[serde(default = "default_true")]
    pub read_satisfied: bool,
    #[serde(default = "default_true")]
    pub read_measure: bool,
    #[serde(default = "default_true")]
    pub write_satisfied: bool,
    #[serde(default = "default_true")]
    pub write_measure: bool,
}

fn default_min_measure() -> f64 {
    1.0
}

impl ObjectiveDeclaration {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            primary: false,
            satisfied_by_measure: false,
            min_normalized_measure: default_min_measure(),
            global_id: None,
            read_satisfied: true,
            read_measure: true,
            write_satisfied: true,
            write_measure: true,
        }
    }

    pub fn primary(id: impl Into<String>) -> Self {
        Self {
            primary: true,
            ..Self::new(id)
        }
    }

    pub fn shared(mut self, global_id: impl Into<String>) -> Self {
        self.global_id = Some(global_id.into());
        self
    }

    pub fn satisfied_by_measure(mut self, min_normalized_measure: f64) -> Self {
        self.satisfied_by_measure = true;
        self.min_normalized_measure = min_normalized_measure;
        self
    }
}
