//! Domain models for the course tester.
//!
//! # Core Concepts
//!
//! ## Declared (immutable after load)
//!
//! - [`ActivityDescriptor`]: One node of the parsed manifest, handed to the engine
//!   with its children in document order.
//! - [`SequencingDefinition`]: Control modes, sequencing rules, rollup rules, limit
//!   conditions and objective declarations of an activity.
//!
//! ## Tracked (mutable, owned by the activity tree)
//!
//! - [`TrackingState`]: Attempt counters, completion/success status, measures,
//!   location bookmark and accumulated durations.
//! - [`ObjectiveState`]: Satisfied flag and normalized measure, used both for local
//!   objectives and for the global objective buckets.
//!
//! ## Session surface
//!
//! - [`NavigationRequest`] / [`NavigationResult`]: What the host asks for and what
//!   the engine answers.
//! - [`SequencingSnapshot`]: Read-only view of the session the host is allowed to
//!   rely on.

mod activity;
mod navigation;
mod objective;
mod rules;

pub use activity::*;
pub use navigation::*;
pub use objective::*;
pub use rules::*;

pub(crate) fn default_true() -> bool {
    true
}

pub(crate) fn default_weight() -> f64 {
    1.0
}
