//! The sequencing engine.
//!
//! - [`tree`]: Flat arena of activities in document order
//! - [`rules`]: Pre-condition, post-condition and exit rule evaluation
//! - [`rollup`]: Bottom-up status propagation
//! - [`objectives`]: Objectives shared across activities by global id
//! - [`limits`]: Attempt, duration and time window limits
//! - `navigation`: The request processor, implemented on
//!   [`SequencingSession`](crate::session::SequencingSession)

mod clock;
pub mod limits;
mod navigation;
pub mod objectives;
pub mod rollup;
pub mod rules;
pub mod tree;

pub use clock::{Clock, FixedClock, SystemClock};
pub use limits::LimitViolation;
pub use objectives::GlobalObjectiveMap;
pub use rollup::RollupEngine;
pub use rules::RuleEvaluator;
pub use tree::ActivityTree;
