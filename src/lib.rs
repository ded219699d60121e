//! Sequencing and navigation engine for testing packaged e-learning courses.
//!
//! Load a course with [`SequencingSession::new`], drive it with
//! [`NavigationRequest`]s and progress updates, and read back a
//! [`SequencingSnapshot`] after every step.

pub mod config;
pub mod error;
pub mod models;
pub mod registry;
pub mod sequencing;
pub mod session;

pub use config::EngineConfig;
pub use error::{Result, SequencingError};
pub use models::{NavigationRequest, NavigationResult, SequencingSnapshot};
pub use registry::SessionRegistry;
pub use session::SequencingSession;
