use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::{Result, SequencingError};
use crate::models::*;
use crate::sequencing::Clock;
use crate::session::SequencingSession;

/// Open sessions keyed by id.
///
/// Cloning shares the underlying map. Each call locks the map for the
/// duration of one operation, so requests against a session are serialized.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<Mutex<HashMap<Uuid, SequencingSession>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a course into a new session with the default configuration.
    pub fn open(&self, course: &ActivityDescriptor) -> Result<Uuid> {
        self.insert(SequencingSession::new(course)?)
    }

    pub fn open_with(
        &self,
        course: &ActivityDescriptor,
        config: EngineConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Uuid> {
        self.insert(SequencingSession::with_config(course, config, clock)?)
    }

    fn insert(&self, session: SequencingSession) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let mut sessions = self.sessions.lock().expect("session registry lock poisoned");
        sessions.insert(id, session);
        tracing::info!(session = %id, "Session opened");
        Ok(id)
    }

    /// Drop a session. Returns whether it existed.
    pub fn close(&self, id: Uuid) -> bool {
        let mut sessions = self.sessions.lock().expect("session registry lock poisoned");
        let removed = sessions.remove(&id).is_some();
        if removed {
            tracing::info!(session = %id, "Session closed");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().expect("session registry lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.sessions
            .lock()
            .expect("session registry lock poisoned")
            .contains_key(&id)
    }

    pub fn process_navigation(&self, id: Uuid, request: &NavigationRequest) -> Result<NavigationResult> {
        self.with_session(id, |session| Ok(session.process_navigation(request)))
    }

    pub fn notify(
        &self,
        id: Uuid,
        notification: RuntimeNotification,
    ) -> Result<Option<NavigationResult>> {
        self.with_session(id, |session| session.apply_notification(notification))
    }

    pub fn update_activity_progress(
        &self,
        id: Uuid,
        activity_id: &str,
        progress: ActivityProgress,
    ) -> Result<()> {
        self.with_session(id, |session| session.update_activity_progress(activity_id, progress))
    }

    pub fn snapshot(&self, id: Uuid) -> Result<SequencingSnapshot> {
        self.with_session(id, |session| Ok(session.get_sequencing_state()))
    }

    /// Run `f` against one session while holding the registry lock.
    pub fn with_session<T>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut SequencingSession) -> Result<T>,
    ) -> Result<T> {
        let mut sessions = self.sessions.lock().expect("session registry lock poisoned");
        let session = sessions
            .get_mut(&id)
            .ok_or(SequencingError::SessionNotFound(id))?;
        f(session)
    }
}
