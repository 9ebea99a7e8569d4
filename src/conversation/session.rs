//! Session store - independent conversations keyed by session id
//!
//! Each conversation sits behind its own lock. A dispatch that finds the lock
//! taken is refused instead of queued, so one conversation never has two
//! stages running at once while separate conversations proceed in parallel.

use super::orchestrator::{Event, Orchestrator, StepOutcome};
use super::state::{ConversationState, Rejection};
use dashmap::DashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

#[derive(Default)]
pub struct SessionStore {
    sessions: DashMap<Uuid, Arc<Mutex<ConversationState>>>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("unknown session {0}")]
    UnknownSession(Uuid),
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a fresh conversation and returns its id.
    pub fn create(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.sessions
            .insert(id, Arc::new(Mutex::new(ConversationState::new())));
        debug!(session = %id, "session created");
        id
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn remove(&self, id: &Uuid) -> bool {
        self.sessions.remove(id).is_some()
    }

    fn handle(&self, id: &Uuid) -> Result<Arc<Mutex<ConversationState>>, DispatchError> {
        // Clone the Arc so no map guard is held across an await.
        self.sessions
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(DispatchError::UnknownSession(*id))
    }

    /// Copy of the conversation, or `None` while a step is running on it.
    pub fn snapshot(&self, id: &Uuid) -> Result<Option<ConversationState>, DispatchError> {
        let handle = self.handle(id)?;
        let snapshot = handle.try_lock().ok().map(|state| state.clone());
        Ok(snapshot)
    }

    pub async fn dispatch(
        &self,
        orchestrator: &Orchestrator,
        id: &Uuid,
        event: Event,
    ) -> Result<StepOutcome, DispatchError> {
        let handle = self.handle(id)?;
        let Ok(mut state) = handle.try_lock() else {
            debug!(session = %id, "dispatch refused, step in flight");
            return Ok(StepOutcome::Rejected(Rejection::Busy));
        };
        Ok(orchestrator.apply(&mut state, event).await)
    }
}
