//! Per-client cache of the last server response for every live session.
//!
//! The cache is owned by exactly one adapter. Entries appear on `create` and
//! disappear on `close`; there is no other eviction.

use std::collections::HashMap;

use crate::error::{HarnessError, Result};

use super::traits::SessionId;

/// Cached fields of the most recent `reset`/`step` response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    /// `None` until the first observation is recorded.
    pub observation: Option<String>,
    pub reward: f64,
    pub score: f64,
    pub done: bool,
    /// Legal actions, for servers that enumerate them.
    pub available_actions: Vec<String>,
}

impl SessionState {
    pub fn with_observation(observation: impl Into<String>) -> Self {
        Self {
            observation: Some(observation.into()),
            ..Self::default()
        }
    }
}

/// Map from session id to cached state.
#[derive(Debug, Default)]
pub struct SessionMap {
    sessions: HashMap<SessionId, SessionState>,
}

impl SessionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly created session with empty state.
    pub fn register(&mut self, id: SessionId) {
        self.sessions.entry(id).or_default();
    }

    /// Register a session whose create response already carried state.
    pub fn register_with(&mut self, id: SessionId, state: SessionState) {
        self.sessions.insert(id, state);
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.contains_key(id)
    }

    /// Fail unless `id` is live on this client.
    pub fn ensure(&self, id: &SessionId) -> Result<()> {
        if self.contains(id) {
            Ok(())
        } else {
            Err(HarnessError::UnknownSession(id.clone()))
        }
    }

    pub fn get(&self, id: &SessionId) -> Option<&SessionState> {
        self.sessions.get(id)
    }

    /// Replace the cached state of a live session.
    pub fn record(&mut self, id: &SessionId, state: SessionState) -> Result<()> {
        match self.sessions.get_mut(id) {
            Some(slot) => {
                *slot = state;
                Ok(())
            }
            None => Err(HarnessError::UnknownSession(id.clone())),
        }
    }

    /// The cached observation, or an empty string.
    pub fn observation(&self, id: &SessionId) -> String {
        self.sessions
            .get(id)
            .and_then(|s| s.observation.clone())
            .unwrap_or_default()
    }

    pub fn remove(&mut self, id: &SessionId) -> Option<SessionState> {
        self.sessions.remove(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
