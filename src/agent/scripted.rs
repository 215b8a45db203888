//! Fixed-response agent for offline runs and tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::conversation::ConversationMessage;
use crate::error::{HarnessError, Result};

use super::Agent;

/// Response used by `--offline` runs.
pub const DEFAULT_OFFLINE_RESPONSE: &str = "Thought:\nI should look around first.\n\nAction:\nlook";

/// Replays `responses` in order, repeating the last one once exhausted.
///
/// The last conversation turn seen on every call is recorded so tests can
/// check what the agent was shown.
#[derive(Debug)]
pub struct ScriptedAgent {
    responses: Vec<String>,
    calls: AtomicUsize,
    seen: Mutex<Vec<String>>,
}

impl ScriptedAgent {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: responses.into_iter().map(Into::into).collect(),
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Always answer with `response`.
    pub fn repeating(response: impl Into<String>) -> Self {
        Self::new([response.into()])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Last turn of every conversation passed to `generate`, in call order.
    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl Default for ScriptedAgent {
    fn default() -> Self {
        Self::repeating(DEFAULT_OFFLINE_RESPONSE)
    }
}

impl Agent for ScriptedAgent {
    async fn generate(&self, conversation: &[ConversationMessage]) -> Result<String> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if let (Some(last), Ok(mut seen)) = (conversation.last(), self.seen.lock()) {
            seen.push(last.text().to_string());
        }

        let idx = call.min(self.responses.len().saturating_sub(1));
        self.responses
            .get(idx)
            .cloned()
            .ok_or_else(|| HarnessError::Agent("scripted agent has no responses".into()))
    }
}
