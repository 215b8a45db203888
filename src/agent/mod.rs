//! Agents: produce the next action text from a rollout conversation.
//!
//! The [`Agent`] trait is the only interface the evaluator relies on. It is
//! implemented by the HTTP [`ApiAgent`] and by the fixed-response
//! [`ScriptedAgent`] used for offline runs and tests.

pub mod api;
pub mod scripted;

pub use api::ApiAgent;
pub use scripted::ScriptedAgent;

use crate::conversation::ConversationMessage;
use crate::error::Result;

/// Anything that can answer a conversation with one action text.
///
/// Agents hold no environment state; the full conversation is passed on
/// every call.
#[allow(async_fn_in_trait)]
pub trait Agent: Send + Sync {
    async fn generate(&self, conversation: &[ConversationMessage]) -> Result<String>;
}
