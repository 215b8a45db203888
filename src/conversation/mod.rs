//! Conversation data model shared by every other module.
//!
//! - [`types::ConversationMessage`] / [`types::Role`] -- one turn of a rollout.
//! - [`types::StepOutput`] -- what an environment step hands back.
//! - [`types::ActionWithThought`] -- a parsed ReAct response.

pub mod types;

pub use types::{ActionWithThought, ConversationMessage, Role, StepOutput};
