//! Conversation records exchanged between the evaluator, the agent and the
//! environment adapters.
//!
//! These are plain data: a rollout is an ordered `Vec<ConversationMessage>`
//! and every environment step yields one [`StepOutput`].

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// Who authored a conversation turn.
///
/// Serialized as `"human"` / `"gpt"` to stay compatible with the experience
/// files consumed by fine-tuning tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "human")]
    Human,
    #[serde(rename = "gpt")]
    Agent,
}

/// One turn of a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    #[serde(rename = "from")]
    role: Role,
    /// Whether a learning consumer should train on this turn. `None` for
    /// environment-authored turns.
    #[serde(rename = "loss")]
    loss_mask: Option<bool>,
    #[serde(rename = "value")]
    text: String,
}

impl ConversationMessage {
    pub fn new(role: Role, loss_mask: Option<bool>, text: impl Into<String>) -> Self {
        Self {
            role,
            loss_mask,
            text: text.into(),
        }
    }

    /// An environment/human turn (no loss flag).
    pub fn human(text: impl Into<String>) -> Self {
        Self::new(Role::Human, None, text)
    }

    /// A model-generated turn that a learner should train on.
    pub fn agent(text: impl Into<String>) -> Self {
        Self::new(Role::Agent, Some(true), text)
    }

    /// A scripted agent turn used as prompt scaffolding.
    pub fn agent_scaffold(text: impl Into<String>) -> Self {
        Self::new(Role::Agent, Some(false), text)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn loss_mask(&self) -> Option<bool> {
        self.loss_mask
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

// ---------------------------------------------------------------------------
// Step output
// ---------------------------------------------------------------------------

/// Result of applying one action to one environment session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutput {
    /// The textual state shown to the agent next.
    pub state: String,
    /// The reported reward (the environment's *score* for score-based adapters).
    pub reward: f64,
    /// Whether the episode has terminated.
    pub done: bool,
}

impl StepOutput {
    /// An in-band, non-terminal message that costs the agent a round but no
    /// reward, e.g. a format complaint.
    pub fn feedback(state: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            reward: 0.0,
            done: false,
        }
    }
}

/// Thought and action split out of a ReAct-style response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionWithThought {
    pub thought: String,
    pub action: String,
}
