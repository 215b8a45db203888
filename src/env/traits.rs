//! Core environment-client trait and shared types.
//!
//! Every remote environment (BabyAI, SciWorld, WebShop, ...) is driven through
//! an adapter implementing [`EnvClient`], so the task pool and the evaluator
//! can treat them uniformly.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::conversation::{ConversationMessage, StepOutput};
use crate::error::Result;

// ---------------------------------------------------------------------------
// Session identifiers
// ---------------------------------------------------------------------------

/// Opaque session token issued by an environment server.
///
/// Servers hand out either integers or strings; the original JSON type is kept
/// so the id is echoed back exactly as it was issued.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SessionId {
    Num(u64),
    Text(String),
}

impl SessionId {
    /// Interpret a JSON value as a session id.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Number(n) => n.as_u64().map(Self::Num),
            serde_json::Value::String(s) => Some(Self::Text(s.clone())),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Num(n) => serde_json::Value::from(*n),
            Self::Text(s) => serde_json::Value::from(s.as_str()),
        }
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Num(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

// ---------------------------------------------------------------------------
// Client construction arguments
// ---------------------------------------------------------------------------

/// Arguments shared by every adapter in a pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvSettings {
    /// Base URL of the environment server (e.g. `http://localhost:8000`).
    pub env_server_base: String,
    /// Number of addressable dataset items.
    pub data_len: usize,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl EnvSettings {
    pub fn new(env_server_base: impl Into<String>, data_len: usize, timeout_secs: u64) -> Self {
        Self {
            env_server_base: env_server_base.into(),
            data_len,
            timeout_secs,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// ---------------------------------------------------------------------------
// The client trait
// ---------------------------------------------------------------------------

/// Capability set every environment adapter provides.
///
/// `create`, `reset`, `step` and `close` are network round trips to the
/// environment server; `observe` and `len` are answered locally from the
/// adapter's session cache.
#[allow(async_fn_in_trait)]
pub trait EnvClient: Send + Sync {
    /// Registry key of the environment (e.g. `"babyai"`).
    fn name(&self) -> &str;

    /// Number of addressable dataset items. Constant after construction.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Priming turns (instruction + acknowledgement) placed before the first
    /// observation. They are not counted as rounds.
    fn conversation_start(&self) -> &[ConversationMessage];

    /// Last known observation for `session`, or an empty string.
    fn observe(&self, session: &SessionId) -> String;

    /// Request a new session from the server and register it locally.
    async fn create(&mut self) -> Result<SessionId>;

    /// Re-initialise `session` against dataset item `data_idx`.
    ///
    /// Returns the raw server response for callers that need extra fields.
    async fn reset(&mut self, session: &SessionId, data_idx: usize) -> Result<serde_json::Value>;

    /// Parse `action_text`, apply it, and report the outcome.
    async fn step(&mut self, session: &SessionId, action_text: &str) -> Result<StepOutput>;

    /// Best-effort release of `session`. Local bookkeeping is always dropped
    /// and failures never propagate.
    async fn close(&mut self, session: &SessionId);

    /// Whether a rollout that ended with `last` counts as solved.
    fn is_success(&self, last: &StepOutput) -> bool {
        last.done
    }
}
