//! WebShop: goal-directed product search on a simulated storefront.
//!
//! The server keys sessions by `env_idx`, hands out bare ids from `/create`
//! and answers 503 while it is busy. After a reset the first page is fetched
//! from `GET /observation`; later pages come back in the step response.

use serde::Deserialize;
use tracing::debug;

use crate::conversation::{ConversationMessage, StepOutput};
use crate::error::Result;

use super::action::{parse_react, strip_eos, INVALID_ACTION_PREFIX};
use super::server::{decode, EnvServer};
use super::session::{SessionMap, SessionState};
use super::traits::{EnvClient, EnvSettings, SessionId};

const INSTRUCTION: &str = "You are web shopping.\nI will give you instructions about what to do.\nYou have to follow the instructions.\nEvery round I will give you an observation and a list of available actions, you have to respond an action based on the state and instruction.\nYou can use search action if search is available.\nYou can click one of the buttons in clickables.\nAn action should be of the following structure:\nsearch[keywords]\nclick[value]\nIf the action is not valid, perform nothing.\nKeywords in search are up to you, but the value in click must be a value in the list of available actions.\nRemember that your keywords in search should be carefully designed.\nYour response should use the following format:\n\nThought:\nI think ... \n\nAction: \nclick[something]";

const ACKNOWLEDGEMENT: &str = "Ok.";

/// Attempts beyond the first while the server answers 503.
const BUSY_RETRIES: u32 = 4;

#[derive(Debug, Deserialize)]
struct StepResponse {
    state: String,
    #[serde(default)]
    reward: f64,
    #[serde(default)]
    done: bool,
}

/// `GET /observation` answers with a bare JSON string on current servers and
/// with `{"observation": ...}` on some forks.
fn observation_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other
            .get("observation")
            .and_then(|o| o.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| other.to_string()),
    }
}

/// HTTP adapter for a WebShop environment server.
#[derive(Debug)]
pub struct WebShopClient {
    server: EnvServer,
    sessions: SessionMap,
    data_len: usize,
    conversation_start: Vec<ConversationMessage>,
}

impl WebShopClient {
    pub fn new(settings: &EnvSettings) -> Result<Self> {
        Ok(Self {
            server: EnvServer::new(settings, "env_idx")?.with_busy_retries(BUSY_RETRIES),
            sessions: SessionMap::new(),
            data_len: settings.data_len,
            conversation_start: vec![
                ConversationMessage::human(INSTRUCTION),
                ConversationMessage::agent_scaffold(ACKNOWLEDGEMENT),
            ],
        })
    }
}

impl EnvClient for WebShopClient {
    fn name(&self) -> &str {
        "webshop"
    }

    fn len(&self) -> usize {
        self.data_len
    }

    fn conversation_start(&self) -> &[ConversationMessage] {
        &self.conversation_start
    }

    fn observe(&self, session: &SessionId) -> String {
        self.sessions.observation(session)
    }

    async fn create(&mut self) -> Result<SessionId> {
        let (id, _) = self.server.create(None).await?;
        self.sessions.register(id.clone());
        Ok(id)
    }

    async fn reset(&mut self, session: &SessionId, data_idx: usize) -> Result<serde_json::Value> {
        self.sessions.ensure(session)?;
        let raw = self
            .server
            .post("reset", serde_json::json!({ "session_id": data_idx }), session)
            .await?;

        let page = self.server.get("observation", session).await?;
        self.sessions
            .record(session, SessionState::with_observation(observation_text(&page)))?;

        debug!(session = %session, data_idx, "WebShop session reset");
        Ok(raw)
    }

    async fn step(&mut self, session: &SessionId, action_text: &str) -> Result<StepOutput> {
        self.sessions.ensure(session)?;
        let parsed = parse_react(strip_eos(action_text));
        if parsed.action.is_empty() {
            return Ok(StepOutput::feedback(format!(
                "{INVALID_ACTION_PREFIX}{}",
                self.observe(session)
            )));
        }

        let raw = self
            .server
            .post("step", serde_json::json!({ "action": parsed.action }), session)
            .await?;
        let resp: StepResponse = decode("POST /step", &raw)?;

        self.sessions.record(
            session,
            SessionState {
                observation: Some(resp.state.clone()),
                reward: resp.reward,
                score: resp.reward,
                done: resp.done,
                available_actions: Vec::new(),
            },
        )?;

        Ok(StepOutput {
            state: resp.state,
            reward: resp.reward,
            done: resp.done,
        })
    }

    /// A purchase only counts when it matched every attribute (reward 1.0).
    fn is_success(&self, last: &StepOutput) -> bool {
        last.done && last.reward >= 1.0
    }

    async fn close(&mut self, session: &SessionId) {
        if let Err(e) = self.server.close(session).await {
            debug!(session = %session, error = %e, "ignoring WebShop close failure");
        }
        self.sessions.remove(session);
    }
}
