//! BabyAI grid-world environment.
//!
//! The agent navigates rooms, opens doors and picks up objects through a
//! small textual action vocabulary. Responses must contain exactly one
//! `Action:` line; the reported reward is the server's `score`.

use serde::Deserialize;
use tracing::debug;

use crate::conversation::{ConversationMessage, StepOutput};
use crate::error::Result;

use super::action::{MarkedActionParser, ParsedAction, MISSING_ACTION_MESSAGE, MULTIPLE_ACTIONS_MESSAGE};
use super::server::{decode, EnvServer};
use super::session::{SessionMap, SessionState};
use super::traits::{EnvClient, EnvSettings, SessionId};

const INSTRUCTION: &str = "You are an exploration master that wants to finish every goal you are given. Every round I will give you an observation, and you have to respond an action and your thought based on the observation to finish the given task. You are placed in a room and you need to accomplish the given goal with actions.\n\nYou can use the following actions: \n\n- turn right \n\n- turn left \n\n- move forward \n\n- go to <obj> <id> \n\n- pick up <obj> <id> \n\n- go through <door> <id>: <door> must be an open door. \n\n- toggle and go through <door> <id>: <door> can be a closed door or a locked door. If you want to open a locked door, you need to carry a key that is of the same color as the locked door. \n\n- toggle: there is a closed or locked door right in front of you and you can toggle it.\nYour response should use the following format:\nThought:\n<Your Thought>\n\nAction:\n<Your Action>";

const ACKNOWLEDGEMENT: &str =
    "OK. I'll follow your instructions and try my best to solve the task.";

/// The JSON shape returned by `/reset` and `/step`.
#[derive(Debug, Deserialize)]
struct ServerResponse {
    observation: String,
    #[serde(default)]
    reward: f64,
    #[serde(default)]
    score: f64,
    #[serde(default)]
    done: bool,
}

impl ServerResponse {
    fn into_state(self) -> SessionState {
        SessionState {
            observation: Some(self.observation),
            reward: self.reward,
            score: self.score,
            done: self.done,
            available_actions: Vec::new(),
        }
    }
}

/// HTTP adapter for a BabyAI environment server.
#[derive(Debug)]
pub struct BabyAiClient {
    server: EnvServer,
    sessions: SessionMap,
    parser: MarkedActionParser,
    data_len: usize,
    conversation_start: Vec<ConversationMessage>,
}

impl BabyAiClient {
    pub fn new(settings: &EnvSettings) -> Result<Self> {
        Ok(Self {
            server: EnvServer::new(settings, "id")?,
            sessions: SessionMap::new(),
            parser: MarkedActionParser::standard()?,
            data_len: settings.data_len,
            conversation_start: vec![
                ConversationMessage::human(INSTRUCTION),
                ConversationMessage::agent_scaffold(ACKNOWLEDGEMENT),
            ],
        })
    }
}

impl EnvClient for BabyAiClient {
    fn name(&self) -> &str {
        "babyai"
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
            .post("reset", serde_json::json!({ "data_idx": data_idx }), session)
            .await?;
        let resp: ServerResponse = decode("POST /reset", &raw)?;
        self.sessions.record(session, resp.into_state())?;

        debug!(session = %session, data_idx, "BabyAI session reset");
        Ok(raw)
    }

    async fn step(&mut self, session: &SessionId, action_text: &str) -> Result<StepOutput> {
        self.sessions.ensure(session)?;
        let action = match self.parser.parse(action_text) {
            ParsedAction::Action(action) => action,
            ParsedAction::Multiple => return Ok(StepOutput::feedback(MULTIPLE_ACTIONS_MESSAGE)),
            ParsedAction::Missing => return Ok(StepOutput::feedback(MISSING_ACTION_MESSAGE)),
        };

        let raw = self
            .server
            .post("step", serde_json::json!({ "action": action }), session)
            .await?;
        let resp: ServerResponse = decode("POST /step", &raw)?;

        let output = StepOutput {
            state: resp.observation.clone(),
            reward: resp.score,
            done: resp.done,
        };
        self.sessions.record(session, resp.into_state())?;
        Ok(output)
    }

    async fn close(&mut self, session: &SessionId) {
        if let Err(e) = self.server.close(session).await {
            debug!(session = %session, error = %e, "ignoring BabyAI close failure");
        }
        self.sessions.remove(session);
    }
}
