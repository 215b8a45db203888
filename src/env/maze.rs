//! LMRL-Gym maze: reach a goal square by moving one cell per turn.
//!
//! Served under `{base}/maze` when the umbrella `lmrlgym` server is used. The
//! rules and a worked example are prepended to the first observation of every
//! game; later observations are the server's own text.

use serde::Deserialize;
use tracing::debug;

use crate::conversation::{ConversationMessage, StepOutput};
use crate::error::Result;

use super::action::{first_action, strip_eos};
use super::server::{decode, EnvServer};
use super::session::{SessionMap, SessionState};
use super::traits::{EnvClient, EnvSettings, SessionId};

const INSTRUCTION: &str = "You are an expert maze solver.";

const ACKNOWLEDGEMENT: &str = "OK. I'll follow your instructions and try my best to solve the task.";

/// Rules shown ahead of the first position report.
pub const RULES: &str = "Your objective is to reach the goal in as few steps as possible. At each step you will be given information about where the goal is, your current position,\nand the walls that surround you. \n\nWhen you move right you increase your y position by 1, when you move down you increase your x position by 1. \n\nHere is an example.\n\n```\nenvironment: The goal is at position 8, 6. Your current position is at position 5, 6. There is a wall above you.\naction: move left\nenvironment: The goal is at position 8, 6. Your current position is at position 5, 5. There are walls above you, below you.\naction: move left\nenvironment: The goal is at position 8, 6. Your current position is at position 5, 4. There are walls above you, below you.\naction: move up\nenvironment: The goal is at position 8, 6. Your current position is at position 5, 4. There are walls above you, below you.\naction: move left\nenvironment: The goal is at position 8, 6. Your current position is at position 5, 3. There are walls to your left, below you.\naction: move down\nenvironment: The goal is at position 8, 6. Your current position is at position 5, 3. There are walls to your left, below you.\naction: move left\nenvironment: The goal is at position 8, 6. Your current position is at position 5, 3. There are walls to your left, below you.\naction: move down\nenvironment: The goal is at position 8, 6. Your current position is at position 5, 3. There are walls to your left, below you.\naction: move left\nenvironment: The goal is at position 8, 6. Your current position is at position 5, 3. There are walls to your left, below you.\naction: move right\nenvironment: The goal is at position 8, 6. Your current position is at position 5, 4. There are walls above you, below you.\naction: move down\nenvironment: The goal is at position 8, 6. Your current position is at position 5, 4. There are walls above you, below you.\naction: move right\nenvironment: The goal is at position 8, 6. Your current position is at position 5, 5. There are walls above you, below you.\naction: move right\nenvironment: The goal is at position 8, 6. Your current position is at position 5, 6. There is a wall above you.\naction: move down\nenvironment: The goal is at position 8, 6. Your current position is at position 6, 6. There are walls to your right, to your left.\naction: move down\nenvironment: The goal is at position 8, 6. Your current position is at position 7, 6. There are walls to your right, to your left.\naction: move right\nenvironment: The goal is at position 8, 6. Your current position is at position 7, 6. There are walls to your right, to your left.\naction: move down\nenvironment: Success\n```\n\nYour possible actions are \"move up\", \"move down\", \"move left\", \"move right\". Formally, your return should be in this format:\nThought:\n<Your Thought>\n\nAction:\n<Your Action>\n\nNow let's start a new game. Return your action and your thought in the format above strictly. Now, make the optimal action given the current environment state:";

#[derive(Debug, Deserialize)]
struct ResetResponse {
    observation: String,
}

#[derive(Debug, Deserialize)]
struct StepResponse {
    observation: String,
    #[serde(default)]
    reward: f64,
    #[serde(default)]
    done: bool,
}

/// HTTP adapter for an LMRL-Gym maze server.
#[derive(Debug)]
pub struct MazeClient {
    server: EnvServer,
    sessions: SessionMap,
    data_len: usize,
    conversation_start: Vec<ConversationMessage>,
}

impl MazeClient {
    pub fn new(settings: &EnvSettings) -> Result<Self> {
        Ok(Self {
            server: EnvServer::new(settings, "id")?,
            sessions: SessionMap::new(),
            data_len: settings.data_len,
            conversation_start: vec![
                ConversationMessage::human(INSTRUCTION),
                ConversationMessage::agent_scaffold(ACKNOWLEDGEMENT),
            ],
        })
    }
}

impl EnvClient for MazeClient {
    fn name(&self) -> &str {
        "maze"
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
            .post("reset", serde_json::json!({ "game": data_idx }), session)
            .await?;
        let resp: ResetResponse = decode("POST /reset", &raw)?;
        self.sessions.record(
            session,
            SessionState::with_observation(format!("{RULES}\n{}", resp.observation)),
        )?;

        debug!(session = %session, game = data_idx, "maze session reset");
        Ok(raw)
    }

    async fn step(&mut self, session: &SessionId, action_text: &str) -> Result<StepOutput> {
        self.sessions.ensure(session)?;
        let action = first_action(strip_eos(action_text));

        let raw = self
            .server
            .post("step", serde_json::json!({ "action": action }), session)
            .await?;
        let resp: StepResponse = decode("POST /step", &raw)?;

        self.sessions.record(
            session,
            SessionState {
                observation: Some(resp.observation.clone()),
                reward: resp.reward,
                score: resp.reward,
                done: resp.done,
                available_actions: Vec::new(),
            },
        )?;

        Ok(StepOutput {
            state: resp.observation,
            reward: resp.reward,
            done: resp.done,
        })
    }

    async fn close(&mut self, session: &SessionId) {
        if let Err(e) = self.server.close(session).await {
            debug!(session = %session, error = %e, "ignoring maze close failure");
        }
        self.sessions.remove(session);
    }
}
