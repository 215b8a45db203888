//! TextCraft: Minecraft-style crafting from textual recipes.
//!
//! Same single-marker action format as BabyAI, but the server reports a plain
//! `reward` (no separate score) and hands out the first observation already
//! on `/create`.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::conversation::{ConversationMessage, StepOutput};
use crate::error::{HarnessError, Result};

use super::action::{MarkedActionParser, ParsedAction, MISSING_ACTION_MESSAGE, MULTIPLE_ACTIONS_MESSAGE};
use super::server::{decode, EnvServer};
use super::session::{SessionMap, SessionState};
use super::traits::{EnvClient, EnvSettings, SessionId};

const INSTRUCTION: &str = "You are given few useful crafting recipes to craft items in Minecraft. Crafting commands are of the format \"craft [target object] using [input ingredients]\".\nEvery round I will give you an observation, you have to respond an action based on the state and instruction. You can \"get\" an object (ingredients) from the inventory or the environment, look-up the game inventory by \"inventory\", or \"craft\" (target) using any of the crafting commands.\nYour output must strictly follow this format:\"Thought:\nyour thoughts.\n\nAction:\nyour next action\"\n\nReminder: \n1. Always specify the quantity when using \"get\" and \"craft\" commands. - Example of get: get 1 lapis lazuli - Example1 of craft: craft 1 blue dye using 1 lapis lazuli - Example2 of craft: craft 1 golden carrot using 8 gold nugget, 1 carrot\n2. When using \"get\" command, do not specify whether the item comes from the inventory or the environment.\n3. You can use ONLY crafting commands provided, do not use your own crafting commands. However, if the crafting command uses a generic ingredient like \"planks\", you can use special types of the same ingredient e.g. \"dark oak planks\" in the command instead.\n\n";

const ACKNOWLEDGEMENT: &str = "OK. I'll follow your instructions and try my best to solve the task.";

/// Server-side world configuration sent on `/create`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextCraftOptions {
    /// Recipe directory on the server (default: `agentenv_textcraft/`).
    pub minecraft_dir: String,
    /// Fixed crafting commands, or `None` to let the server sample them.
    pub commands: Option<String>,
    /// Fixed goal, or `None` to let the server sample it.
    pub goal: Option<String>,
}

impl Default for TextCraftOptions {
    fn default() -> Self {
        Self {
            minecraft_dir: "agentenv_textcraft/".into(),
            commands: None,
            goal: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ServerResponse {
    observation: String,
    #[serde(default)]
    reward: f64,
    #[serde(default)]
    done: bool,
}

/// HTTP adapter for a TextCraft environment server.
#[derive(Debug)]
pub struct TextCraftClient {
    server: EnvServer,
    sessions: SessionMap,
    parser: MarkedActionParser,
    options: TextCraftOptions,
    data_len: usize,
    conversation_start: Vec<ConversationMessage>,
}

impl TextCraftClient {
    pub fn new(settings: &EnvSettings) -> Result<Self> {
        Self::with_options(settings, TextCraftOptions::default())
    }

    pub fn with_options(settings: &EnvSettings, options: TextCraftOptions) -> Result<Self> {
        Ok(Self {
            server: EnvServer::new(settings, "id")?,
            sessions: SessionMap::new(),
            parser: MarkedActionParser::standard()?,
            options,
            data_len: settings.data_len,
            conversation_start: vec![
                ConversationMessage::human(INSTRUCTION),
                ConversationMessage::agent_scaffold(ACKNOWLEDGEMENT),
            ],
        })
    }
}

impl EnvClient for TextCraftClient {
    fn name(&self) -> &str {
        "textcraft"
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
        let body = serde_json::to_value(&self.options)
            .map_err(|e| HarnessError::decode("POST /create", e))?;
        let (id, raw) = self.server.create(Some(body)).await?;

        let state = match raw.get("observation").and_then(|o| o.as_str()) {
            Some(observation) => SessionState::with_observation(observation),
            None => SessionState::default(),
        };
        self.sessions.register_with(id.clone(), state);
        Ok(id)
    }

    async fn reset(&mut self, session: &SessionId, data_idx: usize) -> Result<serde_json::Value> {
        self.sessions.ensure(session)?;
        let raw = self
            .server
            .post("reset", serde_json::json!({ "data_idx": data_idx }), session)
            .await?;
        let resp: ServerResponse = decode("POST /reset", &raw)?;
        self.sessions
            .record(session, SessionState::with_observation(resp.observation))?;

        debug!(session = %session, data_idx, "TextCraft session reset");
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
            debug!(session = %session, error = %e, "ignoring TextCraft close failure");
        }
        self.sessions.remove(session);
    }
}
