//! ALFWorld text-based household environment.
//!
//! ALFWorld presents interactive household tasks (pick up objects, clean
//! items, heat food, etc.) described entirely in natural language. The server
//! enumerates the legal actions after every transition, and the adapter shows
//! them to the agent beneath the observation.

use serde::Deserialize;
use tracing::debug;

use crate::conversation::{ConversationMessage, StepOutput};
use crate::error::Result;

use super::action::{parse_react, strip_eos, INVALID_ACTION_PREFIX};
use super::server::{decode, EnvServer};
use super::session::{SessionMap, SessionState};
use super::traits::{EnvClient, EnvSettings, SessionId};

const INSTRUCTION: &str = "Interact with a household to solve a task. Imagine you are an intelligent agent in a household environment and your target is to perform actions to complete the task goal. At the beginning of your interactions, you will be given the detailed description of the current environment and your goal to accomplish. For each of your turn, you will be given a list of actions which you can choose one to perform in this turn. You should choose from two actions: \"THOUGHT\" or \"ACTION\". If you choose \"THOUGHT\", you should first think about the current condition and plan for your future actions, and then output your action in this turn. Your output must strictly follow this format:\"Thought:\nyour thoughts.\n\nAction:\nyour next action\"; If you choose \"ACTION\", you should directly output the action in this turn. Your output must strictly follow this format:\"Action:\nyour next action\". After your each turn, the environment will give you immediate feedback based on which you plan your next few steps. if the envrionment output \"Nothing happened\", that means the previous action is invalid and you should try more options.\n Reminder: \n1. the action must be chosen from the given available actions. Any actions except provided available actions will be regarded as illegal. \n2. Think when necessary, try to act directly more in the process.";

const ACKNOWLEDGEMENT: &str = "OK. I'll follow your instructions and try my best to solve the task.";

/// World type requested on reset (default: `Text`).
pub const DEFAULT_WORLD_TYPE: &str = "Text";

/// The JSON shape returned by `/reset` and `/step`.
#[derive(Debug, Deserialize)]
struct ServerResponse {
    observation: String,
    #[serde(default)]
    available_actions: Vec<String>,
    #[serde(default)]
    reward: f64,
    #[serde(default)]
    done: bool,
}

/// HTTP adapter for an ALFWorld environment server.
#[derive(Debug)]
pub struct AlfWorldClient {
    server: EnvServer,
    sessions: SessionMap,
    world_type: String,
    data_len: usize,
    conversation_start: Vec<ConversationMessage>,
}

impl AlfWorldClient {
    pub fn new(settings: &EnvSettings) -> Result<Self> {
        Ok(Self {
            server: EnvServer::new(settings, "id")?,
            sessions: SessionMap::new(),
            world_type: DEFAULT_WORLD_TYPE.to_string(),
            data_len: settings.data_len,
            conversation_start: vec![
                ConversationMessage::human(INSTRUCTION),
                ConversationMessage::agent_scaffold(ACKNOWLEDGEMENT),
            ],
        })
    }

    /// Override the world type sent on reset.
    pub fn with_world_type(mut self, world_type: impl Into<String>) -> Self {
        self.world_type = world_type.into();
        self
    }
}

/// Observation followed by the legal actions, when the server listed any.
fn render(state: &SessionState) -> String {
    let observation = state.observation.as_deref().unwrap_or_default();
    if state.available_actions.is_empty() {
        observation.to_string()
    } else {
        format!(
            "{observation}\nAVAILABLE ACTIONS: {}",
            state.available_actions.join(",")
        )
    }
}

impl EnvClient for AlfWorldClient {
    fn name(&self) -> &str {
        "alfworld"
    }

    fn len(&self) -> usize {
        self.data_len
    }

    fn conversation_start(&self) -> &[ConversationMessage] {
        &self.conversation_start
    }

    fn observe(&self, session: &SessionId) -> String {
        self.sessions.get(session).map(render).unwrap_or_default()
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
            .post(
                "reset",
                serde_json::json!({ "game": data_idx, "world_type": self.world_type }),
                session,
            )
            .await?;
        let resp: ServerResponse = decode("POST /reset", &raw)?;
        self.sessions.record(
            session,
            SessionState {
                observation: Some(resp.observation),
                available_actions: resp.available_actions,
                ..SessionState::default()
            },
        )?;

        debug!(session = %session, game = data_idx, "ALFWorld session reset");
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
        let resp: ServerResponse = decode("POST /step", &raw)?;

        let state = SessionState {
            observation: Some(resp.observation),
            reward: resp.reward,
            score: resp.reward,
            done: resp.done,
            available_actions: resp.available_actions,
        };
        let shown = render(&state);
        self.sessions.record(session, state)?;

        Ok(StepOutput {
            state: shown,
            reward: resp.reward,
            done: resp.done,
        })
    }

    async fn close(&mut self, session: &SessionId) {
        if let Err(e) = self.server.close(session).await {
            debug!(session = %session, error = %e, "ignoring ALFWorld close failure");
        }
        self.sessions.remove(session);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_lists_available_actions() {
        let state = SessionState {
            observation: Some("You arrive at fridge 1.".into()),
            available_actions: vec!["open fridge 1".into(), "look".into()],
            ..SessionState::default()
        };
        assert_eq!(
            render(&state),
            "You arrive at fridge 1.\nAVAILABLE ACTIONS: open fridge 1,look"
        );
    }

    #[test]
    fn render_without_actions_is_plain_observation() {
        let state = SessionState::with_observation("Nothing happens.");
        assert_eq!(render(&state), "Nothing happens.");
        assert_eq!(render(&SessionState::default()), "");
    }
}
