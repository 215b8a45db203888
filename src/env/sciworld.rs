//! ScienceWorld: elementary-science experiments in a simulated house.
//!
//! Responses use the ReAct format. The reported reward is the server's
//! cumulative `score`; after a reset the task description is shown above the
//! first observation.

use serde::Deserialize;
use tracing::debug;

use crate::conversation::{ConversationMessage, StepOutput};
use crate::error::Result;

use super::action::{parse_react, strip_eos, INVALID_ACTION_PREFIX};
use super::server::{decode, EnvServer};
use super::session::{SessionMap, SessionState};
use super::traits::{EnvClient, EnvSettings, SessionId};

const INSTRUCTION: &str = "You are an agent for science world. Every round I will give you an observation, you have to respond an action based on the observation to finish the given task. Here are the actions you may take: [{\"action\": \"open/close OBJ\", \"description\": \"open/close a container\"}, {\"action\": \"de/activate OBJ\", \"description\": \"activate/deactivate a device\"}, {\"action\": \"connect OBJ to OBJ\", \"description\": \"connect electrical components\"}, {\"action\": \"disconnect OBJ\", \"description\": \"disconnect electrical components\"}, {\"action\": \"use OBJ [on OBJ]\", \"description\": \"use a device/item\"}, {\"action\": \"look around\", \"description\": \"describe the current room\"}, {\"action\": \"look at OBJ\", \"description\": \"describe an object in detail\"}, {\"action\": \"look in OBJ\", \"description\": \"describe a container's contents\"}, {\"action\": \"read OBJ\", \"description\": \"read a note or book\"}, {\"action\": \"move OBJ to OBJ\", \"description\": \"move an object to a container\"}, {\"action\": \"pick up OBJ\", \"description\": \"move an object to the inventory\"}, {\"action\": \"put down OBJ\", \"description\": \"drop an inventory item\"}, {\"action\": \"pour OBJ into OBJ\", \"description\": \"pour a liquid into a container\"}, {\"action\": \"dunk OBJ into OBJ\", \"description\": \"dunk a container into a liquid\"}, {\"action\": \"mix OBJ\", \"description\": \"chemically mix a container\"}, {\"action\": \"go to LOC\", \"description\": \"move to a new location\"}, {\"action\": \"eat OBJ\", \"description\": \"eat a food\"}, {\"action\": \"flush OBJ\", \"description\": \"flush a toilet\"}, {\"action\": \"focus on OBJ\", \"description\": \"signal intent on a task object\"}, {\"action\": \"wait\", \"description\": \"take no action for 10 iterations\"}, {\"action\": \"wait1\", \"description\": \"take no action for 1 iteration\"}, {\"action\":\"examine OBJ\",\"description\":\"provides a description of the objects present on or in a receptacle.\"}, {\"action\": \"task\", \"description\": \"describe current task\"}, {\"action\": \"inventory\", \"description\": \"list your inventory\"}]\nYour response should use the following format:\nThought:\nyour thoughts.\n\nAction:\nyour next action";

const ACKNOWLEDGEMENT: &str = "OK. I'll follow your instructions and try my best to solve the task.";

/// Score the server reports for a completed task.
const COMPLETED_SCORE: f64 = 100.0;

#[derive(Debug, Deserialize)]
struct ResetResponse {
    observation: String,
    #[serde(default)]
    task_description: String,
}

#[derive(Debug, Deserialize)]
struct StepResponse {
    observation: String,
    #[serde(default)]
    reward: f64,
    #[serde(default)]
    score: f64,
    #[serde(default)]
    done: bool,
}

/// HTTP adapter for a ScienceWorld environment server.
#[derive(Debug)]
pub struct SciWorldClient {
    server: EnvServer,
    sessions: SessionMap,
    data_len: usize,
    conversation_start: Vec<ConversationMessage>,
}

impl SciWorldClient {
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

impl EnvClient for SciWorldClient {
    fn name(&self) -> &str {
        "sciworld"
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
        let resp: ResetResponse = decode("POST /reset", &raw)?;

        let shown = format!("{}\n{}", resp.task_description, resp.observation);
        self.sessions
            .record(session, SessionState::with_observation(shown))?;

        debug!(session = %session, data_idx, "ScienceWorld session reset");
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
                observation: Some(resp.observation.clone()),
                reward: resp.reward,
                score: resp.score,
                done: resp.done,
                available_actions: Vec::new(),
            },
        )?;

        Ok(StepOutput {
            state: resp.observation,
            reward: resp.score,
            done: resp.done,
        })
    }

    /// Episodes also end on failure; only a full score counts.
    fn is_success(&self, last: &StepOutput) -> bool {
        last.done && last.reward >= COMPLETED_SCORE
    }

    async fn close(&mut self, session: &SessionId) {
        if let Err(e) = self.server.close(session).await {
            debug!(session = %session, error = %e, "ignoring ScienceWorld close failure");
        }
        self.sessions.remove(session);
    }
}
