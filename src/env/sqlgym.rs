//! SQLGym: answer questions about a SQLite database with one SQL statement
//! per turn.
//!
//! The model's SQL is taken from the last fenced ```` ```sql ```` block. The
//! reset response is a list whose first element is the question shown to the
//! agent.

use serde::Deserialize;
use tracing::debug;

use crate::conversation::{ConversationMessage, StepOutput};
use crate::error::{HarnessError, Result};

use super::action::{extract_sql, strip_eos, INVALID_ACTION_PREFIX};
use super::server::{decode, EnvServer};
use super::session::{SessionMap, SessionState};
use super::traits::{EnvClient, EnvSettings, SessionId};

const INSTRUCTION: &str = "Given you a description of a SQlite database system, I will ask you a question, then you should help me operate the SQLite database with SQL to answer the question.\n\nYou have to explain the problem and your solution to me and write down your thoughts.\nAfter thinking and explaining thoroughly, you should give a SQL statement to solve the question.\n\nyour response should be like this:\nThought: Your thought here.\n\nAction: ```sql\nSELECT * FROM table WHERE condition;\n```\n\nYou MUST put SQL in markdown format without any other comments. Your SQL should be in one line. Every time you can only execute one SQL statement.";

const ACKNOWLEDGEMENT: &str = "Ok.";

const BUSY_RETRIES: u32 = 4;

#[derive(Debug, Deserialize)]
struct StepResponse {
    state: String,
    #[serde(default)]
    reward: f64,
    #[serde(default)]
    done: bool,
}

/// HTTP adapter for a SQLGym environment server.
#[derive(Debug)]
pub struct SqlGymClient {
    server: EnvServer,
    sessions: SessionMap,
    data_len: usize,
    conversation_start: Vec<ConversationMessage>,
}

impl SqlGymClient {
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

impl EnvClient for SqlGymClient {
    fn name(&self) -> &str {
        "sqlgym"
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
            .post("reset", serde_json::json!({ "item_id": data_idx }), session)
            .await?;

        let question = raw.get(0).and_then(|q| q.as_str()).ok_or_else(|| {
            HarnessError::decode("POST /reset", format!("expected [question, ...], got {raw}"))
        })?;
        self.sessions
            .record(session, SessionState::with_observation(question))?;

        debug!(session = %session, item_id = data_idx, "SQLGym session reset");
        Ok(raw)
    }

    async fn step(&mut self, session: &SessionId, action_text: &str) -> Result<StepOutput> {
        self.sessions.ensure(session)?;
        let sql = extract_sql(strip_eos(action_text));
        if sql.is_empty() {
            return Ok(StepOutput::feedback(format!(
                "{INVALID_ACTION_PREFIX}{}",
                self.observe(session)
            )));
        }

        let raw = self
            .server
            .post("step", serde_json::json!({ "action": sql }), session)
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

    async fn close(&mut self, session: &SessionId) {
        if let Err(e) = self.server.close(session).await {
            debug!(session = %session, error = %e, "ignoring SQLGym close failure");
        }
        self.sessions.remove(session);
    }
}
