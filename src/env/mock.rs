//! In-memory scripted environment.
//!
//! [`ScriptedClient`] replays canned household episodes without any network
//! traffic. It speaks the single-marker action format, so malformed responses
//! are answered in-band exactly as a remote adapter would. This makes it
//! possible to exercise the task pool, the evaluator and the HTTP service
//! offline and deterministically.

use std::collections::{BTreeSet, HashMap};

use tracing::debug;

use crate::conversation::{ConversationMessage, StepOutput};
use crate::error::{HarnessError, Result};

use super::action::{MarkedActionParser, ParsedAction, MISSING_ACTION_MESSAGE, MULTIPLE_ACTIONS_MESSAGE};
use super::traits::{EnvClient, EnvSettings, SessionId};

const INSTRUCTION: &str = "You are in a household and must complete the task you are given. Every round I will give you an observation, and you have to respond with your thought and exactly one action.\nYour response should use the following format:\nThought:\n<Your Thought>\n\nAction:\n<Your Action>";

const ACKNOWLEDGEMENT: &str = "OK. I'll follow your instructions and try my best to solve the task.";

/// Observation returned once an episode's script is exhausted.
pub const EXHAUSTED_OBSERVATION: &str = "Nothing happens.";

// ---------------------------------------------------------------------------
// Scripts
// ---------------------------------------------------------------------------

/// One scripted transition.
#[derive(Debug, Clone, PartialEq)]
pub struct MockStep {
    pub observation: String,
    /// Reported reward (the environment's score).
    pub reward: f64,
    pub done: bool,
}

/// A canned episode: the first observation plus the transitions that follow,
/// regardless of which action the agent picks.
#[derive(Debug, Clone, PartialEq)]
pub struct MockEpisode {
    pub task: String,
    pub initial: String,
    pub steps: Vec<MockStep>,
}

impl MockEpisode {
    pub fn new(task: impl Into<String>, initial: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            initial: initial.into(),
            steps: Vec::new(),
        }
    }

    /// Append a transition.
    pub fn then(mut self, observation: impl Into<String>, reward: f64, done: bool) -> Self {
        self.steps.push(MockStep {
            observation: observation.into(),
            reward,
            done,
        });
        self
    }

    /// First observation shown to the agent (task line included).
    fn opening(&self) -> String {
        format!("{}\nYour task is to: {}", self.initial, self.task)
    }
}

/// Built-in episodes covering success, a late success and a task that never
/// terminates.
pub fn default_episodes() -> Vec<MockEpisode> {
    vec![
        MockEpisode::new(
            "put a clean apple in fridge.",
            "You are in the middle of a room. Looking quickly around you, you see a cabinet 2, a cabinet 1, a countertop 1, a fridge 1, a sinkbasin 1, and a toaster 1.",
        )
        .then("You arrive at countertop 1. On the countertop 1, you see an apple 1, a bread 1, and a knife 1.", 0.0, false)
        .then("You pick up the apple 1 from the countertop 1.", 0.0, false)
        .then("You clean the apple 1 using the sinkbasin 1.", 0.0, false)
        .then("You put the apple 1 in/on the fridge 1.", 1.0, true),
        MockEpisode::new(
            "clean some mug and put it in shelf.",
            "You are in the middle of a room. Looking quickly around you, you see a shelf 2, a shelf 1, a sinkbasin 1, a countertop 1, and a garbagecan 1.",
        )
        .then("You arrive at countertop 1. On the countertop 1, you see a mug 1 and a plate 1.", 0.0, false)
        .then("You pick up the mug 1 from the countertop 1.", 0.0, false)
        .then("You clean the mug 1 using the sinkbasin 1.", 0.5, false)
        .then("You arrive at shelf 1.", 0.0, false)
        .then("You put the mug 1 in/on the shelf 1.", 0.5, true),
        MockEpisode::new(
            "put two pencil in desk.",
            "You are in the middle of a room. Looking quickly around you, you see a bed 1, a desk 1, a drawer 2, a drawer 1, and a shelf 1.",
        )
        .then("You open the drawer 1. The drawer 1 is open. In it, you see a pencil 1.", 0.0, false)
        .then("You pick up the pencil 1 from the drawer 1.", 0.0, false)
        .then("You put the pencil 1 in/on the desk 1.", 0.0, false),
    ]
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
struct Cursor {
    episode: Option<usize>,
    next_step: usize,
    observation: String,
}

/// Scripted, network-free environment client.
#[derive(Debug)]
pub struct ScriptedClient {
    episodes: Vec<MockEpisode>,
    sessions: HashMap<SessionId, Cursor>,
    parser: MarkedActionParser,
    data_len: usize,
    conversation_start: Vec<ConversationMessage>,
    next_id: u64,

    failing_resets: BTreeSet<usize>,
    fail_steps: bool,
    fail_close: bool,

    sent_actions: Vec<String>,
    created: usize,
    closed: usize,
    close_failures: usize,
}

impl ScriptedClient {
    /// Built-in episodes, addressable up to `settings.data_len`.
    pub fn new(settings: &EnvSettings) -> Result<Self> {
        Self::with_episodes(settings.data_len, default_episodes())
    }

    /// Custom episodes; data index `i` replays `episodes[i % episodes.len()]`.
    pub fn with_episodes(data_len: usize, episodes: Vec<MockEpisode>) -> Result<Self> {
        if episodes.is_empty() {
            return Err(HarnessError::Config(
                "scripted environment needs at least one episode".into(),
            ));
        }
        Ok(Self {
            episodes,
            sessions: HashMap::new(),
            parser: MarkedActionParser::standard()?,
            data_len,
            conversation_start: vec![
                ConversationMessage::human(INSTRUCTION),
                ConversationMessage::agent_scaffold(ACKNOWLEDGEMENT),
            ],
            next_id: 0,
            failing_resets: BTreeSet::new(),
            fail_steps: false,
            fail_close: false,
            sent_actions: Vec::new(),
            created: 0,
            closed: 0,
            close_failures: 0,
        })
    }

    /// Make `reset` fail for the given data index.
    pub fn fail_reset_for(mut self, data_idx: usize) -> Self {
        self.failing_resets.insert(data_idx);
        self
    }

    /// Make every well-formed `step` fail as if the server had errored.
    pub fn fail_steps(mut self) -> Self {
        self.fail_steps = true;
        self
    }

    /// Make the remote half of `close` fail (local bookkeeping still drops).
    pub fn fail_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    /// Actions that reached the "server", in order.
    pub fn sent_actions(&self) -> &[String] {
        &self.sent_actions
    }

    /// Number of steps that reached the "server".
    pub fn remote_steps(&self) -> usize {
        self.sent_actions.len()
    }

    pub fn created(&self) -> usize {
        self.created
    }

    pub fn closed(&self) -> usize {
        self.closed
    }

    /// Close failures that were logged and dropped.
    pub fn close_failures(&self) -> usize {
        self.close_failures
    }

    /// Sessions currently registered on this client.
    pub fn live_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// The "server" half of `close`.
    fn remote_close(&self) -> Result<()> {
        if self.fail_close {
            return Err(Self::injected("POST /close"));
        }
        Ok(())
    }

    fn injected(op: &str) -> HarnessError {
        HarnessError::Status {
            op: op.to_string(),
            status: 503,
            body: "injected failure".into(),
        }
    }
}

impl EnvClient for ScriptedClient {
    fn name(&self) -> &str {
        "mock"
    }

    fn len(&self) -> usize {
        self.data_len
    }

    fn conversation_start(&self) -> &[ConversationMessage] {
        &self.conversation_start
    }

    fn observe(&self, session: &SessionId) -> String {
        self.sessions
            .get(session)
            .map(|c| c.observation.clone())
            .unwrap_or_default()
    }

    async fn create(&mut self) -> Result<SessionId> {
        let id = SessionId::Num(self.next_id);
        self.next_id += 1;
        self.created += 1;
        self.sessions.insert(id.clone(), Cursor::default());
        Ok(id)
    }

    async fn reset(&mut self, session: &SessionId, data_idx: usize) -> Result<serde_json::Value> {
        if !self.sessions.contains_key(session) {
            return Err(HarnessError::UnknownSession(session.clone()));
        }
        if self.failing_resets.contains(&data_idx) {
            return Err(Self::injected("POST /reset"));
        }

        let episode_idx = data_idx % self.episodes.len();
        let observation = self.episodes[episode_idx].opening();
        let cursor = Cursor {
            episode: Some(episode_idx),
            next_step: 0,
            observation: observation.clone(),
        };
        self.sessions.insert(session.clone(), cursor);

        debug!(session = %session, data_idx, episode = episode_idx, "scripted session reset");
        Ok(serde_json::json!({ "observation": observation, "reward": 0.0, "done": false }))
    }

    async fn step(&mut self, session: &SessionId, action_text: &str) -> Result<StepOutput> {
        if !self.sessions.contains_key(session) {
            return Err(HarnessError::UnknownSession(session.clone()));
        }

        let action = match self.parser.parse(action_text) {
            ParsedAction::Action(action) => action,
            ParsedAction::Multiple => return Ok(StepOutput::feedback(MULTIPLE_ACTIONS_MESSAGE)),
            ParsedAction::Missing => return Ok(StepOutput::feedback(MISSING_ACTION_MESSAGE)),
        };
        if self.fail_steps {
            return Err(Self::injected("POST /step"));
        }
        self.sent_actions.push(action);

        let episodes = &self.episodes;
        let Some(cursor) = self.sessions.get_mut(session) else {
            return Err(HarnessError::UnknownSession(session.clone()));
        };
        let scripted = cursor
            .episode
            .and_then(|e| episodes[e].steps.get(cursor.next_step))
            .cloned();

        let output = match scripted {
            Some(step) => {
                cursor.next_step += 1;
                StepOutput {
                    state: step.observation,
                    reward: step.reward,
                    done: step.done,
                }
            }
            None => StepOutput {
                state: EXHAUSTED_OBSERVATION.to_string(),
                reward: 0.0,
                done: false,
            },
        };
        cursor.observation = output.state.clone();
        Ok(output)
    }

    async fn close(&mut self, session: &SessionId) {
        if let Err(e) = self.remote_close() {
            self.close_failures += 1;
            debug!(session = %session, error = %e, "ignoring scripted close failure");
        }
        if self.sessions.remove(session).is_some() {
            self.closed += 1;
        }
    }
}
