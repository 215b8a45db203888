//! LMRL-Gym wordle: guess a hidden five-letter word in six attempts.
//!
//! The server's vocabulary is fetched once per client from
//! `GET /filtered_vocab` and spliced into the rules, which are the whole
//! first observation of every game.

use serde::Deserialize;
use tracing::debug;

use crate::conversation::{ConversationMessage, StepOutput};
use crate::error::Result;

use super::action::{first_action, strip_eos};
use super::server::{decode, EnvServer};
use super::session::{SessionMap, SessionState};
use super::traits::{EnvClient, EnvSettings, SessionId};

const INSTRUCTION: &str = "You are an expert wordle player.";

const ACKNOWLEDGEMENT: &str = "OK. I'll follow your instructions and try my best to solve the task.";

const VOCAB_PLACEHOLDER: &str = "{{vocab}}";

/// Game rules; `{{vocab}}` is replaced by one accepted word per line.
pub const RULES: &str = "Welcome to the game of Wordle. Your objective is to guess a hidden 5 letter word. You have 6 attempts to guess it correctly and you should try to guess it in as few attempts as possible. When guessing the word, you should format your word as a space separated sequence of letters, like \"s h i r e\" for example. After guessing the word, you will receive feedback from the game environment in the form of a sequence of 5 space separated letters like \"b y g g b\", where each letter indicates some information about the hidden word. The environment will return one of three letters – \"b\", \"g\", or \"y\" – for each letter in the word you guessed. We describe the meaning of each letter below:\n\n\"b\": If the environment returns a \"b\", it means that the letter at that position in your guessed word is not in the hidden word.\n\"y\": If the environment returns a \"y\", it means that the letter at that position in your guessed word is in the hidden word but is not in the correct position.\n\"g\": If the environment returns a \"g\", it means that the letter at that position in your guessed word is in the hidden word and is in the correct position.\n\nAs a note, if you guess an invalid word (e.g. not a 5 letter word or a word not in the vocabulary), the environment will respond with an \"invalid word\" message. In general though, you should use this information returned by the environment to update your belief about what the hidden word might be and adjust your next guess accordingly.\n\nHere is the complete list of valid vocabulary words that are accepted by the game:\n```\n{{vocab}}\n```\n\nHere is an example. If the current status of the game is given as:\n```\nguess 1: p a n i c\nfeedback 1: b b y b b\nguess 2: f e l o n\nfeedback 2: g b b y g\n```\nBased on the feedback from the environment, you know that the first letter is \"f\", the last letter is \"n\", and there is an \"o\" somewhere in the word, but it is not in the second to last position. You also know that there is not a \"p\", \"a\", \"i\", \"c\", \"e\", or \"l\" in the word. Knowing this, you might guess the next word to be:\nThought:\nI know that the first letter is \"f\", the last letter is \"n\", and there is an \"o\" somewhere in the word, but it is not in the second to last position. I also know that there is not a \"p\", \"a\", \"i\", \"c\", \"e\", or \"l\" in the word. A good word from the vocabulary to try might therefore be \"f r o w n\", since it is in the vocabulary, meets all known letter constraints, and we get to gain more information about the position of \"o\". Therefore this is a good guess to try next.\n\nAction:\nf r o w n\n\nFormally, your return should be in this format:\nThought:\n<Your Thought>\n\nAction:\n<The Word You Guess>\n\nThe guessed word is in the vocabulary, meets all known letter constraints, and we get to gain more information about the position of \"o\", so it is a good guess to try next.\n\nNow let's start a new game. Remember, the word you guess should be strictly in the vocabulary. You should return your thought and your word strictly in the formation mentioned above.";

#[derive(Debug, Deserialize)]
struct StepResponse {
    observation: String,
    #[serde(default)]
    reward: f64,
    #[serde(default)]
    done: bool,
}

/// HTTP adapter for an LMRL-Gym wordle server.
#[derive(Debug)]
pub struct WordleClient {
    server: EnvServer,
    sessions: SessionMap,
    /// Rules with the vocabulary filled in, once fetched.
    opening: Option<String>,
    data_len: usize,
    conversation_start: Vec<ConversationMessage>,
}

impl WordleClient {
    pub fn new(settings: &EnvSettings) -> Result<Self> {
        Ok(Self {
            server: EnvServer::new(settings, "id")?,
            sessions: SessionMap::new(),
            opening: None,
            data_len: settings.data_len,
            conversation_start: vec![
                ConversationMessage::human(INSTRUCTION),
                ConversationMessage::agent_scaffold(ACKNOWLEDGEMENT),
            ],
        })
    }

    /// The rules with `vocab` listed, one word per line.
    pub fn render_rules(vocab: &[String]) -> String {
        RULES.replace(VOCAB_PLACEHOLDER, &vocab.join("\n"))
    }

    async fn opening(&mut self, session: &SessionId) -> Result<String> {
        if let Some(opening) = &self.opening {
            return Ok(opening.clone());
        }
        let raw = self.server.get("filtered_vocab", session).await?;
        let vocab: Vec<String> = decode("GET /filtered_vocab", &raw)?;
        debug!(words = vocab.len(), "wordle vocabulary fetched");

        let opening = Self::render_rules(&vocab);
        self.opening = Some(opening.clone());
        Ok(opening)
    }
}

impl EnvClient for WordleClient {
    fn name(&self) -> &str {
        "wordle"
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
        let opening = self.opening(&id).await?;
        self.sessions
            .register_with(id.clone(), SessionState::with_observation(opening));
        Ok(id)
    }

    async fn reset(&mut self, session: &SessionId, data_idx: usize) -> Result<serde_json::Value> {
        self.sessions.ensure(session)?;
        let raw = self
            .server
            .post("reset", serde_json::json!({ "seed": data_idx }), session)
            .await?;
        let opening = self.opening(session).await?;
        self.sessions
            .record(session, SessionState::with_observation(opening))?;

        debug!(session = %session, seed = data_idx, "wordle session reset");
        Ok(raw)
    }

    async fn step(&mut self, session: &SessionId, action_text: &str) -> Result<StepOutput> {
        self.sessions.ensure(session)?;
        let guess = first_action(strip_eos(action_text));

        let raw = self
            .server
            .post("step", serde_json::json!({ "action": guess }), session)
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
            debug!(session = %session, error = %e, "ignoring wordle close failure");
        }
        self.sessions.remove(session);
    }
}
