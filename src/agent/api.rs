//! OpenAI-compatible chat-completions agent.
//!
//! Provides typed request/response structures and an [`ApiAgent`] that turns
//! a rollout conversation into one completion per round, retrying transient
//! failures and backing off exponentially when rate limited.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::AgentConfig;
use crate::conversation::{ConversationMessage, Role};
use crate::error::{HarnessError, Result};

use super::Agent;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// A single message in a chat conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// The role of the message author: `"system"`, `"user"`, or `"assistant"`.
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

impl From<&ConversationMessage> for ChatMessage {
    fn from(msg: &ConversationMessage) -> Self {
        match msg.role() {
            Role::Human => Self::user(msg.text()),
            Role::Agent => Self::assistant(msg.text()),
        }
    }
}

/// The generated message inside a choice. Reasoning models return their
/// chain of thought separately in `reasoning_content`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub reasoning_content: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub index: usize,
    pub message: ResponseMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Token usage statistics for a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
}

/// A chat completion response from the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub id: String,
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

/// Text of the first choice plus any separate reasoning.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub content: String,
    pub reasoning: Option<String>,
}

// ---------------------------------------------------------------------------
// Agent
// ---------------------------------------------------------------------------

/// HTTP agent for an OpenAI-compatible chat completions API.
#[derive(Debug, Clone)]
pub struct ApiAgent {
    api_base: String,
    api_key: String,
    model: String,
    /// `None` leaves the limit to the server.
    max_tokens: Option<u32>,
    temperature: f64,
    top_p: f64,
    max_retries: u32,
    retry_delay: Duration,
    http: reqwest::Client,
}

impl ApiAgent {
    /// Build an agent from configuration. Fails when no API key is set.
    pub fn new(config: &AgentConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(HarnessError::Config(
                "missing model API key (set CHUTES_API_KEY or agent.api_key)".into(),
            ));
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| HarnessError::transport("build http client", e))?;

        Ok(Self {
            api_base: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            max_tokens: (config.max_tokens > 0).then_some(config.max_tokens),
            temperature: config.temperature,
            top_p: config.top_p,
            max_retries: config.max_retries.max(1),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            http,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn payload(&self, messages: &[ChatMessage]) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
            "top_p": self.top_p,
        });
        if let Some(max_tokens) = self.max_tokens {
            body["max_tokens"] = serde_json::Value::from(max_tokens);
        }
        body
    }

    /// Check the key against `GET {base_url}/models`.
    ///
    /// `Ok(false)` means the server answered but rejected the key.
    pub async fn validate_key(&self) -> Result<bool> {
        let op = "GET /models";
        let resp = self
            .http
            .get(format!("{}/models", self.api_base))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| HarnessError::transport(op, e))?;

        let ok = resp.status().is_success();
        debug!(status = %resp.status(), ok, "validated model API key");
        Ok(ok)
    }

    /// Send `messages` to `POST {base_url}/chat/completions`.
    ///
    /// Up to `max_retries` attempts. A 429 waits `retry_delay * 2^attempt`;
    /// other failures wait `retry_delay`. A 401 fails immediately with a
    /// configuration error.
    pub async fn chat_completion(&self, messages: &[ChatMessage]) -> Result<Completion> {
        let url = format!("{}/chat/completions", self.api_base);
        let body = self.payload(messages);
        debug!(model = %self.model, messages = messages.len(), "sending chat completion request");

        let mut attempt = 0;
        loop {
            let last_attempt = attempt + 1 >= self.max_retries;
            match self.try_once(&url, &body).await {
                Ok(completion) => return Ok(completion),
                Err(e @ HarnessError::Config(_)) => return Err(e),
                Err(e) if last_attempt => return Err(e),
                Err(e) => {
                    let rate_limited = matches!(e, HarnessError::Status { status: 429, .. });
                    let wait = if rate_limited {
                        self.retry_delay.saturating_mul(2u32.saturating_pow(attempt))
                    } else {
                        self.retry_delay
                    };
                    warn!(
                        attempt = attempt + 1,
                        rate_limited,
                        wait_ms = wait.as_millis() as u64,
                        error = %e,
                        "chat completion failed, retrying"
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn try_once(&self, url: &str, body: &serde_json::Value) -> Result<Completion> {
        let op = "POST /chat/completions";
        let resp = self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| HarnessError::transport(op, e))?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(HarnessError::Config(format!(
                "model API rejected the key for {}",
                self.api_base
            )));
        }
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(HarnessError::Status {
                op: op.to_string(),
                status: status.as_u16(),
                body: text,
            });
        }

        let chat: ChatResponse = resp
            .json()
            .await
            .map_err(|e| HarnessError::decode(op, e))?;

        let completion = first_completion(chat)?;
        info!(
            model = %self.model,
            chars = completion.content.len(),
            reasoning = completion.reasoning.is_some(),
            "chat completion succeeded"
        );
        Ok(completion)
    }
}

impl Agent for ApiAgent {
    async fn generate(&self, conversation: &[ConversationMessage]) -> Result<String> {
        let messages: Vec<ChatMessage> = conversation.iter().map(ChatMessage::from).collect();
        let completion = self.chat_completion(&messages).await?;
        if let Some(reasoning) = &completion.reasoning {
            debug!(reasoning = %reasoning, "model reasoning");
        }
        Ok(completion.content)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn first_completion(response: ChatResponse) -> Result<Completion> {
    let choice = response.choices.into_iter().next().ok_or_else(|| {
        HarnessError::decode("POST /chat/completions", "response has no choices")
    })?;
    Ok(Completion {
        content: choice.message.content.unwrap_or_default(),
        reasoning: choice.message.reasoning_content,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AgentConfig {
        AgentConfig {
            api_key: "sk-test".into(),
            ..AgentConfig::default()
        }
    }

    #[test]
    fn missing_key_is_config_error() {
        let err = ApiAgent::new(&AgentConfig {
            api_key: "  ".into(),
            ..AgentConfig::default()
        })
        .unwrap_err();
        assert!(err.is_client_error());
    }

    #[test]
    fn roles_map_to_chat_roles() {
        let human = ChatMessage::from(&ConversationMessage::human("obs"));
        assert_eq!(human, ChatMessage::user("obs"));
        let agent = ChatMessage::from(&ConversationMessage::agent_scaffold("OK."));
        assert_eq!(agent, ChatMessage::assistant("OK."));
    }

    #[test]
    fn max_tokens_omitted_when_zero() {
        let agent = ApiAgent::new(&config()).unwrap();
        let body = agent.payload(&[ChatMessage::user("hi")]);
        assert!(body.get("max_tokens").is_none());
        assert_eq!(body["top_p"], 1.0);

        let agent = ApiAgent::new(&AgentConfig {
            max_tokens: 512,
            ..config()
        })
        .unwrap();
        assert_eq!(agent.payload(&[])["max_tokens"], 512);
    }

    #[test]
    fn first_choice_carries_reasoning() {
        let resp: ChatResponse = serde_json::from_value(serde_json::json!({
            "choices": [{
                "message": {"content": "Action: look", "reasoning_content": "thinking"}
            }]
        }))
        .unwrap();
        let completion = first_completion(resp).unwrap();
        assert_eq!(completion.content, "Action: look");
        assert_eq!(completion.reasoning.as_deref(), Some("thinking"));

        let empty: ChatResponse = serde_json::from_value(serde_json::json!({"choices": []})).unwrap();
        assert!(first_completion(empty).is_err());
    }
}
