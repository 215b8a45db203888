//! Error taxonomy for the evaluation harness.
//!
//! Transport and status failures are fatal to the network call that raised
//! them and propagate up to the rollout. Malformed model output is *not* an
//! error: adapters answer it in-band with a [`StepOutput`](crate::conversation::StepOutput).

use thiserror::Error;

use crate::env::SessionId;

/// The unified error type for the harness library.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// The remote server could not be reached or the call timed out.
    #[error("{op}: transport error: {}", describe_transport(.source))]
    Transport {
        op: String,
        #[source]
        source: reqwest::Error,
    },

    /// The remote server answered a required call with a non-success status.
    #[error("{op}: server returned {status}: {body}")]
    Status {
        op: String,
        status: u16,
        body: String,
    },

    /// The response body did not have the expected shape.
    #[error("{op}: malformed response: {reason}")]
    Decode { op: String, reason: String },

    /// `step`/`reset` against a session this client never created or already closed.
    #[error("unknown or closed session {0}")]
    UnknownSession(SessionId),

    /// Registry miss.
    #[error("unknown environment '{name}' (known: {known})")]
    UnknownEnvironment { name: String, known: String },

    /// Missing or invalid configuration, including credentials.
    #[error("configuration error: {0}")]
    Config(String),

    /// The agent failed to produce an action.
    #[error("agent error: {0}")]
    Agent(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl HarnessError {
    pub(crate) fn transport(op: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Transport {
            op: op.into(),
            source,
        }
    }

    pub(crate) fn decode(op: impl Into<String>, reason: impl ToString) -> Self {
        Self::Decode {
            op: op.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether the error was caused by the caller's request rather than by a
    /// runtime failure (maps to a 4xx at the serving boundary).
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Config(_) | Self::UnknownEnvironment { .. })
    }
}

/// The reqwest error with its cause chain, which is where hyper reports
/// refused connections and elapsed timeouts.
fn describe_transport(source: &reqwest::Error) -> String {
    let mut text = if source.is_timeout() {
        format!("timed out: {source}")
    } else {
        source.to_string()
    };
    let mut cause = std::error::Error::source(source);
    while let Some(err) = cause {
        text.push_str(": ");
        text.push_str(&err.to_string());
        cause = std::error::Error::source(err);
    }
    text
}

/// Convenience alias used throughout the library.
pub type Result<T> = std::result::Result<T, HarnessError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_are_client_errors() {
        assert!(HarnessError::Config("missing key".into()).is_client_error());
        assert!(HarnessError::UnknownEnvironment {
            name: "chess".into(),
            known: "babyai".into(),
        }
        .is_client_error());
        assert!(!HarnessError::Agent("boom".into()).is_client_error());
    }

    #[test]
    fn status_error_mentions_operation() {
        let err = HarnessError::Status {
            op: "POST /step".into(),
            status: 503,
            body: "busy".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("POST /step"));
        assert!(msg.contains("503"));
    }
}
