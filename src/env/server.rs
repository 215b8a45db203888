//! HTTP plumbing shared by every environment adapter.
//!
//! All environment servers speak the same JSON protocol:
//!
//! - `POST {base}/create`            -> `{"id": <session>}` (or a bare id)
//! - `POST {base}/reset`  `{<key>, ...}`
//! - `POST {base}/step`   `{<key>, "action": ...}`
//! - `POST {base}/close`  `{<key>}`
//! - `GET  {base}/<path>?<key>=<session>` for read-only queries
//!
//! `<key>` is the session field name, `"id"` for most servers and
//! `"env_idx"` for a few older ones. Those older servers also answer 503
//! while busy, so their handles retry POSTs a few times on that status.

use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::{HarnessError, Result};

use super::traits::{EnvSettings, SessionId};

/// A connection to one environment server.
#[derive(Debug, Clone)]
pub struct EnvServer {
    base_url: String,
    session_key: &'static str,
    http: reqwest::Client,
    /// Extra attempts for POSTs answered with 503 (default: 0).
    busy_retries: u32,
}

/// Pause between attempts while a server reports itself busy.
const BUSY_BACKOFF: Duration = Duration::from_millis(100);

impl EnvServer {
    /// Build a server handle whose requests all carry the configured timeout.
    pub fn new(settings: &EnvSettings, session_key: &'static str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(settings.timeout())
            .build()
            .map_err(|e| HarnessError::transport("build http client", e))?;

        Ok(Self {
            base_url: settings.env_server_base.trim_end_matches('/').to_string(),
            session_key,
            http,
            busy_retries: 0,
        })
    }

    /// Retry POSTs up to `retries` more times while the server answers 503.
    pub fn with_busy_retries(mut self, retries: u32) -> Self {
        self.busy_retries = retries;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `POST /create`, returning the new session id and the full response.
    pub async fn create(
        &self,
        body: Option<serde_json::Value>,
    ) -> Result<(SessionId, serde_json::Value)> {
        let op = "POST /create";
        let mut request = self.http.post(format!("{}/create", self.base_url));
        if let Some(body) = body {
            request = request.json(&body);
        }
        let resp = request
            .send()
            .await
            .map_err(|e| HarnessError::transport(op, e))?;
        let value: serde_json::Value = read_json(op, resp).await?;

        let id = value
            .get("id")
            .and_then(SessionId::from_json)
            .or_else(|| SessionId::from_json(&value))
            .ok_or_else(|| HarnessError::decode(op, format!("no session id in {value}")))?;

        debug!(base = %self.base_url, session = %id, "created environment session");
        Ok((id, value))
    }

    /// `POST /{path}` with the session key merged into `body`.
    pub async fn post(
        &self,
        path: &str,
        body: serde_json::Value,
        session: &SessionId,
    ) -> Result<serde_json::Value> {
        let op = format!("POST /{path}");
        let body = self.with_session(body, session);
        let url = format!("{}/{path}", self.base_url);

        let mut attempt = 0;
        loop {
            let resp = self
                .http
                .post(&url)
                .json(&body)
                .send()
                .await
                .map_err(|e| HarnessError::transport(op.as_str(), e))?;

            if resp.status() == reqwest::StatusCode::SERVICE_UNAVAILABLE
                && attempt < self.busy_retries
            {
                attempt += 1;
                warn!(op = %op, attempt, "environment server busy, retrying");
                tokio::time::sleep(BUSY_BACKOFF).await;
                continue;
            }
            return read_json(&op, resp).await;
        }
    }

    /// `GET /{path}?<key>=<session>`.
    pub async fn get(&self, path: &str, session: &SessionId) -> Result<serde_json::Value> {
        let op = format!("GET /{path}");
        let resp = self
            .http
            .get(format!("{}/{path}", self.base_url))
            .query(&[(self.session_key, session.to_string())])
            .send()
            .await
            .map_err(|e| HarnessError::transport(op.as_str(), e))?;
        read_json(&op, resp).await
    }

    /// `POST /close`. Callers swallow the result.
    pub async fn close(&self, session: &SessionId) -> Result<serde_json::Value> {
        self.post("close", serde_json::json!({}), session).await
    }

    fn with_session(&self, body: serde_json::Value, session: &SessionId) -> serde_json::Value {
        let mut map = match body {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        map.insert(self.session_key.to_string(), session.to_json());
        serde_json::Value::Object(map)
    }
}

/// Decode a response value into a typed payload.
pub fn decode<T: DeserializeOwned>(op: &str, value: &serde_json::Value) -> Result<T> {
    serde_json::from_value(value.clone()).map_err(|e| HarnessError::decode(op, e))
}

async fn read_json(op: &str, resp: reqwest::Response) -> Result<serde_json::Value> {
    let status = resp.status();
    let text = resp
        .text()
        .await
        .map_err(|e| HarnessError::transport(op, e))?;

    if !status.is_success() {
        return Err(HarnessError::Status {
            op: op.to_string(),
            status: status.as_u16(),
            body: text,
        });
    }

    serde_json::from_str(&text).map_err(|e| HarnessError::decode(op, e))
}
