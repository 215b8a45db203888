//! Request bodies and error responses of the HTTP service.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::HarnessError;

fn default_base_url() -> String {
    "https://llm.chutes.ai/v1".into()
}

fn default_temperature() -> f64 {
    0.7
}

fn default_top_p() -> f64 {
    1.0
}

fn default_max_round() -> usize {
    10
}

fn default_env_server_base() -> Option<String> {
    Some("http://localhost:8000".into())
}

fn default_data_len() -> usize {
    200
}

fn default_timeout() -> u64 {
    2400
}

/// Body of `POST /evaluator`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluatorRequest {
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Completion token limit; omitted from model calls when absent or 0.
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_top_p")]
    pub top_p: f64,
    /// Data indices to evaluate; all of `0..min(data_len, cap)` when absent.
    #[serde(default)]
    pub ids: Option<Vec<usize>>,
    #[serde(default = "default_max_round")]
    pub max_round: usize,
    #[serde(default = "default_env_server_base")]
    pub env_server_base: Option<String>,
    #[serde(default = "default_data_len")]
    pub data_len: usize,
    /// Environment request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl EvaluatorRequest {
    /// Requested indices, or the default range when none (or an empty list)
    /// were given.
    pub fn resolved_ids(&self, cap: usize) -> Vec<usize> {
        match &self.ids {
            Some(ids) if !ids.is_empty() => ids.clone(),
            _ => crate::eval::default_ids(self.data_len, cap),
        }
    }

    /// Environment server base, falling back to the local default when the
    /// field is null or blank.
    pub fn server_base(&self) -> String {
        self.env_server_base
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .or_else(default_env_server_base)
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// An HTTP error rendered as `{"detail": ...}`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub detail: String,
}

impl ApiError {
    pub fn unauthorized(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            detail: detail.into(),
        }
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            detail: detail.into(),
        }
    }
}

impl From<HarnessError> for ApiError {
    fn from(e: HarnessError) -> Self {
        let status = if e.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        Self {
            status,
            detail: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "detail": self.detail })),
        )
            .into_response()
    }
}
