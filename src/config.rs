use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::env::EnvSettings;
use crate::error::{HarnessError, Result};

/// Environment names that host several tools behind one server.
const UMBRELLA_ENVS: [&str; 2] = ["tool", "lmrlgym"];

/// Complete configuration for the harness service and CLI.
///
/// Built once at startup (defaults, then an optional JSON file, then process
/// environment, then CLI flags) and shared read-only afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Environment to serve (default: `babyai`).
    pub env_name: String,
    /// Tool name for umbrella environments (`tool`, `lmrlgym`) (default: empty).
    pub tool_name: String,
    /// Base URL of the environment server (default: `http://localhost:8000`).
    pub env_server_base: String,
    /// Number of addressable dataset items (default: 200).
    pub data_len: usize,
    /// Per-request environment timeout in seconds (default: 2400).
    pub timeout_secs: u64,
    /// Maximum agent turns per rollout (default: 10).
    pub max_round: usize,
    /// Pool size, i.e. concurrent conversation slots (default: 1).
    pub n_clients: usize,
    /// Listen address for `serve` (default: `0.0.0.0`).
    pub host: String,
    /// Listen port for `serve` (default: 8000).
    pub port: u16,
    /// Upper bound on indices evaluated when a request names none (default: 200).
    pub max_default_ids: usize,
    pub agent: AgentConfig,
}

/// Chat-completions agent configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Base URL of the OpenAI-compatible API (default: `https://llm.chutes.ai/v1`).
    pub base_url: String,
    /// Model identifier (default: `deepseek-ai/DeepSeek-V3`).
    pub model: String,
    /// Bearer token; filled from `CHUTES_API_KEY` when empty.
    #[serde(skip_serializing)]
    pub api_key: String,
    /// Completion token limit, 0 to omit it (default: 0).
    pub max_tokens: u32,
    /// Sampling temperature (default: 0.7).
    pub temperature: f64,
    /// Nucleus sampling (default: 1.0).
    pub top_p: f64,
    /// Request timeout in seconds (default: 300).
    pub timeout_secs: u64,
    /// Attempts per completion (default: 3).
    pub max_retries: u32,
    /// Base delay between attempts in milliseconds (default: 1000).
    pub retry_delay_ms: u64,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            env_name: "babyai".into(),
            tool_name: String::new(),
            env_server_base: "http://localhost:8000".into(),
            data_len: 200,
            timeout_secs: 2400,
            max_round: 10,
            n_clients: 1,
            host: "0.0.0.0".into(),
            port: 8000,
            max_default_ids: 200,
            agent: AgentConfig::default(),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            base_url: "https://llm.chutes.ai/v1".into(),
            model: "deepseek-ai/DeepSeek-V3".into(),
            api_key: String::new(),
            max_tokens: 0,
            temperature: 0.7,
            top_p: 1.0,
            timeout_secs: 300,
            max_retries: 3,
            retry_delay_ms: 1000,
        }
    }
}

impl HarnessConfig {
    /// Read a JSON file; missing fields take their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|e| {
            HarnessError::Config(format!("failed to parse {}: {e}", path.display()))
        })
    }

    /// Overlay `ENV_NAME`, `TOOL_NAME` and `CHUTES_API_KEY` when set.
    pub fn apply_env(&mut self) {
        self.apply_vars(|key| std::env::var(key).ok());
    }

    fn apply_vars(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(name) = var("ENV_NAME").filter(|v| !v.is_empty()) {
            self.env_name = name.to_lowercase();
        }
        if let Some(tool) = var("TOOL_NAME").filter(|v| !v.is_empty()) {
            self.tool_name = tool.to_lowercase();
        }
        if self.agent.api_key.is_empty() {
            if let Some(key) = var("CHUTES_API_KEY") {
                self.agent.api_key = key;
            }
        }
    }

    /// Registry key of the served environment.
    pub fn task_name(&self) -> &str {
        if UMBRELLA_ENVS.contains(&self.env_name.as_str()) && !self.tool_name.is_empty() {
            &self.tool_name
        } else {
            &self.env_name
        }
    }

    /// Environment server base, with `/{tool_name}` appended for `lmrlgym`.
    pub fn resolved_server_base(&self, base: &str) -> String {
        let base = base.trim_end_matches('/');
        if self.env_name == "lmrlgym" && !self.tool_name.is_empty() {
            format!("{base}/{}", self.tool_name)
        } else {
            base.to_string()
        }
    }

    /// Settings for every client in a pool.
    pub fn env_settings(&self) -> EnvSettings {
        EnvSettings::new(
            self.resolved_server_base(&self.env_server_base),
            self.data_len,
            self.timeout_secs,
        )
    }

    pub fn validate(&self) -> Result<()> {
        if self.n_clients == 0 {
            return Err(HarnessError::Config("n_clients must be at least 1".into()));
        }
        if self.env_server_base.trim().is_empty() {
            return Err(HarnessError::Config("env_server_base must not be empty".into()));
        }
        if self.max_round == 0 {
            return Err(HarnessError::Config("max_round must be at least 1".into()));
        }
        Ok(())
    }
}
