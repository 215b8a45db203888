//! gymharness: evaluate language-model agents on remote text environments
//!
//! Environment servers (BabyAI, TextCraft, SciWorld, ALFWorld, WebShop,
//! SQLGym, ...) are driven over HTTP through per-environment clients. A task
//! pools those clients and an evaluator runs multi-turn rollouts between an
//! agent and the pool, aggregating rewards into a report.

pub mod agent;
pub mod config;
pub mod conversation;
pub mod env;
pub mod error;
pub mod eval;
pub mod server;
pub mod task;

pub use config::{AgentConfig, HarnessConfig};
pub use error::{HarnessError, Result};
