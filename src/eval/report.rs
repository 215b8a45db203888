//! Per-index details and batch aggregation.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::conversation::ConversationMessage;
use crate::error::HarnessError;

use super::evaluator::EvaluationResult;

/// Outcome of one data index inside a batch.
///
/// Exactly one of `experiences` / `error` is present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationDetail {
    pub id: usize,
    pub reward: f64,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experiences: Option<Vec<ConversationMessage>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EvaluationDetail {
    pub fn completed(id: usize, result: EvaluationResult) -> Self {
        Self {
            id,
            reward: result.score,
            success: result.success,
            experiences: Some(result.experiences),
            error: None,
        }
    }

    /// A rollout that raised: scored 0 and unsuccessful.
    pub fn failed(id: usize, error: &HarnessError) -> Self {
        Self {
            id,
            reward: 0.0,
            success: false,
            experiences: None,
            error: Some(error.to_string()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Aggregate metrics for one batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub task_name: String,
    /// Mean score over every attempted index (errors count as 0).
    pub total_score: f64,
    /// Mean of per-index success flags as 0/1.
    pub success_rate: f64,
    pub num_evaluated: usize,
    /// Wall-clock seconds.
    pub time_taken: f64,
    pub details: Vec<EvaluationDetail>,
}

impl EvaluationReport {
    pub fn aggregate(
        task_name: impl Into<String>,
        details: Vec<EvaluationDetail>,
        elapsed: Duration,
    ) -> Self {
        let num_evaluated = details.len();
        let (total_score, success_rate) = if num_evaluated == 0 {
            (0.0, 0.0)
        } else {
            let n = num_evaluated as f64;
            let score: f64 = details.iter().map(|d| d.reward).sum();
            let successes = details.iter().filter(|d| d.success).count() as f64;
            (score / n, successes / n)
        };

        Self {
            task_name: task_name.into(),
            total_score,
            success_rate,
            num_evaluated,
            time_taken: elapsed.as_secs_f64(),
            details,
        }
    }

    pub fn errors(&self) -> usize {
        self.details.iter().filter(|d| d.is_error()).count()
    }
}
