//! One-shot batch evaluation shared by the HTTP service and the CLI.

use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use crate::agent::Agent;
use crate::env::{EnvRegistry, EnvSettings};
use crate::error::Result;
use crate::task::Task;

use super::evaluator::Evaluator;
use super::report::EvaluationReport;

/// Everything needed to evaluate one environment over a list of indices.
#[derive(Debug, Clone)]
pub struct BatchSpec {
    /// Registry key of the environment.
    pub env: String,
    /// Name reported back as `task_name`.
    pub report_name: String,
    pub settings: EnvSettings,
    pub n_clients: usize,
    pub max_round: usize,
    pub ids: Vec<usize>,
}

/// Indices evaluated when a caller names none: `0..min(data_len, cap)`.
pub fn default_ids(data_len: usize, cap: usize) -> Vec<usize> {
    (0..data_len.min(cap)).collect()
}

/// Build a pool, evaluate every index in `spec.ids`, then close the pool's
/// sessions.
///
/// Fails up front only for configuration problems (unknown environment,
/// empty pool). Per-index failures are recorded in the report.
pub async fn run_batch<A: Agent>(
    registry: &EnvRegistry,
    spec: &BatchSpec,
    agent: A,
) -> Result<EvaluationReport> {
    let run_id = Uuid::new_v4();
    let span = info_span!("batch", %run_id, env = %spec.env);

    async move {
        let task = Task::from_factory(spec.env.as_str(), spec.n_clients, || {
            registry.build(&spec.env, &spec.settings)
        })?;
        info!(
            ids = spec.ids.len(),
            n_clients = task.n_clients(),
            max_round = spec.max_round,
            "starting evaluation"
        );

        let evaluator = Evaluator::new(agent, spec.max_round);
        let mut report = if task.n_clients() > 1 {
            evaluator.evaluate_concurrent(&task, &spec.ids).await
        } else {
            evaluator.evaluate(&task, &spec.ids).await
        };
        task.close_all().await;

        report.task_name = spec.report_name.clone();
        info!(
            total_score = report.total_score,
            success_rate = report.success_rate,
            errors = report.errors(),
            time_taken = report.time_taken,
            "evaluation finished"
        );
        Ok(report)
    }
    .instrument(span)
    .await
}
