//! The rollout loop: agent ⇄ environment for one data index, and batches of
//! them.

use std::time::Instant;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::agent::Agent;
use crate::conversation::ConversationMessage;
use crate::env::EnvClient;
use crate::error::Result;
use crate::task::Task;

use super::report::{EvaluationDetail, EvaluationReport};

/// Outcome of one rollout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// Sum of the rewards reported by every step.
    pub score: f64,
    pub success: bool,
    /// Steps issued (priming turns excluded).
    pub rounds: usize,
    /// The full conversation, priming turns included.
    pub experiences: Vec<ConversationMessage>,
}

/// Drives an [`Agent`] against the clients of a [`Task`].
#[derive(Debug)]
pub struct Evaluator<A> {
    agent: A,
    max_rounds: usize,
}

impl<A: Agent> Evaluator<A> {
    pub fn new(agent: A, max_rounds: usize) -> Self {
        Self { agent, max_rounds }
    }

    pub fn agent(&self) -> &A {
        &self.agent
    }

    pub fn max_rounds(&self) -> usize {
        self.max_rounds
    }

    /// Run one rollout on `data_idx`.
    ///
    /// Holds the slot for `data_idx` until the rollout ends. Any network or
    /// agent error ends the rollout and is returned to the caller.
    pub async fn rollout<C: EnvClient>(&self, task: &Task<C>, data_idx: usize) -> Result<EvaluationResult> {
        let span = info_span!("rollout", env = %task.name(), data_idx);
        async move {
            let mut handle = task.select(data_idx).await?;

            let mut conversation = handle.conversation_start().to_vec();
            conversation.push(ConversationMessage::human(handle.observe()));

            let mut score = 0.0;
            let mut success = false;
            let mut rounds = 0;

            while rounds < self.max_rounds {
                let action = self.agent.generate(&conversation).await?;
                conversation.push(ConversationMessage::agent(action.as_str()));

                let output = handle.step(&action).await?;
                rounds += 1;
                score += output.reward;
                debug!(round = rounds, reward = output.reward, done = output.done, "step");

                let done = output.done;
                let solved = done && handle.is_success(&output);
                conversation.push(ConversationMessage::human(output.state));

                if done {
                    success = solved;
                    break;
                }
            }

            info!(score, success, rounds, "rollout finished");
            Ok(EvaluationResult {
                score,
                success,
                rounds,
                experiences: conversation,
            })
        }
        .instrument(span)
        .await
    }

    /// Evaluate `ids` one after another. Per-index errors are recorded in
    /// the report and never stop the batch.
    pub async fn evaluate<C: EnvClient>(&self, task: &Task<C>, ids: &[usize]) -> EvaluationReport {
        let started = Instant::now();
        let mut details = Vec::with_capacity(ids.len());
        for &id in ids {
            details.push(self.detail(task, id).await);
        }
        EvaluationReport::aggregate(task.name(), details, started.elapsed())
    }

    /// Like [`evaluate`](Self::evaluate), but keeps up to `n_clients`
    /// rollouts in flight. Details stay in `ids` order.
    pub async fn evaluate_concurrent<C: EnvClient>(
        &self,
        task: &Task<C>,
        ids: &[usize],
    ) -> EvaluationReport {
        let started = Instant::now();
        let details = stream::iter(ids.iter().copied())
            .map(|id| self.detail(task, id))
            .buffered(task.n_clients().max(1))
            .collect::<Vec<_>>()
            .await;
        EvaluationReport::aggregate(task.name(), details, started.elapsed())
    }

    async fn detail<C: EnvClient>(&self, task: &Task<C>, id: usize) -> EvaluationDetail {
        match self.rollout(task, id).await {
            Ok(result) => EvaluationDetail::completed(id, result),
            Err(e) => {
                warn!(env = %task.name(), data_idx = id, error = %e, "rollout failed");
                EvaluationDetail::failed(id, &e)
            }
        }
    }
}
