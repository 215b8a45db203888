//! Evaluation: rollouts, batches and their aggregate report.

pub mod evaluator;
pub mod report;
pub mod run;

pub use evaluator::{EvaluationResult, Evaluator};
pub use report::{EvaluationDetail, EvaluationReport};
pub use run::{default_ids, run_batch, BatchSpec};
