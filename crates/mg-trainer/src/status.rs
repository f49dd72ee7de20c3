//! Trial history and per-space run status.

use chrono::{DateTime, Utc};
use mg_types::{EvalStatus, EvaluationResult, Params};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One evaluated candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    pub id: Uuid,
    /// Position within the space's run, counting from 0.
    pub trial_number: usize,
    pub round: usize,
    pub params: Params,
    pub loss: f64,
    pub status: EvalStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub finished_at: DateTime<Utc>,
}

impl Trial {
    pub fn from_result(trial_number: usize, round: usize, result: &EvaluationResult) -> Self {
        Self {
            id: Uuid::new_v4(),
            trial_number,
            round,
            params: result.params.clone(),
            loss: result.loss,
            status: result.status,
            error: result.error.clone(),
            finished_at: Utc::now(),
        }
    }
}

/// Lifecycle state of one space's optimization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Pending,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpaceRunStatus {
    pub state: RunState,
    pub rounds_completed: usize,
    pub evaluations_completed: usize,
    pub evaluations_failed: usize,
    /// Lowest finite loss told to the optimizer so far.
    pub best_loss: Option<f64>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl Default for SpaceRunStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl SpaceRunStatus {
    pub fn new() -> Self {
        Self {
            state: RunState::Pending,
            rounds_completed: 0,
            evaluations_completed: 0,
            evaluations_failed: 0,
            best_loss: None,
            started_at: None,
            finished_at: None,
            error: None,
        }
    }

    pub fn mark_running(&mut self) {
        self.state = RunState::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn mark_completed(&mut self) {
        self.state = RunState::Completed;
        self.finished_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self, error: String) {
        self.state = RunState::Failed;
        self.finished_at = Some(Utc::now());
        self.error = Some(error);
    }

    /// Count a joined round and lower `best_loss` if any result improves it.
    pub fn record_round(&mut self, results: &[EvaluationResult]) {
        self.rounds_completed += 1;
        for result in results {
            if result.is_ok() {
                self.evaluations_completed += 1;
            } else {
                self.evaluations_failed += 1;
            }
            if result.loss.is_finite() && self.best_loss.map_or(true, |best| result.loss < best) {
                self.best_loss = Some(result.loss);
            }
        }
    }
}
