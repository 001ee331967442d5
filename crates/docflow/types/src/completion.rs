//! Terminal audit records for finished runs
//!
//! A [`CompletedRun`] is the immutable summary produced once a run reaches
//! a terminal state. It carries everything an audit needs (outcomes, log,
//! final context) without keeping the live run around.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    RunId, RunLogEntry, RunState, StepId, StepStatus, Workflow, WorkflowError, WorkflowId,
    WorkflowResult, WorkflowRun,
};

/// Outcome of one step within a finished run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StepOutcome {
    pub step_id: StepId,
    pub task_name: String,
    pub status: StepStatus,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub iterations: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Immutable record of a run that reached a terminal state
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CompletedRun {
    pub run_id: RunId,
    pub workflow_id: WorkflowId,
    pub workflow_name: String,
    pub final_state: RunState,
    /// One outcome per workflow step, in definition order. Steps the run
    /// never reached stay `pending`.
    pub step_outcomes: Vec<StepOutcome>,
    pub log: Vec<RunLogEntry>,
    /// The run context at the moment the run finished
    pub context: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
}

impl CompletedRun {
    /// Build the audit record from a terminal run and its definition
    pub fn from_run(run: &WorkflowRun, workflow: &Workflow) -> WorkflowResult<Self> {
        if !run.state.is_terminal() {
            return Err(WorkflowError::InvalidState {
                operation: "archive",
                state: run.state,
            });
        }
        let step_outcomes = workflow
            .steps
            .iter()
            .map(|step| {
                let state = run.step_state(&step.id).cloned().unwrap_or_default();
                StepOutcome {
                    step_id: step.id.clone(),
                    task_name: step.task.name().to_string(),
                    status: state.status,
                    attempts: state.attempts,
                    iterations: state.iterations,
                    error: state.error,
                }
            })
            .collect();
        Ok(Self {
            run_id: run.id.clone(),
            workflow_id: run.workflow_id.clone(),
            workflow_name: workflow.name.clone(),
            final_state: run.state,
            step_outcomes,
            log: run.log.clone(),
            context: run.context.clone(),
            started_at: run.started_at,
            ended_at: run.finished_at,
            duration_ms: run.duration_ms(),
        })
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn is_success(&self) -> bool {
        self.final_state == RunState::Completed
    }

    pub fn is_failure(&self) -> bool {
        self.final_state == RunState::Failed
    }

    pub fn outcome_for(&self, step: &StepId) -> Option<&StepOutcome> {
        self.step_outcomes.iter().find(|o| &o.step_id == step)
    }

    /// Steps that reached a terminal status (ran, failed, or were skipped)
    pub fn steps_executed(&self) -> usize {
        self.step_outcomes
            .iter()
            .filter(|o| o.status.is_terminal())
            .count()
    }

    pub fn steps_succeeded(&self) -> usize {
        self.count(StepStatus::Completed)
    }

    pub fn steps_failed(&self) -> usize {
        self.count(StepStatus::Failed)
    }

    pub fn steps_skipped(&self) -> usize {
        self.count(StepStatus::Skipped)
    }

    fn count(&self, status: StepStatus) -> usize {
        self.step_outcomes
            .iter()
            .filter(|o| o.status == status)
            .count()
    }
}
