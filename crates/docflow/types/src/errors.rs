//! Error taxonomy for the workflow model and engine
//!
//! Validation variants fire at load time and never at run time. Dispatch
//! variants (`Timeout`, `Handler`) are recoverable up to a task's
//! `retry_count` and are converted to failed task results at the dispatcher;
//! they only reach callers through log messages. Loop truncation and
//! unresolved condition fields are deliberately *not* errors; they are
//! warning-level log entries and execution continues.

use crate::{AutomatedTaskType, RunId, RunState, StepId, WorkflowId};
use thiserror::Error;

/// All failure modes of the workflow model and engine
#[derive(Debug, Error)]
pub enum WorkflowError {
    // ── Definition validation (load time) ────────────────────────────
    #[error("duplicate step id: {0}")]
    DuplicateStepId(StepId),

    #[error("step {step} references unknown next step {target}")]
    UnknownNextStep { step: StepId, target: StepId },

    #[error("workflow graph contains a cycle through step {0}")]
    GraphCycle(StepId),

    #[error("step {0} carries more than one loop rule")]
    MultipleLoopRules(StepId),

    #[error("step {0} has a loop bound of zero")]
    InvalidLoopBound(StepId),

    // ── Run control ──────────────────────────────────────────────────
    #[error("invalid initial context: {0}")]
    InvalidContext(String),

    #[error("cannot {operation} a run in state {state}")]
    InvalidState {
        operation: &'static str,
        state: RunState,
    },

    #[error("workflow {0} is inactive and cannot be started by a trigger")]
    WorkflowInactive(WorkflowId),

    #[error("run {0} was cancelled")]
    RunCancelled(RunId),

    // ── Dispatch ─────────────────────────────────────────────────────
    #[error("no action handler registered for task type {0}")]
    UnregisteredAction(AutomatedTaskType),

    #[error("task {task} timed out after {timeout_ms}ms")]
    Timeout { task: String, timeout_ms: u64 },

    #[error("handler for task {task} failed: {message}")]
    Handler { task: String, message: String },

    #[error("no human task awaiting a signal for step {step} of run {run}")]
    NoPendingSignal { run: RunId, step: StepId },

    // ── Lookup ───────────────────────────────────────────────────────
    #[error("workflow not found: {0}")]
    WorkflowNotFound(WorkflowId),

    #[error("run not found: {0}")]
    RunNotFound(RunId),

    #[error("step not found: {0}")]
    StepNotFound(StepId),

    // ── Storage ──────────────────────────────────────────────────────
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result alias used throughout docflow
pub type WorkflowResult<T> = Result<T, WorkflowError>;
