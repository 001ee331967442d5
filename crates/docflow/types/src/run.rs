//! Run state: one execution of a workflow
//!
//! A [`WorkflowRun`] owns everything that changes while a workflow
//! executes: the lifecycle state, per-step statuses, the mutable JSON
//! context, and an append-only log. The workflow definition itself stays
//! untouched. Lifecycle transitions are checked; an out-of-order request
//! (resuming a cancelled run, pausing an idle one) fails with
//! [`WorkflowError::InvalidState`] instead of silently bending the state
//! machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::{StepId, WorkflowError, WorkflowId, WorkflowResult};

// ── Identifiers ──────────────────────────────────────────────────────

/// Unique identifier for a workflow run
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn short(&self) -> &str {
        &self.0[..8.min(self.0.len())]
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Lifecycle states ─────────────────────────────────────────────────

/// Lifecycle state of a run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Created (or reset) but not yet started
    #[default]
    Idle,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl RunState {
    /// Terminal states admit no further transitions except `reset`
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Running or paused: the run has started and not yet finished
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running | Self::Paused)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Execution status of a single step within a run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
    /// Skipped by a failed condition. Terminal but not a failure.
    Skipped,
}

impl StepStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ── Log ──────────────────────────────────────────────────────────────

/// Severity of a run log entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// One entry in a run's append-only log.
///
/// `sequence` numbers are contiguous from 0 in append order, which under
/// parallel branches is the order outcomes were determined, not the order
/// steps appear in the definition.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunLogEntry {
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<StepId>,
    pub level: LogLevel,
    pub message: String,
}

// ── Per-step state ───────────────────────────────────────────────────

/// Mutable execution state for a single step
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StepState {
    #[serde(default)]
    pub status: StepStatus,
    /// Dispatch attempts actually made (1 + retries used)
    #[serde(default)]
    pub attempts: u32,
    /// Loop iterations actually executed
    #[serde(default)]
    pub iterations: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Set for a human task still pending past its due date
    #[serde(default)]
    pub overdue: bool,
}

// ── Run ──────────────────────────────────────────────────────────────

/// One execution of a workflow
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub id: RunId,
    pub workflow_id: WorkflowId,
    pub state: RunState,
    #[serde(default)]
    pub step_states: HashMap<StepId, StepState>,
    /// Steps claimed next when execution proceeds; survives pause
    #[serde(default)]
    pub frontier: Vec<StepId>,
    /// Mutable run context; step outputs merge into it
    pub context: Value,
    /// The context the run began with, kept verbatim for `reset`
    pub initial_context: Value,
    #[serde(default)]
    pub log: Vec<RunLogEntry>,
    #[serde(default)]
    next_sequence: u64,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl WorkflowRun {
    /// Create an idle run. The initial context must be a JSON object so
    /// that step outputs have a root to merge into.
    pub fn new(workflow_id: WorkflowId, initial_context: Value) -> WorkflowResult<Self> {
        if !initial_context.is_object() {
            return Err(WorkflowError::InvalidContext(format!(
                "initial context must be a JSON object, got {}",
                json_kind(&initial_context)
            )));
        }
        Ok(Self {
            id: RunId::generate(),
            workflow_id,
            state: RunState::Idle,
            step_states: HashMap::new(),
            frontier: Vec::new(),
            context: initial_context.clone(),
            initial_context,
            log: Vec::new(),
            next_sequence: 0,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        })
    }

    // ── Lifecycle transitions ────────────────────────────────────────

    /// Idle → Running
    pub fn start(&mut self) -> WorkflowResult<()> {
        if self.state != RunState::Idle {
            return Err(self.invalid("start"));
        }
        self.state = RunState::Running;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// Running → Paused
    pub fn pause(&mut self) -> WorkflowResult<()> {
        if self.state != RunState::Running {
            return Err(self.invalid("pause"));
        }
        self.state = RunState::Paused;
        Ok(())
    }

    /// Paused → Running
    pub fn resume(&mut self) -> WorkflowResult<()> {
        if self.state != RunState::Paused {
            return Err(self.invalid("resume"));
        }
        self.state = RunState::Running;
        Ok(())
    }

    /// Running → Completed
    pub fn complete(&mut self) -> WorkflowResult<()> {
        if self.state != RunState::Running {
            return Err(self.invalid("complete"));
        }
        self.state = RunState::Completed;
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    /// Running → Failed
    pub fn fail(&mut self) -> WorkflowResult<()> {
        if self.state != RunState::Running {
            return Err(self.invalid("fail"));
        }
        self.state = RunState::Failed;
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    /// Any non-terminal state → Cancelled
    pub fn cancel(&mut self) -> WorkflowResult<()> {
        if self.state.is_terminal() {
            return Err(self.invalid("cancel"));
        }
        self.state = RunState::Cancelled;
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    /// Back to Idle from any state: step states, frontier, log, and
    /// timestamps are cleared and the context reverts to the initial one.
    pub fn reset(&mut self) {
        self.state = RunState::Idle;
        self.step_states.clear();
        self.frontier.clear();
        self.context = self.initial_context.clone();
        self.log.clear();
        self.next_sequence = 0;
        self.started_at = None;
        self.finished_at = None;
    }

    fn invalid(&self, operation: &'static str) -> WorkflowError {
        WorkflowError::InvalidState {
            operation,
            state: self.state,
        }
    }

    // ── Step state ───────────────────────────────────────────────────

    pub fn step_state(&self, step: &StepId) -> Option<&StepState> {
        self.step_states.get(step)
    }

    pub fn step_state_mut(&mut self, step: &StepId) -> &mut StepState {
        self.step_states.entry(step.clone()).or_default()
    }

    pub fn step_status(&self, step: &StepId) -> StepStatus {
        self.step_states
            .get(step)
            .map(|s| s.status)
            .unwrap_or_default()
    }

    /// Mark a step in progress. Not logged; outcomes are, starts are not.
    pub fn mark_step_started(&mut self, step: &StepId) {
        let state = self.step_state_mut(step);
        state.status = StepStatus::InProgress;
        if state.started_at.is_none() {
            state.started_at = Some(Utc::now());
        }
    }

    pub fn mark_step_completed(&mut self, step: &StepId, message: impl Into<String>) {
        let state = self.step_state_mut(step);
        state.status = StepStatus::Completed;
        state.finished_at = Some(Utc::now());
        self.push_log(Some(step.clone()), LogLevel::Success, message.into());
    }

    pub fn mark_step_failed(&mut self, step: &StepId, error: impl Into<String>) {
        let error = error.into();
        let state = self.step_state_mut(step);
        state.status = StepStatus::Failed;
        state.finished_at = Some(Utc::now());
        state.error = Some(error.clone());
        self.push_log(Some(step.clone()), LogLevel::Error, error);
    }

    pub fn mark_step_skipped(&mut self, step: &StepId, reason: impl Into<String>) {
        let state = self.step_state_mut(step);
        state.status = StepStatus::Skipped;
        state.finished_at = Some(Utc::now());
        self.push_log(Some(step.clone()), LogLevel::Info, reason.into());
    }

    // ── Log ──────────────────────────────────────────────────────────

    pub fn log_info(&mut self, step: Option<StepId>, message: impl Into<String>) {
        self.push_log(step, LogLevel::Info, message.into());
    }

    pub fn log_warning(&mut self, step: Option<StepId>, message: impl Into<String>) {
        self.push_log(step, LogLevel::Warning, message.into());
    }

    pub fn log_error(&mut self, step: Option<StepId>, message: impl Into<String>) {
        self.push_log(step, LogLevel::Error, message.into());
    }

    fn push_log(&mut self, step_id: Option<StepId>, level: LogLevel, message: String) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.log.push(RunLogEntry {
            sequence,
            timestamp: Utc::now(),
            step_id,
            level,
            message,
        });
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// Steps currently marked in progress
    pub fn in_progress_steps(&self) -> Vec<StepId> {
        self.step_states
            .iter()
            .filter(|(_, s)| s.status == StepStatus::InProgress)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// In-progress steps plus the frontier waiting to be claimed
    pub fn current_steps(&self) -> Vec<StepId> {
        let mut steps = self.in_progress_steps();
        for id in &self.frontier {
            if !steps.contains(id) {
                steps.push(id.clone());
            }
        }
        steps
    }

    /// Wall-clock duration, once started
    pub fn duration_ms(&self) -> Option<i64> {
        let started = self.started_at?;
        let ended = self.finished_at.unwrap_or_else(Utc::now);
        Some(ended.signed_duration_since(started).num_milliseconds())
    }

    /// Point-in-time view for monitoring
    pub fn snapshot(&self) -> RunSnapshot {
        RunSnapshot {
            run_id: self.id.clone(),
            workflow_id: self.workflow_id.clone(),
            state: self.state,
            current_steps: self.current_steps(),
            step_statuses: self
                .step_states
                .iter()
                .map(|(id, s)| (id.clone(), s.status))
                .collect(),
            log: self.log.clone(),
        }
    }
}

/// Point-in-time view of a run, safe to hand to monitors
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub run_id: RunId,
    pub workflow_id: WorkflowId,
    pub state: RunState,
    pub current_steps: Vec<StepId>,
    pub step_statuses: HashMap<StepId, StepStatus>,
    pub log: Vec<RunLogEntry>,
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
