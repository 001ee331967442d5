//! Task dispatch: takes one task through to its result
//!
//! The dispatcher executes a single task and reports a [`TaskResult`].
//! Runtime failures (handler errors, timeouts, exhausted retries, failure
//! signals) come back as failed results for the runner to weigh. Only a
//! missing handler is an `Err`: that is a wiring mistake, not an outcome.

use std::sync::Arc;
use std::time::Duration;

use docflow_types::{
    AutomatedTask, HumanTask, RunId, StepId, Task, TaskStatus, WorkflowError, WorkflowResult,
};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::actions::{ActionHandler, ActionRegistry};
use crate::signals::{SignalHub, TaskSignal};

/// Outcome of executing one task
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TaskResult {
    /// `completed` or `failed`
    pub status: TaskStatus,
    /// Handler or signal output; a JSON object merges into the run context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Executions actually made, retries included
    pub attempts: u32,
}

impl TaskResult {
    pub fn completed(output: Option<Value>, attempts: u32) -> Self {
        Self {
            status: TaskStatus::Completed,
            output,
            error: None,
            attempts,
        }
    }

    pub fn failed(error: impl Into<String>, attempts: u32) -> Self {
        Self {
            status: TaskStatus::Failed,
            output: None,
            error: Some(error.into()),
            attempts,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == TaskStatus::Completed
    }
}

/// Executes tasks: automated ones through the action registry, human ones
/// by waiting on the signal hub
pub struct TaskDispatcher {
    registry: Arc<ActionRegistry>,
    signals: Arc<SignalHub>,
}

impl TaskDispatcher {
    pub fn new(registry: Arc<ActionRegistry>, signals: Arc<SignalHub>) -> Self {
        Self { registry, signals }
    }

    pub fn signals(&self) -> &Arc<SignalHub> {
        &self.signals
    }

    /// Execute one task to its result.
    ///
    /// Returns `Err` only for [`WorkflowError::UnregisteredAction`] and,
    /// for human tasks, [`WorkflowError::RunCancelled`] when the waiting
    /// channel is torn down under the task.
    pub async fn dispatch(
        &self,
        run_id: &RunId,
        step_id: &StepId,
        task: &Task,
        context: &Value,
    ) -> WorkflowResult<TaskResult> {
        match task {
            Task::Human(human) => self.await_human(run_id, step_id, human).await,
            Task::Automated(automated) => self.run_automated(automated, context).await,
        }
    }

    /// Suspend until the signal hub resolves this step
    async fn await_human(
        &self,
        run_id: &RunId,
        step_id: &StepId,
        task: &HumanTask,
    ) -> WorkflowResult<TaskResult> {
        let receiver = self.signals.subscribe(run_id.clone(), step_id.clone());
        info!(
            run = %run_id,
            step = %step_id,
            task = %task.name,
            task_type = %task.task_type,
            "Waiting for human task"
        );

        match receiver.await {
            Ok(TaskSignal::Completed { output }) => Ok(TaskResult::completed(Some(output), 1)),
            Ok(TaskSignal::Failed { error }) => Ok(TaskResult::failed(error, 1)),
            // Channel dropped without a signal: the run was torn down
            Err(_) => Err(WorkflowError::RunCancelled(run_id.clone())),
        }
    }

    /// Run an automated task, retrying immediately on failure up to its
    /// retry budget
    async fn run_automated(
        &self,
        task: &AutomatedTask,
        context: &Value,
    ) -> WorkflowResult<TaskResult> {
        let handler = self
            .registry
            .get(task.task_type)
            .ok_or(WorkflowError::UnregisteredAction(task.task_type))?;

        let total_attempts = task.retry_count + 1;
        let mut last_error = None;

        for attempt in 1..=total_attempts {
            match self.attempt(handler.as_ref(), task, context).await {
                Ok(output) => {
                    debug!(task = %task.name, attempt, "Automated task completed");
                    return Ok(TaskResult::completed(Some(output), attempt));
                }
                Err(error) => {
                    warn!(
                        task = %task.name,
                        attempt,
                        remaining = total_attempts - attempt,
                        %error,
                        "Automated task attempt failed"
                    );
                    last_error = Some(error.to_string());
                }
            }
        }

        Ok(TaskResult::failed(
            last_error.unwrap_or_else(|| "task failed".into()),
            total_attempts,
        ))
    }

    /// One attempt, bounded by the task's timeout when it has one
    async fn attempt(
        &self,
        handler: &dyn ActionHandler,
        task: &AutomatedTask,
        context: &Value,
    ) -> WorkflowResult<Value> {
        match task.timeout_ms {
            Some(timeout_ms) => {
                let result = tokio::time::timeout(
                    Duration::from_millis(timeout_ms),
                    handler.execute(&task.config, context),
                )
                .await;
                match result {
                    Ok(Ok(output)) => Ok(output),
                    Ok(Err(error)) => Err(WorkflowError::Handler {
                        task: task.name.clone(),
                        message: error.to_string(),
                    }),
                    Err(_) => Err(WorkflowError::Timeout {
                        task: task.name.clone(),
                        timeout_ms,
                    }),
                }
            }
            None => handler
                .execute(&task.config, context)
                .await
                .map_err(|error| WorkflowError::Handler {
                    task: task.name.clone(),
                    message: error.to_string(),
                }),
        }
    }
}
