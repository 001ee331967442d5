//! Workflow traversal: drives a run across the step graph
//!
//! The runner claims ready steps, executes their tasks through the
//! dispatcher, and folds each outcome back into the run as it arrives.
//! Independent branches execute concurrently; the run log is ordered by
//! outcome arrival, not by definition order. A step is claimed at most
//! once per run, so converging branches execute their join step a single
//! time, when the first incoming branch reaches it.
//!
//! Skipped steps do not dead-end their branch: traversal continues with
//! their successors. Pausing lets in-flight work finish and parks
//! not-yet-claimed successors on the run's frontier; cancelling discards
//! in-flight results when they arrive.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use docflow_types::{
    RunId, RunState, StepId, StepStatus, Workflow, WorkflowError, WorkflowResult, WorkflowRun,
    WorkflowStep,
};
use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::dispatcher::{TaskDispatcher, TaskResult};
use crate::evaluator::{ConditionVerdict, LoopPlan, RuleEvaluator};

/// Failure policy for a run
#[derive(Clone, Copy, Debug)]
pub struct RunPolicy {
    /// Fail the run on the first failed step, dropping in-flight branch
    /// work. When false, sibling branches run to their ends and the run
    /// fails once everything settles.
    pub fail_fast: bool,
}

impl Default for RunPolicy {
    fn default() -> Self {
        Self { fail_fast: true }
    }
}

/// Executed result of one claimed step
struct StepRun {
    result: TaskResult,
    iterations: u32,
    warnings: Vec<String>,
    /// Object outputs in execution order, already applied to the step's
    /// working context, pending application to the run context
    outputs: Vec<Value>,
}

type StepFuture = BoxFuture<'static, (StepId, WorkflowResult<StepRun>)>;

/// Drives workflow runs over their step graphs
pub struct WorkflowRunner {
    evaluator: RuleEvaluator,
    dispatcher: Arc<TaskDispatcher>,
    policy: RunPolicy,
}

impl WorkflowRunner {
    pub fn new(dispatcher: Arc<TaskDispatcher>) -> Self {
        Self {
            evaluator: RuleEvaluator::new(),
            dispatcher,
            policy: RunPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RunPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn dispatcher(&self) -> &Arc<TaskDispatcher> {
        &self.dispatcher
    }

    /// Drive a running run until it settles: completed, failed,
    /// cancelled, or paused with nothing in flight.
    ///
    /// Returns the state the run settled in. The only `Err` is a wiring
    /// failure ([`WorkflowError::UnregisteredAction`]); the run is failed
    /// before it propagates.
    pub async fn drive(
        &self,
        workflow: &Workflow,
        run: &Mutex<WorkflowRun>,
    ) -> WorkflowResult<RunState> {
        let mut claimed: HashSet<StepId> = HashSet::new();
        let mut in_flight: FuturesUnordered<StepFuture> = FuturesUnordered::new();

        let run_id = {
            let mut guard = run.lock().await;
            if guard.state != RunState::Running {
                return Ok(guard.state);
            }
            let run_id = guard.id.clone();

            // Settled and in-flight steps stay claimed across pauses
            for (id, state) in &guard.step_states {
                if state.status.is_terminal() || state.status == StepStatus::InProgress {
                    claimed.insert(id.clone());
                }
            }

            // A step that failed while the run was paused settles it now
            if self.policy.fail_fast
                && guard
                    .step_states
                    .values()
                    .any(|s| s.status == StepStatus::Failed)
            {
                guard.fail()?;
                drop(guard);
                self.dispatcher.signals().drop_run(&run_id);
                return Ok(RunState::Failed);
            }

            let seeds = if guard.frontier.is_empty() && guard.step_states.is_empty() {
                workflow
                    .entry_step()
                    .map(|step| vec![step.id.clone()])
                    .unwrap_or_default()
            } else {
                std::mem::take(&mut guard.frontier)
            };
            self.claim(workflow, &run_id, &mut guard, seeds, &mut claimed, &mut in_flight);
            run_id
        };

        loop {
            while let Some((step_id, outcome)) = in_flight.next().await {
                let mut guard = run.lock().await;
                if guard.state == RunState::Cancelled {
                    // Discard; keep draining so nothing lands later
                    continue;
                }

                match outcome {
                    // The waiting channel was torn down under a human
                    // task; the cancel path already owns the run
                    Err(WorkflowError::RunCancelled(_)) => continue,
                    Err(error) => {
                        guard.mark_step_failed(&step_id, error.to_string());
                        if guard.state == RunState::Running {
                            guard.fail()?;
                        }
                        drop(guard);
                        self.dispatcher.signals().drop_run(&run_id);
                        return Err(error);
                    }
                    Ok(step_run) => {
                        self.record_outcome(workflow, &run_id, &mut guard, &step_id, step_run)?;
                        if guard.state == RunState::Failed {
                            drop(guard);
                            self.dispatcher.signals().drop_run(&run_id);
                            return Ok(RunState::Failed);
                        }
                        if guard.state == RunState::Running {
                            // Failed steps dead-end their branch; only a
                            // completed step releases its successors
                            let mut seeds = std::mem::take(&mut guard.frontier);
                            if guard.step_status(&step_id) == StepStatus::Completed {
                                seeds.extend(workflow.successors(&step_id));
                            }
                            self.claim(
                                workflow,
                                &run_id,
                                &mut guard,
                                seeds,
                                &mut claimed,
                                &mut in_flight,
                            );
                        } else if guard.state == RunState::Paused
                            && guard.step_status(&step_id) == StepStatus::Completed
                        {
                            // Park successors for resume
                            for successor in workflow.successors(&step_id) {
                                if !guard.frontier.contains(&successor) {
                                    guard.frontier.push(successor);
                                }
                            }
                        }
                    }
                }
            }

            // Nothing in flight; settle
            let mut guard = run.lock().await;
            match guard.state {
                RunState::Running => {
                    // A resume may have landed between the last arrival
                    // and the drain running dry
                    let seeds = std::mem::take(&mut guard.frontier);
                    if !seeds.is_empty() {
                        self.claim(workflow, &run_id, &mut guard, seeds, &mut claimed, &mut in_flight);
                        if !in_flight.is_empty() {
                            continue;
                        }
                    }
                    let any_failed = guard
                        .step_states
                        .values()
                        .any(|s| s.status == StepStatus::Failed);
                    if any_failed {
                        guard.fail()?;
                        info!(run = %run_id, "Run failed");
                    } else {
                        guard.complete()?;
                        info!(run = %run_id, "Run completed");
                    }
                    let state = guard.state;
                    drop(guard);
                    self.dispatcher.signals().drop_run(&run_id);
                    return Ok(state);
                }
                RunState::Paused => {
                    info!(run = %run_id, "Run paused with nothing in flight");
                    return Ok(RunState::Paused);
                }
                RunState::Cancelled => {
                    drop(guard);
                    self.dispatcher.signals().drop_run(&run_id);
                    return Ok(RunState::Cancelled);
                }
                state => return Ok(state),
            }
        }
    }

    /// Execute exactly one ready step inline, then park the run.
    ///
    /// Steps whose conditions do not pass are skipped on the way to the
    /// first executable one. Returns the executed step, or `None` when
    /// the run settled with nothing left to execute.
    pub async fn step_once(
        &self,
        workflow: &Workflow,
        run: &Mutex<WorkflowRun>,
    ) -> WorkflowResult<Option<StepId>> {
        let (step, context, run_id) = {
            let mut guard = run.lock().await;
            if guard.state != RunState::Running {
                return Err(WorkflowError::InvalidState {
                    operation: "step_forward",
                    state: guard.state,
                });
            }
            let run_id = guard.id.clone();

            let mut queue: VecDeque<StepId> =
                if guard.frontier.is_empty() && guard.step_states.is_empty() {
                    workflow.entry_step().map(|step| step.id.clone()).into_iter().collect()
                } else {
                    std::mem::take(&mut guard.frontier).into()
                };

            let mut chosen: Option<WorkflowStep> = None;
            while let Some(step_id) = queue.pop_front() {
                if guard.step_status(&step_id).is_terminal() {
                    continue;
                }
                let Some(step) = workflow.get_step(&step_id) else {
                    continue;
                };
                match self.evaluator.step_verdict(step, &guard.context) {
                    ConditionVerdict::Passed => {
                        guard.mark_step_started(&step_id);
                        chosen = Some(step.clone());
                        break;
                    }
                    ConditionVerdict::Failed { reason } => {
                        guard.mark_step_skipped(
                            &step_id,
                            format!("task '{}' skipped: {}", step.task.name(), reason),
                        );
                        queue.extend(workflow.successors(&step_id));
                    }
                    ConditionVerdict::Unresolved { field } => {
                        guard.log_warning(
                            Some(step_id.clone()),
                            format!("condition field '{}' did not resolve; failing closed", field),
                        );
                        guard.mark_step_skipped(
                            &step_id,
                            format!(
                                "task '{}' skipped: condition field '{}' is missing",
                                step.task.name(),
                                field
                            ),
                        );
                        queue.extend(workflow.successors(&step_id));
                    }
                }
            }

            match chosen {
                Some(step) => {
                    for step_id in queue {
                        if !guard.frontier.contains(&step_id) {
                            guard.frontier.push(step_id);
                        }
                    }
                    (step, guard.context.clone(), run_id)
                }
                None => {
                    // Everything ahead was skipped or already settled
                    let any_failed = guard
                        .step_states
                        .values()
                        .any(|s| s.status == StepStatus::Failed);
                    if any_failed {
                        guard.fail()?;
                    } else {
                        guard.complete()?;
                    }
                    return Ok(None);
                }
            }
        };

        let step_id = step.id.clone();
        let outcome = run_step(
            self.evaluator.clone(),
            Arc::clone(&self.dispatcher),
            run_id.clone(),
            step,
            context,
        )
        .await?;

        let mut guard = run.lock().await;
        if guard.state == RunState::Cancelled {
            return Ok(Some(step_id));
        }
        self.record_outcome(workflow, &run_id, &mut guard, &step_id, outcome)?;

        if guard.state == RunState::Running {
            if guard.step_status(&step_id) == StepStatus::Completed {
                for successor in workflow.successors(&step_id) {
                    if !guard.frontier.contains(&successor) {
                        guard.frontier.push(successor);
                    }
                }
            }
            if guard.frontier.is_empty() {
                let any_failed = guard
                    .step_states
                    .values()
                    .any(|s| s.status == StepStatus::Failed);
                if any_failed {
                    guard.fail()?;
                } else {
                    guard.complete()?;
                }
            } else {
                guard.pause()?;
            }
        }
        Ok(Some(step_id))
    }

    /// Fold one executed step back into the run, in arrival order
    fn record_outcome(
        &self,
        workflow: &Workflow,
        run_id: &RunId,
        guard: &mut WorkflowRun,
        step_id: &StepId,
        step_run: StepRun,
    ) -> WorkflowResult<()> {
        for warning in &step_run.warnings {
            guard.log_warning(Some(step_id.clone()), warning.clone());
        }
        for output in &step_run.outputs {
            merge_object(&mut guard.context, output);
        }
        {
            let state = guard.step_state_mut(step_id);
            state.attempts = step_run.result.attempts;
            state.iterations = step_run.iterations;
        }

        let task_name = workflow
            .get_step(step_id)
            .map(|s| s.task.name().to_string())
            .unwrap_or_else(|| step_id.to_string());

        if step_run.result.is_completed() {
            let message = if step_run.iterations > 1 {
                format!(
                    "task '{}' completed after {} iterations",
                    task_name, step_run.iterations
                )
            } else {
                format!("task '{}' completed", task_name)
            };
            guard.mark_step_completed(step_id, message);
        } else {
            let error = step_run
                .result
                .error
                .clone()
                .unwrap_or_else(|| "task failed".into());
            guard.mark_step_failed(step_id, format!("task '{}' failed: {}", task_name, error));
            warn!(run = %run_id, step = %step_id, "Step failed");
            if self.policy.fail_fast && guard.state == RunState::Running {
                guard.fail()?;
            }
        }
        Ok(())
    }

    /// Claim every executable step reachable through the seeds, skipping
    /// the ones whose conditions do not pass and cascading into their
    /// successors
    fn claim(
        &self,
        workflow: &Workflow,
        run_id: &RunId,
        guard: &mut WorkflowRun,
        seeds: Vec<StepId>,
        claimed: &mut HashSet<StepId>,
        in_flight: &mut FuturesUnordered<StepFuture>,
    ) {
        let mut queue: VecDeque<StepId> = seeds.into();
        while let Some(step_id) = queue.pop_front() {
            if !claimed.insert(step_id.clone()) {
                continue;
            }
            if guard.step_status(&step_id).is_terminal() {
                continue;
            }
            let Some(step) = workflow.get_step(&step_id) else {
                continue;
            };

            match self.evaluator.step_verdict(step, &guard.context) {
                ConditionVerdict::Passed => {
                    guard.mark_step_started(&step_id);
                    debug!(run = %run_id, step = %step_id, task = %step.task.name(), "Step claimed");
                    in_flight.push(self.spawn_step(run_id, step, &guard.context));
                }
                ConditionVerdict::Failed { reason } => {
                    guard.mark_step_skipped(
                        &step_id,
                        format!("task '{}' skipped: {}", step.task.name(), reason),
                    );
                    queue.extend(workflow.successors(&step_id));
                }
                ConditionVerdict::Unresolved { field } => {
                    guard.log_warning(
                        Some(step_id.clone()),
                        format!("condition field '{}' did not resolve; failing closed", field),
                    );
                    guard.mark_step_skipped(
                        &step_id,
                        format!(
                            "task '{}' skipped: condition field '{}' is missing",
                            step.task.name(),
                            field
                        ),
                    );
                    queue.extend(workflow.successors(&step_id));
                }
            }
        }
    }

    /// Package one step execution as an owned future for the in-flight set
    fn spawn_step(&self, run_id: &RunId, step: &WorkflowStep, context: &Value) -> StepFuture {
        let evaluator = self.evaluator.clone();
        let dispatcher = Arc::clone(&self.dispatcher);
        let run_id = run_id.clone();
        let step = step.clone();
        let context = context.clone();
        async move {
            let step_id = step.id.clone();
            let outcome = run_step(evaluator, dispatcher, run_id, step, context).await;
            (step_id, outcome)
        }
        .boxed()
    }
}

/// Execute one step to its final task result, honoring its loop rule.
///
/// Runs against a private working copy of the context so that while
/// conditions observe the step's own progress; the collected outputs are
/// applied to the run context when the outcome is recorded.
async fn run_step(
    evaluator: RuleEvaluator,
    dispatcher: Arc<TaskDispatcher>,
    run_id: RunId,
    step: WorkflowStep,
    context: Value,
) -> WorkflowResult<StepRun> {
    let mut working = context;
    let mut outputs: Vec<Value> = Vec::new();
    let mut warnings: Vec<String> = Vec::new();
    let mut iterations = 0u32;

    let result = match evaluator.loop_plan(&step, &working) {
        LoopPlan::Once => {
            let result = dispatcher
                .dispatch(&run_id, &step.id, &step.task, &working)
                .await?;
            iterations = 1;
            absorb(&mut working, &mut outputs, &result);
            result
        }
        LoopPlan::ForEach {
            path,
            items,
            dropped,
            resolved,
        } => {
            if !resolved {
                warnings.push(format!(
                    "loop collection '{}' is missing or not an array",
                    path
                ));
            }
            if dropped > 0 {
                warnings.push(format!(
                    "loop over '{}' truncated at {} of {} items",
                    path,
                    items.len(),
                    items.len() + dropped
                ));
            }
            let mut last = TaskResult::completed(None, 0);
            for (index, item) in items.iter().enumerate() {
                let mut scope = working.clone();
                if let Value::Object(map) = &mut scope {
                    map.insert("item".into(), item.clone());
                    map.insert("iteration".into(), Value::from(index as u64));
                }
                let result = dispatcher
                    .dispatch(&run_id, &step.id, &step.task, &scope)
                    .await?;
                iterations += 1;
                absorb(&mut working, &mut outputs, &result);
                let ok = result.is_completed();
                last = result;
                if !ok {
                    break;
                }
            }
            last
        }
        LoopPlan::While {
            condition,
            max_iterations,
        } => {
            let mut last = TaskResult::completed(None, 0);
            while iterations < max_iterations && evaluator.evaluate_expression(&condition, &working)
            {
                let result = dispatcher
                    .dispatch(&run_id, &step.id, &step.task, &working)
                    .await?;
                iterations += 1;
                absorb(&mut working, &mut outputs, &result);
                let ok = result.is_completed();
                last = result;
                if !ok {
                    break;
                }
            }
            if last.is_completed()
                && iterations == max_iterations
                && evaluator.evaluate_expression(&condition, &working)
            {
                warnings.push(bound_warning(&condition, max_iterations));
            }
            last
        }
        LoopPlan::DoWhile {
            condition,
            max_iterations,
        } => loop {
            let result = dispatcher
                .dispatch(&run_id, &step.id, &step.task, &working)
                .await?;
            iterations += 1;
            absorb(&mut working, &mut outputs, &result);
            if !result.is_completed() {
                break result;
            }
            if iterations >= max_iterations {
                if evaluator.evaluate_expression(&condition, &working) {
                    warnings.push(bound_warning(&condition, max_iterations));
                }
                break result;
            }
            if !evaluator.evaluate_expression(&condition, &working) {
                break result;
            }
        },
    };

    Ok(StepRun {
        result,
        iterations,
        warnings,
        outputs,
    })
}

fn bound_warning(condition: &str, max_iterations: u32) -> String {
    format!(
        "loop stopped at its bound of {} iterations with '{}' still true",
        max_iterations, condition
    )
}

/// Fold an object output into the working context and the pending list
fn absorb(working: &mut Value, outputs: &mut Vec<Value>, result: &TaskResult) {
    if let Some(output) = &result.output {
        if output.is_object() {
            merge_object(working, output);
            outputs.push(output.clone());
        }
    }
}

/// Shallow merge of an object output into the context root
pub(crate) fn merge_object(target: &mut Value, output: &Value) {
    if let (Value::Object(target_map), Value::Object(output_map)) = (target, output) {
        for (key, value) in output_map {
            target_map.insert(key.clone(), value.clone());
        }
    }
}
