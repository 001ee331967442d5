//! Run control: the surface that owns live runs
//!
//! The controller keeps one slot per live run and exactly one driver task
//! per slot. Operations that change a run's state go through the run's own
//! state machine, so an operation that does not apply in the current state
//! comes back as [`WorkflowError::InvalidState`] instead of doing nothing.
//!
//! Workflow definitions live behind a [`WorkflowStore`]; finished runs can
//! be archived into a [`RunStore`], which releases their slot.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use docflow_types::{
    CompletedRun, RunId, RunSnapshot, RunState, StepId, StepStatus, Task, TriggerType, Workflow,
    WorkflowError, WorkflowId, WorkflowResult, WorkflowRun,
};
use serde_json::Value;
use tokio::sync::{watch, Mutex};
use tracing::{error, info};

use crate::dispatcher::TaskDispatcher;
use crate::runner::{RunPolicy, WorkflowRunner};
use crate::signals::{SignalHub, TaskSignal};
use crate::store::{InMemoryRunStore, InMemoryWorkflowStore, RunStore, WorkflowStore};

/// One live run: its definition, its state, and its driver gate
struct RunSlot {
    workflow: Arc<Workflow>,
    run: Mutex<WorkflowRun>,
    /// True while a driver task is driving this run. Changes only while
    /// the run lock is held, so drivers and control calls agree on it.
    driver: watch::Sender<bool>,
}

/// Owns live runs and the stores behind them
pub struct RunController {
    workflows: Arc<dyn WorkflowStore>,
    archive: Arc<dyn RunStore>,
    runner: Arc<WorkflowRunner>,
    runs: Mutex<HashMap<RunId, Arc<RunSlot>>>,
}

impl RunController {
    /// Controller with in-memory stores
    pub fn new(dispatcher: Arc<TaskDispatcher>) -> Self {
        Self::with_stores(
            dispatcher,
            Arc::new(InMemoryWorkflowStore::new()),
            Arc::new(InMemoryRunStore::new()),
        )
    }

    pub fn with_stores(
        dispatcher: Arc<TaskDispatcher>,
        workflows: Arc<dyn WorkflowStore>,
        archive: Arc<dyn RunStore>,
    ) -> Self {
        Self {
            workflows,
            archive,
            runner: Arc::new(WorkflowRunner::new(dispatcher)),
            runs: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_policy(mut self, policy: RunPolicy) -> Self {
        let dispatcher = Arc::clone(self.runner.dispatcher());
        self.runner = Arc::new(WorkflowRunner::new(dispatcher).with_policy(policy));
        self
    }

    /// The signal hub human-task completions go through
    pub fn signals(&self) -> &Arc<SignalHub> {
        self.runner.dispatcher().signals()
    }

    // ── Workflow definitions ─────────────────────────────────────────

    /// Validate a definition and store it
    pub async fn register_workflow(&self, workflow: Workflow) -> WorkflowResult<WorkflowId> {
        workflow.validate()?;
        let id = workflow.id.clone();
        self.workflows.save(workflow).await?;
        info!(workflow = %id, "Workflow registered");
        Ok(id)
    }

    pub async fn workflow(&self, id: &WorkflowId) -> WorkflowResult<Workflow> {
        self.workflows.get(id).await
    }

    pub async fn list_workflows(&self) -> WorkflowResult<Vec<Workflow>> {
        self.workflows.list().await
    }

    pub async fn remove_workflow(&self, id: &WorkflowId) -> WorkflowResult<Workflow> {
        self.workflows.remove(id).await
    }

    // ── Starting runs ────────────────────────────────────────────────

    /// Start a run of a stored workflow
    pub async fn start(&self, workflow_id: &WorkflowId, context: Value) -> WorkflowResult<RunId> {
        let workflow = self.workflows.get(workflow_id).await?;
        self.start_run(Arc::new(workflow), context).await
    }

    /// Trigger-style start of one workflow; inactive workflows refuse it
    pub async fn start_triggered(
        &self,
        workflow_id: &WorkflowId,
        context: Value,
    ) -> WorkflowResult<RunId> {
        let workflow = self.workflows.get(workflow_id).await?;
        if !workflow.active {
            return Err(WorkflowError::WorkflowInactive(workflow.id));
        }
        self.start_run(Arc::new(workflow), context).await
    }

    /// Start every active workflow whose trigger matches the event.
    /// Inactive and non-matching workflows are passed over silently.
    pub async fn fire_trigger(
        &self,
        trigger_type: TriggerType,
        context: &Value,
    ) -> WorkflowResult<Vec<RunId>> {
        let mut started = Vec::new();
        for workflow in self.workflows.list().await? {
            if workflow.active && workflow.trigger.trigger_type == trigger_type {
                let run_id = self.start_run(Arc::new(workflow), context.clone()).await?;
                started.push(run_id);
            }
        }
        info!(trigger = %trigger_type, runs = started.len(), "Trigger fired");
        Ok(started)
    }

    async fn start_run(&self, workflow: Arc<Workflow>, context: Value) -> WorkflowResult<RunId> {
        let mut run = WorkflowRun::new(workflow.id.clone(), context)?;
        run.start()?;
        let run_id = run.id.clone();

        let slot = Arc::new(RunSlot {
            workflow,
            run: Mutex::new(run),
            driver: watch::channel(false).0,
        });
        self.runs.lock().await.insert(run_id.clone(), Arc::clone(&slot));
        info!(run = %run_id, workflow = %slot.workflow.id, "Run started");
        self.spawn_driver(&run_id, &slot).await;
        Ok(run_id)
    }

    // ── Run lifecycle ────────────────────────────────────────────────

    /// Stop claiming new steps; in-flight work finishes and is recorded
    pub async fn pause(&self, run_id: &RunId) -> WorkflowResult<()> {
        let slot = self.slot(run_id).await?;
        slot.run.lock().await.pause()?;
        info!(run = %run_id, "Run paused");
        Ok(())
    }

    pub async fn resume(&self, run_id: &RunId) -> WorkflowResult<()> {
        let slot = self.slot(run_id).await?;
        slot.run.lock().await.resume()?;
        info!(run = %run_id, "Run resumed");
        // A driver still draining picks the frontier back up itself
        self.spawn_driver(run_id, &slot).await;
        Ok(())
    }

    /// Cancel the run and wake its waiting human tasks. Results of work
    /// already in flight are discarded when they arrive.
    pub async fn cancel(&self, run_id: &RunId) -> WorkflowResult<()> {
        let slot = self.slot(run_id).await?;
        slot.run.lock().await.cancel()?;
        self.signals().drop_run(run_id);
        info!(run = %run_id, "Run cancelled");
        Ok(())
    }

    /// Wipe the run back to idle so it can be driven again from the top.
    /// Refused while a driver is still live.
    pub async fn reset(&self, run_id: &RunId) -> WorkflowResult<()> {
        let slot = self.slot(run_id).await?;
        let mut run = slot.run.lock().await;
        if *slot.driver.borrow() {
            return Err(WorkflowError::InvalidState {
                operation: "reset",
                state: run.state,
            });
        }
        run.reset();
        info!(run = %run_id, "Run reset");
        Ok(())
    }

    /// Execute exactly one ready step, then park the run at paused (or
    /// let it finish if that was the last step). Refused while a driver
    /// is live.
    pub async fn step_forward(&self, run_id: &RunId) -> WorkflowResult<Option<StepId>> {
        let slot = self.slot(run_id).await?;
        {
            let mut run = slot.run.lock().await;
            if *slot.driver.borrow() {
                return Err(WorkflowError::InvalidState {
                    operation: "step_forward",
                    state: run.state,
                });
            }
            match run.state {
                RunState::Idle => run.start()?,
                RunState::Paused => run.resume()?,
                state => {
                    return Err(WorkflowError::InvalidState {
                        operation: "step_forward",
                        state,
                    })
                }
            }
        }
        self.runner.step_once(&slot.workflow, &slot.run).await
    }

    // ── Human task signals ───────────────────────────────────────────

    pub async fn signal_step(
        &self,
        run_id: &RunId,
        step_id: &StepId,
        signal: TaskSignal,
    ) -> WorkflowResult<()> {
        self.slot(run_id).await?;
        self.signals().deliver(run_id, step_id, signal)
    }

    /// Resolve a waiting human task as completed
    pub async fn complete_step(
        &self,
        run_id: &RunId,
        step_id: &StepId,
        output: Value,
    ) -> WorkflowResult<()> {
        self.signal_step(run_id, step_id, TaskSignal::completed(output))
            .await
    }

    /// Resolve a waiting human task as failed
    pub async fn fail_step(
        &self,
        run_id: &RunId,
        step_id: &StepId,
        error: impl Into<String> + Send,
    ) -> WorkflowResult<()> {
        self.signal_step(run_id, step_id, TaskSignal::failed(error))
            .await
    }

    // ── Observation ──────────────────────────────────────────────────

    pub async fn state(&self, run_id: &RunId) -> WorkflowResult<RunState> {
        let slot = self.slot(run_id).await?;
        let run = slot.run.lock().await;
        Ok(run.state)
    }

    pub async fn snapshot(&self, run_id: &RunId) -> WorkflowResult<RunSnapshot> {
        let slot = self.slot(run_id).await?;
        let run = slot.run.lock().await;
        Ok(run.snapshot())
    }

    pub async fn run_ids(&self) -> Vec<RunId> {
        self.runs.lock().await.keys().cloned().collect()
    }

    /// Wait for the run's driver to settle, then report the state. A run
    /// waiting on a human task settles only once signalled or cancelled.
    pub async fn wait(&self, run_id: &RunId) -> WorkflowResult<RunState> {
        let slot = self.slot(run_id).await?;
        let mut driver = slot.driver.subscribe();
        let _ = driver.wait_for(|live| !*live).await;
        let run = slot.run.lock().await;
        Ok(run.state)
    }

    /// Flag in-progress human tasks whose due date has passed. Returns
    /// every overdue step; the warning is logged once per step.
    pub async fn check_overdue(&self, run_id: &RunId) -> WorkflowResult<Vec<StepId>> {
        let slot = self.slot(run_id).await?;
        let now = Utc::now();
        let mut run = slot.run.lock().await;

        let mut overdue = Vec::new();
        for step in &slot.workflow.steps {
            let Task::Human(task) = &step.task else {
                continue;
            };
            let Some(due) = task.due_date else {
                continue;
            };
            if due >= now || run.step_status(&step.id) != StepStatus::InProgress {
                continue;
            }
            let already_flagged = run
                .step_state(&step.id)
                .map(|s| s.overdue)
                .unwrap_or(false);
            if !already_flagged {
                run.step_state_mut(&step.id).overdue = true;
                run.log_warning(
                    Some(step.id.clone()),
                    format!("task '{}' is overdue (was due {})", task.name, due),
                );
            }
            overdue.push(step.id.clone());
        }
        Ok(overdue)
    }

    // ── Finished runs ────────────────────────────────────────────────

    /// Immutable record of a terminal run; the run stays live
    pub async fn completed_run(&self, run_id: &RunId) -> WorkflowResult<CompletedRun> {
        let slot = self.slot(run_id).await?;
        let run = slot.run.lock().await;
        CompletedRun::from_run(&run, &slot.workflow)
    }

    /// Archive a terminal run into the run store and release its slot
    pub async fn archive_run(&self, run_id: &RunId) -> WorkflowResult<CompletedRun> {
        let completed = self.completed_run(run_id).await?;
        self.archive.save(completed.clone()).await?;
        self.runs.lock().await.remove(run_id);
        info!(run = %run_id, "Run archived and released");
        Ok(completed)
    }

    pub async fn archived_run(&self, run_id: &RunId) -> WorkflowResult<CompletedRun> {
        self.archive.get(run_id).await
    }

    pub async fn archived_runs_for(
        &self,
        workflow_id: &WorkflowId,
    ) -> WorkflowResult<Vec<CompletedRun>> {
        self.archive.list_for(workflow_id).await
    }

    // ── Internals ────────────────────────────────────────────────────

    async fn slot(&self, run_id: &RunId) -> WorkflowResult<Arc<RunSlot>> {
        self.runs
            .lock()
            .await
            .get(run_id)
            .cloned()
            .ok_or_else(|| WorkflowError::RunNotFound(run_id.clone()))
    }

    /// Spawn a driver task for the slot unless one is live. Liveness is
    /// decided under the run lock, the same lock a parking driver holds
    /// for its exit decision, so a resume lands on exactly one driver.
    async fn spawn_driver(&self, run_id: &RunId, slot: &Arc<RunSlot>) {
        {
            let _run = slot.run.lock().await;
            if *slot.driver.borrow() {
                return;
            }
            slot.driver.send_replace(true);
        }
        let runner = Arc::clone(&self.runner);
        let slot = Arc::clone(slot);
        let run_id = run_id.clone();
        tokio::spawn(async move {
            loop {
                let outcome = runner.drive(&slot.workflow, &slot.run).await;
                if let Err(error) = &outcome {
                    error!(run = %run_id, %error, "Run driver failed");
                }
                let run = slot.run.lock().await;
                if outcome.is_ok() && run.state == RunState::Running {
                    // A resume landed while this drive was settling
                    continue;
                }
                slot.driver.send_replace(false);
                return;
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::ActionRegistry;
    use docflow_types::{
        AutomatedTask, AutomatedTaskType, HumanTask, HumanTaskType, LogLevel, WorkflowStep,
        WorkflowTrigger,
    };
    use serde_json::json;
    use std::time::Duration;

    fn make_controller() -> RunController {
        let mut registry = ActionRegistry::new();
        registry.register_fn(AutomatedTaskType::UpdateStatus, |config, _context| async move {
            let mut output = serde_json::Map::new();
            if let Some(key) = config.get("mark").and_then(Value::as_str) {
                output.insert(key.to_string(), json!(true));
            }
            Ok(Value::Object(output))
        });
        let dispatcher = TaskDispatcher::new(Arc::new(registry), Arc::new(SignalHub::new()));
        RunController::new(Arc::new(dispatcher))
    }

    fn manual_workflow(name: &str) -> Workflow {
        Workflow::new(name, WorkflowTrigger::new(TriggerType::ManualTrigger))
    }

    fn automated_step(id: &str) -> WorkflowStep {
        WorkflowStep::new(
            id,
            AutomatedTask::new(id, AutomatedTaskType::UpdateStatus)
                .with_config(docflow_types::TaskConfig::new().with("mark", id)),
        )
    }

    fn human_step(id: &str) -> WorkflowStep {
        WorkflowStep::new(id, HumanTask::new(id, HumanTaskType::ApproveDocument))
    }

    async fn wait_for_waiting(controller: &RunController, run_id: &RunId, step: &StepId) {
        while !controller.signals().is_waiting(run_id, step) {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    #[tokio::test]
    async fn test_start_wait_archive_lifecycle() {
        let controller = make_controller();
        let mut workflow = manual_workflow("Publish");
        workflow.add_step(automated_step("publish")).unwrap();
        let workflow_id = controller.register_workflow(workflow).await.unwrap();

        let run_id = controller.start(&workflow_id, json!({})).await.unwrap();
        assert_eq!(controller.wait(&run_id).await.unwrap(), RunState::Completed);

        let snapshot = controller.snapshot(&run_id).await.unwrap();
        assert_eq!(snapshot.state, RunState::Completed);

        let archived = controller.archive_run(&run_id).await.unwrap();
        assert!(archived.is_success());
        assert_eq!(archived.workflow_name, "Publish");

        // The slot is released; only the archive remembers the run
        assert!(matches!(
            controller.state(&run_id).await,
            Err(WorkflowError::RunNotFound(_))
        ));
        assert_eq!(
            controller.archived_run(&run_id).await.unwrap().final_state,
            RunState::Completed
        );
        assert_eq!(
            controller.archived_runs_for(&workflow_id).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn test_archive_refuses_live_run() {
        let controller = make_controller();
        let mut workflow = manual_workflow("Review");
        workflow.add_step(human_step("review")).unwrap();
        let workflow_id = controller.register_workflow(workflow).await.unwrap();

        let run_id = controller.start(&workflow_id, json!({})).await.unwrap();
        wait_for_waiting(&controller, &run_id, &StepId::new("review")).await;

        assert!(matches!(
            controller.archive_run(&run_id).await,
            Err(WorkflowError::InvalidState { operation: "archive", .. })
        ));
        // Still live after the refused archive
        controller.cancel(&run_id).await.unwrap();
        assert_eq!(controller.wait(&run_id).await.unwrap(), RunState::Cancelled);
    }

    #[tokio::test]
    async fn test_fire_trigger_matches_active_workflows_only() {
        let controller = make_controller();

        let mut matching =
            Workflow::new("On create", WorkflowTrigger::new(TriggerType::DocumentCreated));
        matching.add_step(automated_step("a")).unwrap();

        let mut other =
            Workflow::new("On comment", WorkflowTrigger::new(TriggerType::CommentAdded));
        other.add_step(automated_step("b")).unwrap();

        let mut inactive =
            Workflow::new("Dormant", WorkflowTrigger::new(TriggerType::DocumentCreated));
        inactive.add_step(automated_step("c")).unwrap();
        inactive.set_active(false);

        controller.register_workflow(matching).await.unwrap();
        controller.register_workflow(other).await.unwrap();
        let inactive_id = controller.register_workflow(inactive).await.unwrap();

        let started = controller
            .fire_trigger(TriggerType::DocumentCreated, &json!({"doc": "d-1"}))
            .await
            .unwrap();
        assert_eq!(started.len(), 1);

        // The explicit trigger path refuses the inactive workflow outright
        assert!(matches!(
            controller.start_triggered(&inactive_id, json!({})).await,
            Err(WorkflowError::WorkflowInactive(_))
        ));
        // A manual start ignores the active flag
        let manual = controller.start(&inactive_id, json!({})).await.unwrap();
        assert_eq!(controller.wait(&manual).await.unwrap(), RunState::Completed);

        let triggered = controller.wait(&started[0]).await.unwrap();
        assert_eq!(triggered, RunState::Completed);
    }

    #[tokio::test]
    async fn test_pause_records_signal_and_resume_continues() {
        let controller = make_controller();
        let mut workflow = manual_workflow("Review");
        workflow.add_step(automated_step("prepare")).unwrap();
        workflow.add_step(human_step("approve")).unwrap();
        workflow.add_step(automated_step("publish")).unwrap();
        let workflow_id = controller.register_workflow(workflow).await.unwrap();

        let run_id = controller.start(&workflow_id, json!({})).await.unwrap();
        let approve = StepId::new("approve");
        wait_for_waiting(&controller, &run_id, &approve).await;

        controller.pause(&run_id).await.unwrap();
        controller
            .complete_step(&run_id, &approve, json!({"approved_by": "dana"}))
            .await
            .unwrap();

        // The in-flight approval is recorded, its successor is not claimed
        assert_eq!(controller.wait(&run_id).await.unwrap(), RunState::Paused);
        let snapshot = controller.snapshot(&run_id).await.unwrap();
        assert_eq!(
            snapshot.step_statuses.get(&approve),
            Some(&StepStatus::Completed)
        );
        assert_eq!(
            snapshot.step_statuses.get(&StepId::new("publish")),
            None
        );

        controller.resume(&run_id).await.unwrap();
        assert_eq!(controller.wait(&run_id).await.unwrap(), RunState::Completed);

        let completed = controller.completed_run(&run_id).await.unwrap();
        assert_eq!(completed.context["approved_by"], json!("dana"));
        assert_eq!(completed.context["publish"], json!(true));
    }

    #[tokio::test]
    async fn test_resume_with_concurrent_wait_keeps_one_driver() {
        let controller = Arc::new(make_controller());
        let mut workflow = manual_workflow("Review");
        workflow.add_step(human_step("approve")).unwrap();
        workflow.add_step(automated_step("publish")).unwrap();
        let workflow_id = controller.register_workflow(workflow).await.unwrap();

        let run_id = controller.start(&workflow_id, json!({})).await.unwrap();
        let approve = StepId::new("approve");
        wait_for_waiting(&controller, &run_id, &approve).await;

        controller.pause(&run_id).await.unwrap();
        let waiter = {
            let controller = Arc::clone(&controller);
            let run_id = run_id.clone();
            tokio::spawn(async move { controller.wait(&run_id).await })
        };
        controller.resume(&run_id).await.unwrap();

        // The run must stay parked on the approval, not settle behind it
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(controller.state(&run_id).await.unwrap(), RunState::Running);
        assert!(controller.signals().is_waiting(&run_id, &approve));
        assert!(!waiter.is_finished());
        assert!(matches!(
            controller.reset(&run_id).await,
            Err(WorkflowError::InvalidState { operation: "reset", .. })
        ));

        controller
            .complete_step(&run_id, &approve, json!({}))
            .await
            .unwrap();
        assert_eq!(waiter.await.unwrap().unwrap(), RunState::Completed);

        let snapshot = controller.snapshot(&run_id).await.unwrap();
        assert_eq!(
            snapshot.step_statuses.get(&approve),
            Some(&StepStatus::Completed)
        );
        assert_eq!(
            snapshot.step_statuses.get(&StepId::new("publish")),
            Some(&StepStatus::Completed)
        );
    }

    #[tokio::test]
    async fn test_cancel_wakes_human_task_and_allows_reset() {
        let controller = make_controller();
        let mut workflow = manual_workflow("Review");
        workflow.add_step(human_step("approve")).unwrap();
        let workflow_id = controller.register_workflow(workflow).await.unwrap();

        let run_id = controller.start(&workflow_id, json!({})).await.unwrap();
        let approve = StepId::new("approve");
        wait_for_waiting(&controller, &run_id, &approve).await;

        controller.cancel(&run_id).await.unwrap();
        assert_eq!(controller.wait(&run_id).await.unwrap(), RunState::Cancelled);

        // Nothing waits for the signal any more
        assert!(matches!(
            controller.complete_step(&run_id, &approve, json!({})).await,
            Err(WorkflowError::NoPendingSignal { .. })
        ));
        assert!(matches!(
            controller.resume(&run_id).await,
            Err(WorkflowError::InvalidState { operation: "resume", .. })
        ));

        controller.reset(&run_id).await.unwrap();
        assert_eq!(controller.state(&run_id).await.unwrap(), RunState::Idle);
    }

    #[tokio::test]
    async fn test_step_forward_walks_and_finishes() {
        let controller = make_controller();
        let mut workflow = manual_workflow("Two step");
        workflow.add_step(automated_step("first")).unwrap();
        workflow.add_step(automated_step("second")).unwrap();
        let workflow_id = controller.register_workflow(workflow).await.unwrap();

        let run_id = controller.start(&workflow_id, json!({})).await.unwrap();
        controller.wait(&run_id).await.unwrap();
        controller.reset(&run_id).await.unwrap();

        let executed = controller.step_forward(&run_id).await.unwrap();
        assert_eq!(executed, Some(StepId::new("first")));
        assert_eq!(controller.state(&run_id).await.unwrap(), RunState::Paused);

        let executed = controller.step_forward(&run_id).await.unwrap();
        assert_eq!(executed, Some(StepId::new("second")));
        assert_eq!(controller.state(&run_id).await.unwrap(), RunState::Completed);

        assert!(matches!(
            controller.step_forward(&run_id).await,
            Err(WorkflowError::InvalidState { operation: "step_forward", .. })
        ));
    }

    #[tokio::test]
    async fn test_check_overdue_flags_once() {
        let controller = make_controller();
        let mut workflow = manual_workflow("Review");
        workflow
            .add_step(WorkflowStep::new(
                "approve",
                HumanTask::new("approve", HumanTaskType::ApproveDocument)
                    .with_due_date(Utc::now() - chrono::Duration::hours(2)),
            ))
            .unwrap();
        let workflow_id = controller.register_workflow(workflow).await.unwrap();

        let run_id = controller.start(&workflow_id, json!({})).await.unwrap();
        let approve = StepId::new("approve");
        wait_for_waiting(&controller, &run_id, &approve).await;

        let overdue = controller.check_overdue(&run_id).await.unwrap();
        assert_eq!(overdue, vec![approve.clone()]);

        // Second sweep still reports it but does not log again
        let overdue = controller.check_overdue(&run_id).await.unwrap();
        assert_eq!(overdue.len(), 1);

        let snapshot = controller.snapshot(&run_id).await.unwrap();
        let warnings = snapshot
            .log
            .iter()
            .filter(|e| e.level == LogLevel::Warning)
            .count();
        assert_eq!(warnings, 1);

        controller.cancel(&run_id).await.unwrap();
        controller.wait(&run_id).await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_run_is_reported() {
        let controller = make_controller();
        let missing = RunId::generate();
        assert!(matches!(
            controller.pause(&missing).await,
            Err(WorkflowError::RunNotFound(_))
        ));
        assert!(matches!(
            controller.snapshot(&missing).await,
            Err(WorkflowError::RunNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_register_rejects_cyclic_workflow() {
        let controller = make_controller();
        let mut workflow = manual_workflow("Cycle");
        workflow
            .add_step(automated_step("a").with_next_steps(vec![StepId::new("b")]))
            .unwrap();
        workflow
            .add_step(automated_step("b").with_next_steps(vec![StepId::new("a")]))
            .unwrap();

        assert!(matches!(
            controller.register_workflow(workflow).await,
            Err(WorkflowError::GraphCycle(_))
        ));
    }
}
