//! Workflow execution engine for Docflow
//!
//! The engine takes validated workflow definitions from
//! [`docflow_types`] and drives runs of them: gating steps on condition
//! rules, looping where a loop rule says to, executing automated tasks
//! through registered handlers, and parking human tasks until someone
//! signals their outcome.
//!
//! # Key Principle
//!
//! **The engine schedules and records; it never implements actions.**
//!
//! Automated work happens in handlers registered with the
//! [`ActionRegistry`]. Human work happens outside the process entirely
//! and re-enters as a signal through the [`SignalHub`]. The engine's job
//! is ordering, retries, timeouts, and an honest run log.
//!
//! # Architecture
//!
//! The [`RunController`] composes specialized components:
//!
//! - [`RuleEvaluator`] evaluates condition and loop rules against the run context
//! - [`ActionRegistry`] maps automated task types to their handlers
//! - [`SignalHub`] routes human task outcomes to the steps waiting on them
//! - [`TaskDispatcher`] executes a single task with retries and timeouts
//! - [`WorkflowRunner`] drives a run across the step graph, branching in parallel
//! - [`WorkflowStore`] / [`RunStore`] are the persistence seams for definitions and finished runs
//!
//! # Example
//!
//! ```rust
//! use docflow_engine::RuleEvaluator;
//! use docflow_types::*;
//! use serde_json::json;
//!
//! // A review workflow: notify, then approve once the document is ready
//! let mut workflow = Workflow::new(
//!     "Document Review",
//!     WorkflowTrigger::new(TriggerType::DocumentCreated),
//! );
//! workflow
//!     .add_step(WorkflowStep::new(
//!         "notify",
//!         AutomatedTask::new("Notify author", AutomatedTaskType::SendEmail),
//!     ))
//!     .unwrap();
//! workflow
//!     .add_step(
//!         WorkflowStep::new(
//!             "approve",
//!             HumanTask::new("Approve document", HumanTaskType::ApproveDocument),
//!         )
//!         .with_rule(WorkflowRule::condition(
//!             "document.status",
//!             ConditionOperator::Equals,
//!             "ready",
//!         )),
//!     )
//!     .unwrap();
//! workflow.validate().unwrap();
//!
//! // Condition rules gate steps against the run context
//! let evaluator = RuleEvaluator::new();
//! let context = json!({"document": {"status": "ready"}});
//! let step = workflow.get_step(&StepId::new("approve")).unwrap();
//! assert!(evaluator.step_verdict(step, &context).is_passed());
//! ```

#![deny(unsafe_code)]

pub mod actions;
pub mod controller;
pub mod dispatcher;
pub mod evaluator;
pub mod runner;
pub mod signals;
pub mod store;

// Re-export main types
pub use actions::{ActionHandler, ActionRegistry, StaticAction};
pub use controller::RunController;
pub use dispatcher::{TaskDispatcher, TaskResult};
pub use evaluator::{ConditionVerdict, LoopPlan, RuleEvaluator};
pub use runner::{RunPolicy, WorkflowRunner};
pub use signals::{SignalHub, TaskSignal};
pub use store::{
    InMemoryRunStore, InMemoryWorkflowStore, JsonFileWorkflowStore, RunStore, WorkflowStore,
};
