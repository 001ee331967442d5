//! Docflow Domain Types
//!
//! Workflows in Docflow are declarative programs over documents: a
//! **trigger** plus an ordered (and optionally branching) list of **steps**,
//! where each step carries one **task** and zero or more gating/looping
//! **rules**. The engine that executes them lives in `docflow-engine`; this
//! crate is pure data plus structural validation.
//!
//! # Key Concepts
//!
//! - **Workflow**: A blueprint: trigger, steps, and the step graph implied
//!   by sequence order and explicit `next_steps` overrides.
//! - **Task**: The unit of work inside a step. A tagged sum type:
//!   [`HumanTask`] must be completed by an external signal, [`AutomatedTask`]
//!   is dispatched to a registered action handler.
//! - **WorkflowRule**: Either a condition (boolean gate on step execution)
//!   or a loop (repetition policy bounded by `max_iterations`).
//! - **WorkflowRun**: One execution of a workflow, with per-step statuses, a
//!   mutable JSON context, and an append-only, sequence-numbered log.
//! - **CompletedRun**: The terminal audit record of a run.
//!
//! # Design Principles
//!
//! 1. Definitions are data. Validation rejects malformed graphs (cycles,
//!    duplicate ids, unbounded loops) at load time, never at run time.
//! 2. Run state is owned by the run, not the definition. A workflow is
//!    immutable while it executes.
//! 3. Every state change of a run is observable through its log, ordered by
//!    the time each outcome was determined.

#![deny(unsafe_code)]

mod completion;
mod errors;
mod rule;
mod run;
mod task;
mod trigger;
mod workflow;

pub use completion::*;
pub use errors::*;
pub use rule::*;
pub use run::*;
pub use task::*;
pub use trigger::*;
pub use workflow::*;
