//! Action handler registry for automated tasks
//!
//! The engine never performs side effects itself. Every automated task is
//! dispatched to whatever [`ActionHandler`] the application registered
//! under the task's [`AutomatedTaskType`]; sending the mail or calling the
//! API is the handler's business.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use docflow_types::{AutomatedTaskType, TaskConfig};
use serde_json::Value;
use tracing::debug;

/// Application-defined executor for one kind of automated task.
///
/// Implement this trait to connect the engine to real infrastructure.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// Run the action against the current run context.
    ///
    /// A returned JSON object is merged into the run context; any other
    /// value is recorded but merges nothing. Errors fail the attempt and
    /// count against the task's retry budget.
    async fn execute(&self, config: &TaskConfig, context: &Value) -> anyhow::Result<Value>;

    /// Get a description of what this handler does
    fn description(&self) -> &str {
        "automated action"
    }
}

/// Maps automated task types to their handlers
#[derive(Default)]
pub struct ActionRegistry {
    handlers: HashMap<AutomatedTaskType, Arc<dyn ActionHandler>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler for a task type, replacing any previous one
    pub fn register(&mut self, task_type: AutomatedTaskType, handler: Arc<dyn ActionHandler>) {
        let replaced = self.handlers.insert(task_type, handler).is_some();
        debug!(task_type = %task_type, replaced, "Registered action handler");
    }

    /// Register a closure as a handler.
    ///
    /// The closure receives owned copies of the task config and context.
    pub fn register_fn<F, Fut>(&mut self, task_type: AutomatedTaskType, action_fn: F)
    where
        F: Fn(TaskConfig, Value) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        self.register(task_type, Arc::new(ClosureAction { action_fn }));
    }

    pub fn get(&self, task_type: AutomatedTaskType) -> Option<Arc<dyn ActionHandler>> {
        self.handlers.get(&task_type).cloned()
    }

    pub fn contains(&self, task_type: AutomatedTaskType) -> bool {
        self.handlers.contains_key(&task_type)
    }

    pub fn registered_types(&self) -> Vec<AutomatedTaskType> {
        self.handlers.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Handler implementation using a closure
struct ClosureAction<F> {
    action_fn: F,
}

#[async_trait]
impl<F, Fut> ActionHandler for ClosureAction<F>
where
    F: Fn(TaskConfig, Value) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = anyhow::Result<Value>> + Send,
{
    async fn execute(&self, config: &TaskConfig, context: &Value) -> anyhow::Result<Value> {
        (self.action_fn)(config.clone(), context.clone()).await
    }
}

/// Handler that returns a fixed output. Useful for tests and for wiring
/// up task types whose effect lives entirely in the context.
#[derive(Debug, Clone, Default)]
pub struct StaticAction {
    output: Value,
}

impl StaticAction {
    pub fn new(output: Value) -> Self {
        Self { output }
    }
}

#[async_trait]
impl ActionHandler for StaticAction {
    async fn execute(&self, _config: &TaskConfig, _context: &Value) -> anyhow::Result<Value> {
        Ok(self.output.clone())
    }

    fn description(&self) -> &str {
        "returns a fixed output"
    }
}
