//! Storage seams for workflow definitions and archived runs
//!
//! The controller goes through these traits for everything it keeps
//! beyond the lifetime of a live run, so a durable backend can be swapped
//! in without touching the engine. The in-memory stores are the default
//! and what the tests use; [`JsonFileWorkflowStore`] keeps definitions as
//! one JSON file per workflow under a directory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;
use docflow_types::{CompletedRun, RunId, Workflow, WorkflowError, WorkflowId, WorkflowResult};
use tracing::info;

// ── Workflow definitions ─────────────────────────────────────────────

/// Storage for workflow definitions
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Persist a definition, replacing any previous one under its id
    async fn save(&self, workflow: Workflow) -> WorkflowResult<()>;

    async fn get(&self, id: &WorkflowId) -> WorkflowResult<Workflow>;

    /// All stored definitions, oldest first
    async fn list(&self) -> WorkflowResult<Vec<Workflow>>;

    async fn remove(&self, id: &WorkflowId) -> WorkflowResult<Workflow>;
}

/// Definition store backed by a process-local map
#[derive(Default)]
pub struct InMemoryWorkflowStore {
    workflows: RwLock<HashMap<WorkflowId, Workflow>>,
}

impl InMemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkflowStore for InMemoryWorkflowStore {
    async fn save(&self, workflow: Workflow) -> WorkflowResult<()> {
        let id = workflow.id.clone();
        self.workflows
            .write()
            .unwrap()
            .insert(id.clone(), workflow);
        info!(workflow = %id, "Workflow definition stored");
        Ok(())
    }

    async fn get(&self, id: &WorkflowId) -> WorkflowResult<Workflow> {
        self.workflows
            .read()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| WorkflowError::WorkflowNotFound(id.clone()))
    }

    async fn list(&self) -> WorkflowResult<Vec<Workflow>> {
        let mut workflows: Vec<Workflow> =
            self.workflows.read().unwrap().values().cloned().collect();
        workflows.sort_by_key(|w| w.created_at);
        Ok(workflows)
    }

    async fn remove(&self, id: &WorkflowId) -> WorkflowResult<Workflow> {
        self.workflows
            .write()
            .unwrap()
            .remove(id)
            .ok_or_else(|| WorkflowError::WorkflowNotFound(id.clone()))
    }
}

/// Definition store that keeps one pretty-printed JSON file per workflow
/// id under a directory.
///
/// Writes go to a `.tmp` sibling and rename into place, so an interrupted
/// write never leaves a half-written definition behind.
pub struct JsonFileWorkflowStore {
    dir: PathBuf,
}

impl JsonFileWorkflowStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &WorkflowId) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }
}

#[async_trait]
impl WorkflowStore for JsonFileWorkflowStore {
    async fn save(&self, workflow: Workflow) -> WorkflowResult<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(&workflow.id);
        let json = serde_json::to_string_pretty(&workflow)?;

        // Atomic write: write to .tmp then rename
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &path).await?;

        info!(workflow = %workflow.id, path = %path.display(), "Workflow definition written");
        Ok(())
    }

    async fn get(&self, id: &WorkflowId) -> WorkflowResult<Workflow> {
        let path = self.path_for(id);
        if !path.exists() {
            return Err(WorkflowError::WorkflowNotFound(id.clone()));
        }
        let contents = tokio::fs::read_to_string(&path).await?;
        Ok(serde_json::from_str(&contents)?)
    }

    async fn list(&self) -> WorkflowResult<Vec<Workflow>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut workflows = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let contents = tokio::fs::read_to_string(&path).await?;
            workflows.push(serde_json::from_str(&contents)?);
        }
        workflows.sort_by_key(|w: &Workflow| w.created_at);
        Ok(workflows)
    }

    async fn remove(&self, id: &WorkflowId) -> WorkflowResult<Workflow> {
        let workflow = self.get(id).await?;
        tokio::fs::remove_file(self.path_for(id)).await?;
        Ok(workflow)
    }
}

// ── Archived runs ────────────────────────────────────────────────────

/// Storage for finished runs
#[async_trait]
pub trait RunStore: Send + Sync {
    async fn save(&self, run: CompletedRun) -> WorkflowResult<()>;

    async fn get(&self, id: &RunId) -> WorkflowResult<CompletedRun>;

    /// Archived runs of one workflow, oldest finish first
    async fn list_for(&self, workflow_id: &WorkflowId) -> WorkflowResult<Vec<CompletedRun>>;
}

/// Run archive backed by a process-local map
#[derive(Default)]
pub struct InMemoryRunStore {
    runs: RwLock<HashMap<RunId, CompletedRun>>,
}

impl InMemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunStore for InMemoryRunStore {
    async fn save(&self, run: CompletedRun) -> WorkflowResult<()> {
        let id = run.run_id.clone();
        self.runs.write().unwrap().insert(id.clone(), run);
        info!(run = %id, "Run archived");
        Ok(())
    }

    async fn get(&self, id: &RunId) -> WorkflowResult<CompletedRun> {
        self.runs
            .read()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| WorkflowError::RunNotFound(id.clone()))
    }

    async fn list_for(&self, workflow_id: &WorkflowId) -> WorkflowResult<Vec<CompletedRun>> {
        let mut runs: Vec<CompletedRun> = self
            .runs
            .read()
            .unwrap()
            .values()
            .filter(|r| &r.workflow_id == workflow_id)
            .cloned()
            .collect();
        runs.sort_by_key(|r| r.ended_at);
        Ok(runs)
    }
}
