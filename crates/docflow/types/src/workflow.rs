//! Workflow definitions: a trigger plus an ordered, optionally branching
//! list of steps
//!
//! Default traversal is sequence order. A step's `next_steps` overrides
//! that with explicit successor ids, turning the step list into a directed
//! graph; more than one successor fans out into parallel branches. Cycles
//! are rejected at validation time, never discovered at run time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::{RuleKind, Task, WorkflowError, WorkflowResult, WorkflowRule, WorkflowTrigger};

// ── Identifiers ──────────────────────────────────────────────────────

/// Unique identifier for a workflow
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowId(pub String);

impl WorkflowId {
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

impl std::fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a workflow step
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StepId(pub String);

impl StepId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for StepId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Step ─────────────────────────────────────────────────────────────

/// One task plus its gating/looping rules
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub id: StepId,
    pub task: Task,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<WorkflowRule>,
    /// Explicit successors. `None` falls through to sequence order;
    /// `Some(vec![])` is an explicit terminal step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_steps: Option<Vec<StepId>>,
}

impl WorkflowStep {
    pub fn new(id: impl Into<String>, task: impl Into<Task>) -> Self {
        Self {
            id: StepId::new(id),
            task: task.into(),
            rules: Vec::new(),
            next_steps: None,
        }
    }

    pub fn with_rule(mut self, rule: WorkflowRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn with_next_steps(mut self, ids: Vec<StepId>) -> Self {
        self.next_steps = Some(ids);
        self
    }

    /// The condition rules attached to this step
    pub fn condition_rules(&self) -> impl Iterator<Item = &WorkflowRule> {
        self.rules.iter().filter(|r| r.is_condition())
    }

    /// The step's loop rule, if any (at most one after validation)
    pub fn loop_rule(&self) -> Option<&WorkflowRule> {
        self.rules.iter().find(|r| r.is_loop())
    }
}

// ── Workflow ─────────────────────────────────────────────────────────

/// A workflow definition: trigger, steps, and activation flag
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Workflow {
    pub id: WorkflowId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub trigger: WorkflowTrigger,
    /// Ordered steps; ids unique within the workflow
    #[serde(default)]
    pub steps: Vec<WorkflowStep>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Inactive workflows may be edited but not started by triggers
    pub active: bool,
}

impl Workflow {
    /// Create a workflow with an empty step list
    pub fn new(name: impl Into<String>, trigger: WorkflowTrigger) -> Self {
        let now = Utc::now();
        Self {
            id: WorkflowId::generate(),
            name: name.into(),
            description: None,
            trigger,
            steps: Vec::new(),
            created_at: now,
            updated_at: now,
            active: true,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_step(mut self, step: WorkflowStep) -> Self {
        self.steps.push(step);
        self
    }

    // ── Editor lifecycle ─────────────────────────────────────────────

    /// Append a step. Rejects duplicate ids.
    pub fn add_step(&mut self, step: WorkflowStep) -> WorkflowResult<()> {
        if self.get_step(&step.id).is_some() {
            return Err(WorkflowError::DuplicateStepId(step.id));
        }
        self.steps.push(step);
        self.touch();
        Ok(())
    }

    /// Insert a step at `index` (clamped to the list length)
    pub fn insert_step(&mut self, index: usize, step: WorkflowStep) -> WorkflowResult<()> {
        if self.get_step(&step.id).is_some() {
            return Err(WorkflowError::DuplicateStepId(step.id));
        }
        let index = index.min(self.steps.len());
        self.steps.insert(index, step);
        self.touch();
        Ok(())
    }

    /// Remove a step by id, returning it
    pub fn remove_step(&mut self, id: &StepId) -> WorkflowResult<WorkflowStep> {
        let index = self
            .step_index(id)
            .ok_or_else(|| WorkflowError::StepNotFound(id.clone()))?;
        let step = self.steps.remove(index);
        self.touch();
        Ok(step)
    }

    /// Replace the step that shares the given step's id
    pub fn update_step(&mut self, step: WorkflowStep) -> WorkflowResult<()> {
        let index = self
            .step_index(&step.id)
            .ok_or_else(|| WorkflowError::StepNotFound(step.id.clone()))?;
        self.steps[index] = step;
        self.touch();
        Ok(())
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn get_step(&self, id: &StepId) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| &s.id == id)
    }

    pub fn step_index(&self, id: &StepId) -> Option<usize> {
        self.steps.iter().position(|s| &s.id == id)
    }

    /// The first step, where every run begins
    pub fn entry_step(&self) -> Option<&WorkflowStep> {
        self.steps.first()
    }

    /// Successors of a step: `next_steps` when present, otherwise the next
    /// step in sequence order
    pub fn successors(&self, id: &StepId) -> Vec<StepId> {
        let index = match self.step_index(id) {
            Some(i) => i,
            None => return Vec::new(),
        };
        match &self.steps[index].next_steps {
            Some(targets) => targets.clone(),
            None => match self.steps.get(index + 1) {
                Some(next) => vec![next.id.clone()],
                None => Vec::new(),
            },
        }
    }

    // ── Validation ───────────────────────────────────────────────────

    /// Structural validation, run before any execution.
    ///
    /// Checks step id uniqueness, `next_steps` targets, loop rule arity
    /// and bounds, and that the successor graph is acyclic.
    pub fn validate(&self) -> WorkflowResult<()> {
        let mut seen = HashSet::new();
        for step in &self.steps {
            if !seen.insert(&step.id) {
                return Err(WorkflowError::DuplicateStepId(step.id.clone()));
            }
        }

        for step in &self.steps {
            let mut loops = 0;
            for rule in &step.rules {
                if let RuleKind::Loop { max_iterations, .. } = &rule.kind {
                    loops += 1;
                    if *max_iterations == 0 {
                        return Err(WorkflowError::InvalidLoopBound(step.id.clone()));
                    }
                }
            }
            if loops > 1 {
                return Err(WorkflowError::MultipleLoopRules(step.id.clone()));
            }

            if let Some(targets) = &step.next_steps {
                for target in targets {
                    if self.get_step(target).is_none() {
                        return Err(WorkflowError::UnknownNextStep {
                            step: step.id.clone(),
                            target: target.clone(),
                        });
                    }
                }
            }
        }

        self.check_acyclic()
    }

    /// Depth-first search with white/gray/black marking over the successor
    /// graph. A gray-on-gray edge is a back edge, i.e. a cycle.
    fn check_acyclic(&self) -> WorkflowResult<()> {
        let index: HashMap<&StepId, usize> = self
            .steps
            .iter()
            .enumerate()
            .map(|(i, s)| (&s.id, i))
            .collect();
        let successors: Vec<Vec<usize>> = self
            .steps
            .iter()
            .map(|s| {
                self.successors(&s.id)
                    .iter()
                    .filter_map(|id| index.get(id).copied())
                    .collect()
            })
            .collect();

        let mut mark = vec![0u8; self.steps.len()]; // 0 unvisited, 1 on stack, 2 done
        for root in 0..self.steps.len() {
            if mark[root] != 0 {
                continue;
            }
            mark[root] = 1;
            let mut stack: Vec<(usize, usize)> = vec![(root, 0)];
            while let Some(frame) = stack.last_mut() {
                let node = frame.0;
                if frame.1 < successors[node].len() {
                    let next = successors[node][frame.1];
                    frame.1 += 1;
                    match mark[next] {
                        0 => {
                            mark[next] = 1;
                            stack.push((next, 0));
                        }
                        1 => {
                            return Err(WorkflowError::GraphCycle(self.steps[next].id.clone()));
                        }
                        _ => {}
                    }
                } else {
                    mark[node] = 2;
                    stack.pop();
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AutomatedTask, AutomatedTaskType, TriggerType};

    fn make_step(id: &str) -> WorkflowStep {
        WorkflowStep::new(
            id,
            AutomatedTask::new(format!("task {id}"), AutomatedTaskType::UpdateStatus),
        )
    }

    fn make_workflow(step_ids: &[&str]) -> Workflow {
        let mut workflow = Workflow::new(
            "Test Workflow",
            WorkflowTrigger::new(TriggerType::ManualTrigger),
        );
        for id in step_ids {
            workflow.add_step(make_step(id)).unwrap();
        }
        workflow
    }

    #[test]
    fn test_empty_workflow_is_valid() {
        let workflow = make_workflow(&[]);
        assert!(workflow.validate().is_ok());
        assert!(workflow.entry_step().is_none());
    }

    #[test]
    fn test_sequence_successors() {
        let workflow = make_workflow(&["a", "b", "c"]);
        assert_eq!(workflow.successors(&StepId::new("a")), vec![StepId::new("b")]);
        assert_eq!(workflow.successors(&StepId::new("b")), vec![StepId::new("c")]);
        assert!(workflow.successors(&StepId::new("c")).is_empty());
    }

    #[test]
    fn test_next_steps_override() {
        let mut workflow = make_workflow(&["a", "b"]);
        workflow
            .add_step(make_step("c").with_next_steps(vec![]))
            .unwrap();
        workflow
            .update_step(
                make_step("a").with_next_steps(vec![StepId::new("c"), StepId::new("b")]),
            )
            .unwrap();

        assert_eq!(
            workflow.successors(&StepId::new("a")),
            vec![StepId::new("c"), StepId::new("b")]
        );
        // Explicit empty next_steps is terminal even mid-list
        assert!(workflow.successors(&StepId::new("c")).is_empty());
        assert!(workflow.validate().is_ok());
    }

    #[test]
    fn test_duplicate_step_id_rejected() {
        let mut workflow = make_workflow(&["a"]);
        let result = workflow.add_step(make_step("a"));
        assert!(matches!(result, Err(WorkflowError::DuplicateStepId(_))));
    }

    #[test]
    fn test_unknown_next_step_rejected() {
        let mut workflow = make_workflow(&[]);
        workflow
            .add_step(make_step("a").with_next_steps(vec![StepId::new("ghost")]))
            .unwrap();

        assert!(matches!(
            workflow.validate(),
            Err(WorkflowError::UnknownNextStep { .. })
        ));
    }

    #[test]
    fn test_cycle_rejected() {
        let mut workflow = make_workflow(&[]);
        workflow
            .add_step(make_step("a").with_next_steps(vec![StepId::new("b")]))
            .unwrap();
        workflow
            .add_step(make_step("b").with_next_steps(vec![StepId::new("a")]))
            .unwrap();

        assert!(matches!(
            workflow.validate(),
            Err(WorkflowError::GraphCycle(_))
        ));
    }

    #[test]
    fn test_self_loop_rejected() {
        let mut workflow = make_workflow(&[]);
        workflow
            .add_step(make_step("a").with_next_steps(vec![StepId::new("a")]))
            .unwrap();

        assert!(matches!(
            workflow.validate(),
            Err(WorkflowError::GraphCycle(_))
        ));
    }

    #[test]
    fn test_diamond_is_acyclic() {
        let mut workflow = make_workflow(&[]);
        workflow
            .add_step(make_step("a").with_next_steps(vec![StepId::new("b"), StepId::new("c")]))
            .unwrap();
        workflow
            .add_step(make_step("b").with_next_steps(vec![StepId::new("d")]))
            .unwrap();
        workflow
            .add_step(make_step("c").with_next_steps(vec![StepId::new("d")]))
            .unwrap();
        workflow
            .add_step(make_step("d").with_next_steps(vec![]))
            .unwrap();

        assert!(workflow.validate().is_ok());
    }

    #[test]
    fn test_multiple_loop_rules_rejected() {
        let mut workflow = make_workflow(&[]);
        workflow
            .add_step(
                make_step("a")
                    .with_rule(WorkflowRule::for_each("items", 5))
                    .with_rule(WorkflowRule::while_loop("pending > 0", 5)),
            )
            .unwrap();

        assert!(matches!(
            workflow.validate(),
            Err(WorkflowError::MultipleLoopRules(_))
        ));
    }

    #[test]
    fn test_zero_loop_bound_rejected() {
        let mut workflow = make_workflow(&[]);
        workflow
            .add_step(make_step("a").with_rule(WorkflowRule::for_each("items", 0)))
            .unwrap();

        assert!(matches!(
            workflow.validate(),
            Err(WorkflowError::InvalidLoopBound(_))
        ));
    }

    #[test]
    fn test_editing_bumps_updated_at() {
        let mut workflow = make_workflow(&[]);
        let created = workflow.updated_at;
        workflow.add_step(make_step("a")).unwrap();
        assert!(workflow.updated_at >= created);

        workflow.remove_step(&StepId::new("a")).unwrap();
        assert!(workflow.steps.is_empty());
        assert!(matches!(
            workflow.remove_step(&StepId::new("a")),
            Err(WorkflowError::StepNotFound(_))
        ));
    }

    #[test]
    fn test_insert_step_clamps_index() {
        let mut workflow = make_workflow(&["a"]);
        workflow.insert_step(99, make_step("b")).unwrap();
        assert_eq!(workflow.steps[1].id, StepId::new("b"));

        workflow.insert_step(0, make_step("c")).unwrap();
        assert_eq!(workflow.steps[0].id, StepId::new("c"));
    }

    #[test]
    fn test_serde_round_trip_preserves_graph() {
        let mut workflow = make_workflow(&[]);
        workflow
            .add_step(
                make_step("gate")
                    .with_rule(WorkflowRule::condition(
                        "document.status",
                        crate::ConditionOperator::Equals,
                        "ready",
                    ))
                    .with_next_steps(vec![StepId::new("fan1"), StepId::new("fan2")]),
            )
            .unwrap();
        workflow.add_step(make_step("fan1")).unwrap();
        workflow
            .add_step(make_step("fan2").with_rule(WorkflowRule::for_each("attachments", 3)))
            .unwrap();

        let json = serde_json::to_string(&workflow).unwrap();
        let back: Workflow = serde_json::from_str(&json).unwrap();

        assert_eq!(back.id, workflow.id);
        assert_eq!(back.steps.len(), workflow.steps.len());
        for (a, b) in workflow.steps.iter().zip(back.steps.iter()) {
            assert_eq!(a.id, b.id);
            assert_eq!(a.rules, b.rules);
            assert_eq!(a.next_steps, b.next_steps);
        }
        assert!(back.validate().is_ok());
    }
}
