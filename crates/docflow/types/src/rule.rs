//! Rules: gates and loops attached to workflow steps
//!
//! Condition rules gate whether a step executes; all conditions on a step
//! are ANDed. A loop rule makes the step execute repeatedly, always bounded
//! by `max_iterations`. A step carries at most one loop rule; loops do not
//! nest within a single step.
//!
//! The serialized form is `{id, type: "condition" | "loop", settings: {…}}`,
//! the shape the workflow builder produces.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ── Identifier ───────────────────────────────────────────────────────

/// Unique identifier for a rule
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleId(pub String);

impl RuleId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for RuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Operators and loop kinds ─────────────────────────────────────────

/// Comparison applied by a condition rule.
///
/// `greater_than`/`less_than` coerce both sides to numbers when possible,
/// falling back to string comparison. `is_empty`/`is_not_empty` treat null,
/// missing fields, empty strings, and empty collections as empty.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    GreaterThan,
    LessThan,
    StartsWith,
    EndsWith,
    IsEmpty,
    IsNotEmpty,
}

impl ConditionOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equals => "equals",
            Self::NotEquals => "not_equals",
            Self::Contains => "contains",
            Self::NotContains => "not_contains",
            Self::GreaterThan => "greater_than",
            Self::LessThan => "less_than",
            Self::StartsWith => "starts_with",
            Self::EndsWith => "ends_with",
            Self::IsEmpty => "is_empty",
            Self::IsNotEmpty => "is_not_empty",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Equals => "Equals",
            Self::NotEquals => "Not Equals",
            Self::Contains => "Contains",
            Self::NotContains => "Not Contains",
            Self::GreaterThan => "Greater Than",
            Self::LessThan => "Less Than",
            Self::StartsWith => "Starts With",
            Self::EndsWith => "Ends With",
            Self::IsEmpty => "Is Empty",
            Self::IsNotEmpty => "Is Not Empty",
        }
    }

    /// Whether the operator compares against a rule value
    pub fn needs_value(&self) -> bool {
        !matches!(self, Self::IsEmpty | Self::IsNotEmpty)
    }
}

impl std::fmt::Display for ConditionOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a loop rule repeats its step
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopKind {
    /// Iterate over the collection at the condition path
    ForEach,
    /// Re-check the condition before each iteration
    While,
    /// Run once, then re-check the condition after each iteration
    DoWhile,
}

impl LoopKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ForEach => "for_each",
            Self::While => "while",
            Self::DoWhile => "do_while",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::ForEach => "For Each",
            Self::While => "While",
            Self::DoWhile => "Do While",
        }
    }
}

impl std::fmt::Display for LoopKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ── The rule type ────────────────────────────────────────────────────

/// The two kinds of rule and their settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "settings", rename_all = "snake_case")]
pub enum RuleKind {
    /// Boolean gate: `field <operator> value` against the run context
    Condition {
        /// Dotted path into the run context
        field: String,
        operator: ConditionOperator,
        #[serde(default)]
        value: Value,
    },
    /// Repetition policy, always bounded
    Loop {
        loop_type: LoopKind,
        /// Collection path (`for_each`) or condition expression (`while`,
        /// `do_while`)
        loop_condition: String,
        /// Hard bound on iterations; exceeding it truncates with a warning
        max_iterations: u32,
    },
}

/// A rule attached to a workflow step
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRule {
    pub id: RuleId,
    #[serde(flatten)]
    pub kind: RuleKind,
}

impl WorkflowRule {
    /// Create a condition rule
    pub fn condition(
        field: impl Into<String>,
        operator: ConditionOperator,
        value: impl Into<Value>,
    ) -> Self {
        Self {
            id: RuleId::generate(),
            kind: RuleKind::Condition {
                field: field.into(),
                operator,
                value: value.into(),
            },
        }
    }

    /// Create a `for_each` loop over the collection at `path`
    pub fn for_each(path: impl Into<String>, max_iterations: u32) -> Self {
        Self::loop_rule(LoopKind::ForEach, path, max_iterations)
    }

    /// Create a `while` loop driven by a condition expression
    pub fn while_loop(condition: impl Into<String>, max_iterations: u32) -> Self {
        Self::loop_rule(LoopKind::While, condition, max_iterations)
    }

    /// Create a `do_while` loop driven by a condition expression
    pub fn do_while(condition: impl Into<String>, max_iterations: u32) -> Self {
        Self::loop_rule(LoopKind::DoWhile, condition, max_iterations)
    }

    fn loop_rule(loop_type: LoopKind, condition: impl Into<String>, max_iterations: u32) -> Self {
        Self {
            id: RuleId::generate(),
            kind: RuleKind::Loop {
                loop_type,
                loop_condition: condition.into(),
                max_iterations,
            },
        }
    }

    pub fn is_condition(&self) -> bool {
        matches!(self.kind, RuleKind::Condition { .. })
    }

    pub fn is_loop(&self) -> bool {
        matches!(self.kind, RuleKind::Loop { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_condition_wire_shape() {
        let rule = WorkflowRule::condition("document.status", ConditionOperator::Equals, "draft");
        let json = serde_json::to_value(&rule).unwrap();

        assert_eq!(json["type"], "condition");
        assert_eq!(json["settings"]["field"], "document.status");
        assert_eq!(json["settings"]["operator"], "equals");
        assert_eq!(json["settings"]["value"], "draft");

        let back: WorkflowRule = serde_json::from_value(json).unwrap();
        assert!(back.is_condition());
        assert_eq!(back, rule);
    }

    #[test]
    fn test_loop_wire_shape() {
        let rule = WorkflowRule::for_each("attachments", 10);
        let json = serde_json::to_value(&rule).unwrap();

        assert_eq!(json["type"], "loop");
        assert_eq!(json["settings"]["loop_type"], "for_each");
        assert_eq!(json["settings"]["loop_condition"], "attachments");
        assert_eq!(json["settings"]["max_iterations"], 10);

        let back: WorkflowRule = serde_json::from_value(json).unwrap();
        assert!(back.is_loop());
    }

    #[test]
    fn test_value_defaults_to_null() {
        // is_empty rules carry no value; deserialization must not require one
        let rule: WorkflowRule = serde_json::from_value(json!({
            "id": "rule-1",
            "type": "condition",
            "settings": { "field": "assignee", "operator": "is_empty" }
        }))
        .unwrap();

        match &rule.kind {
            RuleKind::Condition {
                operator, value, ..
            } => {
                assert_eq!(*operator, ConditionOperator::IsEmpty);
                assert!(value.is_null());
                assert!(!operator.needs_value());
            }
            RuleKind::Loop { .. } => panic!("expected condition"),
        }
    }

    #[test]
    fn test_operator_labels() {
        assert_eq!(ConditionOperator::GreaterThan.label(), "Greater Than");
        assert_eq!(ConditionOperator::GreaterThan.as_str(), "greater_than");
        assert_eq!(LoopKind::DoWhile.label(), "Do While");
        assert_eq!(LoopKind::DoWhile.as_str(), "do_while");
    }
}
