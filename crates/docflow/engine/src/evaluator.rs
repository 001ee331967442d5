//! Rule evaluator: condition gates and loop plans over the run context
//!
//! The evaluator examines a step's rules against the run's JSON context to
//! decide whether the step executes and how often. It does NOT produce
//! side effects; it is a pure evaluation function, and the runner decides
//! what to do with its verdicts.
//!
//! Fields are dotted paths into the context (`document.status`,
//! `attachments.0.name`). A path that fails to resolve fails closed: the
//! condition does not pass, and the runner records a warning rather than
//! failing the run.

use docflow_types::{ConditionOperator, LoopKind, RuleKind, WorkflowStep};
use serde_json::Value;
use std::cmp::Ordering;

/// Evaluates workflow rules against a run context
#[derive(Clone, Debug)]
pub struct RuleEvaluator;

impl RuleEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate every condition rule on a step. Conditions combine with
    /// AND semantics: the first non-passing rule decides the verdict.
    pub fn step_verdict(&self, step: &WorkflowStep, context: &Value) -> ConditionVerdict {
        for rule in step.condition_rules() {
            if let RuleKind::Condition {
                field,
                operator,
                value,
            } = &rule.kind
            {
                let verdict = self.evaluate_condition(field, *operator, value, context);
                if !verdict.is_passed() {
                    return verdict;
                }
            }
        }
        ConditionVerdict::Passed
    }

    /// Evaluate a single condition against the context.
    ///
    /// The emptiness operators never return `Unresolved`: a missing field
    /// IS empty. Every other operator needs a resolved field to judge.
    pub fn evaluate_condition(
        &self,
        field: &str,
        operator: ConditionOperator,
        expected: &Value,
        context: &Value,
    ) -> ConditionVerdict {
        let resolved = resolve_path(context, field);

        match operator {
            ConditionOperator::IsEmpty => {
                if is_empty(resolved) {
                    ConditionVerdict::Passed
                } else {
                    ConditionVerdict::Failed {
                        reason: format!("field '{}' is not empty", field),
                    }
                }
            }
            ConditionOperator::IsNotEmpty => {
                if is_empty(resolved) {
                    ConditionVerdict::Failed {
                        reason: format!("field '{}' is empty", field),
                    }
                } else {
                    ConditionVerdict::Passed
                }
            }
            _ => {
                let actual = match resolved {
                    Some(value) => value,
                    None => {
                        return ConditionVerdict::Unresolved {
                            field: field.to_string(),
                        }
                    }
                };
                self.compare_resolved(field, operator, actual, expected)
            }
        }
    }

    fn compare_resolved(
        &self,
        field: &str,
        operator: ConditionOperator,
        actual: &Value,
        expected: &Value,
    ) -> ConditionVerdict {
        let pass = |ok: bool, reason: String| {
            if ok {
                ConditionVerdict::Passed
            } else {
                ConditionVerdict::Failed { reason }
            }
        };

        match operator {
            ConditionOperator::Equals => pass(
                values_equal(actual, expected),
                format!("field '{}' is {} and not {}", field, actual, expected),
            ),
            ConditionOperator::NotEquals => pass(
                !values_equal(actual, expected),
                format!("field '{}' equals {}", field, expected),
            ),
            ConditionOperator::GreaterThan => match order_values(actual, expected) {
                Some(ordering) => pass(
                    ordering == Ordering::Greater,
                    format!("field '{}' ({}) is not greater than {}", field, actual, expected),
                ),
                None => ConditionVerdict::Failed {
                    reason: format!("cannot order field '{}' against {}", field, expected),
                },
            },
            ConditionOperator::LessThan => match order_values(actual, expected) {
                Some(ordering) => pass(
                    ordering == Ordering::Less,
                    format!("field '{}' ({}) is not less than {}", field, actual, expected),
                ),
                None => ConditionVerdict::Failed {
                    reason: format!("cannot order field '{}' against {}", field, expected),
                },
            },
            ConditionOperator::Contains => match actual {
                Value::String(text) => pass(
                    text.contains(&value_text(expected)),
                    format!("field '{}' does not contain {}", field, expected),
                ),
                Value::Array(items) => pass(
                    items.iter().any(|item| values_equal(item, expected)),
                    format!("field '{}' does not contain {}", field, expected),
                ),
                _ => ConditionVerdict::Failed {
                    reason: format!("field '{}' is neither a string nor an array", field),
                },
            },
            ConditionOperator::NotContains => match actual {
                Value::String(text) => pass(
                    !text.contains(&value_text(expected)),
                    format!("field '{}' contains {}", field, expected),
                ),
                Value::Array(items) => pass(
                    !items.iter().any(|item| values_equal(item, expected)),
                    format!("field '{}' contains {}", field, expected),
                ),
                _ => ConditionVerdict::Failed {
                    reason: format!("field '{}' is neither a string nor an array", field),
                },
            },
            ConditionOperator::StartsWith => pass(
                value_text(actual).starts_with(&value_text(expected)),
                format!("field '{}' does not start with {}", field, expected),
            ),
            ConditionOperator::EndsWith => pass(
                value_text(actual).ends_with(&value_text(expected)),
                format!("field '{}' does not end with {}", field, expected),
            ),
            // Handled before resolution
            ConditionOperator::IsEmpty | ConditionOperator::IsNotEmpty => {
                ConditionVerdict::Passed
            }
        }
    }

    /// Turn a step's loop rule (if any) into an execution plan
    pub fn loop_plan(&self, step: &WorkflowStep, context: &Value) -> LoopPlan {
        let rule = match step.loop_rule() {
            Some(rule) => rule,
            None => return LoopPlan::Once,
        };
        let RuleKind::Loop {
            loop_type,
            loop_condition,
            max_iterations,
        } = &rule.kind
        else {
            return LoopPlan::Once;
        };

        match loop_type {
            LoopKind::ForEach => {
                // For for-each loops the condition string is the path to
                // the collection
                let (items, resolved) = match resolve_path(context, loop_condition) {
                    Some(Value::Array(items)) => (items.clone(), true),
                    _ => (Vec::new(), false),
                };
                let bound = *max_iterations as usize;
                let dropped = items.len().saturating_sub(bound);
                LoopPlan::ForEach {
                    path: loop_condition.clone(),
                    items: items.into_iter().take(bound).collect(),
                    dropped,
                    resolved,
                }
            }
            LoopKind::While => LoopPlan::While {
                condition: loop_condition.clone(),
                max_iterations: *max_iterations,
            },
            LoopKind::DoWhile => LoopPlan::DoWhile {
                condition: loop_condition.clone(),
                max_iterations: *max_iterations,
            },
        }
    }

    /// Evaluate a while/do-while condition expression.
    ///
    /// Supports `path op literal` with `==`, `!=`, `>=`, `<=`, `>`, `<`,
    /// and a bare path judged for truthiness. Literals may be numbers,
    /// `true`/`false`/`null`, quoted strings, or bare words (strings).
    /// A path that does not resolve makes the expression false, whatever
    /// the operator.
    pub fn evaluate_expression(&self, expression: &str, context: &Value) -> bool {
        let expression = expression.trim();

        // Two-character operators first so ">=" is not read as ">"
        for token in ["==", "!=", ">=", "<=", ">", "<"] {
            let Some((path, literal)) = expression.split_once(token) else {
                continue;
            };
            let expected = parse_literal(literal);
            let Some(actual) = resolve_path(context, path.trim()) else {
                return false;
            };
            return match token {
                "==" => values_equal(actual, &expected),
                "!=" => !values_equal(actual, &expected),
                ">=" => matches!(
                    order_values(actual, &expected),
                    Some(Ordering::Greater | Ordering::Equal)
                ),
                "<=" => matches!(
                    order_values(actual, &expected),
                    Some(Ordering::Less | Ordering::Equal)
                ),
                ">" => order_values(actual, &expected) == Some(Ordering::Greater),
                "<" => order_values(actual, &expected) == Some(Ordering::Less),
                _ => false,
            };
        }

        is_truthy(resolve_path(context, expression))
    }
}

impl Default for RuleEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

// ── Verdicts and plans ───────────────────────────────────────────────

/// Result of evaluating a step's condition rules
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConditionVerdict {
    /// All conditions passed; the step executes
    Passed,
    /// A condition evaluated to false
    Failed { reason: String },
    /// A condition's field did not resolve; fails closed
    Unresolved { field: String },
}

impl ConditionVerdict {
    pub fn is_passed(&self) -> bool {
        matches!(self, Self::Passed)
    }
}

/// How often a step's task executes
#[derive(Clone, Debug, PartialEq)]
pub enum LoopPlan {
    /// No loop rule: exactly one execution
    Once,
    /// One execution per item, already truncated to the loop bound.
    /// `dropped` counts items beyond the bound; `resolved` is false when
    /// the path did not name an array.
    ForEach {
        path: String,
        items: Vec<Value>,
        dropped: usize,
        resolved: bool,
    },
    /// Re-check the condition before each execution
    While {
        condition: String,
        max_iterations: u32,
    },
    /// Execute once, then re-check before each further execution
    DoWhile {
        condition: String,
        max_iterations: u32,
    },
}

// ── Context access ───────────────────────────────────────────────────

/// Resolve a dotted path against a JSON value. Numeric segments index
/// into arrays.
pub fn resolve_path<'a>(context: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = context;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Missing, null, empty string, empty array, and empty object are empty.
/// Numbers and booleans never are.
fn is_empty(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        Some(Value::Object(map)) => map.is_empty(),
        Some(Value::Bool(_)) | Some(Value::Number(_)) => false,
    }
}

fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(map)) => !map.is_empty(),
    }
}

/// Structural equality with numeric normalization, so `1` equals `1.0`
fn values_equal(a: &Value, b: &Value) -> bool {
    if let (Value::Number(x), Value::Number(y)) = (a, b) {
        return match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        };
    }
    a == b
}

/// Order two values numerically when both coerce to numbers, falling back
/// to lexicographic order for string pairs
fn order_values(a: &Value, b: &Value) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (as_number(a), as_number(b)) {
        return x.partial_cmp(&y);
    }
    if let (Value::String(x), Value::String(y)) = (a, b) {
        return Some(x.cmp(y));
    }
    None
}

/// Numbers, and strings that parse as numbers
fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Display form used for substring and prefix/suffix checks
fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Parse the literal side of a condition expression
fn parse_literal(raw: &str) -> Value {
    let raw = raw.trim();
    if let Some(inner) = raw
        .strip_prefix('\'')
        .and_then(|rest| rest.strip_suffix('\''))
    {
        return Value::String(inner.to_string());
    }
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
