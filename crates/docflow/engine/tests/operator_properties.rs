//! Property tests: condition operators keep their contracts over
//! arbitrary context values.
//!
//! The emptiness operators always reach a verdict; every other operator
//! fails closed on unresolved fields; equality and ordering behave like
//! their names over the whole value space.

use docflow_engine::{ConditionVerdict, RuleEvaluator};
use docflow_types::ConditionOperator;
use proptest::prelude::*;
use serde_json::{json, Value};

// ---------------------------------------------------------------------------
// Helpers / Strategies
// ---------------------------------------------------------------------------

/// Context with a single field holding the value under test.
fn context_with(value: Value) -> Value {
    let mut map = serde_json::Map::new();
    map.insert("field".into(), value);
    Value::Object(map)
}

/// Generate an arbitrary JSON scalar (finite numbers only; JSON has no
/// NaN or infinity to begin with).
fn arb_scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        (-1_000_000i64..1_000_000).prop_map(Value::from),
        (-1.0e6..1.0e6f64).prop_map(|f| json!(f)),
        "[a-z0-9 ]{0,12}".prop_map(Value::from),
    ]
}

/// Scalars plus shallow arrays of scalars.
fn arb_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        arb_scalar(),
        prop::collection::vec(arb_scalar(), 0..4).prop_map(Value::from),
    ]
}

/// Strings that never parse as numbers (no digits, and no way to spell
/// "inf" or "nan" without the letters a..f).
fn arb_plain_word() -> impl Strategy<Value = String> {
    "[g-z]{1,6}"
}

/// The operators that need a resolved field to judge.
fn arb_comparison_operator() -> impl Strategy<Value = ConditionOperator> {
    prop_oneof![
        Just(ConditionOperator::Equals),
        Just(ConditionOperator::NotEquals),
        Just(ConditionOperator::GreaterThan),
        Just(ConditionOperator::LessThan),
        Just(ConditionOperator::Contains),
        Just(ConditionOperator::NotContains),
        Just(ConditionOperator::StartsWith),
        Just(ConditionOperator::EndsWith),
    ]
}

// ---------------------------------------------------------------------------
// Property Tests
// ---------------------------------------------------------------------------

proptest! {
    /// Exactly one of is_empty / is_not_empty passes for any present
    /// value, and neither ever comes back unresolved.
    #[test]
    fn emptiness_operators_are_exact_complements(value in arb_value()) {
        let evaluator = RuleEvaluator::new();
        let context = context_with(value);

        let empty = evaluator.evaluate_condition(
            "field", ConditionOperator::IsEmpty, &Value::Null, &context,
        );
        let not_empty = evaluator.evaluate_condition(
            "field", ConditionOperator::IsNotEmpty, &Value::Null, &context,
        );

        let empty_unresolved = matches!(empty, ConditionVerdict::Unresolved { .. });
        let not_empty_unresolved = matches!(not_empty, ConditionVerdict::Unresolved { .. });
        prop_assert!(!empty_unresolved);
        prop_assert!(!not_empty_unresolved);
        prop_assert_eq!(empty.is_passed(), !not_empty.is_passed());
    }

    /// A value always equals itself, whatever its shape.
    #[test]
    fn equals_is_reflexive(value in arb_value()) {
        let evaluator = RuleEvaluator::new();
        let context = context_with(value.clone());

        let verdict = evaluator.evaluate_condition(
            "field", ConditionOperator::Equals, &value, &context,
        );
        prop_assert!(verdict.is_passed());
    }

    /// On a resolved field, not_equals is the exact negation of equals.
    #[test]
    fn not_equals_complements_equals(actual in arb_value(), expected in arb_value()) {
        let evaluator = RuleEvaluator::new();
        let context = context_with(actual);

        let eq = evaluator.evaluate_condition(
            "field", ConditionOperator::Equals, &expected, &context,
        );
        let ne = evaluator.evaluate_condition(
            "field", ConditionOperator::NotEquals, &expected, &context,
        );

        let eq_unresolved = matches!(eq, ConditionVerdict::Unresolved { .. });
        prop_assert!(!eq_unresolved);
        prop_assert_eq!(eq.is_passed(), !ne.is_passed());
    }

    /// Numeric ordering tracks the numbers and never passes both ways.
    #[test]
    fn numeric_order_is_exclusive(a in -1_000_000i64..1_000_000, b in -1_000_000i64..1_000_000) {
        let evaluator = RuleEvaluator::new();
        let context = context_with(json!(a));
        let expected = json!(b);

        let gt = evaluator
            .evaluate_condition("field", ConditionOperator::GreaterThan, &expected, &context)
            .is_passed();
        let lt = evaluator
            .evaluate_condition("field", ConditionOperator::LessThan, &expected, &context)
            .is_passed();

        prop_assert_eq!(gt, a > b);
        prop_assert_eq!(lt, a < b);
        prop_assert!(!(gt && lt));
    }

    /// An integer equals its float spelling: `3` matches `3.0`.
    #[test]
    fn integer_equals_its_float_form(n in -1_000_000i64..1_000_000) {
        let evaluator = RuleEvaluator::new();
        let context = context_with(json!(n));

        let verdict = evaluator.evaluate_condition(
            "field", ConditionOperator::Equals, &json!(n as f64), &context,
        );
        prop_assert!(verdict.is_passed());
    }

    /// Every comparison operator reports the field, not a verdict, when
    /// the field does not resolve.
    #[test]
    fn comparison_operators_fail_closed_on_missing_fields(
        operator in arb_comparison_operator(),
        expected in arb_value(),
    ) {
        let evaluator = RuleEvaluator::new();
        let context = json!({});

        let verdict = evaluator.evaluate_condition("absent.path", operator, &expected, &context);
        prop_assert_eq!(
            verdict,
            ConditionVerdict::Unresolved { field: "absent.path".to_string() }
        );
    }

    /// Array containment finds every element actually in the array.
    #[test]
    fn contains_finds_every_member(
        items in prop::collection::vec(arb_scalar(), 1..6),
        index in any::<prop::sample::Index>(),
    ) {
        let evaluator = RuleEvaluator::new();
        let expected = items[index.index(items.len())].clone();
        let context = context_with(Value::from(items));

        let verdict = evaluator.evaluate_condition(
            "field", ConditionOperator::Contains, &expected, &context,
        );
        prop_assert!(verdict.is_passed());
    }

    /// On arrays, not_contains is the exact negation of contains.
    #[test]
    fn not_contains_complements_contains_on_arrays(
        items in prop::collection::vec(arb_scalar(), 0..6),
        expected in arb_scalar(),
    ) {
        let evaluator = RuleEvaluator::new();
        let context = context_with(Value::from(items));

        let contains = evaluator
            .evaluate_condition("field", ConditionOperator::Contains, &expected, &context)
            .is_passed();
        let not_contains = evaluator
            .evaluate_condition("field", ConditionOperator::NotContains, &expected, &context)
            .is_passed();
        prop_assert_eq!(not_contains, !contains);
    }

    /// Strings that are not numbers order lexicographically.
    #[test]
    fn plain_strings_order_lexicographically(a in arb_plain_word(), b in arb_plain_word()) {
        let evaluator = RuleEvaluator::new();
        let context = context_with(json!(a.clone()));
        let expected = json!(b.clone());

        let gt = evaluator
            .evaluate_condition("field", ConditionOperator::GreaterThan, &expected, &context)
            .is_passed();
        let lt = evaluator
            .evaluate_condition("field", ConditionOperator::LessThan, &expected, &context)
            .is_passed();

        prop_assert_eq!(gt, a > b);
        prop_assert_eq!(lt, a < b);
    }
}
