use crate::types::{Condition, ConditionOperator, JsonMap};
use serde_json::Value;

/// AND over every condition. An empty list holds vacuously.
pub fn evaluate_conditions(conditions: &[Condition], variables: &JsonMap) -> bool {
    conditions.iter().all(|c| evaluate(c, variables))
}

/// A missing variable never satisfies a condition.
pub fn evaluate(condition: &Condition, variables: &JsonMap) -> bool {
    let Some(actual) = variables.get(&condition.field) else {
        return false;
    };
    let expected = &condition.value;
    match condition.operator {
        ConditionOperator::Equals => actual == expected,
        ConditionOperator::Contains => contains(actual, expected),
        ConditionOperator::GreaterThan => {
            compare(actual, expected).is_some_and(|o| o == std::cmp::Ordering::Greater)
        }
        ConditionOperator::LessThan => {
            compare(actual, expected).is_some_and(|o| o == std::cmp::Ordering::Less)
        }
    }
}

/// Substring match for strings, membership for arrays.
fn contains(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::String(haystack), Value::String(needle)) => haystack.contains(needle.as_str()),
        (Value::String(haystack), other) => haystack.contains(&other.to_string()),
        (Value::Array(items), needle) => items.contains(needle),
        _ => false,
    }
}

/// Numeric comparison after coercing both sides to numbers. A side that does
/// not coerce makes the comparison false.
fn compare(actual: &Value, expected: &Value) -> Option<std::cmp::Ordering> {
    as_number(actual)?.partial_cmp(&as_number(expected)?)
}

/// Number coercion: booleans are 1/0, `null` and blank strings are 0, other
/// strings must parse as a number. Arrays and objects do not coerce.
fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Null => Some(0.0),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                Some(0.0)
            } else {
                s.parse::<f64>().ok().filter(|n| n.is_finite())
            }
        }
        Value::Array(_) | Value::Object(_) => None,
    }
}
