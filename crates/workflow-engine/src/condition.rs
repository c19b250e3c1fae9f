//! Comparison operators for `condition` actions and `filter` transforms.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::template::stringify;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    Contains,
    NotContains,
}

/// Compare two resolved operands.
///
/// Equality is numeric when both sides are numbers (or numeric strings) and
/// textual otherwise. Ordering coerces both sides to numbers; anything that
/// does not coerce compares false. Containment checks array membership or
/// substring.
pub fn evaluate(left: &Value, op: Operator, right: &Value) -> bool {
    match op {
        Operator::Equals => loosely_equal(left, right),
        Operator::NotEquals => !loosely_equal(left, right),
        Operator::GreaterThan => to_number(left) > to_number(right),
        Operator::LessThan => to_number(left) < to_number(right),
        Operator::Contains => contains(left, right),
        Operator::NotContains => !contains(left, right),
    }
}

/// Numeric view of a value. Returns NaN when there is none.
pub fn to_number(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) if s.trim().is_empty() => f64::NAN,
        Value::String(s) => s.trim().parse().unwrap_or(f64::NAN),
        Value::Bool(b) => f64::from(u8::from(*b)),
        _ => f64::NAN,
    }
}

fn loosely_equal(left: &Value, right: &Value) -> bool {
    let (l, r) = (to_number(left), to_number(right));
    if !l.is_nan() && !r.is_nan() && !left.is_boolean() && !right.is_boolean() {
        return l == r;
    }
    stringify(left) == stringify(right)
}

fn contains(haystack: &Value, needle: &Value) -> bool {
    match haystack {
        Value::Array(items) => items.iter().any(|item| loosely_equal(item, needle)),
        Value::Null => false,
        other => stringify(other).contains(&stringify(needle)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_equality_numeric_and_text() {
        assert!(evaluate(&json!(10), Operator::Equals, &json!("10")));
        assert!(evaluate(&json!("10.0"), Operator::Equals, &json!(10)));
        assert!(evaluate(&json!("pro"), Operator::Equals, &json!("pro")));
        assert!(evaluate(&json!("pro"), Operator::NotEquals, &json!("Pro")));
        assert!(evaluate(&json!(true), Operator::Equals, &json!("true")));
    }

    #[test]
    fn test_ordering_coerces() {
        assert!(evaluate(&json!("100"), Operator::GreaterThan, &json!(50)));
        assert!(evaluate(&json!(3.5), Operator::LessThan, &json!("4")));
        assert!(!evaluate(&json!(5), Operator::GreaterThan, &json!(5)));
    }

    #[test]
    fn test_nan_compares_false() {
        assert!(!evaluate(&json!("abc"), Operator::GreaterThan, &json!(1)));
        assert!(!evaluate(&json!("abc"), Operator::LessThan, &json!(1)));
        assert!(!evaluate(&Value::Null, Operator::GreaterThan, &json!(-1)));
    }

    #[test]
    fn test_contains() {
        assert!(evaluate(&json!("summer-sale"), Operator::Contains, &json!("sale")));
        assert!(evaluate(&json!("summer-sale"), Operator::NotContains, &json!("winter")));
        assert!(evaluate(&json!(["a", "b"]), Operator::Contains, &json!("b")));
        assert!(!evaluate(&Value::Null, Operator::Contains, &json!("")));
    }

    #[test]
    fn test_operator_names() {
        let op: Operator = serde_json::from_value(json!("greater_than")).unwrap();
        assert_eq!(op, Operator::GreaterThan);
    }
}
