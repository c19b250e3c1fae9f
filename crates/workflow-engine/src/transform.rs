//! Array transforms: map, filter, reduce and sort.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::condition::{evaluate, to_number, Operator};
use crate::error::{EngineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformOperation {
    Map,
    Filter,
    Reduce,
    Sort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reducer {
    Sum,
    Count,
    Min,
    Max,
    Avg,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// A fully specified transform.
#[derive(Debug, Clone, PartialEq)]
pub enum Transform {
    /// Pluck `field` from each item.
    Map { field: String },
    /// Keep items whose `field` (or the item itself) satisfies the comparison.
    Filter {
        field: Option<String>,
        operator: Operator,
        value: Value,
    },
    Reduce { reducer: Reducer, field: Option<String> },
    Sort { field: Option<String>, order: SortOrder },
}

impl Transform {
    pub fn apply(&self, input: &Value) -> Result<Value> {
        let items = input
            .as_array()
            .ok_or_else(|| EngineError::Transform(format!("expected an array, got {}", type_name(input))))?;

        let output = match self {
            Transform::Map { field } => Value::Array(
                items
                    .iter()
                    .map(|item| pluck(item, Some(field.as_str())).clone())
                    .collect(),
            ),
            Transform::Filter { field, operator, value } => Value::Array(
                items
                    .iter()
                    .filter(|item| evaluate(pluck(item, field.as_deref()), *operator, value))
                    .cloned()
                    .collect(),
            ),
            Transform::Reduce { reducer, field } => reduce(items, *reducer, field.as_deref()),
            Transform::Sort { field, order } => {
                let mut sorted = items.clone();
                sorted.sort_by(|a, b| {
                    let ordering = compare(pluck(a, field.as_deref()), pluck(b, field.as_deref()));
                    match order {
                        SortOrder::Asc => ordering,
                        SortOrder::Desc => ordering.reverse(),
                    }
                });
                Value::Array(sorted)
            }
        };

        Ok(output)
    }
}

fn pluck<'a>(item: &'a Value, field: Option<&str>) -> &'a Value {
    match field {
        Some(field) => field
            .split('.')
            .try_fold(item, |current, key| current.get(key))
            .unwrap_or(&Value::Null),
        None => item,
    }
}

fn reduce(items: &[Value], reducer: Reducer, field: Option<&str>) -> Value {
    if reducer == Reducer::Count {
        return Value::from(items.len());
    }

    let numbers: Vec<f64> = items
        .iter()
        .map(|item| to_number(pluck(item, field)))
        .filter(|n| !n.is_nan())
        .collect();
    if numbers.is_empty() {
        return match reducer {
            Reducer::Sum => Value::from(0),
            _ => Value::Null,
        };
    }

    let result = match reducer {
        Reducer::Sum => numbers.iter().sum(),
        Reducer::Min => numbers.iter().copied().fold(f64::INFINITY, f64::min),
        Reducer::Max => numbers.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        Reducer::Avg => numbers.iter().sum::<f64>() / numbers.len() as f64,
        Reducer::Count => items.len() as f64,
    };
    number(result)
}

fn number(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        Value::from(value as i64)
    } else {
        Value::from(value)
    }
}

/// Numbers compare numerically, everything else by its text.
fn compare(a: &Value, b: &Value) -> Ordering {
    let (x, y) = (to_number(a), to_number(b));
    if !x.is_nan() && !y.is_nan() {
        return x.partial_cmp(&y).unwrap_or(Ordering::Equal);
    }
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Greater,
        (_, Value::Null) => Ordering::Less,
        _ => crate::template::stringify(a).cmp(&crate::template::stringify(b)),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
