//! Predicate evaluation for `Search` filters and `RegexSearch` field patterns.

use std::collections::HashMap;
use regex::Regex;
use serde_json::Value;
use log::debug;
use crate::{Filter, Result, Error};

/// Evaluates a filter against a decoded record.
///
/// Every filter field must be present in the record. A literal filter value
/// matches on equality; an object value is read as a set of operators
/// (`$gt`, `$lt`, `$gte`, `$lte`, `$ne`, `$in`) that must all hold.
/// Unrecognized operators are ignored.
pub fn matches_filter(record: &Value, filter: &Filter) -> Result<bool> {
    let Some(fields) = record.as_object() else {
        return Ok(false);
    };

    for (field, condition) in filter {
        let Some(actual) = fields.get(field) else {
            return Ok(false);
        };

        let matched = match condition {
            Value::Object(ops) => {
                let mut all = true;
                for (op, operand) in ops {
                    if !eval_operator(field, actual, op, operand)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            literal => values_equal(actual, literal),
        };

        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

fn eval_operator(field: &str, actual: &Value, op: &str, operand: &Value) -> Result<bool> {
    match op {
        "$gt" => numeric(field, op, actual, operand).map(|(a, b)| a > b),
        "$lt" => numeric(field, op, actual, operand).map(|(a, b)| a < b),
        "$gte" => numeric(field, op, actual, operand).map(|(a, b)| a >= b),
        "$lte" => numeric(field, op, actual, operand).map(|(a, b)| a <= b),
        "$ne" => Ok(!values_equal(actual, operand)),
        "$in" => match operand {
            Value::Array(items) => Ok(items.iter().any(|item| values_equal(actual, item))),
            _ => Err(Error::TypeMismatch {
                field: field.to_string(),
                op: op.to_string(),
            }),
        },
        other => {
            debug!("Ignoring unsupported operator {} on field {}", other, field);
            Ok(true)
        }
    }
}

fn numeric(field: &str, op: &str, actual: &Value, operand: &Value) -> Result<(f64, f64)> {
    match (actual.as_f64(), operand.as_f64()) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => Err(Error::TypeMismatch {
            field: field.to_string(),
            op: op.to_string(),
        }),
    }
}

/// Structural equality that compares all numbers as floats, so `25` and
/// `25.0` are the same value.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs.iter().all(|(k, x)| ys.get(k).is_some_and(|y| values_equal(x, y)))
        }
        _ => a == b,
    }
}

/// Compiled per-field regular expressions for `RegexSearch`.
#[derive(Debug, Clone)]
pub struct FieldPatterns {
    patterns: Vec<(String, Regex)>,
}

impl FieldPatterns {
    /// Compiles every pattern up front; a malformed pattern fails the whole set.
    pub fn compile(patterns: &HashMap<String, String>) -> Result<Self> {
        let mut compiled = Vec::with_capacity(patterns.len());
        for (field, pattern) in patterns {
            compiled.push((field.clone(), Regex::new(pattern)?));
        }
        Ok(Self { patterns: compiled })
    }

    /// A record matches when every field is present and its textual form
    /// contains a match for that field's pattern.
    pub fn matches(&self, record: &Value) -> bool {
        let Some(fields) = record.as_object() else {
            return false;
        };
        self.patterns.iter().all(|(field, re)| {
            fields
                .get(field)
                .is_some_and(|value| re.is_match(&display_value(value)))
        })
    }
}

/// Textual form of a value: strings unquoted, integral floats without a
/// trailing `.0`, everything else as compact JSON.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() => f.to_string(),
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}
