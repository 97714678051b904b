//! Declarative condition evaluation
//!
//! Simple predicates resolve their `jsonPath` against the entity record with
//! `jsonpath_lib` and compare the result with the operand. Groups combine
//! predicates with AND / OR / NOT. Evaluation never fails: anything that
//! cannot be compared (missing path, mismatched types, bad pattern) makes the
//! predicate unsatisfied.

use crate::entity::EntityRecord;
use crate::workflow::types::{ConditionGroup, GroupOperator, OperatorType, Predicate, SimpleCondition};
use serde_json::Value;
use std::cmp::Ordering;

/// Evaluate a condition group against an entity record
pub fn evaluate_group(group: &ConditionGroup, record: &EntityRecord) -> bool {
    let root = Value::Object(record.clone());
    group_holds(group, &root)
}

fn group_holds(group: &ConditionGroup, root: &Value) -> bool {
    match &group.operator {
        GroupOperator::And => group.parameters.iter().all(|p| predicate_holds(p, root)),
        GroupOperator::Or => group.parameters.iter().any(|p| predicate_holds(p, root)),
        GroupOperator::Not => match group.parameters.as_slice() {
            [only] => !predicate_holds(only, root),
            _ => {
                tracing::debug!(
                    "NOT group with {} parameters is never satisfied",
                    group.parameters.len()
                );
                false
            }
        },
        GroupOperator::Unknown(raw) => {
            tracing::warn!("Unknown group operator '{}' treated as unsatisfied", raw);
            false
        }
    }
}

fn predicate_holds(predicate: &Predicate, root: &Value) -> bool {
    match predicate {
        Predicate::Simple(simple) => simple_holds(simple, root),
        Predicate::Group(group) => group_holds(group, root),
    }
}

fn simple_holds(simple: &SimpleCondition, root: &Value) -> bool {
    let actual = resolve_path(root, &simple.json_path);
    let result = apply_operator(&simple.operator_type, actual.as_ref(), &simple.value);

    tracing::debug!(
        "{} {} {} -> {}",
        simple.json_path,
        simple.operator_type,
        simple.value,
        result
    );
    result
}

/// Resolve `path` against `root`
///
/// `status` is shorthand for `$.status`. No match gives `None`; several
/// matches are collected into an array.
pub fn resolve_path(root: &Value, path: &str) -> Option<Value> {
    let path = path.trim();
    if path.is_empty() {
        return None;
    }

    let normalized;
    let path = if path.starts_with('$') {
        path
    } else {
        normalized = format!("$.{}", path);
        normalized.as_str()
    };

    match jsonpath_lib::select(root, path) {
        Ok(matches) => match matches.as_slice() {
            [] => None,
            [single] => Some((*single).clone()),
            many => Some(Value::Array(many.iter().map(|v| (*v).clone()).collect())),
        },
        Err(e) => {
            tracing::debug!("Invalid jsonPath '{}': {:?}", path, e);
            None
        }
    }
}

/// Apply one comparison operator
///
/// `actual` is the resolved record value (`None` when the path is missing),
/// `expected` is the predicate operand.
pub fn apply_operator(operator: &OperatorType, actual: Option<&Value>, expected: &Value) -> bool {
    match operator {
        OperatorType::IsNull => return actual.map_or(true, Value::is_null),
        OperatorType::NotNull => return actual.is_some_and(|v| !v.is_null()),
        _ => {}
    }

    let Some(actual) = actual else {
        return false;
    };

    match operator {
        OperatorType::Equals => values_equal(actual, expected),
        OperatorType::NotEqual => !values_equal(actual, expected),
        OperatorType::IEquals => folded(actual) == folded(expected),
        OperatorType::INotEqual => folded(actual) != folded(expected),
        OperatorType::GreaterThan => compare(actual, expected) == Some(Ordering::Greater),
        OperatorType::GreaterOrEqual => {
            matches!(compare(actual, expected), Some(Ordering::Greater | Ordering::Equal))
        }
        OperatorType::LessThan => compare(actual, expected) == Some(Ordering::Less),
        OperatorType::LessOrEqual => {
            matches!(compare(actual, expected), Some(Ordering::Less | Ordering::Equal))
        }
        OperatorType::IContains => folded(actual).contains(&folded(expected)),
        OperatorType::IStartsWith => folded(actual).starts_with(&folded(expected)),
        OperatorType::IEndsWith => folded(actual).ends_with(&folded(expected)),
        OperatorType::INotContains => !folded(actual).contains(&folded(expected)),
        OperatorType::INotStartsWith => !folded(actual).starts_with(&folded(expected)),
        OperatorType::INotEndsWith => !folded(actual).ends_with(&folded(expected)),
        OperatorType::MatchesPattern => matches_pattern(actual, expected),
        OperatorType::Between => in_range(actual, expected, false),
        OperatorType::BetweenInclusive => in_range(actual, expected, true),
        OperatorType::Unknown(raw) => {
            tracing::warn!("Unknown operator '{}' treated as unsatisfied", raw);
            false
        }
        OperatorType::IsNull | OperatorType::NotNull => false,
    }
}

/// Numeric view of a value; integers stay exact
#[derive(Debug, Clone, Copy, PartialEq)]
enum Numeric {
    Int(i128),
    Float(f64),
}

impl Numeric {
    fn as_f64(self) -> f64 {
        match self {
            Numeric::Int(i) => i as f64,
            Numeric::Float(f) => f,
        }
    }

    fn compare_to(self, other: Numeric) -> Option<Ordering> {
        match (self, other) {
            (Numeric::Int(a), Numeric::Int(b)) => Some(a.cmp(&b)),
            (a, b) => a.as_f64().partial_cmp(&b.as_f64()),
        }
    }
}

/// Numbers and numeric strings both count as numeric; "NaN" and "inf" do not
fn as_number(value: &Value) -> Option<Numeric> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .map(|i| Numeric::Int(i.into()))
            .or_else(|| n.as_u64().map(|u| Numeric::Int(u.into())))
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(Numeric::Float)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i128>().map(Numeric::Int).ok().or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite())
                    .map(Numeric::Float)
            })
        }
        _ => None,
    }
}

/// Strings as-is, everything else through its JSON text
fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn folded(value: &Value) -> String {
    text(value).to_lowercase()
}

fn values_equal(actual: &Value, expected: &Value) -> bool {
    if actual == expected {
        return true;
    }
    match (as_number(actual), as_number(expected)) {
        (Some(a), Some(b)) => a.compare_to(b) == Some(Ordering::Equal),
        _ => false,
    }
}

fn compare(actual: &Value, expected: &Value) -> Option<Ordering> {
    if let (Some(a), Some(b)) = (as_number(actual), as_number(expected)) {
        return a.compare_to(b);
    }
    match (actual, expected) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn in_range(actual: &Value, bounds: &Value, inclusive: bool) -> bool {
    let Some([low, high]) = bounds.as_array().map(Vec::as_slice) else {
        tracing::debug!("Range operand is not a [low, high] pair: {}", bounds);
        return false;
    };

    let above_low = matches!(compare(actual, low), Some(Ordering::Greater | Ordering::Equal));
    let below_high = match compare(actual, high) {
        Some(Ordering::Less) => true,
        Some(Ordering::Equal) => inclusive,
        _ => false,
    };
    above_low && below_high
}

fn matches_pattern(actual: &Value, pattern: &Value) -> bool {
    let Some(pattern) = pattern.as_str() else {
        return false;
    };
    match regex::Regex::new(pattern) {
        Ok(re) => re.is_match(&text(actual)),
        Err(e) => {
            tracing::warn!("Invalid MATCHES_PATTERN regex '{}': {}", pattern, e);
            false
        }
    }
}
