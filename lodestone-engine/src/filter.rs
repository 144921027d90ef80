//! Metadata filter compilation and evaluation.
//!
//! A filter spec maps field names to constraints, where a constraint is
//! either a bare scalar (implicit equality) or a mapping of operators to
//! operands. Compilation validates the whole spec up front, so malformed
//! filters fail the request instead of failing per candidate; the
//! compiled [`Filter`] is a side-effect-free predicate over a chunk's
//! metadata map.
//!
//! Operators within one field AND together, and so do fields. An empty
//! spec is the universal predicate.

use lodestone_core::{Error, Metadata, Result, Value};
use serde_json::Value as JsonValue;
use std::cmp::Ordering;

/// One compiled constraint on a single field.
#[derive(Debug, Clone, PartialEq)]
enum Condition {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    Contains(String),
    In(Vec<Value>),
    Nin(Vec<Value>),
}

impl Condition {
    fn evaluate(&self, field: Option<&Value>) -> bool {
        match self {
            Condition::Eq(operand) => field == Some(operand),
            // Missing fields pass `ne` and `nin`.
            Condition::Ne(operand) => field != Some(operand),
            Condition::Gt(operand) => ordered(field, operand, |o| o == Ordering::Greater),
            Condition::Gte(operand) => ordered(field, operand, |o| o != Ordering::Less),
            Condition::Lt(operand) => ordered(field, operand, |o| o == Ordering::Less),
            Condition::Lte(operand) => ordered(field, operand, |o| o != Ordering::Greater),
            Condition::Contains(operand) => field
                .and_then(Value::as_str)
                .is_some_and(|s| s.to_lowercase().contains(&operand.to_lowercase())),
            Condition::In(operands) => {
                field.is_some_and(|v| operands.iter().any(|o| o == v))
            }
            Condition::Nin(operands) => {
                field.is_none_or(|v| operands.iter().all(|o| o != v))
            }
        }
    }
}

fn ordered(field: Option<&Value>, operand: &Value, pass: impl Fn(Ordering) -> bool) -> bool {
    field
        .and_then(|v| v.compare(operand))
        .is_some_and(pass)
}

/// A compiled metadata predicate.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    clauses: Vec<(String, Vec<Condition>)>,
}

impl Filter {
    /// The always-true predicate.
    pub fn universal() -> Self {
        Self::default()
    }

    /// Compile a filter spec. Unknown operators and malformed operands
    /// are rejected here, never during evaluation.
    pub fn compile(spec: &JsonValue) -> Result<Self> {
        let object = spec
            .as_object()
            .ok_or_else(|| Error::invalid_filter("filter spec must be an object"))?;

        let mut clauses = Vec::with_capacity(object.len());
        for (field, constraint) in object {
            let conditions = match constraint {
                JsonValue::Object(ops) => {
                    if ops.is_empty() {
                        return Err(Error::invalid_filter(format!(
                            "field {field} has no operators"
                        )));
                    }
                    ops.iter()
                        .map(|(op, operand)| compile_condition(field, op, operand))
                        .collect::<Result<Vec<_>>>()?
                }
                scalar => vec![Condition::Eq(operand_value(field, scalar)?)],
            };
            clauses.push((field.clone(), conditions));
        }
        Ok(Self { clauses })
    }

    /// Whether this filter accepts every candidate.
    pub fn is_universal(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Evaluate the predicate against a metadata map.
    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.clauses.iter().all(|(field, conditions)| {
            let value = metadata.get(field);
            conditions.iter().all(|c| c.evaluate(value))
        })
    }
}

fn compile_condition(field: &str, op: &str, operand: &JsonValue) -> Result<Condition> {
    match op {
        "eq" => Ok(Condition::Eq(operand_value(field, operand)?)),
        "ne" => Ok(Condition::Ne(operand_value(field, operand)?)),
        "gt" => Ok(Condition::Gt(range_operand(field, op, operand)?)),
        "gte" => Ok(Condition::Gte(range_operand(field, op, operand)?)),
        "lt" => Ok(Condition::Lt(range_operand(field, op, operand)?)),
        "lte" => Ok(Condition::Lte(range_operand(field, op, operand)?)),
        "contains" => match operand.as_str() {
            Some(s) => Ok(Condition::Contains(s.to_string())),
            None => Err(Error::invalid_filter(format!(
                "contains operand for {field} must be a string"
            ))),
        },
        "in" | "nin" => {
            let JsonValue::Array(items) = operand else {
                return Err(Error::invalid_filter(format!(
                    "{op} operand for {field} must be a list"
                )));
            };
            let values = items
                .iter()
                .map(|item| operand_value(field, item))
                .collect::<Result<Vec<_>>>()?;
            if op == "in" {
                Ok(Condition::In(values))
            } else {
                Ok(Condition::Nin(values))
            }
        }
        other => Err(Error::invalid_filter(format!(
            "unknown operator {other} on field {field}"
        ))),
    }
}

/// Convert a JSON operand into a metadata value.
fn operand_value(field: &str, operand: &JsonValue) -> Result<Value> {
    serde_json::from_value(operand.clone()).map_err(|_| {
        Error::invalid_filter(format!("unsupported operand for field {field}"))
    })
}

/// Range operands must be numbers or ISO date strings.
fn range_operand(field: &str, op: &str, operand: &JsonValue) -> Result<Value> {
    let value = operand_value(field, operand)?;
    match &value {
        Value::Number(_) => Ok(value),
        Value::String(_) if value.as_date().is_some() => Ok(value),
        _ => Err(Error::invalid_filter(format!(
            "{op} operand for {field} must be a number or ISO date"
        ))),
    }
}
