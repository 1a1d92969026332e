//! Single-predicate filter evaluation.
//!
//! A filter is `(field, operator, value)` evaluated against a document's
//! payload. Queries and subscriptions share this evaluator. Dispatch runs
//! on the payload value's JSON type against the typed filter value;
//! pairings outside the table below are query errors that abort the scan,
//! while a missing field simply excludes the document.
//!
//! | payload   | filter value | operators          |
//! |-----------|--------------|--------------------|
//! | string    | timestamp    | `<` `>` `==`       |
//! | string    | string       | `==` `!=`          |
//! | number    | any numeric  | all six, as f64    |
//! | bool      | bool         | `==` `!=`          |

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::document::Document;
use crate::error::{DbError, DbResult};

/// Comparison operator of a filter predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl FromStr for Operator {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "==" => Ok(Self::Eq),
            "!=" => Ok(Self::Ne),
            "<" => Ok(Self::Lt),
            "<=" => Ok(Self::Le),
            ">" => Ok(Self::Gt),
            ">=" => Ok(Self::Ge),
            other => Err(DbError::query(format!(
                "filter operator '{other}' is not supported; accepted operators: ==, !=, <, <=, >, >="
            ))),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        };
        write!(f, "{s}")
    }
}

/// Typed comparison value of a filter predicate
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Str(String),
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float(f64),
    Time(DateTime<Utc>),
}

impl From<&str> for FilterValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<bool> for FilterValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for FilterValue {
    fn from(v: i32) -> Self {
        Self::Int(v.into())
    }
}

impl From<i64> for FilterValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u64> for FilterValue {
    fn from(v: u64) -> Self {
        Self::Uint(v)
    }
}

impl From<f64> for FilterValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<DateTime<Utc>> for FilterValue {
    fn from(v: DateTime<Utc>) -> Self {
        Self::Time(v)
    }
}

impl FilterValue {
    /// Numeric filter values widened to f64; None for the rest
    fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Uint(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }
}

/// A single-field predicate
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    /// Payload field to compare
    pub field: String,
    /// Operator as supplied by the caller; validated at evaluation time
    pub operator: String,
    /// Value to compare against
    pub value: FilterValue,
}

impl Filter {
    /// Create a filter; the operator is validated when first evaluated
    pub fn new(field: impl Into<String>, operator: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self {
            field: field.into(),
            operator: operator.into(),
            value: value.into(),
        }
    }

    /// Decide whether `doc` belongs to this filter's result set
    pub fn included(&self, doc: &Document) -> DbResult<bool> {
        let op: Operator = self.operator.parse()?;

        let payload: Value = serde_json::from_str(doc.data.get())?;
        let Some(field_value) = payload.get(&self.field) else {
            return Ok(false);
        };

        match field_value {
            Value::String(s) => self.compare_string(op, s),
            Value::Number(n) => self.compare_number(op, n.as_f64().unwrap_or(f64::NAN)),
            Value::Bool(b) => self.compare_bool(op, *b),
            other => Err(DbError::query(format!(
                "field '{}' has unsupported type {} for filtering",
                self.field,
                json_type_name(other)
            ))),
        }
    }

    fn compare_string(&self, op: Operator, doc_value: &str) -> DbResult<bool> {
        match &self.value {
            FilterValue::Time(filter_time) => {
                let doc_time = DateTime::parse_from_rfc3339(doc_value)
                    .map(|t| t.with_timezone(&Utc))
                    .map_err(|e| {
                        DbError::query(format!(
                            "filter value is a timestamp but field '{}' is not RFC 3339: {e}",
                            self.field
                        ))
                    })?;
                match op {
                    Operator::Lt => Ok(doc_time < *filter_time),
                    Operator::Gt => Ok(doc_time > *filter_time),
                    Operator::Eq => Ok(doc_time == *filter_time),
                    other => Err(DbError::query(format!(
                        "operator '{other}' is not supported for timestamps"
                    ))),
                }
            }
            FilterValue::Str(filter_str) => match op {
                Operator::Eq => Ok(doc_value == filter_str),
                Operator::Ne => Ok(doc_value != filter_str),
                other => Err(DbError::query(format!(
                    "operator '{other}' is not supported for strings"
                ))),
            },
            _ => Err(DbError::query(format!(
                "field '{}' is a string but the filter value is not",
                self.field
            ))),
        }
    }

    fn compare_number(&self, op: Operator, doc_value: f64) -> DbResult<bool> {
        let Some(filter_value) = self.value.as_f64() else {
            return Err(DbError::query(format!(
                "field '{}' is a number but the filter value is not",
                self.field
            )));
        };
        Ok(match op {
            Operator::Eq => doc_value == filter_value,
            Operator::Ne => doc_value != filter_value,
            Operator::Lt => doc_value < filter_value,
            Operator::Le => doc_value <= filter_value,
            Operator::Gt => doc_value > filter_value,
            Operator::Ge => doc_value >= filter_value,
        })
    }

    fn compare_bool(&self, op: Operator, doc_value: bool) -> DbResult<bool> {
        let FilterValue::Bool(filter_value) = &self.value else {
            return Err(DbError::query(format!(
                "field '{}' is a bool but the filter value is not",
                self.field
            )));
        };
        match op {
            Operator::Eq => Ok(doc_value == *filter_value),
            Operator::Ne => Ok(doc_value != *filter_value),
            other => Err(DbError::query(format!(
                "operator '{other}' is not supported for bools"
            ))),
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
