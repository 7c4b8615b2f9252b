//! Filters for `find` and backend lookups.
//!
//! Only equality is evaluated. Other comparison operators can be expressed so
//! that callers get a precise `UnsupportedQuery` error rather than a silent
//! mismatch.

use std::fmt;

use crate::backend::Row;
use crate::error::Error;
use crate::value::Value;

/// A single filter condition.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterExpr {
    /// Field equals value.
    Eq { field: String, value: Value },
    /// Field not equal to value.
    Ne { field: String, value: Value },
    /// Field less than value.
    Lt { field: String, value: Value },
    /// Field less than or equal to value.
    Le { field: String, value: Value },
    /// Field greater than value.
    Gt { field: String, value: Value },
    /// Field greater than or equal to value.
    Ge { field: String, value: Value },
    /// Field matches a LIKE pattern.
    Like { field: String, pattern: String },
}

impl FilterExpr {
    /// Field the condition applies to.
    pub fn field(&self) -> &str {
        match self {
            FilterExpr::Eq { field, .. }
            | FilterExpr::Ne { field, .. }
            | FilterExpr::Lt { field, .. }
            | FilterExpr::Le { field, .. }
            | FilterExpr::Gt { field, .. }
            | FilterExpr::Ge { field, .. }
            | FilterExpr::Like { field, .. } => field,
        }
    }

    /// Operator symbol, for error messages.
    pub fn operator(&self) -> &'static str {
        match self {
            FilterExpr::Eq { .. } => "=",
            FilterExpr::Ne { .. } => "!=",
            FilterExpr::Lt { .. } => "<",
            FilterExpr::Le { .. } => "<=",
            FilterExpr::Gt { .. } => ">",
            FilterExpr::Ge { .. } => ">=",
            FilterExpr::Like { .. } => "LIKE",
        }
    }

    /// The `(field, value)` pair of an equality condition.
    pub fn as_equality(&self) -> Result<(&str, &Value), Error> {
        match self {
            FilterExpr::Eq { field, value } => Ok((field, value)),
            other => Err(Error::UnsupportedQuery(format!(
                "`{}` {} is not an equality filter",
                other.field(),
                other.operator()
            ))),
        }
    }
}

impl fmt::Display for FilterExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterExpr::Eq { field, value }
            | FilterExpr::Ne { field, value }
            | FilterExpr::Lt { field, value }
            | FilterExpr::Le { field, value }
            | FilterExpr::Gt { field, value }
            | FilterExpr::Ge { field, value } => {
                write!(f, "{field} {} {value}", self.operator())
            }
            FilterExpr::Like { field, pattern } => write!(f, "{field} LIKE {pattern:?}"),
        }
    }
}

/// Conjunction of filter conditions. An empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<FilterExpr>,
}

impl Filter {
    /// Create an empty filter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an equality condition.
    pub fn eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(FilterExpr::Eq {
            field: field.into(),
            value: value.into(),
        })
    }

    /// Add an arbitrary condition.
    pub fn with(mut self, condition: FilterExpr) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Conditions in insertion order.
    pub fn conditions(&self) -> &[FilterExpr] {
        &self.conditions
    }

    /// Whether the filter has no conditions.
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// All conditions as equality pairs, or `UnsupportedQuery`.
    pub fn equalities(&self) -> Result<Vec<(&str, &Value)>, Error> {
        self.conditions.iter().map(FilterExpr::as_equality).collect()
    }
}

/// Evaluates filters against storage rows.
pub struct FilterEvaluator;

impl FilterEvaluator {
    /// Evaluate a filter against a row. A missing column compares as null.
    pub fn evaluate(filter: &Filter, row: &Row) -> Result<bool, Error> {
        for (field, expected) in filter.equalities()? {
            let actual = row.get(field).unwrap_or(&Value::Null);
            if !Self::values_equal(actual, expected) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Equality with numeric widening.
    pub fn values_equal(a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Int(x), Value::Float(y)) | (Value::Float(y), Value::Int(x)) => {
                (*x as f64) == *y
            }
            _ => a == b,
        }
    }
}
