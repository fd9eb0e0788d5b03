//! Computed values: numbers with measurement units, or text

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{EvalError, EvalResult};

/// A computed value
///
/// Numbers carry a unit string (possibly empty); text values have none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Text(String),
    Number { value: f64, unit: String },
}

impl Value {
    /// A unitless number
    pub fn number(value: f64) -> Self {
        Value::Number {
            value,
            unit: String::new(),
        }
    }

    /// A number with a unit
    pub fn with_unit(value: f64, unit: impl Into<String>) -> Self {
        Value::Number {
            value,
            unit: unit.into(),
        }
    }

    /// A text value
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    /// The numeric value, or an error for text
    pub fn as_number(&self) -> EvalResult<f64> {
        match self {
            Value::Number { value, .. } => Ok(*value),
            Value::Text(s) => Err(EvalError::NotANumber(s.clone())),
        }
    }

    /// The unit string (empty for text and unitless numbers)
    pub fn unit(&self) -> &str {
        match self {
            Value::Number { unit, .. } => unit,
            Value::Text(_) => "",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number { value, .. } => write!(f, "{}", value),
            Value::Text(s) => write!(f, "{}", s),
        }
    }
}
