//! Evaluation and expression-parse errors

use thiserror::Error;

/// Errors from expression parsing and evaluation
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EvalError {
    #[error("Could not parse expression: {}", errors.join("; "))]
    Parse { errors: Vec<String> },

    #[error("Dependency cycle detected for variable {0}")]
    DependencyCycle(String),

    #[error("Variable {0} is not defined")]
    UndefinedVariable(String),

    #[error("Function {0} is not defined")]
    UndefinedFunction(String),

    #[error("Cannot {op} a value in {left} and a value in {right}")]
    UnitMismatch {
        op: &'static str,
        left: String,
        right: String,
    },

    #[error("Expected a number, got \"{0}\"")]
    NotANumber(String),

    #[error("Malformed token sequence: {0}")]
    MalformedTokens(String),
}

impl EvalError {
    /// Wrap accumulated parse-context errors, with a fallback message when
    /// the matcher failed without recording a specific one
    pub fn parse(errors: Vec<String>, fallback: impl Into<String>) -> Self {
        if errors.is_empty() {
            EvalError::Parse {
                errors: vec![fallback.into()],
            }
        } else {
            EvalError::Parse { errors }
        }
    }
}

/// Result type for evaluation operations
pub type EvalResult<T> = Result<T, EvalError>;
