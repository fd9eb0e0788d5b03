//! Rule and handler errors

use thiserror::Error;

/// Errors from rule operations
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("Rule not found: {0}")]
    NotFound(String),

    #[error("A rule with id \"{0}\" already exists")]
    AlreadyExists(String),

    #[error("Could not parse rule \"{id}\": {}", errors.join("; "))]
    Parse { id: String, errors: Vec<String> },

    #[error("Evaluation error: {0}")]
    Eval(#[from] hearth_variables::EvalError),
}

/// Result type for rule operations
pub type RuleResult<T> = Result<T, RuleError>;

/// Error raised by a predicate or action handler implementation
///
/// Handler failures are isolated per-handler: they are logged and never abort
/// the evaluation of sibling predicates/actions or other rules.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct HandlerError {
    pub message: String,
}

impl HandlerError {
    /// Create a handler error with a message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
