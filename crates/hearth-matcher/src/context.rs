//! Per-parse state shared by one top-level parse call

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Accepted argument-count range of a built-in function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionSignature {
    /// Minimum number of arguments
    pub min_args: usize,

    /// Maximum number of arguments (`usize::MAX` for unbounded)
    pub max_args: usize,
}

impl FunctionSignature {
    /// A function taking exactly `n` arguments
    pub const fn exact(n: usize) -> Self {
        Self {
            min_args: n,
            max_args: n,
        }
    }

    /// A function taking between `min` and `max` arguments
    pub const fn range(min: usize, max: usize) -> Self {
        Self {
            min_args: min,
            max_args: max,
        }
    }

    /// A variadic function taking at least `n` arguments
    pub const fn at_least(n: usize) -> Self {
        Self {
            min_args: n,
            max_args: usize::MAX,
        }
    }

    /// Check whether a call with `count` arguments is valid
    pub fn accepts(&self, count: usize) -> bool {
        count >= self.min_args && count <= self.max_args
    }

    /// Human-readable description of the accepted range, for error messages
    pub fn describe(&self) -> String {
        match (self.min_args, self.max_args) {
            (min, max) if min == max => format!("{}", min),
            (min, usize::MAX) => format!("at least {}", min),
            (min, max) => format!("{} to {}", min, max),
        }
    }
}

/// Mutable per-parse state
///
/// Holds the names the parse is allowed to reference and collects the
/// human-readable errors encountered along the way. A context is owned by one
/// top-level parse call and never shared across concurrent parses.
#[derive(Debug, Clone, Default)]
pub struct ParseContext {
    /// Known variable names (without the `$` sigil)
    pub variables: HashSet<String>,

    /// Known function names with their accepted argument counts
    pub functions: HashMap<String, FunctionSignature>,

    /// Accumulated parse errors, in the order they were encountered
    pub errors: Vec<String>,
}

impl ParseContext {
    /// Create an empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context with the given variable names
    pub fn with_variables<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.variables.extend(names.into_iter().map(Into::into));
        self
    }

    /// Create a context with the given function signatures
    pub fn with_functions<I, S>(mut self, functions: I) -> Self
    where
        I: IntoIterator<Item = (S, FunctionSignature)>,
        S: Into<String>,
    {
        self.functions
            .extend(functions.into_iter().map(|(name, sig)| (name.into(), sig)));
        self
    }

    /// Check whether a variable name is known
    pub fn has_variable(&self, name: &str) -> bool {
        self.variables.contains(name)
    }

    /// Look up a function signature
    pub fn function(&self, name: &str) -> Option<FunctionSignature> {
        self.functions.get(name).copied()
    }

    /// Record a parse error
    pub fn add_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    /// Check whether any errors were recorded
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// A fresh context with the same known names but no errors
    ///
    /// Used for speculative matches (optional qualifiers) whose errors must
    /// not leak into the owning parse when the match is abandoned.
    pub fn scratch(&self) -> Self {
        Self {
            variables: self.variables.clone(),
            functions: self.functions.clone(),
            errors: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_accepts() {
        assert!(FunctionSignature::exact(2).accepts(2));
        assert!(!FunctionSignature::exact(2).accepts(1));
        assert!(FunctionSignature::at_least(2).accepts(17));
        assert!(!FunctionSignature::at_least(2).accepts(1));
        assert!(FunctionSignature::range(1, 2).accepts(1));
        assert!(!FunctionSignature::range(1, 2).accepts(3));
    }

    #[test]
    fn test_signature_describe() {
        assert_eq!(FunctionSignature::exact(1).describe(), "1");
        assert_eq!(FunctionSignature::at_least(2).describe(), "at least 2");
        assert_eq!(FunctionSignature::range(1, 2).describe(), "1 to 2");
    }

    #[test]
    fn test_context_errors_accumulate_in_order() {
        let mut ctx = ParseContext::new();
        ctx.add_error("first");
        ctx.add_error("second");
        assert!(ctx.has_errors());
        assert_eq!(ctx.errors, vec!["first", "second"]);
    }

    #[test]
    fn test_scratch_drops_errors_keeps_names() {
        let mut ctx = ParseContext::new()
            .with_variables(["a"])
            .with_functions([("min", FunctionSignature::at_least(2))]);
        ctx.add_error("boom");

        let scratch = ctx.scratch();
        assert!(scratch.has_variable("a"));
        assert!(scratch.function("min").is_some());
        assert!(!scratch.has_errors());
    }
}
