//! Backtracking text matcher and tokenizer
//!
//! This crate is the leaf of the rule/expression pipeline: it matches
//! fragments of free text against literal alternatives, arithmetic
//! expressions, interpolated strings, and time durations, producing flat
//! token sequences for the AST builders.
//!
//! Every match operation is total over its input: a grammar alternative that
//! does not apply yields `None`, never an error. Errors worth reporting to
//! the user (unknown variable, wrong function arity) accumulate as strings on
//! the [`ParseContext`] so the caller can surface them with position context.
//!
//! # Key Types
//!
//! - [`Token`] - Atomic string or numeric literal, the exchange format with
//!   the AST builders
//! - [`ParseContext`] - Per-parse state: known variables, known functions,
//!   accumulated errors
//! - [`MatchResult`] - Consumed prefix, left-trimmed remainder, and payload

mod context;
mod matcher;
mod time;
mod token;

pub use context::{FunctionSignature, ParseContext};
pub use matcher::{
    match_literal, match_number, match_numeric_expression, match_string, match_string_with_vars,
    match_variable, MatchResult,
};
pub use time::{match_time_duration, DurationSpec, TimeUnit};
pub use token::Token;
