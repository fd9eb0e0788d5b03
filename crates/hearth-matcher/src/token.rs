//! Token type exchanged between the matcher and the AST builders

use serde::{Deserialize, Serialize};
use std::fmt;

/// An atomic string or numeric literal produced by tokenization
///
/// Quoted string fragments keep their surrounding double quotes in the token
/// text (`"foo "`) so the builders can tell them apart from identifiers,
/// operators, and variable references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Token {
    /// A numeric literal
    Number(f64),

    /// Everything else: operators, parentheses, commas, `$name` variable
    /// references, function names, and quoted string fragments
    Text(String),
}

impl Token {
    /// Create a text token
    pub fn text(s: impl Into<String>) -> Self {
        Token::Text(s.into())
    }

    /// Create a numeric token
    pub fn number(n: f64) -> Self {
        Token::Number(n)
    }

    /// Get the text content, if this is a text token
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Token::Text(s) => Some(s.as_str()),
            Token::Number(_) => None,
        }
    }

    /// Get the numeric value, if this is a number token
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Token::Number(n) => Some(*n),
            Token::Text(_) => None,
        }
    }

    /// Check whether this token is exactly the given symbol
    pub fn is_symbol(&self, symbol: &str) -> bool {
        matches!(self, Token::Text(s) if s == symbol)
    }

    /// Check whether this is a quoted string fragment (`"..."`)
    pub fn is_quoted(&self) -> bool {
        matches!(self, Token::Text(s) if s.len() >= 2 && s.starts_with('"') && s.ends_with('"'))
    }

    /// Check whether this is a `$name` variable reference
    pub fn is_variable(&self) -> bool {
        matches!(self, Token::Text(s) if s.starts_with('$') && s.len() > 1)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(n) => write!(f, "{}", n),
            Token::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<f64> for Token {
    fn from(n: f64) -> Self {
        Token::Number(n)
    }
}

impl From<&str> for Token {
    fn from(s: &str) -> Self {
        Token::Text(s.to_string())
    }
}

impl From<String> for Token {
    fn from(s: String) -> Self {
        Token::Text(s)
    }
}
