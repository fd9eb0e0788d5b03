//! Boolean condition trees over predicate placeholders
//!
//! The rule parser tokenizes a condition into the literal `predicate`, `(`,
//! index, `)` pattern interleaved with `and`/`or`/`[`/`]`. The builder here
//! turns that sequence into a tree where `and` binds strictly tighter than
//! `or` and `[...]` groups are opaque precedence boundaries.

use hearth_matcher::Token;
use std::fmt;
use thiserror::Error;

/// Condition AST node
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionExpr {
    /// Reference to a predicate by its position in the rule
    Predicate(usize),

    /// Both sides must hold
    And(Box<ConditionExpr>, Box<ConditionExpr>),

    /// Either side must hold
    Or(Box<ConditionExpr>, Box<ConditionExpr>),
}

impl ConditionExpr {
    /// Evaluate against already-resolved predicate values
    pub fn evaluate(&self, values: &[bool]) -> bool {
        match self {
            ConditionExpr::Predicate(index) => values[*index],
            ConditionExpr::And(left, right) => left.evaluate(values) && right.evaluate(values),
            ConditionExpr::Or(left, right) => left.evaluate(values) || right.evaluate(values),
        }
    }
}

impl fmt::Display for ConditionExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionExpr::Predicate(index) => write!(f, "{}", index),
            ConditionExpr::And(left, right) => write!(f, "and({}, {})", left, right),
            ConditionExpr::Or(left, right) => write!(f, "or({}, {})", left, right),
        }
    }
}

/// A condition token sequence that does not follow the expected shape
///
/// The tokens come from user rule text, so this is a recoverable grammar
/// error reported on the parse context.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Invalid condition: {message}")]
pub struct ConditionBuildError {
    pub message: String,
}

impl ConditionBuildError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Build a condition tree from a token sequence
///
/// Every `predicate(i)` reference must satisfy `i < predicate_count`.
pub fn build_condition(
    tokens: &[Token],
    predicate_count: usize,
) -> Result<ConditionExpr, ConditionBuildError> {
    let mut builder = ConditionBuilder {
        tokens,
        pos: 0,
        predicate_count,
    };
    let expr = builder.or_expr()?;
    if builder.pos != tokens.len() {
        return Err(ConditionBuildError::new(format!(
            "unexpected token \"{}\"",
            tokens[builder.pos]
        )));
    }
    Ok(expr)
}

struct ConditionBuilder<'t> {
    tokens: &'t [Token],
    pos: usize,
    predicate_count: usize,
}

impl ConditionBuilder<'_> {
    fn accept(&mut self, symbol: &str) -> bool {
        if matches!(self.tokens.get(self.pos), Some(t) if t.is_symbol(symbol)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, symbol: &str) -> Result<(), ConditionBuildError> {
        if self.accept(symbol) {
            Ok(())
        } else {
            Err(ConditionBuildError::new(format!(
                "expected \"{}\"",
                symbol
            )))
        }
    }

    // or := and ('or' and)*
    fn or_expr(&mut self) -> Result<ConditionExpr, ConditionBuildError> {
        let mut expr = self.and_expr()?;
        while self.accept("or") {
            let right = self.and_expr()?;
            expr = ConditionExpr::Or(Box::new(expr), Box::new(right));
        }
        Ok(expr)
    }

    // and := atom ('and' atom)*
    fn and_expr(&mut self) -> Result<ConditionExpr, ConditionBuildError> {
        let mut expr = self.atom()?;
        while self.accept("and") {
            let right = self.atom()?;
            expr = ConditionExpr::And(Box::new(expr), Box::new(right));
        }
        Ok(expr)
    }

    // atom := 'predicate' '(' index ')' | '[' or ']'
    fn atom(&mut self) -> Result<ConditionExpr, ConditionBuildError> {
        if self.accept("[") {
            let expr = self.or_expr()?;
            self.expect("]")?;
            return Ok(expr);
        }

        self.expect("predicate")?;
        self.expect("(")?;
        let index = match self.tokens.get(self.pos).and_then(Token::as_number) {
            Some(n) if n >= 0.0 && n.fract() == 0.0 => n as usize,
            _ => return Err(ConditionBuildError::new("expected a predicate index")),
        };
        self.pos += 1;
        self.expect(")")?;

        if index >= self.predicate_count {
            return Err(ConditionBuildError::new(format!(
                "predicate index {} out of range",
                index
            )));
        }
        Ok(ConditionExpr::Predicate(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn predicate_tokens(index: usize) -> Vec<Token> {
        vec![
            Token::text("predicate"),
            Token::text("("),
            Token::number(index as f64),
            Token::text(")"),
        ]
    }

    fn sequence(parts: &[&str]) -> Vec<Token> {
        let mut tokens = Vec::new();
        for part in parts {
            match part.parse::<usize>() {
                Ok(index) => tokens.extend(predicate_tokens(index)),
                Err(_) => tokens.push(Token::text(*part)),
            }
        }
        tokens
    }

    #[test]
    fn test_single_predicate() {
        let expr = build_condition(&predicate_tokens(0), 1).unwrap();
        assert_eq!(expr, ConditionExpr::Predicate(0));
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        let tokens = sequence(&["0", "and", "1", "or", "2"]);
        let expr = build_condition(&tokens, 3).unwrap();
        assert_eq!(expr.to_string(), "or(and(0, 1), 2)");
    }

    #[test]
    fn test_brackets_override_precedence() {
        let tokens = sequence(&["0", "and", "[", "1", "or", "2", "]"]);
        let expr = build_condition(&tokens, 3).unwrap();
        assert_eq!(expr.to_string(), "and(0, or(1, 2))");
    }

    #[test]
    fn test_left_associative_chains() {
        let tokens = sequence(&["0", "or", "1", "or", "2"]);
        let expr = build_condition(&tokens, 3).unwrap();
        assert_eq!(expr.to_string(), "or(or(0, 1), 2)");
    }

    #[test]
    fn test_evaluation_semantics() {
        let tokens = sequence(&["0", "and", "1", "or", "2"]);
        let expr = build_condition(&tokens, 3).unwrap();

        assert!(expr.evaluate(&[true, true, false]));
        assert!(expr.evaluate(&[false, false, true]));
        assert!(!expr.evaluate(&[true, false, false]));
    }

    #[test]
    fn test_out_of_range_index_is_rejected() {
        let tokens = predicate_tokens(1);
        assert!(build_condition(&tokens, 1).is_err());
    }

    #[test]
    fn test_unbalanced_bracket_is_rejected() {
        let tokens = sequence(&["[", "0", "or", "1"]);
        assert!(build_condition(&tokens, 2).is_err());
    }

    #[test]
    fn test_trailing_tokens_are_rejected() {
        let mut tokens = predicate_tokens(0);
        tokens.push(Token::text("and"));
        assert!(build_condition(&tokens, 1).is_err());
    }
}
