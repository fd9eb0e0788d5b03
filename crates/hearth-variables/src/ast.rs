//! Typed expression trees built from flat token sequences
//!
//! The builder consumes exactly the token shape the matcher produces:
//! numbers, quoted string fragments, `$name` references, function names with
//! parenthesized argument groups, the four arithmetic operators, and literal
//! parentheses. Token sequences that passed the matcher always build; a
//! malformed sequence is a bug in the caller and surfaces as
//! [`EvalError::MalformedTokens`].

use hearth_matcher::Token;
use std::fmt;

use crate::error::{EvalError, EvalResult};

/// Binary arithmetic operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "+" => Some(BinaryOp::Add),
            "-" => Some(BinaryOp::Sub),
            "*" => Some(BinaryOp::Mul),
            "/" => Some(BinaryOp::Div),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::Div => "div",
        }
    }
}

/// Expression AST node
///
/// Immutable after construction; owned by the variable or rule it was built
/// for.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Numeric literal
    Number(f64),

    /// String literal fragment
    Text(String),

    /// `$name` variable reference
    Variable(String),

    /// Built-in function call
    Function { name: String, args: Vec<Expr> },

    /// Binary arithmetic
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },

    /// String juxtaposition of adjacent values
    Concat { left: Box<Expr>, right: Box<Expr> },
}

impl Expr {
    /// Names of all variables referenced anywhere in this tree
    pub fn variable_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.collect_variable_names(&mut names);
        names
    }

    fn collect_variable_names(&self, names: &mut Vec<String>) {
        match self {
            Expr::Number(_) | Expr::Text(_) => {}
            Expr::Variable(name) => {
                if !names.iter().any(|n| n == name) {
                    names.push(name.clone());
                }
            }
            Expr::Function { args, .. } => {
                for arg in args {
                    arg.collect_variable_names(names);
                }
            }
            Expr::Binary { left, right, .. } | Expr::Concat { left, right } => {
                left.collect_variable_names(names);
                right.collect_variable_names(names);
            }
        }
    }

    /// Canonical rendering for diagnostics and tests, e.g.
    /// `add(num(1), mul(num(2), num(3)))`
    pub fn describe(&self) -> String {
        format!("{}", self)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Number(n) => write!(f, "num({})", n),
            Expr::Text(s) => write!(f, "str('{}')", s),
            Expr::Variable(name) => write!(f, "var({})", name),
            Expr::Function { name, args } => {
                write!(f, "{}(", name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            Expr::Binary { op, left, right } => {
                write!(f, "{}({}, {})", op.name(), left, right)
            }
            Expr::Concat { left, right } => write!(f, "concat({}, {})", left, right),
        }
    }
}

/// Build one expression tree from a flat token sequence
///
/// Precedence: `*`/`/` over `+`/`-`, left-to-right within a level,
/// parenthesized groups first. Adjacent value tokens with no operator between
/// them denote [`Expr::Concat`], binding loosest.
pub fn build_expression(tokens: &[Token]) -> EvalResult<Expr> {
    let mut builder = TreeBuilder { tokens, pos: 0 };
    let expr = builder.concat()?;
    if builder.pos != tokens.len() {
        return Err(builder.malformed("trailing tokens"));
    }
    Ok(expr)
}

struct TreeBuilder<'t> {
    tokens: &'t [Token],
    pos: usize,
}

impl TreeBuilder<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos)?.clone();
        self.pos += 1;
        Some(token)
    }

    fn expect_symbol(&mut self, symbol: &str) -> EvalResult<()> {
        if matches!(self.next(), Some(token) if token.is_symbol(symbol)) {
            Ok(())
        } else {
            Err(self.malformed(format!("expected \"{}\"", symbol)))
        }
    }

    fn malformed(&self, detail: impl Into<String>) -> EvalError {
        EvalError::MalformedTokens(format!("{} at token {}", detail.into(), self.pos))
    }

    // True when the upcoming token can start a primary expression.
    fn at_primary(&self) -> bool {
        match self.peek() {
            Some(Token::Number(_)) => true,
            Some(token @ Token::Text(text)) => {
                token.is_quoted()
                    || token.is_variable()
                    || text == "("
                    || (is_identifier(text)
                        && matches!(self.tokens.get(self.pos + 1), Some(t) if t.is_symbol("(")))
            }
            None => false,
        }
    }

    // concat := additive additive*
    fn concat(&mut self) -> EvalResult<Expr> {
        let mut expr = self.additive()?;
        while self.at_primary() {
            let right = self.additive()?;
            expr = Expr::Concat {
                left: Box::new(expr),
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    // additive := multiplicative (('+' | '-') multiplicative)*
    fn additive(&mut self) -> EvalResult<Expr> {
        let mut expr = self.multiplicative()?;
        while let Some(op) = self.peek_operator(&[BinaryOp::Add, BinaryOp::Sub]) {
            self.pos += 1;
            let right = self.multiplicative()?;
            expr = Expr::Binary {
                op,
                left: Box::new(expr),
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    // multiplicative := primary (('*' | '/') primary)*
    fn multiplicative(&mut self) -> EvalResult<Expr> {
        let mut expr = self.primary()?;
        while let Some(op) = self.peek_operator(&[BinaryOp::Mul, BinaryOp::Div]) {
            self.pos += 1;
            let right = self.primary()?;
            expr = Expr::Binary {
                op,
                left: Box::new(expr),
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn peek_operator(&self, accepted: &[BinaryOp]) -> Option<BinaryOp> {
        let text = self.peek()?.as_text()?;
        let op = BinaryOp::from_symbol(text)?;
        accepted.contains(&op).then_some(op)
    }

    fn primary(&mut self) -> EvalResult<Expr> {
        let Some(token) = self.next() else {
            return Err(self.malformed("unexpected end of tokens"));
        };

        match token {
            Token::Number(n) => Ok(Expr::Number(n)),
            token if token.is_quoted() => {
                let text = token.as_text().unwrap();
                Ok(Expr::Text(text[1..text.len() - 1].to_string()))
            }
            token if token.is_variable() => {
                let text = token.as_text().unwrap();
                Ok(Expr::Variable(text[1..].to_string()))
            }
            token if token.is_symbol("(") => {
                let expr = self.concat()?;
                self.expect_symbol(")")?;
                Ok(expr)
            }
            Token::Text(name) if is_identifier(&name) => self.function_args(name),
            other => {
                let detail = format!("unexpected token \"{}\"", other);
                Err(self.malformed(detail))
            }
        }
    }

    fn function_args(&mut self, name: String) -> EvalResult<Expr> {
        self.expect_symbol("(")?;

        let mut args = Vec::new();
        if matches!(self.peek(), Some(t) if t.is_symbol(")")) {
            self.pos += 1;
            return Ok(Expr::Function { name, args });
        }

        loop {
            args.push(self.concat()?);
            let separator = self.next();
            match separator {
                Some(t) if t.is_symbol(",") => continue,
                Some(t) if t.is_symbol(")") => break,
                _ => return Err(self.malformed("expected \",\" or \")\" in argument list")),
            }
        }

        Ok(Expr::Function { name, args })
    }
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_matcher::{
        match_numeric_expression, match_string_with_vars, FunctionSignature, ParseContext,
    };

    fn context() -> ParseContext {
        ParseContext::new()
            .with_variables(["a", "bar"])
            .with_functions([("min", FunctionSignature::at_least(2))])
    }

    fn tokens_of(input: &str) -> Vec<Token> {
        let mut ctx = context();
        match_numeric_expression(input, &mut ctx).unwrap().value
    }

    #[test]
    fn test_precedence_mul_over_add() {
        let expr = build_expression(&tokens_of("1 + 2 * 3")).unwrap();
        assert_eq!(expr.describe(), "add(num(1), mul(num(2), num(3)))");
    }

    #[test]
    fn test_parens_override_precedence() {
        let expr = build_expression(&tokens_of("(1 + 2) * 3")).unwrap();
        assert_eq!(expr.describe(), "mul(add(num(1), num(2)), num(3))");
    }

    #[test]
    fn test_left_associativity() {
        let expr = build_expression(&tokens_of("10 - 2 - 3")).unwrap();
        assert_eq!(expr.describe(), "sub(sub(num(10), num(2)), num(3))");

        let expr = build_expression(&tokens_of("12 / 2 / 3")).unwrap();
        assert_eq!(expr.describe(), "div(div(num(12), num(2)), num(3))");
    }

    #[test]
    fn test_variables_and_functions() {
        let expr = build_expression(&tokens_of("1*$a+10*min($bar, 2)")).unwrap();
        assert_eq!(
            expr.describe(),
            "add(mul(num(1), var(a)), mul(num(10), min(var(bar), num(2))))"
        );
    }

    #[test]
    fn test_interpolated_string_builds_concat() {
        let mut ctx = context();
        let tokens = match_string_with_vars(r#""foo $bar""#, &mut ctx).unwrap().value;
        let expr = build_expression(&tokens).unwrap();
        assert_eq!(
            expr.describe(),
            "concat(concat(str('foo '), var(bar)), str(''))"
        );
    }

    #[test]
    fn test_embedded_expression_group() {
        let mut ctx = context();
        let tokens = match_string_with_vars(r#""foo {$bar + 1}""#, &mut ctx)
            .unwrap()
            .value;
        let expr = build_expression(&tokens).unwrap();
        assert_eq!(
            expr.describe(),
            "concat(concat(str('foo '), add(var(bar), num(1))), str(''))"
        );
    }

    #[test]
    fn test_variable_names_deduplicated_in_order() {
        let expr = build_expression(&tokens_of("$a + $bar * $a")).unwrap();
        assert_eq!(expr.variable_names(), vec!["a", "bar"]);
    }

    #[test]
    fn test_malformed_tokens_are_an_error() {
        let tokens = vec![Token::text("+"), Token::number(1.0)];
        assert!(matches!(
            build_expression(&tokens),
            Err(EvalError::MalformedTokens(_))
        ));

        let tokens = vec![Token::number(1.0), Token::text("+")];
        assert!(matches!(
            build_expression(&tokens),
            Err(EvalError::MalformedTokens(_))
        ));
    }
}
