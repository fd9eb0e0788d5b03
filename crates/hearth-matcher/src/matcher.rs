//! Match operations over immutable input strings
//!
//! Each operation consumes a prefix of the input and returns the exact
//! substring matched, the left-trimmed remainder, and a payload. `None`
//! signals that the grammar alternative does not apply; panics are reserved
//! for programmer misuse such as an empty pattern list.

use crate::context::ParseContext;
use crate::token::Token;

/// The outcome of one matcher attempt over an input string
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult<T> {
    /// The exact substring consumed
    pub matched: String,

    /// The unconsumed, left-trimmed remainder
    pub next_input: String,

    /// Matcher-specific payload
    pub value: T,
}

impl<T> MatchResult<T> {
    fn new(matched: impl Into<String>, next_input: &str, value: T) -> Self {
        Self {
            matched: matched.into(),
            next_input: next_input.trim_start().to_string(),
            value,
        }
    }
}

/// Match the longest literal alternative the input begins with
///
/// Matching is case-sensitive. Leading whitespace is insignificant and is
/// consumed as part of remaining-input normalization.
///
/// # Panics
///
/// Panics when `patterns` is empty — that is a malformed call site, not an
/// expected grammar alternative.
pub fn match_literal<'p>(input: &str, patterns: &[&'p str]) -> Option<MatchResult<&'p str>> {
    assert!(
        !patterns.is_empty(),
        "match_literal requires at least one pattern"
    );

    let trimmed = input.trim_start();
    let best = patterns
        .iter()
        .filter(|p| !p.is_empty() && trimmed.starts_with(**p))
        .max_by_key(|p| p.len())?;

    Some(MatchResult::new(*best, &trimmed[best.len()..], *best))
}

/// Match an integer or decimal literal, with an optional leading minus
pub fn match_number(input: &str) -> Option<MatchResult<f64>> {
    let trimmed = input.trim_start();
    let rest = scan_number(trimmed)?;
    let consumed = &trimmed[..trimmed.len() - rest.len()];
    let value: f64 = consumed.parse().ok()?;
    Some(MatchResult::new(consumed, rest, value))
}

/// Match a `$name` variable reference against the known variables
///
/// The payload is the variable name without its `$` sigil. An unknown name
/// records an error on the context and fails the match.
pub fn match_variable(input: &str, context: &mut ParseContext) -> Option<MatchResult<String>> {
    let trimmed = input.trim_start();
    let rest = trimmed.strip_prefix('$')?;

    let name_len = rest
        .find(|c: char| !is_variable_char(c))
        .unwrap_or(rest.len());
    if name_len == 0 {
        return None;
    }

    let name = &rest[..name_len];
    if !context.has_variable(name) {
        context.add_error(format!("Could not find variable \"${}\"", name));
        return None;
    }

    Some(MatchResult::new(
        &trimmed[..name_len + 1],
        &rest[name_len..],
        name.to_string(),
    ))
}

/// Match a complete arithmetic expression, yielding its flat token sequence
///
/// The grammar covers integer/decimal literals, `$name` variable references,
/// `name(arg, …)` function calls, binary `+ - * /` with conventional
/// precedence, and parenthesized grouping. The token sequence is the exact
/// left-to-right reading of the consumed text, including literal `(` / `)`
/// tokens where they appeared.
pub fn match_numeric_expression(
    input: &str,
    context: &mut ParseContext,
) -> Option<MatchResult<Vec<Token>>> {
    let trimmed = input.trim_start();
    let mut parser = ExpressionParser {
        context,
        tokens: Vec::new(),
    };

    let rest = parser.expression(trimmed)?;
    let matched = trimmed[..trimmed.len() - rest.len()].trim_end();
    Some(MatchResult::new(matched, rest, parser.tokens))
}

/// Match a plain double-quoted string literal with no interpolation
///
/// The payload is the unescaped content. Escapes: `\"` → quote, `\$` → `$`,
/// `\\` → backslash, `\n` → newline; any other backslash sequence is kept
/// verbatim.
pub fn match_string(input: &str) -> Option<MatchResult<String>> {
    let trimmed = input.trim_start();
    let body = trimmed.strip_prefix('"')?;

    let mut content = String::new();
    let mut chars = body.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some((_, escaped @ ('"' | '$' | '\\'))) => content.push(escaped),
                Some((_, 'n')) => content.push('\n'),
                Some((_, other)) => {
                    content.push('\\');
                    content.push(other);
                }
                // Unterminated escape at end of input
                None => return None,
            },
            '"' => {
                let consumed = &trimmed[..i + 2];
                return Some(MatchResult::new(consumed, &body[i + 1..], content));
            }
            _ => content.push(c),
        }
    }

    // Unterminated string
    None
}

/// Match a double-quoted literal interleaving text, `$name` references, and
/// `{…}` embedded sub-expressions
///
/// The token sequence alternates quoted-text tokens with interpolated
/// variable/expression tokens: an embedded `{expr}` appears as a
/// parenthesized token group, and the sequence always ends with a quoted-text
/// token (possibly `""`). Escape handling matches [`match_string`]; in
/// particular a *double* backslash before `n` yields a literal backslash
/// followed by a plain `n`, not a newline.
pub fn match_string_with_vars(
    input: &str,
    context: &mut ParseContext,
) -> Option<MatchResult<Vec<Token>>> {
    let trimmed = input.trim_start();
    let body = trimmed.strip_prefix('"')?;

    let mut tokens = Vec::new();
    let mut text = String::new();
    let mut rest = body;

    loop {
        let mut chars = rest.char_indices();
        let (i, c) = chars.next()?;
        match c {
            '\\' => match chars.next() {
                Some((j, escaped @ ('"' | '$' | '\\'))) => {
                    text.push(escaped);
                    rest = &rest[j + 1..];
                }
                Some((j, 'n')) => {
                    text.push('\n');
                    rest = &rest[j + 1..];
                }
                Some((j, other)) => {
                    text.push('\\');
                    text.push(other);
                    rest = &rest[j + other.len_utf8()..];
                }
                None => return None,
            },
            '"' => {
                tokens.push(Token::text(format!("\"{}\"", text)));
                let consumed_len = trimmed.len() - rest.len() + 1;
                return Some(MatchResult::new(
                    &trimmed[..consumed_len],
                    &rest[i + 1..],
                    tokens,
                ));
            }
            '$' => {
                let var = match_variable(rest, context)?;
                tokens.push(Token::text(format!("\"{}\"", text)));
                text.clear();
                tokens.push(Token::text(var.matched));
                // Interpolation must not eat the whitespace after the
                // reference: it belongs to the string text.
                rest = &rest[1 + var.value.len()..];
            }
            '{' => {
                let inner = &rest[1..];
                let expr = match_numeric_expression(inner, context)?;
                // next_input is a left-trimmed suffix of `inner`, so the
                // remainder starts at the matching byte offset from the end.
                let after_expr = &inner[inner.len() - expr.next_input.len()..];
                let after_close = after_expr.strip_prefix('}')?;

                tokens.push(Token::text(format!("\"{}\"", text)));
                text.clear();
                tokens.push(Token::text("("));
                tokens.extend(expr.value);
                tokens.push(Token::text(")"));
                rest = after_close;
            }
            _ => {
                text.push(c);
                rest = &rest[i + c.len_utf8()..];
            }
        }
    }
}

fn is_variable_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')
}

fn is_identifier_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

// Consume an integer/decimal literal, returning the remainder.
fn scan_number(input: &str) -> Option<&str> {
    let bytes = input.as_bytes();
    let mut pos = 0;

    if bytes.first() == Some(&b'-') {
        pos += 1;
    }
    let digits_start = pos;
    while pos < bytes.len() && bytes[pos].is_ascii_digit() {
        pos += 1;
    }
    if pos == digits_start {
        return None;
    }
    if pos < bytes.len() && bytes[pos] == b'.' {
        pos += 1;
        while pos < bytes.len() && bytes[pos].is_ascii_digit() {
            pos += 1;
        }
    }

    Some(&input[pos..])
}

/// Recursive-descent arithmetic parser accumulating the flat token sequence
///
/// Alternatives that fail after pushing tokens truncate back to their entry
/// checkpoint, so a failed branch never leaks partial tokens.
struct ExpressionParser<'c> {
    context: &'c mut ParseContext,
    tokens: Vec<Token>,
}

impl ExpressionParser<'_> {
    // expression := term (('+' | '-') term)*
    fn expression<'a>(&mut self, input: &'a str) -> Option<&'a str> {
        let mut rest = self.term(input)?;
        loop {
            let trimmed = rest.trim_start();
            let op = match trimmed.chars().next() {
                Some(op @ ('+' | '-')) => op,
                _ => break,
            };

            let checkpoint = self.tokens.len();
            self.tokens.push(Token::text(op.to_string()));
            match self.term(&trimmed[1..]) {
                Some(after) => rest = after,
                None => {
                    self.tokens.truncate(checkpoint);
                    break;
                }
            }
        }
        Some(rest)
    }

    // term := factor (('*' | '/') factor)*
    fn term<'a>(&mut self, input: &'a str) -> Option<&'a str> {
        let mut rest = self.factor(input)?;
        loop {
            let trimmed = rest.trim_start();
            let op = match trimmed.chars().next() {
                Some(op @ ('*' | '/')) => op,
                _ => break,
            };

            let checkpoint = self.tokens.len();
            self.tokens.push(Token::text(op.to_string()));
            match self.factor(&trimmed[1..]) {
                Some(after) => rest = after,
                None => {
                    self.tokens.truncate(checkpoint);
                    break;
                }
            }
        }
        Some(rest)
    }

    // factor := '(' expression ')' | number | '$'name | name '(' args ')'
    fn factor<'a>(&mut self, input: &'a str) -> Option<&'a str> {
        let trimmed = input.trim_start();

        if let Some(body) = trimmed.strip_prefix('(') {
            let checkpoint = self.tokens.len();
            self.tokens.push(Token::text("("));
            if let Some(rest) = self.expression(body) {
                if let Some(after) = rest.trim_start().strip_prefix(')') {
                    self.tokens.push(Token::text(")"));
                    return Some(after);
                }
            }
            self.tokens.truncate(checkpoint);
            return None;
        }

        if let Some(rest) = scan_number(trimmed) {
            let literal = &trimmed[..trimmed.len() - rest.len()];
            self.tokens.push(Token::number(literal.parse().ok()?));
            return Some(rest);
        }

        if trimmed.starts_with('$') {
            let var = match_variable(trimmed, self.context)?;
            self.tokens.push(Token::text(var.matched.clone()));
            return Some(&trimmed[var.matched.len()..]);
        }

        self.function_call(trimmed)
    }

    // name '(' expression (',' expression)* ')'
    fn function_call<'a>(&mut self, input: &'a str) -> Option<&'a str> {
        if !input.starts_with(is_identifier_start) {
            return None;
        }
        let name_len = input
            .find(|c: char| !is_identifier_char(c))
            .unwrap_or(input.len());
        let name = &input[..name_len];
        let after_name = input[name_len..].trim_start();

        let Some(body) = after_name.strip_prefix('(') else {
            return None;
        };
        let Some(signature) = self.context.function(name) else {
            self.context
                .add_error(format!("Could not find function \"{}\"", name));
            return None;
        };

        let checkpoint = self.tokens.len();
        self.tokens.push(Token::text(name));
        self.tokens.push(Token::text("("));

        let mut rest = body;
        let mut arg_count = 0;
        if rest.trim_start().starts_with(')') {
            rest = rest.trim_start().strip_prefix(')').unwrap();
        } else {
            loop {
                match self.expression(rest) {
                    Some(after) => {
                        arg_count += 1;
                        let trimmed = after.trim_start();
                        if let Some(next) = trimmed.strip_prefix(',') {
                            self.tokens.push(Token::text(","));
                            rest = next;
                        } else if let Some(next) = trimmed.strip_prefix(')') {
                            rest = next;
                            break;
                        } else {
                            self.tokens.truncate(checkpoint);
                            return None;
                        }
                    }
                    None => {
                        self.tokens.truncate(checkpoint);
                        return None;
                    }
                }
            }
        }

        if !signature.accepts(arg_count) {
            self.context.add_error(format!(
                "Function \"{}\" expects {} arguments, got {}",
                name,
                signature.describe(),
                arg_count
            ));
            self.tokens.truncate(checkpoint);
            return None;
        }

        self.tokens.push(Token::text(")"));
        Some(rest)
    }
}
