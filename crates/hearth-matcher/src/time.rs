//! Time units and duration qualifiers (`for 2 minutes`, `after 30 seconds`)

use serde::{Deserialize, Serialize};

use crate::context::ParseContext;
use crate::matcher::{match_numeric_expression, MatchResult};
use crate::token::Token;

/// A recognized time unit for duration qualifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
    Days,
    Weeks,
}

impl TimeUnit {
    /// Milliseconds per one of this unit
    pub const fn millis(&self) -> f64 {
        match self {
            TimeUnit::Milliseconds => 1.0,
            TimeUnit::Seconds => 1_000.0,
            TimeUnit::Minutes => 60_000.0,
            TimeUnit::Hours => 3_600_000.0,
            TimeUnit::Days => 86_400_000.0,
            TimeUnit::Weeks => 604_800_000.0,
        }
    }

    // Literal spellings, longest first so prefixes never shadow full words.
    const PATTERNS: &'static [(&'static str, TimeUnit)] = &[
        ("milliseconds", TimeUnit::Milliseconds),
        ("millisecond", TimeUnit::Milliseconds),
        ("seconds", TimeUnit::Seconds),
        ("second", TimeUnit::Seconds),
        ("minutes", TimeUnit::Minutes),
        ("minute", TimeUnit::Minutes),
        ("hours", TimeUnit::Hours),
        ("weeks", TimeUnit::Weeks),
        ("hour", TimeUnit::Hours),
        ("week", TimeUnit::Weeks),
        ("days", TimeUnit::Days),
        ("day", TimeUnit::Days),
        ("ms", TimeUnit::Milliseconds),
        ("s", TimeUnit::Seconds),
        ("m", TimeUnit::Minutes),
        ("h", TimeUnit::Hours),
        ("d", TimeUnit::Days),
        ("w", TimeUnit::Weeks),
    ];
}

/// A matched duration qualifier: the amount's token stream and its unit
///
/// The amount is an arbitrary numeric expression (`for $x minutes` is legal),
/// so it is evaluated against the variable graph when the qualifier is armed,
/// not when it is parsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DurationSpec {
    /// Flat token sequence of the numeric amount
    pub tokens: Vec<Token>,

    /// The recognized time unit
    pub unit: TimeUnit,
}

impl DurationSpec {
    /// A fixed-amount duration
    pub fn literal(amount: f64, unit: TimeUnit) -> Self {
        Self {
            tokens: vec![Token::number(amount)],
            unit,
        }
    }

    /// Convert an evaluated amount into milliseconds
    pub fn to_millis(&self, amount: f64) -> f64 {
        amount * self.unit.millis()
    }
}

/// Match `<numeric expression> <time unit>`
///
/// Fails when the word after the amount is not a recognized time unit, so a
/// fragment like `42 foo` is left for the surrounding predicate/action text.
pub fn match_time_duration(
    input: &str,
    context: &mut ParseContext,
) -> Option<MatchResult<DurationSpec>> {
    let amount = match_numeric_expression(input, context)?;

    let rest = amount.next_input.as_str();
    let (pattern, unit) = TimeUnit::PATTERNS
        .iter()
        .find(|(pattern, _)| {
            rest.strip_prefix(pattern)
                .is_some_and(|after| !after.starts_with(|c: char| c.is_ascii_alphanumeric()))
        })
        .copied()?;

    let matched = format!("{} {}", amount.matched, pattern);
    Some(MatchResult {
        matched,
        next_input: rest[pattern.len()..].trim_start().to_string(),
        value: DurationSpec {
            tokens: amount.value,
            unit,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_duration() {
        let mut ctx = ParseContext::new();
        let result = match_time_duration("2 seconds then beep", &mut ctx).unwrap();
        assert_eq!(result.value, DurationSpec::literal(2.0, TimeUnit::Seconds));
        assert_eq!(result.matched, "2 seconds");
        assert_eq!(result.next_input, "then beep");
    }

    #[test]
    fn test_short_unit_spellings() {
        let mut ctx = ParseContext::new();
        assert_eq!(
            match_time_duration("100 ms", &mut ctx).unwrap().value.unit,
            TimeUnit::Milliseconds
        );
        assert_eq!(
            match_time_duration("5 m", &mut ctx).unwrap().value.unit,
            TimeUnit::Minutes
        );
    }

    #[test]
    fn test_longest_unit_spelling_wins() {
        // "seconds" must not stop at the "s" spelling.
        let mut ctx = ParseContext::new();
        let result = match_time_duration("1.5 seconds", &mut ctx).unwrap();
        assert_eq!(result.value.unit, TimeUnit::Seconds);
        assert_eq!(result.next_input, "");
    }

    #[test]
    fn test_unrecognized_unit_is_no_match() {
        let mut ctx = ParseContext::new();
        assert!(match_time_duration("42 foo", &mut ctx).is_none());
    }

    #[test]
    fn test_unit_requires_word_boundary() {
        // "sec" starts with the "s" spelling but is not a unit word.
        let mut ctx = ParseContext::new();
        assert!(match_time_duration("10 sec", &mut ctx).is_none());
    }

    #[test]
    fn test_expression_amount() {
        let mut ctx = ParseContext::new().with_variables(["x"]);
        let result = match_time_duration("$x + 1 minutes", &mut ctx).unwrap();
        assert_eq!(
            result.value.tokens,
            vec![Token::text("$x"), Token::text("+"), Token::number(1.0)]
        );
        assert_eq!(result.value.unit, TimeUnit::Minutes);
    }

    #[test]
    fn test_millis_conversion() {
        let spec = DurationSpec::literal(2.0, TimeUnit::Minutes);
        assert_eq!(spec.to_millis(2.0), 120_000.0);
        assert_eq!(TimeUnit::Seconds.millis(), 1_000.0);
    }
}
