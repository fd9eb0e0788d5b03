//! Rule string parsing
//!
//! Tokenizes `when <condition> then <actions>` by repeatedly asking the
//! registered providers, in registration order, whether they can consume the
//! next unconsumed prefix. Grammar errors accumulate on the parse context;
//! the first unresolvable fragment aborts the parse.

use hearth_matcher::{
    match_literal, match_time_duration, DurationSpec, MatchResult, ParseContext, Token,
};
use std::sync::Arc;
use tracing::debug;

use crate::provider::{
    ActionHandler, ActionProvider, PredicateHandler, PredicateKind, PredicateProvider,
};

/// A predicate fragment before it is bound into a rule
pub(crate) struct ParsedPredicate {
    pub token: String,
    pub kind: PredicateKind,
    pub handler: Arc<dyn PredicateHandler>,
    pub r#for: Option<DurationSpec>,
    pub just_trigger: bool,
    pub just_condition: bool,
}

/// An action fragment before it is bound into a rule
pub(crate) struct ParsedAction {
    pub token: String,
    pub handler: Arc<dyn ActionHandler>,
    pub after: Option<DurationSpec>,
    pub r#for: Option<DurationSpec>,
}

/// The outcome of a successful rule-string parse
pub(crate) struct ParsedRule {
    pub condition_token: String,
    pub actions_token: String,
    pub condition_tokens: Vec<Token>,
    pub predicates: Vec<ParsedPredicate>,
    pub actions: Vec<ParsedAction>,
}

/// Parses rule strings against ordered provider lists
pub(crate) struct RuleParser<'a> {
    pub predicate_providers: &'a [Arc<dyn PredicateProvider>],
    pub action_providers: &'a [Arc<dyn ActionProvider>],
}

impl RuleParser<'_> {
    /// Parse a full rule string
    ///
    /// Returns `None` after recording the failure on the context.
    pub fn parse_rule_string(
        &self,
        rule_id: &str,
        rule_string: &str,
        context: &mut ParseContext,
    ) -> Option<ParsedRule> {
        let Some(after_when) = match_keyword(rule_string, &["when"]) else {
            context.add_error(format!("Rule \"{}\" must start with \"when\"", rule_id));
            return None;
        };

        let Some((condition_text, actions_text)) = split_on_then(&after_when.next_input) else {
            context.add_error(format!("Rule \"{}\" is missing \"then\"", rule_id));
            return None;
        };
        let condition_token = condition_text.trim().to_string();
        let actions_token = actions_text.trim().to_string();
        debug!(
            rule = rule_id,
            condition = %condition_token,
            actions = %actions_token,
            "parsing rule segments"
        );

        let (condition_tokens, predicates) =
            self.tokenize_condition(rule_id, &condition_token, context)?;
        let actions = self.tokenize_actions(rule_id, &actions_token, context)?;

        Some(ParsedRule {
            condition_token,
            actions_token,
            condition_tokens,
            predicates,
            actions,
        })
    }

    fn tokenize_condition(
        &self,
        rule_id: &str,
        condition_text: &str,
        context: &mut ParseContext,
    ) -> Option<(Vec<Token>, Vec<ParsedPredicate>)> {
        let mut tokens = Vec::new();
        let mut predicates: Vec<ParsedPredicate> = Vec::new();
        let mut input = condition_text.trim().to_string();
        let mut expecting_predicate = true;

        loop {
            if input.is_empty() {
                if expecting_predicate {
                    context.add_error(format!(
                        "Expected a predicate at the end of rule \"{}\"",
                        rule_id
                    ));
                    return None;
                }
                break;
            }

            if !expecting_predicate {
                if let Some(m) = match_literal(&input, &["]"]) {
                    tokens.push(Token::text("]"));
                    input = m.next_input;
                } else if let Some(m) = match_keyword(&input, &["and", "or"]) {
                    tokens.push(Token::text(m.value));
                    input = m.next_input;
                    expecting_predicate = true;
                } else {
                    context.add_error(format!(
                        "Expected \"and\", \"or\" or \"]\" but found \"{}\" in rule \"{}\"",
                        input, rule_id
                    ));
                    return None;
                }
                continue;
            }

            if let Some(m) = match_literal(&input, &["["]) {
                tokens.push(Token::text("["));
                input = m.next_input;
                continue;
            }

            let mut just_trigger = false;
            let mut just_condition = false;
            if let Some(m) = match_literal(&input, &["trigger:"]) {
                just_trigger = true;
                input = m.next_input;
            } else if let Some(m) = match_literal(&input, &["condition:"]) {
                just_condition = true;
                input = m.next_input;
            }

            let Some(result) = self
                .predicate_providers
                .iter()
                .find_map(|provider| provider.parse_predicate(&input, context))
            else {
                context.add_error(format!(
                    "Could not find a provider that matches \"{}\" of rule \"{}\"",
                    input, rule_id
                ));
                return None;
            };
            input = result.next_input;

            // Optional trailing `for <duration>`. A fragment after `for`
            // that is not a valid duration is not a qualifier, and its
            // speculative errors must not leak into this parse.
            let mut for_spec = None;
            if let Some(m) = match_keyword(&input, &["for"]) {
                let mut scratch = context.scratch();
                if let Some(duration) = match_time_duration(&m.next_input, &mut scratch) {
                    for_spec = Some(duration.value);
                    input = duration.next_input;
                }
            }

            let index = predicates.len();
            tokens.extend([
                Token::text("predicate"),
                Token::text("("),
                Token::number(index as f64),
                Token::text(")"),
            ]);
            predicates.push(ParsedPredicate {
                token: result.token,
                kind: result.handler.kind(),
                handler: result.handler,
                r#for: for_spec,
                just_trigger,
                just_condition,
            });
            expecting_predicate = false;
        }

        Some((tokens, predicates))
    }

    fn tokenize_actions(
        &self,
        rule_id: &str,
        actions_text: &str,
        context: &mut ParseContext,
    ) -> Option<Vec<ParsedAction>> {
        let mut actions = Vec::new();
        let mut input = actions_text.trim().to_string();

        if input.is_empty() {
            context.add_error(format!("Rule \"{}\" has no actions", rule_id));
            return None;
        }

        loop {
            let mut after_spec = None;
            let mut for_spec = None;
            self.consume_qualifiers(&mut input, &mut after_spec, &mut for_spec, context);

            let Some(result) = self
                .action_providers
                .iter()
                .find_map(|provider| provider.parse_action(&input, context))
            else {
                context.add_error(format!(
                    "Could not find a provider that matches \"{}\" of rule \"{}\"",
                    input, rule_id
                ));
                return None;
            };
            input = result.next_input;

            self.consume_qualifiers(&mut input, &mut after_spec, &mut for_spec, context);

            actions.push(ParsedAction {
                token: result.token,
                handler: result.handler,
                after: after_spec,
                r#for: for_spec,
            });

            if input.is_empty() {
                break;
            }
            if let Some(m) = match_keyword(&input, &["and"]) {
                input = m.next_input;
                continue;
            }
            context.add_error(format!(
                "Expected \"and\" or the end of rule \"{}\" but found \"{}\"",
                rule_id, input
            ));
            return None;
        }

        Some(actions)
    }

    // `after <duration>` and `for <duration>` in either position around the
    // action text, each at most once.
    fn consume_qualifiers(
        &self,
        input: &mut String,
        after_spec: &mut Option<DurationSpec>,
        for_spec: &mut Option<DurationSpec>,
        context: &ParseContext,
    ) {
        loop {
            if after_spec.is_none() {
                if let Some(m) = match_keyword(input, &["after"]) {
                    let mut scratch = context.scratch();
                    if let Some(duration) = match_time_duration(&m.next_input, &mut scratch) {
                        *after_spec = Some(duration.value);
                        *input = duration.next_input;
                        continue;
                    }
                }
            }
            if for_spec.is_none() {
                if let Some(m) = match_keyword(input, &["for"]) {
                    let mut scratch = context.scratch();
                    if let Some(duration) = match_time_duration(&m.next_input, &mut scratch) {
                        *for_spec = Some(duration.value);
                        *input = duration.next_input;
                        continue;
                    }
                }
            }
            break;
        }
    }
}

// Literal match that additionally requires a word boundary after the
// keyword, so "or" never bites into "order".
fn match_keyword<'p>(input: &str, keywords: &[&'p str]) -> Option<MatchResult<&'p str>> {
    let trimmed = input.trim_start();
    let result = match_literal(input, keywords)?;
    let after = &trimmed[result.matched.len()..];
    if after.starts_with(|c: char| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    Some(result)
}

// Find the first standalone `then` outside of quoted strings.
fn split_on_then(input: &str) -> Option<(&str, &str)> {
    let bytes = input.as_bytes();
    let mut in_quotes = false;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'\\' if in_quotes => {
                i += 2;
                continue;
            }
            b'"' => in_quotes = !in_quotes,
            b't' if !in_quotes && input[i..].starts_with("then") => {
                let boundary_before = i == 0 || !is_word_byte(bytes[i - 1]);
                let after = &input[i + 4..];
                let boundary_after = !after.starts_with(|c: char| is_word_char(c));
                if boundary_before && boundary_after {
                    return Some((&input[..i], after));
                }
            }
            _ => {}
        }
        i += 1;
    }

    None
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}
