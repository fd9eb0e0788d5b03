//! Rule, predicate, and action entities

use chrono::{DateTime, Utc};
use hearth_matcher::DurationSpec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::condition::ConditionExpr;
use crate::provider::{ActionHandler, PredicateHandler, PredicateKind};

/// Rule configuration: opaque text plus lifecycle flag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Human-readable name
    pub name: String,

    /// The full `when ... then ...` text
    pub rule_string: String,

    /// Whether the rule evaluates on notifications
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// A bound predicate inside a rule
pub struct Predicate {
    /// Deterministic id: `prd-<ruleId>-<ordinal>`
    pub id: String,

    /// Original token text the provider consumed
    pub token: String,

    /// State or event
    pub kind: PredicateKind,

    /// The bound handler instance
    pub handler: Arc<dyn PredicateHandler>,

    /// Optional `for` duration qualifier
    pub r#for: Option<DurationSpec>,

    /// Only fires the rule, never holds it
    pub just_trigger: bool,

    /// Only holds the rule, never fires it
    pub just_condition: bool,

    /// When the predicate last changed
    pub last_change: Option<DateTime<Utc>>,

    /// Whether the `for` duration requirement is currently satisfied
    pub time_achieved: bool,

    /// Timer counting down the `for` duration
    pub(crate) for_timer: Option<JoinHandle<()>>,
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Predicate")
            .field("id", &self.id)
            .field("token", &self.token)
            .field("kind", &self.kind)
            .field("for", &self.r#for)
            .field("just_trigger", &self.just_trigger)
            .field("just_condition", &self.just_condition)
            .field("time_achieved", &self.time_achieved)
            .finish()
    }
}

/// A bound action inside a rule
pub struct Action {
    /// Deterministic id: `act-<ruleId>-<ordinal>`
    pub id: String,

    /// Original token text the provider consumed
    pub token: String,

    /// The bound handler instance
    pub handler: Arc<dyn ActionHandler>,

    /// Optional `after` delay qualifier
    pub after: Option<DurationSpec>,

    /// Optional `for` auto-revert qualifier
    pub r#for: Option<DurationSpec>,

    /// Pending delayed execution
    pub(crate) delay_timer: Option<JoinHandle<()>>,

    /// Pending auto-revert
    pub(crate) restore_timer: Option<JoinHandle<()>>,
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("id", &self.id)
            .field("token", &self.token)
            .field("after", &self.after)
            .field("for", &self.r#for)
            .finish()
    }
}

/// One parsed and bound rule
pub struct Rule {
    /// Unique identifier
    pub id: String,

    /// Human-readable name
    pub name: String,

    /// Original full rule string
    pub rule_string: String,

    /// The condition segment text
    pub condition_token: String,

    /// The actions segment text
    pub actions_token: String,

    /// Compiled condition tree over `predicates`
    pub condition: ConditionExpr,

    /// Bound predicates, in declaration order
    pub predicates: Vec<Predicate>,

    /// Bound actions, in declaration order
    pub actions: Vec<Action>,

    /// Whether the rule evaluates on notifications
    pub active: bool,

    /// Listener tasks, one per listened predicate
    pub(crate) listeners: Vec<JoinHandle<()>>,
}

impl Rule {
    /// Find a predicate's position by its id
    pub fn predicate_index(&self, predicate_id: &str) -> Option<usize> {
        self.predicates.iter().position(|p| p.id == predicate_id)
    }

    /// Detach everything: abort listeners and timers, destroy handlers
    ///
    /// Aborting outstanding timers before handler teardown is a correctness
    /// requirement: a timer must never fire into destroyed state.
    pub(crate) fn destroy(&mut self) {
        for listener in self.listeners.drain(..) {
            listener.abort();
        }
        for predicate in &mut self.predicates {
            if let Some(timer) = predicate.for_timer.take() {
                timer.abort();
            }
            predicate.handler.destroy();
        }
        for action in &mut self.actions {
            if let Some(timer) = action.delay_timer.take() {
                timer.abort();
            }
            if let Some(timer) = action.restore_timer.take() {
                timer.abort();
            }
            action.handler.destroy();
        }
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("rule_string", &self.rule_string)
            .field("active", &self.active)
            .field("predicates", &self.predicates)
            .field("actions", &self.actions)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_config_round_trip() {
        let config = RuleConfig {
            name: "Night light".to_string(),
            rule_string: "when presence detected then turn on the light".to_string(),
            active: true,
        };

        let json = serde_json::to_string(&config).unwrap();
        let back: RuleConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_rule_config_active_defaults_to_true() {
        let config: RuleConfig = serde_json::from_str(
            r#"{"name": "r", "rule_string": "when predicate 1 then action 1"}"#,
        )
        .unwrap();
        assert!(config.active);
    }
}
