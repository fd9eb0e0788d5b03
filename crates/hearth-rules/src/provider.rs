//! Provider and handler contracts for external device/plugin code
//!
//! Providers recognize predicate/action text fragments during rule parsing
//! and hand back bound handler instances. The rule manager owns the returned
//! handlers: it calls `setup` once the rule is installed and `destroy` when
//! the rule is removed or replaced.

use async_trait::async_trait;
use hearth_matcher::ParseContext;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::error::HandlerError;

/// What a predicate observes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredicateKind {
    /// A held condition with a current boolean value
    State,

    /// A momentary occurrence; only its change notifications are meaningful
    Event,
}

/// A bound predicate instance inside a rule
#[async_trait]
pub trait PredicateHandler: Send + Sync {
    /// Fetch the current boolean value
    async fn get_value(&self) -> Result<bool, HandlerError>;

    /// Whether this predicate observes held state or momentary events
    fn kind(&self) -> PredicateKind;

    /// Subscribe to change notifications carrying the new value
    fn subscribe(&self) -> broadcast::Receiver<bool>;

    /// Called when the owning rule is installed
    fn setup(&self) {}

    /// Called when the owning rule is removed or replaced
    fn destroy(&self) {}
}

/// A bound action instance inside a rule
#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// Execute the action, or describe it when `simulate` is set
    ///
    /// Returns a human-readable result message.
    async fn execute(&self, simulate: bool) -> Result<String, HandlerError>;

    /// Whether this action can be reverted after a `for` duration
    fn has_restore_action(&self) -> bool {
        false
    }

    /// Revert the action, or describe the revert when `simulate` is set
    async fn execute_restore(&self, simulate: bool) -> Result<String, HandlerError> {
        let _ = simulate;
        Err(HandlerError::new("action has no restore"))
    }

    /// Called when the owning rule is installed
    fn setup(&self) {}

    /// Called when the owning rule is removed or replaced
    fn destroy(&self) {}
}

/// Successful predicate parse: consumed token, remainder, bound handler
pub struct PredicateParseResult {
    pub token: String,
    pub next_input: String,
    pub handler: Arc<dyn PredicateHandler>,
}

/// Successful action parse: consumed token, remainder, bound handler
pub struct ActionParseResult {
    pub token: String,
    pub next_input: String,
    pub handler: Arc<dyn ActionHandler>,
}

/// Recognizes predicate fragments at the head of unconsumed rule text
pub trait PredicateProvider: Send + Sync {
    /// Try to consume a predicate from the start of `input`
    fn parse_predicate(
        &self,
        input: &str,
        context: &mut ParseContext,
    ) -> Option<PredicateParseResult>;
}

/// Recognizes action fragments at the head of unconsumed rule text
pub trait ActionProvider: Send + Sync {
    /// Try to consume an action from the start of `input`
    fn parse_action(&self, input: &str, context: &mut ParseContext) -> Option<ActionParseResult>;
}
