//! Rule engine
//!
//! This crate parses automation rules of the form
//! `when <condition> then <actions>` against pluggable predicate/action
//! providers, compiles the condition into a boolean tree over the bound
//! predicates, and evaluates it reactively on predicate-change
//! notifications. Temporal qualifiers (`for`, `after`) arm cancellable
//! timers; actions execute in declaration order with optional delays and
//! auto-reverts.
//!
//! # Architecture
//!
//! ```text
//! RULE = when PREDICATES (and/or/[]) then ACTIONS
//! ```
//!
//! - **Providers**: External collaborators that recognize predicate/action
//!   text fragments and hand back bound handler instances
//! - **Handlers**: The bound instances the manager listens to and executes
//! - **RuleManager**: Owns every rule, its handlers, and its timers
//!
//! # Key Types
//!
//! - [`PredicateProvider`] / [`ActionProvider`] - The provider contracts
//! - [`PredicateHandler`] / [`ActionHandler`] - The handler contracts
//! - [`ConditionExpr`] - Compiled boolean condition tree
//! - [`RuleManager`] - Parse, bind, evaluate, execute

mod condition;
mod error;
mod manager;
mod parser;
mod provider;
mod rule;

pub use condition::{build_condition, ConditionBuildError, ConditionExpr};
pub use error::{HandlerError, RuleError, RuleResult};
pub use manager::{RuleInfo, RuleManager};
pub use provider::{
    ActionHandler, ActionParseResult, ActionProvider, PredicateHandler, PredicateKind,
    PredicateParseResult, PredicateProvider,
};
pub use rule::{Action, Predicate, Rule, RuleConfig};
