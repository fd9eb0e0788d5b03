//! The rule manager
//!
//! Owns every rule, its bound handlers, and its timers. Rules are parsed
//! against the registered providers, subscribed to their predicates' change
//! notifications, and re-evaluated on every notification under a per-rule
//! lock so no two evaluations of the same rule interleave.

use dashmap::DashMap;
use hearth_matcher::DurationSpec;
use hearth_variables::{EvalResult, VariableManager};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::condition::build_condition;
use crate::error::{RuleError, RuleResult};
use crate::parser::RuleParser;
use crate::provider::{ActionProvider, PredicateHandler, PredicateKind, PredicateProvider};
use crate::rule::{Action, Predicate, Rule, RuleConfig};

/// Snapshot of a rule's public state
#[derive(Debug, Clone, Serialize)]
pub struct RuleInfo {
    pub id: String,
    pub name: String,
    pub rule_string: String,
    pub condition_token: String,
    pub actions_token: String,
    pub active: bool,
    pub predicate_ids: Vec<String>,
    pub action_ids: Vec<String>,
}

struct RuleEntry {
    rule: Mutex<Rule>,
}

/// Parses, binds, and reactively evaluates rules
///
/// Provider order determines parse priority. All collaborators are injected;
/// the manager holds no global state. Spawned listener and timer tasks hold
/// only a weak reference back to the manager, so dropping it ends them.
pub struct RuleManager {
    predicate_providers: Vec<Arc<dyn PredicateProvider>>,
    action_providers: Vec<Arc<dyn ActionProvider>>,
    variables: Arc<VariableManager>,
    rules: DashMap<String, Arc<RuleEntry>>,
}

impl RuleManager {
    /// Create a manager with ordered provider lists
    pub fn new(
        predicate_providers: Vec<Arc<dyn PredicateProvider>>,
        action_providers: Vec<Arc<dyn ActionProvider>>,
        variables: Arc<VariableManager>,
    ) -> Arc<Self> {
        Arc::new(Self {
            predicate_providers,
            action_providers,
            variables,
            rules: DashMap::new(),
        })
    }

    /// Parse a rule string and install it under the given id
    ///
    /// Fails without side effects when the id is taken or the string does not
    /// parse; handlers are set up and listeners spawned only on success.
    pub fn add_rule_by_string(
        self: &Arc<Self>,
        id: &str,
        config: RuleConfig,
    ) -> RuleResult<()> {
        if self.rules.contains_key(id) {
            return Err(RuleError::AlreadyExists(id.to_string()));
        }

        let rule = self.build_rule(id, &config)?;
        info!(rule = id, name = %config.name, "added rule");
        self.rules
            .insert(id.to_string(), Arc::new(RuleEntry { rule: Mutex::new(rule) }));
        Ok(())
    }

    /// Re-parse a rule from scratch and atomically swap the bound set
    ///
    /// The old predicates/actions are detached only after the new string
    /// parses without error; a parse failure leaves the active rule
    /// untouched.
    pub async fn update_rule_by_string(
        self: &Arc<Self>,
        id: &str,
        config: RuleConfig,
    ) -> RuleResult<()> {
        let entry = self
            .rules
            .get(id)
            .map(|e| e.value().clone())
            .ok_or_else(|| RuleError::NotFound(id.to_string()))?;

        let new_rule = self.build_rule(id, &config)?;

        let mut rule = entry.rule.lock().await;
        let mut old_rule = std::mem::replace(&mut *rule, new_rule);
        drop(rule);
        old_rule.destroy();
        info!(rule = id, "updated rule");
        Ok(())
    }

    /// Remove a rule, detaching its handlers and aborting its timers
    pub async fn remove_rule(&self, id: &str) -> RuleResult<()> {
        let (_, entry) = self
            .rules
            .remove(id)
            .ok_or_else(|| RuleError::NotFound(id.to_string()))?;

        let mut rule = entry.rule.lock().await;
        rule.destroy();
        info!(rule = id, "removed rule");
        Ok(())
    }

    /// Snapshot a rule's public state
    pub async fn get_rule_by_id(&self, id: &str) -> Option<RuleInfo> {
        let entry = self.rules.get(id).map(|e| e.value().clone())?;
        let rule = entry.rule.lock().await;
        Some(RuleInfo {
            id: rule.id.clone(),
            name: rule.name.clone(),
            rule_string: rule.rule_string.clone(),
            condition_token: rule.condition_token.clone(),
            actions_token: rule.actions_token.clone(),
            active: rule.active,
            predicate_ids: rule.predicates.iter().map(|p| p.id.clone()).collect(),
            action_ids: rule.actions.iter().map(|a| a.id.clone()).collect(),
        })
    }

    /// All installed rule ids, sorted
    pub fn get_rule_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.rules.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Toggle whether a rule evaluates on notifications
    pub async fn set_rule_active(&self, id: &str, active: bool) -> RuleResult<()> {
        let entry = self
            .rules
            .get(id)
            .map(|e| e.value().clone())
            .ok_or_else(|| RuleError::NotFound(id.to_string()))?;

        let mut rule = entry.rule.lock().await;
        rule.active = active;
        info!(rule = id, active, "rule activation changed");
        Ok(())
    }

    /// Run a rule's actions on demand
    ///
    /// With `simulate` set, handlers describe what they would do instead of
    /// doing it.
    pub async fn execute_rule_actions(
        self: &Arc<Self>,
        id: &str,
        simulate: bool,
    ) -> RuleResult<()> {
        let entry = self
            .rules
            .get(id)
            .map(|e| e.value().clone())
            .ok_or_else(|| RuleError::NotFound(id.to_string()))?;

        let mut rule = entry.rule.lock().await;
        self.execute_actions_locked(&mut rule, simulate).await;
        Ok(())
    }

    // --- Parsing and binding ---

    fn build_rule(self: &Arc<Self>, id: &str, config: &RuleConfig) -> RuleResult<Rule> {
        let mut context = self.variables.parse_context();
        let parser = RuleParser {
            predicate_providers: &self.predicate_providers,
            action_providers: &self.action_providers,
        };

        let parsed = parser.parse_rule_string(id, &config.rule_string, &mut context);
        let parsed = match parsed {
            Some(parsed) if !context.has_errors() => parsed,
            _ => {
                let errors = if context.errors.is_empty() {
                    vec![format!(
                        "Could not parse rule \"{}\"",
                        config.rule_string
                    )]
                } else {
                    context.errors
                };
                return Err(RuleError::Parse {
                    id: id.to_string(),
                    errors,
                });
            }
        };

        let condition = build_condition(&parsed.condition_tokens, parsed.predicates.len())
            .map_err(|e| RuleError::Parse {
                id: id.to_string(),
                errors: vec![e.to_string()],
            })?;

        let predicates: Vec<Predicate> = parsed
            .predicates
            .into_iter()
            .enumerate()
            .map(|(ordinal, p)| Predicate {
                id: format!("prd-{}-{}", id, ordinal),
                token: p.token,
                kind: p.kind,
                handler: p.handler,
                r#for: p.r#for,
                just_trigger: p.just_trigger,
                just_condition: p.just_condition,
                last_change: None,
                time_achieved: false,
                for_timer: None,
            })
            .collect();

        let actions: Vec<Action> = parsed
            .actions
            .into_iter()
            .enumerate()
            .map(|(ordinal, a)| Action {
                id: format!("act-{}-{}", id, ordinal),
                token: a.token,
                handler: a.handler,
                after: a.after,
                r#for: a.r#for,
                delay_timer: None,
                restore_timer: None,
            })
            .collect();

        for predicate in &predicates {
            predicate.handler.setup();
        }
        for action in &actions {
            action.handler.setup();
        }

        let listeners = predicates
            .iter()
            .filter(|p| !p.just_condition)
            .map(|p| self.spawn_listener(id, &p.id, &p.handler))
            .collect();

        Ok(Rule {
            id: id.to_string(),
            name: config.name.clone(),
            rule_string: config.rule_string.clone(),
            condition_token: parsed.condition_token,
            actions_token: parsed.actions_token,
            condition,
            predicates,
            actions,
            active: config.active,
            listeners,
        })
    }

    fn spawn_listener(
        self: &Arc<Self>,
        rule_id: &str,
        predicate_id: &str,
        handler: &Arc<dyn PredicateHandler>,
    ) -> JoinHandle<()> {
        let mut notifications = handler.subscribe();
        let manager = Arc::downgrade(self);
        let rule_id = rule_id.to_string();
        let predicate_id = predicate_id.to_string();

        tokio::spawn(async move {
            loop {
                match notifications.recv().await {
                    Ok(value) => {
                        let Some(manager) = manager.upgrade() else { break };
                        manager
                            .on_predicate_change(&rule_id, &predicate_id, value)
                            .await;
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        debug!(rule = %rule_id, predicate = %predicate_id, missed, "listener lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    // --- Reactive evaluation ---

    async fn on_predicate_change(self: &Arc<Self>, rule_id: &str, predicate_id: &str, value: bool) {
        let Some(entry) = self.rules.get(rule_id).map(|e| e.value().clone()) else {
            return;
        };
        let mut rule = entry.rule.lock().await;
        if !rule.active {
            return;
        }
        let Some(index) = rule.predicate_index(predicate_id) else {
            return;
        };

        debug!(rule = rule_id, predicate = predicate_id, value, "predicate changed");
        rule.predicates[index].last_change = Some(chrono::Utc::now());

        if rule.predicates[index].r#for.is_some() {
            self.track_duration(&mut rule, index, value);
        }

        let known = HashMap::from([(predicate_id.to_string(), value)]);
        self.evaluate_and_execute(&mut rule, Some(predicate_id), &known)
            .await;
    }

    // Arm or reset the `for` timer of one predicate.
    fn track_duration(self: &Arc<Self>, rule: &mut Rule, index: usize, value: bool) {
        if let Some(timer) = rule.predicates[index].for_timer.take() {
            timer.abort();
        }
        rule.predicates[index].time_achieved = false;

        if !value {
            return;
        }

        let spec = rule.predicates[index].r#for.clone().unwrap();
        let duration = match self.qualifier_duration(&spec) {
            Ok(duration) => duration,
            Err(e) => {
                error!(
                    rule = %rule.id,
                    predicate = %rule.predicates[index].id,
                    error = %e,
                    "could not evaluate duration qualifier"
                );
                return;
            }
        };

        let manager = Arc::downgrade(self);
        let rule_id = rule.id.clone();
        let predicate_id = rule.predicates[index].id.clone();
        debug!(rule = %rule_id, predicate = %predicate_id, ?duration, "arming duration timer");

        rule.predicates[index].for_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            if let Some(manager) = manager.upgrade() {
                manager.on_time_achieved(&rule_id, &predicate_id).await;
            }
        }));
    }

    async fn on_time_achieved(self: &Arc<Self>, rule_id: &str, predicate_id: &str) {
        let Some(entry) = self.rules.get(rule_id).map(|e| e.value().clone()) else {
            return;
        };
        let mut rule = entry.rule.lock().await;
        let Some(index) = rule.predicate_index(predicate_id) else {
            return;
        };

        rule.predicates[index].for_timer = None;
        rule.predicates[index].time_achieved = true;
        debug!(rule = rule_id, predicate = predicate_id, "duration requirement satisfied");

        self.evaluate_and_execute(&mut rule, Some(predicate_id), &HashMap::new())
            .await;
    }

    async fn evaluate_and_execute(
        self: &Arc<Self>,
        rule: &mut Rule,
        trigger: Option<&str>,
        known: &HashMap<String, bool>,
    ) {
        let satisfied = self.evaluate_condition(rule, trigger, known).await;
        if satisfied {
            info!(rule = %rule.id, "condition satisfied, executing actions");
            self.execute_actions_locked(rule, false).await;
        } else {
            debug!(rule = %rule.id, "condition not satisfied");
        }
    }

    // Resolve every predicate's contribution, then fold the tree.
    async fn evaluate_condition(
        &self,
        rule: &Rule,
        trigger: Option<&str>,
        known: &HashMap<String, bool>,
    ) -> bool {
        let mut values = Vec::with_capacity(rule.predicates.len());
        for predicate in &rule.predicates {
            values.push(self.predicate_value(rule, predicate, trigger, known).await);
        }
        rule.condition.evaluate(&values)
    }

    // A `for`-qualified predicate always contributes its `time_achieved`
    // flag, never the instantaneous or short-circuit value. Trigger-only
    // predicates (marked or event-kind) contribute only when they fired this
    // evaluation.
    async fn predicate_value(
        &self,
        rule: &Rule,
        predicate: &Predicate,
        trigger: Option<&str>,
        known: &HashMap<String, bool>,
    ) -> bool {
        if predicate.r#for.is_some() {
            return predicate.time_achieved;
        }

        if predicate.just_trigger || predicate.kind == PredicateKind::Event {
            return match trigger {
                Some(trigger_id) if trigger_id == predicate.id => {
                    known.get(&predicate.id).copied().unwrap_or(true)
                }
                _ => false,
            };
        }

        if let Some(value) = known.get(&predicate.id) {
            return *value;
        }

        match predicate.handler.get_value().await {
            Ok(value) => value,
            Err(e) => {
                error!(
                    rule = %rule.id,
                    predicate = %predicate.id,
                    error = %e,
                    "predicate handler failed, treating as false"
                );
                false
            }
        }
    }

    // --- Action execution ---

    async fn execute_actions_locked(self: &Arc<Self>, rule: &mut Rule, simulate: bool) {
        for index in 0..rule.actions.len() {
            // A new trigger supersedes any pending auto-revert.
            if let Some(timer) = rule.actions[index].restore_timer.take() {
                timer.abort();
            }

            let delay = match &rule.actions[index].after {
                Some(spec) => match self.qualifier_duration(spec) {
                    Ok(duration) => Some(duration),
                    Err(e) => {
                        error!(
                            rule = %rule.id,
                            action = %rule.actions[index].id,
                            error = %e,
                            "could not evaluate delay qualifier"
                        );
                        continue;
                    }
                },
                None => None,
            };

            if let Some(delay) = delay {
                if let Some(timer) = rule.actions[index].delay_timer.take() {
                    timer.abort();
                }
                let manager = Arc::downgrade(self);
                let rule_id = rule.id.clone();
                debug!(rule = %rule_id, action = %rule.actions[index].id, ?delay, "scheduling delayed action");
                rule.actions[index].delay_timer = Some(tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    if let Some(manager) = manager.upgrade() {
                        manager.run_delayed_action(&rule_id, index, simulate).await;
                    }
                }));
            } else {
                let restore_timer = self.run_action(rule, index, simulate).await;
                rule.actions[index].restore_timer = restore_timer;
            }
        }
    }

    // Execute one action now; returns the armed auto-revert timer, if any.
    async fn run_action(
        self: &Arc<Self>,
        rule: &Rule,
        index: usize,
        simulate: bool,
    ) -> Option<JoinHandle<()>> {
        let action = &rule.actions[index];
        match action.handler.execute(simulate).await {
            Ok(message) => {
                info!(rule = %rule.id, action = %action.id, %message, simulate, "action executed")
            }
            Err(e) => {
                error!(rule = %rule.id, action = %action.id, error = %e, "action failed");
                return None;
            }
        }

        if simulate {
            return None;
        }
        let spec = action.r#for.as_ref()?;
        if !action.handler.has_restore_action() {
            return None;
        }

        let duration = match self.qualifier_duration(spec) {
            Ok(duration) => duration,
            Err(e) => {
                error!(
                    rule = %rule.id,
                    action = %action.id,
                    error = %e,
                    "could not evaluate auto-revert qualifier"
                );
                return None;
            }
        };

        let manager = Arc::downgrade(self);
        let rule_id = rule.id.clone();
        debug!(rule = %rule_id, action = %action.id, ?duration, "scheduling auto-revert");
        Some(tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            if let Some(manager) = manager.upgrade() {
                manager.run_restore_action(&rule_id, index).await;
            }
        }))
    }

    async fn run_delayed_action(self: &Arc<Self>, rule_id: &str, index: usize, simulate: bool) {
        let Some(entry) = self.rules.get(rule_id).map(|e| e.value().clone()) else {
            return;
        };
        let mut rule = entry.rule.lock().await;
        if index >= rule.actions.len() {
            return;
        }
        rule.actions[index].delay_timer = None;

        let restore_timer = self.run_action(&rule, index, simulate).await;
        rule.actions[index].restore_timer = restore_timer;
    }

    async fn run_restore_action(self: &Arc<Self>, rule_id: &str, index: usize) {
        let Some(entry) = self.rules.get(rule_id).map(|e| e.value().clone()) else {
            return;
        };
        let mut rule = entry.rule.lock().await;
        if index >= rule.actions.len() {
            return;
        }
        rule.actions[index].restore_timer = None;

        let action = &rule.actions[index];
        match action.handler.execute_restore(false).await {
            Ok(message) => {
                info!(rule = %rule.id, action = %action.id, %message, "restore action executed")
            }
            Err(e) => {
                error!(rule = %rule.id, action = %action.id, error = %e, "restore action failed")
            }
        }
    }

    // Evaluate a qualifier's amount through the variable graph at arming
    // time.
    fn qualifier_duration(&self, spec: &DurationSpec) -> EvalResult<Duration> {
        let amount = self.variables.evaluate_numeric_expression(&spec.tokens)?;
        let millis = spec.to_millis(amount).max(0.0);
        Ok(Duration::from_millis(millis as u64))
    }
}
