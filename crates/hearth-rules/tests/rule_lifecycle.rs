//! End-to-end rule lifecycle tests with in-memory providers
//!
//! All tests run on a paused clock so temporal qualifiers are deterministic:
//! sleeping in a test auto-advances time past pending timers.

use async_trait::async_trait;
use hearth_matcher::{match_literal, ParseContext};
use hearth_rules::{
    ActionHandler, ActionParseResult, ActionProvider, HandlerError, PredicateHandler,
    PredicateKind, PredicateParseResult, PredicateProvider, RuleConfig, RuleError, RuleManager,
};
use hearth_variables::{Value, VariableManager};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

#[derive(Clone)]
struct TestPredicate {
    name: String,
    kind: PredicateKind,
    value: Arc<AtomicBool>,
    sender: broadcast::Sender<bool>,
    destroyed: Arc<AtomicBool>,
}

impl TestPredicate {
    fn new(name: &str, kind: PredicateKind) -> Self {
        let (sender, _) = broadcast::channel(16);
        Self {
            name: name.to_string(),
            kind,
            value: Arc::new(AtomicBool::new(false)),
            sender,
            destroyed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Change the value and notify listeners
    fn fire(&self, value: bool) {
        self.value.store(value, Ordering::SeqCst);
        let _ = self.sender.send(value);
    }

    /// Change the value without a notification
    fn set(&self, value: bool) {
        self.value.store(value, Ordering::SeqCst);
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PredicateHandler for TestPredicate {
    async fn get_value(&self) -> Result<bool, HandlerError> {
        Ok(self.value.load(Ordering::SeqCst))
    }

    fn kind(&self) -> PredicateKind {
        self.kind
    }

    fn subscribe(&self) -> broadcast::Receiver<bool> {
        self.sender.subscribe()
    }

    fn destroy(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
    }
}

struct TestPredicateProvider {
    predicates: Vec<TestPredicate>,
}

impl PredicateProvider for TestPredicateProvider {
    fn parse_predicate(
        &self,
        input: &str,
        _context: &mut ParseContext,
    ) -> Option<PredicateParseResult> {
        let names: Vec<&str> = self.predicates.iter().map(|p| p.name.as_str()).collect();
        let m = match_literal(input, &names)?;
        let predicate = self.predicates.iter().find(|p| p.name == m.value)?;
        Some(PredicateParseResult {
            token: m.matched,
            next_input: m.next_input,
            handler: Arc::new(predicate.clone()),
        })
    }
}

#[derive(Clone)]
struct TestAction {
    name: String,
    executions: Arc<AtomicUsize>,
    simulations: Arc<AtomicUsize>,
    restores: Arc<AtomicUsize>,
    restorable: bool,
    broken: bool,
}

impl TestAction {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            executions: Arc::new(AtomicUsize::new(0)),
            simulations: Arc::new(AtomicUsize::new(0)),
            restores: Arc::new(AtomicUsize::new(0)),
            restorable: false,
            broken: false,
        }
    }

    fn restorable(name: &str) -> Self {
        Self {
            restorable: true,
            ..Self::new(name)
        }
    }

    fn broken(name: &str) -> Self {
        Self {
            broken: true,
            ..Self::new(name)
        }
    }

    fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }

    fn simulations(&self) -> usize {
        self.simulations.load(Ordering::SeqCst)
    }

    fn restores(&self) -> usize {
        self.restores.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ActionHandler for TestAction {
    async fn execute(&self, simulate: bool) -> Result<String, HandlerError> {
        if self.broken {
            return Err(HandlerError::new(format!("{} is broken", self.name)));
        }
        if simulate {
            self.simulations.fetch_add(1, Ordering::SeqCst);
            Ok(format!("would execute {}", self.name))
        } else {
            self.executions.fetch_add(1, Ordering::SeqCst);
            Ok(format!("executed {}", self.name))
        }
    }

    fn has_restore_action(&self) -> bool {
        self.restorable
    }

    async fn execute_restore(&self, _simulate: bool) -> Result<String, HandlerError> {
        self.restores.fetch_add(1, Ordering::SeqCst);
        Ok(format!("restored {}", self.name))
    }
}

struct TestActionProvider {
    actions: Vec<TestAction>,
}

impl ActionProvider for TestActionProvider {
    fn parse_action(&self, input: &str, _context: &mut ParseContext) -> Option<ActionParseResult> {
        let names: Vec<&str> = self.actions.iter().map(|a| a.name.as_str()).collect();
        let m = match_literal(input, &names)?;
        let action = self.actions.iter().find(|a| a.name == m.value)?;
        Some(ActionParseResult {
            token: m.matched,
            next_input: m.next_input,
            handler: Arc::new(action.clone()),
        })
    }
}

struct Fixture {
    manager: Arc<RuleManager>,
    variables: Arc<VariableManager>,
    p1: TestPredicate,
    p2: TestPredicate,
    p3: TestPredicate,
    e1: TestPredicate,
    a1: TestAction,
    a2: TestAction,
    broken: TestAction,
    restorable: TestAction,
}

fn fixture() -> Fixture {
    let p1 = TestPredicate::new("predicate 1", PredicateKind::State);
    let p2 = TestPredicate::new("predicate 2", PredicateKind::State);
    let p3 = TestPredicate::new("predicate 3", PredicateKind::State);
    let e1 = TestPredicate::new("event 1", PredicateKind::Event);

    let a1 = TestAction::new("action 1");
    let a2 = TestAction::new("action 2");
    let broken = TestAction::broken("broken action");
    let restorable = TestAction::restorable("restorable action");

    let variables = Arc::new(VariableManager::new());
    let manager = RuleManager::new(
        vec![Arc::new(TestPredicateProvider {
            predicates: vec![p1.clone(), p2.clone(), p3.clone(), e1.clone()],
        })],
        vec![Arc::new(TestActionProvider {
            actions: vec![a1.clone(), a2.clone(), broken.clone(), restorable.clone()],
        })],
        variables.clone(),
    );

    Fixture {
        manager,
        variables,
        p1,
        p2,
        p3,
        e1,
        a1,
        a2,
        broken,
        restorable,
    }
}

fn config(rule_string: &str) -> RuleConfig {
    RuleConfig {
        name: "test rule".to_string(),
        rule_string: rule_string.to_string(),
        active: true,
    }
}

// Let listener tasks drain their notifications; on the paused clock this
// also advances past any timer due within the window.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(5)).await;
}

#[tokio::test(start_paused = true)]
async fn test_add_rule_binds_and_executes_once() {
    let f = fixture();
    f.manager
        .add_rule_by_string("r1", config("when predicate 1 then action 1"))
        .unwrap();

    let info = f.manager.get_rule_by_id("r1").await.unwrap();
    assert_eq!(info.predicate_ids, vec!["prd-r1-0"]);
    assert_eq!(info.action_ids, vec!["act-r1-0"]);
    assert_eq!(info.condition_token, "predicate 1");
    assert_eq!(info.actions_token, "action 1");

    f.p1.fire(true);
    settle().await;
    assert_eq!(f.a1.executions(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_condition_false_means_no_execution() {
    let f = fixture();
    f.manager
        .add_rule_by_string("r1", config("when predicate 1 then action 1"))
        .unwrap();

    f.p1.fire(false);
    settle().await;
    assert_eq!(f.a1.executions(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_remove_rule_detaches_listeners_and_handlers() {
    let f = fixture();
    f.manager
        .add_rule_by_string("r1", config("when predicate 1 then action 1"))
        .unwrap();

    f.manager.remove_rule("r1").await.unwrap();
    assert!(f.p1.is_destroyed());

    f.p1.fire(true);
    settle().await;
    assert_eq!(f.a1.executions(), 0);

    assert!(matches!(
        f.manager.remove_rule("r1").await,
        Err(RuleError::NotFound(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_rule_id_is_rejected() {
    let f = fixture();
    f.manager
        .add_rule_by_string("r1", config("when predicate 1 then action 1"))
        .unwrap();

    assert!(matches!(
        f.manager
            .add_rule_by_string("r1", config("when predicate 2 then action 2")),
        Err(RuleError::AlreadyExists(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_parse_error_reports_unmatched_fragment() {
    let f = fixture();
    let err = f
        .manager
        .add_rule_by_string("r1", config("when something odd then action 1"))
        .unwrap_err();

    match err {
        RuleError::Parse { errors, .. } => {
            assert!(errors[0].contains("something odd"), "{errors:?}");
        }
        other => panic!("expected parse error, got {other:?}"),
    }
    assert!(f.manager.get_rule_by_id("r1").await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_and_binds_tighter_than_or() {
    let f = fixture();
    f.manager
        .add_rule_by_string(
            "r1",
            config("when predicate 1 and predicate 2 or predicate 3 then action 1"),
        )
        .unwrap();

    // (p1 and p2) or p3 with only p3 true must fire.
    f.p3.fire(true);
    settle().await;
    assert_eq!(f.a1.executions(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_brackets_override_precedence() {
    let f = fixture();
    f.manager
        .add_rule_by_string(
            "r1",
            config("when predicate 1 and [ predicate 2 or predicate 3 ] then action 1"),
        )
        .unwrap();

    // p1 and (p2 or p3) with only p3 true must not fire.
    f.p3.fire(true);
    settle().await;
    assert_eq!(f.a1.executions(), 0);

    f.p1.fire(true);
    settle().await;
    assert_eq!(f.a1.executions(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_for_qualifier_delays_truth_until_held() {
    let f = fixture();
    f.manager
        .add_rule_by_string("r1", config("when predicate 1 for 1 second then action 1"))
        .unwrap();

    f.p1.fire(true);
    settle().await;
    // Held for only a few milliseconds: not yet achieved.
    assert_eq!(f.a1.executions(), 0);

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(f.a1.executions(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_for_qualifier_cancelled_by_early_flip() {
    let f = fixture();
    f.manager
        .add_rule_by_string("r1", config("when predicate 1 for 1 second then action 1"))
        .unwrap();

    f.p1.fire(true);
    tokio::time::sleep(Duration::from_millis(500)).await;
    f.p1.fire(false);
    tokio::time::sleep(Duration::from_millis(1000)).await;

    assert_eq!(f.a1.executions(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_for_duration_amount_from_variable() {
    let f = fixture();
    f.variables.set_variable_to_value("d", Value::number(2.0));
    f.manager
        .add_rule_by_string("r1", config("when predicate 1 for $d seconds then action 1"))
        .unwrap();

    f.p1.fire(true);
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(f.a1.executions(), 0);

    tokio::time::sleep(Duration::from_millis(700)).await;
    assert_eq!(f.a1.executions(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_after_delay_schedules_without_blocking() {
    let f = fixture();
    f.manager
        .add_rule_by_string(
            "r1",
            config("when predicate 1 then after 2 seconds action 1 and action 2"),
        )
        .unwrap();

    f.p1.fire(true);
    settle().await;
    // The delayed action is pending; the following one already ran.
    assert_eq!(f.a1.executions(), 0);
    assert_eq!(f.a2.executions(), 1);

    tokio::time::sleep(Duration::from_millis(2100)).await;
    assert_eq!(f.a1.executions(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_for_qualifier_schedules_auto_revert() {
    let f = fixture();
    f.manager
        .add_rule_by_string(
            "r1",
            config("when predicate 1 then restorable action for 1 second"),
        )
        .unwrap();

    f.p1.fire(true);
    settle().await;
    assert_eq!(f.restorable.executions(), 1);
    assert_eq!(f.restorable.restores(), 0);

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(f.restorable.restores(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_new_trigger_supersedes_pending_revert() {
    let f = fixture();
    f.manager
        .add_rule_by_string(
            "r1",
            config("when predicate 1 then restorable action for 1 second"),
        )
        .unwrap();

    f.p1.fire(true);
    tokio::time::sleep(Duration::from_millis(500)).await;
    f.p1.fire(true);
    settle().await;
    assert_eq!(f.restorable.executions(), 2);

    // Past the first deadline: the first revert was superseded.
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(f.restorable.restores(), 0);

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(f.restorable.restores(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_just_trigger_predicate_only_fires_on_its_own_change() {
    let f = fixture();
    f.manager
        .add_rule_by_string(
            "r1",
            config("when trigger: predicate 1 and predicate 2 then action 1"),
        )
        .unwrap();

    f.p2.set(true);
    f.p1.fire(true);
    settle().await;
    assert_eq!(f.a1.executions(), 1);

    // p1 still holds, but a p2 change must not fire the rule: the trigger
    // predicate contributes false unless it fired itself.
    f.p2.fire(true);
    settle().await;
    assert_eq!(f.a1.executions(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_event_predicate_fires_on_every_occurrence() {
    let f = fixture();
    f.manager
        .add_rule_by_string("r1", config("when event 1 then action 1"))
        .unwrap();

    f.e1.fire(true);
    settle().await;
    f.e1.fire(true);
    settle().await;
    assert_eq!(f.a1.executions(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_condition_marker_is_not_listened_to() {
    let f = fixture();
    f.manager
        .add_rule_by_string(
            "r1",
            config("when predicate 1 and condition: predicate 2 then action 1"),
        )
        .unwrap();

    f.p2.set(true);
    f.p1.fire(true);
    settle().await;
    assert_eq!(f.a1.executions(), 1);

    // A change of the condition-only predicate fires nothing.
    f.p2.fire(true);
    settle().await;
    assert_eq!(f.a1.executions(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failing_action_does_not_block_subsequent_actions() {
    let f = fixture();
    f.manager
        .add_rule_by_string("r1", config("when predicate 1 then broken action and action 1"))
        .unwrap();

    f.p1.fire(true);
    settle().await;
    assert_eq!(f.a1.executions(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_update_swaps_bound_set_atomically() {
    let f = fixture();
    f.manager
        .add_rule_by_string("r1", config("when predicate 1 then action 1"))
        .unwrap();

    f.manager
        .update_rule_by_string("r1", config("when predicate 2 then action 2"))
        .await
        .unwrap();
    assert!(f.p1.is_destroyed());

    f.p1.fire(true);
    settle().await;
    assert_eq!(f.a1.executions(), 0);

    f.p2.fire(true);
    settle().await;
    assert_eq!(f.a2.executions(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_update_leaves_previous_rule_untouched() {
    let f = fixture();
    f.manager
        .add_rule_by_string("r1", config("when predicate 1 then action 1"))
        .unwrap();

    assert!(matches!(
        f.manager
            .update_rule_by_string("r1", config("when gibberish then action 1"))
            .await,
        Err(RuleError::Parse { .. })
    ));

    f.p1.fire(true);
    settle().await;
    assert_eq!(f.a1.executions(), 1);

    let info = f.manager.get_rule_by_id("r1").await.unwrap();
    assert_eq!(info.rule_string, "when predicate 1 then action 1");
}

#[tokio::test(start_paused = true)]
async fn test_simulate_describes_without_side_effects() {
    let f = fixture();
    f.manager
        .add_rule_by_string("r1", config("when predicate 1 then action 1"))
        .unwrap();

    f.manager.execute_rule_actions("r1", true).await.unwrap();
    assert_eq!(f.a1.simulations(), 1);
    assert_eq!(f.a1.executions(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_inactive_rule_does_not_evaluate() {
    let f = fixture();
    f.manager
        .add_rule_by_string(
            "r1",
            RuleConfig {
                name: "dormant".to_string(),
                rule_string: "when predicate 1 then action 1".to_string(),
                active: false,
            },
        )
        .unwrap();

    f.p1.fire(true);
    settle().await;
    assert_eq!(f.a1.executions(), 0);

    f.manager.set_rule_active("r1", true).await.unwrap();
    f.p1.fire(true);
    settle().await;
    assert_eq!(f.a1.executions(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_rule_ids_are_sorted() {
    let f = fixture();
    f.manager
        .add_rule_by_string("zeta", config("when predicate 1 then action 1"))
        .unwrap();
    f.manager
        .add_rule_by_string("alpha", config("when predicate 2 then action 2"))
        .unwrap();

    assert_eq!(f.manager.get_rule_ids(), vec!["alpha", "zeta"]);
}

#[tokio::test(start_paused = true)]
async fn test_unrecognized_time_unit_is_not_a_qualifier() {
    let f = fixture();
    // "for 42 foo" is not a duration, so the text is not consumed as a
    // qualifier and parsing fails on the leftover fragment.
    let err = f
        .manager
        .add_rule_by_string("r1", config("when predicate 1 for 42 foo then action 1"))
        .unwrap_err();

    match err {
        RuleError::Parse { errors, .. } => {
            assert!(errors[0].contains("for 42 foo"), "{errors:?}");
        }
        other => panic!("expected parse error, got {other:?}"),
    }
}
