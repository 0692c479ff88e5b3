//! Action chains either commit every write or none.

use std::collections::BTreeMap;

use modelsim::checks::ModelCheckers;
use modelsim::simulation::{ActionExecutor, ClassCatalog, PendingAction, StepExecutor};
use modelsim::{load_model_from_str, ExecutionError, InstanceId, Model, SimRng, SimulationState, Value};

const LEDGER: &str = r#"{"domains": [{"key": "d", "subdomains": [{"key": "s", "classes": [
    {"key": "Ledger",
     "attributes": [{"key": "balance", "default": "0"}, {"key": "note"}, {"key": "audit", "default": "0"}],
     "states": [{"key": "Live"}],
     "events": [{"key": "open"}, {"key": "post"}, {"key": "stamp"}],
     "actions": [
        {"key": "Post", "guarantees": ["self.balance' = self.balance + 5 /\\ self.note' = \"posted\""]},
        {"key": "Stamp", "guarantees": ["self.note' = \"stamped\""], "calls": [{"action": "Audit"}]},
        {"key": "Audit", "guarantees": ["self.audit' = self.audit + 1"]},
        {"key": "Careful", "guarantees": ["self.note' = \"careful\""], "calls": [{"action": "Check"}]},
        {"key": "Check", "requires": ["self.balance > 100"]}
     ],
     "transitions": [
        {"to": "Live", "event": "open"},
        {"from": "Live", "to": "Live", "event": "post", "action": "Post"},
        {"from": "Live", "to": "Live", "event": "stamp", "action": "Stamp"}
     ]}
]}]}]}"#;

fn setup() -> (Model, ModelCheckers) {
    let model = load_model_from_str(LEDGER).unwrap();
    let checkers = ModelCheckers::new(&model).unwrap();
    (model, checkers)
}

fn ledger(state: &mut SimulationState, balance: i64) -> InstanceId {
    state.create_instance(
        "Ledger",
        [
            ("balance".to_string(), Value::Int(balance)),
            ("audit".to_string(), Value::Int(0)),
        ]
        .into_iter()
        .collect(),
    )
}

#[test]
fn reported_assignments_are_exactly_the_changes() {
    let (model, checkers) = setup();
    let executor = ActionExecutor::new(&model, &checkers);
    let mut state = SimulationState::new();
    let id = ledger(&mut state, 20);
    let before = state.get(id).unwrap().attributes.clone();

    let result = executor
        .execute_action(&mut state, "Ledger", "Post", id, BTreeMap::new())
        .unwrap();
    assert!(result.success);

    let after = &state.get(id).unwrap().attributes;
    let changed: BTreeMap<&str, &Value> = after
        .iter()
        .filter(|(key, value)| before.get(*key) != Some(*value))
        .map(|(key, value)| (key.as_str(), value))
        .collect();
    let reported: BTreeMap<&str, &Value> = result
        .primed_assignments
        .iter()
        .map(|a| (a.field.as_str(), &a.value))
        .collect();
    assert_eq!(changed, reported);
    assert_eq!(reported["balance"], &Value::Int(25));
    assert_eq!(reported["note"], &Value::from("posted"));
}

#[test]
fn reentrant_write_leaves_state_untouched() {
    let (model, checkers) = setup();
    let executor = ActionExecutor::new(&model, &checkers);
    let mut state = SimulationState::new();
    let id = ledger(&mut state, 1);
    let before = state.clone();

    let err = executor
        .execute_action(&mut state, "Ledger", "Stamp", id, BTreeMap::new())
        .unwrap_err();
    match err {
        ExecutionError::ReentrantWrite {
            instance,
            first_action,
            second_action,
        } => {
            assert_eq!(instance, id.get());
            assert!(first_action.ends_with("Stamp"));
            assert!(second_action.ends_with("Audit"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(state, before);
}

#[test]
fn failed_requires_deep_in_a_chain_discards_earlier_writes() {
    let (model, checkers) = setup();
    let executor = ActionExecutor::new(&model, &checkers);
    let mut state = SimulationState::new();
    let id = ledger(&mut state, 1);
    let before = state.clone();

    let err = executor
        .execute_action(&mut state, "Ledger", "Careful", id, BTreeMap::new())
        .unwrap_err();
    assert!(matches!(err, ExecutionError::RequiresFailed { .. }));
    assert_eq!(state, before);
}

#[test]
fn erroring_step_restores_the_state() {
    let (model, checkers) = setup();
    let catalog = ClassCatalog::build(&model);
    let steps = StepExecutor::new(ActionExecutor::new(&model, &checkers), &catalog);
    let mut state = SimulationState::new();
    let mut rng = SimRng::new(4);
    let id = ledger(&mut state, 0);
    let stamp = PendingAction::Event {
        class_key: "Ledger".to_string(),
        instance: id,
        event: "stamp".to_string(),
        params: BTreeMap::new(),
    };
    // No state yet, so the event has nowhere to go.
    let before = state.clone();
    let err = steps.execute(&mut state, &mut rng, &stamp, 1).unwrap_err();
    assert!(matches!(err, ExecutionError::NoTransition { .. }));
    assert_eq!(state, before);
}

#[test]
fn transition_with_reentrant_action_is_rolled_back() {
    let (model, checkers) = setup();
    let catalog = ClassCatalog::build(&model);
    let steps = StepExecutor::new(ActionExecutor::new(&model, &checkers), &catalog);
    let mut state = SimulationState::new();
    let mut rng = SimRng::new(4);
    let create = PendingAction::Creation {
        class_key: "Ledger".to_string(),
        event: "open".to_string(),
        params: BTreeMap::new(),
        sources: Vec::new(),
    };
    let id = steps.execute(&mut state, &mut rng, &create, 1).unwrap().instance_id;
    let before = state.clone();

    let stamp = PendingAction::Event {
        class_key: "Ledger".to_string(),
        instance: id,
        event: "stamp".to_string(),
        params: BTreeMap::new(),
    };
    let err = steps.execute(&mut state, &mut rng, &stamp, 2).unwrap_err();
    assert!(matches!(err, ExecutionError::ReentrantWrite { .. }));
    assert_eq!(state, before);
    assert_eq!(state.current_state(id), Some("Live"));
}
