use std::collections::BTreeMap;

use modelsim::checks::ModelCheckers;
use modelsim::simulation::{
    ActionExecutor, ActionSelector, ClassCatalog, PendingAction, PrimedAssignment, StepExecutor,
};
use modelsim::{
    load_model_from_str, ExecutionError, SimRng, SimulationConfig, SimulationEngine, SimulationState,
    StepKind, TerminationReason, Value, ViolationType,
};

const ORDER: &str = r#"{"key": "orders", "domains": [{"key": "sales", "subdomains": [{"key": "core",
    "classes": [
        {"key": "Order",
         "attributes": [{"key": "amount", "default": "0"}],
         "states": [{"key": "Open"}, {"key": "Closed"}],
         "events": [{"key": "create"}, {"key": "close"}],
         "actions": [{"key": "DoClose", "guarantees": ["self.amount' = self.amount + 10"]}],
         "transitions": [
            {"to": "Open", "event": "create"},
            {"from": "Open", "to": "Closed", "event": "close", "action": "DoClose"}
         ]}
    ]}]}]}"#;

#[test]
fn order_create_then_close() {
    let model = load_model_from_str(ORDER).unwrap();
    let checkers = ModelCheckers::new(&model).unwrap();
    let catalog = ClassCatalog::build(&model);
    let steps = StepExecutor::new(ActionExecutor::new(&model, &checkers), &catalog);
    let mut state = SimulationState::new();
    let mut rng = SimRng::new(1);

    let created = steps
        .execute(
            &mut state,
            &mut rng,
            &PendingAction::Creation {
                class_key: "Order".to_string(),
                event: "create".to_string(),
                params: BTreeMap::new(),
                sources: Vec::new(),
            },
            1,
        )
        .unwrap();
    assert_eq!(created.kind, StepKind::Creation);
    assert_eq!(created.to_state.as_deref(), Some("Open"));
    let order = created.instance_id;
    assert_eq!(state.get(order).unwrap().get("amount"), Some(&Value::Int(0)));

    let closed = steps
        .execute(
            &mut state,
            &mut rng,
            &PendingAction::Event {
                class_key: "Order".to_string(),
                instance: order,
                event: "close".to_string(),
                params: BTreeMap::new(),
            },
            2,
        )
        .unwrap();
    assert_eq!(closed.kind, StepKind::Transition);
    assert_eq!(closed.from_state.as_deref(), Some("Open"));
    assert_eq!(closed.to_state.as_deref(), Some("Closed"));
    assert_eq!(
        closed.assignments,
        vec![PrimedAssignment {
            instance_id: order,
            class_key: "Order".to_string(),
            field: "amount".to_string(),
            value: Value::Int(10),
        }]
    );
    assert_eq!(closed.all_violations().count(), 0);
    assert_eq!(state.current_state(order), Some("Closed"));
    assert_eq!(state.get(order).unwrap().get("amount"), Some(&Value::Int(10)));
}

#[test]
fn closed_order_has_no_close_transition() {
    let model = load_model_from_str(ORDER).unwrap();
    let checkers = ModelCheckers::new(&model).unwrap();
    let catalog = ClassCatalog::build(&model);
    let steps = StepExecutor::new(ActionExecutor::new(&model, &checkers), &catalog);
    let mut state = SimulationState::new();
    let mut rng = SimRng::new(1);
    let create = PendingAction::Creation {
        class_key: "Order".to_string(),
        event: "create".to_string(),
        params: BTreeMap::new(),
        sources: Vec::new(),
    };
    let order = steps.execute(&mut state, &mut rng, &create, 1).unwrap().instance_id;
    let close = PendingAction::Event {
        class_key: "Order".to_string(),
        instance: order,
        event: "close".to_string(),
        params: BTreeMap::new(),
    };
    steps.execute(&mut state, &mut rng, &close, 2).unwrap();
    let before = state.clone();

    let err = steps.execute(&mut state, &mut rng, &close, 3).unwrap_err();
    assert!(matches!(err, ExecutionError::NoTransition { .. }));
    assert_eq!(state, before);
}

#[test]
fn order_run_closes_orders_without_violations() {
    let model = load_model_from_str(ORDER).unwrap();
    let result = SimulationEngine::new(&model, SimulationConfig::default().with_seed(3).with_max_steps(40))
        .unwrap()
        .run()
        .unwrap();
    assert_eq!(result.termination_reason, TerminationReason::MaxSteps);
    assert_eq!(result.steps_taken, 40);
    assert!(result
        .violations
        .iter()
        .all(|v| v.kind.is_liveness()));
    for instance in result.final_state.instances_of("Order") {
        let expected = if instance.state() == Some("Closed") { 10 } else { 0 };
        assert_eq!(instance.get("amount"), Some(&Value::Int(expected)));
    }
}

#[test]
fn class_without_creation_deadlocks_immediately() {
    let model = load_model_from_str(
        r#"{"domains": [{"key": "d", "subdomains": [{"key": "s", "classes": [
            {"key": "Lamp", "states": [{"key": "Off"}], "events": [{"key": "toggle"}],
             "transitions": [{"from": "Off", "to": "Off", "event": "toggle"}]}
        ]}]}]}"#,
    )
    .unwrap();

    let catalog = ClassCatalog::build(&model);
    let mut rng = SimRng::new(9);
    let err = ActionSelector::new(&catalog)
        .select(&SimulationState::new(), &mut rng)
        .unwrap_err();
    assert!(matches!(err, ExecutionError::Deadlock));

    let result = SimulationEngine::new(&model, SimulationConfig::default())
        .unwrap()
        .run()
        .unwrap();
    assert_eq!(result.termination_reason, TerminationReason::Deadlock);
    assert_eq!(result.steps_taken, 0);
    assert!(result.steps.is_empty());
    assert_eq!(
        result.violations_of(ViolationType::LivenessClass).count(),
        1
    );
}

#[test]
fn false_invariant_stops_the_run() {
    let model = load_model_from_str(
        r#"{"invariants": ["FALSE"], "domains": [{"key": "d", "subdomains": [{"key": "s", "classes": [
            {"key": "Counter", "states": [{"key": "On"}], "events": [{"key": "make"}],
             "transitions": [{"to": "On", "event": "make"}]}
        ]}]}]}"#,
    )
    .unwrap();
    let config = SimulationConfig::default()
        .with_max_steps(10)
        .with_stop_on_violation(true);
    let result = SimulationEngine::new(&model, config).unwrap().run().unwrap();

    assert_eq!(result.termination_reason, TerminationReason::Violation);
    assert!(result.steps_taken < 10);
    assert_eq!(result.steps_taken, result.steps.len());
    assert!(result.violations_of(ViolationType::ModelInvariant).count() >= 1);
}

#[test]
fn false_invariant_without_stop_runs_to_the_end() {
    let model = load_model_from_str(
        r#"{"invariants": ["FALSE"], "domains": [{"key": "d", "subdomains": [{"key": "s", "classes": [
            {"key": "Counter", "states": [{"key": "On"}], "events": [{"key": "make"}],
             "transitions": [{"to": "On", "event": "make"}]}
        ]}]}]}"#,
    )
    .unwrap();
    let result = SimulationEngine::new(&model, SimulationConfig::default().with_max_steps(5))
        .unwrap()
        .run()
        .unwrap();
    assert_eq!(result.termination_reason, TerminationReason::MaxSteps);
    assert_eq!(result.steps_taken, 5);
    assert!(result.has_violations());
}
