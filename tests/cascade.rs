//! Mandatory associations are populated when their source is created.

use modelsim::{
    load_model_from_str, ExecutionError, Model, SimError, SimulationConfig, SimulationEngine, StepKind,
    TerminationReason, ViolationType,
};

fn bank(card_transitions: &str) -> Model {
    load_model_from_str(&format!(
        r#"{{"domains": [{{"key": "bank", "subdomains": [{{"key": "retail",
            "classes": [
                {{"key": "Customer", "states": [{{"key": "Active"}}],
                 "events": [{{"key": "join"}}],
                 "transitions": [{{"to": "Active", "event": "join"}}]}},
                {{"key": "Account", "attributes": [{{"key": "balance"}}],
                 "states": [{{"key": "Open"}}],
                 "events": [{{"key": "open"}}],
                 "actions": [{{"key": "Init", "guarantees": ["self.balance' = 0"]}}],
                 "transitions": [{{"to": "Open", "event": "open", "action": "Init"}}]}},
                {{"key": "Card", "states": [{{"key": "Issued"}}],
                 "events": [{{"key": "issue"}}],
                 "transitions": [{card_transitions}]}}
            ],
            "associations": [
                {{"key": "holds", "from": "Customer", "to": "Account",
                 "from_multiplicity": "1", "to_multiplicity": "1..*"}},
                {{"key": "carries", "from": "Account", "to": "Card",
                 "from_multiplicity": "1", "to_multiplicity": "2"}}
            ]}}]}}]}}"#
    ))
    .unwrap()
}

#[test]
fn every_customer_gets_accounts_and_cards() {
    let model = bank(r#"{"to": "Issued", "event": "issue"}"#);
    let config = SimulationConfig::default().with_seed(21).with_max_steps(15);
    let result = SimulationEngine::new(&model, config).unwrap().run().unwrap();
    assert_eq!(result.termination_reason, TerminationReason::MaxSteps);

    let state = &result.final_state;
    let customers: Vec<_> = state.instances_of("Customer").map(|c| c.id).collect();
    assert!(!customers.is_empty());
    for customer in customers {
        let accounts: Vec<_> = state.linked_from("holds", customer).collect();
        assert!(!accounts.is_empty());
        for account in accounts {
            assert_eq!(state.linked_from("carries", account).count(), 2);
        }
    }

    // Accounts and cards only ever appear inside a customer's creation.
    for step in &result.steps {
        assert_eq!(step.class_key, "Customer");
        if step.kind == StepKind::Creation {
            assert_eq!(step.nested.len(), 1);
            assert_eq!(step.nested[0].class_key, "Account");
            assert_eq!(step.nested[0].nested.len(), 2);
            assert!(step.nested[0]
                .nested
                .iter()
                .all(|card| card.cause.as_deref() == Some("cascade over carries")));
        }
    }
    assert!(result
        .violations
        .iter()
        .all(|v| v.kind.is_liveness()));
}

#[test]
fn liveness_counts_cascaded_steps() {
    let model = bank(r#"{"to": "Issued", "event": "issue"}"#);
    let config = SimulationConfig::default().with_seed(8).with_max_steps(5);
    let result = SimulationEngine::new(&model, config).unwrap().run().unwrap();

    // Only customers are top level; accounts and cards live in nested steps.
    assert!(result.steps.iter().all(|s| s.class_key == "Customer"));
    let nested: Vec<&str> = result
        .steps
        .iter()
        .flat_map(|s| s.walk().skip(1))
        .map(|s| s.class_key.as_str())
        .collect();
    assert!(nested.contains(&"Account"));
    assert!(nested.contains(&"Card"));
    assert!(result
        .steps
        .iter()
        .flat_map(|s| s.all_assignments())
        .any(|a| a.class_key == "Account" && a.field == "balance"));

    assert_eq!(result.violations_of(ViolationType::LivenessClass).count(), 0);
    assert_eq!(result.violations_of(ViolationType::LivenessAttribute).count(), 0);
    assert_eq!(result.violations_of(ViolationType::LivenessAssociation).count(), 0);
}

#[test]
fn creation_links_every_mandatory_parent() {
    let model = load_model_from_str(
        r#"{"domains": [{"key": "campus", "subdomains": [{"key": "rooms",
            "classes": [
                {"key": "Student", "states": [{"key": "Enrolled"}],
                 "events": [{"key": "admit"}],
                 "transitions": [{"to": "Enrolled", "event": "admit"}]},
                {"key": "Course", "states": [{"key": "Running"}],
                 "events": [{"key": "schedule"}],
                 "transitions": [{"to": "Running", "event": "schedule"}]},
                {"key": "Seat", "states": [{"key": "Taken"}],
                 "events": [{"key": "book"}],
                 "transitions": [{"to": "Taken", "event": "book"}]}
            ],
            "associations": [
                {"key": "occupies", "from": "Student", "to": "Seat",
                 "from_multiplicity": "1", "to_multiplicity": "0..*"},
                {"key": "offers", "from": "Course", "to": "Seat",
                 "from_multiplicity": "1", "to_multiplicity": "0..*"}
            ]}]}]}"#,
    )
    .unwrap();
    let config = SimulationConfig::default().with_seed(17).with_max_steps(60);
    let result = SimulationEngine::new(&model, config).unwrap().run().unwrap();

    let state = &result.final_state;
    let seats: Vec<_> = state.instances_of("Seat").map(|s| s.id).collect();
    assert!(!seats.is_empty());
    for seat in seats {
        assert_eq!(state.linked_to("occupies", seat).count(), 1);
        assert_eq!(state.linked_to("offers", seat).count(), 1);
    }
    for step in result.steps.iter().filter(|s| s.class_key == "Seat") {
        assert_eq!(step.sources.len(), 2);
    }
    assert_eq!(result.violations_of(ViolationType::Multiplicity).count(), 0);
}

#[test]
fn target_without_creation_transition_is_an_error() {
    let model = bank("");
    let err = SimulationEngine::new(&model, SimulationConfig::default())
        .unwrap()
        .run()
        .unwrap_err();
    match err {
        SimError::Execution(ExecutionError::NoCreationPath { class, association }) => {
            assert_eq!(class, "Card");
            assert_eq!(association, "carries");
        }
        other => panic!("unexpected error: {other}"),
    }
}
