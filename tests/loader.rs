use std::io::Write;

use modelsim::{load_model_from_path, ConfigError, SimulationConfig, SimulationEngine, TerminationReason};
use tempfile::NamedTempFile;

const TURNSTILE: &str = r#"{
    "key": "turnstile",
    "domains": [{"key": "transit", "subdomains": [{"key": "gates", "classes": [
        {"key": "Gate",
         "attributes": [{"key": "coins", "data_type": "[0 .. unconstrained)", "default": "0"}],
         "states": [{"key": "Locked"}, {"key": "Unlocked"}],
         "events": [{"key": "install"}, {"key": "coin"}, {"key": "push"}],
         "actions": [{"key": "Take", "guarantees": ["self.coins' = self.coins + 1"]}],
         "transitions": [
            {"to": "Locked", "event": "install"},
            {"from": "Locked", "to": "Unlocked", "event": "coin", "action": "Take"},
            {"from": "Unlocked", "to": "Locked", "event": "push"}
         ],
         "invariants": ["self.coins >= 0"]}
    ]}]}]
}"#;

fn write_model(json: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(json.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn model_file_loads_and_runs() {
    let file = write_model(TURNSTILE);
    let model = load_model_from_path(file.path()).unwrap();
    assert_eq!(model.key(), "turnstile");

    let result = SimulationEngine::new(&model, SimulationConfig::default().with_max_steps(50))
        .unwrap()
        .run()
        .unwrap();
    assert_eq!(result.termination_reason, TerminationReason::MaxSteps);
    assert!(result.violations.iter().all(|v| v.kind.is_liveness()));
}

#[test]
fn run_config_loads_from_json() {
    let config = SimulationConfig::from_json_str(r#"{"seed": 9, "stop_on_violation": true}"#).unwrap();
    assert_eq!(config.seed, 9);
    assert_eq!(config.max_steps, 100);
    assert!(config.stop_on_violation);
    assert!(SimulationConfig::from_json_str(r#"{"max_steps": 0}"#).is_err());
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_model_from_path(dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
}

#[test]
fn malformed_json_is_rejected() {
    let file = write_model("{ not json");
    let err = load_model_from_path(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Json { .. }));
}

#[test]
fn duplicate_class_keys_are_rejected() {
    let file = write_model(
        r#"{"domains": [{"key": "d", "subdomains": [
            {"key": "a", "classes": [{"key": "Gate"}]},
            {"key": "b", "classes": [{"key": "Gate"}]}
        ]}]}"#,
    );
    let err = load_model_from_path(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::DuplicateKey { kind: "class", .. }));
}

#[test]
fn unparsable_invariant_is_a_config_error() {
    let file = write_model(
        r#"{"invariants": ["1 +"], "domains": [{"key": "d", "subdomains": [{"key": "s", "classes": [
            {"key": "Gate", "states": [{"key": "Locked"}], "events": [{"key": "install"}],
             "transitions": [{"to": "Locked", "event": "install"}]}
        ]}]}]}"#,
    );
    let err = load_model_from_path(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidExpression { .. }));
}
