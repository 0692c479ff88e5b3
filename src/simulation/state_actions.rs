//! Entry and exit actions of states.

use std::collections::BTreeMap;

use tracing::trace;

use crate::error::ExecutionError;
use crate::model::ActionTiming;

use super::actions::{ActionExecutor, ActionResult};
use super::{InstanceId, SimulationState};

/// Runs the state-scoped actions bound to one timing.
#[derive(Debug, Clone, Copy)]
pub struct StateActionExecutor<'m> {
    executor: ActionExecutor<'m>,
}

impl<'m> StateActionExecutor<'m> {
    #[must_use]
    pub const fn new(executor: ActionExecutor<'m>) -> Self {
        Self { executor }
    }

    /// Runs every action of `state_key` whose timing is `when`, in declared
    /// order, each as its own committed chain.
    pub fn run(
        &self,
        state: &mut SimulationState,
        class_key: &str,
        state_key: &str,
        instance: InstanceId,
        when: ActionTiming,
    ) -> Result<Vec<ActionResult>, ExecutionError> {
        let class = self.executor.class(class_key)?;
        let declared = class
            .state(state_key)
            .ok_or_else(|| ExecutionError::not_found("state", format!("{class_key}/{state_key}")))?;

        let mut results = Vec::new();
        for state_action in declared.actions.iter().filter(|sa| sa.when == when) {
            if class.action(&state_action.action).is_none() {
                return Err(ExecutionError::not_found(
                    "action",
                    format!("{class_key}/{}", state_action.action),
                ));
            }
            trace!(class = class_key, state = state_key, action = %state_action.action, ?when, "state action");
            results.push(self.executor.execute_action(
                state,
                class_key,
                &state_action.action,
                instance,
                BTreeMap::new(),
            )?);
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::ModelCheckers;
    use crate::model::load_model_from_str;
    use crate::value::Value;

    const MODEL: &str = r#"{"domains": [{"key": "d", "subdomains": [{"key": "s",
        "classes": [
            {"key": "Lamp",
             "attributes": [{"key": "on"}, {"key": "count", "default": "0"}],
             "states": [
                {"key": "Lit", "actions": [
                    {"action": "Light", "when": "entry"},
                    {"action": "Count", "when": "exit"},
                    {"action": "Count", "when": "do"}
                ]},
                {"key": "Dark"}
             ],
             "actions": [
                {"key": "Light", "guarantees": ["self.on' = TRUE"]},
                {"key": "Count", "guarantees": ["self.count' = self.count + 1"]}
             ]}
        ]}]}]}"#;

    #[test]
    fn runs_only_matching_timing() {
        let model = load_model_from_str(MODEL).unwrap();
        let checkers = ModelCheckers::new(&model).unwrap();
        let runner = StateActionExecutor::new(ActionExecutor::new(&model, &checkers));
        let mut state = SimulationState::new();
        let id = state.create_instance(
            "Lamp",
            [("count".to_string(), Value::Int(0))].into_iter().collect(),
        );

        let entry = runner
            .run(&mut state, "Lamp", "Lit", id, ActionTiming::Entry)
            .unwrap();
        assert_eq!(entry.len(), 1);
        assert_eq!(state.get(id).unwrap().get("on"), Some(&Value::Bool(true)));
        assert_eq!(state.get(id).unwrap().get("count"), Some(&Value::Int(0)));

        runner
            .run(&mut state, "Lamp", "Lit", id, ActionTiming::Exit)
            .unwrap();
        assert_eq!(state.get(id).unwrap().get("count"), Some(&Value::Int(1)));

        let none = runner
            .run(&mut state, "Lamp", "Dark", id, ActionTiming::Entry)
            .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn unknown_state_is_an_error() {
        let model = load_model_from_str(MODEL).unwrap();
        let checkers = ModelCheckers::new(&model).unwrap();
        let runner = StateActionExecutor::new(ActionExecutor::new(&model, &checkers));
        let mut state = SimulationState::new();
        let id = state.create_instance("Lamp", BTreeMap::new());
        let err = runner
            .run(&mut state, "Lamp", "Blinking", id, ActionTiming::Entry)
            .unwrap_err();
        assert!(matches!(err, ExecutionError::NotFound { kind: "state", .. }));
    }
}
