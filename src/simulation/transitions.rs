//! State-machine transitions.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::{debug, trace};

use crate::error::ExecutionError;
use crate::model::{Class, Transition};
use crate::notation::Bindings;
use crate::value::Value;

use super::actions::{evaluate, ActionExecutor, ActionResult};
use super::config::INDEX_VALUE_ATTEMPTS;
use super::context::RaisedEvent;
use super::violation::merge_violations;
use super::{InstanceId, SimRng, SimulationState, StateView, Violation};

/// One parent a newly created instance is linked to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreationSource {
    pub association: String,
    pub parent: InstanceId,
}

/// Outcome of one transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransitionResult {
    pub class_key: String,
    pub event: String,
    pub instance_id: InstanceId,
    pub from_state: Option<String>,
    pub to_state: Option<String>,
    /// Action the transition ran, if any.
    pub action: Option<String>,
    pub was_creation: bool,
    pub was_deletion: bool,
    pub action_result: Option<ActionResult>,
    pub violations: Vec<Violation>,
    /// Former link partners of a deleted instance.
    #[serde(skip)]
    pub unlinked: BTreeSet<InstanceId>,
    #[serde(skip)]
    pub raised: Vec<RaisedEvent>,
}

impl<'m> ActionExecutor<'m> {
    /// Picks the one transition `event` fires on `instance` (or, with no
    /// instance, the one creation transition it fires).
    pub fn resolve_transition(
        &self,
        state: &SimulationState,
        class_key: &str,
        event: &str,
        instance: Option<InstanceId>,
        params: &BTreeMap<String, Value>,
    ) -> Result<&'m Transition, ExecutionError> {
        let class = self.class(class_key)?;
        let current = match instance {
            Some(id) => state.require(id)?.state().map(str::to_string),
            None => None,
        };
        let state_label = current.clone().unwrap_or_else(|| "(none)".to_string());

        let candidates: Vec<&'m Transition> = class
            .transitions
            .iter()
            .filter(|t| t.event == event && t.from == current)
            .collect();

        match candidates.as_slice() {
            [] => {
                return Err(ExecutionError::NoTransition {
                    class: class_key.to_string(),
                    event: event.to_string(),
                    state: state_label,
                })
            }
            [only] if only.guard.is_none() => return Ok(*only),
            _ => {}
        }

        let view = StateView::new(self.model(), state);
        let mut bindings = Bindings::new(&view).with_locals(params.clone());
        if let Some(id) = instance {
            bindings = bindings.with_self(id);
        }

        let mut enabled = Vec::new();
        for transition in candidates {
            let holds = match &transition.guard {
                None => true,
                Some(key) => {
                    let guard = class.guard(key).ok_or_else(|| {
                        ExecutionError::not_found("guard", format!("{class_key}/{key}"))
                    })?;
                    let value = evaluate(&guard.condition, &bindings)?;
                    trace!(guard = %key, %value, "guard evaluated");
                    value.as_bool() == Some(true)
                }
            };
            if holds {
                enabled.push(transition);
            }
        }

        match enabled.as_slice() {
            [] => Err(ExecutionError::GuardDeadlock {
                class: class_key.to_string(),
                event: event.to_string(),
                state: state_label,
            }),
            [chosen] => Ok(*chosen),
            several => Err(ExecutionError::NonDeterministicGuards {
                class: class_key.to_string(),
                event: event.to_string(),
                state: state_label,
                transitions: several.iter().map(|t| t.label()).collect(),
            }),
        }
    }

    /// Resolves and applies one transition.
    #[allow(clippy::too_many_arguments)]
    pub fn execute_transition(
        &self,
        state: &mut SimulationState,
        rng: &mut SimRng,
        class_key: &str,
        event: &str,
        instance: Option<InstanceId>,
        params: BTreeMap<String, Value>,
        sources: &[CreationSource],
    ) -> Result<TransitionResult, ExecutionError> {
        let transition = self.resolve_transition(state, class_key, event, instance, &params)?;
        self.apply_transition(state, rng, class_key, transition, instance, params, sources)
    }

    /// Applies an already resolved transition.
    ///
    /// A creation allocates the instance before running the transition's
    /// action; if that action fails the state is rolled back.
    #[allow(clippy::too_many_arguments)]
    pub fn apply_transition(
        &self,
        state: &mut SimulationState,
        rng: &mut SimRng,
        class_key: &str,
        transition: &Transition,
        instance: Option<InstanceId>,
        params: BTreeMap<String, Value>,
        sources: &[CreationSource],
    ) -> Result<TransitionResult, ExecutionError> {
        let class = self.class(class_key)?;
        let mut result = TransitionResult {
            class_key: class_key.to_string(),
            event: transition.event.clone(),
            instance_id: InstanceId::new(0),
            from_state: transition.from.clone(),
            to_state: transition.to.clone(),
            action: transition.action.clone(),
            was_creation: transition.is_creation(),
            was_deletion: transition.is_deletion(),
            action_result: None,
            violations: Vec::new(),
            unlinked: BTreeSet::new(),
            raised: Vec::new(),
        };

        if transition.is_creation() {
            let before = state.clone();
            if let Err(e) = self.create(state, rng, class, transition, &params, sources, &mut result) {
                *state = before;
                return Err(e);
            }
        } else {
            let id = instance.ok_or_else(|| {
                ExecutionError::not_found("instance", format!("target of {}", transition.label()))
            })?;
            result.instance_id = id;
            if transition.is_deletion() {
                let (_, partners) = state.delete_instance(id)?;
                result.unlinked = partners;
            } else {
                if let Some(action) = &transition.action {
                    let outcome = self.execute_action(state, class_key, action, id, params)?;
                    result.raised.clone_from(&outcome.raised);
                    merge_violations(&mut result.violations, outcome.violations.iter().cloned());
                    result.action_result = Some(outcome);
                }
                if let Some(to) = &transition.to {
                    state.set_state(id, to)?;
                }
            }
        }

        debug!(
            class = class_key,
            event = %transition.event,
            instance = %result.instance_id,
            from = ?result.from_state,
            to = ?result.to_state,
            "transition applied"
        );
        Ok(result)
    }

    #[allow(clippy::too_many_arguments)]
    fn create(
        &self,
        state: &mut SimulationState,
        rng: &mut SimRng,
        class: &Class,
        transition: &Transition,
        params: &BTreeMap<String, Value>,
        sources: &[CreationSource],
        result: &mut TransitionResult,
    ) -> Result<(), ExecutionError> {
        let attributes = self.initial_attributes(state, rng, class, params)?;
        let id = state.create_instance(&class.key, attributes);
        result.instance_id = id;
        if let Some(to) = &transition.to {
            state.set_state(id, to)?;
        }

        for source in sources {
            let assoc = self
                .model()
                .association(&source.association)
                .ok_or_else(|| ExecutionError::not_found("association", source.association.clone()))?;
            if assoc.to_class == class.key {
                state.add_link(&assoc.key, source.parent, id)?;
            } else {
                state.add_link(&assoc.key, id, source.parent)?;
            }
        }

        if let Some(action) = &transition.action {
            let outcome = self.execute_action(state, &class.key, action, id, params.clone())?;
            result.raised.clone_from(&outcome.raised);
            merge_violations(&mut result.violations, outcome.violations.iter().cloned());
            result.action_result = Some(outcome);
        }

        let checkers = self.checkers();
        merge_violations(&mut result.violations, checkers.data_types.check_instance(state, id));
        merge_violations(&mut result.violations, checkers.index_uniqueness.check(state));
        Ok(())
    }

    /// Attribute values of a new instance: a same-named parameter, else the
    /// declared default, else nothing (NIL). Indexed attributes not supplied
    /// by a parameter are drawn so the instance is unique on every index.
    fn initial_attributes(
        &self,
        state: &SimulationState,
        rng: &mut SimRng,
        class: &Class,
        params: &BTreeMap<String, Value>,
    ) -> Result<BTreeMap<String, Value>, ExecutionError> {
        let view = StateView::new(self.model(), state);
        let bindings = Bindings::new(&view).with_locals(params.clone());
        let mut attributes = BTreeMap::new();
        for attr in &class.attributes {
            let value = match (params.get(&attr.key), &attr.default) {
                (Some(value), _) => value.clone(),
                (None, Some(default)) => evaluate(default, &bindings)?,
                (None, None) => continue,
            };
            if !value.is_nil() {
                attributes.insert(attr.key.clone(), value);
            }
        }

        let checkers = self.checkers();
        let Some(indexes) = checkers.index_uniqueness.indexes_of(&class.key) else {
            return Ok(attributes);
        };
        let generated: BTreeSet<&str> = indexes
            .values()
            .flatten()
            .map(String::as_str)
            .filter(|attr| !params.contains_key(*attr))
            .filter(|attr| checkers.data_types.data_type(&class.key, attr).is_some())
            .collect();
        let index_safe = |candidate: &BTreeMap<String, Value>| {
            checkers.index_uniqueness.admits(state, &class.key, candidate)
        };

        for _ in 0..INDEX_VALUE_ATTEMPTS {
            let mut candidate = attributes.clone();
            for attr in &generated {
                if let Some(dt) = checkers.data_types.data_type(&class.key, attr) {
                    candidate.insert((*attr).to_string(), dt.sample(rng));
                }
            }
            if index_safe(&candidate) {
                return Ok(candidate);
            }
        }

        // Enumerate deterministically; one more value than there are
        // instances is always enough when the enumeration is long enough.
        let existing = state.instances_of(&class.key).count() as u64;
        for n in 0..=existing {
            let mut candidate = attributes.clone();
            let mut any = false;
            for attr in &generated {
                if let Some(value) = checkers
                    .data_types
                    .data_type(&class.key, attr)
                    .and_then(|dt| dt.nth_value(n))
                {
                    candidate.insert((*attr).to_string(), value);
                    any = true;
                }
            }
            if !any {
                break;
            }
            if index_safe(&candidate) {
                trace!(class = %class.key, n, "index values from enumeration");
                return Ok(candidate);
            }
        }

        Err(ExecutionError::IndexValuesExhausted {
            class: class.key.clone(),
            attempts: INDEX_VALUE_ATTEMPTS,
        })
    }
}
