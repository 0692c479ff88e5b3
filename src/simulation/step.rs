//! One unit of simulated work.
//!
//! A step fires one creation event, one event on an existing instance, or
//! one `do` action. Everything the step causes (state actions, cascaded
//! creations, dispatched raised events) is recorded inside it as nested
//! steps, and cardinalities of every touched instance are checked once the
//! whole step has settled.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::debug;

use crate::checks::MultiplicityChecker;
use crate::error::ExecutionError;
use crate::model::ActionTiming;
use crate::value::Value;

use super::actions::{ActionExecutor, ActionResult};
use super::catalog::ClassCatalog;
use super::config::MAX_CASCADE_DEPTH;
use super::context::{PrimedAssignment, RaisedEvent};
use super::creation_chain::CreationChainHandler;
use super::selector::PendingAction;
use super::state_actions::StateActionExecutor;
use super::transitions::{CreationSource, TransitionResult};
use super::violation::merge_violations;
use super::{InstanceId, SimRng, SimulationState, Violation};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Creation,
    Transition,
    Deletion,
    DoAction,
}

impl StepKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Creation => "creation",
            Self::Transition => "transition",
            Self::Deletion => "deletion",
            Self::DoAction => "do_action",
        }
    }
}

/// A recorded step, with the steps it caused nested inside.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SimulationStep {
    pub number: usize,
    pub kind: StepKind,
    pub class_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    pub instance_id: InstanceId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_state: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, Value>,
    /// Parents the created instance was linked to.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<CreationSource>,
    /// Why a nested step ran, e.g. `cascade over places`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
    pub assignments: Vec<PrimedAssignment>,
    pub violations: Vec<Violation>,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub unlinked: BTreeSet<InstanceId>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub nested: Vec<SimulationStep>,
}

impl SimulationStep {
    fn from_transition(number: usize, params: BTreeMap<String, Value>, result: TransitionResult) -> Self {
        let kind = if result.was_creation {
            StepKind::Creation
        } else if result.was_deletion {
            StepKind::Deletion
        } else {
            StepKind::Transition
        };
        let assignments = result
            .action_result
            .map(|outcome| outcome.primed_assignments)
            .unwrap_or_default();
        Self {
            number,
            kind,
            class_key: result.class_key,
            event: Some(result.event),
            action: result.action,
            instance_id: result.instance_id,
            from_state: result.from_state,
            to_state: result.to_state,
            params,
            sources: Vec::new(),
            cause: None,
            assignments,
            violations: result.violations,
            unlinked: result.unlinked,
            nested: Vec::new(),
        }
    }

    fn absorb(&mut self, outcome: ActionResult) -> Vec<RaisedEvent> {
        self.assignments.extend(outcome.primed_assignments);
        merge_violations(&mut self.violations, outcome.violations);
        outcome.raised
    }

    /// This step and every nested step, depth first.
    pub fn walk(&self) -> Box<dyn Iterator<Item = &SimulationStep> + '_> {
        Box::new(std::iter::once(self).chain(self.nested.iter().flat_map(SimulationStep::walk)))
    }

    /// Violations of the whole step tree, in recording order.
    pub fn all_violations(&self) -> impl Iterator<Item = &Violation> {
        self.walk().flat_map(|s| s.violations.iter())
    }

    /// Primed assignments of the whole step tree.
    pub fn all_assignments(&self) -> impl Iterator<Item = &PrimedAssignment> {
        self.walk().flat_map(|s| s.assignments.iter())
    }

    /// Instances the step tree created, changed, deleted or unlinked.
    #[must_use]
    pub fn touched_instances(&self) -> BTreeSet<InstanceId> {
        let mut touched = BTreeSet::new();
        for step in self.walk() {
            touched.insert(step.instance_id);
            touched.extend(step.unlinked.iter().copied());
            touched.extend(step.assignments.iter().map(|a| a.instance_id));
            touched.extend(step.sources.iter().map(|s| s.parent));
        }
        touched
    }
}

/// Executes pending actions.
#[derive(Debug, Clone, Copy)]
pub struct StepExecutor<'m> {
    executor: ActionExecutor<'m>,
    catalog: &'m ClassCatalog,
}

impl<'m> StepExecutor<'m> {
    #[must_use]
    pub const fn new(executor: ActionExecutor<'m>, catalog: &'m ClassCatalog) -> Self {
        Self { executor, catalog }
    }

    #[must_use]
    pub const fn executor(&self) -> ActionExecutor<'m> {
        self.executor
    }

    #[must_use]
    pub const fn catalog(&self) -> &'m ClassCatalog {
        self.catalog
    }

    fn state_actions(&self) -> StateActionExecutor<'m> {
        StateActionExecutor::new(self.executor)
    }

    /// Runs one selected unit of work to completion.
    ///
    /// On error the state is restored to what it was before the step.
    pub fn execute(
        &self,
        state: &mut SimulationState,
        rng: &mut SimRng,
        pending: &PendingAction,
        number: usize,
    ) -> Result<SimulationStep, ExecutionError> {
        let before = state.clone();
        match self.execute_unchecked(state, rng, pending, number) {
            Ok(step) => Ok(step),
            Err(e) => {
                *state = before;
                Err(e)
            }
        }
    }

    fn execute_unchecked(
        &self,
        state: &mut SimulationState,
        rng: &mut SimRng,
        pending: &PendingAction,
        number: usize,
    ) -> Result<SimulationStep, ExecutionError> {
        let mut step = match pending {
            PendingAction::Creation {
                class_key,
                event,
                params,
                sources,
            } => self.create(state, rng, class_key, event, params.clone(), sources.clone(), number, 0)?,
            PendingAction::Event {
                class_key,
                instance,
                event,
                params,
            } => self.fire(state, rng, class_key, *instance, event, params.clone(), number, 0)?,
            PendingAction::DoAction {
                class_key,
                instance,
                action,
                params,
            } => self.run_do_action(state, rng, class_key, *instance, action, params.clone(), number)?,
        };

        let multiplicity = MultiplicityChecker::new(self.executor.model());
        let existing: Vec<Violation> = step.all_violations().cloned().collect();
        let fresh: Vec<Violation> = multiplicity
            .check_instances(state, step.touched_instances())
            .into_iter()
            .filter(|v| !existing.contains(v))
            .collect();
        merge_violations(&mut step.violations, fresh);

        debug!(
            number,
            kind = ?step.kind,
            class = %step.class_key,
            instance = %step.instance_id,
            nested = step.nested.len(),
            "step executed"
        );
        Ok(step)
    }

    /// Fires a creation event, then entry actions, the creation cascade and
    /// any raised events.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn create(
        &self,
        state: &mut SimulationState,
        rng: &mut SimRng,
        class_key: &str,
        event: &str,
        params: BTreeMap<String, Value>,
        sources: Vec<CreationSource>,
        number: usize,
        depth: usize,
    ) -> Result<SimulationStep, ExecutionError> {
        let mut result = self.executor.execute_transition(
            state,
            rng,
            class_key,
            event,
            None,
            params.clone(),
            &sources,
        )?;
        let mut raised = std::mem::take(&mut result.raised);
        let mut step = SimulationStep::from_transition(number, params, result);
        step.sources = sources;
        let id = step.instance_id;

        if let Some(to) = step.to_state.clone() {
            for outcome in self.state_actions().run(state, class_key, &to, id, ActionTiming::Entry)? {
                raised.extend(step.absorb(outcome));
            }
        }

        let cascaded = CreationChainHandler::new(self).handle(state, rng, class_key, id, number, depth)?;
        step.nested.extend(cascaded);
        step.nested
            .extend(self.dispatch_raised(state, rng, raised, number, depth)?);
        Ok(step)
    }

    /// Fires an event on a live instance: exit actions, the transition,
    /// entry actions, then any raised events.
    #[allow(clippy::too_many_arguments)]
    fn fire(
        &self,
        state: &mut SimulationState,
        rng: &mut SimRng,
        class_key: &str,
        instance: InstanceId,
        event: &str,
        params: BTreeMap<String, Value>,
        number: usize,
        depth: usize,
    ) -> Result<SimulationStep, ExecutionError> {
        let transition = self
            .executor
            .resolve_transition(state, class_key, event, Some(instance), &params)?;

        let mut exit_results = Vec::new();
        if let Some(from) = &transition.from {
            exit_results = self
                .state_actions()
                .run(state, class_key, from, instance, ActionTiming::Exit)?;
        }

        let mut result = self.executor.apply_transition(
            state,
            rng,
            class_key,
            transition,
            Some(instance),
            params.clone(),
            &[],
        )?;
        let transition_raised = std::mem::take(&mut result.raised);
        let mut step = SimulationStep::from_transition(number, params, result);

        // Exit effects come first in the record.
        let action_assignments = std::mem::take(&mut step.assignments);
        let mut raised = Vec::new();
        for outcome in exit_results {
            raised.extend(step.absorb(outcome));
        }
        step.assignments.extend(action_assignments);
        raised.extend(transition_raised);

        if let Some(to) = step.to_state.clone() {
            for outcome in self.state_actions().run(state, class_key, &to, instance, ActionTiming::Entry)? {
                raised.extend(step.absorb(outcome));
            }
        }

        step.nested
            .extend(self.dispatch_raised(state, rng, raised, number, depth)?);
        Ok(step)
    }

    #[allow(clippy::too_many_arguments)]
    fn run_do_action(
        &self,
        state: &mut SimulationState,
        rng: &mut SimRng,
        class_key: &str,
        instance: InstanceId,
        action: &str,
        params: BTreeMap<String, Value>,
        number: usize,
    ) -> Result<SimulationStep, ExecutionError> {
        let outcome = self
            .executor
            .execute_action(state, class_key, action, instance, params.clone())?;
        let current = state.current_state(instance).map(str::to_string);
        let mut step = SimulationStep {
            number,
            kind: StepKind::DoAction,
            class_key: class_key.to_string(),
            event: None,
            action: Some(action.to_string()),
            instance_id: instance,
            from_state: current.clone(),
            to_state: current,
            params,
            sources: Vec::new(),
            cause: None,
            assignments: Vec::new(),
            violations: Vec::new(),
            unlinked: BTreeSet::new(),
            nested: Vec::new(),
        };
        let raised = step.absorb(outcome);
        step.nested
            .extend(self.dispatch_raised(state, rng, raised, number, 0)?);
        Ok(step)
    }

    /// Fires raised events in order as nested steps. Events whose target no
    /// longer exists are dropped.
    fn dispatch_raised(
        &self,
        state: &mut SimulationState,
        rng: &mut SimRng,
        raised: Vec<RaisedEvent>,
        number: usize,
        depth: usize,
    ) -> Result<Vec<SimulationStep>, ExecutionError> {
        if raised.is_empty() {
            return Ok(Vec::new());
        }
        if depth >= MAX_CASCADE_DEPTH {
            return Err(ExecutionError::DepthExceeded {
                limit_type: "raised event",
                max_value: MAX_CASCADE_DEPTH,
            });
        }
        let mut steps = Vec::with_capacity(raised.len());
        for event in raised {
            if !state.contains(event.instance) {
                debug!(event = %event.event, instance = %event.instance, "raised event target is gone");
                continue;
            }
            let mut step = self.fire(
                state,
                rng,
                &event.class_key,
                event.instance,
                &event.event,
                event.params,
                number,
                depth + 1,
            )?;
            step.cause = Some(format!("raised by {}", event.raised_by));
            steps.push(step);
        }
        Ok(steps)
    }
}
