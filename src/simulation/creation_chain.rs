//! Cascading creation over mandatory associations.

use tracing::debug;

use crate::error::ExecutionError;

use super::catalog::draw_params;
use super::config::MAX_CASCADE_DEPTH;
use super::step::{SimulationStep, StepExecutor};
use super::transitions::CreationSource;
use super::{InstanceId, SimRng, SimulationState};

/// Populates the mandatory `to` ends of a freshly created instance.
///
/// For every association whose `to` multiplicity has a lower bound of `k`,
/// the target class's first creation event is fired until `k` partners are
/// linked. Each created partner runs its own cascade in turn.
pub struct CreationChainHandler<'a, 'm> {
    steps: &'a StepExecutor<'m>,
}

impl<'a, 'm> CreationChainHandler<'a, 'm> {
    #[must_use]
    pub const fn new(steps: &'a StepExecutor<'m>) -> Self {
        Self { steps }
    }

    /// Returns one nested creation step per partner created.
    pub fn handle(
        &self,
        state: &mut SimulationState,
        rng: &mut SimRng,
        class_key: &str,
        instance: InstanceId,
        number: usize,
        depth: usize,
    ) -> Result<Vec<SimulationStep>, ExecutionError> {
        let model = self.steps.executor().model();
        let catalog = self.steps.catalog();
        let mut created = Vec::new();

        for assoc in model
            .associations_of(class_key)
            .filter(|a| a.from_class == class_key && a.to_multiplicity.is_mandatory())
        {
            let linked = state.linked_from(&assoc.key, instance).count();
            let needed = (assoc.to_multiplicity.lower as usize).saturating_sub(linked);
            if needed == 0 {
                continue;
            }
            if depth >= MAX_CASCADE_DEPTH {
                return Err(ExecutionError::DepthExceeded {
                    limit_type: "creation cascade",
                    max_value: MAX_CASCADE_DEPTH,
                });
            }
            let group = catalog
                .first_creation_event(&assoc.to_class)
                .ok_or_else(|| ExecutionError::NoCreationPath {
                    class: assoc.to_class.clone(),
                    association: assoc.key.clone(),
                })?;

            debug!(
                association = %assoc.key,
                parent = %instance,
                target = %assoc.to_class,
                needed,
                depth,
                "creation cascade"
            );
            for _ in 0..needed {
                let params = draw_params(&group.params, rng);
                let source = CreationSource {
                    association: assoc.key.clone(),
                    parent: instance,
                };
                let mut step = self.steps.create(
                    state,
                    rng,
                    &assoc.to_class,
                    &group.event,
                    params,
                    vec![source],
                    number,
                    depth + 1,
                )?;
                step.cause = Some(format!("cascade over {}", assoc.key));
                created.push(step);
            }
        }
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::ModelCheckers;
    use crate::model::{load_model_from_str, Model};
    use crate::simulation::{ActionExecutor, ClassCatalog, PendingAction, StepKind};
    use std::collections::BTreeMap;

    fn model(target_transitions: &str) -> Model {
        load_model_from_str(&format!(
            r#"{{"domains": [{{"key": "d", "subdomains": [{{"key": "s",
                "classes": [
                    {{"key": "Customer", "states": [{{"key": "Active"}}],
                     "events": [{{"key": "join"}}],
                     "transitions": [{{"to": "Active", "event": "join"}}]}},
                    {{"key": "Account", "states": [{{"key": "Open"}}],
                     "events": [{{"key": "open"}}],
                     "transitions": [{target_transitions}]}},
                    {{"key": "Card", "states": [{{"key": "Issued"}}],
                     "events": [{{"key": "issue"}}],
                     "transitions": [{{"to": "Issued", "event": "issue"}}]}}
                ],
                "associations": [
                    {{"key": "holds", "from": "Customer", "to": "Account",
                     "from_multiplicity": "1", "to_multiplicity": "2..*"}},
                    {{"key": "carries", "from": "Account", "to": "Card",
                     "from_multiplicity": "1", "to_multiplicity": "1"}}
                ]}}]}}]}}"#
        ))
        .unwrap()
    }

    fn join(model: &Model) -> Result<(SimulationState, SimulationStep), ExecutionError> {
        let checkers = ModelCheckers::new(model).unwrap();
        let catalog = ClassCatalog::build(model);
        let steps = StepExecutor::new(ActionExecutor::new(model, &checkers), &catalog);
        let mut state = SimulationState::new();
        let mut rng = SimRng::new(5);
        let pending = PendingAction::Creation {
            class_key: "Customer".to_string(),
            event: "join".to_string(),
            params: BTreeMap::new(),
            sources: Vec::new(),
        };
        let step = steps.execute(&mut state, &mut rng, &pending, 1)?;
        Ok((state, step))
    }

    #[test]
    fn cascade_creates_and_links_lower_bound() {
        let model = model(r#"{"to": "Open", "event": "open"}"#);
        let (state, step) = join(&model).unwrap();
        let customer = step.instance_id;
        assert_eq!(state.linked_from("holds", customer).count(), 2);
        assert_eq!(state.instances_of("Card").count(), 2);
        for account in state.linked_from("holds", customer) {
            assert_eq!(state.linked_from("carries", account).count(), 1);
        }
        assert_eq!(step.nested.len(), 2);
        assert!(step.nested.iter().all(|s| s.kind == StepKind::Creation));
        assert_eq!(step.nested[0].cause.as_deref(), Some("cascade over holds"));
        assert_eq!(step.nested[0].nested.len(), 1);
        assert_eq!(step.all_violations().count(), 0);
    }

    #[test]
    fn missing_creation_transition_is_an_error() {
        let model = model("");
        let err = join(&model).unwrap_err();
        match err {
            ExecutionError::NoCreationPath { class, association } => {
                assert_eq!(class, "Account");
                assert_eq!(association, "holds");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
