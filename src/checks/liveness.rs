//! Post-run coverage analysis.

use std::collections::BTreeSet;

use crate::model::Model;
use crate::simulation::{ClassCatalog, SimulationState, SimulationStep, StepKind, Violation, ViolationType};

/// Reports model elements a run never exercised.
///
/// Works purely over the recorded steps (nested steps included) and the
/// final links; it never touches the state.
#[derive(Debug, Clone)]
pub struct LivenessChecker {
    classes: Vec<String>,
    attributes: Vec<(String, String)>,
    associations: Vec<String>,
}

impl LivenessChecker {
    #[must_use]
    pub fn new(model: &Model, catalog: &ClassCatalog) -> Self {
        let classes: Vec<String> = catalog.classes().map(|c| c.key.clone()).collect();
        let attributes = classes
            .iter()
            .filter_map(|key| model.class(key))
            .flat_map(|class| {
                class
                    .attributes
                    .iter()
                    .filter(|a| !a.derived)
                    .map(move |a| (class.key.clone(), a.key.clone()))
            })
            .collect();
        let associations = catalog.associations().iter().map(|a| a.key.clone()).collect();
        Self {
            classes,
            attributes,
            associations,
        }
    }

    #[must_use]
    pub fn check(&self, steps: &[SimulationStep], final_state: &SimulationState) -> Vec<Violation> {
        let mut created = BTreeSet::new();
        let mut written = BTreeSet::new();
        for step in steps.iter().flat_map(SimulationStep::walk) {
            if step.kind == StepKind::Creation {
                created.insert(step.class_key.as_str());
            }
            for assignment in &step.assignments {
                written.insert((assignment.class_key.as_str(), assignment.field.as_str()));
            }
        }

        let mut violations = Vec::new();
        for class in &self.classes {
            if !created.contains(class.as_str()) {
                violations.push(
                    Violation::new(
                        ViolationType::LivenessClass,
                        format!("class {class} was never instantiated"),
                    )
                    .with_class(class.clone()),
                );
            }
        }
        for (class, attribute) in &self.attributes {
            if !written.contains(&(class.as_str(), attribute.as_str())) {
                violations.push(
                    Violation::new(
                        ViolationType::LivenessAttribute,
                        format!("attribute {class}.{attribute} was never written"),
                    )
                    .with_class(class.clone()),
                );
            }
        }
        for association in &self.associations {
            if !final_state.has_links(association) {
                violations.push(Violation::new(
                    ViolationType::LivenessAssociation,
                    format!("association {association} has no links at the end of the run"),
                ));
            }
        }
        violations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::ModelCheckers;
    use crate::model::load_model_from_str;
    use crate::simulation::{ActionExecutor, PendingAction, SimRng, StepExecutor};
    use std::collections::BTreeMap;

    const MODEL: &str = r#"{"domains": [{"key": "d", "subdomains": [{"key": "s",
        "classes": [
            {"key": "Team", "attributes": [{"key": "name"}, {"key": "size", "derived": true}],
             "states": [{"key": "Active"}],
             "events": [{"key": "form"}],
             "actions": [{"key": "Name", "guarantees": ["self.name' = \"x\""]}],
             "transitions": [{"to": "Active", "event": "form", "action": "Name"}]},
            {"key": "Player", "attributes": [{"key": "rating"}],
             "states": [{"key": "Fit"}],
             "events": [{"key": "sign"}],
             "transitions": [{"to": "Fit", "event": "sign"}]}
        ],
        "associations": [{"key": "roster", "from": "Team", "to": "Player"}]}]}]}"#;

    #[test]
    fn reports_unexercised_elements() {
        let model = load_model_from_str(MODEL).unwrap();
        let catalog = ClassCatalog::build(&model);
        let checkers = ModelCheckers::new(&model).unwrap();
        let steps = StepExecutor::new(ActionExecutor::new(&model, &checkers), &catalog);
        let mut state = SimulationState::new();
        let mut rng = SimRng::new(1);
        let pending = PendingAction::Creation {
            class_key: "Team".to_string(),
            event: "form".to_string(),
            params: BTreeMap::new(),
            sources: Vec::new(),
        };
        let step = steps.execute(&mut state, &mut rng, &pending, 1).unwrap();

        let violations = LivenessChecker::new(&model, &catalog).check(&[step], &state);
        let kinds: Vec<(ViolationType, Option<&str>)> = violations
            .iter()
            .map(|v| (v.kind, v.class_key.as_deref()))
            .collect();
        assert_eq!(
            kinds,
            vec![
                (ViolationType::LivenessClass, Some("Player")),
                (ViolationType::LivenessAttribute, Some("Player")),
                (ViolationType::LivenessAssociation, None),
            ]
        );
    }

    #[test]
    fn empty_trace_reports_everything() {
        let model = load_model_from_str(MODEL).unwrap();
        let catalog = ClassCatalog::build(&model);
        let violations = LivenessChecker::new(&model, &catalog).check(&[], &SimulationState::new());
        // Two classes, two non-derived attributes, one association.
        assert_eq!(violations.len(), 5);
        assert!(violations.iter().all(|v| v.kind.is_liveness()));
    }
}
