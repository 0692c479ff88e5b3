//! Association cardinality checks.

use crate::model::{Model, Multiplicity};
use crate::simulation::{InstanceId, SimulationState, Violation, ViolationType};

/// Compares an instance's link counts to the declared multiplicities of
/// every association it takes part in.
#[derive(Debug, Clone, Copy)]
pub struct MultiplicityChecker<'m> {
    model: &'m Model,
}

impl<'m> MultiplicityChecker<'m> {
    #[must_use]
    pub const fn new(model: &'m Model) -> Self {
        Self { model }
    }

    /// One violation per breached bound; deleted instances yield none.
    #[must_use]
    pub fn check_instance(&self, state: &SimulationState, id: InstanceId) -> Vec<Violation> {
        let Some(instance) = state.get(id) else {
            return Vec::new();
        };
        let class = instance.class_key.as_str();
        let mut violations = Vec::new();
        let mut report = |assoc: &str, end: &str, count: usize, bound: Multiplicity| {
            if !bound.admits(count) {
                violations.push(
                    Violation::new(
                        ViolationType::Multiplicity,
                        format!(
                            "{class} {id} has {count} {end} link(s) over '{assoc}', expected {bound}"
                        ),
                    )
                    .with_instance(id)
                    .with_class(class.to_string()),
                );
            }
        };
        for assoc in self.model.associations_of(class) {
            if assoc.from_class == class {
                let count = state.linked_from(&assoc.key, id).count();
                report(&assoc.key, "outgoing", count, assoc.to_multiplicity);
            }
            if assoc.to_class == class {
                let count = state.linked_to(&assoc.key, id).count();
                report(&assoc.key, "incoming", count, assoc.from_multiplicity);
            }
        }
        violations
    }

    pub fn check_instances<I>(&self, state: &SimulationState, ids: I) -> Vec<Violation>
    where
        I: IntoIterator<Item = InstanceId>,
    {
        ids.into_iter()
            .flat_map(|id| self.check_instance(state, id))
            .collect()
    }
}
