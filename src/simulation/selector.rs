//! Random choice of the next unit of work.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::trace;

use crate::error::ExecutionError;
use crate::value::Value;

use super::catalog::{draw_params, CatalogAssociation, CatalogClass, ClassCatalog, DoAction, EventGroup};
use super::transitions::CreationSource;
use super::{InstanceId, SimRng, SimulationState};

/// A unit of work chosen by the selector, with its parameters drawn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PendingAction {
    Creation {
        class_key: String,
        event: String,
        params: BTreeMap<String, Value>,
        /// One parent per mandatory inbound association.
        sources: Vec<CreationSource>,
    },
    Event {
        class_key: String,
        instance: InstanceId,
        event: String,
        params: BTreeMap<String, Value>,
    },
    DoAction {
        class_key: String,
        instance: InstanceId,
        action: String,
        params: BTreeMap<String, Value>,
    },
}

impl PendingAction {
    #[must_use]
    pub fn class_key(&self) -> &str {
        match self {
            Self::Creation { class_key, .. }
            | Self::Event { class_key, .. }
            | Self::DoAction { class_key, .. } => class_key,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Candidate<'c> {
    Creation {
        class: &'c CatalogClass,
        group: &'c EventGroup,
    },
    Event {
        class: &'c CatalogClass,
        instance: InstanceId,
        group: &'c EventGroup,
    },
    DoAction {
        class: &'c CatalogClass,
        instance: InstanceId,
        action: &'c DoAction,
    },
}

/// Chooses uniformly among everything that can fire from the outside.
#[derive(Debug, Clone, Copy)]
pub struct ActionSelector<'m> {
    catalog: &'m ClassCatalog,
}

impl<'m> ActionSelector<'m> {
    #[must_use]
    pub const fn new(catalog: &'m ClassCatalog) -> Self {
        Self { catalog }
    }

    /// Parents a new instance of `class` may be linked to, per mandatory
    /// inbound association. Empty when the class needs no parent.
    fn eligible_parents(
        &self,
        state: &SimulationState,
        class: &CatalogClass,
    ) -> Vec<(&'m CatalogAssociation, Vec<InstanceId>)> {
        class
            .required_parents
            .iter()
            .filter_map(|key| self.catalog.association(key))
            .map(|assoc| {
                let parents = state
                    .instances_of(&assoc.from_class)
                    .map(|parent| parent.id)
                    .filter(|parent| {
                        assoc.to_bounds.is_unbounded()
                            || state.linked_from(&assoc.key, *parent).count() < assoc.to_bounds.upper as usize
                    })
                    .collect();
                (assoc, parents)
            })
            .collect()
    }

    fn candidates(&self, state: &SimulationState) -> Vec<Candidate<'m>> {
        let mut candidates = Vec::new();
        for class in self.catalog.classes() {
            if class.cascade_created {
                continue;
            }
            if self
                .eligible_parents(state, class)
                .iter()
                .any(|(_, parents)| parents.is_empty())
            {
                continue;
            }
            candidates.extend(
                class
                    .creation_events
                    .iter()
                    .filter(|g| g.external)
                    .map(|group| Candidate::Creation { class, group }),
            );
        }

        for instance in state.instances() {
            let Some(class) = self.catalog.class(&instance.class_key) else {
                continue;
            };
            let Some(current) = instance.state() else {
                continue;
            };
            if let Some(groups) = class.state_events.get(current) {
                candidates.extend(groups.iter().filter(|g| g.external).map(|group| {
                    Candidate::Event {
                        class,
                        instance: instance.id,
                        group,
                    }
                }));
            }
            if let Some(actions) = class.do_actions.get(current) {
                candidates.extend(actions.iter().filter(|a| a.external).map(|action| {
                    Candidate::DoAction {
                        class,
                        instance: instance.id,
                        action,
                    }
                }));
            }
        }
        candidates
    }

    /// Picks one candidate and draws its parameters.
    ///
    /// Returns [`ExecutionError::Deadlock`] when nothing can fire.
    pub fn select(&self, state: &SimulationState, rng: &mut SimRng) -> Result<PendingAction, ExecutionError> {
        let candidates = self.candidates(state);
        trace!(candidates = candidates.len(), "selecting action");
        let chosen = *rng.choose(&candidates).ok_or(ExecutionError::Deadlock)?;

        let pending = match chosen {
            Candidate::Creation { class, group } => {
                let mut sources = Vec::new();
                for (assoc, parents) in self.eligible_parents(state, class) {
                    let parent = *rng.choose(&parents).ok_or(ExecutionError::Deadlock)?;
                    sources.push(CreationSource {
                        association: assoc.key.clone(),
                        parent,
                    });
                }
                PendingAction::Creation {
                    class_key: class.key.clone(),
                    event: group.event.clone(),
                    params: draw_params(&group.params, rng),
                    sources,
                }
            }
            Candidate::Event {
                class,
                instance,
                group,
            } => PendingAction::Event {
                class_key: class.key.clone(),
                instance,
                event: group.event.clone(),
                params: draw_params(&group.params, rng),
            },
            Candidate::DoAction {
                class,
                instance,
                action,
            } => PendingAction::DoAction {
                class_key: class.key.clone(),
                instance,
                action: action.action.clone(),
                params: draw_params(&action.params, rng),
            },
        };
        Ok(pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::load_model_from_str;

    const MODEL: &str = r#"{"domains": [{"key": "d", "subdomains": [{"key": "s",
        "classes": [
            {"key": "Shop", "states": [{"key": "Open"}],
             "events": [{"key": "found"}],
             "transitions": [{"to": "Open", "event": "found"}]},
            {"key": "Sale", "states": [{"key": "Pending", "actions": [{"action": "Tally", "when": "do"}]}, {"key": "Done"}],
             "events": [{"key": "ring", "params": [{"name": "n", "data_type": "[1 .. 9]"}]}, {"key": "finish"}, {"key": "audit", "senders": ["Shop"]}],
             "actions": [{"key": "Tally"}],
             "transitions": [
                {"to": "Pending", "event": "ring"},
                {"from": "Pending", "to": "Done", "event": "finish"},
                {"from": "Pending", "to": "Pending", "event": "audit"}
             ]}
        ],
        "associations": [{"key": "sells", "from": "Shop", "to": "Sale",
            "from_multiplicity": "1", "to_multiplicity": "0..2"}]}]}]}"#;

    #[test]
    fn empty_catalog_deadlocks() {
        let catalog = ClassCatalog::default();
        let selector = ActionSelector::new(&catalog);
        let mut rng = SimRng::new(1);
        let err = selector.select(&SimulationState::new(), &mut rng).unwrap_err();
        assert!(matches!(err, ExecutionError::Deadlock));
    }

    #[test]
    fn children_wait_for_a_parent() {
        let catalog = ClassCatalog::build(&load_model_from_str(MODEL).unwrap());
        let selector = ActionSelector::new(&catalog);
        let mut state = SimulationState::new();
        assert_eq!(selector.candidates(&state).len(), 1);

        let shop = state.create_instance("Shop", BTreeMap::new());
        state.set_state(shop, "Open").unwrap();
        assert_eq!(selector.candidates(&state).len(), 2);

        let mut rng = SimRng::new(2);
        let mut saw_sale = false;
        for _ in 0..50 {
            if let PendingAction::Creation { class_key, sources, params, .. } = selector.select(&state, &mut rng).unwrap() {
                if class_key == "Sale" {
                    saw_sale = true;
                    assert_eq!(sources.len(), 1);
                    assert_eq!(sources[0].association, "sells");
                    assert_eq!(sources[0].parent, shop);
                    assert!(params["n"].as_int().is_some());
                }
            }
        }
        assert!(saw_sale);
    }

    #[test]
    fn full_parents_are_not_offered() {
        let catalog = ClassCatalog::build(&load_model_from_str(MODEL).unwrap());
        let selector = ActionSelector::new(&catalog);
        let mut state = SimulationState::new();
        let shop = state.create_instance("Shop", BTreeMap::new());
        state.set_state(shop, "Open").unwrap();
        for _ in 0..2 {
            let sale = state.create_instance("Sale", BTreeMap::new());
            state.add_link("sells", shop, sale).unwrap();
        }
        // Shop creation only; the two sales have no state yet.
        assert_eq!(selector.candidates(&state).len(), 1);
    }

    #[test]
    fn internal_events_are_never_offered() {
        let catalog = ClassCatalog::build(&load_model_from_str(MODEL).unwrap());
        let selector = ActionSelector::new(&catalog);
        let mut state = SimulationState::new();
        let sale = state.create_instance("Sale", BTreeMap::new());
        state.set_state(sale, "Pending").unwrap();
        // found, finish and the Tally do action; ring waits for a shop, audit is internal.
        assert_eq!(selector.candidates(&state).len(), 3);
    }

    #[test]
    fn every_mandatory_parent_is_chosen() {
        let model = load_model_from_str(
            r#"{"domains": [{"key": "d", "subdomains": [{"key": "s",
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
        let catalog = ClassCatalog::build(&model);
        let selector = ActionSelector::new(&catalog);
        let mut state = SimulationState::new();
        let student = state.create_instance("Student", BTreeMap::new());
        // admit and schedule; book still waits for a course.
        assert_eq!(selector.candidates(&state).len(), 2);

        let course = state.create_instance("Course", BTreeMap::new());
        assert_eq!(selector.candidates(&state).len(), 3);

        let mut rng = SimRng::new(4);
        let mut saw_seat = false;
        for _ in 0..50 {
            if let PendingAction::Creation { class_key, sources, .. } = selector.select(&state, &mut rng).unwrap() {
                if class_key == "Seat" {
                    saw_seat = true;
                    let links: Vec<(&str, InstanceId)> = sources
                        .iter()
                        .map(|s| (s.association.as_str(), s.parent))
                        .collect();
                    assert_eq!(links, vec![("occupies", student), ("offers", course)]);
                }
            }
        }
        assert!(saw_seat);
    }

    #[test]
    fn selection_is_reproducible() {
        let catalog = ClassCatalog::build(&load_model_from_str(MODEL).unwrap());
        let selector = ActionSelector::new(&catalog);
        let mut state = SimulationState::new();
        let sale = state.create_instance("Sale", BTreeMap::new());
        state.set_state(sale, "Pending").unwrap();
        let picks = |seed| {
            let mut rng = SimRng::new(seed);
            (0..10)
                .map(|_| selector.select(&state, &mut rng).unwrap())
                .collect::<Vec<_>>()
        };
        assert_eq!(picks(11), picks(11));
    }
}
