//! Per-run precomputation of what can fire where.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::model::{ActionTiming, Class, DataType, Model, Multiplicity, Parameter};
use crate::value::Value;

use super::SimRng;

/// A parameter with its parsed data-type rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: String,
    /// `None` when undeclared or unparsable; such parameters are drawn as NIL.
    pub data_type: Option<DataType>,
}

impl ParamSpec {
    /// Draws a value for the parameter.
    pub fn draw(&self, rng: &mut SimRng) -> Value {
        self.data_type.as_ref().map_or(Value::Nil, |dt| dt.sample(rng))
    }
}

/// Draws one value per parameter, in declared order.
pub fn draw_params(specs: &[ParamSpec], rng: &mut SimRng) -> BTreeMap<String, Value> {
    specs
        .iter()
        .map(|spec| (spec.name.clone(), spec.draw(rng)))
        .collect()
}

fn param_specs(params: &[Parameter]) -> Vec<ParamSpec> {
    params
        .iter()
        .map(|p| ParamSpec {
            name: p.name.clone(),
            data_type: p.data_type.as_deref().and_then(|rules| DataType::parse(rules).ok()),
        })
        .collect()
}

/// One event together with every transition it may trigger from one state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventGroup {
    pub event: String,
    /// Indices into the class's transition list.
    pub transitions: Vec<usize>,
    /// Internal events only fire as a side effect of another class's logic.
    pub external: bool,
    pub params: Vec<ParamSpec>,
}

/// A state-scoped `do` action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DoAction {
    pub action: String,
    pub external: bool,
    pub params: Vec<ParamSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogAssociation {
    pub key: String,
    pub from_class: String,
    pub to_class: String,
    /// Every `from` instance needs at least one `to` partner.
    pub mandatory_to: bool,
    /// Every `to` instance needs at least one `from` partner.
    pub mandatory_from: bool,
    pub to_bounds: Multiplicity,
    pub from_bounds: Multiplicity,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogClass {
    pub key: String,
    pub creation_events: Vec<EventGroup>,
    pub state_events: BTreeMap<String, Vec<EventGroup>>,
    pub do_actions: BTreeMap<String, Vec<DoAction>>,
    /// Created by the creation cascade of another class, never top level.
    pub cascade_created: bool,
    /// Associations over which a top-level creation must link to a parent,
    /// one parent per association.
    pub required_parents: Vec<String>,
}

/// Classes with at least one state, indexed for selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassCatalog {
    classes: BTreeMap<String, CatalogClass>,
    associations: Vec<CatalogAssociation>,
}

fn group_events<'a, I>(class: &Class, transitions: I, catalog: &BTreeSet<&str>) -> Vec<EventGroup>
where
    I: IntoIterator<Item = (usize, &'a crate::model::Transition)>,
{
    let mut groups: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (index, transition) in transitions {
        groups.entry(transition.event.as_str()).or_default().push(index);
    }
    groups
        .into_iter()
        .map(|(event, transitions)| {
            let (external, params) = class.event(event).map_or((true, Vec::new()), |e| {
                (
                    !e.senders.iter().any(|s| catalog.contains(s.as_str())),
                    param_specs(&e.params),
                )
            });
            EventGroup {
                event: event.to_string(),
                transitions,
                external,
                params,
            }
        })
        .collect()
}

impl ClassCatalog {
    /// Builds the catalog for `model` (already surface-filtered).
    #[must_use]
    pub fn build(model: &Model) -> Self {
        let members: BTreeSet<&str> = model
            .classes()
            .filter(|c| !c.states.is_empty())
            .map(|c| c.key.as_str())
            .collect();

        let associations: Vec<CatalogAssociation> = model
            .associations()
            .filter(|a| members.contains(a.from_class.as_str()) && members.contains(a.to_class.as_str()))
            .map(|a| CatalogAssociation {
                key: a.key.clone(),
                from_class: a.from_class.clone(),
                to_class: a.to_class.clone(),
                mandatory_to: a.to_multiplicity.is_mandatory(),
                mandatory_from: a.from_multiplicity.is_mandatory(),
                to_bounds: a.to_multiplicity,
                from_bounds: a.from_multiplicity,
            })
            .collect();

        let mut classes = BTreeMap::new();
        for class in model.classes().filter(|c| members.contains(c.key.as_str())) {
            let indexed = class.transitions.iter().enumerate();
            let creation_events =
                group_events(class, indexed.clone().filter(|(_, t)| t.is_creation()), &members);

            let state_events = class
                .states
                .iter()
                .map(|state| {
                    let from_here = indexed
                        .clone()
                        .filter(|(_, t)| t.from.as_deref() == Some(state.key.as_str()));
                    (state.key.clone(), group_events(class, from_here, &members))
                })
                .collect();

            let do_actions = class
                .states
                .iter()
                .map(|state| {
                    let actions = state
                        .actions
                        .iter()
                        .filter(|sa| sa.when == ActionTiming::Do)
                        .filter_map(|sa| class.action(&sa.action))
                        .map(|action| DoAction {
                            action: action.key.clone(),
                            external: !action.callers.iter().any(|c| members.contains(c.as_str())),
                            params: param_specs(&action.params),
                        })
                        .collect();
                    (state.key.clone(), actions)
                })
                .collect();

            let inbound = associations
                .iter()
                .filter(|a| a.to_class == class.key && a.from_class != class.key);
            let cascade_created = inbound.clone().any(|a| a.mandatory_to);
            let required_parents = inbound
                .filter(|a| a.mandatory_from)
                .map(|a| a.key.clone())
                .collect();

            classes.insert(
                class.key.clone(),
                CatalogClass {
                    key: class.key.clone(),
                    creation_events,
                    state_events,
                    do_actions,
                    cascade_created,
                    required_parents,
                },
            );
        }

        debug!(
            classes = classes.len(),
            associations = associations.len(),
            "class catalog built"
        );
        Self {
            classes,
            associations,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    #[must_use]
    pub fn contains(&self, class_key: &str) -> bool {
        self.classes.contains_key(class_key)
    }

    #[must_use]
    pub fn class(&self, class_key: &str) -> Option<&CatalogClass> {
        self.classes.get(class_key)
    }

    /// Catalog classes in key order.
    pub fn classes(&self) -> impl Iterator<Item = &CatalogClass> {
        self.classes.values()
    }

    /// Associations with both ends in the catalog, in key order.
    #[must_use]
    pub fn associations(&self) -> &[CatalogAssociation] {
        &self.associations
    }

    #[must_use]
    pub fn association(&self, key: &str) -> Option<&CatalogAssociation> {
        self.associations.iter().find(|a| a.key == key)
    }

    /// First creation event of a class, by event key.
    #[must_use]
    pub fn first_creation_event(&self, class_key: &str) -> Option<&EventGroup> {
        self.classes.get(class_key)?.creation_events.first()
    }
}
