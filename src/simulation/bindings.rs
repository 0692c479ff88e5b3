//! Exposes a [`SimulationState`] to the expression evaluator.

use std::collections::BTreeSet;

use crate::model::Model;
use crate::notation::ObjectGraph;
use crate::value::Value;

use super::state::SimulationState;
use super::InstanceId;

/// Read-only object graph over a state.
///
/// Class names resolve to the set of live instances of that class.
/// Association ends resolve by role name: a single-valued end yields the
/// partner instance (or `NIL`), any other end yields a set.
#[derive(Clone, Copy)]
pub struct StateView<'a> {
    model: &'a Model,
    state: &'a SimulationState,
}

impl<'a> StateView<'a> {
    #[must_use]
    pub const fn new(model: &'a Model, state: &'a SimulationState) -> Self {
        Self { model, state }
    }
}

fn collect(ids: impl Iterator<Item = InstanceId>, single: bool) -> Value {
    let set: BTreeSet<Value> = ids.map(Value::Instance).collect();
    if single {
        set.into_iter().next().unwrap_or(Value::Nil)
    } else {
        Value::Set(set)
    }
}

impl ObjectGraph for StateView<'_> {
    fn attribute(&self, id: InstanceId, name: &str) -> Option<Value> {
        let instance = self.state.get(id)?;
        if let Some(value) = instance.get(name) {
            return Some(value.clone());
        }
        // Declared but never written attributes read as NIL.
        self.model
            .class(&instance.class_key)?
            .attribute(name)
            .map(|_| Value::Nil)
    }

    fn navigate(&self, id: InstanceId, name: &str) -> Option<Value> {
        let class = &self.state.get(id)?.class_key;
        for assoc in self.model.associations_of(class) {
            if &assoc.from_class == class && assoc.to_role == name {
                return Some(collect(
                    self.state.linked_from(&assoc.key, id),
                    assoc.to_multiplicity.is_single(),
                ));
            }
            if &assoc.to_class == class && assoc.from_role == name {
                return Some(collect(
                    self.state.linked_to(&assoc.key, id),
                    assoc.from_multiplicity.is_single(),
                ));
            }
        }
        None
    }

    fn extent(&self, class_name: &str) -> Option<Value> {
        self.model.class(class_name)?;
        Some(Value::Set(
            self.state
                .instances_of(class_name)
                .map(|i| Value::Instance(i.id))
                .collect(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::load_model_from_str;
    use crate::notation::{eval, parse_expression, Bindings};
    use std::collections::BTreeMap;

    const MODEL: &str = r#"{"domains": [{"key": "d", "subdomains": [{"key": "s",
        "classes": [
            {"key": "Customer", "attributes": [{"key": "name"}]},
            {"key": "Order", "attributes": [{"key": "amount"}]}
        ],
        "associations": [{"key": "places", "from": "Customer", "to": "Order",
            "from_multiplicity": "1", "to_multiplicity": "*",
            "from_role": "customer", "to_role": "orders"}]}]}]}"#;

    #[test]
    fn navigates_both_directions() {
        let model = load_model_from_str(MODEL).unwrap();
        let mut state = SimulationState::new();
        let c = state.create_instance(
            "Customer",
            [("name".to_string(), Value::from("ada"))].into_iter().collect(),
        );
        let o1 = state.create_instance("Order", BTreeMap::new());
        let o2 = state.create_instance("Order", BTreeMap::new());
        state.add_link("places", c, o1).unwrap();
        state.add_link("places", c, o2).unwrap();

        let view = StateView::new(&model, &state);
        let b = Bindings::new(&view).with_self(o1);
        let e = parse_expression("self.customer.name").unwrap();
        assert_eq!(eval(&e, &b).unwrap(), Value::from("ada"));

        let b = Bindings::new(&view).with_self(c);
        let e = parse_expression("Cardinality(self.orders)").unwrap();
        assert_eq!(eval(&e, &b).unwrap(), Value::Int(2));
    }

    #[test]
    fn unwritten_attributes_read_as_nil() {
        let model = load_model_from_str(MODEL).unwrap();
        let mut state = SimulationState::new();
        let o = state.create_instance("Order", BTreeMap::new());
        let view = StateView::new(&model, &state);
        assert_eq!(view.attribute(o, "amount"), Some(Value::Nil));
        assert_eq!(view.attribute(o, "bogus"), None);
        assert_eq!(view.extent("Nope"), None);
        assert_eq!(view.extent("Customer"), Some(Value::Set(BTreeSet::new())));
    }
}
