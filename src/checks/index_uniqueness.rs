//! Composite uniqueness indexes.

use std::collections::BTreeMap;

use crate::model::Model;
use crate::simulation::{ClassInstance, InstanceId, SimulationState, Violation, ViolationType};
use crate::value::Value;

type IndexKey = Vec<(&'static str, String)>;

fn index_key(attributes: &[String], lookup: impl Fn(&str) -> Option<Value>) -> IndexKey {
    attributes
        .iter()
        .map(|attr| lookup(attr).unwrap_or(Value::Nil).canonical_key())
        .collect()
}

fn instance_key(instance: &ClassInstance, attributes: &[String]) -> IndexKey {
    index_key(attributes, |attr| instance.get(attr).cloned())
}

/// Detects instances that share all values of a composite index.
///
/// Values are compared by `(type tag, rendering)`, so two NILs collide while
/// `Int(42)` and `String("42")` never do.
#[derive(Debug, Clone, Default)]
pub struct IndexUniquenessChecker {
    indexes: BTreeMap<String, BTreeMap<u32, Vec<String>>>,
}

impl IndexUniquenessChecker {
    #[must_use]
    pub fn new(model: &Model) -> Self {
        let indexes = model
            .classes()
            .map(|class| (class.key.clone(), class.index_groups()))
            .filter(|(_, groups)| !groups.is_empty())
            .collect();
        Self { indexes }
    }

    /// Index number to attribute keys, for one class.
    #[must_use]
    pub fn indexes_of(&self, class_key: &str) -> Option<&BTreeMap<u32, Vec<String>>> {
        self.indexes.get(class_key)
    }

    /// One violation per colliding pair of instances, per index.
    #[must_use]
    pub fn check(&self, state: &SimulationState) -> Vec<Violation> {
        let mut violations = Vec::new();
        for (class_key, groups) in &self.indexes {
            for (number, attributes) in groups {
                let mut seen: BTreeMap<IndexKey, Vec<InstanceId>> = BTreeMap::new();
                for instance in state.instances_of(class_key) {
                    let key = instance_key(instance, attributes);
                    let holders = seen.entry(key).or_default();
                    for earlier in holders.iter() {
                        violations.push(
                            Violation::new(
                                ViolationType::IndexUniqueness,
                                format!(
                                    "{class_key} {earlier} and {} share index {number} ({})",
                                    instance.id,
                                    attributes.join(", ")
                                ),
                            )
                            .with_instance(instance.id)
                            .with_class(class_key.clone()),
                        );
                    }
                    holders.push(instance.id);
                }
            }
        }
        violations
    }

    /// Returns true if an instance of `class_key` holding `values` would not
    /// collide with any live instance on any index.
    #[must_use]
    pub fn admits(
        &self,
        state: &SimulationState,
        class_key: &str,
        values: &BTreeMap<String, Value>,
    ) -> bool {
        let Some(groups) = self.indexes.get(class_key) else {
            return true;
        };
        groups.values().all(|attributes| {
            let candidate = index_key(attributes, |attr| values.get(attr).cloned());
            state
                .instances_of(class_key)
                .all(|instance| instance_key(instance, attributes) != candidate)
        })
    }
}
