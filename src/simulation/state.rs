//! Instance table and association links.
//!
//! All instances live in one arena keyed by [`InstanceId`]; links are stored
//! as ID pairs, never as references, so the whole state can be cloned into a
//! snapshot cheaply and compared structurally.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ExecutionError;
use crate::model::STATE_FIELD;
use crate::value::Value;

/// Stable identifier of a class instance. Monotonic, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(u64);

impl InstanceId {
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One live object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassInstance {
    pub id: InstanceId,
    pub class_key: String,
    pub attributes: BTreeMap<String, Value>,
}

impl ClassInstance {
    /// Current state-machine state, if one has been set.
    #[must_use]
    pub fn state(&self) -> Option<&str> {
        self.attributes.get(STATE_FIELD).and_then(Value::as_str)
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.attributes.get(field)
    }
}

/// A directed link `from -> to` over an association.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Link {
    pub association: String,
    pub from: InstanceId,
    pub to: InstanceId,
}

/// The complete mutable state of a simulation run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationState {
    instances: BTreeMap<InstanceId, ClassInstance>,
    links: BTreeSet<Link>,
    next_id: u64,
}

impl SimulationState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a new instance with the given initial attributes.
    pub fn create_instance(
        &mut self,
        class_key: &str,
        attributes: BTreeMap<String, Value>,
    ) -> InstanceId {
        self.next_id += 1;
        let id = InstanceId(self.next_id);
        self.instances.insert(
            id,
            ClassInstance {
                id,
                class_key: class_key.to_string(),
                attributes,
            },
        );
        id
    }

    /// Removes an instance and every link touching it.
    ///
    /// Returns the removed instance and its former link partners.
    pub fn delete_instance(
        &mut self,
        id: InstanceId,
    ) -> Result<(ClassInstance, BTreeSet<InstanceId>), ExecutionError> {
        let instance = self
            .instances
            .remove(&id)
            .ok_or(ExecutionError::InstanceNotFound { id: id.0 })?;
        let mut partners = BTreeSet::new();
        self.links.retain(|link| {
            if link.from == id {
                partners.insert(link.to);
                false
            } else if link.to == id {
                partners.insert(link.from);
                false
            } else {
                true
            }
        });
        partners.remove(&id);
        Ok((instance, partners))
    }

    #[must_use]
    pub fn get(&self, id: InstanceId) -> Option<&ClassInstance> {
        self.instances.get(&id)
    }

    #[must_use]
    pub fn contains(&self, id: InstanceId) -> bool {
        self.instances.contains_key(&id)
    }

    pub fn require(&self, id: InstanceId) -> Result<&ClassInstance, ExecutionError> {
        self.get(id).ok_or(ExecutionError::InstanceNotFound { id: id.0 })
    }

    /// Writes a regular attribute. The state field is rejected; use
    /// [`set_state`](Self::set_state).
    pub fn set_field(
        &mut self,
        id: InstanceId,
        field: &str,
        value: Value,
    ) -> Result<(), ExecutionError> {
        if field == STATE_FIELD {
            return Err(ExecutionError::StateFieldWrite {
                action: "(direct write)".to_string(),
                instance: id.0,
            });
        }
        let instance = self
            .instances
            .get_mut(&id)
            .ok_or(ExecutionError::InstanceNotFound { id: id.0 })?;
        instance.attributes.insert(field.to_string(), value);
        Ok(())
    }

    /// Moves an instance to a state-machine state.
    pub(crate) fn set_state(&mut self, id: InstanceId, state: &str) -> Result<(), ExecutionError> {
        let instance = self
            .instances
            .get_mut(&id)
            .ok_or(ExecutionError::InstanceNotFound { id: id.0 })?;
        instance
            .attributes
            .insert(STATE_FIELD.to_string(), Value::String(state.to_string()));
        Ok(())
    }

    #[must_use]
    pub fn current_state(&self, id: InstanceId) -> Option<&str> {
        self.get(id).and_then(ClassInstance::state)
    }

    /// All instances in id order.
    pub fn instances(&self) -> impl Iterator<Item = &ClassInstance> {
        self.instances.values()
    }

    /// Instances of one class in id order.
    pub fn instances_of<'a>(&'a self, class_key: &'a str) -> impl Iterator<Item = &'a ClassInstance> + 'a {
        self.instances
            .values()
            .filter(move |i| i.class_key == class_key)
    }

    #[must_use]
    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    pub fn add_link(
        &mut self,
        association: &str,
        from: InstanceId,
        to: InstanceId,
    ) -> Result<(), ExecutionError> {
        for id in [from, to] {
            self.require(id)?;
        }
        self.links.insert(Link {
            association: association.to_string(),
            from,
            to,
        });
        Ok(())
    }

    /// All links in (association, from, to) order.
    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.links.iter()
    }

    /// Targets linked from `id` over `association`.
    pub fn linked_from<'a>(&'a self, association: &'a str, id: InstanceId) -> impl Iterator<Item = InstanceId> + 'a {
        self.links
            .iter()
            .filter(move |l| l.association == association && l.from == id)
            .map(|l| l.to)
    }

    /// Sources linking to `id` over `association`.
    pub fn linked_to<'a>(&'a self, association: &'a str, id: InstanceId) -> impl Iterator<Item = InstanceId> + 'a {
        self.links
            .iter()
            .filter(move |l| l.association == association && l.to == id)
            .map(|l| l.from)
    }

    #[must_use]
    pub fn has_links(&self, association: &str) -> bool {
        self.links.iter().any(|l| l.association == association)
    }
}
