//! Execution context shared by one action chain.
//!
//! A context is created for each top-level action or query and passed by
//! reference through every nested call. It collects primed writes, deferred
//! post-conditions, safety rules and raised events; nothing reaches the
//! [`SimulationState`] until [`ExecutionContext::apply`] runs at the end of a
//! successful chain.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::ExecutionError;
use crate::model::STATE_FIELD;
use crate::notation::Expression;
use crate::value::Value;

use super::config::MAX_CALL_DEPTH;
use super::state::SimulationState;
use super::InstanceId;

/// A committed `field' = value` write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimedAssignment {
    pub instance_id: InstanceId,
    pub class_key: String,
    pub field: String,
    pub value: Value,
}

/// An event raised by an action, dispatched once the chain has committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaisedEvent {
    pub class_key: String,
    pub instance: InstanceId,
    pub event: String,
    pub params: BTreeMap<String, Value>,
    /// Action key that raised the event.
    pub raised_by: String,
}

/// A guarantee conjunct or safety rule checked after apply.
#[derive(Debug, Clone)]
pub(crate) struct DeferredCheck {
    pub action: String,
    pub class_key: String,
    pub instance: InstanceId,
    pub source: String,
    pub expr: Expression,
    pub locals: BTreeMap<String, Value>,
}

#[derive(Debug, Clone)]
struct PendingWrites {
    action: String,
    class_key: String,
    fields: BTreeMap<String, Value>,
}

/// Effects collected during one action chain.
#[derive(Debug, Default)]
pub struct ExecutionContext {
    writes: BTreeMap<InstanceId, PendingWrites>,
    write_order: Vec<(InstanceId, String)>,
    post_conditions: Vec<DeferredCheck>,
    safety_rules: Vec<DeferredCheck>,
    raised: Vec<RaisedEvent>,
    depth: usize,
}

impl ExecutionContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current call nesting.
    #[must_use]
    pub const fn depth(&self) -> usize {
        self.depth
    }

    /// Enters one level of action nesting.
    pub fn enter(&mut self) -> Result<(), ExecutionError> {
        if self.depth >= MAX_CALL_DEPTH {
            return Err(ExecutionError::DepthExceeded {
                limit_type: "action call",
                max_value: MAX_CALL_DEPTH,
            });
        }
        self.depth += 1;
        Ok(())
    }

    pub fn exit(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// Records a primed write without applying it.
    ///
    /// Within one chain only one action may write a given instance.
    pub fn record_write(
        &mut self,
        action: &str,
        class_key: &str,
        instance: InstanceId,
        field: &str,
        value: Value,
    ) -> Result<(), ExecutionError> {
        if field == STATE_FIELD {
            return Err(ExecutionError::StateFieldWrite {
                action: action.to_string(),
                instance: instance.get(),
            });
        }
        let pending = self.writes.entry(instance).or_insert_with(|| PendingWrites {
            action: action.to_string(),
            class_key: class_key.to_string(),
            fields: BTreeMap::new(),
        });
        if pending.action != action {
            return Err(ExecutionError::ReentrantWrite {
                instance: instance.get(),
                first_action: pending.action.clone(),
                second_action: action.to_string(),
            });
        }
        if pending.fields.insert(field.to_string(), value).is_none() {
            self.write_order.push((instance, field.to_string()));
        }
        Ok(())
    }

    /// Instances that carry at least one pending write.
    #[must_use]
    pub fn mutated(&self) -> BTreeSet<InstanceId> {
        self.writes.keys().copied().collect()
    }

    /// Pending writes in first-write order.
    #[must_use]
    pub fn pending_assignments(&self) -> Vec<PrimedAssignment> {
        self.write_order
            .iter()
            .filter_map(|(id, field)| {
                let pending = self.writes.get(id)?;
                Some(PrimedAssignment {
                    instance_id: *id,
                    class_key: pending.class_key.clone(),
                    field: field.clone(),
                    value: pending.fields.get(field)?.clone(),
                })
            })
            .collect()
    }

    pub(crate) fn defer_post_condition(&mut self, check: DeferredCheck) {
        self.post_conditions.push(check);
    }

    pub(crate) fn defer_safety_rule(&mut self, check: DeferredCheck) {
        self.safety_rules.push(check);
    }

    pub(crate) fn post_conditions(&self) -> &[DeferredCheck] {
        &self.post_conditions
    }

    pub(crate) fn safety_rules(&self) -> &[DeferredCheck] {
        &self.safety_rules
    }

    pub fn queue_raise(&mut self, event: RaisedEvent) {
        self.raised.push(event);
    }

    pub fn take_raised(&mut self) -> Vec<RaisedEvent> {
        std::mem::take(&mut self.raised)
    }

    /// Applies every pending write to `state`, all or nothing.
    pub fn apply(&self, state: &mut SimulationState) -> Result<Vec<PrimedAssignment>, ExecutionError> {
        for id in self.writes.keys() {
            state.require(*id)?;
        }
        let assignments = self.pending_assignments();
        for assignment in &assignments {
            state.set_field(
                assignment.instance_id,
                &assignment.field,
                assignment.value.clone(),
            )?;
        }
        Ok(assignments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_are_collected_not_applied() {
        let mut state = SimulationState::new();
        let id = state.create_instance("Order", BTreeMap::new());
        let mut ctx = ExecutionContext::new();
        ctx.record_write("Order/DoClose", "Order", id, "amount", Value::Int(10))
            .unwrap();
        assert!(state.get(id).unwrap().get("amount").is_none());

        let applied = ctx.apply(&mut state).unwrap();
        assert_eq!(applied.len(), 1);
        assert_eq!(state.get(id).unwrap().get("amount"), Some(&Value::Int(10)));
    }

    #[test]
    fn same_action_may_write_several_fields() {
        let id = InstanceId::new(1);
        let mut ctx = ExecutionContext::new();
        ctx.record_write("A/x", "A", id, "a", Value::Int(1)).unwrap();
        ctx.record_write("A/x", "A", id, "b", Value::Int(2)).unwrap();
        ctx.record_write("A/x", "A", id, "a", Value::Int(3)).unwrap();
        let pending = ctx.pending_assignments();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].field, "a");
        assert_eq!(pending[0].value, Value::Int(3));
    }

    #[test]
    fn second_action_on_same_instance_is_reentrant() {
        let id = InstanceId::new(1);
        let mut ctx = ExecutionContext::new();
        ctx.record_write("A/x", "A", id, "a", Value::Int(1)).unwrap();
        let err = ctx
            .record_write("A/y", "A", id, "b", Value::Int(2))
            .unwrap_err();
        assert!(matches!(err, ExecutionError::ReentrantWrite { .. }));
    }

    #[test]
    fn state_field_is_never_written() {
        let mut ctx = ExecutionContext::new();
        let err = ctx
            .record_write("A/x", "A", InstanceId::new(1), STATE_FIELD, Value::from("X"))
            .unwrap_err();
        assert!(matches!(err, ExecutionError::StateFieldWrite { .. }));
    }

    #[test]
    fn depth_is_bounded() {
        let mut ctx = ExecutionContext::new();
        for _ in 0..MAX_CALL_DEPTH {
            ctx.enter().unwrap();
        }
        assert!(matches!(
            ctx.enter(),
            Err(ExecutionError::DepthExceeded { .. })
        ));
        ctx.exit();
        assert_eq!(ctx.depth(), MAX_CALL_DEPTH - 1);
    }

    #[test]
    fn apply_is_all_or_nothing() {
        let mut state = SimulationState::new();
        let live = state.create_instance("A", BTreeMap::new());
        let mut ctx = ExecutionContext::new();
        ctx.record_write("A/x", "A", live, "a", Value::Int(1)).unwrap();
        ctx.record_write("B/y", "B", InstanceId::new(77), "b", Value::Int(2))
            .unwrap();
        assert!(ctx.apply(&mut state).is_err());
        assert!(state.get(live).unwrap().get("a").is_none());
    }
}
