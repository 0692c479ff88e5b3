//! Model-wide and per-class invariants.

use tracing::trace;

use crate::error::ConfigError;
use crate::model::{Model, SourceExpression};
use crate::notation::{eval, Bindings};
use crate::simulation::{SimulationState, StateView, Violation, ViolationType};
use crate::value::Value;

/// Evaluates invariants against a fully applied state.
///
/// Model invariants see every class as the set of its live instances, so they
/// are usually quantified: `\A o \in Order : o.amount >= 0`. Class invariants
/// are evaluated once per live instance with `self` bound.
#[derive(Debug, Clone)]
pub struct InvariantChecker {
    model_invariants: Vec<SourceExpression>,
    class_invariants: Vec<(String, SourceExpression)>,
}

/// Outcome of evaluating one invariant: `None` when it holds.
fn failure(result: Result<Value, crate::notation::EvalError>) -> Option<String> {
    match result {
        Ok(Value::Bool(true)) => None,
        Ok(other) => Some(format!("evaluated to {other}")),
        Err(e) => Some(e.to_string()),
    }
}

impl InvariantChecker {
    /// Collects the model's invariants; any that reference a primed variable
    /// are rejected.
    pub fn new(model: &Model) -> Result<Self, ConfigError> {
        let mut model_invariants = Vec::new();
        for inv in model.invariants() {
            if inv.expr.references_primed() {
                return Err(ConfigError::UnexpectedPrimed {
                    context: "model invariant".to_string(),
                    expression: inv.source.clone(),
                });
            }
            model_invariants.push(inv.clone());
        }
        let class_invariants = model
            .classes()
            .flat_map(|class| {
                class
                    .invariants
                    .iter()
                    .map(move |inv| (class.key.clone(), inv.clone()))
            })
            .collect();
        Ok(Self {
            model_invariants,
            class_invariants,
        })
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.model_invariants.is_empty() && self.class_invariants.is_empty()
    }

    /// Model invariants only.
    #[must_use]
    pub fn check_model_invariants(&self, model: &Model, state: &SimulationState) -> Vec<Violation> {
        let view = StateView::new(model, state);
        let bindings = Bindings::new(&view);
        self.model_invariants
            .iter()
            .filter_map(|inv| {
                let detail = failure(eval(&inv.expr, &bindings))?;
                trace!(invariant = %inv.source, %detail, "model invariant failed");
                Some(
                    Violation::new(
                        ViolationType::ModelInvariant,
                        format!("model invariant does not hold: {}", inv.source),
                    )
                    .with_expression(inv.source.clone())
                    .with_detail(detail),
                )
            })
            .collect()
    }

    /// Class invariants, once per live instance of each class.
    #[must_use]
    pub fn check_class_invariants(&self, model: &Model, state: &SimulationState) -> Vec<Violation> {
        let view = StateView::new(model, state);
        let mut violations = Vec::new();
        for (class_key, inv) in &self.class_invariants {
            for instance in state.instances_of(class_key) {
                let bindings = Bindings::new(&view).with_self(instance.id);
                if let Some(detail) = failure(eval(&inv.expr, &bindings)) {
                    violations.push(
                        Violation::new(
                            ViolationType::ClassInvariant,
                            format!("invariant of {class_key} {} does not hold: {}", instance.id, inv.source),
                        )
                        .with_instance(instance.id)
                        .with_class(class_key.clone())
                        .with_expression(inv.source.clone())
                        .with_detail(detail),
                    );
                }
            }
        }
        violations
    }

    /// Model invariants followed by class invariants.
    #[must_use]
    pub fn check(&self, model: &Model, state: &SimulationState) -> Vec<Violation> {
        let mut violations = self.check_model_invariants(model, state);
        violations.extend(self.check_class_invariants(model, state));
        violations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::load_model_from_str;
    use std::collections::BTreeMap;

    fn model(invariants: &str, class_invariants: &str) -> Model {
        load_model_from_str(&format!(
            r#"{{"domains": [{{"key": "d", "subdomains": [{{"key": "s", "classes": [
                {{"key": "Order", "attributes": [{{"key": "amount"}}],
                  "invariants": [{class_invariants}]}}]}}]}}],
               "invariants": [{invariants}]}}"#
        ))
        .unwrap()
    }

    fn state_with_amounts(amounts: &[i64]) -> SimulationState {
        let mut state = SimulationState::new();
        for a in amounts {
            state.create_instance(
                "Order",
                [("amount".to_string(), Value::Int(*a))].into_iter().collect::<BTreeMap<_, _>>(),
            );
        }
        state
    }

    #[test]
    fn quantified_model_invariant() {
        let m = model(r#""\\A o \\in Order : o.amount >= 0""#, "");
        let checker = InvariantChecker::new(&m).unwrap();
        assert!(checker.check(&m, &state_with_amounts(&[1, 2])).is_empty());
        let violations = checker.check(&m, &state_with_amounts(&[1, -2]));
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].kind, ViolationType::ModelInvariant);
    }

    #[test]
    fn false_invariant_always_fails() {
        let m = model(r#""FALSE""#, "");
        let checker = InvariantChecker::new(&m).unwrap();
        let violations = checker.check(&m, &SimulationState::new());
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].detail.as_deref(), Some("evaluated to FALSE"));
    }

    #[test]
    fn erroring_invariant_is_a_violation() {
        let m = model(r#""Cardinality(1) = 0""#, "");
        let checker = InvariantChecker::new(&m).unwrap();
        assert_eq!(checker.check(&m, &SimulationState::new()).len(), 1);
    }

    #[test]
    fn class_invariants_bind_self() {
        let m = model("", r#""self.amount < 10""#);
        let checker = InvariantChecker::new(&m).unwrap();
        let violations = checker.check(&m, &state_with_amounts(&[3, 12, 15]));
        assert_eq!(violations.len(), 2);
        assert!(violations.iter().all(|v| v.kind == ViolationType::ClassInvariant));
    }

    #[test]
    fn primed_model_invariant_is_config_error() {
        let m = model(r#""Cardinality(Order') = 0""#, "");
        assert!(matches!(
            InvariantChecker::new(&m),
            Err(ConfigError::UnexpectedPrimed { .. })
        ));
    }
}
