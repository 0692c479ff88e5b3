//! Action and query execution.
//!
//! An action runs in three phases. *Collect* walks the action and every
//! action it calls, evaluating `requires`, recording primed writes into the
//! [`ExecutionContext`] and deferring post-conditions and safety rules.
//! *Apply* writes everything collected to the [`SimulationState`] at once.
//! *Check* evaluates the deferred expressions against the pre- and post-apply
//! states and runs the model checkers. Only the first two phases can fail;
//! the third reports [`Violation`]s.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, trace};

use crate::checks::ModelCheckers;
use crate::error::ExecutionError;
use crate::model::{Class, Guarantee, Model, SourceExpression, STATE_FIELD};
use crate::notation::{eval, Bindings, Expression};
use crate::value::Value;

use super::context::{DeferredCheck, ExecutionContext, PrimedAssignment, RaisedEvent};
use super::{InstanceId, SimulationState, StateView, Violation, ViolationType};

/// Outcome of a committed action chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionResult {
    pub instance_id: InstanceId,
    /// Every field the chain changed, in first-write order.
    pub primed_assignments: Vec<PrimedAssignment>,
    pub violations: Vec<Violation>,
    /// True when the chain committed without recording a violation.
    pub success: bool,
    /// Events raised by the chain, not yet dispatched.
    #[serde(skip)]
    pub raised: Vec<RaisedEvent>,
}

/// Outcome of a query. Queries never touch the state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryResult {
    pub instance_id: InstanceId,
    pub outputs: BTreeMap<String, Value>,
    pub violations: Vec<Violation>,
}

/// Interprets actions and queries of one model.
#[derive(Debug, Clone, Copy)]
pub struct ActionExecutor<'m> {
    model: &'m Model,
    checkers: &'m ModelCheckers,
}

fn action_id(class_key: &str, action_key: &str) -> String {
    format!("{class_key}/{action_key}")
}

pub(crate) fn evaluate(
    source: &SourceExpression,
    bindings: &Bindings<'_>,
) -> Result<Value, ExecutionError> {
    evaluate_expr(&source.source, &source.expr, bindings)
}

fn evaluate_expr(
    source: &str,
    expr: &Expression,
    bindings: &Bindings<'_>,
) -> Result<Value, ExecutionError> {
    eval(expr, bindings).map_err(|e| ExecutionError::Evaluation {
        expression: source.to_string(),
        source: e,
    })
}

/// A guarantee may only write declared attributes or the state field.
fn check_write_target(
    action: &str,
    class: &Class,
    class_key: &str,
    target: &str,
) -> Result<(), ExecutionError> {
    if target == STATE_FIELD || class.attribute(target).is_some() {
        return Ok(());
    }
    Err(ExecutionError::InvalidGuarantee {
        action: action.to_string(),
        reason: format!("'{target}' is not an attribute of {class_key}"),
    })
}

/// Evaluates each `requires` clause; anything but TRUE aborts.
fn check_requires(
    owner: &str,
    requires: &[SourceExpression],
    bindings: &Bindings<'_>,
) -> Result<(), ExecutionError> {
    for clause in requires {
        if clause.expr.references_primed() {
            return Err(ExecutionError::PrimedInRequires {
                action: owner.to_string(),
                expression: clause.source.clone(),
            });
        }
        let reason = match eval(&clause.expr, bindings) {
            Ok(Value::Bool(true)) => continue,
            Ok(other) => format!("evaluated to {other}"),
            Err(e) => e.to_string(),
        };
        return Err(ExecutionError::RequiresFailed {
            action: owner.to_string(),
            expression: clause.source.clone(),
            reason,
        });
    }
    Ok(())
}

/// Resolves an optional target expression to an instance; `None` is `self`.
fn resolve_target(
    context: &str,
    target: Option<&SourceExpression>,
    bindings: &Bindings<'_>,
    this: InstanceId,
) -> Result<InstanceId, ExecutionError> {
    let Some(target) = target else {
        return Ok(this);
    };
    match evaluate(target, bindings)? {
        Value::Instance(id) => Ok(id),
        other => Err(ExecutionError::InvalidExpression {
            context: context.to_string(),
            expression: target.source.clone(),
            reason: format!("expected an instance, found {}", other.type_name()),
        }),
    }
}

fn evaluate_args(
    args: &[(String, SourceExpression)],
    bindings: &Bindings<'_>,
) -> Result<BTreeMap<String, Value>, ExecutionError> {
    args.iter()
        .map(|(name, source)| Ok((name.clone(), evaluate(source, bindings)?)))
        .collect()
}

impl<'m> ActionExecutor<'m> {
    #[must_use]
    pub const fn new(model: &'m Model, checkers: &'m ModelCheckers) -> Self {
        Self { model, checkers }
    }

    #[must_use]
    pub const fn model(&self) -> &'m Model {
        self.model
    }

    #[must_use]
    pub const fn checkers(&self) -> &'m ModelCheckers {
        self.checkers
    }

    pub(crate) fn class(&self, class_key: &str) -> Result<&'m Class, ExecutionError> {
        self.model
            .class(class_key)
            .ok_or_else(|| ExecutionError::not_found("class", class_key))
    }

    /// Runs one action chain to completion and commits it.
    ///
    /// On error nothing has been applied to `state`.
    pub fn execute_action(
        &self,
        state: &mut SimulationState,
        class_key: &str,
        action_key: &str,
        instance: InstanceId,
        params: BTreeMap<String, Value>,
    ) -> Result<ActionResult, ExecutionError> {
        let mut ctx = ExecutionContext::new();
        self.execute_in_context(&mut ctx, state, class_key, action_key, instance, &params)?;
        self.commit(ctx, state, instance)
    }

    /// Collect phase of one action, recursing into its calls.
    pub fn execute_in_context(
        &self,
        ctx: &mut ExecutionContext,
        state: &SimulationState,
        class_key: &str,
        action_key: &str,
        instance: InstanceId,
        params: &BTreeMap<String, Value>,
    ) -> Result<(), ExecutionError> {
        ctx.enter()?;
        let result = self.collect(ctx, state, class_key, action_key, instance, params);
        ctx.exit();
        result
    }

    fn collect(
        &self,
        ctx: &mut ExecutionContext,
        state: &SimulationState,
        class_key: &str,
        action_key: &str,
        instance: InstanceId,
        params: &BTreeMap<String, Value>,
    ) -> Result<(), ExecutionError> {
        let class = self.class(class_key)?;
        let id = action_id(class_key, action_key);
        let action = class
            .action(action_key)
            .ok_or_else(|| ExecutionError::not_found("action", id.clone()))?;
        state.require(instance)?;
        trace!(action = %id, %instance, depth = ctx.depth(), "collecting action");

        let view = StateView::new(self.model, state);
        let bindings = Bindings::new(&view)
            .with_self(instance)
            .with_locals(params.clone());

        check_requires(&id, &action.requires, &bindings)?;

        for guarantee in &action.guarantees {
            match guarantee {
                Guarantee::Binding {
                    target,
                    specification,
                } => {
                    check_write_target(&id, class, class_key, target)?;
                    let value = evaluate(specification, &bindings)?;
                    ctx.record_write(&id, class_key, instance, target, value)?;
                }
                Guarantee::Expression(source) => {
                    for conjunct in source.expr.conjuncts() {
                        if let Some((target, rhs)) = conjunct.as_primed_assignment() {
                            check_write_target(&id, class, class_key, target.name())?;
                            let value = evaluate_expr(&source.source, rhs, &bindings)?;
                            ctx.record_write(&id, class_key, instance, target.name(), value)?;
                        } else {
                            ctx.defer_post_condition(DeferredCheck {
                                action: id.clone(),
                                class_key: class_key.to_string(),
                                instance,
                                source: source.source.clone(),
                                expr: conjunct.clone(),
                                locals: params.clone(),
                            });
                        }
                    }
                }
            }
        }

        for rule in &action.safety_rules {
            if !rule.expr.references_primed() {
                return Err(ExecutionError::SafetyRuleWithoutPrime {
                    action: id,
                    expression: rule.source.clone(),
                });
            }
            ctx.defer_safety_rule(DeferredCheck {
                action: id.clone(),
                class_key: class_key.to_string(),
                instance,
                source: rule.source.clone(),
                expr: rule.expr.clone(),
                locals: params.clone(),
            });
        }

        for call in &action.calls {
            let target = resolve_target(&format!("call target in {id}"), call.target.as_ref(), &bindings, instance)?;
            let args = evaluate_args(&call.args, &bindings)?;
            let target_class = state.require(target)?.class_key.clone();
            self.execute_in_context(ctx, state, &target_class, &call.action, target, &args)?;
        }

        for raise in &action.raises {
            let target = resolve_target(&format!("raise target in {id}"), raise.target.as_ref(), &bindings, instance)?;
            let args = evaluate_args(&raise.args, &bindings)?;
            let target_class = state.require(target)?.class_key.clone();
            ctx.queue_raise(RaisedEvent {
                class_key: target_class,
                instance: target,
                event: raise.event.clone(),
                params: args,
                raised_by: id.clone(),
            });
        }
        Ok(())
    }

    /// Apply and check phases.
    pub fn commit(
        &self,
        mut ctx: ExecutionContext,
        state: &mut SimulationState,
        instance: InstanceId,
    ) -> Result<ActionResult, ExecutionError> {
        let before = state.clone();
        let primed_assignments = ctx.apply(state)?;

        let mut violations = self.check_deferred(&ctx, &before, state);
        let mutated = ctx.mutated();
        violations.extend(self.checkers.data_types.check_instances(state, &mutated));
        violations.extend(self.checkers.invariants.check(self.model, state));
        violations.extend(self.checkers.index_uniqueness.check(state));

        debug!(
            %instance,
            assignments = primed_assignments.len(),
            violations = violations.len(),
            "action chain committed"
        );
        Ok(ActionResult {
            instance_id: instance,
            primed_assignments,
            success: violations.is_empty(),
            violations,
            raised: ctx.take_raised(),
        })
    }

    fn check_deferred(
        &self,
        ctx: &ExecutionContext,
        before: &SimulationState,
        after: &SimulationState,
    ) -> Vec<Violation> {
        let current = StateView::new(self.model, before);
        let next = StateView::new(self.model, after);
        let kinds = ctx
            .post_conditions()
            .iter()
            .map(|c| (ViolationType::PostCondition, c))
            .chain(ctx.safety_rules().iter().map(|c| (ViolationType::SafetyRule, c)));

        let mut violations = Vec::new();
        for (kind, check) in kinds {
            let bindings = Bindings::new(&current)
                .with_next(&next)
                .with_self(check.instance)
                .with_locals(check.locals.clone());
            let detail = match eval(&check.expr, &bindings) {
                Ok(Value::Bool(true)) => continue,
                Ok(other) => format!("evaluated to {other}"),
                Err(e) => e.to_string(),
            };
            let label = if kind == ViolationType::SafetyRule {
                "safety rule"
            } else {
                "guarantee"
            };
            violations.push(
                Violation::new(
                    kind,
                    format!("{label} of {} does not hold: {}", check.action, check.source),
                )
                .with_instance(check.instance)
                .with_class(check.class_key.clone())
                .with_expression(check.source.clone())
                .with_detail(detail),
            );
        }
        violations
    }

    /// Evaluates a query without changing anything.
    ///
    /// Assignment-shaped guarantees populate named outputs; every other
    /// guarantee conjunct is checked with those outputs as primed values.
    pub fn execute_query(
        &self,
        state: &SimulationState,
        class_key: &str,
        query_key: &str,
        instance: InstanceId,
        params: BTreeMap<String, Value>,
    ) -> Result<QueryResult, ExecutionError> {
        let class = self.class(class_key)?;
        let id = action_id(class_key, query_key);
        let query = class
            .query(query_key)
            .ok_or_else(|| ExecutionError::not_found("query", id.clone()))?;
        state.require(instance)?;

        let view = StateView::new(self.model, state);
        let bindings = Bindings::new(&view)
            .with_self(instance)
            .with_locals(params);
        check_requires(&id, &query.requires, &bindings)?;

        let mut outputs = BTreeMap::new();
        let mut post_conditions: Vec<(&str, &Expression)> = Vec::new();
        for guarantee in &query.guarantees {
            match guarantee {
                Guarantee::Binding {
                    target,
                    specification,
                } => {
                    outputs.insert(target.clone(), evaluate(specification, &bindings)?);
                }
                Guarantee::Expression(source) => {
                    for conjunct in source.expr.conjuncts() {
                        match conjunct.as_primed_assignment() {
                            Some((target, rhs)) => {
                                let value = evaluate_expr(&source.source, rhs, &bindings)?;
                                outputs.insert(target.name().to_string(), value);
                            }
                            None => post_conditions.push((&source.source, conjunct)),
                        }
                    }
                }
            }
        }

        let checked = bindings.with_next(&view).with_primed_locals(outputs.clone());
        let violations = post_conditions
            .into_iter()
            .filter_map(|(source, expr)| {
                let detail = match eval(expr, &checked) {
                    Ok(Value::Bool(true)) => return None,
                    Ok(other) => format!("evaluated to {other}"),
                    Err(e) => e.to_string(),
                };
                Some(
                    Violation::new(
                        ViolationType::PostCondition,
                        format!("guarantee of query {id} does not hold: {source}"),
                    )
                    .with_instance(instance)
                    .with_class(class_key)
                    .with_expression(source)
                    .with_detail(detail),
                )
            })
            .collect();

        Ok(QueryResult {
            instance_id: instance,
            outputs,
            violations,
        })
    }
}
