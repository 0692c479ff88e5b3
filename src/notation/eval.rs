//! Expression evaluation against a set of bindings.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use num::rational::Rational64;
use num::traits::{CheckedAdd, CheckedDiv, CheckedMul, CheckedSub};
use num::Zero;

use super::ast::{BinaryOp, Expression, QuantifierKind, UnaryOp};
use super::EvalError;
use crate::simulation::InstanceId;
use crate::value::Value;

/// Largest integer range that may be enumerated into a set.
pub const MAX_RANGE_LEN: i128 = 100_000;

/// Read access to the object graph an expression is evaluated against.
pub trait ObjectGraph {
    /// Attribute value of a live instance (the reserved `_state` field included).
    fn attribute(&self, id: InstanceId, name: &str) -> Option<Value>;

    /// Instances reachable from `id` over the association end called `name`.
    fn navigate(&self, id: InstanceId, name: &str) -> Option<Value>;

    /// The set of live instances of the class called `class_name`.
    fn extent(&self, class_name: &str) -> Option<Value>;
}

/// Graph with no instances, for expressions that never touch the model.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyGraph;

impl ObjectGraph for EmptyGraph {
    fn attribute(&self, _id: InstanceId, _name: &str) -> Option<Value> {
        None
    }

    fn navigate(&self, _id: InstanceId, _name: &str) -> Option<Value> {
        None
    }

    fn extent(&self, _class_name: &str) -> Option<Value> {
        None
    }
}

/// Names visible to an expression.
///
/// Unprimed references read `current`; primed field references read `next`,
/// which is only present when post-conditions are checked after effects have
/// been applied.
#[derive(Clone)]
pub struct Bindings<'a> {
    current: &'a dyn ObjectGraph,
    next: Option<&'a dyn ObjectGraph>,
    self_id: Option<InstanceId>,
    locals: BTreeMap<String, Value>,
    primed_locals: BTreeMap<String, Value>,
}

impl<'a> Bindings<'a> {
    /// Bindings over `current` with nothing else in scope.
    #[must_use]
    pub fn new(current: &'a dyn ObjectGraph) -> Self {
        Self {
            current,
            next: None,
            self_id: None,
            locals: BTreeMap::new(),
            primed_locals: BTreeMap::new(),
        }
    }

    /// Binds `self`.
    #[must_use]
    pub fn with_self(mut self, id: InstanceId) -> Self {
        self.self_id = Some(id);
        self
    }

    /// Makes next-state values readable through primed references.
    #[must_use]
    pub fn with_next(mut self, next: &'a dyn ObjectGraph) -> Self {
        self.next = Some(next);
        self
    }

    /// Adds named values (action parameters, for instance).
    #[must_use]
    pub fn with_locals<I>(mut self, locals: I) -> Self
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        self.locals.extend(locals);
        self
    }

    /// Adds named next-state values (query outputs, for instance).
    #[must_use]
    pub fn with_primed_locals<I>(mut self, locals: I) -> Self
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        self.primed_locals.extend(locals);
        self
    }

    /// The instance bound to `self`, if any.
    #[must_use]
    pub const fn self_id(&self) -> Option<InstanceId> {
        self.self_id
    }
}

/// Evaluates `expr` under `bindings`.
pub fn eval(expr: &Expression, bindings: &Bindings<'_>) -> Result<Value, EvalError> {
    Evaluator {
        bindings,
        scope: Vec::new(),
    }
    .eval(expr)
}

fn mismatch(op: &str, value: &Value) -> EvalError {
    EvalError::TypeMismatch {
        op: op.to_string(),
        found: value.type_name().to_string(),
    }
}

fn mismatch2(op: &str, left: &Value, right: &Value) -> EvalError {
    EvalError::TypeMismatch {
        op: op.to_string(),
        found: format!("{} and {}", left.type_name(), right.type_name()),
    }
}

fn truth(op: &str, value: &Value) -> Result<bool, EvalError> {
    value.as_bool().ok_or_else(|| mismatch(op, value))
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match left.compare_numeric(right) {
        Some(ordering) => ordering == Ordering::Equal,
        None => left == right,
    }
}

fn compare(op: BinaryOp, left: &Value, right: &Value) -> Result<Ordering, EvalError> {
    if let Some(ordering) = left.compare_numeric(right) {
        return Ok(ordering);
    }
    match (left, right) {
        (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
        _ => Err(mismatch2(op.symbol(), left, right)),
    }
}

fn elements(op: &str, value: &Value) -> Result<Vec<Value>, EvalError> {
    match value {
        Value::Set(items) => Ok(items.iter().cloned().collect()),
        Value::Tuple(items) => Ok(items.clone()),
        other => Err(mismatch(op, other)),
    }
}

fn set_operands<'v>(
    op: BinaryOp,
    left: &'v Value,
    right: &'v Value,
) -> Result<(&'v BTreeSet<Value>, &'v BTreeSet<Value>), EvalError> {
    match (left, right) {
        (Value::Set(a), Value::Set(b)) => Ok((a, b)),
        _ => Err(mismatch2(op.symbol(), left, right)),
    }
}

fn arithmetic(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, EvalError> {
    if let (Value::Int(a), Value::Int(b)) = (left, right) {
        let (a, b) = (*a, *b);
        let out = match op {
            BinaryOp::Add => a.checked_add(b),
            BinaryOp::Sub => a.checked_sub(b),
            BinaryOp::Mul => a.checked_mul(b),
            BinaryOp::IntDiv | BinaryOp::Mod | BinaryOp::Div if b == 0 => {
                return Err(EvalError::DivisionByZero)
            }
            BinaryOp::IntDiv => a.checked_div_euclid(b),
            BinaryOp::Mod => a.checked_rem_euclid(b),
            BinaryOp::Div => {
                return Rational64::from_integer(a)
                    .checked_div(&Rational64::from_integer(b))
                    .map(Value::rational)
                    .ok_or(EvalError::Overflow)
            }
            _ => return Err(mismatch2(op.symbol(), left, right)),
        };
        return out.map(Value::Int).ok_or(EvalError::Overflow);
    }

    let (Some(a), Some(b)) = (left.as_rational(), right.as_rational()) else {
        return Err(mismatch2(op.symbol(), left, right));
    };
    let out = match op {
        BinaryOp::Add => a.checked_add(&b),
        BinaryOp::Sub => a.checked_sub(&b),
        BinaryOp::Mul => a.checked_mul(&b),
        BinaryOp::Div if b.is_zero() => return Err(EvalError::DivisionByZero),
        BinaryOp::Div => a.checked_div(&b),
        _ => return Err(mismatch2(op.symbol(), left, right)),
    };
    out.map(Value::rational).ok_or(EvalError::Overflow)
}

fn length(function: &str, n: usize) -> Result<Value, EvalError> {
    let _ = function;
    i64::try_from(n).map(Value::Int).map_err(|_| EvalError::Overflow)
}

struct Evaluator<'b, 'a> {
    bindings: &'b Bindings<'a>,
    scope: Vec<(String, Value)>,
}

impl Evaluator<'_, '_> {
    fn eval(&mut self, expr: &Expression) -> Result<Value, EvalError> {
        match expr {
            Expression::Literal(value) => Ok(value.clone()),
            Expression::SelfRef => self
                .bindings
                .self_id
                .map(Value::Instance)
                .ok_or(EvalError::NoSelf),
            Expression::Identifier {
                name,
                primed: false,
            } => self.lookup(name),
            Expression::Identifier { name, primed: true } => self.lookup_primed(name),
            Expression::Field {
                target,
                field,
                primed,
            } => {
                let target = self.eval(target)?;
                self.field(&target, field, *primed)
            }
            Expression::Unary { op, operand } => {
                let value = self.eval(operand)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!truth("~", &value)?)),
                    UnaryOp::Negate => match value {
                        Value::Int(v) => v.checked_neg().map(Value::Int).ok_or(EvalError::Overflow),
                        Value::Rational(r) => Rational64::zero()
                            .checked_sub(&r)
                            .map(Value::rational)
                            .ok_or(EvalError::Overflow),
                        other => Err(mismatch("-", &other)),
                    },
                }
            }
            Expression::Binary { op, left, right } => self.binary(*op, left, right),
            Expression::Set(items) => {
                let mut out = BTreeSet::new();
                for item in items {
                    out.insert(self.eval(item)?);
                }
                Ok(Value::Set(out))
            }
            Expression::Tuple(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.eval(item)?);
                }
                Ok(Value::Tuple(out))
            }
            Expression::Record(fields) => {
                let mut out = BTreeMap::new();
                for (name, item) in fields {
                    out.insert(name.clone(), self.eval(item)?);
                }
                Ok(Value::Record(out))
            }
            Expression::Range { low, high } => {
                let low_value = self.eval(low)?;
                let high_value = self.eval(high)?;
                let (Some(lo), Some(hi)) = (low_value.as_int(), high_value.as_int()) else {
                    return Err(mismatch2("..", &low_value, &high_value));
                };
                if i128::from(hi) - i128::from(lo) + 1 > MAX_RANGE_LEN {
                    return Err(EvalError::RangeTooLarge { low: lo, high: hi });
                }
                Ok(Value::Set((lo..=hi).map(Value::Int).collect()))
            }
            Expression::Quantifier {
                kind,
                variable,
                domain,
                body,
            } => {
                let domain = self.eval(domain)?;
                let op = match kind {
                    QuantifierKind::ForAll => "\\A",
                    QuantifierKind::Exists => "\\E",
                };
                for element in elements(op, &domain)? {
                    self.scope.push((variable.clone(), element));
                    let outcome = self.eval(body);
                    self.scope.pop();
                    let holds = truth(op, &outcome?)?;
                    match kind {
                        QuantifierKind::ForAll if !holds => return Ok(Value::Bool(false)),
                        QuantifierKind::Exists if holds => return Ok(Value::Bool(true)),
                        _ => {}
                    }
                }
                Ok(Value::Bool(matches!(kind, QuantifierKind::ForAll)))
            }
            Expression::Conditional {
                condition,
                then_branch,
                else_branch,
            } => {
                let condition = self.eval(condition)?;
                if truth("IF", &condition)? {
                    self.eval(then_branch)
                } else {
                    self.eval(else_branch)
                }
            }
            Expression::Call { function, args } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(arg)?);
                }
                call(function, &values)
            }
        }
    }

    fn lookup(&self, name: &str) -> Result<Value, EvalError> {
        if let Some((_, value)) = self.scope.iter().rev().find(|(n, _)| n == name) {
            return Ok(value.clone());
        }
        if let Some(value) = self.bindings.locals.get(name) {
            return Ok(value.clone());
        }
        if let Some(id) = self.bindings.self_id {
            if let Some(value) = self.bindings.current.attribute(id, name) {
                return Ok(value);
            }
        }
        self.bindings
            .current
            .extent(name)
            .ok_or_else(|| EvalError::UnknownIdentifier {
                name: name.to_string(),
            })
    }

    fn lookup_primed(&self, name: &str) -> Result<Value, EvalError> {
        if let Some(value) = self.bindings.primed_locals.get(name) {
            return Ok(value.clone());
        }
        if let (Some(id), Some(next)) = (self.bindings.self_id, self.bindings.next) {
            if let Some(value) = next.attribute(id, name) {
                return Ok(value);
            }
        }
        Err(EvalError::PrimedUnavailable {
            name: name.to_string(),
        })
    }

    fn field(&self, target: &Value, field: &str, primed: bool) -> Result<Value, EvalError> {
        match target {
            Value::Instance(id) => {
                let graph = if primed {
                    self.bindings
                        .next
                        .ok_or_else(|| EvalError::PrimedUnavailable {
                            name: field.to_string(),
                        })?
                } else {
                    self.bindings.current
                };
                graph
                    .attribute(*id, field)
                    .or_else(|| graph.navigate(*id, field))
                    .ok_or_else(|| EvalError::UnknownField {
                        field: field.to_string(),
                        target: format!("instance {id}"),
                    })
            }
            Value::Record(fields) if !primed => {
                fields
                    .get(field)
                    .cloned()
                    .ok_or_else(|| EvalError::UnknownField {
                        field: field.to_string(),
                        target: "record".to_string(),
                    })
            }
            other => Err(EvalError::UnknownField {
                field: field.to_string(),
                target: other.type_name().to_string(),
            }),
        }
    }

    fn binary(
        &mut self,
        op: BinaryOp,
        left: &Expression,
        right: &Expression,
    ) -> Result<Value, EvalError> {
        let symbol = op.symbol();
        match op {
            BinaryOp::And => {
                if !truth(symbol, &self.eval(left)?)? {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(truth(symbol, &self.eval(right)?)?))
            }
            BinaryOp::Or => {
                if truth(symbol, &self.eval(left)?)? {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(truth(symbol, &self.eval(right)?)?))
            }
            BinaryOp::Implies => {
                if !truth(symbol, &self.eval(left)?)? {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(truth(symbol, &self.eval(right)?)?))
            }
            BinaryOp::Equiv => {
                let l = truth(symbol, &self.eval(left)?)?;
                let r = truth(symbol, &self.eval(right)?)?;
                Ok(Value::Bool(l == r))
            }
            _ => {
                let l = self.eval(left)?;
                let r = self.eval(right)?;
                strict_binary(op, &l, &r)
            }
        }
    }
}

fn strict_binary(op: BinaryOp, l: &Value, r: &Value) -> Result<Value, EvalError> {
    let symbol = op.symbol();
    match op {
        BinaryOp::Eq => Ok(Value::Bool(values_equal(l, r))),
        BinaryOp::NotEq => Ok(Value::Bool(!values_equal(l, r))),
        BinaryOp::Lt => Ok(Value::Bool(compare(op, l, r)? == Ordering::Less)),
        BinaryOp::Le => Ok(Value::Bool(compare(op, l, r)? != Ordering::Greater)),
        BinaryOp::Gt => Ok(Value::Bool(compare(op, l, r)? == Ordering::Greater)),
        BinaryOp::Ge => Ok(Value::Bool(compare(op, l, r)? != Ordering::Less)),
        BinaryOp::In | BinaryOp::NotIn => {
            let found = elements(symbol, r)?.iter().any(|item| values_equal(item, l));
            Ok(Value::Bool(found == matches!(op, BinaryOp::In)))
        }
        BinaryOp::Subset => {
            let (a, b) = set_operands(op, l, r)?;
            Ok(Value::Bool(a.is_subset(b)))
        }
        BinaryOp::Union => {
            let (a, b) = set_operands(op, l, r)?;
            Ok(Value::Set(a.union(b).cloned().collect()))
        }
        BinaryOp::Intersect => {
            let (a, b) = set_operands(op, l, r)?;
            Ok(Value::Set(a.intersection(b).cloned().collect()))
        }
        BinaryOp::Difference => {
            let (a, b) = set_operands(op, l, r)?;
            Ok(Value::Set(a.difference(b).cloned().collect()))
        }
        BinaryOp::Add
        | BinaryOp::Sub
        | BinaryOp::Mul
        | BinaryOp::Div
        | BinaryOp::IntDiv
        | BinaryOp::Mod => arithmetic(op, l, r),
        BinaryOp::And | BinaryOp::Or | BinaryOp::Implies | BinaryOp::Equiv => {
            let l = truth(symbol, l)?;
            let r = truth(symbol, r)?;
            Ok(Value::Bool(match op {
                BinaryOp::And => l && r,
                BinaryOp::Or => l || r,
                BinaryOp::Implies => !l || r,
                _ => l == r,
            }))
        }
    }
}

fn arity(function: &str, args: &[Value], expected: usize) -> Result<(), EvalError> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(EvalError::Arity {
            function: function.to_string(),
            expected,
            found: args.len(),
        })
    }
}

fn extremum(function: &str, args: &[Value], want: Ordering) -> Result<Value, EvalError> {
    let candidates = match args {
        [single] => elements(function, single)?,
        [a, b] => vec![a.clone(), b.clone()],
        _ => {
            return Err(EvalError::Arity {
                function: function.to_string(),
                expected: 1,
                found: args.len(),
            })
        }
    };
    let mut best: Option<Value> = None;
    for candidate in candidates {
        best = Some(match best {
            None => candidate,
            Some(current) => {
                let ordering = current
                    .compare_numeric(&candidate)
                    .ok_or_else(|| mismatch2(function, &current, &candidate))?;
                if ordering == want {
                    current
                } else {
                    candidate
                }
            }
        });
    }
    best.ok_or_else(|| EvalError::EmptyCollection {
        function: function.to_string(),
    })
}

fn call(function: &str, args: &[Value]) -> Result<Value, EvalError> {
    match function {
        "Cardinality" => {
            arity(function, args, 1)?;
            match &args[0] {
                Value::Set(items) => length(function, items.len()),
                other => Err(mismatch(function, other)),
            }
        }
        "Len" => {
            arity(function, args, 1)?;
            match &args[0] {
                Value::Tuple(items) => length(function, items.len()),
                Value::String(s) => length(function, s.chars().count()),
                other => Err(mismatch(function, other)),
            }
        }
        "Abs" => {
            arity(function, args, 1)?;
            match &args[0] {
                Value::Int(v) => v.checked_abs().map(Value::Int).ok_or(EvalError::Overflow),
                Value::Rational(r) => Ok(Value::rational(if *r < Rational64::zero() {
                    -*r
                } else {
                    *r
                })),
                other => Err(mismatch(function, other)),
            }
        }
        "Min" => extremum(function, args, Ordering::Less),
        "Max" => extremum(function, args, Ordering::Greater),
        _ => Err(EvalError::UnknownFunction {
            name: function.to_string(),
        }),
    }
}
