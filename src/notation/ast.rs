//! Expression tree for the model notation.

use std::collections::BTreeSet;

use crate::value::Value;

/// Prefix operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// Logical negation (`~`).
    Not,
    /// Arithmetic negation (`-`).
    Negate,
}

/// Infix operators.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    And,
    Or,
    Implies,
    Equiv,
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
    Subset,
    Union,
    Intersect,
    Difference,
    Add,
    Sub,
    Mul,
    Div,
    IntDiv,
    Mod,
}

impl BinaryOp {
    /// Notation spelling of the operator, used in error messages.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::And => "/\\",
            Self::Or => "\\/",
            Self::Implies => "=>",
            Self::Equiv => "<=>",
            Self::Eq => "=",
            Self::NotEq => "/=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::In => "\\in",
            Self::NotIn => "\\notin",
            Self::Subset => "\\subseteq",
            Self::Union => "\\union",
            Self::Intersect => "\\intersect",
            Self::Difference => "\\",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::IntDiv => "\\div",
            Self::Mod => "%",
        }
    }
}

/// Bounded quantifier kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantifierKind {
    /// `\A x \in S : P`
    ForAll,
    /// `\E x \in S : P`
    Exists,
}

/// A parsed expression.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expression {
    Literal(Value),
    Identifier {
        name: String,
        primed: bool,
    },
    SelfRef,
    Field {
        target: Box<Expression>,
        field: String,
        primed: bool,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expression>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Set(Vec<Expression>),
    Tuple(Vec<Expression>),
    Record(Vec<(String, Expression)>),
    Range {
        low: Box<Expression>,
        high: Box<Expression>,
    },
    Quantifier {
        kind: QuantifierKind,
        variable: String,
        domain: Box<Expression>,
        body: Box<Expression>,
    },
    Conditional {
        condition: Box<Expression>,
        then_branch: Box<Expression>,
        else_branch: Box<Expression>,
    },
    Call {
        function: String,
        args: Vec<Expression>,
    },
}

/// Left-hand side of a primed-assignment guarantee.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignmentTarget {
    /// `self.field' = expr`
    SelfField(String),
    /// `name' = expr`
    Name(String),
}

impl AssignmentTarget {
    /// Bare field / output name being assigned.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::SelfField(name) | Self::Name(name) => name,
        }
    }
}

impl Expression {
    /// Returns true if any sub-expression references a next-state value.
    #[must_use]
    pub fn references_primed(&self) -> bool {
        match self {
            Self::Literal(_) | Self::SelfRef => false,
            Self::Identifier { primed, .. } => *primed,
            Self::Field { target, primed, .. } => *primed || target.references_primed(),
            Self::Unary { operand, .. } => operand.references_primed(),
            Self::Binary { left, right, .. } => {
                left.references_primed() || right.references_primed()
            }
            Self::Set(items) | Self::Tuple(items) | Self::Call { args: items, .. } => {
                items.iter().any(Self::references_primed)
            }
            Self::Record(fields) => fields.iter().any(|(_, e)| e.references_primed()),
            Self::Range { low, high } => low.references_primed() || high.references_primed(),
            Self::Quantifier { domain, body, .. } => {
                domain.references_primed() || body.references_primed()
            }
            Self::Conditional {
                condition,
                then_branch,
                else_branch,
            } => {
                condition.references_primed()
                    || then_branch.references_primed()
                    || else_branch.references_primed()
            }
        }
    }

    /// Every identifier the expression mentions, bound or not.
    #[must_use]
    pub fn identifiers(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        self.collect_identifiers(&mut out);
        out
    }

    fn collect_identifiers<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        match self {
            Self::Literal(_) | Self::SelfRef => {}
            Self::Identifier { name, .. } => {
                out.insert(name.as_str());
            }
            Self::Field { target, .. } => target.collect_identifiers(out),
            Self::Unary { operand, .. } => operand.collect_identifiers(out),
            Self::Binary { left, right, .. } | Self::Range { low: left, high: right } => {
                left.collect_identifiers(out);
                right.collect_identifiers(out);
            }
            Self::Set(items) | Self::Tuple(items) | Self::Call { args: items, .. } => {
                items.iter().for_each(|e| e.collect_identifiers(out));
            }
            Self::Record(fields) => fields.iter().for_each(|(_, e)| e.collect_identifiers(out)),
            Self::Quantifier { domain, body, .. } => {
                domain.collect_identifiers(out);
                body.collect_identifiers(out);
            }
            Self::Conditional {
                condition,
                then_branch,
                else_branch,
            } => {
                condition.collect_identifiers(out);
                then_branch.collect_identifiers(out);
                else_branch.collect_identifiers(out);
            }
        }
    }

    /// Splits a top-level conjunction into its conjuncts.
    #[must_use]
    pub fn conjuncts(&self) -> Vec<&Expression> {
        let mut out = Vec::new();
        self.collect_conjuncts(&mut out);
        out
    }

    fn collect_conjuncts<'a>(&'a self, out: &mut Vec<&'a Expression>) {
        match self {
            Self::Binary {
                op: BinaryOp::And,
                left,
                right,
            } => {
                left.collect_conjuncts(out);
                right.collect_conjuncts(out);
            }
            other => out.push(other),
        }
    }

    /// Recognizes `name' = expr` and `self.field' = expr` with an unprimed right side.
    #[must_use]
    pub fn as_primed_assignment(&self) -> Option<(AssignmentTarget, &Expression)> {
        let Self::Binary {
            op: BinaryOp::Eq,
            left,
            right,
        } = self
        else {
            return None;
        };
        if right.references_primed() {
            return None;
        }
        match left.as_ref() {
            Self::Identifier { name, primed: true } => {
                Some((AssignmentTarget::Name(name.clone()), right.as_ref()))
            }
            Self::Field {
                target,
                field,
                primed: true,
            } if matches!(target.as_ref(), Self::SelfRef) => {
                Some((AssignmentTarget::SelfField(field.clone()), right.as_ref()))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notation::parse_expression;

    #[test]
    fn primed_detection_walks_the_tree() {
        let e = parse_expression("\\A o \\in Order : o.amount' > 0").unwrap();
        assert!(e.references_primed());
        let e = parse_expression("IF self.open THEN 1 ELSE 2").unwrap();
        assert!(!e.references_primed());
    }

    #[test]
    fn conjuncts_flatten_nested_and() {
        let e = parse_expression("a /\\ (b /\\ c) /\\ d").unwrap();
        assert_eq!(e.conjuncts().len(), 4);
        let e = parse_expression("a \\/ b").unwrap();
        assert_eq!(e.conjuncts().len(), 1);
    }

    #[test]
    fn assignment_shapes() {
        let e = parse_expression("self.amount' = self.amount + 10").unwrap();
        let (target, _) = e.as_primed_assignment().unwrap();
        assert_eq!(target, AssignmentTarget::SelfField("amount".to_string()));

        let e = parse_expression("total' = 3").unwrap();
        let (target, _) = e.as_primed_assignment().unwrap();
        assert_eq!(target.name(), "total");

        // Prime on the right side, or not at the top, is a post-condition.
        assert!(parse_expression("self.a' = self.b'").unwrap().as_primed_assignment().is_none());
        assert!(parse_expression("self.a' > 3").unwrap().as_primed_assignment().is_none());
        assert!(parse_expression("other.a' = 3").unwrap().as_primed_assignment().is_none());
    }
}
