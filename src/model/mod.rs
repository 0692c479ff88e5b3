//! The read-only model graph the engine simulates.
//!
//! A [`Model`] is built once from a [`ModelDocument`]: classes and associations
//! are flattened out of their domains/subdomains and indexed by key, every
//! cross reference is resolved, and every expression is parsed. Nothing in the
//! simulation mutates it.

pub mod data_type;
pub mod document;
pub mod loader;
pub mod multiplicity;
pub mod surface;

pub use data_type::{DataType, DataTypeError, Span, SpanBound};
pub use document::{ActionTiming, ModelDocument};
pub use loader::{load_model_from_path, load_model_from_str};
pub use multiplicity::Multiplicity;
pub use surface::Surface;

use std::collections::{BTreeMap, BTreeSet};

use crate::error::ConfigError;
use crate::notation::{parse_expression, Expression};

use document::{
    ActionDocument, AssociationDocument, ClassDocument, GuaranteeDocument, ParameterDocument,
    QueryDocument,
};

/// Name of the reserved attribute holding an instance's state-machine state.
pub const STATE_FIELD: &str = "_state";

/// An expression together with the text it was parsed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceExpression {
    pub source: String,
    pub expr: Expression,
}

impl SourceExpression {
    /// Parses `source`; `context` names the owner in the error.
    pub fn parse(context: &str, source: &str) -> Result<Self, ConfigError> {
        let expr = parse_expression(source).map_err(|source_err| ConfigError::InvalidExpression {
            context: context.to_string(),
            expression: source.to_string(),
            source: source_err,
        })?;
        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    /// Parses `source` and rejects any next-state reference.
    pub fn parse_unprimed(context: &str, source: &str) -> Result<Self, ConfigError> {
        let parsed = Self::parse(context, source)?;
        if parsed.expr.references_primed() {
            return Err(ConfigError::UnexpectedPrimed {
                context: context.to_string(),
                expression: source.to_string(),
            });
        }
        Ok(parsed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub name: String,
    pub data_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub key: String,
    pub data_type: Option<String>,
    pub nullable: bool,
    pub derived: bool,
    pub default: Option<SourceExpression>,
    pub indexes: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateAction {
    pub action: String,
    pub when: ActionTiming,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct State {
    pub key: String,
    pub actions: Vec<StateAction>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub key: String,
    pub params: Vec<Parameter>,
    pub senders: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Guard {
    pub key: String,
    pub condition: SourceExpression,
}

/// A guarantee clause of an action or query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Guarantee {
    /// Primed assignments and/or post-conditions, split on top-level `/\`.
    Expression(SourceExpression),
    /// Explicit `target <- specification` binding; the specification is unprimed.
    Binding {
        target: String,
        specification: SourceExpression,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub action: String,
    pub target: Option<SourceExpression>,
    pub args: Vec<(String, SourceExpression)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Raise {
    pub event: String,
    pub target: Option<SourceExpression>,
    pub args: Vec<(String, SourceExpression)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub key: String,
    pub params: Vec<Parameter>,
    pub requires: Vec<SourceExpression>,
    pub guarantees: Vec<Guarantee>,
    pub safety_rules: Vec<SourceExpression>,
    pub calls: Vec<Call>,
    pub raises: Vec<Raise>,
    pub callers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub key: String,
    pub params: Vec<Parameter>,
    pub requires: Vec<SourceExpression>,
    pub guarantees: Vec<Guarantee>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub from: Option<String>,
    pub to: Option<String>,
    pub event: String,
    pub guard: Option<String>,
    pub action: Option<String>,
}

impl Transition {
    #[must_use]
    pub const fn is_creation(&self) -> bool {
        self.from.is_none()
    }

    #[must_use]
    pub const fn is_deletion(&self) -> bool {
        self.to.is_none()
    }

    /// Short human-readable label, e.g. `Open -close-> Closed`.
    #[must_use]
    pub fn label(&self) -> String {
        format!(
            "{} -{}-> {}",
            self.from.as_deref().unwrap_or("(new)"),
            self.event,
            self.to.as_deref().unwrap_or("(deleted)")
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Class {
    pub key: String,
    pub domain: String,
    pub subdomain: String,
    pub attributes: Vec<Attribute>,
    pub states: Vec<State>,
    pub events: BTreeMap<String, Event>,
    pub guards: BTreeMap<String, Guard>,
    pub actions: BTreeMap<String, Action>,
    pub queries: BTreeMap<String, Query>,
    pub transitions: Vec<Transition>,
    pub invariants: Vec<SourceExpression>,
}

impl Class {
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.key == key)
    }

    #[must_use]
    pub fn state(&self, key: &str) -> Option<&State> {
        self.states.iter().find(|s| s.key == key)
    }

    #[must_use]
    pub fn event(&self, key: &str) -> Option<&Event> {
        self.events.get(key)
    }

    #[must_use]
    pub fn guard(&self, key: &str) -> Option<&Guard> {
        self.guards.get(key)
    }

    #[must_use]
    pub fn action(&self, key: &str) -> Option<&Action> {
        self.actions.get(key)
    }

    #[must_use]
    pub fn query(&self, key: &str) -> Option<&Query> {
        self.queries.get(key)
    }

    /// Attribute keys per composite uniqueness index number.
    #[must_use]
    pub fn index_groups(&self) -> BTreeMap<u32, Vec<String>> {
        let mut groups: BTreeMap<u32, Vec<String>> = BTreeMap::new();
        for attr in &self.attributes {
            for index in &attr.indexes {
                groups.entry(*index).or_default().push(attr.key.clone());
            }
        }
        groups
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Association {
    pub key: String,
    pub from_class: String,
    pub to_class: String,
    /// How many `from` instances each `to` instance links to.
    pub from_multiplicity: Multiplicity,
    /// How many `to` instances each `from` instance links to.
    pub to_multiplicity: Multiplicity,
    pub from_role: String,
    pub to_role: String,
}

/// Flattened, indexed, fully parsed model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Model {
    key: String,
    classes: BTreeMap<String, Class>,
    associations: BTreeMap<String, Association>,
    invariants: Vec<SourceExpression>,
}

fn unique_keys<'a, I>(kind: &'static str, keys: I) -> Result<(), ConfigError>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = BTreeSet::new();
    for key in keys {
        if !seen.insert(key) {
            return Err(ConfigError::DuplicateKey {
                kind,
                key: key.to_string(),
            });
        }
    }
    Ok(())
}

fn invalid(reason: String) -> ConfigError {
    ConfigError::InvalidModel { reason }
}

fn parameters(docs: &[ParameterDocument]) -> Vec<Parameter> {
    docs.iter()
        .map(|p| Parameter {
            name: p.name.clone(),
            data_type: p.data_type.clone(),
        })
        .collect()
}

fn guarantees(context: &str, docs: &[GuaranteeDocument]) -> Result<Vec<Guarantee>, ConfigError> {
    docs.iter()
        .map(|doc| match doc {
            GuaranteeDocument::Expression(source) => {
                SourceExpression::parse(context, source).map(Guarantee::Expression)
            }
            GuaranteeDocument::Binding {
                target,
                specification,
            } => Ok(Guarantee::Binding {
                target: target.clone(),
                specification: SourceExpression::parse(context, specification)?,
            }),
        })
        .collect()
}

fn parse_all(context: &str, sources: &[String]) -> Result<Vec<SourceExpression>, ConfigError> {
    sources
        .iter()
        .map(|s| SourceExpression::parse(context, s))
        .collect()
}

fn arguments(
    context: &str,
    args: &BTreeMap<String, String>,
) -> Result<Vec<(String, SourceExpression)>, ConfigError> {
    args.iter()
        .map(|(name, source)| Ok((name.clone(), SourceExpression::parse_unprimed(context, source)?)))
        .collect()
}

fn optional_target(context: &str, target: Option<&String>) -> Result<Option<SourceExpression>, ConfigError> {
    target
        .map(|t| SourceExpression::parse_unprimed(context, t))
        .transpose()
}

fn build_action(class: &str, doc: &ActionDocument) -> Result<Action, ConfigError> {
    let context = format!("action {class}.{}", doc.key);
    let calls = doc
        .calls
        .iter()
        .map(|c| {
            Ok(Call {
                action: c.action.clone(),
                target: optional_target(&context, c.target.as_ref())?,
                args: arguments(&context, &c.args)?,
            })
        })
        .collect::<Result<_, ConfigError>>()?;
    let raises = doc
        .raises
        .iter()
        .map(|r| {
            Ok(Raise {
                event: r.event.clone(),
                target: optional_target(&context, r.target.as_ref())?,
                args: arguments(&context, &r.args)?,
            })
        })
        .collect::<Result<_, ConfigError>>()?;
    Ok(Action {
        key: doc.key.clone(),
        params: parameters(&doc.params),
        requires: parse_all(&context, &doc.requires)?,
        guarantees: guarantees(&context, &doc.guarantees)?,
        safety_rules: parse_all(&context, &doc.safety_rules)?,
        calls,
        raises,
        callers: doc.callers.clone(),
    })
}

fn build_query(class: &str, doc: &QueryDocument) -> Result<Query, ConfigError> {
    let context = format!("query {class}.{}", doc.key);
    Ok(Query {
        key: doc.key.clone(),
        params: parameters(&doc.params),
        requires: parse_all(&context, &doc.requires)?,
        guarantees: guarantees(&context, &doc.guarantees)?,
    })
}

fn build_class(domain: &str, subdomain: &str, doc: &ClassDocument) -> Result<Class, ConfigError> {
    let key = doc.key.as_str();
    unique_keys("attribute", doc.attributes.iter().map(|a| a.key.as_str()))?;
    unique_keys("state", doc.states.iter().map(|s| s.key.as_str()))?;
    unique_keys("event", doc.events.iter().map(|e| e.key.as_str()))?;
    unique_keys("guard", doc.guards.iter().map(|g| g.key.as_str()))?;
    unique_keys("action", doc.actions.iter().map(|a| a.key.as_str()))?;
    unique_keys("query", doc.queries.iter().map(|q| q.key.as_str()))?;

    let attributes = doc
        .attributes
        .iter()
        .map(|a| {
            if a.key == STATE_FIELD {
                return Err(invalid(format!("class {key} declares reserved attribute {STATE_FIELD}")));
            }
            let default = a
                .default
                .as_deref()
                .map(|src| SourceExpression::parse_unprimed(&format!("default of {key}.{}", a.key), src))
                .transpose()?;
            Ok(Attribute {
                key: a.key.clone(),
                data_type: a.data_type.clone(),
                nullable: a.nullable,
                derived: a.derived,
                default,
                indexes: a.indexes.clone(),
            })
        })
        .collect::<Result<Vec<_>, ConfigError>>()?;

    let guards = doc
        .guards
        .iter()
        .map(|g| {
            let condition =
                SourceExpression::parse_unprimed(&format!("guard {key}.{}", g.key), &g.expression)?;
            Ok((g.key.clone(), Guard { key: g.key.clone(), condition }))
        })
        .collect::<Result<BTreeMap<_, _>, ConfigError>>()?;

    let actions = doc
        .actions
        .iter()
        .map(|a| Ok((a.key.clone(), build_action(key, a)?)))
        .collect::<Result<BTreeMap<_, _>, ConfigError>>()?;

    let queries = doc
        .queries
        .iter()
        .map(|q| Ok((q.key.clone(), build_query(key, q)?)))
        .collect::<Result<BTreeMap<_, _>, ConfigError>>()?;

    let events: BTreeMap<String, Event> = doc
        .events
        .iter()
        .map(|e| {
            (
                e.key.clone(),
                Event {
                    key: e.key.clone(),
                    params: parameters(&e.params),
                    senders: e.senders.clone(),
                },
            )
        })
        .collect();

    let states: Vec<State> = doc
        .states
        .iter()
        .map(|s| State {
            key: s.key.clone(),
            actions: s
                .actions
                .iter()
                .map(|sa| StateAction {
                    action: sa.action.clone(),
                    when: sa.when,
                })
                .collect(),
        })
        .collect();

    for state in &states {
        for sa in &state.actions {
            if !actions.contains_key(&sa.action) {
                return Err(invalid(format!(
                    "state {key}.{} references unknown action {}",
                    state.key, sa.action
                )));
            }
        }
    }

    let has_state = |name: &str| states.iter().any(|s| s.key == name);
    let mut transitions = Vec::with_capacity(doc.transitions.len());
    for t in &doc.transitions {
        let transition = Transition {
            from: t.from.clone(),
            to: t.to.clone(),
            event: t.event.clone(),
            guard: t.guard.clone(),
            action: t.action.clone(),
        };
        let label = transition.label();
        if transition.is_creation() && transition.is_deletion() {
            return Err(invalid(format!("transition {key}: {label} has neither a from nor a to state")));
        }
        for state in [&t.from, &t.to].into_iter().flatten() {
            if !has_state(state) {
                return Err(invalid(format!("transition {key}: {label} references unknown state {state}")));
            }
        }
        if !events.contains_key(&t.event) {
            return Err(invalid(format!("transition {key}: {label} references unknown event {}", t.event)));
        }
        if let Some(guard) = &t.guard {
            if !guards.contains_key(guard) {
                return Err(invalid(format!("transition {key}: {label} references unknown guard {guard}")));
            }
        }
        if let Some(action) = &t.action {
            if !actions.contains_key(action) {
                return Err(invalid(format!("transition {key}: {label} references unknown action {action}")));
            }
        }
        transitions.push(transition);
    }

    Ok(Class {
        key: key.to_string(),
        domain: domain.to_string(),
        subdomain: subdomain.to_string(),
        attributes,
        states,
        events,
        guards,
        actions,
        queries,
        transitions,
        invariants: doc
            .invariants
            .iter()
            .map(|src| SourceExpression::parse_unprimed(&format!("invariant of {key}"), src))
            .collect::<Result<_, _>>()?,
    })
}

fn build_association(doc: &AssociationDocument) -> Result<Association, ConfigError> {
    Ok(Association {
        key: doc.key.clone(),
        from_class: doc.from.clone(),
        to_class: doc.to.clone(),
        from_multiplicity: doc.from_multiplicity.parse()?,
        to_multiplicity: doc.to_multiplicity.parse()?,
        from_role: doc.from_role.clone().unwrap_or_else(|| doc.key.clone()),
        to_role: doc.to_role.clone().unwrap_or_else(|| doc.key.clone()),
    })
}

impl Model {
    /// Flattens, validates and parses a model document.
    pub fn from_document(doc: &ModelDocument) -> Result<Self, ConfigError> {
        let mut classes = BTreeMap::new();
        let mut associations = BTreeMap::new();

        for domain in &doc.domains {
            for subdomain in &domain.subdomains {
                for class_doc in &subdomain.classes {
                    let class = build_class(&domain.key, &subdomain.key, class_doc)?;
                    if classes.insert(class.key.clone(), class).is_some() {
                        return Err(ConfigError::DuplicateKey {
                            kind: "class",
                            key: class_doc.key.clone(),
                        });
                    }
                }
                for assoc_doc in &subdomain.associations {
                    let assoc = build_association(assoc_doc)?;
                    if associations.insert(assoc.key.clone(), assoc).is_some() {
                        return Err(ConfigError::DuplicateKey {
                            kind: "association",
                            key: assoc_doc.key.clone(),
                        });
                    }
                }
            }
        }

        for assoc in associations.values() {
            for class in [&assoc.from_class, &assoc.to_class] {
                if !classes.contains_key(class) {
                    return Err(invalid(format!(
                        "association {} references unknown class {class}",
                        assoc.key
                    )));
                }
            }
        }

        Ok(Self {
            key: doc.key.clone(),
            classes,
            associations,
            invariants: parse_all("model invariant", &doc.invariants)?,
        })
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub fn class(&self, key: &str) -> Option<&Class> {
        self.classes.get(key)
    }

    /// Classes in key order.
    pub fn classes(&self) -> impl Iterator<Item = &Class> {
        self.classes.values()
    }

    #[must_use]
    pub fn association(&self, key: &str) -> Option<&Association> {
        self.associations.get(key)
    }

    /// Associations in key order.
    pub fn associations(&self) -> impl Iterator<Item = &Association> {
        self.associations.values()
    }

    /// Associations with `class` at either end, in key order.
    pub fn associations_of<'a>(&'a self, class: &'a str) -> impl Iterator<Item = &'a Association> + 'a {
        self.associations
            .values()
            .filter(move |a| a.from_class == class || a.to_class == class)
    }

    /// Model-wide invariants. They may still contain primes; the invariant
    /// checker rejects those at construction.
    #[must_use]
    pub fn invariants(&self) -> &[SourceExpression] {
        &self.invariants
    }
}
