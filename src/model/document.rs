//! Serialized shape of a model document.
//!
//! Documents nest classes and associations under domains and subdomains.
//! [`Model::from_document`](super::Model::from_document) flattens and indexes
//! them, parsing every expression once.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Root of a model document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDocument {
    #[serde(default = "default_model_key")]
    pub key: String,
    #[serde(default)]
    pub domains: Vec<DomainDocument>,
    /// Model-wide invariants, quantifying over class extents.
    #[serde(default)]
    pub invariants: Vec<String>,
}

fn default_model_key() -> String {
    "model".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainDocument {
    pub key: String,
    #[serde(default)]
    pub subdomains: Vec<SubdomainDocument>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubdomainDocument {
    pub key: String,
    #[serde(default)]
    pub classes: Vec<ClassDocument>,
    #[serde(default)]
    pub associations: Vec<AssociationDocument>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassDocument {
    pub key: String,
    #[serde(default)]
    pub attributes: Vec<AttributeDocument>,
    #[serde(default)]
    pub states: Vec<StateDocument>,
    #[serde(default)]
    pub events: Vec<EventDocument>,
    #[serde(default)]
    pub guards: Vec<GuardDocument>,
    #[serde(default)]
    pub actions: Vec<ActionDocument>,
    #[serde(default)]
    pub queries: Vec<QueryDocument>,
    #[serde(default)]
    pub transitions: Vec<TransitionDocument>,
    /// Invariants evaluated with `self` bound to each live instance.
    #[serde(default)]
    pub invariants: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDocument {
    pub key: String,
    #[serde(default)]
    pub data_type: Option<String>,
    #[serde(default = "default_true")]
    pub nullable: bool,
    /// Derived attributes are computed, so liveness never expects a write.
    #[serde(default)]
    pub derived: bool,
    #[serde(default)]
    pub default: Option<String>,
    /// Composite uniqueness indexes this attribute takes part in.
    #[serde(default)]
    pub indexes: Vec<u32>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateDocument {
    pub key: String,
    #[serde(default)]
    pub actions: Vec<StateActionDocument>,
}

/// When a state-scoped action runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionTiming {
    Entry,
    Exit,
    Do,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateActionDocument {
    pub action: String,
    pub when: ActionTiming,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterDocument {
    pub name: String,
    #[serde(default)]
    pub data_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDocument {
    pub key: String,
    #[serde(default)]
    pub params: Vec<ParameterDocument>,
    /// Classes that send this event as part of their own logic.
    #[serde(default)]
    pub senders: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardDocument {
    pub key: String,
    pub expression: String,
}

/// A guarantee, either as a notation expression or as an explicit binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GuaranteeDocument {
    Binding {
        target: String,
        specification: String,
    },
    Expression(String),
}

/// An action invoked from inside another action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallDocument {
    pub action: String,
    /// Expression for the target instance; `self` when absent.
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub args: BTreeMap<String, String>,
}

/// An event sent to an instance once the raising chain has committed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaiseDocument {
    pub event: String,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub args: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionDocument {
    pub key: String,
    #[serde(default)]
    pub params: Vec<ParameterDocument>,
    #[serde(default)]
    pub requires: Vec<String>,
    #[serde(default)]
    pub guarantees: Vec<GuaranteeDocument>,
    #[serde(default)]
    pub safety_rules: Vec<String>,
    #[serde(default)]
    pub calls: Vec<CallDocument>,
    #[serde(default)]
    pub raises: Vec<RaiseDocument>,
    /// Classes that invoke this action as part of their own logic.
    #[serde(default)]
    pub callers: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryDocument {
    pub key: String,
    #[serde(default)]
    pub params: Vec<ParameterDocument>,
    #[serde(default)]
    pub requires: Vec<String>,
    #[serde(default)]
    pub guarantees: Vec<GuaranteeDocument>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionDocument {
    /// Absent for creation transitions.
    #[serde(default)]
    pub from: Option<String>,
    /// Absent for deletion transitions.
    #[serde(default)]
    pub to: Option<String>,
    pub event: String,
    #[serde(default)]
    pub guard: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociationDocument {
    pub key: String,
    pub from: String,
    pub to: String,
    /// How many `from` instances each `to` instance links to.
    #[serde(default = "default_multiplicity")]
    pub from_multiplicity: String,
    /// How many `to` instances each `from` instance links to.
    #[serde(default = "default_multiplicity")]
    pub to_multiplicity: String,
    /// Navigation name used from a `to` instance; defaults to the key.
    #[serde(default)]
    pub from_role: Option<String>,
    /// Navigation name used from a `from` instance; defaults to the key.
    #[serde(default)]
    pub to_role: Option<String>,
}

fn default_multiplicity() -> String {
    "*".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guarantees_accept_both_shapes() {
        let json = r#"["self.amount' = 1", {"target": "self.total", "specification": "2"}]"#;
        let parsed: Vec<GuaranteeDocument> = serde_json::from_str(json).unwrap();
        assert_eq!(
            parsed[0],
            GuaranteeDocument::Expression("self.amount' = 1".to_string())
        );
        assert!(matches!(parsed[1], GuaranteeDocument::Binding { .. }));
    }

    #[test]
    fn defaults_fill_missing_fields() {
        let class: ClassDocument = serde_json::from_str(r#"{"key": "Order"}"#).unwrap();
        assert!(class.states.is_empty());
        let attr: AttributeDocument = serde_json::from_str(r#"{"key": "amount"}"#).unwrap();
        assert!(attr.nullable);
        assert!(!attr.derived);
        let assoc: AssociationDocument =
            serde_json::from_str(r#"{"key": "places", "from": "Customer", "to": "Order"}"#).unwrap();
        assert_eq!(assoc.to_multiplicity, "*");
    }
}
