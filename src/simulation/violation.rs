//! Contract violations found while simulating.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::InstanceId;

/// Which contract a violation breaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationType {
    ModelInvariant,
    ClassInvariant,
    PostCondition,
    SafetyRule,
    DataType,
    /// A data-type rule that could not be parsed when checkers were built.
    DataTypeDeclaration,
    IndexUniqueness,
    Multiplicity,
    LivenessClass,
    LivenessAttribute,
    LivenessAssociation,
}

impl ViolationType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ModelInvariant => "model_invariant",
            Self::ClassInvariant => "class_invariant",
            Self::PostCondition => "post_condition",
            Self::SafetyRule => "safety_rule",
            Self::DataType => "data_type",
            Self::DataTypeDeclaration => "data_type_declaration",
            Self::IndexUniqueness => "index_uniqueness",
            Self::Multiplicity => "multiplicity",
            Self::LivenessClass => "liveness_class",
            Self::LivenessAttribute => "liveness_attribute",
            Self::LivenessAssociation => "liveness_association",
        }
    }

    #[must_use]
    pub const fn is_liveness(self) -> bool {
        matches!(
            self,
            Self::LivenessClass | Self::LivenessAttribute | Self::LivenessAssociation
        )
    }
}

impl fmt::Display for ViolationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One failed contract instance. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    #[serde(rename = "type")]
    pub kind: ViolationType,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<InstanceId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_key: Option<String>,
    /// Source text of the offending expression.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
    /// Evaluation message, when the expression errored instead of yielding FALSE.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl Violation {
    #[must_use]
    pub fn new(kind: ViolationType, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            instance_id: None,
            class_key: None,
            expression: None,
            detail: None,
        }
    }

    #[must_use]
    pub const fn with_instance(mut self, id: InstanceId) -> Self {
        self.instance_id = Some(id);
        self
    }

    #[must_use]
    pub fn with_class(mut self, class_key: impl Into<String>) -> Self {
        self.class_key = Some(class_key.into());
        self
    }

    #[must_use]
    pub fn with_expression(mut self, source: impl Into<String>) -> Self {
        self.expression = Some(source.into());
        self
    }

    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)?;
        if let Some(detail) = &self.detail {
            write!(f, " ({detail})")?;
        }
        Ok(())
    }
}

/// Appends `incoming` to `into`, skipping violations already recorded.
pub(crate) fn merge_violations(into: &mut Vec<Violation>, incoming: impl IntoIterator<Item = Violation>) {
    for violation in incoming {
        if !into.contains(&violation) {
            into.push(violation);
        }
    }
}
