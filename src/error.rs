//! Error types for modelsim.
//!
//! Errors are strongly typed using thiserror and split into two channels:
//! configuration errors surface while a model or checker is being loaded,
//! execution errors abort the operation that raised them. Contract
//! violations found while simulating are *not* errors; they are reported as
//! [`Violation`](crate::simulation::Violation) values.

use thiserror::Error;

use crate::notation::{EvalError, ParseError};

/// Load-time configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid expression in {context}: '{expression}': {source}")]
    InvalidExpression {
        context: String,
        expression: String,
        #[source]
        source: ParseError,
    },

    #[error("Expression in {context} must not reference a primed variable: '{expression}'")]
    UnexpectedPrimed {
        context: String,
        expression: String,
    },

    #[error("Duplicate {kind} key '{key}'")]
    DuplicateKey {
        kind: &'static str,
        key: String,
    },

    #[error("Invalid multiplicity '{value}': {reason}")]
    InvalidMultiplicity {
        value: String,
        reason: String,
    },

    #[error("Invalid model: {reason}")]
    InvalidModel {
        reason: String,
    },

    #[error("Invalid simulation config: {reason}")]
    InvalidConfig {
        reason: String,
    },

    #[error("Failed to read '{path}': {message}")]
    Io {
        path: String,
        message: String,
    },

    #[error("Failed to parse model document: {message}")]
    Json {
        message: String,
    },
}

/// Hard errors raised while executing actions, transitions and steps.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Invalid expression in {context}: '{expression}': {reason}")]
    InvalidExpression {
        context: String,
        expression: String,
        reason: String,
    },

    #[error("Evaluation of '{expression}' failed: {source}")]
    Evaluation {
        expression: String,
        #[source]
        source: EvalError,
    },

    #[error("Requires clause of action '{action}' not satisfied: '{expression}' ({reason})")]
    RequiresFailed {
        action: String,
        expression: String,
        reason: String,
    },

    #[error("Requires clause of action '{action}' references a primed variable: '{expression}'")]
    PrimedInRequires {
        action: String,
        expression: String,
    },

    #[error("Safety rule of action '{action}' references no primed variable: '{expression}'")]
    SafetyRuleWithoutPrime {
        action: String,
        expression: String,
    },

    #[error("Guarantee of action '{action}' cannot be applied: {reason}")]
    InvalidGuarantee {
        action: String,
        reason: String,
    },

    #[error("Action '{action}' attempted to write the reserved state field of instance {instance}")]
    StateFieldWrite {
        action: String,
        instance: u64,
    },

    #[error(
        "Re-entrant write: action '{second_action}' wrote instance {instance} already written by '{first_action}'"
    )]
    ReentrantWrite {
        instance: u64,
        first_action: String,
        second_action: String,
    },

    #[error("Guard deadlock: no guard of event '{event}' on class '{class}' holds in state '{state}'")]
    GuardDeadlock {
        class: String,
        event: String,
        state: String,
    },

    #[error(
        "Non-deterministic guards: event '{event}' on class '{class}' in state '{state}' enables {transitions:?}"
    )]
    NonDeterministicGuards {
        class: String,
        event: String,
        state: String,
        transitions: Vec<String>,
    },

    #[error("No transition of class '{class}' handles event '{event}' in state '{state}'")]
    NoTransition {
        class: String,
        event: String,
        state: String,
    },

    #[error("{kind} not found: {key}")]
    NotFound {
        kind: &'static str,
        key: String,
    },

    #[error("Instance not found: {id}")]
    InstanceNotFound {
        id: u64,
    },

    #[error("Mandatory association '{association}' requires class '{class}' to have a creation transition")]
    NoCreationPath {
        class: String,
        association: String,
    },

    #[error("{limit_type} depth limit exceeded (max: {max_value})")]
    DepthExceeded {
        limit_type: &'static str,
        max_value: usize,
    },

    #[error("Could not generate unique index values for class '{class}' after {attempts} attempts")]
    IndexValuesExhausted {
        class: String,
        attempts: usize,
    },

    #[error("No simulatable classes in model")]
    NoSimulatableClasses,

    #[error("Deadlock: no action is available in the current state")]
    Deadlock,
}

impl ExecutionError {
    /// Shorthand for a missing model element.
    #[must_use]
    pub fn not_found(kind: &'static str, key: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            key: key.into(),
        }
    }
}

/// Top-level error type for modelsim.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl SimError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a configuration error.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Returns true if this is an execution error.
    #[must_use]
    pub const fn is_execution(&self) -> bool {
        matches!(self, Self::Execution(_))
    }

    /// Returns true if this is the selection deadlock signal.
    #[must_use]
    pub const fn is_deadlock(&self) -> bool {
        matches!(self, Self::Execution(ExecutionError::Deadlock))
    }
}

/// Result type alias for modelsim operations.
pub type SimResult<T> = Result<T, SimError>;
