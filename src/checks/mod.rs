//! Contract validators.
//!
//! Violations found here are values, never errors: every checker returns a
//! `Vec<Violation>` and leaves deciding what to do with them to the caller.
//! Only building a checker can fail, with a [`ConfigError`].

pub mod data_types;
pub mod index_uniqueness;
pub mod invariants;
pub mod liveness;
pub mod multiplicity;

pub use data_types::DataTypeChecker;
pub use index_uniqueness::IndexUniquenessChecker;
pub use invariants::InvariantChecker;
pub use liveness::LivenessChecker;
pub use multiplicity::MultiplicityChecker;

use crate::error::ConfigError;
use crate::model::Model;

/// The checkers an action commit runs, built once per engine.
#[derive(Debug, Clone)]
pub struct ModelCheckers {
    pub invariants: InvariantChecker,
    pub data_types: DataTypeChecker,
    pub index_uniqueness: IndexUniquenessChecker,
}

impl ModelCheckers {
    pub fn new(model: &Model) -> Result<Self, ConfigError> {
        Ok(Self {
            invariants: InvariantChecker::new(model)?,
            data_types: DataTypeChecker::new(model),
            index_uniqueness: IndexUniquenessChecker::new(model),
        })
    }
}
