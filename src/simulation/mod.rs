//! The simulation engine.
//!
//! Everything a run mutates lives in one [`SimulationState`]. Effects of an
//! action chain are collected in an [`ExecutionContext`] and applied in one
//! step, so checkers only ever observe a fully applied state.

pub mod actions;
pub mod bindings;
pub mod catalog;
pub mod config;
pub mod context;
pub mod creation_chain;
pub mod engine;
pub mod rng;
pub mod selector;
pub mod state;
pub mod state_actions;
pub mod step;
pub mod transitions;
pub mod violation;

pub use actions::{ActionExecutor, ActionResult, QueryResult};
pub use bindings::StateView;
pub use catalog::{CatalogAssociation, CatalogClass, ClassCatalog, DoAction, EventGroup, ParamSpec};
pub use config::{SimulationConfig, INDEX_VALUE_ATTEMPTS, MAX_CALL_DEPTH, MAX_CASCADE_DEPTH};
pub use context::{ExecutionContext, PrimedAssignment, RaisedEvent};
pub use creation_chain::CreationChainHandler;
pub use engine::{SimulationEngine, SimulationResult, TerminationReason};
pub use rng::SimRng;
pub use selector::{ActionSelector, PendingAction};
pub use state::{ClassInstance, InstanceId, Link, SimulationState};
pub use state_actions::StateActionExecutor;
pub use step::{SimulationStep, StepExecutor, StepKind};
pub use transitions::{CreationSource, TransitionResult};
pub use violation::{Violation, ViolationType};
