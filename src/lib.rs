//! # modelsim - Random-walk simulation of class and state-machine models
//!
//! modelsim takes a declarative model (classes with attributes and state
//! machines, associations with multiplicities, actions with requires and
//! guarantee clauses, invariants) and drives it with a seeded random walk.
//! Every step is checked against the model's contracts and the resulting
//! trace is reproducible from `(model, seed, max_steps)`.
//!
//! ## Core Concepts
//!
//! - **Model**: The read-only graph of classes, associations and parsed expressions
//! - **SimulationState**: Instances, their attribute values and the links between them
//! - **Step**: One externally chosen creation, event or do action, plus everything it triggered
//! - **Violation**: A contract that did not hold, reported as data rather than an error
//!
//! ## Usage
//!
//! ```rust,ignore
//! use modelsim::{load_model_from_path, SimulationConfig, SimulationEngine};
//!
//! let model = load_model_from_path("orders.json")?;
//! let config = SimulationConfig::default().with_seed(7).with_max_steps(200);
//! let result = SimulationEngine::new(&model, config)?.run()?;
//! for violation in &result.violations {
//!     println!("{violation}");
//! }
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod checks;
pub mod error;
pub mod model;
pub mod notation;
pub mod simulation;
pub mod value;

pub use checks::{
    DataTypeChecker, IndexUniquenessChecker, InvariantChecker, LivenessChecker, ModelCheckers,
    MultiplicityChecker,
};
pub use error::{ConfigError, ExecutionError, SimError, SimResult};
pub use model::{load_model_from_path, load_model_from_str, DataType, Model, Multiplicity, Surface};
pub use notation::{parse_expression, Expression, ParseError};
pub use simulation::{
    ActionExecutor, ActionSelector, InstanceId, SimRng, SimulationConfig, SimulationEngine,
    SimulationResult, SimulationState, SimulationStep, StepKind, TerminationReason, Violation,
    ViolationType,
};
pub use value::Value;
