//! The run loop.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::checks::{LivenessChecker, ModelCheckers};
use crate::error::{ExecutionError, SimError, SimResult};
use crate::model::Model;

use super::actions::ActionExecutor;
use super::catalog::ClassCatalog;
use super::config::SimulationConfig;
use super::selector::ActionSelector;
use super::step::{SimulationStep, StepExecutor};
use super::{SimRng, SimulationState, Violation, ViolationType};

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    MaxSteps,
    Violation,
    Deadlock,
}

impl TerminationReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MaxSteps => "max_steps",
            Self::Violation => "violation",
            Self::Deadlock => "deadlock",
        }
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a run produced.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationResult {
    pub run_id: Uuid,
    pub seed: u64,
    pub max_steps: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub steps: Vec<SimulationStep>,
    /// Every violation of the run: declaration problems, then per-step
    /// findings in step order, then liveness gaps.
    pub violations: Vec<Violation>,
    pub termination_reason: TerminationReason,
    pub steps_taken: usize,
    pub final_state: SimulationState,
}

impl SimulationResult {
    #[must_use]
    pub fn has_violations(&self) -> bool {
        !self.violations.is_empty()
    }

    pub fn violations_of(&self, kind: ViolationType) -> impl Iterator<Item = &Violation> {
        self.violations.iter().filter(move |v| v.kind == kind)
    }

    /// Hash of the step trace, termination reason and final state.
    ///
    /// Two runs of the same model, seed and step budget have the same
    /// fingerprint; run id and timestamps are not part of it.
    pub fn fingerprint(&self) -> SimResult<String> {
        let mut hasher = blake3::Hasher::new();
        serde_json::to_writer(
            &mut hasher,
            &(&self.steps, self.termination_reason, &self.final_state),
        )
        .map_err(|e| SimError::internal(format!("failed to serialize trace: {e}")))?;
        Ok(hasher.finalize().to_hex().to_string())
    }
}

/// Owns a model prepared for simulation and runs it.
#[derive(Debug, Clone)]
pub struct SimulationEngine {
    model: Model,
    config: SimulationConfig,
    catalog: ClassCatalog,
    checkers: ModelCheckers,
    liveness: LivenessChecker,
}

impl SimulationEngine {
    /// Validates `config`, applies its surface filter and precomputes the
    /// class catalog and checkers.
    pub fn new(model: &Model, config: SimulationConfig) -> SimResult<Self> {
        config.validate()?;
        let model = match &config.surface {
            Some(surface) => model.restrict(surface)?,
            None => model.clone(),
        };
        let catalog = ClassCatalog::build(&model);
        if catalog.is_empty() {
            return Err(ExecutionError::NoSimulatableClasses.into());
        }
        let checkers = ModelCheckers::new(&model)?;
        let liveness = LivenessChecker::new(&model, &catalog);
        Ok(Self {
            model,
            config,
            catalog,
            checkers,
            liveness,
        })
    }

    #[must_use]
    pub const fn model(&self) -> &Model {
        &self.model
    }

    #[must_use]
    pub const fn config(&self) -> &SimulationConfig {
        &self.config
    }

    #[must_use]
    pub const fn catalog(&self) -> &ClassCatalog {
        &self.catalog
    }

    /// Runs one simulation from an empty state.
    ///
    /// Each call starts from scratch with a fresh PRNG, so repeated calls
    /// produce the same trace.
    pub fn run(&self) -> SimResult<SimulationResult> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let SimulationConfig {
            max_steps,
            seed,
            stop_on_violation,
            ..
        } = self.config;
        info!(%run_id, seed, max_steps, model = self.model.key(), "simulation started");

        let mut rng = SimRng::new(seed);
        let mut state = SimulationState::new();
        let selector = ActionSelector::new(&self.catalog);
        let executor = StepExecutor::new(
            ActionExecutor::new(&self.model, &self.checkers),
            &self.catalog,
        );

        let mut violations = self.checkers.data_types.declaration_violations().to_vec();
        let mut steps = Vec::new();
        let mut termination_reason = TerminationReason::MaxSteps;

        for number in 1..=max_steps {
            let pending = match selector.select(&state, &mut rng) {
                Ok(pending) => pending,
                Err(ExecutionError::Deadlock) => {
                    termination_reason = TerminationReason::Deadlock;
                    break;
                }
                Err(e) => return Err(e.into()),
            };
            debug!(number, class = pending.class_key(), "step selected");

            let mut step = executor.execute(&mut state, &mut rng, &pending, number)?;
            let recorded: Vec<Violation> = step.all_violations().cloned().collect();
            step.violations.extend(
                self.checkers
                    .invariants
                    .check(&self.model, &state)
                    .into_iter()
                    .filter(|v| !recorded.contains(v)),
            );

            let found: Vec<Violation> = step.all_violations().cloned().collect();
            for violation in &found {
                warn!(step = number, %violation, "violation recorded");
            }
            let stop = stop_on_violation && !found.is_empty();
            violations.extend(found);
            steps.push(step);
            if stop {
                termination_reason = TerminationReason::Violation;
                break;
            }
        }

        violations.extend(self.liveness.check(&steps, &state));
        let finished_at = Utc::now();
        info!(
            %run_id,
            steps = steps.len(),
            reason = %termination_reason,
            violations = violations.len(),
            "simulation finished"
        );
        Ok(SimulationResult {
            run_id,
            seed,
            max_steps,
            started_at,
            finished_at,
            steps_taken: steps.len(),
            steps,
            violations,
            termination_reason,
            final_state: state,
        })
    }
}
