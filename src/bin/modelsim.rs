//! modelsim CLI
//!
//! Loads a model document, runs one seeded simulation and reports what broke.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use modelsim::{
    load_model_from_path, SimResult, SimulationConfig, SimulationEngine, SimulationResult, Surface,
};

#[derive(Parser, Debug)]
#[command(name = "modelsim")]
#[command(about = "Random-walk simulation of class and state-machine models", long_about = None)]
struct Args {
    /// Model document (JSON)
    model: PathBuf,

    /// PRNG seed; the same seed replays the same trace
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Upper bound on top-level steps
    #[arg(short = 'n', long, default_value = "100")]
    max_steps: usize,

    /// Stop after the first step that records a violation
    #[arg(long)]
    stop_on_violation: bool,

    /// Restrict the run to these classes (comma separated)
    #[arg(long, value_delimiter = ',')]
    classes: Vec<String>,

    /// Print the full result as JSON
    #[arg(long)]
    json: bool,

    /// Debug-level logging
    #[arg(short, long)]
    verbose: bool,
}

fn run(args: &Args) -> SimResult<SimulationResult> {
    let model = load_model_from_path(&args.model)?;
    let mut config = SimulationConfig::default()
        .with_seed(args.seed)
        .with_max_steps(args.max_steps)
        .with_stop_on_violation(args.stop_on_violation);
    if !args.classes.is_empty() {
        config = config.with_surface(Surface::new(args.classes.iter().cloned()));
    }
    SimulationEngine::new(&model, config)?.run()
}

fn print_summary(result: &SimulationResult) {
    println!(
        "seed={} steps={}/{} reason={}",
        result.seed, result.steps_taken, result.max_steps, result.termination_reason
    );
    for step in &result.steps {
        let event = step.event.as_deref().or(step.action.as_deref()).unwrap_or("-");
        println!(
            "  #{:<4} {:<10} {}.{} -> {}",
            step.number,
            step.kind.as_str(),
            step.class_key,
            event,
            step.to_state.as_deref().unwrap_or("-")
        );
    }
    if result.violations.is_empty() {
        println!("no violations");
    } else {
        println!("{} violation(s):", result.violations.len());
        for violation in &result.violations {
            println!("  {violation}");
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let result = match run(&args) {
        Ok(result) => result,
        Err(e) => {
            error!("{e}");
            return ExitCode::from(2);
        }
    };

    if args.json {
        match serde_json::to_string_pretty(&result) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                error!("failed to serialize result: {e}");
                return ExitCode::from(2);
            }
        }
    } else {
        print_summary(&result);
        if let Ok(fingerprint) = result.fingerprint() {
            info!(%fingerprint, "trace fingerprint");
        }
    }

    if result.has_violations() {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    }
}
