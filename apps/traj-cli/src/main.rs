use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;
use traj_app::{AppError, AppResult, ModelRegistry, RunOutcome, compile_case, load_case, run_problem};

#[derive(Parser)]
#[command(name = "traj")]
#[command(about = "Collocation trajectory optimization from YAML case files", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a case file and transcribe its phase without solving
    Validate {
        /// Path to the case YAML file
        case_path: PathBuf,
    },
    /// List the built-in ODE models
    Models,
    /// Solve a case
    Run {
        /// Path to the case YAML file
        case_path: PathBuf,
        /// Simulate the optimized controls and compare end states
        #[arg(long)]
        simulate: bool,
        /// Print the full outcome as JSON instead of a summary
        #[arg(long)]
        json: bool,
        /// Also write the full outcome as JSON to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> AppResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let registry = ModelRegistry::default();

    match cli.command {
        Commands::Validate { case_path } => cmd_validate(&case_path, &registry),
        Commands::Models => {
            for name in registry.names() {
                println!("{name}");
            }
            Ok(())
        }
        Commands::Run {
            case_path,
            simulate,
            json,
            output,
        } => cmd_run(&case_path, &registry, simulate, json, output.as_deref()),
    }
}

fn cmd_validate(case_path: &Path, registry: &ModelRegistry) -> AppResult<()> {
    println!("Validating case: {}", case_path.display());
    let case = load_case(case_path)?;
    let mut problem = compile_case(&case, registry)?;
    problem.setup()?;
    for name in problem.trajectory.phase_names() {
        let tx = problem.trajectory.transcription(name)?;
        println!(
            "  {}: {} segments, {} variables, {} constraints",
            name,
            tx.mesh().num_segments(),
            tx.num_variables(),
            tx.num_constraints()
        );
    }
    println!("✓ Case is valid");
    Ok(())
}

fn cmd_run(
    case_path: &Path,
    registry: &ModelRegistry,
    simulate: bool,
    json: bool,
    output: Option<&Path>,
) -> AppResult<()> {
    let case = load_case(case_path)?;
    info!(case = %case.name, model = %case.model.name, "case loaded");
    let mut problem = compile_case(&case, registry)?;
    let outcome = run_problem(&mut problem, simulate || case.simulate)?;

    if let Some(path) = output {
        let content = serde_json::to_string_pretty(&outcome)?;
        std::fs::write(path, content).map_err(|source| AppError::CaseFileWrite {
            path: path.to_path_buf(),
            source,
        })?;
    }
    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_summary(&outcome);
    }
    Ok(())
}

fn print_summary(outcome: &RunOutcome) {
    let solution = &outcome.solution;
    if outcome.converged {
        println!("✓ {} converged", outcome.problem);
    } else if let Some(failure) = outcome.failure {
        println!("✗ {} did not converge: {}", outcome.problem, failure);
    }
    if let Some(report) = &outcome.report {
        println!(
            "  iterations: {}  variables: {}  constraints: {}  colors: {}",
            report.iterations, report.num_variables, report.num_constraints, report.num_colors
        );
    }
    println!("  objective:  {:.6e}", solution.objective);
    println!(
        "  time:       [{:.6}, {:.6}]",
        solution.buffer.t_initial,
        solution.buffer.t_initial + solution.buffer.t_duration
    );
    println!("  inf_pr: {:.3e}  inf_du: {:.3e}", solution.inf_pr, solution.inf_du);

    if !outcome.diagnostics.is_empty() {
        println!("  Active or violated constraints:");
        for row in &outcome.diagnostics {
            println!("    {row}");
        }
    }

    if let Some(report) = &outcome.verification {
        println!("  Simulation ({} steps):", report.steps);
        for d in &report.discrepancies {
            println!(
                "    {:<12} collocated {:>14.6e}  simulated {:>14.6e}  scaled diff {:.3e}",
                d.state, d.collocated, d.simulated, d.scaled
            );
        }
        for warning in &report.warnings {
            println!("    warning: {warning:?}");
        }
    }
    println!("  wall time: {:.3} s", outcome.timing.total_time_s);
}
