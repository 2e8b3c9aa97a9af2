//! One-call solve-then-simulate entry point.

use serde::Serialize;
use tracing::{info, warn};
use traj_core::Timer;
use traj_driver::{ConstraintDiagnostic, DriverError, SolveDriver, SolveReport, Solution, SolverFailure};
use traj_optimizer::InteriorPoint;
use traj_sim::{SimTrajectory, VerificationReport, verify};

use crate::error::{AppError, AppResult};
use crate::problem::Problem;

/// Wall-clock breakdown of a run.
#[derive(Clone, Debug, Default, Serialize)]
pub struct RunTimingSummary {
    pub setup_time_s: f64,
    pub solve_time_s: f64,
    pub simulate_time_s: f64,
    pub total_time_s: f64,
}

/// Everything a caller may persist or print after a run.
#[derive(Clone, Debug, Serialize)]
pub struct RunOutcome {
    pub problem: String,
    pub phase: String,
    pub converged: bool,
    pub failure: Option<SolverFailure>,
    pub report: Option<SolveReport>,
    /// Converged solution, or the last iterate of a failed solve.
    pub solution: Solution,
    /// Active or violated constraints of the returned solution.
    pub diagnostics: Vec<ConstraintDiagnostic>,
    pub verification: Option<VerificationReport>,
    pub simulation: Option<SimTrajectory>,
    pub timing: RunTimingSummary,
}

/// Set up `problem` if needed, solve its phase from the stored guess, and
/// optionally re-simulate the optimized controls.
///
/// A solver failure is not an error: the outcome carries `converged = false`,
/// the failure reason and the last iterate. Simulation still runs when
/// requested, which helps tell a bad guess from a bad model.
pub fn run_problem(problem: &mut Problem, simulate: bool) -> AppResult<RunOutcome> {
    let total = Timer::start("run");
    let mut timing = RunTimingSummary::default();

    let setup = Timer::start("setup");
    if !problem.is_set_up() {
        problem.setup()?;
    }
    timing.setup_time_s = setup.elapsed_s();

    let problem = &*problem;
    let phase = problem
        .trajectory
        .phase_names()
        .first()
        .map(|name| name.to_string())
        .ok_or_else(|| AppError::Validation("trajectory has no phases".into()))?;
    let transcription = problem.trajectory.transcription(&phase)?;
    let guess = problem.trajectory.guess_buffer(&phase)?;

    let solve = Timer::start("solve");
    let mut driver = SolveDriver::new(problem.driver.clone());
    driver.setup(transcription, guess)?;
    let mut solver = InteriorPoint::new(problem.solver.clone());
    let (report, failure, solution, diagnostics) = match driver.run(&mut solver) {
        Ok(report) => {
            let notable = report
                .diagnostics
                .iter()
                .filter(|d| d.is_notable())
                .cloned()
                .collect();
            let solution = driver.solution()?.clone();
            (Some(report), None, solution, notable)
        }
        Err(DriverError::Solver {
            failure,
            iterate,
            diagnostics,
        }) => (None, Some(failure), *iterate, diagnostics),
        Err(e) => return Err(e.into()),
    };
    timing.solve_time_s = solve.elapsed_s();
    let converged = failure.is_none();
    if let Some(failure) = failure {
        warn!(problem = %problem.name, %failure, "optimization did not converge");
    }

    let (verification, simulation) = if simulate {
        let sim = Timer::start("simulate");
        let result = verify(transcription, &solution.buffer, &problem.verify)?;
        timing.simulate_time_s = sim.elapsed_s();
        (Some(result.report), result.trajectory)
    } else {
        (None, None)
    };

    timing.total_time_s = total.elapsed_s();
    info!(
        problem = %problem.name,
        converged,
        objective = solution.objective,
        total_time_s = timing.total_time_s,
        "run finished"
    );
    Ok(RunOutcome {
        problem: problem.name.clone(),
        phase,
        converged,
        failure,
        report,
        solution,
        diagnostics,
        verification,
        simulation,
        timing,
    })
}
