//! Solve driver state machine.
//!
//! ```text
//! Uninitialized -> Setup -> Iterating -> Converged
//!                                     -> Failed
//! ```
//!
//! A finished driver (converged or failed) may be set up again with a new
//! guess. The driver owns the NLP view of the transcription while iterating;
//! the solution snapshot is only readable once `run` has returned.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use traj_core::Deadline;
use traj_nlp::{
    IterationReport, IterationStatus, NlpError, NlpProblem, NlpSolver, TranscribedNlp,
};
use traj_transcription::{Transcription, TrajectoryBuffer};

use crate::config::DriverConfig;
use crate::diagnostics::{ConstraintDiagnostic, constraint_table};
use crate::error::{DriverError, DriverResult, SolverFailure};
use crate::solution::Solution;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverState {
    Uninitialized,
    Setup,
    Iterating,
    Converged,
    Failed,
}

/// Summary of a converged solve.
#[derive(Clone, Debug, Serialize)]
pub struct SolveReport {
    pub iterations: usize,
    pub objective: f64,
    pub inf_pr: f64,
    pub inf_du: f64,
    pub wall_time_s: f64,
    pub num_variables: usize,
    pub num_constraints: usize,
    pub num_colors: usize,
    pub diagnostics: Vec<ConstraintDiagnostic>,
}

enum Outcome {
    Converged,
    Failed(SolverFailure),
}

pub struct SolveDriver<'a> {
    config: DriverConfig,
    state: DriverState,
    nlp: Option<TranscribedNlp<'a>>,
    solution: Option<Solution>,
    history: Vec<IterationReport>,
}

impl<'a> SolveDriver<'a> {
    pub fn new(config: DriverConfig) -> Self {
        Self {
            config,
            state: DriverState::Uninitialized,
            nlp: None,
            solution: None,
            history: Vec::new(),
        }
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Per-iteration reports of the last run.
    pub fn history(&self) -> &[IterationReport] {
        &self.history
    }

    pub fn nlp(&self) -> Option<&TranscribedNlp<'a>> {
        self.nlp.as_ref()
    }

    /// Validate `guess` against `transcription` and build the NLP view.
    pub fn setup(
        &mut self,
        transcription: &'a Transcription,
        guess: TrajectoryBuffer,
    ) -> DriverResult<()> {
        if matches!(self.state, DriverState::Setup | DriverState::Iterating) {
            return Err(DriverError::InvalidTransition {
                from: self.state,
                action: "set up",
            });
        }
        transcription.check_buffer(&guess)?;
        guess.check_finite()?;
        let nlp = TranscribedNlp::new(transcription, guess, self.config.coloring, self.config.fd)?;
        let (lower, upper) = nlp.variable_bounds();
        let (gl, gu) = nlp.constraint_bounds();
        if lower.len() != nlp.num_variables() || upper.len() != nlp.num_variables() {
            return Err(NlpError::Dimension {
                what: "variable bounds",
                expected: nlp.num_variables(),
                actual: lower.len().min(upper.len()),
            }
            .into());
        }
        if gl.len() != nlp.num_constraints() || gu.len() != nlp.num_constraints() {
            return Err(NlpError::Dimension {
                what: "constraint bounds",
                expected: nlp.num_constraints(),
                actual: gl.len().min(gu.len()),
            }
            .into());
        }

        info!(
            variables = nlp.num_variables(),
            constraints = nlp.num_constraints(),
            "driver set up"
        );
        self.nlp = Some(nlp);
        self.solution = None;
        self.history.clear();
        self.state = DriverState::Setup;
        Ok(())
    }

    /// Run `solver` to completion or until a caller limit is hit.
    pub fn run(&mut self, solver: &mut dyn NlpSolver) -> DriverResult<SolveReport> {
        if self.state != DriverState::Setup {
            return Err(DriverError::InvalidTransition {
                from: self.state,
                action: "run",
            });
        }
        let Some(nlp) = self.nlp.as_ref() else {
            return Err(DriverError::InvalidTransition {
                from: self.state,
                action: "run",
            });
        };
        self.state = DriverState::Iterating;
        info!(max_iterations = self.config.max_iterations, "solve started");

        let deadline = Deadline::new(self.config.max_wall_time);
        let outcome = iterate_until_done(nlp, solver, &self.config, deadline, &mut self.history);

        // Snapshot whatever the solver last accepted, even after an error.
        let snapshot = match solver.current() {
            Some(iterate) => Some(Solution::from_iterate(nlp, iterate)),
            None => None,
        };

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                self.solution = snapshot.and_then(Result::ok);
                self.state = DriverState::Failed;
                warn!(error = %e, "solve aborted");
                return Err(e.into());
            }
        };
        let solution = match snapshot {
            Some(Ok(solution)) => solution,
            Some(Err(e)) => {
                self.state = DriverState::Failed;
                return Err(e.into());
            }
            None => {
                self.state = DriverState::Failed;
                return Err(NlpError::NotStarted.into());
            }
        };

        let diagnostics = constraint_table(
            nlp.transcription(),
            &solution,
            self.config.feasibility_tol,
        );
        let iterations = self.history.len();
        match outcome {
            Outcome::Converged => {
                let report = SolveReport {
                    iterations,
                    objective: solution.objective,
                    inf_pr: solution.inf_pr,
                    inf_du: solution.inf_du,
                    wall_time_s: deadline.elapsed_s(),
                    num_variables: nlp.num_variables(),
                    num_constraints: nlp.num_constraints(),
                    num_colors: nlp.coloring().num_colors(),
                    diagnostics,
                };
                info!(
                    iterations,
                    objective = report.objective,
                    inf_pr = report.inf_pr,
                    wall_time_s = report.wall_time_s,
                    "solve converged"
                );
                self.solution = Some(solution);
                self.state = DriverState::Converged;
                Ok(report)
            }
            Outcome::Failed(failure) => {
                let notable: Vec<ConstraintDiagnostic> =
                    diagnostics.into_iter().filter(|d| d.is_notable()).collect();
                warn!(
                    %failure,
                    iterations,
                    inf_pr = solution.inf_pr,
                    flagged = notable.len(),
                    "solve failed"
                );
                self.solution = Some(solution.clone());
                self.state = DriverState::Failed;
                Err(DriverError::Solver {
                    failure,
                    iterate: Box::new(solution),
                    diagnostics: notable,
                })
            }
        }
    }

    /// Latest solution snapshot. Unavailable before the first run.
    pub fn solution(&self) -> DriverResult<&Solution> {
        match (&self.state, &self.solution) {
            (DriverState::Converged | DriverState::Failed, Some(solution)) => Ok(solution),
            _ => Err(DriverError::InvalidTransition {
                from: self.state,
                action: "read the solution",
            }),
        }
    }

    /// Full constraint table of the latest solution.
    pub fn constraint_table(&self) -> DriverResult<Vec<ConstraintDiagnostic>> {
        let solution = self.solution()?;
        let nlp = self.nlp.as_ref().ok_or(DriverError::InvalidTransition {
            from: self.state,
            action: "read the constraint table",
        })?;
        Ok(constraint_table(
            nlp.transcription(),
            solution,
            self.config.feasibility_tol,
        ))
    }
}

fn iterate_until_done(
    nlp: &TranscribedNlp<'_>,
    solver: &mut dyn NlpSolver,
    config: &DriverConfig,
    deadline: Deadline,
    history: &mut Vec<IterationReport>,
) -> Result<Outcome, NlpError> {
    solver.start(nlp, &nlp.initial_point())?;
    loop {
        if history.len() >= config.max_iterations {
            return Ok(Outcome::Failed(SolverFailure::IterationLimit));
        }
        if deadline.expired() {
            return Ok(Outcome::Failed(SolverFailure::WallClockLimit));
        }
        let report = solver.iterate(nlp)?;
        debug!(
            iteration = report.iteration,
            objective = report.objective,
            inf_pr = report.inf_pr,
            inf_du = report.inf_du,
            mu = report.mu,
            alpha = report.alpha_pr,
            "iteration"
        );
        let status = report.status;
        history.push(report);
        match status {
            IterationStatus::Continue => {}
            IterationStatus::Converged => return Ok(Outcome::Converged),
            IterationStatus::Diverged => return Ok(Outcome::Failed(SolverFailure::Divergence)),
            IterationStatus::Infeasible => return Ok(Outcome::Failed(SolverFailure::Infeasible)),
            IterationStatus::Stalled => return Ok(Outcome::Failed(SolverFailure::Stalled)),
        }
    }
}
