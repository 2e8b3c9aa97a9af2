//! Ownership tree of a problem: `Problem` owns a `Trajectory`, which owns
//! each phase and, after setup, its transcription.

use tracing::{debug, info};
use traj_driver::DriverConfig;
use traj_optimizer::IpmOptions;
use traj_phase::Phase;
use traj_sim::VerifyOptions;
use traj_transcription::{GaussLobatto, Transcription, TrajectoryBuffer};

use crate::error::{AppError, AppResult};
use crate::schema::InitialGuess;

/// One phase of a trajectory, declared and later transcribed.
pub struct PhaseEntry {
    name: String,
    declared: Option<(Phase, GaussLobatto)>,
    transcription: Option<Transcription>,
    guess: InitialGuess,
}

impl PhaseEntry {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn guess(&self) -> &InitialGuess {
        &self.guess
    }

    pub fn transcription(&self) -> Option<&Transcription> {
        self.transcription.as_ref()
    }
}

#[derive(Default)]
pub struct Trajectory {
    phases: Vec<PhaseEntry>,
}

impl Trajectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a phase with its transcription settings. Only single-phase
    /// trajectories are supported.
    pub fn add_phase(
        &mut self,
        name: impl Into<String>,
        phase: Phase,
        transcription: GaussLobatto,
    ) -> AppResult<()> {
        let name = name.into();
        if let Some(existing) = self.phases.first() {
            return Err(AppError::Unsupported {
                message: format!(
                    "cannot add phase '{name}': trajectory already has phase '{}' and phase linkage is not supported",
                    existing.name
                ),
            });
        }
        self.phases.push(PhaseEntry {
            name,
            declared: Some((phase, transcription)),
            transcription: None,
            guess: InitialGuess::default(),
        });
        Ok(())
    }

    pub fn phases(&self) -> &[PhaseEntry] {
        &self.phases
    }

    pub fn phase_names(&self) -> Vec<&str> {
        self.phases.iter().map(|p| p.name.as_str()).collect()
    }

    fn entry(&self, name: &str) -> AppResult<&PhaseEntry> {
        self.phases
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| AppError::PhaseNotFound(name.to_string()))
    }

    pub fn set_guess(&mut self, name: &str, guess: InitialGuess) -> AppResult<()> {
        let entry = self
            .phases
            .iter_mut()
            .find(|p| p.name == name)
            .ok_or_else(|| AppError::PhaseNotFound(name.to_string()))?;
        entry.guess = guess;
        Ok(())
    }

    pub fn is_set_up(&self) -> bool {
        !self.phases.is_empty() && self.phases.iter().all(|p| p.transcription.is_some())
    }

    /// Transcribe every phase not yet transcribed.
    ///
    /// A phase that fails validation is consumed by the attempt and must be
    /// added again.
    pub fn setup(&mut self) -> AppResult<()> {
        if self.phases.is_empty() {
            return Err(AppError::Validation("trajectory has no phases".into()));
        }
        for entry in &mut self.phases {
            if let Some((phase, gl)) = entry.declared.take() {
                let tx = gl.build(phase)?;
                debug!(
                    phase = %entry.name,
                    variables = tx.num_variables(),
                    constraints = tx.num_constraints(),
                    "phase transcribed"
                );
                entry.transcription = Some(tx);
            }
        }
        Ok(())
    }

    pub fn transcription(&self, name: &str) -> AppResult<&Transcription> {
        self.entry(name)?.transcription.as_ref().ok_or(AppError::NotSetUp)
    }

    /// Physical-unit starting point of a phase built from its guess samples.
    pub fn guess_buffer(&self, name: &str) -> AppResult<TrajectoryBuffer> {
        let entry = self.entry(name)?;
        let tx = entry.transcription.as_ref().ok_or(AppError::NotSetUp)?;
        build_guess(tx, &entry.guess)
    }
}

pub(crate) fn build_guess(tx: &Transcription, guess: &InitialGuess) -> AppResult<TrajectoryBuffer> {
    let mut buffer = tx.new_buffer();
    buffer.t_initial = guess.t_initial;
    buffer.t_duration = guess.t_duration;
    for (name, samples) in &guess.states {
        if tx.phase().state_index(name).is_none() {
            return Err(AppError::Validation(format!(
                "guess for unknown state '{name}'"
            )));
        }
        tx.set_guess(&mut buffer, name, samples)?;
    }
    for (name, samples) in &guess.controls {
        if tx.phase().control_index(name).is_none() {
            return Err(AppError::Validation(format!(
                "guess for unknown control '{name}'"
            )));
        }
        tx.set_guess(&mut buffer, name, samples)?;
    }
    for (name, value) in &guess.parameters {
        buffer.set_parameter(name, *value)?;
    }
    Ok(buffer)
}

/// Top-level container: the trajectory plus driver, solver and verifier settings.
pub struct Problem {
    pub name: String,
    pub trajectory: Trajectory,
    pub driver: DriverConfig,
    pub solver: IpmOptions,
    pub verify: VerifyOptions,
}

impl Problem {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            trajectory: Trajectory::new(),
            driver: DriverConfig::default(),
            solver: IpmOptions::default(),
            verify: VerifyOptions::default(),
        }
    }

    /// Validate and transcribe every phase. Idempotent.
    pub fn setup(&mut self) -> AppResult<()> {
        self.trajectory.setup()?;
        info!(
            problem = %self.name,
            phases = self.trajectory.phases.len(),
            "problem set up"
        );
        Ok(())
    }

    pub fn is_set_up(&self) -> bool {
        self.trajectory.is_set_up()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use traj_phase::{BoundaryConstraint, Location, Objective, StateDef, TimeOptions};
    use traj_transcription::Mesh;

    use crate::models::ConstantRate;

    fn phase() -> Phase {
        let mut phase = Phase::new(Box::new(ConstantRate { rate: 1.0 }));
        phase
            .set_time_options(
                TimeOptions::default()
                    .fix_initial(true)
                    .duration_bounds(Some(1.0), Some(100.0)),
            )
            .unwrap();
        phase
            .declare_state(StateDef::new("x", "x_dot").fix_initial(true))
            .unwrap();
        phase
            .add_boundary_constraint(BoundaryConstraint::equals("x", Location::Final, 10.0))
            .unwrap();
        phase
            .set_objective(Objective::new("time", Location::Final))
            .unwrap();
        phase
    }

    fn gl() -> GaussLobatto {
        GaussLobatto::new(Mesh::uniform(4, 1).unwrap())
    }

    #[test]
    fn second_phase_is_rejected() {
        let mut traj = Trajectory::new();
        traj.add_phase("phase0", phase(), gl()).unwrap();
        assert!(matches!(
            traj.add_phase("phase1", phase(), gl()),
            Err(AppError::Unsupported { .. })
        ));
    }

    #[test]
    fn transcription_requires_setup() {
        let mut problem = Problem::new("p");
        problem.trajectory.add_phase("phase0", phase(), gl()).unwrap();
        assert!(matches!(
            problem.trajectory.transcription("phase0"),
            Err(AppError::NotSetUp)
        ));
        problem.setup().unwrap();
        problem.setup().unwrap();
        assert!(problem.is_set_up());
        assert!(matches!(
            problem.trajectory.transcription("nope"),
            Err(AppError::PhaseNotFound(_))
        ));
    }

    #[test]
    fn guess_buffer_interpolates_samples() {
        let mut problem = Problem::new("p");
        problem.trajectory.add_phase("phase0", phase(), gl()).unwrap();
        problem
            .trajectory
            .set_guess("phase0", InitialGuess::new(0.0, 5.0).state("x", vec![0.0, 10.0]))
            .unwrap();
        problem.setup().unwrap();
        let buffer = problem.trajectory.guess_buffer("phase0").unwrap();
        assert_eq!(buffer.t_duration, 5.0);
        let x = buffer.state("x").unwrap();
        assert_eq!(x[0], 0.0);
        assert!((x[x.len() - 1] - 10.0).abs() < 1e-12);

        problem
            .trajectory
            .set_guess("phase0", InitialGuess::default().state("y", vec![1.0]))
            .unwrap();
        assert!(matches!(
            problem.trajectory.guess_buffer("phase0"),
            Err(AppError::Validation(_))
        ));
    }
}
