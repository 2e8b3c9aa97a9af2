//! Loading, validating and compiling case files.

use std::collections::BTreeSet;
use std::path::Path;

use tracing::debug;
use traj_phase::Phase;
use traj_transcription::{GaussLobatto, Mesh};

use crate::error::{AppError, AppResult};
use crate::models::ModelRegistry;
use crate::problem::Problem;
use crate::schema::{CaseFile, LATEST_VERSION};

/// Name given to the single phase compiled from a case file.
pub const PHASE_NAME: &str = "phase0";

pub fn load_case(path: &Path) -> AppResult<CaseFile> {
    let content = std::fs::read_to_string(path).map_err(|source| AppError::CaseFileRead {
        path: path.to_path_buf(),
        source,
    })?;
    parse_case(&content)
}

pub fn parse_case(content: &str) -> AppResult<CaseFile> {
    let case: CaseFile = serde_yaml::from_str(content)?;
    validate_case(&case)?;
    Ok(case)
}

pub fn save_case(path: &Path, case: &CaseFile) -> AppResult<()> {
    validate_case(case)?;
    let content = serde_yaml::to_string(case)?;
    std::fs::write(path, content).map_err(|source| AppError::CaseFileWrite {
        path: path.to_path_buf(),
        source,
    })
}

/// Structural checks that need no ODE model. Phase-level checks (bounds,
/// targets, scaling) run when the case is compiled.
pub fn validate_case(case: &CaseFile) -> AppResult<()> {
    if case.version == 0 || case.version > LATEST_VERSION {
        return Err(AppError::UnsupportedVersion {
            version: case.version,
            latest: LATEST_VERSION,
        });
    }
    if case.name.trim().is_empty() {
        return Err(AppError::Validation("case name is empty".into()));
    }
    if case.model.name.trim().is_empty() {
        return Err(AppError::Validation("model name is empty".into()));
    }
    if case.states.is_empty() {
        return Err(AppError::Validation("case declares no states".into()));
    }

    let tx = &case.transcription;
    if tx.num_segments == 0 || tx.order == 0 {
        return Err(AppError::Validation(format!(
            "transcription needs positive num_segments and order, got {} and {}",
            tx.num_segments, tx.order
        )));
    }
    if let Some(ends) = &tx.segment_ends {
        if ends.len() != tx.num_segments + 1 {
            return Err(AppError::Validation(format!(
                "segment_ends has {} entries, expected {}",
                ends.len(),
                tx.num_segments + 1
            )));
        }
        if ends.iter().any(|e| !e.is_finite()) || ends.windows(2).any(|w| w[1] <= w[0]) {
            return Err(AppError::Validation(
                "segment_ends must be finite and strictly increasing".into(),
            ));
        }
    }

    let guess = &case.guess;
    if !guess.t_initial.is_finite() || !guess.t_duration.is_finite() || guess.t_duration <= 0.0 {
        return Err(AppError::Validation(format!(
            "guess needs a finite t_initial and a positive t_duration, got {} and {}",
            guess.t_initial, guess.t_duration
        )));
    }
    let states: BTreeSet<&str> = case.states.iter().map(|s| s.name.as_str()).collect();
    let controls: BTreeSet<&str> = case.controls.iter().map(|c| c.name.as_str()).collect();
    let parameters: BTreeSet<&str> = case.parameters.iter().map(|p| p.name.as_str()).collect();
    let unknown = |kind: &str, name: &str| {
        AppError::Validation(format!("guess for unknown {kind} '{name}'"))
    };
    for (name, samples) in &guess.states {
        if !states.contains(name.as_str()) {
            return Err(unknown("state", name.as_str()));
        }
        check_samples(name, samples)?;
    }
    for (name, samples) in &guess.controls {
        if !controls.contains(name.as_str()) {
            return Err(unknown("control", name.as_str()));
        }
        check_samples(name, samples)?;
    }
    for name in guess.parameters.keys() {
        if !parameters.contains(name.as_str()) {
            return Err(unknown("parameter", name.as_str()));
        }
    }
    Ok(())
}

fn check_samples(name: &str, samples: &[f64]) -> AppResult<()> {
    if samples.is_empty() {
        return Err(AppError::Validation(format!("guess for '{name}' is empty")));
    }
    if samples.iter().any(|v| !v.is_finite()) {
        return Err(AppError::Validation(format!(
            "guess for '{name}' has non-finite samples"
        )));
    }
    Ok(())
}

/// Declare the case's phase against its model and wrap it in a problem.
///
/// The returned problem is not set up yet.
pub fn compile_case(case: &CaseFile, registry: &ModelRegistry) -> AppResult<Problem> {
    validate_case(case)?;
    let ode = registry.build(&case.model.name, &case.model.options)?;

    let mut phase = Phase::new(ode);
    phase.set_time_options(case.time.clone())?;
    for state in &case.states {
        phase.declare_state(state.clone())?;
    }
    for control in &case.controls {
        phase.declare_control(control.clone())?;
    }
    for parameter in &case.parameters {
        phase.declare_parameter(parameter.clone())?;
    }
    for constraint in &case.boundary_constraints {
        phase.add_boundary_constraint(constraint.clone())?;
    }
    for constraint in &case.path_constraints {
        phase.add_path_constraint(constraint.clone())?;
    }
    phase.set_objective(case.objective.clone())?;

    let def = &case.transcription;
    let orders = vec![def.order; def.num_segments];
    let mesh = match &def.segment_ends {
        Some(ends) => Mesh::from_segment_ends(ends, orders)?,
        None => Mesh::uniform(def.num_segments, def.order)?,
    };
    let gl = GaussLobatto::new(mesh).compressed(def.compressed);

    let mut problem = Problem::new(case.name.clone());
    problem.trajectory.add_phase(PHASE_NAME, phase, gl)?;
    problem.trajectory.set_guess(PHASE_NAME, case.guess.clone())?;
    problem.driver = case.driver.clone();
    problem.solver = case.solver.clone();
    problem.verify = case.verify.clone();
    debug!(case = %case.name, model = %case.model.name, "case compiled");
    Ok(problem)
}
