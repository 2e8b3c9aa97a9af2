//! Scaling changes the NLP the solver sees but not the optimum it finds.

use std::path::PathBuf;

use traj_app::{CaseFile, ModelRegistry, RunOutcome, compile_case, load_case, run_problem};
use traj_phase::ScaleSpec;

fn min_energy() -> CaseFile {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../demos/min_energy.yaml");
    load_case(&path).unwrap()
}

fn solve(case: &CaseFile) -> RunOutcome {
    let mut problem = compile_case(case, &ModelRegistry::default()).unwrap();
    let outcome = run_problem(&mut problem, false).unwrap();
    assert!(outcome.converged, "failure: {:?}", outcome.failure);
    outcome
}

#[test]
fn min_energy_matches_analytic_cost() {
    // u(t) = 6 - 12 t, J = 1/2 * integral of u^2 = 6.
    let outcome = solve(&min_energy());
    let j = outcome.solution.final_state("J").unwrap();
    assert!((j - 6.0).abs() < 1e-2, "J = {j}");
    let x = outcome.solution.final_state("x").unwrap();
    assert!((x - 1.0).abs() < 1e-5);
}

#[test]
fn rescaled_problem_converges_to_same_trajectory() {
    let plain = solve(&min_energy());

    let mut case = min_energy();
    for state in &mut case.states {
        match state.name.as_str() {
            "x" => state.scaling = ScaleSpec::reference(-1.0, 10.0),
            "v" => {
                state.scaling = ScaleSpec::with_ref(0.5);
                state.defect_ref = Some(5.0);
            }
            "J" => state.scaling = ScaleSpec::with_ref(100.0),
            _ => {}
        }
    }
    case.controls[0].scaling = ScaleSpec::with_scaler(0.1);
    case.objective.scaling = ScaleSpec::with_ref(10.0);
    for constraint in &mut case.boundary_constraints {
        constraint.scaling = ScaleSpec::with_scaler(3.0);
    }
    let scaled = solve(&case);

    let j_plain = plain.solution.final_state("J").unwrap();
    let j_scaled = scaled.solution.final_state("J").unwrap();
    assert!((j_plain - j_scaled).abs() < 1e-2 * j_plain.abs().max(1.0));

    let u_plain = &plain.solution.timeseries.controls[0].values;
    let u_scaled = &scaled.solution.timeseries.controls[0].values;
    assert_eq!(u_plain.len(), u_scaled.len());
    for (a, b) in u_plain.iter().zip(u_scaled) {
        assert!((a - b).abs() < 0.1, "u differs: {a} vs {b}");
    }
}
