use std::path::PathBuf;

use traj_app::{ModelRegistry, compile_case, load_case, run_problem};

#[test]
fn brachistochrone_descent_time() {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../demos/brachistochrone.yaml");
    let case = load_case(&path).unwrap();
    let mut problem = compile_case(&case, &ModelRegistry::default()).unwrap();
    let outcome = run_problem(&mut problem, case.simulate).unwrap();

    assert!(outcome.converged, "failure: {:?}", outcome.failure);
    let t = outcome.solution.buffer.t_duration;
    assert!((t - 1.8016).abs() < 1e-2, "t_final = {t}");
    let x = outcome.solution.final_state("x").unwrap();
    let y = outcome.solution.final_state("y").unwrap();
    assert!((x - 10.0).abs() < 1e-9 && (y - 5.0).abs() < 1e-9);

    let report = outcome.verification.unwrap();
    let discrepancy = report.discrepancy("x").unwrap();
    assert!(discrepancy.absolute < 0.1);
}

#[test]
fn brachistochrone_refined_mesh_converges() {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../demos/brachistochrone.yaml");
    let mut case = load_case(&path).unwrap();
    case.transcription.num_segments = 20;
    let mut problem = compile_case(&case, &ModelRegistry::default()).unwrap();
    let outcome = run_problem(&mut problem, false).unwrap();

    assert!(outcome.converged, "failure: {:?}", outcome.failure);
    let t = outcome.solution.buffer.t_duration;
    assert!((t - 1.8016).abs() < 5e-3, "t_final = {t}");
    let report = outcome.report.unwrap();
    assert!(report.iterations < 200, "{} iterations", report.iterations);
}
