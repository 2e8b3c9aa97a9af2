use std::path::PathBuf;

use traj_app::{
    AppError, ModelRegistry, PHASE_NAME, compile_case, load_case, parse_case, run_problem,
};
use traj_driver::{ConstraintStatus, SolverFailure};
use traj_transcription::ConstraintKind;

fn demo(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../demos")
        .join(name)
}

const MIN_TIME_INTERVAL: &str = r#"
name: min_time_interval
model:
  name: constant_rate
time:
  fix_initial: true
  duration_bounds: [1.0, 100.0]
states:
  - name: x
    rate_source: x_dot
    fix_initial: true
    ref: 10.0
boundary_constraints:
  - target: x
    loc: final
    lower: 9.9
    upper: 10.0
    scaler: 0.1
objective:
  target: time
  loc: final
transcription:
  num_segments: 4
  order: 1
guess:
  t_duration: 5.0
  states:
    x: [0.0, 5.0]
"#;

#[test]
fn min_time_reaches_target_in_ten_seconds() {
    let case = load_case(&demo("min_time.yaml")).unwrap();
    let mut problem = compile_case(&case, &ModelRegistry::default()).unwrap();
    let outcome = run_problem(&mut problem, case.simulate).unwrap();

    assert!(outcome.converged, "failure: {:?}", outcome.failure);
    assert_eq!(outcome.phase, PHASE_NAME);
    assert!((outcome.solution.buffer.t_duration - 10.0).abs() < 1e-3);
    let x = outcome.solution.final_state("x").unwrap();
    assert!((x - 10.0).abs() < 1e-4, "x_final = {x}");

    let report = outcome.verification.unwrap();
    assert!(report.is_clean(), "{:?}", report.warnings);
    assert!(outcome.simulation.is_some());
    assert!(outcome.timing.total_time_s >= outcome.timing.solve_time_s);
}

#[test]
fn terminal_interval_keeps_value_inside_and_reports_active_bound() {
    let case = parse_case(MIN_TIME_INTERVAL).unwrap();
    let mut problem = compile_case(&case, &ModelRegistry::default()).unwrap();
    let outcome = run_problem(&mut problem, false).unwrap();

    assert!(outcome.converged, "failure: {:?}", outcome.failure);
    let x = outcome.solution.final_state("x").unwrap();
    assert!(x >= 9.9 - 1e-6 && x <= 10.0 + 1e-6, "x_final = {x}");
    // Minimizing time pushes the final value onto the lower end.
    assert!((x - 9.9).abs() < 1e-3);
    assert!((outcome.solution.buffer.t_duration - 9.9).abs() < 1e-3);

    let row = outcome
        .diagnostics
        .iter()
        .find(|d| d.kind == ConstraintKind::FinalBoundary)
        .expect("final boundary row is active");
    assert_eq!(row.status, ConstraintStatus::Lower);
    assert!(outcome.verification.is_none());
}

#[test]
fn iteration_limit_is_an_outcome_not_an_error() {
    let mut case = load_case(&demo("min_time.yaml")).unwrap();
    case.driver.max_iterations = 1;
    let mut problem = compile_case(&case, &ModelRegistry::default()).unwrap();
    let outcome = run_problem(&mut problem, true).unwrap();

    assert!(!outcome.converged);
    assert_eq!(outcome.failure, Some(SolverFailure::IterationLimit));
    assert!(outcome.report.is_none());
    assert!(outcome.verification.is_some());
}

#[test]
fn outcome_serializes_to_json() {
    let case = load_case(&demo("min_time.yaml")).unwrap();
    let mut problem = compile_case(&case, &ModelRegistry::default()).unwrap();
    let outcome = run_problem(&mut problem, false).unwrap();
    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["problem"], "min_time");
    assert_eq!(json["converged"], true);
    assert!(json["solution"]["timeseries"].is_object());
}

#[test]
fn bad_guess_surfaces_as_error() {
    let mut case = load_case(&demo("min_time.yaml")).unwrap();
    case.guess.states.insert("x".into(), vec![0.0, f64::NAN]);
    assert!(matches!(
        compile_case(&case, &ModelRegistry::default()),
        Err(AppError::Validation(_))
    ));
}
