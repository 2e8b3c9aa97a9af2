use traj_driver::{
    ConstraintStatus, DriverConfig, DriverError, DriverState, SolveDriver, SolverFailure,
};
use traj_optimizer::{InteriorPoint, IpmOptions};
use traj_phase::{
    BoundaryConstraint, Location, Objective, OdeResult, OdeSignature, OdeSystem, Phase, Port,
    StateDef, TimeOptions,
};
use traj_transcription::{GaussLobatto, Mesh, Transcription, TrajectoryBuffer, TranscriptionError};

/// `x_dot = 1`.
struct ConstantRate;

impl OdeSystem for ConstantRate {
    fn signature(&self) -> OdeSignature {
        OdeSignature {
            inputs: vec![],
            outputs: vec![Port::new("xdot")],
        }
    }

    fn evaluate(&self, _time: f64, _inputs: &[f64], outputs: &mut [f64]) -> OdeResult<()> {
        outputs[0] = 1.0;
        Ok(())
    }
}

fn min_time(segments: usize) -> Transcription {
    let mut phase = Phase::new(Box::new(ConstantRate));
    phase
        .set_time_options(
            TimeOptions::default()
                .fix_initial(true)
                .duration_bounds(Some(1.0), Some(100.0)),
        )
        .unwrap();
    phase
        .declare_state(StateDef::new("x", "xdot").fix_initial(true))
        .unwrap();
    phase
        .add_boundary_constraint(BoundaryConstraint::equals("x", Location::Final, 10.0))
        .unwrap();
    phase
        .set_objective(Objective::new("time", Location::Final))
        .unwrap();
    GaussLobatto::new(Mesh::uniform(segments, 1).unwrap())
        .build(phase)
        .unwrap()
}

fn guess(tx: &Transcription) -> TrajectoryBuffer {
    let mut guess = tx.new_buffer();
    guess.t_duration = 5.0;
    tx.set_guess(&mut guess, "x", &[0.0, 5.0]).unwrap();
    guess
}

#[test]
fn converges_to_minimum_time() {
    let tx = min_time(4);
    let mut driver = SolveDriver::new(DriverConfig::default());
    assert_eq!(driver.state(), DriverState::Uninitialized);
    driver.setup(&tx, guess(&tx)).unwrap();
    assert_eq!(driver.state(), DriverState::Setup);

    let mut solver = InteriorPoint::new(IpmOptions::default());
    let report = driver.run(&mut solver).unwrap();
    assert_eq!(driver.state(), DriverState::Converged);
    assert!(report.iterations > 0);
    assert_eq!(report.iterations, driver.history().len());
    assert_eq!(report.num_constraints, tx.num_constraints());

    let solution = driver.solution().unwrap();
    assert!((solution.buffer.t_duration - 10.0).abs() < 1e-4);
    assert!((solution.final_state("x").unwrap() - 10.0).abs() < 1e-4);
    assert!((solution.objective - 10.0).abs() < 1e-4);
    assert_eq!(solution.timeseries.time.len(), tx.grid().unique_nodes().len());

    let table = driver.constraint_table().unwrap();
    assert_eq!(table.len(), tx.num_constraints());
    assert!(table.iter().all(|d| d.status == ConstraintStatus::Equality));
}

#[test]
fn illegal_transitions_are_rejected() {
    let tx = min_time(2);
    let mut driver = SolveDriver::new(DriverConfig::default());
    let mut solver = InteriorPoint::default();

    assert!(matches!(
        driver.run(&mut solver),
        Err(DriverError::InvalidTransition {
            from: DriverState::Uninitialized,
            ..
        })
    ));
    assert!(matches!(
        driver.solution(),
        Err(DriverError::InvalidTransition { .. })
    ));

    driver.setup(&tx, guess(&tx)).unwrap();
    assert!(matches!(
        driver.setup(&tx, guess(&tx)),
        Err(DriverError::InvalidTransition {
            from: DriverState::Setup,
            ..
        })
    ));
    assert!(driver.solution().is_err());

    driver.run(&mut solver).unwrap();
    assert!(matches!(
        driver.run(&mut solver),
        Err(DriverError::InvalidTransition {
            from: DriverState::Converged,
            ..
        })
    ));

    // A finished driver can start over.
    driver.setup(&tx, guess(&tx)).unwrap();
    assert_eq!(driver.state(), DriverState::Setup);
    assert!(driver.history().is_empty());
}

#[test]
fn iteration_limit_returns_last_iterate() {
    let tx = min_time(4);
    let config = DriverConfig {
        max_iterations: 1,
        ..DriverConfig::default()
    };
    let mut driver = SolveDriver::new(config);
    driver.setup(&tx, guess(&tx)).unwrap();
    let err = driver.run(&mut InteriorPoint::default()).unwrap_err();
    match err {
        DriverError::Solver {
            failure, iterate, ..
        } => {
            assert_eq!(failure, SolverFailure::IterationLimit);
            assert_eq!(iterate.constraints.len(), tx.num_constraints());
            assert!(iterate.buffer.t_duration.is_finite());
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(driver.state(), DriverState::Failed);
    assert!(driver.solution().is_ok());
}

#[test]
fn zero_wall_time_budget_fails_before_iterating() {
    let tx = min_time(2);
    let config = DriverConfig {
        max_wall_time: Some(0.0),
        ..DriverConfig::default()
    };
    let mut driver = SolveDriver::new(config);
    driver.setup(&tx, guess(&tx)).unwrap();
    let err = driver.run(&mut InteriorPoint::default()).unwrap_err();
    assert!(matches!(
        err,
        DriverError::Solver {
            failure: SolverFailure::WallClockLimit,
            ..
        }
    ));
    assert!(driver.history().is_empty());
}

#[test]
fn bad_guesses_are_rejected_at_setup() {
    let tx = min_time(4);
    let other = min_time(2);
    let mut driver = SolveDriver::new(DriverConfig::default());

    let err = driver.setup(&tx, other.new_buffer()).unwrap_err();
    assert!(matches!(
        err,
        DriverError::Transcription(TranscriptionError::GuessShape { .. })
    ));
    assert_eq!(driver.state(), DriverState::Uninitialized);

    let mut bad = guess(&tx);
    bad.t_duration = f64::NAN;
    assert!(driver.setup(&tx, bad).is_err());
    assert_eq!(driver.state(), DriverState::Uninitialized);
}

#[test]
fn report_serializes_to_json() {
    let tx = min_time(2);
    let mut driver = SolveDriver::new(DriverConfig::default());
    driver.setup(&tx, guess(&tx)).unwrap();
    let report = driver.run(&mut InteriorPoint::default()).unwrap();
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["num_constraints"], tx.num_constraints());
    let solution = serde_json::to_value(driver.solution().unwrap()).unwrap();
    assert!(solution["timeseries"]["time"].is_array());
}
