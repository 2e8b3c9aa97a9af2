use proptest::prelude::*;
use traj_phase::{
    BoundaryConstraint, ControlDef, Location, Objective, OdeResult, OdeSignature, OdeSystem,
    ParameterDef, PathConstraint, Phase, Port, ScaleSpec, StateDef, TimeOptions,
};
use traj_transcription::{
    ConstraintKind, GaussLobatto, Mesh, Transcription, TrajectoryBuffer, TranscriptionError,
};

/// `x' = v`, `v' = a + 0 * u`.
struct DoubleIntegrator;

impl OdeSystem for DoubleIntegrator {
    fn signature(&self) -> OdeSignature {
        OdeSignature {
            inputs: vec![Port::new("v"), Port::new("a"), Port::new("u")],
            outputs: vec![Port::new("x_dot"), Port::new("v_dot"), Port::new("energy")],
        }
    }

    fn evaluate(&self, _time: f64, inputs: &[f64], outputs: &mut [f64]) -> OdeResult<()> {
        outputs[0] = inputs[0];
        outputs[1] = inputs[1] + 0.0 * inputs[2];
        outputs[2] = 0.5 * inputs[0] * inputs[0];
        Ok(())
    }
}

const X0: f64 = 0.5;
const V0: f64 = -1.0;
const ACCEL: f64 = 2.0;

fn phase(fix_ends: bool) -> Phase {
    let mut phase = Phase::new(Box::new(DoubleIntegrator));
    phase
        .set_time_options(
            TimeOptions::default()
                .fix_initial(true)
                .duration_bounds(Some(0.1), Some(10.0))
                .duration_ref(2.0),
        )
        .unwrap();
    phase
        .declare_state(
            StateDef::new("x", "x_dot")
                .fix_initial(fix_ends)
                .scaling(ScaleSpec::reference(-1.0, 3.0)),
        )
        .unwrap();
    phase
        .declare_state(StateDef::new("v", "v_dot").fix_initial(fix_ends).reference(5.0))
        .unwrap();
    phase
        .declare_control(
            ControlDef::new("u")
                .rate_continuity(true, 10.0)
                .rate2_continuity(true, 1.0),
        )
        .unwrap();
    phase
        .declare_parameter(ParameterDef::new("a", ACCEL))
        .unwrap();
    phase
        .add_boundary_constraint(BoundaryConstraint::equals("x", Location::Final, 4.0))
        .unwrap();
    phase
        .add_boundary_constraint(BoundaryConstraint::interval(
            "v",
            Location::Initial,
            Some(-2.0),
            None,
        ))
        .unwrap();
    phase
        .add_path_constraint(PathConstraint::interval("energy", None, Some(100.0)))
        .unwrap();
    phase
        .set_objective(Objective::new("time", Location::Final))
        .unwrap();
    phase
}

fn exact_buffer(tx: &Transcription, t0: f64, duration: f64) -> TrajectoryBuffer {
    let mut buf = tx.new_buffer();
    buf.t_initial = t0;
    buf.t_duration = duration;
    let times: Vec<f64> = tx
        .grid()
        .state_slot_fractions()
        .iter()
        .map(|f| duration * f)
        .collect();
    buf.set_state(
        "x",
        times
            .iter()
            .map(|t| X0 + V0 * t + 0.5 * ACCEL * t * t)
            .collect(),
    )
    .unwrap();
    buf.set_state("v", times.iter().map(|t| V0 + ACCEL * t).collect())
        .unwrap();
    let u = tx.interp("u", &[1.0, -3.0]).unwrap();
    buf.set_control("u", u).unwrap();
    buf
}

#[test]
fn closed_form_trajectory_has_zero_defects() {
    let meshes = [
        Mesh::uniform(1, 1).unwrap(),
        Mesh::uniform(4, 1).unwrap(),
        Mesh::uniform(3, 2).unwrap(),
        Mesh::new(vec![0.2, 0.5, 0.3], vec![1, 3, 2]).unwrap(),
    ];
    for mesh in meshes {
        for compressed in [false, true] {
            let tx = GaussLobatto::new(mesh.clone())
                .compressed(compressed)
                .build(phase(false))
                .unwrap();
            let buf = exact_buffer(&tx, 1.5, 2.5);
            let values = tx.evaluate(&buf).unwrap();
            let rows = tx.constraint_values(&buf, &values);
            for (row, value) in tx.rows().iter().zip(&rows) {
                if matches!(
                    row.kind,
                    ConstraintKind::Defect
                        | ConstraintKind::StateContinuity
                        | ConstraintKind::ControlContinuity
                        | ConstraintKind::ControlRateContinuity
                        | ConstraintKind::ControlRate2Continuity
                ) {
                    assert!(
                        value.abs() < 1e-10,
                        "{} = {value} (compressed={compressed})",
                        row.label
                    );
                }
            }
        }
    }
}

#[test]
fn wrong_polynomial_leaves_nonzero_defects() {
    let tx = GaussLobatto::new(Mesh::uniform(2, 1).unwrap())
        .build(phase(false))
        .unwrap();
    let mut buf = exact_buffer(&tx, 0.0, 2.0);
    let slots = buf.state("x").unwrap().len();
    buf.set_state("x", vec![1.0; slots]).unwrap();
    let values = tx.evaluate(&buf).unwrap();
    assert!(values.defects.iter().any(|d| d.abs() > 1e-3));
}

#[test]
fn zero_duration_is_an_evaluation_error() {
    let tx = GaussLobatto::new(Mesh::uniform(2, 1).unwrap())
        .build(phase(false))
        .unwrap();
    let mut buf = exact_buffer(&tx, 0.0, 2.0);
    buf.t_duration = 0.0;
    let err = tx.evaluate(&buf).unwrap_err();
    assert_eq!(err, TranscriptionError::NonPositiveDuration { duration: 0.0 });
    assert!(tx.timeseries(&buf).is_err());
}

#[test]
fn rows_follow_documented_order() {
    let tx = GaussLobatto::new(Mesh::uniform(3, 1).unwrap())
        .build(phase(false))
        .unwrap();
    let kinds: Vec<ConstraintKind> = tx.rows().iter().map(|r| r.kind).collect();
    let mut sorted = kinds.clone();
    let rank = |k: &ConstraintKind| match k {
        ConstraintKind::Defect => 0,
        ConstraintKind::StateContinuity => 1,
        ConstraintKind::ControlContinuity => 2,
        ConstraintKind::ControlRateContinuity => 3,
        ConstraintKind::ControlRate2Continuity => 4,
        ConstraintKind::InitialBoundary => 5,
        ConstraintKind::FinalBoundary => 6,
        ConstraintKind::Path => 7,
    };
    sorted.sort_by_key(rank);
    assert_eq!(kinds, sorted);

    // 2 states x 3 collocation nodes, 2 x 2 state continuity, 2 control
    // continuity, 2 rate, 2 rate2, 2 boundary, 7 unique nodes of path.
    assert_eq!(tx.num_constraints(), 6 + 4 + 2 + 2 + 2 + 2 + 7);
    assert_eq!(tx.rows()[0].label, "defect:x[0]");
    assert_eq!(tx.rows()[3].label, "defect:v[0]");
    let boundary: Vec<&str> = tx
        .rows()
        .iter()
        .filter(|r| {
            matches!(
                r.kind,
                ConstraintKind::InitialBoundary | ConstraintKind::FinalBoundary
            )
        })
        .map(|r| r.label.as_str())
        .collect();
    assert_eq!(boundary, vec!["initial_boundary:v", "final_boundary:x"]);
    assert_eq!(tx.rows().last().unwrap().label, "path:energy[6]");
}

#[test]
fn compressed_mode_drops_continuity_rows() {
    let tx = GaussLobatto::new(Mesh::uniform(3, 1).unwrap())
        .compressed(true)
        .build(phase(false))
        .unwrap();
    assert!(tx.rows().iter().all(|r| !matches!(
        r.kind,
        ConstraintKind::StateContinuity | ConstraintKind::ControlContinuity
    )));
    assert!(tx
        .rows()
        .iter()
        .any(|r| r.kind == ConstraintKind::ControlRateContinuity));
}

#[test]
fn fixed_slots_are_not_design_columns() {
    let free = GaussLobatto::new(Mesh::uniform(2, 1).unwrap())
        .build(phase(false))
        .unwrap();
    let fixed = GaussLobatto::new(Mesh::uniform(2, 1).unwrap())
        .build(phase(true))
        .unwrap();
    assert_eq!(free.num_variables(), fixed.num_variables() + 2);
    assert_eq!(fixed.layout().states[0][0], None);
    assert_eq!(fixed.layout().t_initial, None);
    assert_eq!(fixed.layout().labels[0], "t_duration");
}

#[test]
fn pack_then_unpack_preserves_free_values_and_fixed_slots() {
    let tx = GaussLobatto::new(Mesh::uniform(2, 2).unwrap())
        .build(phase(true))
        .unwrap();
    let buf = exact_buffer(&tx, 0.0, 3.0);
    let x = tx.pack(&buf);
    let (lower, upper) = tx.variable_bounds();
    assert_eq!(lower.len(), x.len());
    assert!((lower[0] - 0.05).abs() < 1e-15 && (upper[0] - 5.0).abs() < 1e-15);

    let mut other = tx.new_buffer();
    other.set_state("x", vec![-7.0; buf.state("x").unwrap().len()]).unwrap();
    tx.unpack(&x, &mut other).unwrap();
    assert_eq!(other.state("x").unwrap()[0], -7.0);
    let got = other.state("x").unwrap();
    let want = buf.state("x").unwrap();
    for i in 1..got.len() {
        assert!((got[i] - want[i]).abs() < 1e-12);
    }
    assert!((other.t_duration - 3.0).abs() < 1e-12);

    let err = tx.unpack(&x[1..], &mut other).unwrap_err();
    assert!(matches!(err, TranscriptionError::DesignLength { .. }));
}

#[test]
fn row_footprints_cover_numerical_dependence() {
    for compressed in [false, true] {
        let tx = GaussLobatto::new(Mesh::new(vec![1.0, 2.0], vec![1, 2]).unwrap())
            .compressed(compressed)
            .build(phase(false))
            .unwrap();
        let base = exact_buffer(&tx, 0.3, 1.7);
        let x0 = tx.pack(&base);
        let mut scratch = base.clone();
        let (_, c0) = tx.evaluate_design(&x0, &mut scratch).unwrap();
        for col in 0..x0.len() {
            let mut x = x0.clone();
            x[col] += 1e-3;
            let (_, c1) = tx.evaluate_design(&x, &mut scratch).unwrap();
            for (r, row) in tx.rows().iter().enumerate() {
                if (c1[r] - c0[r]).abs() > 1e-12 {
                    assert!(
                        row.columns.binary_search(&col).is_ok(),
                        "{} depends on {} outside its footprint",
                        row.label,
                        tx.layout().labels[col]
                    );
                }
            }
        }
    }
}

#[test]
fn affine_rows_carry_exact_coefficients() {
    for compressed in [false, true] {
        let tx = GaussLobatto::new(Mesh::new(vec![1.0, 2.0], vec![1, 2]).unwrap())
            .compressed(compressed)
            .build(phase(false))
            .unwrap();
        let base = exact_buffer(&tx, 0.3, 1.7);
        let x0 = tx.pack(&base);
        let mut scratch = base.clone();
        let h = 1e-6;
        for col in 0..x0.len() {
            let mut xp = x0.clone();
            xp[col] += h;
            let mut xm = x0.clone();
            xm[col] -= h;
            let (_, cp) = tx.evaluate_design(&xp, &mut scratch).unwrap();
            let (_, cm) = tx.evaluate_design(&xm, &mut scratch).unwrap();
            for (r, row) in tx.rows().iter().enumerate() {
                let Some(terms) = &row.linear else { continue };
                let numeric = (cp[r] - cm[r]) / (2.0 * h);
                let exact = terms.iter().find(|(c, _)| *c == col).map_or(0.0, |t| t.1);
                assert!(
                    (numeric - exact).abs() < 1e-6 * exact.abs().max(1.0),
                    "{} / {}: {numeric} vs {exact}",
                    row.label,
                    tx.layout().labels[col]
                );
            }
        }

        for row in tx.rows() {
            let expected = !matches!(row.kind, ConstraintKind::Defect | ConstraintKind::Path);
            assert_eq!(row.is_linear(), expected, "{}", row.label);
        }
        // Final time = t0 + duration, duration scaled by 1 / 2.
        let col = tx.layout().t_duration.unwrap();
        assert_eq!(tx.objective_linear(), Some(&[(col, 2.0)][..]));
    }
}

#[test]
fn timeseries_reports_unique_nodes() {
    let tx = GaussLobatto::new(Mesh::uniform(3, 1).unwrap())
        .build(phase(false))
        .unwrap();
    let buf = exact_buffer(&tx, 0.0, 2.0);
    let ts = tx.timeseries(&buf).unwrap();
    assert_eq!(ts.time.len(), 7);
    assert_eq!(ts.time[0], 0.0);
    assert!((ts.time[6] - 2.0).abs() < 1e-15);
    let v = &ts.states[1].values;
    for (t, v) in ts.time.iter().zip(v) {
        assert!((v - (V0 + ACCEL * t)).abs() < 1e-12);
    }
    // u goes from 1 to -3 over 2 time units.
    assert!(ts.control_rates[0].values.iter().all(|r| (r + 2.0).abs() < 1e-10));
    assert_eq!(ts.outputs[2].name, "energy");
}

#[test]
fn interp_rejects_unknown_names_and_empty_samples() {
    let tx = GaussLobatto::new(Mesh::uniform(2, 1).unwrap())
        .build(phase(false))
        .unwrap();
    assert!(matches!(
        tx.interp("w", &[0.0, 1.0]),
        Err(TranscriptionError::UnknownVariable { .. })
    ));
    assert!(matches!(
        tx.interp("x", &[]),
        Err(TranscriptionError::GuessShape { .. })
    ));
    assert_eq!(tx.interp("u", &[2.0]).unwrap(), vec![2.0; 6]);
}

proptest! {
    #[test]
    fn interp_hits_endpoints_exactly(
        a in -1.0e6f64..1.0e6,
        b in -1.0e6f64..1.0e6,
        segments in 1usize..6,
        order in 1usize..4,
        compressed in any::<bool>(),
    ) {
        let tx = GaussLobatto::new(Mesh::uniform(segments, order).unwrap())
            .compressed(compressed)
            .build(phase(false))
            .unwrap();
        for name in ["x", "u"] {
            let slots = tx.interp(name, &[a, b]).unwrap();
            prop_assert_eq!(slots[0], a);
            prop_assert_eq!(*slots.last().unwrap(), b);
            let (lo, hi) = (a.min(b), a.max(b));
            prop_assert!(slots.iter().all(|v| *v >= lo - 1e-9 && *v <= hi + 1e-9));
        }
    }
}
