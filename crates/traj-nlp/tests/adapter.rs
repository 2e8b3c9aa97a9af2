use traj_nlp::{
    Coloring, ColoringConfig, FiniteDifference, NlpProblem, TranscribedNlp, colored_jacobian,
};
use traj_phase::{
    BoundaryConstraint, ControlDef, Location, Objective, OdeResult, OdeSignature, OdeSystem,
    Phase, Port, StateDef, TimeOptions,
};
use traj_transcription::{GaussLobatto, Mesh, Transcription};

/// Brachistochrone dynamics with gravity as a constant.
struct Brachistochrone;

impl OdeSystem for Brachistochrone {
    fn signature(&self) -> OdeSignature {
        OdeSignature {
            inputs: vec![Port::new("v"), Port::new("theta")],
            outputs: vec![Port::new("xdot"), Port::new("ydot"), Port::new("vdot")],
        }
    }

    fn evaluate(&self, _time: f64, inputs: &[f64], outputs: &mut [f64]) -> OdeResult<()> {
        let (v, theta) = (inputs[0], inputs[1]);
        outputs[0] = v * theta.sin();
        outputs[1] = -v * theta.cos();
        outputs[2] = 9.80665 * theta.cos();
        Ok(())
    }
}

fn transcription(compressed: bool) -> Transcription {
    let mut phase = Phase::new(Box::new(Brachistochrone));
    phase
        .set_time_options(
            TimeOptions::default()
                .fix_initial(true)
                .duration_bounds(Some(0.5), Some(10.0)),
        )
        .unwrap();
    phase
        .declare_state(StateDef::new("x", "xdot").fix_initial(true))
        .unwrap();
    phase
        .declare_state(StateDef::new("y", "ydot").fix_initial(true))
        .unwrap();
    phase
        .declare_state(StateDef::new("v", "vdot").fix_initial(true))
        .unwrap();
    phase
        .declare_control(
            ControlDef::new("theta")
                .bounds(Some(0.01), Some(3.1))
                .rate_continuity(true, 1.0),
        )
        .unwrap();
    phase
        .add_boundary_constraint(BoundaryConstraint::equals("x", Location::Final, 10.0))
        .unwrap();
    phase
        .add_boundary_constraint(BoundaryConstraint::equals("y", Location::Final, 5.0))
        .unwrap();
    phase
        .set_objective(Objective::new("time", Location::Final))
        .unwrap();
    GaussLobatto::new(Mesh::uniform(6, 1).unwrap())
        .compressed(compressed)
        .build(phase)
        .unwrap()
}

fn nlp(tx: &Transcription, coloring: ColoringConfig) -> TranscribedNlp<'_> {
    let mut guess = tx.new_buffer();
    guess.t_duration = 2.0;
    tx.set_guess(&mut guess, "x", &[0.0, 10.0]).unwrap();
    tx.set_guess(&mut guess, "y", &[10.0, 5.0]).unwrap();
    tx.set_guess(&mut guess, "v", &[0.0, 9.9]).unwrap();
    tx.set_guess(&mut guess, "theta", &[0.1, 1.5]).unwrap();
    TranscribedNlp::new(tx, guess, coloring, FiniteDifference::default()).unwrap()
}

#[test]
fn colored_jacobian_matches_column_by_column_differences() {
    for compressed in [false, true] {
        let tx = transcription(compressed);
        let colored = nlp(&tx, ColoringConfig::default());
        let plain = nlp(
            &tx,
            ColoringConfig {
                enabled: false,
                parallel: false,
            },
        );
        let parallel = nlp(
            &tx,
            ColoringConfig {
                enabled: true,
                parallel: true,
            },
        );
        assert!(colored.coloring().num_colors() * 3 <= tx.num_variables() * 2);

        let x = colored.initial_point();
        let a = colored.jacobian_values(&x).unwrap();
        let b = plain.jacobian_values(&x).unwrap();
        let c = parallel.jacobian_values(&x).unwrap();
        assert_eq!(a.len(), colored.jacobian_sparsity().nnz());
        for ((a, b), c) in a.iter().zip(&b).zip(&c) {
            assert!((a - b).abs() < 1e-7, "{a} vs {b}");
            assert_eq!(a, c);
        }
    }
}

#[test]
fn affine_rows_are_exact_and_match_differencing() {
    let tx = transcription(false);
    let nlp = nlp(&tx, ColoringConfig::default());
    assert!(nlp.num_linear_rows() > 0);
    let x = nlp.initial_point();
    let values = nlp.jacobian_values(&x).unwrap();
    let pattern = nlp.jacobian_sparsity();

    // Every row differenced column by column.
    let constraints = |x: &[f64]| nlp.constraints(x);
    let dense = colored_jacobian(
        &constraints,
        &x,
        &[],
        pattern,
        &Coloring::trivial(x.len()),
        FiniteDifference::default(),
        false,
    )
    .unwrap();
    for (a, b) in values.iter().zip(&dense) {
        assert!((a - b).abs() < 1e-6, "{a} vs {b}");
    }

    // x(t_f) = 10 is affine with unit state scaling: the entry is exactly 1.
    let row = tx
        .rows()
        .iter()
        .position(|r| r.label == "final_boundary:x")
        .unwrap();
    let slots = tx.layout().states[0].len();
    let col = tx.layout().states[0][slots - 1].unwrap();
    assert_eq!(values[pattern.entry(row, col).unwrap()], 1.0);
}

#[test]
fn hessian_matches_differenced_lagrangian_gradient() {
    let tx = transcription(true);
    let nlp = nlp(&tx, ColoringConfig::default());
    let x = nlp.initial_point();
    let n = x.len();
    let lambda: Vec<f64> = (0..nlp.num_constraints())
        .map(|i| 0.1 * (i % 7) as f64 - 0.3)
        .collect();
    let pattern = nlp.hessian_sparsity().unwrap().clone();
    let values = nlp.hessian_values(&x, 1.0, &lambda).unwrap();
    assert_eq!(values.len(), pattern.nnz());

    let jac = nlp.jacobian_sparsity().clone();
    let grad_lagrangian = |x: &[f64]| -> Vec<f64> {
        let mut g = nlp.objective_gradient(x).unwrap();
        let j = nlp.jacobian_values(x).unwrap();
        for ((&r, &c), v) in jac.rows().iter().zip(jac.cols()).zip(j) {
            g[c] += lambda[r] * v;
        }
        g
    };
    let h = 1e-4;
    for k in 0..n {
        let mut xp = x.clone();
        xp[k] += h;
        let mut xm = x.clone();
        xm[k] -= h;
        let (gp, gm) = (grad_lagrangian(&xp), grad_lagrangian(&xm));
        for j in k..n {
            let numeric = (gp[j] - gm[j]) / (2.0 * h);
            match pattern.entry(j, k) {
                Some(e) => assert!(
                    (numeric - values[e]).abs() < 1e-3 * numeric.abs().max(1.0),
                    "H[{j},{k}]: {numeric} vs {}",
                    values[e]
                ),
                None => assert!(numeric.abs() < 1e-3, "H[{j},{k}] = {numeric} outside pattern"),
            }
        }
    }

    assert!(nlp.hessian_values(&x, 1.0, &lambda[1..]).is_err());
}

#[test]
fn objective_gradient_is_time_only() {
    let tx = transcription(false);
    let nlp = nlp(&tx, ColoringConfig::default());
    let x = nlp.initial_point();
    let g = nlp.objective_gradient(&x).unwrap();
    let col = tx.layout().t_duration.unwrap();
    assert!((g[col] - 1.0).abs() < 1e-8);
    assert!(g.iter().enumerate().all(|(i, v)| i == col || *v == 0.0));
}

#[test]
fn sizes_and_bounds_are_consistent() {
    let tx = transcription(true);
    let nlp = nlp(&tx, ColoringConfig::default());
    let (xl, xu) = nlp.variable_bounds();
    let (gl, gu) = nlp.constraint_bounds();
    assert_eq!(xl.len(), nlp.num_variables());
    assert_eq!(xu.len(), nlp.num_variables());
    assert_eq!(gl.len(), nlp.num_constraints());
    assert_eq!(gu.len(), nlp.num_constraints());
    assert_eq!(nlp.constraints(&nlp.initial_point()).unwrap().len(), gl.len());
    assert!(nlp.constraints(&[0.0; 3]).is_err());
}

#[test]
fn mismatched_guess_is_rejected() {
    let tx = transcription(false);
    let other = transcription(true);
    let guess = other.new_buffer();
    assert!(TranscribedNlp::new(&tx, guess, ColoringConfig::default(), FiniteDifference::default()).is_err());
}
