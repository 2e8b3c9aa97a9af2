//! Explicit re-simulation of an optimized trajectory.
//!
//! The optimized controls drive the true ODE from the optimized initial
//! state. Collocation defects only hold at the collocation nodes, so the
//! simulated end state drifts from the collocated one as the mesh coarsens;
//! the report quantifies that drift per state.

use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use traj_transcription::{NamedSeries, Transcription, TrajectoryBuffer};

use crate::control::ControlProfile;
use crate::error::{SimError, SimResult};
use crate::model::TransientModel;
use crate::sim::{IntegratorType, SimOptions, SimRecord, run_sim};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifyOptions {
    pub integrator: IntegratorType,
    pub rtol: f64,
    pub atol: f64,
    /// First trial step (adaptive) or fixed step, as a fraction of the duration.
    pub initial_step_fraction: f64,
    pub min_step: f64,
    pub max_steps: usize,
    pub record_every: usize,
    /// Largest acceptable end discrepancy in scaled state units.
    pub tolerance: f64,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            integrator: IntegratorType::DormandPrince45,
            rtol: 1e-9,
            atol: 1e-12,
            initial_step_fraction: 1e-3,
            min_step: 1e-12,
            max_steps: 200_000,
            record_every: 1,
            tolerance: 1e-3,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VerificationWarning {
    LargeDiscrepancy {
        state: String,
        scaled: f64,
        tolerance: f64,
    },
    SimulationDivergence {
        reason: String,
    },
}

/// End-state agreement of one state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StateDiscrepancy {
    pub state: String,
    pub collocated: f64,
    pub simulated: f64,
    pub absolute: f64,
    /// Absolute discrepancy over `max(|collocated|, 1)`.
    pub relative: f64,
    /// Absolute discrepancy in the state's scaled units.
    pub scaled: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub discrepancies: Vec<StateDiscrepancy>,
    pub max_scaled: Option<f64>,
    pub steps: usize,
    pub warnings: Vec<VerificationWarning>,
}

impl VerificationReport {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn discrepancy(&self, state: &str) -> Option<&StateDiscrepancy> {
        self.discrepancies.iter().find(|d| d.state == state)
    }
}

/// Simulated histories with the ODE outputs at every recorded point.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SimTrajectory {
    pub time: Vec<f64>,
    pub states: Vec<NamedSeries>,
    pub controls: Vec<NamedSeries>,
    pub outputs: Vec<NamedSeries>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Verification {
    /// Absent when the integration failed.
    pub trajectory: Option<SimTrajectory>,
    pub report: VerificationReport,
}

/// The phase ODE driven by a fixed control profile.
pub struct PhaseModel<'a> {
    transcription: &'a Transcription,
    controls: ControlProfile,
    parameters: Vec<f64>,
    x0: DVector<f64>,
    u: Vec<f64>,
    outputs: Vec<f64>,
}

impl<'a> PhaseModel<'a> {
    pub fn new(transcription: &'a Transcription, buffer: &TrajectoryBuffer) -> Self {
        let phase = transcription.phase();
        let x0 = DVector::from_iterator(
            phase.states().len(),
            phase.states().iter().map(|s| {
                buffer
                    .state(&s.name)
                    .and_then(|v| v.first().copied())
                    .unwrap_or(f64::NAN)
            }),
        );
        Self {
            transcription,
            controls: ControlProfile::new(transcription, buffer),
            parameters: buffer.parameter_values(),
            x0,
            u: vec![0.0; phase.controls().len()],
            outputs: vec![0.0; phase.signature().outputs.len()],
        }
    }

    pub fn controls(&self) -> &ControlProfile {
        &self.controls
    }

    /// Evaluate at `(t, x)`, leaving controls and ODE outputs in scratch.
    fn eval(&mut self, t: f64, x: &DVector<f64>) -> SimResult<DVector<f64>> {
        self.controls.values_at(t, &mut self.u);
        let mut rates = DVector::zeros(x.len());
        self.transcription
            .ode_rates(
                t,
                x.as_slice(),
                &self.u,
                &self.parameters,
                &mut self.outputs,
                rates.as_mut_slice(),
            )
            .map_err(|source| SimError::Ode { t, source })?;
        Ok(rates)
    }
}

impl TransientModel for PhaseModel<'_> {
    type State = DVector<f64>;

    fn initial_state(&self) -> DVector<f64> {
        self.x0.clone()
    }

    fn rhs(&mut self, t: f64, x: &DVector<f64>) -> SimResult<DVector<f64>> {
        self.eval(t, x)
    }

    fn add(&self, a: &DVector<f64>, b: &DVector<f64>) -> DVector<f64> {
        a + b
    }

    fn scale(&self, a: &DVector<f64>, scale: f64) -> DVector<f64> {
        a * scale
    }

    fn error_norm(
        &self,
        err: &DVector<f64>,
        x0: &DVector<f64>,
        x1: &DVector<f64>,
        rtol: f64,
        atol: f64,
    ) -> f64 {
        if err.is_empty() {
            return 0.0;
        }
        let sum: f64 = (0..err.len())
            .map(|i| {
                let w = atol + rtol * x0[i].abs().max(x1[i].abs());
                (err[i] / w).powi(2)
            })
            .sum();
        (sum / err.len() as f64).sqrt()
    }

    fn is_finite(&self, x: &DVector<f64>) -> bool {
        x.iter().all(|v| v.is_finite())
    }
}

fn to_trajectory(
    model: &mut PhaseModel<'_>,
    record: &SimRecord<DVector<f64>>,
) -> SimResult<SimTrajectory> {
    let transcription = model.transcription;
    let phase = transcription.phase();
    let mut states: Vec<NamedSeries> = phase
        .states()
        .iter()
        .map(|s| NamedSeries {
            name: s.name.clone(),
            values: Vec::with_capacity(record.t.len()),
        })
        .collect();
    let mut controls: Vec<NamedSeries> = phase
        .controls()
        .iter()
        .map(|c| NamedSeries {
            name: c.name.clone(),
            values: Vec::with_capacity(record.t.len()),
        })
        .collect();
    let mut outputs: Vec<NamedSeries> = phase
        .signature()
        .outputs
        .iter()
        .map(|p| NamedSeries {
            name: p.name.clone(),
            values: Vec::with_capacity(record.t.len()),
        })
        .collect();
    for (t, x) in record.t.iter().zip(&record.x) {
        model.eval(*t, x)?;
        for (series, v) in states.iter_mut().zip(x.iter()) {
            series.values.push(*v);
        }
        for (series, v) in controls.iter_mut().zip(&model.u) {
            series.values.push(*v);
        }
        for (series, v) in outputs.iter_mut().zip(&model.outputs) {
            series.values.push(*v);
        }
    }
    Ok(SimTrajectory {
        time: record.t.clone(),
        states,
        controls,
        outputs,
    })
}

/// Simulate `buffer`'s controls through the true ODE and compare end states.
///
/// Bad options or a buffer that does not fit the transcription are errors.
/// A failed integration is not: it yields a report carrying
/// [`VerificationWarning::SimulationDivergence`].
pub fn verify(
    transcription: &Transcription,
    buffer: &TrajectoryBuffer,
    opts: &VerifyOptions,
) -> SimResult<Verification> {
    transcription.check_buffer(buffer)?;
    buffer.check_finite()?;
    if !opts.tolerance.is_finite() || opts.tolerance <= 0.0 {
        return Err(SimError::InvalidArg {
            what: "tolerance must be positive",
        });
    }
    if !opts.initial_step_fraction.is_finite() || opts.initial_step_fraction <= 0.0 {
        return Err(SimError::InvalidArg {
            what: "initial_step_fraction must be positive",
        });
    }

    let t_start = buffer.t_initial;
    let t_end = buffer.t_initial + buffer.t_duration;
    let sim_opts = SimOptions {
        t_start,
        t_end,
        dt: (opts.initial_step_fraction * buffer.t_duration.abs()).max(opts.min_step),
        dt_min: opts.min_step,
        max_steps: opts.max_steps,
        record_every: opts.record_every,
        integrator: opts.integrator,
        rtol: opts.rtol,
        atol: opts.atol,
    };

    let mut model = PhaseModel::new(transcription, buffer);
    let record = match run_sim(&mut model, &sim_opts) {
        Ok(record) => record,
        Err(e) if e.is_divergence() => {
            warn!(error = %e, "simulation diverged");
            return Ok(Verification {
                trajectory: None,
                report: VerificationReport {
                    warnings: vec![VerificationWarning::SimulationDivergence {
                        reason: e.to_string(),
                    }],
                    ..VerificationReport::default()
                },
            });
        }
        Err(e) => return Err(e),
    };
    let trajectory = to_trajectory(&mut model, &record)?;

    let phase = transcription.phase();
    let scalings = &transcription.bindings().state_scaling;
    let mut report = VerificationReport {
        steps: record.steps,
        ..VerificationReport::default()
    };
    if let Some(x_end) = record.final_state() {
        for (i, state) in phase.states().iter().enumerate() {
            let collocated = buffer
                .state(&state.name)
                .and_then(|v| v.last().copied())
                .unwrap_or(f64::NAN);
            let simulated = x_end[i];
            let absolute = (simulated - collocated).abs();
            let scaled = scalings[i].scale_delta(absolute).abs();
            if scaled > opts.tolerance {
                warn!(
                    state = %state.name,
                    collocated,
                    simulated,
                    scaled,
                    tolerance = opts.tolerance,
                    "large discrepancy between simulation and collocation"
                );
                report.warnings.push(VerificationWarning::LargeDiscrepancy {
                    state: state.name.clone(),
                    scaled,
                    tolerance: opts.tolerance,
                });
            }
            report.discrepancies.push(StateDiscrepancy {
                state: state.name.clone(),
                collocated,
                simulated,
                absolute,
                relative: absolute / collocated.abs().max(1.0),
                scaled,
            });
        }
    }
    report.max_scaled = report
        .discrepancies
        .iter()
        .map(|d| d.scaled)
        .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v))));
    debug!(
        steps = report.steps,
        max_scaled = ?report.max_scaled,
        warnings = report.warnings.len(),
        "verification finished"
    );
    Ok(Verification {
        trajectory: Some(trajectory),
        report,
    })
}
