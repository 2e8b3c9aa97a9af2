//! Node-level evaluation: ODE calls, Hermite interpolation and defects.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use traj_phase::{InputSource, OdeResult, Target};

use crate::buffer::{NamedSeries, TrajectoryBuffer};
use crate::error::{TranscriptionError, TranscriptionResult};
use crate::transcription::Transcription;

/// Values at every node of the flat node list for one iterate.
///
/// Matrices are `nodes x variables`. Collocation-node states are the Hermite
/// interpolants; `rates` holds the rate-source value of each state.
#[derive(Clone, Debug)]
pub struct NodeValues {
    pub times: Vec<f64>,
    pub states: DMatrix<f64>,
    pub controls: DMatrix<f64>,
    pub outputs: DMatrix<f64>,
    pub rates: DMatrix<f64>,
    pub parameters: Vec<f64>,
    /// State-major, then collocation nodes in time order.
    pub defects: Vec<f64>,
}

impl NodeValues {
    pub fn target_value(&self, flat: usize, target: Target) -> f64 {
        match target {
            Target::Time => self.times[flat],
            Target::State(i) => self.states[(flat, i)],
            Target::Control(i) => self.controls[(flat, i)],
            Target::Parameter(i) => self.parameters[i],
            Target::Output(i) => self.outputs[(flat, i)],
        }
    }
}

/// Time histories at the unique nodes of a phase, in physical units.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Timeseries {
    pub time: Vec<f64>,
    pub states: Vec<NamedSeries>,
    pub controls: Vec<NamedSeries>,
    pub control_rates: Vec<NamedSeries>,
    pub outputs: Vec<NamedSeries>,
}

impl Transcription {
    /// Evaluate the ODE, its rate sources and every state's value at a point.
    ///
    /// `outputs` has one entry per ODE output and `rates` one per state.
    pub fn ode_rates(
        &self,
        time: f64,
        states: &[f64],
        controls: &[f64],
        parameters: &[f64],
        outputs: &mut [f64],
        rates: &mut [f64],
    ) -> OdeResult<()> {
        let inputs: Vec<f64> = self
            .bindings
            .inputs
            .iter()
            .map(|b| {
                b.factor
                    * match b.source {
                        InputSource::Time => time,
                        InputSource::State(i) => states[i],
                        InputSource::Control(i) => controls[i],
                        InputSource::Parameter(i) => parameters[i],
                    }
            })
            .collect();
        self.phase.evaluate_ode(time, &inputs, outputs)?;

        let b = &self.bindings;
        for (j, (source, factor)) in b.rate_sources.iter().zip(&b.rate_factors).enumerate() {
            rates[j] = match *source {
                Target::Output(i) => outputs[i] * factor,
                Target::State(i) => states[i],
                Target::Control(i) => controls[i],
                Target::Parameter(i) => parameters[i],
                Target::Time => time,
            };
        }
        Ok(())
    }

    fn eval_node(
        &self,
        values: &mut NodeValues,
        flat: usize,
        segment: usize,
    ) -> TranscriptionResult<()> {
        let x: Vec<f64> = values.states.row(flat).iter().copied().collect();
        let u: Vec<f64> = values.controls.row(flat).iter().copied().collect();
        let mut out = vec![0.0; values.outputs.ncols()];
        let mut rates = vec![0.0; values.rates.ncols()];
        self.ode_rates(
            values.times[flat],
            &x,
            &u,
            &values.parameters,
            &mut out,
            &mut rates,
        )
        .map_err(|source| TranscriptionError::Ode {
            node: flat,
            segment,
            source,
        })?;
        for (i, v) in out.into_iter().enumerate() {
            values.outputs[(flat, i)] = v;
        }
        for (j, v) in rates.into_iter().enumerate() {
            values.rates[(flat, j)] = v;
        }
        Ok(())
    }

    /// Evaluate every node of the grid and the collocation defects.
    pub fn evaluate(&self, buffer: &TrajectoryBuffer) -> TranscriptionResult<NodeValues> {
        let ns = self.phase.states().len();
        let nc = self.phase.controls().len();
        let no = self.phase.signature().outputs.len();
        let n = self.grid.num_nodes;
        let ncol = self.grid.num_collocation_nodes();
        let (t0, duration) = (buffer.t_initial, buffer.t_duration);
        // Segment time scales divide by the duration.
        if !(duration > 0.0 && duration.is_finite()) {
            return Err(TranscriptionError::NonPositiveDuration { duration });
        }

        let mut values = NodeValues {
            times: vec![0.0; n],
            states: DMatrix::zeros(n, ns),
            controls: DMatrix::zeros(n, nc),
            outputs: DMatrix::zeros(n, no),
            rates: DMatrix::zeros(n, ns),
            parameters: buffer.parameter_values(),
            defects: vec![0.0; ns * ncol],
        };

        let mut col_offset = 0;
        for (s, seg) in self.grid.segments.iter().enumerate() {
            let dts = seg.dt_dstau(duration);
            let k = seg.order;
            let base = seg.node_offset;

            for local in 0..seg.num_nodes() {
                let flat = base + local;
                values.times[flat] = t0 + duration * seg.fraction_at(local);
                let cslot = seg.control_slots[local];
                for i in 0..nc {
                    values.controls[(flat, i)] = buffer.control_values(i)[cslot];
                }
                if let Some(slot) = seg.state_slot(local) {
                    for j in 0..ns {
                        values.states[(flat, j)] = buffer.state_values(j)[slot];
                    }
                    self.eval_node(&mut values, flat, s)?;
                }
            }

            let h = &seg.hermite;
            let mut xdot_c = DMatrix::zeros(k, ns);
            for j in 0..ns {
                let xd = DVector::from_iterator(k + 1, (0..=k).map(|d| values.states[(base + 2 * d, j)]));
                let fd = DVector::from_iterator(k + 1, (0..=k).map(|d| values.rates[(base + 2 * d, j)]));
                let xc = &h.ai * &xd + (&h.bi * &fd) * dts;
                let xdc = (&h.ad * &xd) / dts + &h.bd * &fd;
                for c in 0..k {
                    values.states[(base + 2 * c + 1, j)] = xc[c];
                    xdot_c[(c, j)] = xdc[c];
                }
            }

            for c in 0..k {
                self.eval_node(&mut values, base + 2 * c + 1, s)?;
            }

            for j in 0..ns {
                let defect_ref = self.bindings.defect_refs[j];
                for c in 0..k {
                    let f_c = values.rates[(base + 2 * c + 1, j)];
                    values.defects[j * ncol + col_offset + c] = (f_c - xdot_c[(c, j)]) * dts / defect_ref;
                }
            }
            col_offset += k;
        }
        Ok(values)
    }

    /// Control values at the nodes of one segment.
    pub fn segment_control_values(
        &self,
        buffer: &TrajectoryBuffer,
        control: usize,
        segment: usize,
    ) -> Vec<f64> {
        let values = buffer.control_values(control);
        self.grid.segments[segment]
            .control_slots
            .iter()
            .map(|&slot| values[slot])
            .collect()
    }

    /// First or second time derivative of a control at a node, from the
    /// segment's Lagrange differentiation matrix.
    pub fn control_derivative(
        &self,
        buffer: &TrajectoryBuffer,
        control: usize,
        segment: usize,
        local: usize,
        order: u8,
    ) -> f64 {
        let seg = &self.grid.segments[segment];
        let dts = seg.dt_dstau(buffer.t_duration);
        let u = DVector::from_vec(self.segment_control_values(buffer, control, segment));
        let du = &seg.diff * u;
        if order <= 1 {
            du[local] / dts
        } else {
            (&seg.diff * du)[local] / (dts * dts)
        }
    }

    /// Histories at the unique nodes, including control rates.
    pub fn timeseries(&self, buffer: &TrajectoryBuffer) -> TranscriptionResult<Timeseries> {
        let values = self.evaluate(buffer)?;
        let nodes = self.grid.unique_nodes();
        let flats: Vec<usize> = nodes.iter().map(|n| self.grid.flat(*n)).collect();

        let column =
            |m: &DMatrix<f64>, j: usize| -> Vec<f64> { flats.iter().map(|&f| m[(f, j)]).collect() };
        let states = self
            .phase
            .states()
            .iter()
            .enumerate()
            .map(|(j, s)| NamedSeries {
                name: s.name.clone(),
                values: column(&values.states, j),
            })
            .collect();
        let controls = self
            .phase
            .controls()
            .iter()
            .enumerate()
            .map(|(i, c)| NamedSeries {
                name: c.name.clone(),
                values: column(&values.controls, i),
            })
            .collect();
        let control_rates = self
            .phase
            .controls()
            .iter()
            .enumerate()
            .map(|(i, c)| NamedSeries {
                name: format!("{}_rate", c.name),
                values: nodes
                    .iter()
                    .map(|n| self.control_derivative(buffer, i, n.segment, n.local, 1))
                    .collect(),
            })
            .collect();
        let outputs = self
            .phase
            .signature()
            .outputs
            .iter()
            .enumerate()
            .map(|(i, p)| NamedSeries {
                name: p.name.clone(),
                values: column(&values.outputs, i),
            })
            .collect();

        Ok(Timeseries {
            time: flats.iter().map(|&f| values.times[f]).collect(),
            states,
            controls,
            control_rates,
            outputs,
        })
    }
}
