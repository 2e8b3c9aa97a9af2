//! Gauss-Lobatto transcription of a phase into a finite-dimensional problem.

use tracing::debug;
use traj_core::{lower_or_neg_inf, upper_or_inf};
use traj_phase::{Phase, PhaseBindings, Scaling, Target};

use crate::assembler::{self, ConstraintRow};
use crate::buffer::{NamedSeries, NamedValue, TrajectoryBuffer};
use crate::error::{TranscriptionError, TranscriptionResult};
use crate::layout::{DesignLayout, Grid};
use crate::mesh::Mesh;

/// Gauss-Lobatto collocation settings.
#[derive(Clone, Debug, PartialEq)]
pub struct GaussLobatto {
    pub mesh: Mesh,
    pub compressed: bool,
}

impl GaussLobatto {
    /// Uncompressed transcription on the given mesh.
    pub fn new(mesh: Mesh) -> Self {
        Self {
            mesh,
            compressed: false,
        }
    }

    pub fn compressed(mut self, compressed: bool) -> Self {
        self.compressed = compressed;
        self
    }

    /// Validate the phase and lay out nodes, design columns and constraint rows.
    ///
    /// The phase is consumed: its schema cannot change once transcribed.
    pub fn build(self, phase: Phase) -> TranscriptionResult<Transcription> {
        let bindings = phase.bind()?;
        let grid = Grid::new(&self.mesh, self.compressed)?;
        let layout = DesignLayout::new(&phase, &grid);
        let rows = assembler::build_rows(&phase, &bindings, &grid, &layout);
        let objective_columns = assembler::target_columns(
            &grid,
            &layout,
            grid.node_at(bindings.objective.loc),
            bindings.objective.target,
        );
        let objective_linear = assembler::affine_target(
            &grid,
            &layout,
            &bindings,
            grid.node_at(bindings.objective.loc),
            bindings.objective.target,
        )
        .map(|terms| {
            let scaler = bindings.objective.scaling.scaler;
            terms.into_iter().map(|(c, d)| (c, d * scaler)).collect()
        });

        debug!(
            segments = self.mesh.num_segments(),
            nodes = grid.num_nodes,
            compressed = self.compressed,
            variables = layout.num_columns(),
            constraints = rows.len(),
            linear = rows.iter().filter(|r| r.is_linear()).count(),
            "transcription built"
        );

        Ok(Transcription {
            phase,
            bindings,
            mesh: self.mesh,
            grid,
            layout,
            rows,
            objective_columns,
            objective_linear,
        })
    }
}

/// A phase transcribed onto a Gauss-Lobatto grid.
#[derive(Debug)]
pub struct Transcription {
    pub(crate) phase: Phase,
    pub(crate) bindings: PhaseBindings,
    pub(crate) mesh: Mesh,
    pub(crate) grid: Grid,
    pub(crate) layout: DesignLayout,
    pub(crate) rows: Vec<ConstraintRow>,
    pub(crate) objective_columns: Vec<usize>,
    pub(crate) objective_linear: Option<Vec<(usize, f64)>>,
}

impl Transcription {
    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn bindings(&self) -> &PhaseBindings {
        &self.bindings
    }

    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn layout(&self) -> &DesignLayout {
        &self.layout
    }

    pub fn rows(&self) -> &[ConstraintRow] {
        &self.rows
    }

    pub fn num_variables(&self) -> usize {
        self.layout.num_columns()
    }

    pub fn num_constraints(&self) -> usize {
        self.rows.len()
    }

    /// Design columns the objective depends on.
    pub fn objective_columns(&self) -> &[usize] {
        &self.objective_columns
    }

    /// Constant gradient of the scaled objective when it is affine in the
    /// design vector (time, parameters, controls, discretization states).
    pub fn objective_linear(&self) -> Option<&[(usize, f64)]> {
        self.objective_linear.as_deref()
    }

    /// A buffer of the right shape with defaults clamped into declared bounds.
    ///
    /// Parameters take their declared values. Everything else should be
    /// overwritten with a guess before solving.
    pub fn new_buffer(&self) -> TrajectoryBuffer {
        let clamp = |v: f64, lo: Option<f64>, hi: Option<f64>| {
            v.max(lower_or_neg_inf(lo)).min(upper_or_inf(hi))
        };
        let time = self.phase.time_options();
        let states = self
            .phase
            .states()
            .iter()
            .map(|s| NamedSeries {
                name: s.name.clone(),
                values: vec![clamp(0.0, s.lower, s.upper); self.grid.num_state_slots],
            })
            .collect();
        let controls = self
            .phase
            .controls()
            .iter()
            .map(|c| NamedSeries {
                name: c.name.clone(),
                values: vec![clamp(0.0, c.lower, c.upper); self.grid.num_control_slots],
            })
            .collect();
        let parameters = self
            .phase
            .parameters()
            .iter()
            .map(|p| NamedValue {
                name: p.name.clone(),
                value: p.value,
            })
            .collect();
        TrajectoryBuffer::new(
            clamp(0.0, time.initial_bounds.0, time.initial_bounds.1),
            clamp(1.0, time.duration_bounds.0, time.duration_bounds.1),
            states,
            controls,
            parameters,
        )
    }

    /// Check a buffer against this transcription's slot counts.
    pub fn check_buffer(&self, buffer: &TrajectoryBuffer) -> TranscriptionResult<()> {
        self.new_buffer().check_shape(buffer)
    }

    /// Scaled design vector of a buffer.
    pub fn pack(&self, buffer: &TrajectoryBuffer) -> Vec<f64> {
        let mut x = vec![0.0; self.num_variables()];
        let b = &self.bindings;
        if let Some(c) = self.layout.t_initial {
            x[c] = b.initial_scaling.scale(buffer.t_initial);
        }
        if let Some(c) = self.layout.t_duration {
            x[c] = b.duration_scaling.scale(buffer.t_duration);
        }
        for (i, cols) in self.layout.states.iter().enumerate() {
            let values = buffer.state_values(i);
            for (slot, col) in cols.iter().enumerate() {
                if let Some(c) = col {
                    x[*c] = b.state_scaling[i].scale(values[slot]);
                }
            }
        }
        for (i, cols) in self.layout.controls.iter().enumerate() {
            let values = buffer.control_values(i);
            for (slot, col) in cols.iter().enumerate() {
                if let Some(c) = col {
                    x[*c] = b.control_scaling[i].scale(values[slot]);
                }
            }
        }
        for (i, col) in self.layout.parameters.iter().enumerate() {
            if let Some(c) = col {
                x[*c] = b.parameter_scaling[i].scale(buffer.parameter_value(i));
            }
        }
        x
    }

    /// Write a scaled design vector into a buffer. Fixed entries are untouched.
    pub fn unpack(&self, x: &[f64], buffer: &mut TrajectoryBuffer) -> TranscriptionResult<()> {
        if x.len() != self.num_variables() {
            return Err(TranscriptionError::DesignLength {
                expected: self.num_variables(),
                actual: x.len(),
            });
        }
        let b = &self.bindings;
        if let Some(c) = self.layout.t_initial {
            buffer.t_initial = b.initial_scaling.unscale(x[c]);
        }
        if let Some(c) = self.layout.t_duration {
            buffer.t_duration = b.duration_scaling.unscale(x[c]);
        }
        for (i, cols) in self.layout.states.iter().enumerate() {
            let values = buffer.state_values_mut(i);
            for (slot, col) in cols.iter().enumerate() {
                if let Some(c) = col {
                    values[slot] = b.state_scaling[i].unscale(x[*c]);
                }
            }
        }
        for (i, cols) in self.layout.controls.iter().enumerate() {
            let values = buffer.control_values_mut(i);
            for (slot, col) in cols.iter().enumerate() {
                if let Some(c) = col {
                    values[slot] = b.control_scaling[i].unscale(x[*c]);
                }
            }
        }
        for (i, col) in self.layout.parameters.iter().enumerate() {
            if let Some(c) = col {
                *buffer.parameter_value_mut(i) = b.parameter_scaling[i].unscale(x[*c]);
            }
        }
        Ok(())
    }

    /// Scaled lower and upper bounds of every design column.
    pub fn variable_bounds(&self) -> (Vec<f64>, Vec<f64>) {
        let n = self.num_variables();
        let mut lower = vec![f64::NEG_INFINITY; n];
        let mut upper = vec![f64::INFINITY; n];
        let mut put = |col: Option<usize>, scaling: &Scaling, lo: Option<f64>, hi: Option<f64>| {
            if let Some(c) = col {
                let (l, u) = scaling.scale_bounds(lower_or_neg_inf(lo), upper_or_inf(hi));
                lower[c] = l;
                upper[c] = u;
            }
        };

        let b = &self.bindings;
        let time = self.phase.time_options();
        put(
            self.layout.t_initial,
            &b.initial_scaling,
            time.initial_bounds.0,
            time.initial_bounds.1,
        );
        put(
            self.layout.t_duration,
            &b.duration_scaling,
            time.duration_bounds.0,
            time.duration_bounds.1,
        );
        for (i, s) in self.phase.states().iter().enumerate() {
            for col in &self.layout.states[i] {
                put(*col, &b.state_scaling[i], s.lower, s.upper);
            }
        }
        for (i, c) in self.phase.controls().iter().enumerate() {
            for col in &self.layout.controls[i] {
                put(*col, &b.control_scaling[i], c.lower, c.upper);
            }
        }
        for (i, p) in self.phase.parameters().iter().enumerate() {
            put(self.layout.parameters[i], &b.parameter_scaling[i], p.lower, p.upper);
        }
        (lower, upper)
    }

    /// Scaled lower and upper bounds of every constraint row.
    pub fn constraint_bounds(&self) -> (Vec<f64>, Vec<f64>) {
        self.rows
            .iter()
            .map(|r| r.scaling.scale_bounds(r.lower, r.upper))
            .unzip()
    }

    /// Human-readable name of a target.
    pub fn target_name(&self, target: Target) -> &str {
        self.phase.target_name(target)
    }
}
