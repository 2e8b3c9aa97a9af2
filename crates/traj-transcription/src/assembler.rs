//! Ordered, labelled constraint rows of a transcribed phase.
//!
//! Row order:
//! 1. collocation defects, state-major then collocation nodes in time order;
//! 2. state continuity (uncompressed only);
//! 3. control value continuity (uncompressed only);
//! 4. control rate continuity, then control second-derivative continuity;
//! 5. initial boundary constraints, then final ones, in declaration order;
//! 6. path constraints in declaration order, node-major within each.

use std::collections::BTreeMap;

use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use traj_phase::{Location, Phase, PhaseBindings, Scaling, Target};

use crate::buffer::TrajectoryBuffer;
use crate::evaluate::NodeValues;
use crate::layout::{DesignLayout, Grid, NodeRef, normalize};
use crate::transcription::Transcription;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    Defect,
    StateContinuity,
    ControlContinuity,
    ControlRateContinuity,
    ControlRate2Continuity,
    InitialBoundary,
    FinalBoundary,
    Path,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum RowSource {
    Defect {
        index: usize,
    },
    StateContinuity {
        state: usize,
        left: usize,
        right: usize,
    },
    ControlContinuity {
        control: usize,
        left: usize,
        right: usize,
    },
    RateContinuity {
        control: usize,
        left_segment: usize,
        order: u8,
    },
    Node {
        target: Target,
        flat: usize,
    },
}

/// One constraint row. Bounds are physical; `scaling` maps values and bounds
/// into the NLP.
#[derive(Clone, Debug, PartialEq)]
pub struct ConstraintRow {
    pub label: String,
    pub kind: ConstraintKind,
    pub equality: bool,
    pub lower: f64,
    pub upper: f64,
    pub scaling: Scaling,
    /// Design columns this row can depend on, sorted.
    pub columns: Vec<usize>,
    /// Constant `(column, d scaled value / d column)` pairs of a row that is
    /// affine in the design vector. `None` for rows that need differencing.
    pub linear: Option<Vec<(usize, f64)>>,
    pub(crate) source: RowSource,
}

impl ConstraintRow {
    pub fn is_linear(&self) -> bool {
        self.linear.is_some()
    }
}

fn equality_row(
    label: String,
    kind: ConstraintKind,
    scaling: Scaling,
    columns: Vec<usize>,
    source: RowSource,
    linear: Option<Vec<(usize, f64)>>,
) -> ConstraintRow {
    ConstraintRow {
        label,
        kind,
        equality: true,
        lower: 0.0,
        upper: 0.0,
        linear: linear.map(|terms| scaled_terms(terms, scaling.scaler)),
        scaling,
        columns,
        source,
    }
}

/// Merge repeated columns, drop zeros and apply the row scaler.
fn scaled_terms(terms: Vec<(usize, f64)>, scaler: f64) -> Vec<(usize, f64)> {
    let mut merged: BTreeMap<usize, f64> = BTreeMap::new();
    for (col, coeff) in terms {
        *merged.entry(col).or_insert(0.0) += coeff;
    }
    merged
        .into_iter()
        .filter(|(_, coeff)| *coeff != 0.0)
        .map(|(col, coeff)| (col, coeff * scaler))
        .collect()
}

/// Derivative of a physical value over its scaled design column.
fn unscaled_term(col: Option<usize>, scaling: &Scaling) -> Option<(usize, f64)> {
    col.map(|c| (c, 1.0 / scaling.scaler))
}

/// Jacobian of a target's physical value at `node`, when it is affine in the
/// design vector. Interpolated states and ODE outputs are not.
pub(crate) fn affine_target(
    grid: &Grid,
    layout: &DesignLayout,
    bindings: &PhaseBindings,
    node: NodeRef,
    target: Target,
) -> Option<Vec<(usize, f64)>> {
    let seg = &grid.segments[node.segment];
    match target {
        Target::Time => {
            let fraction = seg.fraction_at(node.local);
            let mut terms: Vec<(usize, f64)> =
                unscaled_term(layout.t_initial, &bindings.initial_scaling)
                    .into_iter()
                    .collect();
            if let Some((c, d)) = unscaled_term(layout.t_duration, &bindings.duration_scaling) {
                terms.push((c, d * fraction));
            }
            Some(terms)
        }
        Target::Parameter(i) => Some(
            unscaled_term(layout.parameters[i], &bindings.parameter_scaling[i])
                .into_iter()
                .collect(),
        ),
        Target::Control(i) => Some(
            unscaled_term(
                layout.controls[i][seg.control_slots[node.local]],
                &bindings.control_scaling[i],
            )
            .into_iter()
            .collect(),
        ),
        Target::State(i) => seg.state_slot(node.local).map(|slot| {
            unscaled_term(layout.states[i][slot], &bindings.state_scaling[i])
                .into_iter()
                .collect()
        }),
        Target::Output(_) => None,
    }
}

/// `(value left) - (value right)` of two slots of one variable.
fn difference_terms(
    cols: &[Option<usize>],
    left: usize,
    right: usize,
    scaling: &Scaling,
) -> Vec<(usize, f64)> {
    let mut terms: Vec<(usize, f64)> = unscaled_term(cols[left], scaling).into_iter().collect();
    if let Some((c, d)) = unscaled_term(cols[right], scaling) {
        terms.push((c, -d));
    }
    terms
}

/// Rate continuity is linear in the control values: the duration cancels
/// between the segment time scales and the row's own `dts^order` factor.
fn rate_continuity_terms(
    grid: &Grid,
    layout: &DesignLayout,
    bindings: &PhaseBindings,
    control: usize,
    left_segment: usize,
    order: u8,
) -> Vec<(usize, f64)> {
    let (left, right) = (&grid.segments[left_segment], &grid.segments[left_segment + 1]);
    let width = |span: (f64, f64)| span.1 - span.0;
    let mean = 0.5 * (width(left.span) + width(right.span));
    let mut terms = Vec::new();
    for (seg, local, sign) in [(left, left.num_nodes() - 1, 1.0), (right, 0, -1.0)] {
        let ratio = (mean / width(seg.span)).powi(i32::from(order));
        let mut weights: DVector<f64> = DVector::zeros(seg.num_nodes());
        weights[local] = 1.0;
        // Row `local` of diff^order.
        for _ in 0..order {
            weights = seg.diff.transpose() * weights;
        }
        let scaling = &bindings.control_scaling[control];
        for (m, &slot) in seg.control_slots.iter().enumerate() {
            if let Some((c, d)) = unscaled_term(layout.controls[control][slot], scaling) {
                terms.push((c, sign * ratio * weights[m] * d));
            }
        }
    }
    terms
}

fn delta_scaling(scaler: f64) -> Scaling {
    Scaling { scaler, adder: 0.0 }
}

/// Design columns a target's value at `node` can depend on.
pub(crate) fn target_columns(
    grid: &Grid,
    layout: &DesignLayout,
    node: NodeRef,
    target: Target,
) -> Vec<usize> {
    let seg = &grid.segments[node.segment];
    match target {
        Target::Time => layout.t_initial.into_iter().chain(layout.t_duration).collect(),
        Target::Parameter(i) => layout.parameters[i].into_iter().collect(),
        Target::Control(i) => layout.controls[i][seg.control_slots[node.local]]
            .into_iter()
            .collect(),
        Target::State(i) => match seg.state_slot(node.local) {
            Some(slot) => layout.states[i][slot].into_iter().collect(),
            None => layout.segment_columns(seg),
        },
        Target::Output(_) => {
            if node.is_discretization() {
                layout.node_columns(seg, node.local)
            } else {
                layout.segment_columns(seg)
            }
        }
    }
}

pub(crate) fn build_rows(
    phase: &Phase,
    bindings: &PhaseBindings,
    grid: &Grid,
    layout: &DesignLayout,
) -> Vec<ConstraintRow> {
    let mut rows = Vec::new();
    let segment_columns: Vec<Vec<usize>> = grid
        .segments
        .iter()
        .map(|seg| layout.segment_columns(seg))
        .collect();

    let collocation = grid.collocation_nodes();
    for (j, state) in phase.states().iter().enumerate() {
        for (c, node) in collocation.iter().enumerate() {
            rows.push(equality_row(
                format!("defect:{}[{c}]", state.name),
                ConstraintKind::Defect,
                Scaling::IDENTITY,
                segment_columns[node.segment].clone(),
                RowSource::Defect {
                    index: j * collocation.len() + c,
                },
                None,
            ));
        }
    }

    if !grid.compressed {
        let pairs = grid.state_boundary_pairs();
        for (j, state) in phase.states().iter().enumerate() {
            for (b, &(left, right)) in pairs.iter().enumerate() {
                let cols = &layout.states[j];
                rows.push(equality_row(
                    format!("continuity:{}[{b}]", state.name),
                    ConstraintKind::StateContinuity,
                    delta_scaling(bindings.state_scaling[j].scaler),
                    normalize(cols[left].into_iter().chain(cols[right]).collect()),
                    RowSource::StateContinuity {
                        state: j,
                        left,
                        right,
                    },
                    Some(difference_terms(cols, left, right, &bindings.state_scaling[j])),
                ));
            }
        }

        let pairs = grid.control_boundary_pairs();
        for (i, control) in phase.controls().iter().enumerate() {
            if !control.opt || !control.continuity {
                continue;
            }
            for (b, &(left, right)) in pairs.iter().enumerate() {
                let cols = &layout.controls[i];
                rows.push(equality_row(
                    format!("continuity:{}[{b}]", control.name),
                    ConstraintKind::ControlContinuity,
                    delta_scaling(bindings.control_scaling[i].scaler),
                    normalize(cols[left].into_iter().chain(cols[right]).collect()),
                    RowSource::ControlContinuity {
                        control: i,
                        left,
                        right,
                    },
                    Some(difference_terms(cols, left, right, &bindings.control_scaling[i])),
                ));
            }
        }
    }

    for order in [1u8, 2] {
        for (i, control) in phase.controls().iter().enumerate() {
            let (enabled, scaler, kind, prefix) = if order == 1 {
                (
                    control.rate_continuity,
                    control.rate_continuity_scaler,
                    ConstraintKind::ControlRateContinuity,
                    "rate_continuity",
                )
            } else {
                (
                    control.rate2_continuity,
                    control.rate2_continuity_scaler,
                    ConstraintKind::ControlRate2Continuity,
                    "rate2_continuity",
                )
            };
            if !control.opt || !enabled {
                continue;
            }
            for b in 0..grid.segments.len().saturating_sub(1) {
                let cols = &layout.controls[i];
                let mut columns: Vec<usize> = grid.segments[b]
                    .control_slots
                    .iter()
                    .chain(&grid.segments[b + 1].control_slots)
                    .filter_map(|&slot| cols[slot])
                    .collect();
                columns.extend(layout.t_duration);
                rows.push(equality_row(
                    format!("{prefix}:{}[{b}]", control.name),
                    kind,
                    delta_scaling(scaler * bindings.control_scaling[i].scaler),
                    normalize(columns),
                    RowSource::RateContinuity {
                        control: i,
                        left_segment: b,
                        order,
                    },
                    Some(rate_continuity_terms(grid, layout, bindings, i, b, order)),
                ));
            }
        }
    }

    for loc in [Location::Initial, Location::Final] {
        let node = grid.node_at(loc);
        let flat = grid.flat(node);
        let kind = match loc {
            Location::Initial => ConstraintKind::InitialBoundary,
            Location::Final => ConstraintKind::FinalBoundary,
        };
        for c in bindings.boundary.iter().filter(|c| c.loc == Some(loc)) {
            rows.push(ConstraintRow {
                label: c.label.clone(),
                kind,
                equality: c.equality,
                lower: c.lower,
                upper: c.upper,
                scaling: c.scaling,
                columns: target_columns(grid, layout, node, c.target),
                linear: affine_target(grid, layout, bindings, node, c.target)
                    .map(|terms| scaled_terms(terms, c.scaling.scaler)),
                source: RowSource::Node {
                    target: c.target,
                    flat,
                },
            });
        }
    }

    let unique = grid.unique_nodes();
    for c in &bindings.path {
        for (n, node) in unique.iter().enumerate() {
            rows.push(ConstraintRow {
                label: format!("{}[{n}]", c.label),
                kind: ConstraintKind::Path,
                equality: c.equality,
                lower: c.lower,
                upper: c.upper,
                scaling: c.scaling,
                columns: target_columns(grid, layout, *node, c.target),
                linear: affine_target(grid, layout, bindings, *node, c.target)
                    .map(|terms| scaled_terms(terms, c.scaling.scaler)),
                source: RowSource::Node {
                    target: c.target,
                    flat: grid.flat(*node),
                },
            });
        }
    }

    rows
}

impl Transcription {
    fn row_value(&self, row: &ConstraintRow, buffer: &TrajectoryBuffer, values: &NodeValues) -> f64 {
        match row.source {
            RowSource::Defect { index } => values.defects[index],
            RowSource::StateContinuity { state, left, right } => {
                let x = buffer.state_values(state);
                x[left] - x[right]
            }
            RowSource::ControlContinuity {
                control,
                left,
                right,
            } => {
                let u = buffer.control_values(control);
                u[left] - u[right]
            }
            RowSource::RateContinuity {
                control,
                left_segment,
                order,
            } => {
                let right_segment = left_segment + 1;
                let last = self.grid.segments[left_segment].num_nodes() - 1;
                let rate_left = self.control_derivative(buffer, control, left_segment, last, order);
                let rate_right = self.control_derivative(buffer, control, right_segment, 0, order);
                // Compare in tau units so the row does not grow with the phase duration.
                let dts = 0.5
                    * (self.grid.segments[left_segment].dt_dstau(buffer.t_duration)
                        + self.grid.segments[right_segment].dt_dstau(buffer.t_duration));
                (rate_left - rate_right) * dts.powi(i32::from(order))
            }
            RowSource::Node { target, flat } => values.target_value(flat, target),
        }
    }

    /// Physical (unscaled) value of every row.
    pub fn constraint_values_physical(
        &self,
        buffer: &TrajectoryBuffer,
        values: &NodeValues,
    ) -> Vec<f64> {
        self.rows
            .iter()
            .map(|row| self.row_value(row, buffer, values))
            .collect()
    }

    /// Scaled value of every row.
    pub fn constraint_values(&self, buffer: &TrajectoryBuffer, values: &NodeValues) -> Vec<f64> {
        self.rows
            .iter()
            .map(|row| row.scaling.scale(self.row_value(row, buffer, values)))
            .collect()
    }

    /// Physical value of the objective target.
    pub fn objective_physical(&self, values: &NodeValues) -> f64 {
        let node = self.grid.node_at(self.bindings.objective.loc);
        values.target_value(self.grid.flat(node), self.bindings.objective.target)
    }

    /// Scaled objective value.
    pub fn objective_value(&self, values: &NodeValues) -> f64 {
        self.bindings
            .objective
            .scaling
            .scale(self.objective_physical(values))
    }

    /// Unpack `x` into `scratch`, evaluate and return the scaled objective and
    /// constraint vector.
    pub fn evaluate_design(
        &self,
        x: &[f64],
        scratch: &mut TrajectoryBuffer,
    ) -> crate::TranscriptionResult<(f64, Vec<f64>)> {
        self.unpack(x, scratch)?;
        let values = self.evaluate(scratch)?;
        Ok((
            self.objective_value(&values),
            self.constraint_values(scratch, &values),
        ))
    }
}
