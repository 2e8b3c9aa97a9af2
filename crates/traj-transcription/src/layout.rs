//! Node grid and design-vector layout.
//!
//! The flat node list holds every LGL node of every segment, so a segment
//! boundary appears twice (last node of the left segment, first node of the
//! right one). Input slots are where values live in the trajectory buffer:
//! states have one slot per discretization node, controls one per node. In a
//! compressed transcription the two sides of a segment boundary share a slot.

use nalgebra::DMatrix;
use traj_phase::{Location, Phase};

use crate::error::{TranscriptionError, TranscriptionResult};
use crate::lgl::{self, HermiteMatrices};
use crate::mesh::Mesh;

/// Position of a node as `(segment, local index)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeRef {
    pub segment: usize,
    pub local: usize,
}

impl NodeRef {
    pub fn is_discretization(&self) -> bool {
        self.local % 2 == 0
    }
}

/// Precomputed data of one segment.
#[derive(Clone, Debug)]
pub struct SegmentGrid {
    pub order: usize,
    /// LGL nodes of the segment on `[-1, 1]`, `2k + 1` entries.
    pub tau: Vec<f64>,
    pub lagrange_weights: Vec<f64>,
    /// Normalized `(start, end)` of the segment within the phase.
    pub span: (f64, f64),
    /// Flat index of local node 0.
    pub node_offset: usize,
    /// State slot of each discretization node (`k + 1` entries).
    pub state_slots: Vec<usize>,
    /// Control slot of each node (`2k + 1` entries).
    pub control_slots: Vec<usize>,
    pub hermite: HermiteMatrices,
    /// Lagrange differentiation matrix on `tau`.
    pub diff: DMatrix<f64>,
}

impl SegmentGrid {
    pub fn num_nodes(&self) -> usize {
        self.tau.len()
    }

    /// Normalized phase time of a local node. Segment ends are exact.
    pub fn fraction_at(&self, local: usize) -> f64 {
        let (a, b) = self.span;
        if local == 0 {
            a
        } else if local + 1 == self.tau.len() {
            b
        } else {
            a + 0.5 * (self.tau[local] + 1.0) * (b - a)
        }
    }

    /// `dt / dtau` for a phase of the given duration.
    pub fn dt_dstau(&self, duration: f64) -> f64 {
        0.5 * duration * (self.span.1 - self.span.0)
    }

    pub fn state_slot(&self, local: usize) -> Option<usize> {
        (local % 2 == 0).then(|| self.state_slots[local / 2])
    }
}

/// All segments of a mesh, with slot bookkeeping for one compression mode.
#[derive(Clone, Debug)]
pub struct Grid {
    pub segments: Vec<SegmentGrid>,
    pub compressed: bool,
    pub num_nodes: usize,
    pub num_state_slots: usize,
    pub num_control_slots: usize,
}

impl Grid {
    pub fn new(mesh: &Mesh, compressed: bool) -> TranscriptionResult<Self> {
        let mut segments = Vec::with_capacity(mesh.num_segments());
        let mut node_offset = 0;
        let mut state_slot = 0;
        let mut control_slot = 0;

        for s in 0..mesh.num_segments() {
            let k = mesh.order(s);
            let (tau, _) = lgl::lgl_nodes(2 * k + 1);
            let tau_d: Vec<f64> = tau.iter().step_by(2).copied().collect();
            let tau_c: Vec<f64> = tau.iter().skip(1).step_by(2).copied().collect();
            let hermite = lgl::hermite_matrices(&tau_d, &tau_c).ok_or_else(|| {
                TranscriptionError::InvalidMesh {
                    reason: format!("singular Hermite system for order {k} in segment {s}"),
                }
            })?;

            if s > 0 && compressed {
                // Share the boundary slot with the previous segment.
                state_slot -= 1;
                control_slot -= 1;
            }
            let state_slots = (state_slot..state_slot + k + 1).collect();
            let control_slots = (control_slot..control_slot + 2 * k + 1).collect();
            state_slot += k + 1;
            control_slot += 2 * k + 1;

            segments.push(SegmentGrid {
                order: k,
                lagrange_weights: lgl::barycentric_weights(&tau),
                diff: lgl::differentiation_matrix(&tau),
                tau,
                span: mesh.span(s),
                node_offset,
                state_slots,
                control_slots,
                hermite,
            });
            node_offset += 2 * k + 1;
        }

        Ok(Self {
            segments,
            compressed,
            num_nodes: node_offset,
            num_state_slots: state_slot,
            num_control_slots: control_slot,
        })
    }

    pub fn flat(&self, node: NodeRef) -> usize {
        self.segments[node.segment].node_offset + node.local
    }

    pub fn first_node(&self) -> NodeRef {
        NodeRef {
            segment: 0,
            local: 0,
        }
    }

    pub fn last_node(&self) -> NodeRef {
        let segment = self.segments.len() - 1;
        NodeRef {
            segment,
            local: self.segments[segment].num_nodes() - 1,
        }
    }

    pub fn node_at(&self, loc: Location) -> NodeRef {
        match loc {
            Location::Initial => self.first_node(),
            Location::Final => self.last_node(),
        }
    }

    /// Every distinct node in time order. A shared boundary is reported once,
    /// as the last node of the left segment.
    pub fn unique_nodes(&self) -> Vec<NodeRef> {
        let mut nodes = Vec::new();
        for (segment, seg) in self.segments.iter().enumerate() {
            let start = usize::from(segment > 0);
            nodes.extend((start..seg.num_nodes()).map(|local| NodeRef { segment, local }));
        }
        nodes
    }

    /// Collocation nodes in time order.
    pub fn collocation_nodes(&self) -> Vec<NodeRef> {
        let mut nodes = Vec::new();
        for (segment, seg) in self.segments.iter().enumerate() {
            nodes.extend((1..seg.num_nodes()).step_by(2).map(|local| NodeRef { segment, local }));
        }
        nodes
    }

    pub fn num_collocation_nodes(&self) -> usize {
        self.segments.iter().map(|s| s.order).sum()
    }

    /// Normalized time of every state slot.
    pub fn state_slot_fractions(&self) -> Vec<f64> {
        let mut out = vec![0.0; self.num_state_slots];
        for seg in &self.segments {
            for (j, &slot) in seg.state_slots.iter().enumerate() {
                out[slot] = seg.fraction_at(2 * j);
            }
        }
        out
    }

    /// Normalized time of every control slot.
    pub fn control_slot_fractions(&self) -> Vec<f64> {
        let mut out = vec![0.0; self.num_control_slots];
        for seg in &self.segments {
            for (local, &slot) in seg.control_slots.iter().enumerate() {
                out[slot] = seg.fraction_at(local);
            }
        }
        out
    }

    /// `(left, right)` slot pairs at interior segment boundaries for states.
    pub fn state_boundary_pairs(&self) -> Vec<(usize, usize)> {
        self.segments
            .windows(2)
            .map(|w| {
                let left = *w[0].state_slots.last().unwrap_or(&0);
                (left, w[1].state_slots[0])
            })
            .collect()
    }

    /// `(left, right)` slot pairs at interior segment boundaries for controls.
    pub fn control_boundary_pairs(&self) -> Vec<(usize, usize)> {
        self.segments
            .windows(2)
            .map(|w| {
                let left = *w[0].control_slots.last().unwrap_or(&0);
                (left, w[1].control_slots[0])
            })
            .collect()
    }
}

/// Column assignment of the flat scaled design vector.
///
/// Order: `t_initial`, `t_duration`, state slots (state-major), control slots
/// (control-major), optimized parameters. Fixed entries have no column.
#[derive(Clone, Debug, PartialEq)]
pub struct DesignLayout {
    pub t_initial: Option<usize>,
    pub t_duration: Option<usize>,
    pub states: Vec<Vec<Option<usize>>>,
    pub controls: Vec<Vec<Option<usize>>>,
    pub parameters: Vec<Option<usize>>,
    pub labels: Vec<String>,
}

impl DesignLayout {
    pub fn new(phase: &Phase, grid: &Grid) -> Self {
        let mut labels = Vec::new();
        let mut next = |label: String| {
            labels.push(label);
            labels.len() - 1
        };

        let time = phase.time_options();
        let t_initial = (!time.fix_initial).then(|| next("t_initial".to_string()));
        let t_duration = (!time.fix_duration).then(|| next("t_duration".to_string()));

        let slot_columns = |name: &str,
                            slots: usize,
                            opt: bool,
                            fix_first: bool,
                            fix_last: bool,
                            kind: &str,
                            next: &mut dyn FnMut(String) -> usize| {
            (0..slots)
                .map(|slot| {
                    let fixed = !opt || (fix_first && slot == 0) || (fix_last && slot + 1 == slots);
                    (!fixed).then(|| next(format!("{kind}:{name}[{slot}]")))
                })
                .collect::<Vec<_>>()
        };

        let states = phase
            .states()
            .iter()
            .map(|s| {
                slot_columns(
                    &s.name,
                    grid.num_state_slots,
                    true,
                    s.fix_initial,
                    s.fix_final,
                    "states",
                    &mut next,
                )
            })
            .collect();
        let controls = phase
            .controls()
            .iter()
            .map(|c| {
                slot_columns(
                    &c.name,
                    grid.num_control_slots,
                    c.opt,
                    c.fix_initial,
                    c.fix_final,
                    "controls",
                    &mut next,
                )
            })
            .collect();
        let parameters = phase
            .parameters()
            .iter()
            .map(|p| p.opt.then(|| next(format!("parameters:{}", p.name))))
            .collect();

        Self {
            t_initial,
            t_duration,
            states,
            controls,
            parameters,
            labels,
        }
    }

    pub fn num_columns(&self) -> usize {
        self.labels.len()
    }

    /// Columns every node depends on: time and optimized parameters.
    pub fn global_columns(&self) -> Vec<usize> {
        self.t_initial
            .into_iter()
            .chain(self.t_duration)
            .chain(self.parameters.iter().flatten().copied())
            .collect()
    }

    /// Columns of all states and controls at a discretization node, plus globals.
    pub fn node_columns(&self, seg: &SegmentGrid, local: usize) -> Vec<usize> {
        let mut cols = self.global_columns();
        if let Some(slot) = seg.state_slot(local) {
            cols.extend(self.states.iter().filter_map(|s| s[slot]));
        }
        let slot = seg.control_slots[local];
        cols.extend(self.controls.iter().filter_map(|c| c[slot]));
        normalize(cols)
    }

    /// Columns any value inside a segment can depend on.
    pub fn segment_columns(&self, seg: &SegmentGrid) -> Vec<usize> {
        let mut cols = self.global_columns();
        for s in &self.states {
            cols.extend(seg.state_slots.iter().filter_map(|&slot| s[slot]));
        }
        for c in &self.controls {
            cols.extend(seg.control_slots.iter().filter_map(|&slot| c[slot]));
        }
        normalize(cols)
    }
}

pub(crate) fn normalize(mut cols: Vec<usize>) -> Vec<usize> {
    cols.sort_unstable();
    cols.dedup();
    cols
}
