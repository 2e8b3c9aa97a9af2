//! Phase declaration and validation.

use tracing::debug;
use traj_core::{conversion_factor, lower_or_neg_inf, parse_unit, upper_or_inf};

use crate::constraints::{BoundaryConstraint, Location, Objective, PathConstraint};
use crate::error::{PhaseError, PhaseResult};
use crate::ode::{OdeResult, OdeSignature, OdeSystem};
use crate::scaling::{ScaleSpec, Scaling};
use crate::targets::{TIME_KEY, Target};
use crate::variables::{ControlDef, ParameterDef, StateDef, TimeOptions};

/// Where an ODE input takes its value from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputSource {
    Time,
    State(usize),
    Control(usize),
    Parameter(usize),
}

/// Connection of one ODE input, including the unit conversion applied on the way in.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InputBinding {
    pub source: InputSource,
    pub factor: f64,
}

/// A boundary or path constraint with its target resolved and bounds normalized.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedConstraint {
    pub label: String,
    pub target: Target,
    /// `None` for path constraints.
    pub loc: Option<Location>,
    /// Physical lower bound (`-INFINITE_BOUND` when absent).
    pub lower: f64,
    /// Physical upper bound (`INFINITE_BOUND` when absent).
    pub upper: f64,
    pub equality: bool,
    pub scaling: Scaling,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedObjective {
    pub target: Target,
    pub loc: Location,
    pub scaling: Scaling,
}

/// Everything the transcription needs from a validated phase.
#[derive(Clone, Debug, PartialEq)]
pub struct PhaseBindings {
    pub initial_scaling: Scaling,
    pub duration_scaling: Scaling,
    pub state_scaling: Vec<Scaling>,
    pub defect_refs: Vec<f64>,
    pub rate_sources: Vec<Target>,
    /// Multiplies an ODE output rate into state units per phase time unit.
    pub rate_factors: Vec<f64>,
    pub control_scaling: Vec<Scaling>,
    pub parameter_scaling: Vec<Scaling>,
    /// One entry per ODE input, in signature order.
    pub inputs: Vec<InputBinding>,
    pub boundary: Vec<ResolvedConstraint>,
    pub path: Vec<ResolvedConstraint>,
    pub objective: ResolvedObjective,
}

/// Declarations of one trajectory phase plus its ODE collaborator.
pub struct Phase {
    ode: Box<dyn OdeSystem>,
    signature: OdeSignature,
    time: TimeOptions,
    states: Vec<StateDef>,
    controls: Vec<ControlDef>,
    parameters: Vec<ParameterDef>,
    boundary_constraints: Vec<BoundaryConstraint>,
    path_constraints: Vec<PathConstraint>,
    objective: Option<Objective>,
}

impl std::fmt::Debug for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Phase")
            .field("signature", &self.signature)
            .field("time", &self.time)
            .field("states", &self.states)
            .field("controls", &self.controls)
            .field("parameters", &self.parameters)
            .field("boundary_constraints", &self.boundary_constraints)
            .field("path_constraints", &self.path_constraints)
            .field("objective", &self.objective)
            .finish_non_exhaustive()
    }
}

fn check_bounds(name: &str, lower: Option<f64>, upper: Option<f64>) -> PhaseResult<()> {
    let lo = lower.unwrap_or(f64::NEG_INFINITY);
    let hi = upper.unwrap_or(f64::INFINITY);
    if lo.is_nan() || hi.is_nan() || lo > hi {
        return Err(PhaseError::InvalidBounds {
            name: name.to_string(),
            lower: lo,
            upper: hi,
        });
    }
    Ok(())
}

impl Phase {
    pub fn new(ode: Box<dyn OdeSystem>) -> Self {
        let signature = ode.signature();
        Self {
            ode,
            signature,
            time: TimeOptions::default(),
            states: Vec::new(),
            controls: Vec::new(),
            parameters: Vec::new(),
            boundary_constraints: Vec::new(),
            path_constraints: Vec::new(),
            objective: None,
        }
    }

    fn check_name(&self, name: &str) -> PhaseResult<()> {
        let existing = if name == TIME_KEY {
            Some("time")
        } else if self.states.iter().any(|s| s.name == name) {
            Some("state")
        } else if self.controls.iter().any(|c| c.name == name) {
            Some("control")
        } else if self.parameters.iter().any(|p| p.name == name) {
            Some("parameter")
        } else {
            None
        };
        match existing {
            Some(existing) => Err(PhaseError::DuplicateName {
                name: name.to_string(),
                existing,
            }),
            None => Ok(()),
        }
    }

    pub fn set_time_options(&mut self, options: TimeOptions) -> PhaseResult<()> {
        check_bounds("t_initial", options.initial_bounds.0, options.initial_bounds.1)?;
        check_bounds(
            "t_duration",
            options.duration_bounds.0,
            options.duration_bounds.1,
        )?;
        if let Some(lower) = options.duration_bounds.0 {
            if lower <= 0.0 {
                return Err(PhaseError::NonPositiveDuration { lower });
            }
        }
        options.initial_scaling.resolve("t_initial")?;
        options.duration_scaling.resolve("t_duration")?;
        self.time = options;
        Ok(())
    }

    /// Register a state. Returns its declaration index.
    pub fn declare_state(&mut self, def: StateDef) -> PhaseResult<usize> {
        self.check_name(&def.name)?;
        check_bounds(&def.name, def.lower, def.upper)?;
        def.scaling.resolve(&def.name)?;
        if let Some(defect_ref) = def.defect_ref {
            if !defect_ref.is_finite() || defect_ref == 0.0 {
                return Err(PhaseError::InvalidScale {
                    name: def.name.clone(),
                    reason: format!("defect_ref must be finite and non-zero, got {defect_ref}"),
                });
            }
        }
        self.states.push(def);
        Ok(self.states.len() - 1)
    }

    /// Register a control. Returns its declaration index.
    pub fn declare_control(&mut self, def: ControlDef) -> PhaseResult<usize> {
        self.check_name(&def.name)?;
        check_bounds(&def.name, def.lower, def.upper)?;
        def.scaling.resolve(&def.name)?;
        for (flag, scaler, what) in [
            (def.rate_continuity, def.rate_continuity_scaler, "rate_continuity_scaler"),
            (def.rate2_continuity, def.rate2_continuity_scaler, "rate2_continuity_scaler"),
        ] {
            if flag && (!scaler.is_finite() || scaler == 0.0) {
                return Err(PhaseError::InvalidScale {
                    name: def.name.clone(),
                    reason: format!("{what} must be finite and non-zero, got {scaler}"),
                });
            }
        }
        self.controls.push(def);
        Ok(self.controls.len() - 1)
    }

    /// Register a parameter. Returns its declaration index.
    pub fn declare_parameter(&mut self, def: ParameterDef) -> PhaseResult<usize> {
        self.check_name(&def.name)?;
        check_bounds(&def.name, def.lower, def.upper)?;
        def.scaling.resolve(&def.name)?;
        self.parameters.push(def);
        Ok(self.parameters.len() - 1)
    }

    pub fn add_boundary_constraint(&mut self, constraint: BoundaryConstraint) -> PhaseResult<()> {
        constraint.bounds()?;
        constraint.scaling.resolve(&constraint.label())?;
        self.boundary_constraints.push(constraint);
        Ok(())
    }

    pub fn add_path_constraint(&mut self, constraint: PathConstraint) -> PhaseResult<()> {
        constraint.bounds()?;
        constraint.scaling.resolve(&constraint.label())?;
        self.path_constraints.push(constraint);
        Ok(())
    }

    pub fn set_objective(&mut self, objective: Objective) -> PhaseResult<()> {
        objective.scaling.resolve("objective")?;
        self.objective = Some(objective);
        Ok(())
    }

    fn state_mut(&mut self, name: &str) -> PhaseResult<&mut StateDef> {
        self.states
            .iter_mut()
            .find(|s| s.name == name)
            .ok_or_else(|| PhaseError::UnknownVariable {
                name: name.to_string(),
            })
    }

    pub fn set_state_bounds(
        &mut self,
        name: &str,
        lower: Option<f64>,
        upper: Option<f64>,
    ) -> PhaseResult<()> {
        check_bounds(name, lower, upper)?;
        let state = self.state_mut(name)?;
        state.lower = lower;
        state.upper = upper;
        Ok(())
    }

    pub fn set_state_scaling(&mut self, name: &str, scaling: ScaleSpec) -> PhaseResult<()> {
        scaling.resolve(name)?;
        self.state_mut(name)?.scaling = scaling;
        Ok(())
    }

    pub fn ode(&self) -> &dyn OdeSystem {
        self.ode.as_ref()
    }

    pub fn signature(&self) -> &OdeSignature {
        &self.signature
    }

    pub fn time_options(&self) -> &TimeOptions {
        &self.time
    }

    pub fn states(&self) -> &[StateDef] {
        &self.states
    }

    pub fn controls(&self) -> &[ControlDef] {
        &self.controls
    }

    pub fn parameters(&self) -> &[ParameterDef] {
        &self.parameters
    }

    pub fn boundary_constraints(&self) -> &[BoundaryConstraint] {
        &self.boundary_constraints
    }

    pub fn path_constraints(&self) -> &[PathConstraint] {
        &self.path_constraints
    }

    pub fn objective(&self) -> Option<&Objective> {
        self.objective.as_ref()
    }

    pub fn state_index(&self, name: &str) -> Option<usize> {
        self.states.iter().position(|s| s.name == name)
    }

    pub fn control_index(&self, name: &str) -> Option<usize> {
        self.controls.iter().position(|c| c.name == name)
    }

    pub fn parameter_index(&self, name: &str) -> Option<usize> {
        self.parameters.iter().position(|p| p.name == name)
    }

    /// Resolve a string key: `time`, then states, controls, parameters, then ODE outputs.
    pub fn resolve(&self, key: &str) -> Option<Target> {
        if key == TIME_KEY {
            return Some(Target::Time);
        }
        if let Some(i) = self.state_index(key) {
            return Some(Target::State(i));
        }
        if let Some(i) = self.control_index(key) {
            return Some(Target::Control(i));
        }
        if let Some(i) = self.parameter_index(key) {
            return Some(Target::Parameter(i));
        }
        self.signature.output_index(key).map(Target::Output)
    }

    pub fn target_name(&self, target: Target) -> &str {
        match target {
            Target::Time => TIME_KEY,
            Target::State(i) => &self.states[i].name,
            Target::Control(i) => &self.controls[i].name,
            Target::Parameter(i) => &self.parameters[i].name,
            Target::Output(i) => &self.signature.outputs[i].name,
        }
    }

    fn resolve_in(&self, key: &str, context: &str) -> PhaseResult<Target> {
        self.resolve(key).ok_or_else(|| PhaseError::UnresolvedTarget {
            key: key.to_string(),
            context: context.to_string(),
        })
    }

    /// Evaluate the ODE collaborator.
    pub fn evaluate_ode(&self, time: f64, inputs: &[f64], outputs: &mut [f64]) -> OdeResult<()> {
        self.ode.evaluate(time, inputs, outputs)
    }

    /// Check the whole schema without keeping the resolved bindings.
    pub fn validate(&self) -> PhaseResult<()> {
        self.bind().map(|_| ())
    }

    /// Validate the whole schema and resolve every key.
    pub fn bind(&self) -> PhaseResult<PhaseBindings> {
        if self.states.is_empty() {
            return Err(PhaseError::NoStates);
        }
        let objective = self.objective.as_ref().ok_or(PhaseError::MissingObjective)?;

        let initial_scaling = self.time.initial_scaling.resolve("t_initial")?;
        let duration_scaling = self.time.duration_scaling.resolve("t_duration")?;

        let mut state_scaling = Vec::with_capacity(self.states.len());
        let mut defect_refs = Vec::with_capacity(self.states.len());
        let mut rate_sources = Vec::with_capacity(self.states.len());
        for state in &self.states {
            let scaling = state.scaling.resolve(&state.name)?;
            defect_refs.push(state.defect_ref.unwrap_or(1.0 / scaling.scaler));
            state_scaling.push(scaling);
            rate_sources.push(
                self.resolve_in(&state.rate_source, &format!("rate_source of state '{}'", state.name))?,
            );
        }
        let rate_factors = self
            .states
            .iter()
            .zip(&rate_sources)
            .map(|(state, source)| self.rate_factor(state, *source))
            .collect::<PhaseResult<Vec<_>>>()?;
        let control_scaling = self
            .controls
            .iter()
            .map(|c| c.scaling.resolve(&c.name))
            .collect::<PhaseResult<Vec<_>>>()?;
        let parameter_scaling = self
            .parameters
            .iter()
            .map(|p| p.scaling.resolve(&p.name))
            .collect::<PhaseResult<Vec<_>>>()?;

        let inputs = self.bind_inputs()?;

        let mut boundary = Vec::with_capacity(self.boundary_constraints.len());
        for c in &self.boundary_constraints {
            let label = c.label();
            let bounds = c.bounds()?;
            let (lower, upper) = bounds.as_pair();
            boundary.push(ResolvedConstraint {
                target: self.resolve_in(&c.target, &label)?,
                loc: Some(c.loc),
                lower: lower_or_neg_inf(lower),
                upper: upper_or_inf(upper),
                equality: bounds.is_equality(),
                scaling: c.scaling.resolve(&label)?,
                label,
            });
        }
        let mut path = Vec::with_capacity(self.path_constraints.len());
        for c in &self.path_constraints {
            let label = c.label();
            let bounds = c.bounds()?;
            let (lower, upper) = bounds.as_pair();
            path.push(ResolvedConstraint {
                target: self.resolve_in(&c.target, &label)?,
                loc: None,
                lower: lower_or_neg_inf(lower),
                upper: upper_or_inf(upper),
                equality: bounds.is_equality(),
                scaling: c.scaling.resolve(&label)?,
                label,
            });
        }

        let objective = ResolvedObjective {
            target: self.resolve_in(&objective.target, "objective")?,
            loc: objective.loc,
            scaling: objective.scaling.resolve("objective")?,
        };

        debug!(
            states = self.states.len(),
            controls = self.controls.len(),
            parameters = self.parameters.len(),
            boundary = boundary.len(),
            path = path.len(),
            "phase bound"
        );

        Ok(PhaseBindings {
            initial_scaling,
            duration_scaling,
            state_scaling,
            defect_refs,
            rate_sources,
            rate_factors,
            control_scaling,
            parameter_scaling,
            inputs,
            boundary,
            path,
            objective,
        })
    }

    /// Unit factor from an ODE output rate to `state units / time units`.
    ///
    /// Applied only when both the output and the state declare units.
    fn rate_factor(&self, state: &StateDef, source: Target) -> PhaseResult<f64> {
        let Target::Output(i) = source else {
            return Ok(1.0);
        };
        let (Some(out_units), Some(state_units)) =
            (self.signature.outputs[i].units.as_deref(), state.units.as_deref())
        else {
            return Ok(1.0);
        };
        let incompatible = |source| PhaseError::IncompatibleUnits {
            name: state.name.clone(),
            source,
        };
        let out = parse_unit(Some(out_units)).map_err(incompatible)?;
        let st = parse_unit(Some(state_units)).map_err(incompatible)?;
        let time = parse_unit(self.time.units.as_deref()).map_err(incompatible)?;
        Ok(out.to_si * time.to_si / st.to_si)
    }

    fn bind_inputs(&self) -> PhaseResult<Vec<InputBinding>> {
        let mut slots: Vec<Option<(InputBinding, String)>> = vec![None; self.signature.inputs.len()];

        let mut connect = |source: InputSource,
                           name: &str,
                           units: Option<&str>,
                           targets: &Option<Vec<String>>|
         -> PhaseResult<()> {
            let explicit = targets.is_some();
            let requested: Vec<&str> = match targets {
                Some(list) => list.iter().map(String::as_str).collect(),
                None => vec![name],
            };
            for input_name in requested {
                let Some(idx) = self.signature.input_index(input_name) else {
                    if explicit {
                        return Err(PhaseError::UnresolvedTarget {
                            key: input_name.to_string(),
                            context: format!("targets of '{name}'"),
                        });
                    }
                    continue;
                };
                let port = &self.signature.inputs[idx];
                let factor = conversion_factor(units, port.units.as_deref()).map_err(|source| {
                    PhaseError::IncompatibleUnits {
                        name: name.to_string(),
                        source,
                    }
                })?;
                if let Some((_, first)) = &slots[idx] {
                    return Err(PhaseError::ConflictingTarget {
                        input: input_name.to_string(),
                        first: first.clone(),
                        second: name.to_string(),
                    });
                }
                slots[idx] = Some((InputBinding { source, factor }, name.to_string()));
            }
            Ok(())
        };

        for (i, s) in self.states.iter().enumerate() {
            connect(InputSource::State(i), &s.name, s.units.as_deref(), &s.targets)?;
        }
        for (i, c) in self.controls.iter().enumerate() {
            connect(InputSource::Control(i), &c.name, c.units.as_deref(), &c.targets)?;
        }
        for (i, p) in self.parameters.iter().enumerate() {
            connect(InputSource::Parameter(i), &p.name, p.units.as_deref(), &p.targets)?;
        }

        slots
            .into_iter()
            .enumerate()
            .map(|(idx, slot)| match slot {
                Some((binding, _)) => Ok(binding),
                None => {
                    let port = &self.signature.inputs[idx];
                    if port.name == TIME_KEY || port.name == "t" {
                        let factor = conversion_factor(
                            self.time.units.as_deref(),
                            port.units.as_deref(),
                        )
                        .map_err(|source| PhaseError::IncompatibleUnits {
                            name: TIME_KEY.to_string(),
                            source,
                        })?;
                        Ok(InputBinding {
                            source: InputSource::Time,
                            factor,
                        })
                    } else {
                        Err(PhaseError::UnconnectedInput {
                            input: port.name.clone(),
                        })
                    }
                }
            })
            .collect()
    }
}
