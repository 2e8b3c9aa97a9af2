//! Built-in demonstration ODEs and the registry case files resolve them from.

use std::collections::BTreeMap;

use traj_phase::{OdeResult, OdeSignature, OdeSystem, Port};

use crate::error::{AppError, AppResult};

/// Named numeric options of a model, e.g. `g: 9.80665`.
pub type ModelOptions = BTreeMap<String, f64>;

pub type ModelFactory = fn(&ModelOptions) -> AppResult<Box<dyn OdeSystem>>;

struct ModelEntry {
    options: &'static [&'static str],
    factory: ModelFactory,
}

/// Maps model names used in case files to ODE constructors.
pub struct ModelRegistry {
    models: BTreeMap<String, ModelEntry>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl ModelRegistry {
    pub fn empty() -> Self {
        Self {
            models: BTreeMap::new(),
        }
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register("constant_rate", &["rate"], build_constant_rate);
        registry.register("double_integrator", &[], build_double_integrator);
        registry.register(
            "min_energy_double_integrator",
            &[],
            build_min_energy_double_integrator,
        );
        registry.register("decay", &["k"], build_decay);
        registry.register("brachistochrone", &["g"], build_brachistochrone);
        registry
    }

    /// Register a model. A later registration under the same name wins.
    pub fn register(
        &mut self,
        name: &str,
        options: &'static [&'static str],
        factory: ModelFactory,
    ) {
        self.models
            .insert(name.to_string(), ModelEntry { options, factory });
    }

    pub fn names(&self) -> Vec<&str> {
        self.models.keys().map(String::as_str).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }

    pub fn build(&self, name: &str, options: &ModelOptions) -> AppResult<Box<dyn OdeSystem>> {
        let entry = self
            .models
            .get(name)
            .ok_or_else(|| AppError::UnknownModel {
                name: name.to_string(),
                available: self.names().join(", "),
            })?;
        if let Some(key) = options
            .keys()
            .find(|k| !entry.options.iter().any(|o| *o == k.as_str()))
        {
            return Err(AppError::ModelOption {
                model: name.to_string(),
                option: key.clone(),
                reason: format!("expected one of [{}]", entry.options.join(", ")),
            });
        }
        (entry.factory)(options)
    }
}

fn option(options: &ModelOptions, model: &str, key: &str, default: f64) -> AppResult<f64> {
    let value = options.get(key).copied().unwrap_or(default);
    if !value.is_finite() {
        return Err(AppError::ModelOption {
            model: model.to_string(),
            option: key.to_string(),
            reason: format!("must be finite, got {value}"),
        });
    }
    Ok(value)
}

fn build_constant_rate(options: &ModelOptions) -> AppResult<Box<dyn OdeSystem>> {
    let rate = option(options, "constant_rate", "rate", 1.0)?;
    Ok(Box::new(ConstantRate { rate }))
}

fn build_double_integrator(_options: &ModelOptions) -> AppResult<Box<dyn OdeSystem>> {
    Ok(Box::new(DoubleIntegrator))
}

fn build_min_energy_double_integrator(_options: &ModelOptions) -> AppResult<Box<dyn OdeSystem>> {
    Ok(Box::new(MinEnergyDoubleIntegrator))
}

fn build_decay(options: &ModelOptions) -> AppResult<Box<dyn OdeSystem>> {
    let k = option(options, "decay", "k", 1.0)?;
    Ok(Box::new(Decay { k }))
}

fn build_brachistochrone(options: &ModelOptions) -> AppResult<Box<dyn OdeSystem>> {
    let g = option(options, "brachistochrone", "g", 9.80665)?;
    Ok(Box::new(Brachistochrone { g }))
}

/// `x_dot = rate`.
#[derive(Clone, Debug)]
pub struct ConstantRate {
    pub rate: f64,
}

impl OdeSystem for ConstantRate {
    fn signature(&self) -> OdeSignature {
        OdeSignature {
            inputs: vec![],
            outputs: vec![Port::new("x_dot")],
        }
    }

    fn evaluate(&self, _time: f64, _inputs: &[f64], outputs: &mut [f64]) -> OdeResult<()> {
        outputs[0] = self.rate;
        Ok(())
    }
}

/// `x_dot = v`, `v_dot = u`.
#[derive(Clone, Debug)]
pub struct DoubleIntegrator;

impl OdeSystem for DoubleIntegrator {
    fn signature(&self) -> OdeSignature {
        OdeSignature {
            inputs: vec![Port::new("v"), Port::new("u")],
            outputs: vec![Port::new("x_dot"), Port::new("v_dot")],
        }
    }

    fn evaluate(&self, _time: f64, inputs: &[f64], outputs: &mut [f64]) -> OdeResult<()> {
        outputs[0] = inputs[0];
        outputs[1] = inputs[1];
        Ok(())
    }
}

/// Double integrator with the control effort `J_dot = u^2 / 2`.
#[derive(Clone, Debug)]
pub struct MinEnergyDoubleIntegrator;

impl OdeSystem for MinEnergyDoubleIntegrator {
    fn signature(&self) -> OdeSignature {
        OdeSignature {
            inputs: vec![Port::new("v"), Port::new("u")],
            outputs: vec![Port::new("x_dot"), Port::new("v_dot"), Port::new("J_dot")],
        }
    }

    fn evaluate(&self, _time: f64, inputs: &[f64], outputs: &mut [f64]) -> OdeResult<()> {
        let (v, u) = (inputs[0], inputs[1]);
        outputs[0] = v;
        outputs[1] = u;
        outputs[2] = 0.5 * u * u;
        Ok(())
    }
}

/// `x_dot = -k x`.
#[derive(Clone, Debug)]
pub struct Decay {
    pub k: f64,
}

impl OdeSystem for Decay {
    fn signature(&self) -> OdeSignature {
        OdeSignature {
            inputs: vec![Port::new("x")],
            outputs: vec![Port::new("x_dot")],
        }
    }

    fn evaluate(&self, _time: f64, inputs: &[f64], outputs: &mut [f64]) -> OdeResult<()> {
        outputs[0] = -self.k * inputs[0];
        Ok(())
    }
}

/// Bead sliding on a wire under gravity; `theta` is measured from the downward vertical.
#[derive(Clone, Debug)]
pub struct Brachistochrone {
    pub g: f64,
}

impl OdeSystem for Brachistochrone {
    fn signature(&self) -> OdeSignature {
        OdeSignature {
            inputs: vec![Port::new("v"), Port::new("theta")],
            outputs: vec![
                Port::new("xdot"),
                Port::new("ydot"),
                Port::new("vdot"),
                Port::new("check"),
            ],
        }
    }

    fn evaluate(&self, _time: f64, inputs: &[f64], outputs: &mut [f64]) -> OdeResult<()> {
        let (v, theta) = (inputs[0], inputs[1]);
        let (sin, cos) = theta.sin_cos();
        outputs[0] = v * sin;
        outputs[1] = -v * cos;
        outputs[2] = self.g * cos;
        outputs[3] = if sin.abs() > f64::EPSILON {
            v / sin
        } else {
            0.0
        };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_are_registered() {
        let registry = ModelRegistry::default();
        for name in [
            "constant_rate",
            "double_integrator",
            "min_energy_double_integrator",
            "decay",
            "brachistochrone",
        ] {
            assert!(registry.contains(name), "{name}");
            assert!(registry.build(name, &ModelOptions::new()).is_ok());
        }
    }

    #[test]
    fn options_are_checked() {
        let registry = ModelRegistry::default();
        let mut options = ModelOptions::new();
        options.insert("k".to_string(), 0.5);
        let decay = registry.build("decay", &options).unwrap();
        let mut out = [0.0];
        decay.evaluate(0.0, &[2.0], &mut out).unwrap();
        assert_eq!(out[0], -1.0);

        assert!(matches!(
            registry.build("brachistochrone", &options),
            Err(AppError::ModelOption { .. })
        ));
        options.insert("k".to_string(), f64::NAN);
        assert!(registry.build("decay", &options).is_err());
        assert!(matches!(
            registry.build("rocket", &ModelOptions::new()),
            Err(AppError::UnknownModel { .. })
        ));
    }
}
