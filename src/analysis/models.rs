//! Parametric 1-D models and their additive composition.
//!
//! Each model is a named functional form with a fixed, ordered parameter
//! list. Parameter names and defaults follow the usual astronomy
//! conventions (`Gaussian1D(amplitude, mean, stddev)`, ...).

use std::fmt;
use std::str::FromStr;

use ndarray::{Array1, ArrayView1};
use serde::Serialize;

use crate::error::ModelError;

/// Anything a fitter can optimise: a flat parameter vector and an
/// evaluation over dispersion values.
pub trait Model {
    /// Current parameter values, in declared order.
    fn parameters(&self) -> Vec<f64>;

    /// Replace all parameter values. The length must match.
    fn set_parameters(&mut self, values: &[f64]) -> Result<(), ModelError>;

    /// Evaluate at every x.
    fn eval(&self, x: ArrayView1<'_, f64>) -> Array1<f64>;

    fn n_parameters(&self) -> usize {
        self.parameters().len()
    }
}

// ---------------------------------------------------------------------------
// ModelKind – the catalogue of functional forms
// ---------------------------------------------------------------------------

/// The available functional forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ModelKind {
    Gaussian1D,
    Lorentz1D,
    Const1D,
    Linear1D,
    PowerLaw1D,
}

impl ModelKind {
    pub const ALL: [ModelKind; 5] = [
        ModelKind::Gaussian1D,
        ModelKind::Lorentz1D,
        ModelKind::Const1D,
        ModelKind::Linear1D,
        ModelKind::PowerLaw1D,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ModelKind::Gaussian1D => "Gaussian1D",
            ModelKind::Lorentz1D => "Lorentz1D",
            ModelKind::Const1D => "Const1D",
            ModelKind::Linear1D => "Linear1D",
            ModelKind::PowerLaw1D => "PowerLaw1D",
        }
    }

    /// Parameter names in declared order.
    pub fn param_names(self) -> &'static [&'static str] {
        match self {
            ModelKind::Gaussian1D => &["amplitude", "mean", "stddev"],
            ModelKind::Lorentz1D => &["amplitude", "x_0", "fwhm"],
            ModelKind::Const1D => &["amplitude"],
            ModelKind::Linear1D => &["slope", "intercept"],
            ModelKind::PowerLaw1D => &["amplitude", "x_0", "alpha"],
        }
    }

    pub fn defaults(self) -> &'static [f64] {
        match self {
            ModelKind::Gaussian1D => &[1.0, 0.0, 1.0],
            ModelKind::Lorentz1D => &[1.0, 0.0, 1.0],
            ModelKind::Const1D => &[1.0],
            ModelKind::Linear1D => &[1.0, 0.0],
            ModelKind::PowerLaw1D => &[1.0, 1.0, 1.0],
        }
    }

    fn eval_at(self, p: &[f64], x: f64) -> f64 {
        match self {
            ModelKind::Gaussian1D => {
                let arg = (x - p[1]) / p[2];
                p[0] * (-0.5 * arg * arg).exp()
            }
            ModelKind::Lorentz1D => {
                let hw2 = (p[2] / 2.0).powi(2);
                p[0] * hw2 / ((x - p[1]).powi(2) + hw2)
            }
            ModelKind::Const1D => p[0],
            ModelKind::Linear1D => p[0] * x + p[1],
            ModelKind::PowerLaw1D => p[0] * (x / p[1]).powf(-p[2]),
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModelKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        ModelKind::ALL
            .into_iter()
            .find(|k| k.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ModelError::UnknownModel(wanted.to_string()))
    }
}

/// Names of every model in the catalogue, for selectors.
pub fn all_models() -> Vec<&'static str> {
    ModelKind::ALL.iter().map(|k| k.name()).collect()
}

// ---------------------------------------------------------------------------
// ParametricModel – one functional form with live parameter values
// ---------------------------------------------------------------------------

/// A functional form together with its current parameter values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParametricModel {
    kind: ModelKind,
    values: Vec<f64>,
}

impl ParametricModel {
    /// A model with its default parameter values.
    pub fn new(kind: ModelKind) -> Self {
        Self {
            kind,
            values: kind.defaults().to_vec(),
        }
    }

    /// Look a model up by catalogue name.
    pub fn from_name(name: &str) -> Result<Self, ModelError> {
        Ok(Self::new(name.parse()?))
    }

    pub fn with_values(kind: ModelKind, values: &[f64]) -> Result<Self, ModelError> {
        let mut model = Self::new(kind);
        model.set_parameters(values)?;
        Ok(model)
    }

    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn param_names(&self) -> &'static [&'static str] {
        self.kind.param_names()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    fn index_of(&self, name: &str) -> Result<usize, ModelError> {
        self.param_names()
            .iter()
            .position(|n| *n == name)
            .ok_or_else(|| ModelError::UnknownParameter {
                model: self.name().to_string(),
                name: name.to_string(),
            })
    }

    pub fn get(&self, name: &str) -> Result<f64, ModelError> {
        Ok(self.values[self.index_of(name)?])
    }

    /// Set one named parameter.
    pub fn set(&mut self, name: &str, value: f64) -> Result<(), ModelError> {
        let idx = self.index_of(name)?;
        self.values[idx] = value;
        Ok(())
    }

    pub fn eval_at(&self, x: f64) -> f64 {
        self.kind.eval_at(&self.values, x)
    }
}

impl Model for ParametricModel {
    fn parameters(&self) -> Vec<f64> {
        self.values.clone()
    }

    fn set_parameters(&mut self, values: &[f64]) -> Result<(), ModelError> {
        if values.len() != self.values.len() {
            return Err(ModelError::ShapeMismatch {
                expected: self.values.len(),
                got: values.len(),
            });
        }
        self.values.copy_from_slice(values);
        Ok(())
    }

    fn eval(&self, x: ArrayView1<'_, f64>) -> Array1<f64> {
        x.mapv(|v| self.eval_at(v))
    }

    fn n_parameters(&self) -> usize {
        self.values.len()
    }
}

// ---------------------------------------------------------------------------
// CompoundModel – sum of several parametric models
// ---------------------------------------------------------------------------

/// The additive composition of several models. Its parameter vector is the
/// concatenation of the components' vectors, so a fitter optimises all of
/// them jointly.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompoundModel {
    components: Vec<ParametricModel>,
}

impl CompoundModel {
    pub fn new(components: Vec<ParametricModel>) -> Self {
        Self { components }
    }

    pub fn components(&self) -> &[ParametricModel] {
        &self.components
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// `"Gaussian1D + Const1D"`.
    pub fn describe(&self) -> String {
        self.components
            .iter()
            .map(|c| c.name())
            .collect::<Vec<_>>()
            .join(" + ")
    }
}

impl Model for CompoundModel {
    fn parameters(&self) -> Vec<f64> {
        self.components
            .iter()
            .flat_map(|c| c.values().iter().copied())
            .collect()
    }

    fn set_parameters(&mut self, values: &[f64]) -> Result<(), ModelError> {
        let expected = self.n_parameters();
        if values.len() != expected {
            return Err(ModelError::ShapeMismatch {
                expected,
                got: values.len(),
            });
        }
        let mut offset = 0;
        for component in &mut self.components {
            let n = component.n_parameters();
            component.set_parameters(&values[offset..offset + n])?;
            offset += n;
        }
        Ok(())
    }

    fn eval(&self, x: ArrayView1<'_, f64>) -> Array1<f64> {
        let mut total = Array1::zeros(x.len());
        for component in &self.components {
            total += &component.eval(x);
        }
        total
    }

    fn n_parameters(&self) -> usize {
        self.components.iter().map(|c| c.n_parameters()).sum()
    }
}
