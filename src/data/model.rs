use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SpectrumError;

// ---------------------------------------------------------------------------
// Unit – physical unit label carried by an axis
// ---------------------------------------------------------------------------

/// A free-form physical unit label (`"Angstrom"`, `"erg/s/cm2/A"`, ...).
/// A blank label means dimensionless.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Unit(String);

impl Unit {
    pub fn new(label: impl Into<String>) -> Self {
        Unit(label.into().trim().to_string())
    }

    pub fn dimensionless() -> Self {
        Unit(String::new())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_dimensionless(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_dimensionless() {
            write!(f, "<dimensionless>")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl From<&str> for Unit {
    fn from(s: &str) -> Self {
        Unit::new(s)
    }
}

impl From<String> for Unit {
    fn from(s: String) -> Self {
        Unit::new(s)
    }
}

impl From<Unit> for String {
    fn from(unit: Unit) -> Self {
        unit.0
    }
}

// ---------------------------------------------------------------------------
// SpectrumAxis – one array plus its unit
// ---------------------------------------------------------------------------

/// One axis of a spectrum: the sample values and their unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectrumAxis {
    pub values: Vec<f64>,
    pub unit: Unit,
}

impl SpectrumAxis {
    pub fn new(values: Vec<f64>, unit: Unit) -> Self {
        Self { values, unit }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

// ---------------------------------------------------------------------------
// SpectrumData – a single loaded or derived spectrum
// ---------------------------------------------------------------------------

/// A spectrum: dispersion axis (`x`) and flux axis (`y`) of equal length.
///
/// Never mutated after construction. Extraction, masking and model
/// evaluation all build a fresh instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectrumData {
    x: SpectrumAxis,
    y: SpectrumAxis,
}

impl SpectrumData {
    /// Build a spectrum, rejecting axes of different lengths.
    pub fn new(x: SpectrumAxis, y: SpectrumAxis) -> Result<Self, SpectrumError> {
        if x.len() != y.len() {
            return Err(SpectrumError::LengthMismatch {
                x: x.len(),
                y: y.len(),
            });
        }
        Ok(Self { x, y })
    }

    /// Convenience constructor from raw vectors and unit labels.
    pub fn from_vecs(
        x: Vec<f64>,
        x_unit: impl Into<Unit>,
        y: Vec<f64>,
        y_unit: impl Into<Unit>,
    ) -> Result<Self, SpectrumError> {
        Self::new(
            SpectrumAxis::new(x, x_unit.into()),
            SpectrumAxis::new(y, y_unit.into()),
        )
    }

    /// Same dispersion axis, new flux values in the given unit.
    pub fn with_flux(&self, y: Vec<f64>, unit: Unit) -> Result<Self, SpectrumError> {
        Self::new(self.x.clone(), SpectrumAxis::new(y, unit))
    }

    /// Keep the samples at the given indices, in order.
    pub fn select(&self, indices: &[usize]) -> Self {
        let pick = |axis: &SpectrumAxis| {
            SpectrumAxis::new(
                indices.iter().map(|&i| axis.values[i]).collect(),
                axis.unit.clone(),
            )
        };
        Self {
            x: pick(&self.x),
            y: pick(&self.y),
        }
    }

    pub fn x(&self) -> &[f64] {
        &self.x.values
    }

    pub fn y(&self) -> &[f64] {
        &self.y.values
    }

    pub fn x_unit(&self) -> &Unit {
        &self.x.unit
    }

    pub fn y_unit(&self) -> &Unit {
        &self.y.unit
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.x.len()
    }

    /// Whether the spectrum has no samples.
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// `(min, max)` of the dispersion axis, `None` when empty.
    pub fn x_range(&self) -> Option<(f64, f64)> {
        if self.is_empty() {
            return None;
        }
        let min = self.x().iter().cloned().fold(f64::INFINITY, f64::min);
        let max = self.x().iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        Some((min, max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_mismatched_axes() {
        let err = SpectrumData::from_vecs(vec![1.0, 2.0], "A", vec![1.0], "Jy").unwrap_err();
        assert_eq!(err, SpectrumError::LengthMismatch { x: 2, y: 1 });
    }

    #[test]
    fn select_keeps_units_and_order() {
        let sp = SpectrumData::from_vecs(
            vec![10.0, 11.0, 12.0, 13.0],
            "Angstrom",
            vec![1.0, 2.0, 3.0, 4.0],
            "Jy",
        )
        .unwrap();
        let sub = sp.select(&[3, 1]);
        assert_eq!(sub.x(), &[13.0, 11.0]);
        assert_eq!(sub.y(), &[4.0, 2.0]);
        assert_eq!(sub.x_unit().as_str(), "Angstrom");
        assert_eq!(sub.y_unit().as_str(), "Jy");
    }

    #[test]
    fn blank_unit_is_dimensionless() {
        assert!(Unit::new("  ").is_dimensionless());
        assert_eq!(Unit::new(" nm ").as_str(), "nm");
    }

    #[test]
    fn deserialized_units_are_trimmed() {
        let unit: Unit = serde_json::from_str(r#"" ""#).unwrap();
        assert!(unit.is_dimensionless());

        let unit: Unit = serde_json::from_str(r#""  Jy ""#).unwrap();
        assert_eq!(unit.as_str(), "Jy");
        assert_eq!(serde_json::to_string(&unit).unwrap(), r#""Jy""#);
    }

    #[test]
    fn x_range_of_empty_is_none() {
        let sp = SpectrumData::from_vecs(vec![], "", vec![], "").unwrap();
        assert!(sp.x_range().is_none());
        assert!(sp.is_empty());
    }
}
