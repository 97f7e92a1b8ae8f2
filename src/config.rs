use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::analysis::fitting::{FitOptions, Fitter};
use crate::data::loader::ReadOptions;

// ---------------------------------------------------------------------------
// Analysis configuration
// ---------------------------------------------------------------------------

/// Settings for a session. Every field has a default, so a config file
/// only needs the keys it changes:
///
/// ```json
/// {
///   "read": { "dispersion": "WAVELENGTH", "flux": "FLUX", "dispersion_unit": "Angstrom" },
///   "fit": { "max_iterations": 500 },
///   "fitter": "Simplex"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Columns and units used when a path carries no bracket notation.
    pub read: ReadOptions,
    pub fit: FitOptions,
    /// Fitter name, as accepted by [`Fitter::from_str`](std::str::FromStr).
    pub fitter: String,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            read: ReadOptions::default(),
            fit: FitOptions::default(),
            fitter: Fitter::default().name().to_string(),
        }
    }
}

impl AnalysisConfig {
    /// Read a JSON config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Self = serde_json::from_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config.fitter()?;
        Ok(config)
    }

    /// The configured fitter.
    pub fn fitter(&self) -> Result<Fitter> {
        Ok(self.fitter.parse()?)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "read": {{ "flux": "FLUX", "flux_unit": "Jy" }}, "fit": {{ "max_iterations": 50 }} }}"#
        )
        .unwrap();

        let config = AnalysisConfig::from_file(file.path()).unwrap();
        assert_eq!(config.read.flux, "FLUX");
        assert_eq!(config.read.flux_unit.as_str(), "Jy");
        assert_eq!(config.read.dispersion, "x");
        assert_eq!(config.fit.max_iterations, 50);
        assert_eq!(config.fit.ftol, FitOptions::default().ftol);
        assert_eq!(config.fitter().unwrap(), Fitter::LevenbergMarquardt);
    }

    #[test]
    fn unknown_fitter_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "fitter": "Powell" }}"#).unwrap();
        assert!(AnalysisConfig::from_file(file.path()).is_err());
    }
}
