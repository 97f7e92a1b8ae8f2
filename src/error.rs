use thiserror::Error;

use crate::tree::ItemId;

// ---------------------------------------------------------------------------
// Per-layer error types
// ---------------------------------------------------------------------------

/// Construction errors for [`crate::data::model::SpectrumData`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SpectrumError {
    #[error("dispersion has {x} values but flux has {y}")]
    LengthMismatch { x: usize, y: usize },
}

/// Errors raised while parsing a `path[ext,DISPERSION,FLUX]` source string.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SourceError {
    #[error("empty file path")]
    EmptyPath,
    #[error("missing closing ']' in '{0}'")]
    Unterminated(String),
    #[error("expected 'ext,DISPERSION,FLUX' inside brackets, got '{0}'")]
    BadFieldCount(String),
    #[error("extension '{0}' is not a non-negative integer")]
    BadExtension(String),
    #[error("empty column name in '{0}'")]
    EmptyColumn(String),
}

/// Degenerate-input errors from the measurement pipeline.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisError {
    #[error("region contains no points")]
    EmptyRegion,
    #[error("line region needs at least {needed} points, got {got}")]
    TooFewPoints { needed: usize, got: usize },
}

/// Errors from the parametric model catalogue.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("unknown model '{0}'")]
    UnknownModel(String),
    #[error("model '{model}' has no parameter '{name}'")]
    UnknownParameter { model: String, name: String },
    #[error("expected {expected} parameter values, got {got}")]
    ShapeMismatch { expected: usize, got: usize },
}

/// Fit failures. Kept distinct from success so callers can keep prior values.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FitError {
    #[error("unknown fitter '{0}'")]
    UnknownFitter(String),
    #[error("need at least {needed} samples to fit {needed} parameters, got {got}")]
    TooFewPoints { needed: usize, got: usize },
    #[error("x has {x} samples but y has {y}")]
    LengthMismatch { x: usize, y: usize },
    #[error("model produced non-finite residuals")]
    NonFinite,
    #[error("fit did not converge after {iterations} iterations (sum of squares {ssr:.6e})")]
    NotConverged { iterations: usize, ssr: f64 },
    #[error("fitter error: {0}")]
    Solver(String),
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Document-tree errors. A returned error always means nothing was mutated.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TreeError {
    #[error("no item with id {0}")]
    NotFound(ItemId),
    #[error("item {id} is a {found} item, expected {expected}")]
    WrongKind {
        id: ItemId,
        expected: &'static str,
        found: &'static str,
    },
    #[error("mask has {mask} entries but the data has {data}")]
    MaskLength { mask: usize, data: usize },
    #[error(transparent)]
    Spectrum(#[from] SpectrumError),
    #[error(transparent)]
    Model(#[from] ModelError),
}

// ---------------------------------------------------------------------------
// Umbrella error
// ---------------------------------------------------------------------------

/// Any error the library can produce.
#[derive(Debug, Error)]
pub enum SpecviewError {
    #[error(transparent)]
    Spectrum(#[from] SpectrumError),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Fit(#[from] FitError),
    #[error(transparent)]
    Tree(#[from] TreeError),
    #[error("no active layer selected")]
    NoActiveLayer,
    #[error("need {needed} regions of interest, have {got}")]
    MissingRois { needed: usize, got: usize },
    #[error("layer {0} has no models attached")]
    NoModels(ItemId),
}

pub type Result<T> = std::result::Result<T, SpecviewError>;
