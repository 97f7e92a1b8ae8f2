/// Analysis layer: measurements and model fitting on [`SpectrumData`].
///
/// ```text
///   SpectrumData ──extract──▶ region ──stats──▶ Stats
///                                                 │
///   continuum 1 ─┐                                ▼
///   continuum 2 ─┼────────────────────────▶ eq_width ──▶ flux, EW
///   line region ─┘
///
///   Layer data + CompoundModel ──Fitter──▶ fitted parameters
/// ```
///
/// [`SpectrumData`]: crate::data::model::SpectrumData

pub mod fitting;
pub mod models;
pub mod statistics;
