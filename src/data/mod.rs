/// Data layer: core types, loading, and masking.
///
/// Architecture:
/// ```text
///  path  or  path[ext,DISP,FLUX]
///        │
///        ▼
///   ┌──────────┐
///   │  source   │  bracket notation → path + ext + column names
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  .parquet / .json / .csv → SpectrumData
///   └──────────┘
///        │
///        ▼
///   ┌──────────────┐
///   │ SpectrumData  │  dispersion + flux, each with a unit
///   └──────────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  filter   │  ROIs → boolean mask → layer indices
///   └──────────┘
/// ```

pub mod filter;
pub mod loader;
pub mod model;
pub mod source;
