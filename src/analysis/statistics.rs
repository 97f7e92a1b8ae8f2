use serde::Serialize;

use crate::data::model::SpectrumData;
use crate::error::AnalysisError;

// ---------------------------------------------------------------------------
// Region – half-open dispersion interval
// ---------------------------------------------------------------------------

/// A half-open interval `[lo, hi)` on the dispersion axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Region {
    pub lo: f64,
    pub hi: f64,
}

impl Region {
    pub fn new(lo: f64, hi: f64) -> Self {
        Self { lo, hi }
    }

    pub fn contains(&self, x: f64) -> bool {
        x >= self.lo && x < self.hi
    }
}

impl From<(f64, f64)> for Region {
    fn from((lo, hi): (f64, f64)) -> Self {
        Self::new(lo, hi)
    }
}

/// Extract the samples with `lo <= x < hi`. Units are preserved; an empty
/// result is a valid (zero-length) spectrum.
pub fn extract(spectrum: &SpectrumData, region: Region) -> SpectrumData {
    let indices: Vec<usize> = spectrum
        .x()
        .iter()
        .enumerate()
        .filter(|(_, &x)| region.contains(x))
        .map(|(i, _)| i)
        .collect();
    spectrum.select(&indices)
}

// ---------------------------------------------------------------------------
// Stats – descriptive statistics over a flux array
// ---------------------------------------------------------------------------

/// Descriptive statistics of one region's flux values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Stats {
    pub mean: f64,
    pub median: f64,
    /// Population standard deviation.
    pub stddev: f64,
    /// Trapezoidal integral with unit sample spacing. The dispersion axis
    /// is not used; see [`dispersion_integral`] for that.
    pub total: f64,
    pub npoints: usize,
}

/// Compute [`Stats`] over the flux of `spectrum`.
///
/// Fails with [`AnalysisError::EmptyRegion`] when there are no samples.
pub fn stats(spectrum: &SpectrumData) -> Result<Stats, AnalysisError> {
    let flux = spectrum.y();
    if flux.is_empty() {
        return Err(AnalysisError::EmptyRegion);
    }
    let n = flux.len() as f64;
    let mean = flux.iter().sum::<f64>() / n;
    let variance = flux.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;

    Ok(Stats {
        mean,
        median: median(flux),
        stddev: variance.sqrt(),
        total: flux.windows(2).map(|w| (w[0] + w[1]) / 2.0).sum(),
        npoints: flux.len(),
    })
}

/// Trapezoidal integral of flux over the actual dispersion values.
pub fn dispersion_integral(spectrum: &SpectrumData) -> f64 {
    spectrum
        .x()
        .windows(2)
        .zip(spectrum.y().windows(2))
        .map(|(x, y)| (x[1] - x[0]) * (y[0] + y[1]) / 2.0)
        .sum()
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

// ---------------------------------------------------------------------------
// Equivalent width
// ---------------------------------------------------------------------------

/// Integrated line flux and equivalent width of one line region.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LineMeasurement {
    pub flux: f64,
    pub equivalent_width: f64,
}

/// Flux and equivalent width of `line` against a constant continuum, the
/// average of the two continuum means.
///
/// `EW = Σ (Fc - Fl) / Fc * dλ`, with `dλ` the mean sample spacing in the
/// line region. A zero continuum is not guarded: the equivalent width comes
/// out infinite or NaN.
pub fn eq_width(
    cont1: &Stats,
    cont2: &Stats,
    line: &SpectrumData,
) -> Result<LineMeasurement, AnalysisError> {
    if line.len() < 2 {
        return Err(AnalysisError::TooFewPoints {
            needed: 2,
            got: line.len(),
        });
    }
    let avg_cont = (cont1.mean + cont2.mean) / 2.0;

    let x = line.x();
    let avg_dx = (x[x.len() - 1] - x[0]) / (x.len() - 1) as f64;

    let flux = line.y().iter().map(|y| y - avg_cont).sum::<f64>() * avg_dx;
    let equivalent_width = line
        .y()
        .iter()
        .map(|y| (avg_cont - y) / avg_cont * avg_dx)
        .sum();

    Ok(LineMeasurement {
        flux,
        equivalent_width,
    })
}

/// The line region lying between two continuum regions, whichever side
/// each continuum is on.
pub fn feature_bounds(a: Region, b: Region) -> Region {
    if a.hi < b.lo {
        Region::new(a.hi, b.lo)
    } else {
        Region::new(b.hi, a.lo)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    fn sample() -> SpectrumData {
        SpectrumData::from_vecs(
            vec![0.0, 1.0, 2.0, 3.0, 4.0],
            "Angstrom",
            vec![1.0, 1.0, 5.0, 1.0, 1.0],
            "Jy",
        )
        .unwrap()
    }

    fn flat(x: Vec<f64>, level: f64) -> SpectrumData {
        let y = vec![level; x.len()];
        SpectrumData::from_vecs(x, "", y, "").unwrap()
    }

    #[test]
    fn extract_is_half_open() {
        let region = extract(&sample(), Region::new(1.0, 4.0));
        assert_eq!(region.x(), &[1.0, 2.0, 3.0]);
        assert_eq!(region.y(), &[1.0, 5.0, 1.0]);
        assert_eq!(region.x_unit().as_str(), "Angstrom");
        assert_eq!(region.y_unit().as_str(), "Jy");
    }

    #[test]
    fn extract_outside_data_is_empty() {
        let region = extract(&sample(), Region::new(10.0, 20.0));
        assert!(region.is_empty());
        assert_eq!(stats(&region), Err(AnalysisError::EmptyRegion));
    }

    #[test]
    fn stats_of_worked_example() {
        let region = extract(&sample(), Region::new(1.0, 4.0));
        let st = stats(&region).unwrap();
        assert_abs_diff_eq!(st.mean, 7.0 / 3.0, epsilon = 1e-12);
        assert_eq!(st.median, 1.0);
        assert_eq!(st.npoints, 3);
        assert_eq!(st.npoints, region.len());
        // unit spacing: (1+5)/2 + (5+1)/2
        assert_abs_diff_eq!(st.total, 6.0);
        assert_abs_diff_eq!(st.stddev, (32.0f64 / 9.0).sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn full_range_extract_reproduces_stats() {
        let sp = sample();
        let full = extract(&sp, Region::new(0.0, 5.0));
        assert_eq!(stats(&full).unwrap(), stats(&sp).unwrap());
    }

    #[test]
    fn median_of_even_count_averages_middle() {
        let sp = SpectrumData::from_vecs(vec![0.0, 1.0, 2.0, 3.0], "", vec![4.0, 1.0, 3.0, 2.0], "")
            .unwrap();
        assert_eq!(stats(&sp).unwrap().median, 2.5);
    }

    #[test]
    fn dispersion_integral_uses_spacing() {
        let sp = SpectrumData::from_vecs(vec![0.0, 2.0, 4.0], "", vec![1.0, 1.0, 1.0], "").unwrap();
        assert_abs_diff_eq!(dispersion_integral(&sp), 4.0);
        assert_abs_diff_eq!(stats(&sp).unwrap().total, 2.0);
    }

    #[test]
    fn eq_width_worked_example() {
        let cont = stats(&flat(vec![10.0, 11.0, 12.0], 10.0)).unwrap();
        let line = flat(vec![0.0, 1.0, 2.0], 8.0);
        let m = eq_width(&cont, &cont, &line).unwrap();
        assert_abs_diff_eq!(m.flux, -6.0, epsilon = 1e-12);
        assert_abs_diff_eq!(m.equivalent_width, 0.6, epsilon = 1e-12);
    }

    #[test]
    fn flat_line_has_zero_width() {
        let cont = stats(&flat(vec![0.0, 1.0], 3.5)).unwrap();
        let line = flat(vec![5.0, 5.5, 6.0, 6.5], 3.5);
        let m = eq_width(&cont, &cont, &line).unwrap();
        assert_abs_diff_eq!(m.flux, 0.0);
        assert_abs_diff_eq!(m.equivalent_width, 0.0);
    }

    #[test]
    fn single_point_line_is_rejected() {
        let cont = stats(&flat(vec![0.0], 1.0)).unwrap();
        let err = eq_width(&cont, &cont, &flat(vec![3.0], 0.5)).unwrap_err();
        assert_eq!(err, AnalysisError::TooFewPoints { needed: 2, got: 1 });
    }

    #[test]
    fn zero_continuum_is_not_finite() {
        let cont = stats(&flat(vec![0.0], 0.0)).unwrap();
        let m = eq_width(&cont, &cont, &flat(vec![0.0, 1.0], 1.0)).unwrap();
        assert!(!m.equivalent_width.is_finite());
    }

    #[test]
    fn feature_bounds_either_order() {
        let blue = Region::new(0.0, 2.0);
        let red = Region::new(5.0, 7.0);
        assert_eq!(feature_bounds(blue, red), Region::new(2.0, 5.0));
        assert_eq!(feature_bounds(red, blue), Region::new(2.0, 5.0));
    }
}
