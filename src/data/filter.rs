use serde::{Deserialize, Serialize};

use super::model::SpectrumData;

// ---------------------------------------------------------------------------
// Mask: which samples are hidden from a layer
// ---------------------------------------------------------------------------

/// One flag per sample. `true` means the sample is masked out.
pub type Mask = Vec<bool>;

/// A mask that hides nothing.
pub fn empty_mask(len: usize) -> Mask {
    vec![false; len]
}

/// Indices of the samples that survive the mask.
pub fn unmasked_indices(mask: &[bool]) -> Vec<usize> {
    mask.iter()
        .enumerate()
        .filter(|(_, &masked)| !masked)
        .map(|(i, _)| i)
        .collect()
}

// ---------------------------------------------------------------------------
// Roi: a rectangle drawn on the plot, in data coordinates
// ---------------------------------------------------------------------------

/// Rectangular region of interest. Bounds are inclusive on both axes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Roi {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl Roi {
    /// Build from two corners in any order.
    pub fn new(xa: f64, ya: f64, xb: f64, yb: f64) -> Self {
        Self {
            x1: xa.min(xb),
            y1: ya.min(yb),
            x2: xa.max(xb),
            y2: ya.max(yb),
        }
    }

    /// A band spanning all flux values between two dispersion values.
    pub fn x_band(lo: f64, hi: f64) -> Self {
        Self::new(lo, f64::NEG_INFINITY, hi, f64::INFINITY)
    }

    /// The dispersion interval `(x1, x2)` covered by this ROI.
    pub fn x_range(&self) -> (f64, f64) {
        (self.x1, self.x2)
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x1 && x <= self.x2 && y >= self.y1 && y <= self.y2
    }
}

/// Build a mask hiding every sample that lies outside all ROIs.
///
/// With no ROI at all nothing is hidden.
pub fn roi_mask(spectrum: &SpectrumData, rois: &[Roi]) -> Mask {
    if rois.is_empty() {
        return empty_mask(spectrum.len());
    }
    spectrum
        .x()
        .iter()
        .zip(spectrum.y())
        .map(|(&x, &y)| !rois.iter().any(|roi| roi.contains(x, y)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SpectrumData {
        SpectrumData::from_vecs(
            vec![0.0, 1.0, 2.0, 3.0, 4.0],
            "",
            vec![1.0, 1.0, 5.0, 1.0, 1.0],
            "",
        )
        .unwrap()
    }

    #[test]
    fn no_rois_masks_nothing() {
        assert_eq!(roi_mask(&sample(), &[]), vec![false; 5]);
    }

    #[test]
    fn rois_keep_points_inside_any_rectangle() {
        let rois = [Roi::new(0.5, 0.0, 1.5, 2.0), Roi::new(2.5, 0.0, 3.0, 2.0)];
        let mask = roi_mask(&sample(), &rois);
        assert_eq!(mask, vec![true, false, true, false, true]);
        assert_eq!(unmasked_indices(&mask), vec![1, 3]);
    }

    #[test]
    fn roi_flux_bounds_apply() {
        // point at x=2 has flux 5 and falls above the rectangle
        let mask = roi_mask(&sample(), &[Roi::new(1.0, 0.0, 3.0, 2.0)]);
        assert_eq!(unmasked_indices(&mask), vec![1, 3]);
    }

    #[test]
    fn corners_are_normalised() {
        let roi = Roi::new(3.0, 2.0, 1.0, 0.0);
        assert_eq!(roi.x_range(), (1.0, 3.0));
        assert!(roi.contains(1.0, 0.0));
    }
}
