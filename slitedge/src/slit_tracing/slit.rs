//! Fitted edges and the slits they bound.

use serde::{Deserialize, Serialize};

use super::edge_map::Side;
use crate::math::Curve;

/// Robust fit of one edge group. Per-row arrays are indexed by detector row;
/// rows without a detection have weight 0 and a NaN residual.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeFit {
    pub side: Side,
    pub id: u32,
    pub curve: Curve,
    /// Detected minus fitted spatial position.
    pub residuals: Vec<f64>,
    /// 1 for rows used by the final fit, 0 otherwise.
    pub weights: Vec<f64>,
    /// Detections dropped by outlier rejection.
    pub rejected: usize,
}

impl EdgeFit {
    /// Fraction of rows contributing to the fit.
    pub fn coverage(&self) -> f64 {
        if self.weights.is_empty() {
            return 0.0;
        }
        let used = self.weights.iter().filter(|&&w| w > 0.0).count();
        used as f64 / self.weights.len() as f64
    }
}

/// One slit: a left and a right edge curve in physical coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slit {
    pub left: Curve,
    pub right: Curve,
    /// At least one edge was rebuilt rather than traced.
    pub extrapolated: bool,
}

impl Slit {
    pub fn new(left: Curve, right: Curve, extrapolated: bool) -> Self {
        Self {
            left,
            right,
            extrapolated,
        }
    }

    pub fn center(&self, spectral: f64) -> f64 {
        0.5 * (self.left.eval(spectral) + self.right.eval(spectral))
    }

    pub fn width(&self, spectral: f64) -> f64 {
        self.right.eval(spectral) - self.left.eval(spectral)
    }

    pub fn edge(&self, side: Side) -> &Curve {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }
}

/// Slits ordered by center position at the reference row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlitSet {
    slits: Vec<Slit>,
    /// Spectral coordinate of every detector row.
    spectral_axis: Vec<f64>,
    ref_row: usize,
}

impl SlitSet {
    pub fn new(mut slits: Vec<Slit>, spectral_axis: Vec<f64>, ref_row: usize) -> Self {
        debug_assert!(ref_row < spectral_axis.len());
        let at = spectral_axis[ref_row];
        slits.sort_by(|a, b| a.center(at).total_cmp(&b.center(at)));
        Self {
            slits,
            spectral_axis,
            ref_row,
        }
    }

    pub fn len(&self) -> usize {
        self.slits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slits.is_empty()
    }

    pub fn slits(&self) -> &[Slit] {
        &self.slits
    }

    pub fn get(&self, index: usize) -> Option<&Slit> {
        self.slits.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Slit> {
        self.slits.iter()
    }

    pub fn into_slits(self) -> Vec<Slit> {
        self.slits
    }

    pub fn spectral_axis(&self) -> &[f64] {
        &self.spectral_axis
    }

    pub fn ref_row(&self) -> usize {
        self.ref_row
    }

    pub fn ref_spectral(&self) -> f64 {
        self.spectral_axis[self.ref_row]
    }

    /// Left edge of slit `index` sampled at every row.
    pub fn left_edge(&self, index: usize) -> Vec<f64> {
        self.slits[index].left.eval_many(&self.spectral_axis)
    }

    /// Right edge of slit `index` sampled at every row.
    pub fn right_edge(&self, index: usize) -> Vec<f64> {
        self.slits[index].right.eval_many(&self.spectral_axis)
    }

    /// Slit width sampled at every row.
    pub fn widths(&self, index: usize) -> Vec<f64> {
        let slit = &self.slits[index];
        self.spectral_axis.iter().map(|&s| slit.width(s)).collect()
    }

    /// Per-slit flag: an edge was rebuilt by extrapolation.
    pub fn extrapolated_mask(&self) -> Vec<bool> {
        self.slits.iter().map(|s| s.extrapolated).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::FunctionFamily;

    fn vertical(left: f64, right: f64) -> Slit {
        let domain = (0.0, 9.0);
        Slit::new(
            Curve::constant(FunctionFamily::Legendre, left, domain, 2),
            Curve::constant(FunctionFamily::Legendre, right, domain, 2),
            false,
        )
    }

    #[test]
    fn test_slit_set_sorted_by_center() {
        let axis: Vec<f64> = (0..10).map(|y| y as f64).collect();
        let set = SlitSet::new(vec![vertical(50.0, 70.0), vertical(10.0, 30.0)], axis, 5);
        assert_eq!(set.len(), 2);
        assert_eq!(set.left_edge(0)[0], 10.0);
        assert_eq!(set.right_edge(1)[9], 70.0);
        assert!(set.widths(0).iter().all(|&w| (w - 20.0).abs() < 1e-12));
        assert_eq!(set.extrapolated_mask(), vec![false, false]);
    }

    #[test]
    fn test_edge_fit_coverage() {
        let fit = EdgeFit {
            side: Side::Left,
            id: 1,
            curve: Curve::constant(FunctionFamily::Legendre, 3.0, (0.0, 3.0), 0),
            residuals: vec![0.0, f64::NAN, 0.1, f64::NAN],
            weights: vec![1.0, 0.0, 1.0, 0.0],
            rejected: 0,
        };
        assert_eq!(fit.coverage(), 0.5);
    }
}
