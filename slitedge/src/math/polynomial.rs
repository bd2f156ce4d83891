//! 1D basis-function curves and (robust) weighted least squares.
//!
//! All families are evaluated on the abscissa mapped from `domain` onto
//! `[-1, 1]`, which keeps the normal equations well conditioned for the
//! ~4k-row detectors this is used on.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// Basis family used for edge curves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FunctionFamily {
    #[default]
    Legendre,
    Chebyshev,
    Polynomial,
}

impl FunctionFamily {
    /// Fill `out` with the first `out.len()` basis functions at normalized `t`.
    pub fn basis(self, t: f64, out: &mut [f64]) {
        let n = out.len();
        if n == 0 {
            return;
        }
        out[0] = 1.0;
        if n == 1 {
            return;
        }
        out[1] = t;
        for k in 2..n {
            out[k] = match self {
                Self::Legendre => {
                    let kf = k as f64;
                    ((2.0 * kf - 1.0) * t * out[k - 1] - (kf - 1.0) * out[k - 2]) / kf
                }
                Self::Chebyshev => 2.0 * t * out[k - 1] - out[k - 2],
                Self::Polynomial => t * out[k - 1],
            };
        }
    }
}

/// A fitted curve `y = Σ c_k B_k(t(x))`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Curve {
    pub family: FunctionFamily,
    pub coeffs: Vec<f64>,
    /// Abscissa range mapped onto `[-1, 1]`.
    pub domain: (f64, f64),
}

impl Curve {
    pub fn new(family: FunctionFamily, coeffs: Vec<f64>, domain: (f64, f64)) -> Self {
        Self {
            family,
            coeffs,
            domain,
        }
    }

    /// A constant curve, used for user-supplied vertical edges.
    pub fn constant(family: FunctionFamily, value: f64, domain: (f64, f64), order: usize) -> Self {
        let mut coeffs = vec![0.0; order + 1];
        coeffs[0] = value;
        Self::new(family, coeffs, domain)
    }

    #[inline]
    pub fn order(&self) -> usize {
        self.coeffs.len().saturating_sub(1)
    }

    #[inline]
    pub fn normalize(&self, x: f64) -> f64 {
        normalize(x, self.domain)
    }

    pub fn eval(&self, x: f64) -> f64 {
        let t = self.normalize(x);
        let mut basis = smallvec::SmallVec::<[f64; 8]>::from_elem(0.0, self.coeffs.len());
        self.family.basis(t, &mut basis);
        basis.iter().zip(&self.coeffs).map(|(b, c)| b * c).sum()
    }

    pub fn eval_many(&self, xs: &[f64]) -> Vec<f64> {
        xs.iter().map(|&x| self.eval(x)).collect()
    }

    /// Coefficients padded/truncated to `len`, for stacking curves of mixed order.
    pub fn coeffs_padded(&self, len: usize) -> Vec<f64> {
        let mut c = self.coeffs.clone();
        c.resize(len, 0.0);
        c
    }
}

#[inline]
pub(crate) fn normalize(x: f64, (lo, hi): (f64, f64)) -> f64 {
    let span = hi - lo;
    if span.abs() < f64::EPSILON {
        0.0
    } else {
        2.0 * (x - lo) / span - 1.0
    }
}

/// Weighted least-squares fit of `order` (capped at `n_points - 1`).
///
/// Points with non-positive weight are ignored. Returns `None` when no point
/// carries weight or the SVD solve fails.
pub fn fit_weighted(
    family: FunctionFamily,
    domain: (f64, f64),
    xs: &[f64],
    ys: &[f64],
    weights: &[f64],
    order: usize,
) -> Option<Curve> {
    debug_assert_eq!(xs.len(), ys.len());
    debug_assert_eq!(xs.len(), weights.len());

    let used: Vec<usize> = (0..xs.len())
        .filter(|&i| weights[i] > 0.0 && xs[i].is_finite() && ys[i].is_finite())
        .collect();
    if used.is_empty() {
        return None;
    }
    let ncoeff = order.min(used.len() - 1) + 1;

    let mut a = DMatrix::<f64>::zeros(used.len(), ncoeff);
    let mut b = DVector::<f64>::zeros(used.len());
    let mut basis = vec![0.0; ncoeff];
    for (row, &i) in used.iter().enumerate() {
        let sw = weights[i].sqrt();
        family.basis(normalize(xs[i], domain), &mut basis);
        for (k, &v) in basis.iter().enumerate() {
            a[(row, k)] = v * sw;
        }
        b[row] = ys[i] * sw;
    }

    let svd = a.svd(true, true);
    let solution = svd.solve(&b, 1e-12).ok()?;

    let mut coeffs: Vec<f64> = solution.iter().copied().collect();
    coeffs.resize(order + 1, 0.0);
    Some(Curve::new(family, coeffs, domain))
}

/// Rejection settings for [`robust_fit`].
#[derive(Debug, Clone, Copy)]
pub struct RejectParams {
    pub max_iterations: usize,
    /// Rejection threshold in robust sigmas.
    pub sigma: f64,
    /// Residuals below this are never rejected (noise-free data has sigma 0).
    pub floor: f64,
    /// Minimum number of surviving points.
    pub min_points: usize,
}

/// Result of [`robust_fit`]; `weights`/`residuals` align with the input points.
#[derive(Debug, Clone)]
pub struct RobustFit {
    pub curve: Curve,
    pub weights: Vec<f64>,
    pub residuals: Vec<f64>,
    /// Valid points excluded from the final fit.
    pub rejected: usize,
}

/// Iteratively reweighted fit: points beyond the robust threshold get weight
/// zero and the fit is redone until nothing changes or `max_iterations`.
///
/// Returns the number of surviving points on failure.
pub fn robust_fit(
    family: FunctionFamily,
    domain: (f64, f64),
    xs: &[f64],
    ys: &[f64],
    order: usize,
    params: RejectParams,
) -> Result<RobustFit, usize> {
    let valid: Vec<bool> = xs
        .iter()
        .zip(ys)
        .map(|(x, y)| x.is_finite() && y.is_finite())
        .collect();
    let mut weights: Vec<f64> = valid.iter().map(|&v| if v { 1.0 } else { 0.0 }).collect();
    let mut kept = weights.iter().filter(|&&w| w > 0.0).count();
    if kept < params.min_points {
        return Err(kept);
    }

    let mut residuals = vec![0.0; xs.len()];
    let mut curve = fit_weighted(family, domain, xs, ys, &weights, order).ok_or(kept)?;

    for _ in 0..params.max_iterations {
        for i in 0..xs.len() {
            residuals[i] = ys[i] - curve.eval(xs[i]);
        }
        let kept_residuals: Vec<f64> = (0..xs.len())
            .filter(|&i| weights[i] > 0.0)
            .map(|i| residuals[i])
            .collect();
        let threshold = (params.sigma * super::robust_sigma(&kept_residuals)).max(params.floor);

        // Every valid point is re-judged against the current fit, so points
        // rejected while an outlier dragged the curve can come back.
        let next: Vec<f64> = (0..xs.len())
            .map(|i| {
                if valid[i] && residuals[i].abs() <= threshold {
                    1.0
                } else {
                    0.0
                }
            })
            .collect();
        if next == weights {
            break;
        }
        weights = next;

        kept = weights.iter().filter(|&&w| w > 0.0).count();
        if kept < params.min_points {
            return Err(kept);
        }
        curve = fit_weighted(family, domain, xs, ys, &weights, order).ok_or(kept)?;
    }

    for i in 0..xs.len() {
        residuals[i] = ys[i] - curve.eval(xs[i]);
    }
    let rejected = (0..xs.len()).filter(|&i| valid[i] && weights[i] == 0.0).count();

    Ok(RobustFit {
        curve,
        weights,
        residuals,
        rejected,
    })
}

/// Root-mean-square residual of `curve` over the given points.
pub fn rms(curve: &Curve, xs: &[f64], ys: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    let sum: f64 = xs
        .iter()
        .zip(ys)
        .map(|(&x, &y)| {
            let r = y - curve.eval(x);
            r * r
        })
        .sum();
    (sum / xs.len() as f64).sqrt()
}
