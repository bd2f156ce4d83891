//! Reconstruction of missing or poorly traced edges from the well traced ones.
//!
//! Slits on one detector share their curvature pattern, which varies smoothly
//! across the detector. A PCA over the well traced edges captures that
//! pattern; regressing the PCA scores on position predicts the shape of any
//! other edge. Strategies:
//! - [`OrderPca`]: curve coefficients, regressed on slit index (echelle);
//! - [`PixelPca`]: per-row offsets, regressed on edge position (multi-slit);
//! - [`NoPca`]: no reconstruction.

use crate::math::pca::Pca;
use crate::math::polynomial::fit_weighted;
use crate::math::{Curve, FunctionFamily, median_of};
use crate::slit_tracing::config::{Config, PcaMode};
use crate::slit_tracing::slit::{EdgeFit, Slit};

use super::sync::SlitCandidate;

/// Everything a strategy needs besides the candidates.
#[derive(Debug)]
pub(crate) struct ExtrapolationInput<'a> {
    pub candidates: &'a [SlitCandidate],
    /// Spectral coordinate of every row.
    pub spectral_axis: &'a [f64],
    pub ref_row: usize,
    pub family: FunctionFamily,
    pub poly_order: usize,
    pub domain: (f64, f64),
    /// Edges covering fewer rows than this fraction are rebuilt.
    pub min_coverage: f64,
}

impl ExtrapolationInput<'_> {
    fn ref_spectral(&self) -> f64 {
        self.spectral_axis[self.ref_row]
    }

    fn usable<'f>(&self, fit: &'f Option<EdgeFit>) -> Option<&'f EdgeFit> {
        fit.as_ref().filter(|f| f.coverage() >= self.min_coverage)
    }

    fn is_complete(&self, candidate: &SlitCandidate) -> bool {
        self.usable(&candidate.left).is_some() && self.usable(&candidate.right).is_some()
    }

    fn complete_count(&self) -> usize {
        self.candidates.iter().filter(|c| self.is_complete(c)).count()
    }

    /// Fall back to [`NoPca`] when there is nothing to rebuild from.
    fn needs_fallback(&self, strategy: &str) -> bool {
        let complete = self.complete_count();
        if complete == self.candidates.len() {
            return true;
        }
        if complete < 2 {
            tracing::warn!(
                strategy,
                complete,
                "fewer than two complete slits, edges are not extrapolated"
            );
            return true;
        }
        false
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Extrapolation {
    pub slits: Vec<Slit>,
    /// Reconstruction was needed but not possible.
    pub fallback: bool,
    /// Candidates that could not be turned into a slit.
    pub dropped: usize,
}

pub(crate) trait EdgeExtrapolator: Send + Sync {
    fn extrapolate(&self, input: &ExtrapolationInput<'_>) -> Extrapolation;
}

pub(crate) fn extrapolator_for(config: &Config) -> Box<dyn EdgeExtrapolator> {
    match config.pca {
        PcaMode::None => Box::new(NoPca),
        PcaMode::Order => Box::new(OrderPca {
            order_factors: config.pca_order_factors.clone(),
            diff_poly_order: config.diff_poly_order,
        }),
        PcaMode::Pixel => Box::new(PixelPca {
            order_factors: config.pca_order_factors.clone(),
        }),
    }
}

/// Regress `ys` on `xs` with a plain polynomial of `order` (capped by the
/// number of points).
fn regress(xs: &[f64], ys: &[f64], order: usize) -> Option<Curve> {
    let lo = xs.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = xs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let weights = vec![1.0; xs.len()];
    fit_weighted(FunctionFamily::Polynomial, (lo, hi), xs, ys, &weights, order)
}

// ============================================================================
// No extrapolation
// ============================================================================

/// Keep slits with both edges, drop the rest.
#[derive(Debug, Clone, Copy)]
pub(crate) struct NoPca;

impl NoPca {
    fn keep_complete(input: &ExtrapolationInput<'_>, fallback: bool) -> Extrapolation {
        let mut slits = Vec::new();
        let mut dropped = 0;
        for candidate in input.candidates {
            match (&candidate.left, &candidate.right) {
                (Some(l), Some(r)) => slits.push(Slit::new(l.curve.clone(), r.curve.clone(), false)),
                _ => {
                    dropped += 1;
                    tracing::debug!("slit with a missing edge dropped");
                }
            }
        }
        Extrapolation {
            slits,
            fallback,
            dropped,
        }
    }
}

impl EdgeExtrapolator for NoPca {
    fn extrapolate(&self, input: &ExtrapolationInput<'_>) -> Extrapolation {
        Self::keep_complete(input, false)
    }
}

// ============================================================================
// Order PCA
// ============================================================================

#[derive(Debug, Clone)]
pub(crate) struct OrderPca {
    pub order_factors: Vec<usize>,
    pub diff_poly_order: usize,
}

impl EdgeExtrapolator for OrderPca {
    fn extrapolate(&self, input: &ExtrapolationInput<'_>) -> Extrapolation {
        if input.needs_fallback("order") {
            let fallback = input.complete_count() != input.candidates.len();
            return NoPca::keep_complete(input, fallback);
        }

        let ncoeff = input.poly_order + 1;
        let mut index = Vec::new();
        let mut centers = Vec::new();
        let mut widths = Vec::new();
        for (i, candidate) in input.candidates.iter().enumerate() {
            if let (Some(l), Some(r)) = (input.usable(&candidate.left), input.usable(&candidate.right)) {
                let lc = l.curve.coeffs_padded(ncoeff);
                let rc = r.curve.coeffs_padded(ncoeff);
                index.push(i as f64);
                centers.push(lc.iter().zip(&rc).map(|(a, b)| 0.5 * (a + b)).collect::<Vec<f64>>());
                widths.push(lc.iter().zip(&rc).map(|(a, b)| b - a).collect::<Vec<f64>>());
            }
        }

        let Some(model) = OrderModel::fit(&index, &centers, &widths, &self.order_factors, self.diff_poly_order)
        else {
            tracing::warn!("order PCA failed, edges are not extrapolated");
            return NoPca::keep_complete(input, true);
        };

        let curve = |coeffs: Vec<f64>| Curve::new(input.family, coeffs, input.domain);
        let mut slits = Vec::with_capacity(input.candidates.len());
        for (i, candidate) in input.candidates.iter().enumerate() {
            let x = i as f64;
            let width = model.width(x);
            let left = input.usable(&candidate.left);
            let right = input.usable(&candidate.right);
            let slit = match (left, right) {
                (Some(l), Some(r)) => Slit::new(l.curve.clone(), r.curve.clone(), false),
                (Some(l), None) => {
                    let lc = l.curve.coeffs_padded(ncoeff);
                    let rc = lc.iter().zip(&width).map(|(a, w)| a + w).collect();
                    Slit::new(curve(lc), curve(rc), true)
                }
                (None, Some(r)) => {
                    let rc = r.curve.coeffs_padded(ncoeff);
                    let lc = rc.iter().zip(&width).map(|(a, w)| a - w).collect();
                    Slit::new(curve(lc), curve(rc), true)
                }
                (None, None) => {
                    let center = model.center(x);
                    let lc = center.iter().zip(&width).map(|(c, w)| c - 0.5 * w).collect();
                    let rc = center.iter().zip(&width).map(|(c, w)| c + 0.5 * w).collect();
                    Slit::new(curve(lc), curve(rc), true)
                }
            };
            if slit.extrapolated {
                tracing::debug!(index = i, "slit edges extrapolated from order PCA");
            }
            slits.push(slit);
        }

        Extrapolation {
            slits,
            fallback: false,
            dropped: 0,
        }
    }
}

/// Center coefficients (PCA scores) and width coefficients as functions of
/// the slit index.
struct OrderModel {
    pca: Pca,
    score_fits: Vec<Curve>,
    width_fits: Vec<Curve>,
}

impl OrderModel {
    fn fit(
        index: &[f64],
        centers: &[Vec<f64>],
        widths: &[Vec<f64>],
        order_factors: &[usize],
        diff_poly_order: usize,
    ) -> Option<Self> {
        let n = index.len();
        let pca = Pca::fit(centers, order_factors.len())?;

        let score_fits = (0..pca.num_components())
            .map(|j| {
                let scores: Vec<f64> = pca.scores.iter().map(|s| s[j]).collect();
                regress(index, &scores, order_factors[j].min(n - 1))
            })
            .collect::<Option<Vec<_>>>()?;

        let ncoeff = widths.first()?.len();
        let width_fits = (0..ncoeff)
            .map(|m| {
                let values: Vec<f64> = widths.iter().map(|w| w[m]).collect();
                regress(index, &values, diff_poly_order.min(n - 1))
            })
            .collect::<Option<Vec<_>>>()?;

        Some(Self {
            pca,
            score_fits,
            width_fits,
        })
    }

    fn center(&self, index: f64) -> Vec<f64> {
        let scores: Vec<f64> = self.score_fits.iter().map(|f| f.eval(index)).collect();
        self.pca.reconstruct(&scores)
    }

    fn width(&self, index: f64) -> Vec<f64> {
        self.width_fits.iter().map(|f| f.eval(index)).collect()
    }
}

// ============================================================================
// Pixel PCA
// ============================================================================

#[derive(Debug, Clone)]
pub(crate) struct PixelPca {
    pub order_factors: Vec<usize>,
}

impl EdgeExtrapolator for PixelPca {
    fn extrapolate(&self, input: &ExtrapolationInput<'_>) -> Extrapolation {
        if input.needs_fallback("pixel") {
            let fallback = input.complete_count() != input.candidates.len();
            return NoPca::keep_complete(input, fallback);
        }

        let ref_s = input.ref_spectral();
        let axis = input.spectral_axis;

        let mut positions = Vec::new();
        let mut offsets = Vec::new();
        for candidate in input.candidates {
            for fit in [input.usable(&candidate.left), input.usable(&candidate.right)]
                .into_iter()
                .flatten()
            {
                let p = fit.curve.eval(ref_s);
                positions.push(p);
                offsets.push(axis.iter().map(|&s| fit.curve.eval(s) - p).collect::<Vec<f64>>());
            }
        }

        let Some(model) = PixelModel::fit(&positions, &offsets, &self.order_factors) else {
            tracing::warn!("pixel PCA failed, edges are not extrapolated");
            return NoPca::keep_complete(input, true);
        };

        let median_width = median_of(input.candidates.iter().filter_map(|c| {
            let l = input.usable(&c.left)?;
            let r = input.usable(&c.right)?;
            Some(r.curve.eval(ref_s) - l.curve.eval(ref_s))
        }))
        .unwrap_or(0.0);

        let rebuild = |fit: Option<&EdgeFit>, anchor: Option<f64>| -> Option<Curve> {
            let (anchor, shape) = match fit {
                Some(fit) => {
                    let shape = model.shape(fit.curve.eval(ref_s));
                    (model.anchor_from_detections(fit, axis, &shape)?, shape)
                }
                None => {
                    let anchor = anchor?;
                    (anchor, model.shape(anchor))
                }
            };
            let ys: Vec<f64> = shape.iter().map(|o| anchor + o).collect();
            let weights = vec![1.0; ys.len()];
            fit_weighted(input.family, input.domain, axis, &ys, &weights, input.poly_order)
        };

        let mut slits = Vec::with_capacity(input.candidates.len());
        let mut dropped = 0;
        for candidate in input.candidates {
            let left_ok = input.usable(&candidate.left).map(|f| f.curve.clone());
            let right_ok = input.usable(&candidate.right).map(|f| f.curve.clone());
            let complete = left_ok.is_some() && right_ok.is_some();

            let left = left_ok.or_else(|| candidate.left.as_ref().and_then(|f| rebuild(Some(f), None)));
            let right = right_ok.or_else(|| candidate.right.as_ref().and_then(|f| rebuild(Some(f), None)));

            let pair = match (left, right) {
                (Some(l), Some(r)) => Some((l, r)),
                (Some(l), None) => rebuild(None, Some(l.eval(ref_s) + median_width)).map(|r| (l, r)),
                (None, Some(r)) => rebuild(None, Some(r.eval(ref_s) - median_width)).map(|l| (l, r)),
                (None, None) => None,
            };
            match pair {
                Some((l, r)) => {
                    if !complete {
                        tracing::debug!(
                            left = l.eval(ref_s),
                            right = r.eval(ref_s),
                            "slit edges extrapolated from pixel PCA"
                        );
                    }
                    slits.push(Slit::new(l, r, !complete));
                }
                None => dropped += 1,
            }
        }

        Extrapolation {
            slits,
            fallback: false,
            dropped,
        }
    }
}

/// Per-row offset shape as a function of reference position.
struct PixelModel {
    pca: Pca,
    score_fits: Vec<Curve>,
}

impl PixelModel {
    fn fit(positions: &[f64], offsets: &[Vec<f64>], order_factors: &[usize]) -> Option<Self> {
        let n = positions.len();
        let pca = Pca::fit(offsets, order_factors.len())?;
        let score_fits = (0..pca.num_components())
            .map(|j| {
                let scores: Vec<f64> = pca.scores.iter().map(|s| s[j]).collect();
                regress(positions, &scores, order_factors[j].min(n - 1))
            })
            .collect::<Option<Vec<_>>>()?;
        Some(Self { pca, score_fits })
    }

    /// Predicted offsets from the reference row for an edge at `position`.
    fn shape(&self, position: f64) -> Vec<f64> {
        let scores: Vec<f64> = self.score_fits.iter().map(|f| f.eval(position)).collect();
        self.pca.reconstruct(&scores)
    }

    /// Reference position that best matches the edge's own detections
    /// under `shape`.
    fn anchor_from_detections(&self, fit: &EdgeFit, axis: &[f64], shape: &[f64]) -> Option<f64> {
        let mut sum = 0.0;
        let mut sum_w = 0.0;
        for (row, (&s, &offset)) in axis.iter().zip(shape).enumerate() {
            let w = fit.weights[row];
            if w > 0.0 && fit.residuals[row].is_finite() {
                let observed = fit.curve.eval(s) + fit.residuals[row];
                sum += w * (observed - offset);
                sum_w += w;
            }
        }
        (sum_w > 0.0).then(|| sum / sum_w)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slit_tracing::edge_map::Side;

    const HEIGHT: usize = 50;
    const REF_ROW: usize = 25;

    fn axis() -> Vec<f64> {
        (0..HEIGHT).map(|y| y as f64).collect()
    }

    fn domain() -> (f64, f64) {
        (0.0, (HEIGHT - 1) as f64)
    }

    /// Edge through `position` at the reference row, bending more for larger positions.
    fn curved(position: f64) -> impl Fn(f64) -> f64 {
        move |y: f64| {
            let t = (y - REF_ROW as f64) / REF_ROW as f64;
            position + (2.0 + 0.02 * position) * t * t
        }
    }

    fn edge(side: Side, f: impl Fn(f64) -> f64, covered: impl Fn(usize) -> bool) -> EdgeFit {
        let axis = axis();
        let ys: Vec<f64> = axis.iter().map(|&y| f(y)).collect();
        let weights: Vec<f64> = (0..HEIGHT).map(|y| if covered(y) { 1.0 } else { 0.0 }).collect();
        let curve = fit_weighted(FunctionFamily::Legendre, domain(), &axis, &ys, &weights, 3).unwrap();
        let residuals = (0..HEIGHT).map(|y| if covered(y) { 0.0 } else { f64::NAN }).collect();
        EdgeFit {
            side,
            id: 0,
            curve,
            residuals,
            weights,
            rejected: 0,
        }
    }

    fn full(side: Side, f: impl Fn(f64) -> f64) -> Option<EdgeFit> {
        Some(edge(side, f, |_| true))
    }

    fn run(strategy: &dyn EdgeExtrapolator, candidates: &[SlitCandidate]) -> Extrapolation {
        let axis = axis();
        let input = ExtrapolationInput {
            candidates,
            spectral_axis: &axis,
            ref_row: REF_ROW,
            family: FunctionFamily::Legendre,
            poly_order: 3,
            domain: domain(),
            min_coverage: 0.5,
        };
        strategy.extrapolate(&input)
    }

    fn vertical(value: f64) -> impl Fn(f64) -> f64 {
        move |_| value
    }

    #[test]
    fn test_no_pca_drops_incomplete() {
        let candidates = vec![
            SlitCandidate {
                left: full(Side::Left, vertical(10.0)),
                right: full(Side::Right, vertical(20.0)),
            },
            SlitCandidate {
                left: full(Side::Left, vertical(30.0)),
                right: None,
            },
        ];
        let out = run(&NoPca, &candidates);
        assert_eq!(out.slits.len(), 1);
        assert_eq!(out.dropped, 1);
        assert!(!out.fallback);
    }

    #[test]
    fn test_order_pca_fills_missing_right_and_extra_slot() {
        let mut candidates: Vec<SlitCandidate> = (0..5)
            .map(|k| {
                let left = 15.0 + 20.0 * k as f64;
                SlitCandidate {
                    left: full(Side::Left, vertical(left)),
                    right: full(Side::Right, vertical(left + 10.0)),
                }
            })
            .collect();
        candidates[2].right = None;
        candidates.push(SlitCandidate { left: None, right: None });

        let strategy = OrderPca {
            order_factors: vec![3, 2, 1, 0, 0, 0],
            diff_poly_order: 2,
        };
        let out = run(&strategy, &candidates);

        assert_eq!(out.slits.len(), 6);
        assert!(!out.fallback);
        let mask: Vec<bool> = out.slits.iter().map(|s| s.extrapolated).collect();
        assert_eq!(mask, vec![false, false, true, false, false, true]);

        assert!((out.slits[2].right.eval(10.0) - 65.0).abs() < 1e-6);
        assert!((out.slits[5].left.eval(10.0) - 115.0).abs() < 1e-6);
        assert!((out.slits[5].right.eval(40.0) - 125.0).abs() < 1e-6);
    }

    #[test]
    fn test_pixel_pca_rebuilds_missing_edge_shape() {
        let positions = [10.0, 50.0, 90.0, 130.0];
        let mut candidates: Vec<SlitCandidate> = positions
            .iter()
            .map(|&p| SlitCandidate {
                left: full(Side::Left, curved(p)),
                right: full(Side::Right, curved(p + 20.0)),
            })
            .collect();
        candidates[2].right = None;

        let out = run(&PixelPca { order_factors: vec![3, 2, 1] }, &candidates);
        assert_eq!(out.slits.len(), 4);
        assert!(out.slits[2].extrapolated);

        let expected = curved(110.0);
        for y in [0.0, 10.0, 25.0, 49.0] {
            let got = out.slits[2].right.eval(y);
            assert!((got - expected(y)).abs() < 0.05, "row {y}: {got} vs {}", expected(y));
        }
    }

    #[test]
    fn test_pixel_pca_anchors_poorly_covered_edge() {
        let positions = [10.0, 50.0, 90.0];
        let mut candidates: Vec<SlitCandidate> = positions
            .iter()
            .map(|&p| SlitCandidate {
                left: full(Side::Left, curved(p)),
                right: full(Side::Right, curved(p + 20.0)),
            })
            .collect();
        // Left edge of slit 1 only detected on the first rows, with a fit
        // that is badly off elsewhere.
        let mut partial = edge(Side::Left, curved(50.0), |y| y < 10);
        partial.curve = Curve::constant(FunctionFamily::Legendre, 48.0, domain(), 3);
        for y in 0..10 {
            partial.residuals[y] = curved(50.0)(y as f64) - 48.0;
        }
        candidates[1].left = Some(partial);

        let out = run(&PixelPca { order_factors: vec![3, 2, 1] }, &candidates);
        assert!(out.slits[1].extrapolated);
        let expected = curved(50.0);
        for y in [0.0, 25.0, 49.0] {
            assert!((out.slits[1].left.eval(y) - expected(y)).abs() < 0.2);
        }
    }

    #[test]
    fn test_fallback_with_single_complete_slit() {
        let candidates = vec![
            SlitCandidate {
                left: full(Side::Left, vertical(10.0)),
                right: full(Side::Right, vertical(20.0)),
            },
            SlitCandidate {
                left: None,
                right: full(Side::Right, vertical(40.0)),
            },
        ];
        let out = run(&PixelPca { order_factors: vec![3] }, &candidates);
        assert!(out.fallback);
        assert_eq!(out.slits.len(), 1);
    }
}
