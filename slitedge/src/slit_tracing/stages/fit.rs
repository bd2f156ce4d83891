//! Robust curve fitting of every edge group on one side.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::math::polynomial::{RejectParams, robust_fit};
use crate::slit_tracing::config::Config;
use crate::slit_tracing::constants::{MAX_REJECT_ITERATIONS, MIN_REJECT_PIXELS, REJECT_SIGMA};
use crate::slit_tracing::edge_map::{EdgeMap, Side};
use crate::slit_tracing::pixel_locations::PixelLocations;
use crate::slit_tracing::slit::EdgeFit;

/// An edge dropped for lack of valid rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FitFailure {
    pub side: Side,
    pub id: u32,
    pub valid_rows: usize,
}

#[derive(Debug, Clone)]
pub(crate) struct EdgeFits {
    pub fits: Vec<EdgeFit>,
    pub failures: Vec<FitFailure>,
}

/// Fit spatial position against spectral position for every group on `side`,
/// in physical coordinates.
pub(crate) fn fit_edges(edges: &EdgeMap, side: Side, locations: &PixelLocations, config: &Config) -> EdgeFits {
    let height = edges.height();
    let domain = locations.spectral_domain();
    let axis = locations.spectral_axis();
    let params = RejectParams {
        max_iterations: MAX_REJECT_ITERATIONS,
        sigma: REJECT_SIGMA,
        floor: MIN_REJECT_PIXELS * locations.spatial_pitch(height / 2),
        min_points: config.min_edge_rows,
    };

    let groups: Vec<(u32, Vec<(usize, usize)>)> = edges.groups(side).into_iter().collect();
    let results: Vec<Result<EdgeFit, FitFailure>> = groups
        .into_par_iter()
        .map(|(id, pixels)| {
            // Mean physical position of the detections on each row.
            let mut sums = vec![(0.0f64, 0.0f64, 0usize); height];
            for (x, y) in pixels {
                let s = &mut sums[y];
                s.0 += locations.spectral_at(x, y);
                s.1 += locations.spatial_at(x, y);
                s.2 += 1;
            }
            let (xs, ys): (Vec<f64>, Vec<f64>) = sums
                .iter()
                .zip(&axis)
                .map(|(&(sx, sy, n), &row_spectral)| {
                    if n == 0 {
                        (row_spectral, f64::NAN)
                    } else {
                        (sx / n as f64, sy / n as f64)
                    }
                })
                .unzip();

            match robust_fit(config.function_family, domain, &xs, &ys, config.poly_order, params) {
                Ok(fit) => Ok(EdgeFit {
                    side,
                    id,
                    curve: fit.curve,
                    residuals: fit.residuals,
                    weights: fit.weights,
                    rejected: fit.rejected,
                }),
                Err(valid_rows) => Err(FitFailure { side, id, valid_rows }),
            }
        })
        .collect();

    let mut fits = Vec::new();
    let mut failures = Vec::new();
    for result in results {
        match result {
            Ok(fit) => fits.push(fit),
            Err(failure) => {
                tracing::warn!(
                    side = %failure.side,
                    id = failure.id,
                    valid_rows = failure.valid_rows,
                    min_rows = config.min_edge_rows,
                    "too few points to fit edge, dropping it"
                );
                failures.push(failure);
            }
        }
    }

    tracing::debug!(%side, fitted = fits.len(), failed = failures.len(), "edges fitted");
    EdgeFits { fits, failures }
}
