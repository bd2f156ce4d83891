//! Principal component analysis on small dense observation sets.

use nalgebra::DMatrix;

/// PCA model: `x ≈ mean + Σ score_j · component_j`.
#[derive(Debug, Clone)]
pub struct Pca {
    pub mean: Vec<f64>,
    /// Unit-length components, strongest first.
    pub components: Vec<Vec<f64>>,
    /// Per-observation scores, `scores[i][j]` for observation `i`, component `j`.
    pub scores: Vec<Vec<f64>>,
    /// Fraction of total variance carried by each kept component.
    pub explained: Vec<f64>,
}

impl Pca {
    /// Fit up to `max_components` components. Returns `None` for fewer than
    /// two observations or ragged input.
    pub fn fit(observations: &[Vec<f64>], max_components: usize) -> Option<Self> {
        let n = observations.len();
        if n < 2 {
            return None;
        }
        let dim = observations[0].len();
        if dim == 0 || observations.iter().any(|o| o.len() != dim) {
            return None;
        }

        let mut mean = vec![0.0; dim];
        for obs in observations {
            for (m, v) in mean.iter_mut().zip(obs) {
                *m += v;
            }
        }
        for m in &mut mean {
            *m /= n as f64;
        }

        let centered = DMatrix::from_fn(n, dim, |i, j| observations[i][j] - mean[j]);
        let svd = centered.clone().svd(false, true);
        let v_t = svd.v_t?;

        let mut order: Vec<usize> = (0..svd.singular_values.len()).collect();
        order.sort_by(|&a, &b| {
            svd.singular_values[b]
                .partial_cmp(&svd.singular_values[a])
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let total: f64 = svd.singular_values.iter().map(|s| s * s).sum();
        let keep = max_components.min(order.len()).min(n - 1);

        let mut components = Vec::with_capacity(keep);
        let mut explained = Vec::with_capacity(keep);
        for &idx in order.iter().take(keep) {
            components.push(v_t.row(idx).iter().copied().collect::<Vec<f64>>());
            let s = svd.singular_values[idx];
            explained.push(if total > 0.0 { s * s / total } else { 0.0 });
        }

        let scores = (0..n)
            .map(|i| {
                components
                    .iter()
                    .map(|c| (0..dim).map(|j| centered[(i, j)] * c[j]).sum())
                    .collect()
            })
            .collect();

        Some(Self {
            mean,
            components,
            scores,
            explained,
        })
    }

    pub fn num_components(&self) -> usize {
        self.components.len()
    }

    /// Rebuild an observation from component scores (missing scores count as 0).
    pub fn reconstruct(&self, scores: &[f64]) -> Vec<f64> {
        let mut out = self.mean.clone();
        for (c, &s) in self.components.iter().zip(scores) {
            for (o, v) in out.iter_mut().zip(c) {
                *o += s * v;
            }
        }
        out
    }
}
