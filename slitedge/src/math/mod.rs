//! Numeric helpers: robust statistics, basis-function fitting, PCA.

pub(crate) mod pca;
pub(crate) mod polynomial;

#[cfg(test)]
mod tests;

pub use polynomial::{Curve, FunctionFamily};

/// MAD (Median Absolute Deviation) to standard deviation conversion factor.
///
/// For a normal distribution, σ ≈ 1.4826 × MAD.
pub const MAD_TO_SIGMA: f64 = 1.482_602_2;

/// Convert MAD to standard deviation (assuming normal distribution).
#[inline]
pub fn mad_to_sigma(mad: f64) -> f64 {
    mad * MAD_TO_SIGMA
}

/// Median of `data` via quickselect. Mutates (partially sorts) the input.
///
/// NaNs compare as equal to everything; callers filter them out first.
pub fn median_mut(data: &mut [f64]) -> f64 {
    debug_assert!(!data.is_empty());

    let len = data.len();
    let mid = len / 2;
    let cmp = |a: &f64, b: &f64| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal);

    let (left_part, upper, _) = data.select_nth_unstable_by(mid, cmp);
    let upper = *upper;
    if len & 1 == 1 {
        upper
    } else {
        let lower = left_part.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        (lower + upper) * 0.5
    }
}

/// Median of an iterator of values. Returns `None` when empty.
pub fn median_of(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    let mut buf: Vec<f64> = values.into_iter().filter(|v| v.is_finite()).collect();
    if buf.is_empty() {
        None
    } else {
        Some(median_mut(&mut buf))
    }
}

/// Median and MAD computed together. Mutates the input buffer.
pub fn median_and_mad_mut(data: &mut [f64]) -> (f64, f64) {
    debug_assert!(!data.is_empty());

    let median = median_mut(data);
    for v in data.iter_mut() {
        *v = (*v - median).abs();
    }
    let mad = median_mut(data);

    (median, mad)
}

/// Robust sigma of `values` from the MAD. Returns 0 for fewer than two values.
pub fn robust_sigma(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mut scratch = values.to_vec();
    let (_, mad) = median_and_mad_mut(&mut scratch);
    mad_to_sigma(mad)
}

/// Robust sigma of a large `f32` image computed on a regular subsample.
///
/// Statistics of trace frames are dominated by the flat inter-slit regions,
/// so every `stride`-th value is enough.
pub fn robust_sigma_f32_sampled(values: &[f32], stride: usize) -> f64 {
    let sample: Vec<f64> = values
        .iter()
        .step_by(stride.max(1))
        .map(|&v| v as f64)
        .filter(|v| v.is_finite())
        .collect();
    robust_sigma(&sample)
}
