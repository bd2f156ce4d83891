//! Edge detection: spatial derivative of the variance-stabilized image,
//! normalized by a robust noise estimate and thresholded.

use rayon::prelude::*;

use super::smooth::mirror;
use crate::common::Buffer2;
use crate::math::robust_sigma_f32_sampled;
use crate::slit_tracing::config::{Config, SobelMode};
use crate::slit_tracing::constants::{
    MEDIAN_HALF_COLS, MEDIAN_HALF_ROWS, NOISE_SAMPLE_STRIDE, ROWS_PER_CHUNK, SOBEL_NOISE_FLOOR,
};
use crate::slit_tracing::edge_map::{EdgeLabel, EdgeMap, Side};

/// Output of [`detect`].
#[derive(Debug)]
pub(crate) struct Detection {
    /// Signed significance: positive where flux rises with column (left edges).
    pub significance: Buffer2<f32>,
    /// Raw detections, all with id 0.
    pub edges: EdgeMap,
    pub left_candidates: usize,
    pub right_candidates: usize,
}

/// Detect raw edge pixels in the smoothed trace image.
pub(crate) fn detect(binarr: &Buffer2<f32>, bad_pixels: Option<&Buffer2<bool>>, config: &Config) -> Detection {
    // Variance stabilization
    let mut stabilized = binarr.map(|v| v.abs().sqrt());

    for _ in 0..config.median_repeat {
        stabilized = median_filter_3x7(&stabilized);
    }

    for v in stabilized.iter_mut() {
        *v = v.max(1.0);
    }

    let mut response = sobel_x(&stabilized, config.sobel_mode);
    if let Some(mask) = bad_pixels {
        for (r, &bad) in response.iter_mut().zip(mask.iter()) {
            if bad {
                *r = 0.0;
            }
        }
    }

    let noise = robust_sigma_f32_sampled(response.pixels(), NOISE_SAMPLE_STRIDE).max(SOBEL_NOISE_FLOOR) as f32;
    let significance = response.map(|r| r / noise);

    let (edges, left_candidates, right_candidates) = threshold_runs(&significance, config.sigdetect);

    tracing::debug!(
        noise,
        left_candidates,
        right_candidates,
        "edge detection done"
    );

    Detection {
        significance,
        edges,
        left_candidates,
        right_candidates,
    }
}

/// Left and right edges at fixed columns on every row.
pub(crate) fn single_slit(width: usize, height: usize, [left, right]: [f64; 2]) -> EdgeMap {
    let mut edges = EdgeMap::new(width, height);
    edges.write_trace(EdgeLabel::left(1), &vec![left; height]);
    edges.write_trace(EdgeLabel::right(1), &vec![right; height]);
    edges
}

/// Label one pixel per contiguous run of same-side candidates in each row:
/// the one with the largest |significance|, the later column on ties.
fn threshold_runs(significance: &Buffer2<f32>, sigdetect: f32) -> (EdgeMap, usize, usize) {
    let width = significance.width();
    let mut edges = EdgeMap::new(width, significance.height());
    let mut counts = [0usize; 2];

    for (y, row) in significance.rows().enumerate() {
        let mut run: Option<(Side, usize, f32)> = None;
        for (x, &s) in row.iter().enumerate() {
            let side = if s > sigdetect {
                Some(Side::Left)
            } else if s < -sigdetect {
                Some(Side::Right)
            } else {
                None
            };

            match (run, side) {
                (Some((run_side, _, best)), Some(side)) if run_side == side => {
                    if s.abs() >= best {
                        run = Some((side, x, s.abs()));
                    }
                }
                (_, side) => {
                    if let Some((run_side, best_x, _)) = run {
                        edges.set(best_x, y, Some(EdgeLabel::new(run_side, 0)));
                        counts[run_side as usize] += 1;
                    }
                    run = side.map(|side| (side, x, s.abs()));
                }
            }
        }
        if let Some((run_side, best_x, _)) = run {
            edges.set(best_x, y, Some(EdgeLabel::new(run_side, 0)));
            counts[run_side as usize] += 1;
        }
    }

    (edges, counts[0], counts[1])
}

/// Resolve an out-of-range index according to the boundary mode.
/// `None` means the sample is zero.
#[inline]
fn boundary(i: isize, n: usize, mode: SobelMode) -> Option<usize> {
    if i >= 0 && (i as usize) < n {
        return Some(i as usize);
    }
    match mode {
        SobelMode::Nearest => Some(i.clamp(0, n as isize - 1) as usize),
        SobelMode::Reflect => Some(mirror(i, n)),
        SobelMode::Constant => None,
    }
}

/// 3×3 Sobel derivative along columns: `[1, 2, 1]ᵀ ⊗ [-1, 0, 1]`.
fn sobel_x(image: &Buffer2<f32>, mode: SobelMode) -> Buffer2<f32> {
    let w = image.width();
    let h = image.height();
    let sample = |x: isize, y: isize| -> f32 {
        match (boundary(x, w, mode), boundary(y, h, mode)) {
            (Some(x), Some(y)) => image[(x, y)],
            _ => 0.0,
        }
    };

    let mut out = Buffer2::new_default(w, h);
    out.pixels_mut()
        .par_chunks_mut(w * ROWS_PER_CHUNK)
        .enumerate()
        .for_each(|(chunk_idx, chunk)| {
            let y_start = chunk_idx * ROWS_PER_CHUNK;
            for (local_y, row) in chunk.chunks_mut(w).enumerate() {
                let y = (y_start + local_y) as isize;
                for (x, out) in row.iter_mut().enumerate() {
                    let x = x as isize;
                    let mut acc = 0.0;
                    for (dy, weight) in [(-1, 1.0), (0, 2.0), (1, 1.0)] {
                        acc += weight * (sample(x + 1, y + dy) - sample(x - 1, y + dy));
                    }
                    *out = acc;
                }
            }
        });
    out
}

/// Median over a 3-row × 7-column window. Windows are truncated at the
/// detector border.
fn median_filter_3x7(image: &Buffer2<f32>) -> Buffer2<f32> {
    let w = image.width();
    let h = image.height();

    let mut out = Buffer2::new_default(w, h);
    out.pixels_mut()
        .par_chunks_mut(w * ROWS_PER_CHUNK)
        .enumerate()
        .for_each(|(chunk_idx, chunk)| {
            let y_start = chunk_idx * ROWS_PER_CHUNK;
            let mut window = [0.0f32; (2 * MEDIAN_HALF_ROWS + 1) * (2 * MEDIAN_HALF_COLS + 1)];
            for (local_y, row) in chunk.chunks_mut(w).enumerate() {
                let y = y_start + local_y;
                let y0 = y.saturating_sub(MEDIAN_HALF_ROWS);
                let y1 = (y + MEDIAN_HALF_ROWS + 1).min(h);
                for (x, out) in row.iter_mut().enumerate() {
                    let x0 = x.saturating_sub(MEDIAN_HALF_COLS);
                    let x1 = (x + MEDIAN_HALF_COLS + 1).min(w);
                    let mut count = 0;
                    for yy in y0..y1 {
                        for &v in &image.row(yy)[x0..x1] {
                            window[count] = v;
                            count += 1;
                        }
                    }
                    *out = median_f32(&mut window[..count]);
                }
            }
        });
    out
}

#[inline]
fn median_f32(values: &mut [f32]) -> f32 {
    let len = values.len();
    let mid = len / 2;
    let (lower, upper, _) = values.select_nth_unstable_by(mid, f32::total_cmp);
    let upper = *upper;
    if len % 2 == 1 {
        upper
    } else {
        let lower = lower.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        0.5 * (lower + upper)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step_image(width: usize, height: usize, step_at: usize, rising: bool) -> Buffer2<f32> {
        Buffer2::from_fn(width, height, |x, _| {
            let bright = if rising { x >= step_at } else { x < step_at };
            if bright { 400.0 } else { 0.0 }
        })
    }

    fn labelled(edges: &EdgeMap, y: usize) -> Vec<(usize, EdgeLabel)> {
        edges
            .row(y)
            .iter()
            .enumerate()
            .filter_map(|(x, l)| l.map(|l| (x, l)))
            .collect()
    }

    #[test]
    fn test_rising_step_is_left_edge() {
        let image = step_image(30, 12, 10, true);
        let det = detect(&image, None, &Config::default());

        assert_eq!(det.left_candidates, 12);
        assert_eq!(det.right_candidates, 0);
        for y in 0..12 {
            assert_eq!(labelled(&det.edges, y), vec![(10, EdgeLabel::left(0))]);
        }
        assert!(det.significance[(10, 5)] > 20.0);
    }

    #[test]
    fn test_falling_step_is_right_edge() {
        let image = step_image(30, 12, 20, false);
        let det = detect(&image, None, &Config::default());

        assert_eq!(det.left_candidates, 0);
        assert_eq!(det.right_candidates, 12);
        assert_eq!(labelled(&det.edges, 6), vec![(20, EdgeLabel::right(0))]);
        assert!(det.significance[(20, 6)] < -20.0);
    }

    #[test]
    fn test_noise_free_significance_uses_floor() {
        // sqrt(400) = 20 against a floor of 1: response 4 · 19 = 76.
        let image = step_image(30, 12, 10, true);
        let det = detect(&image, None, &Config::default());
        let expected = 76.0 / SOBEL_NOISE_FLOOR as f32;
        assert!((det.significance[(10, 5)] - expected).abs() < 1e-3);
    }

    #[test]
    fn test_flat_image_has_no_candidates() {
        let image = Buffer2::new_filled(20, 20, 250.0);
        let det = detect(&image, None, &Config::default());
        assert_eq!(det.left_candidates + det.right_candidates, 0);
    }

    #[test]
    fn test_constant_mode_sees_detector_border() {
        let image = Buffer2::new_filled(20, 6, 10_000.0);
        let config = Config {
            sobel_mode: SobelMode::Constant,
            ..Config::default()
        };
        let det = detect(&image, None, &config);
        assert_eq!(det.left_candidates, 6);
        assert_eq!(det.right_candidates, 6);

        let det = detect(&image, None, &Config::default());
        assert_eq!(det.left_candidates + det.right_candidates, 0);
    }

    #[test]
    fn test_bad_pixels_suppress_detection() {
        let image = step_image(30, 12, 10, true);
        let mask = Buffer2::from_fn(30, 12, |x, y| y == 3 && (8..=12).contains(&x));
        let det = detect(&image, Some(&mask), &Config::default());
        assert_eq!(det.left_candidates, 11);
        assert!(labelled(&det.edges, 3).is_empty());
    }

    #[test]
    fn test_median_filter_removes_hot_pixel() {
        let mut image = step_image(30, 12, 10, true);
        image[(25, 6)] = 1.0e6;
        let config = Config {
            median_repeat: 1,
            ..Config::default()
        };
        let det = detect(&image, None, &config);
        assert_eq!(det.right_candidates, 0);
        assert_eq!(det.left_candidates, 12);
    }

    #[test]
    fn test_single_slit_injects_edges() {
        let edges = single_slit(50, 4, [12.0, 30.4]);
        for y in 0..4 {
            assert_eq!(edges.get(12, y), Some(EdgeLabel::left(1)));
            assert_eq!(edges.get(30, y), Some(EdgeLabel::right(1)));
        }
        assert_eq!(edges.count(Side::Left), 4);
    }

    #[test]
    fn test_median_f32_even_and_odd() {
        assert_eq!(median_f32(&mut [3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median_f32(&mut [4.0, 1.0, 3.0, 2.0]), 2.5);
    }
}
