//! Fixed tuning constants of the slit tracing pipeline.

/// Rows processed per parallel work item.
pub(crate) const ROWS_PER_CHUNK: usize = 8;

/// Derivative-filter noise floor, in sqrt-flux units. The Sobel response of
/// unit-variance Poisson noise after the square root (σ ≈ 0.5) has σ = √12 · 0.5.
pub const SOBEL_NOISE_FLOOR: f64 = 1.732_050_8;

/// Every `NOISE_SAMPLE_STRIDE`-th pixel enters the Sobel noise estimate.
pub(crate) const NOISE_SAMPLE_STRIDE: usize = 7;

/// Half size of the detection median filter (3 rows × 7 columns).
pub(crate) const MEDIAN_HALF_ROWS: usize = 1;
pub(crate) const MEDIAN_HALF_COLS: usize = 3;

/// Two edge groups are merged when a joint fit leaves at most this RMS (pixels).
pub const ASSIGN_MERGE_RMS: f64 = 1.0;

/// Groups sharing a row further apart than this (pixels) are distinct edges.
pub(crate) const ASSIGN_CONFLICT_PIXELS: f64 = 2.0;

/// Groups detected on fewer rows are discarded during assignment.
pub(crate) const MIN_GROUP_ROWS: usize = 2;

/// Outlier rejection of edge fits.
pub const MAX_REJECT_ITERATIONS: usize = 5;
pub const REJECT_SIGMA: f64 = 3.0;
/// Residuals below this many pixels are never rejected.
pub const MIN_REJECT_PIXELS: f64 = 1.0;

/// Crude tracing accepts significance above `sigdetect * CRUDE_THRESHOLD_FACTOR`.
pub(crate) const CRUDE_THRESHOLD_FACTOR: f32 = 0.5;

/// A user slit to remove matches a traced slit within this many pixels.
pub const REMOVE_SLIT_TOL: f64 = 3.0;
