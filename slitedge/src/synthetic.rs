//! Noise-free synthetic trace images.
//!
//! Slits are rendered with exact pixel coverage: pixel column `x` spans
//! `[x, x + 1)`, so a slit `[10, 40)` lights columns 10..=39 fully.
//!
//! ```rust,ignore
//! use slitedge::synthetic::{SyntheticSlit, TraceImageConfig};
//!
//! let config = TraceImageConfig {
//!     slits: vec![SyntheticSlit::vertical(10.0, 40.0), SyntheticSlit::vertical(60.0, 90.0)],
//!     ..TraceImageConfig::new(100, 120)
//! };
//! let image = config.render();
//! ```

use crate::common::Buffer2;

/// One slit of a synthetic frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyntheticSlit {
    /// Edge columns at the reference row.
    pub left: f64,
    pub right: f64,
    /// Column shift per row away from the reference row.
    pub tilt: f64,
    /// Column shift at the first/last row from a quadratic bend.
    pub curvature: f64,
    /// Illuminated rows `[start, end)`; all rows when `None`.
    pub rows: Option<(usize, usize)>,
}

impl SyntheticSlit {
    pub fn vertical(left: f64, right: f64) -> Self {
        Self {
            left,
            right,
            tilt: 0.0,
            curvature: 0.0,
            rows: None,
        }
    }

    pub fn with_tilt(mut self, tilt: f64) -> Self {
        self.tilt = tilt;
        self
    }

    pub fn with_curvature(mut self, curvature: f64) -> Self {
        self.curvature = curvature;
        self
    }

    pub fn with_rows(mut self, start: usize, end: usize) -> Self {
        self.rows = Some((start, end));
        self
    }

    /// Column offset of both edges on row `y`.
    pub fn shift(&self, y: usize, height: usize) -> f64 {
        let ref_row = (height / 2) as f64;
        let dy = y as f64 - ref_row;
        let t = if ref_row > 0.0 { dy / ref_row } else { 0.0 };
        self.tilt * dy + self.curvature * t * t
    }

    pub fn left_at(&self, y: usize, height: usize) -> f64 {
        self.left + self.shift(y, height)
    }

    pub fn right_at(&self, y: usize, height: usize) -> f64 {
        self.right + self.shift(y, height)
    }

    fn lit(&self, y: usize) -> bool {
        self.rows.is_none_or(|(start, end)| (start..end).contains(&y))
    }
}

/// Layout and flux levels of a synthetic frame.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceImageConfig {
    pub width: usize,
    pub height: usize,
    /// Flux between slits.
    pub background: f32,
    /// Flux added inside a slit.
    pub flux: f32,
    pub slits: Vec<SyntheticSlit>,
}

impl TraceImageConfig {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            background: 10.0,
            flux: 1000.0,
            slits: Vec::new(),
        }
    }

    pub fn render(&self) -> Buffer2<f32> {
        Buffer2::from_fn(self.width, self.height, |x, y| {
            let lit: f64 = self
                .slits
                .iter()
                .filter(|s| s.lit(y))
                .map(|s| coverage(x, s.left_at(y, self.height), s.right_at(y, self.height)))
                .sum();
            self.background + self.flux * lit.min(1.0) as f32
        })
    }
}

/// Fraction of pixel column `x` inside `[left, right)`.
fn coverage(x: usize, left: f64, right: f64) -> f64 {
    let lo = left.max(x as f64);
    let hi = right.min(x as f64 + 1.0);
    (hi - lo).clamp(0.0, 1.0)
}

/// Two vertical slits `[10, 40)` and `[60, 90)` on a 100 × 120 frame.
pub fn two_slit_frame() -> TraceImageConfig {
    TraceImageConfig {
        slits: vec![SyntheticSlit::vertical(10.0, 40.0), SyntheticSlit::vertical(60.0, 90.0)],
        ..TraceImageConfig::new(100, 120)
    }
}

/// `count` evenly spaced, slightly tilted and curved slits filling `width`.
pub fn multi_slit_frame(width: usize, height: usize, count: usize) -> TraceImageConfig {
    let pitch = width as f64 / (count as f64 + 1.0);
    let slit_width = 0.6 * pitch;
    let slits = (0..count)
        .map(|i| {
            let center = pitch * (i as f64 + 1.0);
            SyntheticSlit::vertical(center - 0.5 * slit_width, center + 0.5 * slit_width)
                .with_tilt(0.01)
                .with_curvature(1.5)
        })
        .collect();
    TraceImageConfig {
        slits,
        ..TraceImageConfig::new(width, height)
    }
}
