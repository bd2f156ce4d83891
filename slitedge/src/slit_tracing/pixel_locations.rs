//! Physical coordinates of detector pixels.
//!
//! Edge curves are fit and reported in physical (spectral, spatial)
//! coordinates. The identity map, where both coordinates equal the pixel
//! indices, is what most callers need.

use serde::{Deserialize, Serialize};

use super::error::{Error, Result};
use crate::common::Buffer2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PixelLocations {
    /// Spectral coordinate of each pixel center.
    spectral: Buffer2<f64>,
    /// Spatial coordinate of each pixel center.
    spatial: Buffer2<f64>,
}

impl PixelLocations {
    /// Identity coordinates: spectral = row, spatial = column.
    pub fn unit(width: usize, height: usize) -> Self {
        Self {
            spectral: Buffer2::from_fn(width, height, |_, y| y as f64),
            spatial: Buffer2::from_fn(width, height, |x, _| x as f64),
        }
    }

    pub fn new(spectral: Buffer2<f64>, spatial: Buffer2<f64>) -> Result<Self> {
        if !spectral.same_shape(&spatial) {
            return Err(Error::ShapeMismatch {
                what: "pixel location planes",
                expected: (spectral.width(), spectral.height()),
                actual: (spatial.width(), spatial.height()),
            });
        }
        Ok(Self { spectral, spatial })
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.spatial.width()
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.spatial.height()
    }

    #[inline]
    pub fn spectral_at(&self, x: usize, y: usize) -> f64 {
        *self.spectral.get(x, y)
    }

    #[inline]
    pub fn spatial_at(&self, x: usize, y: usize) -> f64 {
        *self.spatial.get(x, y)
    }

    /// Spectral coordinate of each row, taken from the first column.
    pub fn spectral_axis(&self) -> Vec<f64> {
        (0..self.height()).map(|y| self.spectral_at(0, y)).collect()
    }

    /// Spectral range covered by the detector, used as the curve domain.
    pub fn spectral_domain(&self) -> (f64, f64) {
        let axis = self.spectral_axis();
        let lo = axis.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = axis.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        (lo, hi)
    }

    /// Spatial extent `(min, max)` of the detector over all rows.
    pub fn spatial_bounds(&self) -> (f64, f64) {
        let lo = self.spatial.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = self.spatial.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        (lo, hi)
    }

    /// Median spatial distance between neighbouring pixels of row `y`.
    pub fn spatial_pitch(&self, y: usize) -> f64 {
        let row = self.spatial.row(y);
        let steps = row.windows(2).map(|w| (w[1] - w[0]).abs());
        crate::math::median_of(steps).filter(|p| *p > 0.0).unwrap_or(1.0)
    }

    /// Spatial coordinate at a fractional column of row `y`, by linear
    /// interpolation (extrapolated past the border pixels).
    pub fn column_to_spatial(&self, y: usize, column: f64) -> f64 {
        let row = self.spatial.row(y);
        if row.len() == 1 {
            return row[0];
        }
        let i = (column.floor().max(0.0) as usize).min(row.len() - 2);
        let frac = column - i as f64;
        row[i] + frac * (row[i + 1] - row[i])
    }

    /// Fractional column at which row `y` reaches spatial coordinate `value`.
    /// Assumes the spatial coordinate is monotonic along the row.
    pub fn spatial_to_column(&self, y: usize, value: f64) -> f64 {
        let row = self.spatial.row(y);
        if row.len() == 1 {
            return 0.0;
        }
        let ascending = row[row.len() - 1] >= row[0];
        let upper = row.partition_point(|&v| if ascending { v < value } else { v > value });
        let i = upper.clamp(1, row.len() - 1) - 1;
        let span = row[i + 1] - row[i];
        if span.abs() < f64::EPSILON {
            return i as f64;
        }
        i as f64 + (value - row[i]) / span
    }

    /// Nearest pixel column to spatial `value` in row `y`, clamped onto the detector.
    pub fn nearest_column(&self, y: usize, value: f64) -> usize {
        let col = self.spatial_to_column(y, value).round();
        col.clamp(0.0, self.width().saturating_sub(1) as f64) as usize
    }
}
