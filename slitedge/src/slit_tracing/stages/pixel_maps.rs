//! Rasterization of slit curves into per-pixel maps.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::common::Buffer2;
use crate::slit_tracing::pixel_locations::PixelLocations;
use crate::slit_tracing::slit::SlitSet;

/// Per-pixel view of a slit set. Rebuilt from the slits, never edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PixelMaps {
    /// Slit number per pixel, 1-based; 0 outside every slit.
    pub slit_ids: Buffer2<u32>,
    /// `(spatial - center) / width` of the owning slit; 0 outside slits.
    pub offsets: Buffer2<f64>,
    /// Pixels within `trim_fraction` of a slit edge (or in its padding).
    pub edge_mask: Buffer2<bool>,
    /// Nearest column of each edge, `[slit][row]`.
    pub left_pixels: Vec<Vec<usize>>,
    pub right_pixels: Vec<Vec<usize>>,
    pub center_pixels: Vec<Vec<usize>>,
    /// Mean slit width in pixels.
    pub pixel_widths: Vec<usize>,
}

impl PixelMaps {
    pub fn num_slits(&self) -> usize {
        self.pixel_widths.len()
    }

    /// 0-based slit index owning pixel `(x, y)`.
    pub fn slit_at(&self, x: usize, y: usize) -> Option<usize> {
        match self.slit_ids[(x, y)] {
            0 => None,
            id => Some(id as usize - 1),
        }
    }

    /// Number of pixels assigned to slit `index`.
    pub fn slit_area(&self, index: usize) -> usize {
        let id = index as u32 + 1;
        self.slit_ids.iter().filter(|&&v| v == id).count()
    }
}

/// Rasterize `slits`. A pixel belongs to a slit when its spatial coordinate
/// lies in `[left, right)`; `padding` extra pixels on both sides are claimed
/// only where no slit core is.
pub(crate) fn build(slits: &SlitSet, locations: &PixelLocations, padding: usize, trim_fraction: f64) -> PixelMaps {
    let width = locations.width();
    let height = locations.height();
    let axis = slits.spectral_axis();

    // Edge positions per row, `[row][slit] = (left, right)`.
    let bounds: Vec<Vec<(f64, f64)>> = axis
        .iter()
        .map(|&s| slits.iter().map(|slit| (slit.left.eval(s), slit.right.eval(s))).collect())
        .collect();

    let mut slit_ids = Buffer2::new_filled(width, height, 0u32);
    let mut offsets = Buffer2::new_filled(width, height, 0.0f64);
    let mut edge_mask = Buffer2::new_filled(width, height, false);
    let half_core = 0.5 - trim_fraction;

    slit_ids
        .pixels_mut()
        .par_chunks_mut(width)
        .zip(offsets.pixels_mut().par_chunks_mut(width))
        .zip(edge_mask.pixels_mut().par_chunks_mut(width))
        .enumerate()
        .for_each(|(y, ((ids, offs), mask))| {
            let row_bounds = &bounds[y];
            let pad = padding as f64 * locations.spatial_pitch(y);
            let spatial = |x: usize| locations.spatial_at(x, y);

            for (k, &(l, r)) in row_bounds.iter().enumerate() {
                if pad <= 0.0 {
                    break;
                }
                for (x, id) in ids.iter_mut().enumerate() {
                    let v = spatial(x);
                    if *id == 0 && v >= l - pad && v < r + pad {
                        *id = k as u32 + 1;
                    }
                }
            }
            for (k, &(l, r)) in row_bounds.iter().enumerate() {
                for (x, id) in ids.iter_mut().enumerate() {
                    let v = spatial(x);
                    if v >= l && v < r {
                        *id = k as u32 + 1;
                    }
                }
            }

            for x in 0..width {
                if ids[x] == 0 {
                    continue;
                }
                let (l, r) = row_bounds[ids[x] as usize - 1];
                let w = r - l;
                if w <= 0.0 {
                    continue;
                }
                let offset = (spatial(x) - 0.5 * (l + r)) / w;
                offs[x] = offset;
                mask[x] = offset.abs() > half_core;
            }
        });

    let nslits = slits.len();
    let mut left_pixels = vec![Vec::with_capacity(height); nslits];
    let mut right_pixels = vec![Vec::with_capacity(height); nslits];
    let mut center_pixels = vec![Vec::with_capacity(height); nslits];
    for (y, row_bounds) in bounds.iter().enumerate() {
        for (k, &(l, r)) in row_bounds.iter().enumerate() {
            left_pixels[k].push(locations.nearest_column(y, l));
            right_pixels[k].push(locations.nearest_column(y, r));
            center_pixels[k].push(locations.nearest_column(y, 0.5 * (l + r)));
        }
    }

    let pitch = locations.spatial_pitch(slits.ref_row());
    let pixel_widths = (0..nslits)
        .map(|k| {
            let mean = slits.widths(k).iter().sum::<f64>() / height.max(1) as f64;
            (mean / pitch).round().max(0.0) as usize
        })
        .collect();

    tracing::debug!(slits = nslits, padding, "pixel maps built");
    PixelMaps {
        slit_ids,
        offsets,
        edge_mask,
        left_pixels,
        right_pixels,
        center_pixels,
        pixel_widths,
    }
}
