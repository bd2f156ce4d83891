//! Final consistency pass over the fitted slits.

use serde::{Deserialize, Serialize};

use crate::math::median_of;
use crate::slit_tracing::config::Config;
use crate::slit_tracing::slit::{Slit, SlitSet};

/// Why a slit was removed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TrimReason {
    /// Entirely beyond one of the detector boundaries.
    OffDetector,
    /// Left edge at or beyond the right edge on some row.
    Degenerate { row: usize },
    /// Median width below `min_slit_width`.
    TooNarrow { width_arcsec: f64 },
    /// Overlaps the kept slit with this index in the input order.
    Overlaps { other: usize },
}

/// A removed slit, identified by its input index and reference-row center.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrimDrop {
    pub index: usize,
    pub center: f64,
    pub reason: TrimReason,
}

#[derive(Debug, Clone)]
pub(crate) struct TrimOutcome {
    pub slits: SlitSet,
    pub dropped: Vec<TrimDrop>,
}

/// First row where the left edge is at or beyond the right edge.
fn first_crossing(left: &[f64], right: &[f64]) -> Option<usize> {
    left.iter().zip(right).position(|(l, r)| l >= r)
}

/// Degeneracy check alone, for slits that skip the full trim.
pub(crate) fn degenerate(index: usize, slit: &Slit, axis: &[f64], ref_s: f64) -> Option<TrimDrop> {
    let row = first_crossing(&slit.left.eval_many(axis), &slit.right.eval_many(axis))?;
    let reason = TrimReason::Degenerate { row };
    let center = slit.center(ref_s);
    tracing::warn!(index, center, ?reason, "slit dropped");
    Some(TrimDrop { index, center, reason })
}

/// Drop slits that cannot be real. `bounds` is the spatial extent of the
/// detector. The surviving order is preserved.
pub(crate) fn trim(set: SlitSet, plate_scale: f64, bounds: (f64, f64), config: &Config) -> TrimOutcome {
    let axis = set.spectral_axis().to_vec();
    let ref_row = set.ref_row();
    let ref_s = set.ref_spectral();

    let mut dropped = Vec::new();
    let mut record = |index: usize, slit: &Slit, reason: TrimReason| {
        tracing::warn!(index, center = slit.center(ref_s), ?reason, "slit dropped");
        dropped.push(TrimDrop {
            index,
            center: slit.center(ref_s),
            reason,
        });
    };

    // Predicates on single slits.
    let mut survivors: Vec<(usize, Slit, Vec<f64>, Vec<f64>)> = Vec::new();
    for (index, slit) in set.into_slits().into_iter().enumerate() {
        let left = slit.left.eval_many(&axis);
        let right = slit.right.eval_many(&axis);

        if left.iter().all(|&l| l > bounds.1) || right.iter().all(|&r| r < bounds.0) {
            record(index, &slit, TrimReason::OffDetector);
            continue;
        }
        if let Some(row) = first_crossing(&left, &right) {
            record(index, &slit, TrimReason::Degenerate { row });
            continue;
        }
        if config.trim_short_slits {
            let width = median_of(left.iter().zip(&right).map(|(l, r)| r - l)).unwrap_or(0.0);
            let width_arcsec = width * plate_scale;
            if width_arcsec < config.min_slit_width {
                record(index, &slit, TrimReason::TooNarrow { width_arcsec });
                continue;
            }
        }
        survivors.push((index, slit, left, right));
    }

    // Overlaps between neighbours. The extrapolated slit gives way, otherwise
    // the later one. A slit that displaced its predecessor is checked again
    // against the one before.
    let mut kept: Vec<(usize, Slit, Vec<f64>, Vec<f64>)> = Vec::with_capacity(survivors.len());
    for current in survivors {
        loop {
            let overlap = kept.last().and_then(|prev| {
                let overlaps = current.2.iter().zip(&prev.3).any(|(l, r)| l < r);
                overlaps.then_some((prev.0, prev.1.extrapolated))
            });
            match overlap {
                None => {
                    kept.push(current);
                    break;
                }
                Some((_, true)) if !current.1.extrapolated => {
                    if let Some((index, slit, _, _)) = kept.pop() {
                        record(index, &slit, TrimReason::Overlaps { other: current.0 });
                    }
                }
                Some((other, _)) => {
                    record(current.0, &current.1, TrimReason::Overlaps { other });
                    break;
                }
            }
        }
    }

    if !dropped.is_empty() {
        tracing::info!(kept = kept.len(), dropped = dropped.len(), "slits trimmed");
    }
    let slits = kept.into_iter().map(|(_, slit, _, _)| slit).collect();
    TrimOutcome {
        slits: SlitSet::new(slits, axis, ref_row),
        dropped,
    }
}
