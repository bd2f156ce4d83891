//! Left/right synchronization: pairing edges into slits.
//!
//! Two entry points share the same left-to-right walk:
//! - [`sync`] pairs crudely traced edges before fitting (multi-slit layouts)
//!   and rewrites the edge map so that left id k pairs with right id k;
//! - [`synchronize`] pairs fitted curves, leaving a side empty where no
//!   partner exists so the extrapolator can rebuild it.
//!
//! User slit edits and order filtering also operate on the edge map here.

use std::cmp::Reverse;

use super::crude_trace::TracedEdge;
use crate::math::median_of;
use crate::slit_tracing::config::Config;
use crate::slit_tracing::constants::REMOVE_SLIT_TOL;
use crate::slit_tracing::edge_map::{EdgeLabel, EdgeMap, Side};
use crate::slit_tracing::slit::EdgeFit;

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct SyncOutcome {
    /// `(left id, right id)` of every slit.
    pub pairs: Vec<(u32, u32)>,
    pub duplicates_removed: usize,
    /// Orphan edges closed by a synthetic partner.
    pub bounded_edges: usize,
}

/// Positions on measured rows, NaN where the trace was only carried.
fn measured_positions(edge: &TracedEdge, shift: f64) -> Vec<f64> {
    edge.positions
        .iter()
        .zip(&edge.measured)
        .map(|(&p, &m)| if m { p + shift } else { f64::NAN })
        .collect()
}

fn median_separation(a: &[f64], b: &[f64]) -> f64 {
    median_of(a.iter().zip(b).map(|(x, y)| (x - y).abs())).unwrap_or(f64::INFINITY)
}

/// Pair crudely traced edges into slits and rewrite `edges` accordingly.
///
/// Only measured rows are written back, so row coverage of the rewritten
/// groups still reflects where each edge was seen.
pub(crate) fn sync(edges: &mut EdgeMap, mut traced: Vec<TracedEdge>, config: &Config) -> SyncOutcome {
    let width = edges.width();
    let height = edges.height();
    let ref_row = height / 2;

    traced.sort_by(|a, b| {
        a.positions[ref_row]
            .total_cmp(&b.positions[ref_row])
            .then(a.id.cmp(&b.id))
            .then(a.side.cmp(&b.side))
    });

    // Adjacent same-side duplicates collapse to the stronger edge.
    let mut duplicates_removed = 0;
    let mut i = 0;
    while i + 1 < traced.len() {
        let (a, b) = (&traced[i], &traced[i + 1]);
        if a.side != b.side || median_separation(&a.positions, &b.positions) >= config.duplicate_separation {
            i += 1;
            continue;
        }
        let key = |e: &TracedEdge| (e.detections, e.strength, Reverse(e.id));
        let weaker = if key(a).partial_cmp(&key(b)).is_some_and(|o| o.is_lt()) {
            i
        } else {
            i + 1
        };
        let dropped = traced.remove(weaker);
        tracing::debug!(side = %dropped.side, id = dropped.id, "duplicate edge removed");
        duplicates_removed += 1;
        i = i.saturating_sub(1);
    }

    // Walk left to right.
    let last_col = width.saturating_sub(1) as f64;
    let mut slits: Vec<(Vec<f64>, Vec<f64>)> = Vec::new();
    let mut bounded_edges = 0;
    let mut i = 0;
    while i < traced.len() {
        let edge = &traced[i];
        match edge.side {
            Side::Left => {
                if let Some(next) = traced.get(i + 1) {
                    if next.side == Side::Right {
                        slits.push((measured_positions(edge, 0.0), measured_positions(next, 0.0)));
                        i += 2;
                        continue;
                    }
                    slits.push((measured_positions(edge, 0.0), measured_positions(next, -1.0)));
                } else {
                    slits.push((measured_positions(edge, 0.0), vec![last_col; height]));
                }
                bounded_edges += 1;
            }
            Side::Right => {
                let bound = match i.checked_sub(1).map(|p| &traced[p]) {
                    Some(prev) => measured_positions(prev, 1.0),
                    None => vec![0.0; height],
                };
                slits.push((bound, measured_positions(edge, 0.0)));
                bounded_edges += 1;
            }
        }
        i += 1;
    }

    edges.clear_side(Side::Left);
    edges.clear_side(Side::Right);
    let mut pairs = Vec::with_capacity(slits.len());
    for (k, (left, right)) in slits.iter().enumerate() {
        let id = k as u32 + 1;
        edges.write_trace(EdgeLabel::left(id), left);
        edges.write_trace(EdgeLabel::right(id), right);
        pairs.push((id, id));
    }

    tracing::debug!(slits = pairs.len(), duplicates_removed, bounded_edges, "edges synchronized");
    SyncOutcome {
        pairs,
        duplicates_removed,
        bounded_edges,
    }
}

/// Insert user slits `[left, right]` (columns at the reference row) as
/// vertical edges, replacing any edge inside them. Returns the number added.
pub(crate) fn add_user_slits(edges: &mut EdgeMap, slits: &[[f64; 2]]) -> usize {
    let height = edges.height();
    let ref_row = height / 2;
    for &[left, right] in slits {
        for side in Side::BOTH {
            for (id, col) in edges.reference_columns(side, ref_row) {
                if (left..=right).contains(&col) {
                    edges.remove_group(side, id);
                }
            }
        }
        let left_id = edges.ids(Side::Left).last().map_or(1, |id| id + 1);
        let right_id = edges.ids(Side::Right).last().map_or(1, |id| id + 1);
        edges.write_trace(EdgeLabel::left(left_id), &vec![left; height]);
        edges.write_trace(EdgeLabel::right(right_id), &vec![right; height]);
        tracing::info!(left, right, "added user slit");
    }
    for side in Side::BOTH {
        edges.renumber_by_reference(side, ref_row);
    }
    slits.len()
}

/// Remove slits whose edges lie within [`REMOVE_SLIT_TOL`] of the given
/// `[left, right]` columns at the reference row. Returns the number removed.
pub(crate) fn remove_user_slits(edges: &mut EdgeMap, slits: &[[f64; 2]]) -> usize {
    let ref_row = edges.height() / 2;
    let mut removed = 0;
    for &[left, right] in slits {
        let nearest = |side: Side, target: f64| {
            edges
                .reference_columns(side, ref_row)
                .into_iter()
                .map(|(id, col)| (id, (col - target).abs()))
                .filter(|&(_, d)| d <= REMOVE_SLIT_TOL)
                .min_by(|a, b| a.1.total_cmp(&b.1))
                .map(|(id, _)| id)
        };
        match (nearest(Side::Left, left), nearest(Side::Right, right)) {
            (Some(l), Some(r)) => {
                edges.remove_group(Side::Left, l);
                edges.remove_group(Side::Right, r);
                removed += 1;
                tracing::info!(left, right, "removed user slit");
            }
            _ => tracing::warn!(left, right, "no slit matches the slit to remove"),
        }
    }
    for side in Side::BOTH {
        edges.renumber_by_reference(side, ref_row);
    }
    removed
}

/// Remove edges detected on less than `frac_ignore` of the rows. Returns the
/// number of edges removed.
pub(crate) fn ignore_orders(edges: &mut EdgeMap, frac_ignore: f64) -> usize {
    let height = edges.height();
    let ref_row = height / 2;
    let mut removed = 0;
    for side in Side::BOTH {
        for (id, pixels) in edges.groups(side) {
            let mut rows: Vec<usize> = pixels.iter().map(|&(_, y)| y).collect();
            rows.dedup();
            let coverage = rows.len() as f64 / height as f64;
            if coverage < frac_ignore {
                edges.remove_group(side, id);
                removed += 1;
                tracing::info!(%side, id, coverage, "ignoring partial order");
            }
        }
        edges.renumber_by_reference(side, ref_row);
    }
    removed
}

/// A slit before extrapolation; either side may be missing.
#[derive(Debug, Clone)]
pub(crate) struct SlitCandidate {
    pub left: Option<EdgeFit>,
    pub right: Option<EdgeFit>,
}

/// Pair fitted edges by position at `ref_spectral`, then add
/// `extrapolate = [before, after]` empty slots at the ends.
pub(crate) fn synchronize(
    left: Vec<EdgeFit>,
    right: Vec<EdgeFit>,
    ref_spectral: f64,
    extrapolate: [usize; 2],
) -> Vec<SlitCandidate> {
    let mut fits: Vec<(f64, EdgeFit)> = left
        .into_iter()
        .chain(right)
        .map(|fit| (fit.curve.eval(ref_spectral), fit))
        .collect();
    fits.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.side.cmp(&b.1.side)));

    let empty = || SlitCandidate { left: None, right: None };
    let mut candidates: Vec<SlitCandidate> = (0..extrapolate[0]).map(|_| empty()).collect();

    let mut iter = fits.into_iter().map(|(_, fit)| fit).peekable();
    while let Some(fit) = iter.next() {
        match fit.side {
            Side::Left => {
                let right = iter.next_if(|next| next.side == Side::Right);
                candidates.push(SlitCandidate {
                    left: Some(fit),
                    right,
                });
            }
            Side::Right => candidates.push(SlitCandidate {
                left: None,
                right: Some(fit),
            }),
        }
    }

    candidates.extend((0..extrapolate[1]).map(|_| empty()));
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{Curve, FunctionFamily};

    fn traced(side: Side, id: u32, col: f64, height: usize, detections: usize) -> TracedEdge {
        TracedEdge {
            side,
            id,
            positions: vec![col; height],
            measured: vec![true; height],
            detections,
            strength: detections as f64 * 10.0,
        }
    }

    #[test]
    fn test_sync_pairs_in_order() {
        let mut map = EdgeMap::new(100, 10);
        let edges = vec![
            traced(Side::Right, 2, 89.5, 10, 10),
            traced(Side::Left, 1, 9.5, 10, 10),
            traced(Side::Right, 1, 39.5, 10, 10),
            traced(Side::Left, 2, 59.5, 10, 10),
        ];
        let out = sync(&mut map, edges, &Config::default());

        assert_eq!(out.pairs, vec![(1, 1), (2, 2)]);
        assert_eq!(out.bounded_edges, 0);
        assert_eq!(map.get(10, 3), Some(EdgeLabel::left(1)));
        assert_eq!(map.get(40, 3), Some(EdgeLabel::right(1)));
        assert_eq!(map.get(60, 3), Some(EdgeLabel::left(2)));
        assert_eq!(map.get(90, 3), Some(EdgeLabel::right(2)));
    }

    #[test]
    fn test_sync_drops_weaker_duplicate() {
        let mut map = EdgeMap::new(100, 10);
        let edges = vec![
            traced(Side::Left, 1, 10.0, 10, 10),
            traced(Side::Right, 1, 40.0, 10, 4),
            traced(Side::Right, 2, 44.0, 10, 9),
        ];
        let out = sync(&mut map, edges, &Config::default());

        assert_eq!(out.duplicates_removed, 1);
        assert_eq!(out.pairs, vec![(1, 1)]);
        assert_eq!(map.get(44, 0), Some(EdgeLabel::right(1)));
        assert_eq!(map.get(40, 0), None);
    }

    #[test]
    fn test_sync_bounds_orphans() {
        let mut map = EdgeMap::new(100, 6);
        let edges = vec![
            traced(Side::Right, 1, 20.0, 6, 6),
            traced(Side::Left, 1, 50.0, 6, 6),
            traced(Side::Left, 2, 70.0, 6, 6),
        ];
        let out = sync(&mut map, edges, &Config::default());

        assert_eq!(out.pairs.len(), 3);
        assert_eq!(out.bounded_edges, 3);
        // Orphan right bounded at column 0, orphan lefts by the next edge or the border.
        assert_eq!(map.get(0, 2), Some(EdgeLabel::left(1)));
        assert_eq!(map.get(20, 2), Some(EdgeLabel::right(1)));
        assert_eq!(map.get(69, 2), Some(EdgeLabel::right(2)));
        assert_eq!(map.get(99, 2), Some(EdgeLabel::right(3)));
    }

    #[test]
    fn test_sync_writes_measured_rows_only() {
        let mut map = EdgeMap::new(100, 10);
        let mut partial = traced(Side::Left, 2, 60.0, 10, 4);
        partial.measured = (0..10).map(|y| (3..7).contains(&y)).collect();
        let edges = vec![
            traced(Side::Left, 1, 10.0, 10, 10),
            traced(Side::Right, 1, 40.0, 10, 10),
            partial,
            traced(Side::Right, 2, 90.0, 10, 10),
        ];
        sync(&mut map, edges, &Config::default());

        assert_eq!(map.get(10, 0), Some(EdgeLabel::left(1)));
        let rows: Vec<usize> = map.groups(Side::Left)[&2].iter().map(|&(_, y)| y).collect();
        assert_eq!(rows, vec![3, 4, 5, 6]);
        assert_eq!(map.groups(Side::Right)[&2].len(), 10);
    }

    fn vertical_map(width: usize, height: usize, lefts: &[usize], rights: &[usize]) -> EdgeMap {
        let mut map = EdgeMap::new(width, height);
        for y in 0..height {
            for (i, &x) in lefts.iter().enumerate() {
                map.set(x, y, Some(EdgeLabel::left(i as u32 + 1)));
            }
            for (i, &x) in rights.iter().enumerate() {
                map.set(x, y, Some(EdgeLabel::right(i as u32 + 1)));
            }
        }
        map
    }

    #[test]
    fn test_add_user_slit_replaces_inner_edges() {
        let mut map = vertical_map(100, 8, &[10, 60], &[40, 90]);
        // Covers slit 2 entirely.
        assert_eq!(add_user_slits(&mut map, &[[55.0, 95.0]]), 1);

        assert_eq!(map.ids(Side::Left), vec![1, 2]);
        assert_eq!(map.get(55, 4), Some(EdgeLabel::left(2)));
        assert_eq!(map.get(95, 4), Some(EdgeLabel::right(2)));
        assert_eq!(map.get(60, 4), None);
        assert_eq!(map.get(90, 4), None);
    }

    #[test]
    fn test_remove_user_slit_within_tolerance() {
        let mut map = vertical_map(100, 8, &[10, 60], &[40, 90]);
        assert_eq!(remove_user_slits(&mut map, &[[11.5, 38.0]]), 1);
        assert_eq!(map.ids(Side::Left), vec![1]);
        assert_eq!(map.get(60, 0), Some(EdgeLabel::left(1)));
        assert_eq!(map.get(90, 0), Some(EdgeLabel::right(1)));

        // Too far from anything.
        assert_eq!(remove_user_slits(&mut map, &[[20.0, 30.0]]), 0);
    }

    #[test]
    fn test_ignore_orders_drops_partial_edges() {
        let mut map = vertical_map(100, 20, &[10], &[40]);
        for y in 0..4 {
            map.set(70, y, Some(EdgeLabel::left(2)));
        }
        assert_eq!(ignore_orders(&mut map, 0.5), 1);
        assert_eq!(map.ids(Side::Left), vec![1]);
    }

    fn fit(side: Side, id: u32, col: f64) -> EdgeFit {
        EdgeFit {
            side,
            id,
            curve: Curve::constant(FunctionFamily::Legendre, col, (0.0, 9.0), 1),
            residuals: vec![0.0; 10],
            weights: vec![1.0; 10],
            rejected: 0,
        }
    }

    #[test]
    fn test_synchronize_leaves_missing_sides_empty() {
        let left = vec![fit(Side::Left, 1, 10.0), fit(Side::Left, 2, 60.0)];
        let right = vec![fit(Side::Right, 1, 5.0), fit(Side::Right, 2, 40.0)];
        let candidates = synchronize(left, right, 4.5, [1, 0]);

        assert_eq!(candidates.len(), 4);
        assert!(candidates[0].left.is_none() && candidates[0].right.is_none());
        assert!(candidates[1].left.is_none());
        assert_eq!(candidates[1].right.as_ref().map(|f| f.id), Some(1));
        assert_eq!(candidates[2].left.as_ref().map(|f| f.id), Some(1));
        assert_eq!(candidates[2].right.as_ref().map(|f| f.id), Some(2));
        assert_eq!(candidates[3].left.as_ref().map(|f| f.id), Some(2));
        assert!(candidates[3].right.is_none());
    }
}
