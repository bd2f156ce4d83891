//! Optional merging of edges separated by small gaps.
//!
//! All groups are laid out in one side-less sequence ordered by column.
//! Neighbours closer than `max_gap` merge: a same-side pair becomes one edge,
//! a right edge followed by a left edge (two abutting slits) becomes a shared
//! boundary at the darkest column between them.

use std::collections::BTreeMap;

use crate::common::Buffer2;
use crate::math::median_of;
use crate::math::polynomial::fit_weighted;
use crate::slit_tracing::config::Config;
use crate::slit_tracing::edge_map::{EdgeLabel, EdgeMap, Side};

#[derive(Debug, Clone)]
struct SequenceEntry {
    side: Side,
    id: u32,
    columns: BTreeMap<usize, f64>,
}

impl SequenceEntry {
    fn median_column(&self) -> f64 {
        median_of(self.columns.values().copied()).unwrap_or(0.0)
    }

    /// Median separation to `other` over the rows both cover.
    fn separation(&self, other: &Self) -> Option<f64> {
        median_of(
            self.columns
                .iter()
                .filter_map(|(y, &a)| other.columns.get(y).map(|&b| (b - a).abs())),
        )
    }
}

/// Merge edges closer than `max_gap` pixels. Returns the number of merges.
pub(crate) fn close_gaps(binarr: &Buffer2<f32>, edges: &mut EdgeMap, max_gap: f64, config: &Config) -> usize {
    let mut sequence: Vec<SequenceEntry> = Side::BOTH
        .iter()
        .flat_map(|&side| {
            edges.groups(side).into_iter().map(move |(id, pixels)| {
                let mut sums: BTreeMap<usize, (f64, usize)> = BTreeMap::new();
                for (x, y) in pixels {
                    let e = sums.entry(y).or_insert((0.0, 0));
                    e.0 += x as f64;
                    e.1 += 1;
                }
                SequenceEntry {
                    side,
                    id,
                    columns: sums.into_iter().map(|(y, (s, n))| (y, s / n as f64)).collect(),
                }
            })
        })
        .collect();
    sequence.sort_by(|a, b| a.median_column().total_cmp(&b.median_column()));

    let mut merges = 0;
    let mut i = 0;
    while i + 1 < sequence.len() {
        let close = sequence[i]
            .separation(&sequence[i + 1])
            .is_some_and(|sep| sep < max_gap);
        if !close {
            i += 1;
            continue;
        }

        match (sequence[i].side, sequence[i + 1].side) {
            (a, b) if a == b => {
                let absorbed = sequence.remove(i + 1);
                let keep = &mut sequence[i];
                let keep_id = keep.id;
                edges.relabel(a, |id| Some(if id == absorbed.id { keep_id } else { id }));
                for (y, x) in absorbed.columns {
                    keep.columns.entry(y).or_insert(x);
                }
                merges += 1;
            }
            (Side::Right, Side::Left) => {
                if shared_boundary(binarr, edges, &sequence[i], &sequence[i + 1], config) {
                    merges += 1;
                }
                i += 2;
            }
            _ => i += 1,
        }
    }

    let ref_row = edges.height() / 2;
    for side in Side::BOTH {
        edges.renumber_by_reference(side, ref_row);
    }
    if merges > 0 {
        tracing::info!(merges, max_gap, "merged closely spaced edges");
    }
    merges
}

/// Replace a right edge and the following left edge by a common boundary:
/// right edge on the darkest column between them, left edge one column further.
fn shared_boundary(
    binarr: &Buffer2<f32>,
    edges: &mut EdgeMap,
    right: &SequenceEntry,
    left: &SequenceEntry,
    config: &Config,
) -> bool {
    let (rows, cols): (Vec<f64>, Vec<f64>) = right
        .columns
        .iter()
        .filter_map(|(&y, &xr)| {
            let xl = *left.columns.get(&y)?;
            let (lo, hi) = (xr.min(xl).round() as usize, xr.max(xl).round() as usize);
            let row = binarr.row(y);
            let darkest = (lo..=hi.min(row.len() - 1)).min_by(|&a, &b| row[a].total_cmp(&row[b]))?;
            Some((y as f64, darkest as f64))
        })
        .unzip();
    if rows.is_empty() {
        return false;
    }

    let order = config.poly_order.min(rows.len() - 1);
    let domain = (0.0, edges.height().saturating_sub(1) as f64);
    let Some(curve) = fit_weighted(config.function_family, domain, &rows, &cols, &vec![1.0; rows.len()], order)
    else {
        return false;
    };

    let mut covered: Vec<usize> = right.columns.keys().chain(left.columns.keys()).copied().collect();
    covered.sort_unstable();
    covered.dedup();

    edges.remove_group(Side::Right, right.id);
    edges.remove_group(Side::Left, left.id);

    let max_x = edges.width().saturating_sub(1) as f64;
    for y in covered {
        let x = curve.eval(y as f64).round().clamp(0.0, max_x);
        edges.set(x as usize, y, Some(EdgeLabel::right(right.id)));
        let next = (x + 1.0).min(max_x) as usize;
        edges.set(next, y, Some(EdgeLabel::left(left.id)));
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abutting_slits_share_boundary() {
        // Slit A bright on [5, 20), slit B on [23, 40), dark gap on columns 20..23.
        let binarr = Buffer2::from_fn(50, 10, |x, _| {
            if (5..20).contains(&x) || (23..40).contains(&x) {
                100.0
            } else if x == 21 {
                0.0
            } else {
                10.0
            }
        });
        let mut map = EdgeMap::new(50, 10);
        for y in 0..10 {
            map.set(5, y, Some(EdgeLabel::left(1)));
            map.set(20, y, Some(EdgeLabel::right(1)));
            map.set(23, y, Some(EdgeLabel::left(2)));
            map.set(40, y, Some(EdgeLabel::right(2)));
        }

        let merges = close_gaps(&binarr, &mut map, 4.0, &Config::default());
        assert_eq!(merges, 1);
        for y in 0..10 {
            assert_eq!(map.get(21, y), Some(EdgeLabel::right(1)));
            assert_eq!(map.get(22, y), Some(EdgeLabel::left(2)));
            assert_eq!(map.get(20, y), None);
            assert_eq!(map.get(23, y), None);
        }
    }

    #[test]
    fn test_same_side_neighbours_merge() {
        let binarr = Buffer2::new_filled(50, 10, 0.0);
        let mut map = EdgeMap::new(50, 10);
        for y in 0..10 {
            map.set(10, y, Some(EdgeLabel::left(1)));
            map.set(12, y, Some(EdgeLabel::left(2)));
            map.set(30, y, Some(EdgeLabel::right(1)));
        }

        let merges = close_gaps(&binarr, &mut map, 4.0, &Config::default());
        assert_eq!(merges, 1);
        assert_eq!(map.ids(Side::Left), vec![1]);
        assert_eq!(map.get(12, 3), Some(EdgeLabel::left(1)));
    }

    #[test]
    fn test_distant_edges_untouched() {
        let binarr = Buffer2::new_filled(50, 10, 0.0);
        let mut map = EdgeMap::new(50, 10);
        for y in 0..10 {
            map.set(10, y, Some(EdgeLabel::left(1)));
            map.set(30, y, Some(EdgeLabel::right(1)));
        }
        let before = map.clone();
        assert_eq!(close_gaps(&binarr, &mut map, 4.0, &Config::default()), 0);
        assert_eq!(map, before);
    }
}
