//! Grouping of raw edge pixels into numbered edge traces.
//!
//! Detections are connected row to row (same side, |Δcolumn| ≤ 1) with a
//! union-find over provisional labels:
//! - merge: two groups reaching the same pixel join, the earlier-created
//!   (smaller) label wins;
//! - split: when several pixels continue one group, the one nearest the
//!   parent keeps it and the others open new groups.

use std::collections::HashMap;

use crate::slit_tracing::edge_map::{EdgeLabel, EdgeMap, Side};
use crate::slit_tracing::error::{Error, Result};

/// Group counts per side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct EdgeCounts {
    pub left: usize,
    pub right: usize,
}

impl EdgeCounts {
    pub fn get(&self, side: Side) -> usize {
        match side {
            Side::Left => self.left,
            Side::Right => self.right,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.left == 0 && self.right == 0
    }
}

/// Give every raw detection a group id, 1..N per side in creation order.
pub(crate) fn match_edges(edges: &mut EdgeMap, budget: usize) -> Result<EdgeCounts> {
    let left = label_side(edges, Side::Left, budget)?;
    let right = label_side(edges, Side::Right, budget)?;
    tracing::debug!(left, right, "edge groups matched");
    Ok(EdgeCounts { left, right })
}

/// Bound slits cut by the detector border: a leading right edge gets a left
/// edge at column 0, a trailing left edge gets a right edge at the last column.
pub(crate) fn add_left_right(edges: &mut EdgeMap, counts: EdgeCounts, ref_row: usize) -> EdgeCounts {
    if counts.is_empty() {
        return counts;
    }

    let mut ordered: Vec<(f64, Side)> = Side::BOTH
        .iter()
        .flat_map(|&side| {
            edges
                .reference_columns(side, ref_row)
                .into_values()
                .map(move |col| (col, side))
        })
        .collect();
    ordered.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

    let mut counts = counts;
    let height = edges.height();
    if let Some(&(_, Side::Right)) = ordered.first() {
        counts.left += 1;
        edges.write_trace(EdgeLabel::left(counts.left as u32), &vec![0.0; height]);
        tracing::debug!("slit cut by the left detector border, added left edge");
    }
    if let Some(&(_, Side::Left)) = ordered.last() {
        counts.right += 1;
        let last = edges.width().saturating_sub(1) as f64;
        edges.write_trace(EdgeLabel::right(counts.right as u32), &vec![last; height]);
        tracing::debug!("slit cut by the right detector border, added right edge");
    }
    counts
}

fn label_side(edges: &mut EdgeMap, side: Side, budget: usize) -> Result<usize> {
    let width = edges.width();
    let height = edges.height();

    let mut provisional = vec![0u32; width * height];
    let mut uf = UnionFind::new();
    let mut prev: Vec<usize> = Vec::new();

    for y in 0..height {
        let cur: Vec<usize> = edges
            .row(y)
            .iter()
            .enumerate()
            .filter(|(_, l)| l.is_some_and(|l| l.side == side))
            .map(|(x, _)| x)
            .collect();

        // Connected parents of each pixel; merge them.
        let mut roots: Vec<Option<(u32, usize)>> = Vec::with_capacity(cur.len());
        for &x in &cur {
            let mut best: Option<(u32, usize)> = None;
            for &px in prev.iter().filter(|&&px| px.abs_diff(x) <= 1) {
                let label = provisional[(y - 1) * width + px];
                let distance = px.abs_diff(x);
                best = match best {
                    None => Some((label, distance)),
                    Some((other, d)) => {
                        uf.union(label, other);
                        Some((other, d.min(distance)))
                    }
                };
            }
            roots.push(best);
        }

        // One continuation per group: the nearest pixel (lowest column on ties).
        let mut owner: HashMap<u32, (usize, usize)> = HashMap::new();
        for (i, root) in roots.iter().enumerate() {
            if let Some((label, distance)) = *root {
                let root = uf.find(label);
                owner
                    .entry(root)
                    .and_modify(|(idx, d)| {
                        if distance < *d {
                            *idx = i;
                            *d = distance;
                        }
                    })
                    .or_insert((i, distance));
            }
        }

        for (i, &x) in cur.iter().enumerate() {
            let label = match roots[i] {
                Some((label, _)) => {
                    let root = uf.find(label);
                    if owner.get(&root).is_some_and(|&(idx, _)| idx == i) {
                        root
                    } else {
                        uf.make_set()
                    }
                }
                None => uf.make_set(),
            };
            provisional[y * width + x] = label;
        }
        prev = cur;
    }

    let count = uf.flatten_labels(&mut provisional);
    if count > budget {
        return Err(Error::EdgeBudgetExceeded { side, count, budget });
    }

    for (idx, &label) in provisional.iter().enumerate() {
        if label != 0 {
            edges.set(idx % width, idx / width, Some(EdgeLabel::new(side, label)));
        }
    }
    Ok(count)
}

// ============================================================================
// Union-Find
// ============================================================================

/// Sequential union-find over provisional labels 1..n.
#[derive(Debug)]
struct UnionFind {
    parent: Vec<u32>,
    next_label: u32,
}

impl UnionFind {
    fn new() -> Self {
        Self {
            parent: Vec::with_capacity(256),
            next_label: 1,
        }
    }

    #[inline]
    fn make_set(&mut self) -> u32 {
        let label = self.next_label;
        self.parent.push(label);
        self.next_label += 1;
        label
    }

    /// Find root with path compression.
    fn find(&mut self, label: u32) -> u32 {
        let mut root = label;
        while self.parent[(root - 1) as usize] != root {
            root = self.parent[(root - 1) as usize];
        }

        let mut current = label;
        while current != root {
            let next = self.parent[(current - 1) as usize];
            self.parent[(current - 1) as usize] = root;
            current = next;
        }
        root
    }

    /// Join two sets; the smaller (earlier) root survives.
    fn union(&mut self, a: u32, b: u32) {
        let root_a = self.find(a);
        let root_b = self.find(b);
        if root_a != root_b {
            let (smaller, larger) = if root_a < root_b {
                (root_a, root_b)
            } else {
                (root_b, root_a)
            };
            self.parent[(larger - 1) as usize] = smaller;
        }
    }

    /// Rewrite labels to sequential 1..n in root creation order. Returns n.
    fn flatten_labels(&mut self, labels: &mut [u32]) -> usize {
        let len = self.parent.len();
        let mut label_map = vec![0u32; len + 1];
        let mut num_labels = 0u32;

        for i in 1..=len as u32 {
            let root = self.find(i);
            if label_map[root as usize] == 0 {
                num_labels += 1;
                label_map[root as usize] = num_labels;
            }
            label_map[i as usize] = label_map[root as usize];
        }

        for l in labels.iter_mut() {
            if *l != 0 {
                *l = label_map[*l as usize];
            }
        }
        num_labels as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map_with(width: usize, height: usize, pixels: &[(usize, usize, Side)]) -> EdgeMap {
        let mut map = EdgeMap::new(width, height);
        for &(x, y, side) in pixels {
            map.set(x, y, Some(EdgeLabel::new(side, 0)));
        }
        map
    }

    #[test]
    fn test_vertical_traces_get_separate_ids() {
        let pixels: Vec<_> = (0..10)
            .flat_map(|y| [(5, y, Side::Left), (20, y, Side::Left), (12, y, Side::Right)])
            .collect();
        let mut map = map_with(30, 10, &pixels);

        let counts = match_edges(&mut map, 100).unwrap();
        assert_eq!(counts, EdgeCounts { left: 2, right: 1 });
        assert_eq!(map.get(5, 9), Some(EdgeLabel::left(1)));
        assert_eq!(map.get(20, 0), Some(EdgeLabel::left(2)));
        assert_eq!(map.get(12, 4), Some(EdgeLabel::right(1)));
    }

    #[test]
    fn test_diagonal_steps_stay_connected() {
        let pixels: Vec<_> = (0..8).map(|y| (3 + y, y, Side::Right)).collect();
        let mut map = map_with(20, 8, &pixels);
        let counts = match_edges(&mut map, 100).unwrap();
        assert_eq!(counts.right, 1);
    }

    #[test]
    fn test_merge_keeps_earlier_id() {
        // Two branches (created at x=2 then x=6) converge onto x=4.
        let mut pixels = vec![
            (2, 0, Side::Left),
            (6, 0, Side::Left),
            (3, 1, Side::Left),
            (5, 1, Side::Left),
            (4, 2, Side::Left),
        ];
        pixels.extend((3..6).map(|y| (4, y, Side::Left)));
        let mut map = map_with(10, 6, &pixels);

        let counts = match_edges(&mut map, 100).unwrap();
        assert_eq!(counts.left, 1);
        assert_eq!(map.ids(Side::Left), vec![1]);
    }

    #[test]
    fn test_split_nearest_branch_keeps_id() {
        // A trace at x=10 forks at y=3: the straight branch bends to x=9,
        // the other runs off to the right.
        let mut pixels: Vec<_> = (0..4).map(|y| (10, y, Side::Left)).collect();
        pixels.extend([(9, 4, Side::Left), (9, 5, Side::Left)]);
        pixels.extend([(11, 3, Side::Left), (12, 4, Side::Left), (13, 5, Side::Left)]);
        let mut map = map_with(20, 6, &pixels);

        let counts = match_edges(&mut map, 100).unwrap();
        assert_eq!(counts.left, 2);
        assert_eq!(map.get(9, 5), Some(EdgeLabel::left(1)));
        assert_eq!(map.get(13, 5), Some(EdgeLabel::left(2)));
    }

    #[test]
    fn test_budget_exceeded() {
        let pixels: Vec<_> = (0..6).map(|i| (i * 4, (i % 2) * 3, Side::Right)).collect();
        let mut map = map_with(30, 6, &pixels);
        let err = match_edges(&mut map, 5).unwrap_err();
        assert!(matches!(
            err,
            Error::EdgeBudgetExceeded {
                side: Side::Right,
                count: 6,
                budget: 5
            }
        ));
    }

    #[test]
    fn test_add_left_right_bounds_border_slits() {
        // Right edge at 8 (slit cut at the left border), left edge at 40
        // (slit cut at the right border).
        let pixels: Vec<_> = (0..5).flat_map(|y| [(8, y, Side::Right), (40, y, Side::Left)]).collect();
        let mut map = map_with(50, 5, &pixels);
        let counts = match_edges(&mut map, 100).unwrap();
        let counts = add_left_right(&mut map, counts, 2);

        assert_eq!(counts, EdgeCounts { left: 2, right: 2 });
        assert_eq!(map.get(0, 3), Some(EdgeLabel::left(2)));
        assert_eq!(map.get(49, 3), Some(EdgeLabel::right(2)));
    }

    #[test]
    fn test_add_left_right_noop_for_closed_slits() {
        let pixels: Vec<_> = (0..5).flat_map(|y| [(8, y, Side::Left), (20, y, Side::Right)]).collect();
        let mut map = map_with(30, 5, &pixels);
        let counts = match_edges(&mut map, 100).unwrap();
        assert_eq!(add_left_right(&mut map, counts, 2), counts);
    }
}
