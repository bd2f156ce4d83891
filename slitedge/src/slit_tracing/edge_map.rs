//! Per-pixel edge labels.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::common::Buffer2;

/// Which side of a slit an edge bounds. Flux rises across a left edge
/// (increasing column) and falls across a right edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::Left, Side::Right];

    pub fn opposite(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Left => "left",
            Self::Right => "right",
        })
    }
}

/// Edge identity of a pixel. Ids are positive and, after assignment, numbered
/// by increasing column at the reference row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EdgeLabel {
    pub side: Side,
    pub id: u32,
}

impl EdgeLabel {
    pub fn new(side: Side, id: u32) -> Self {
        Self { side, id }
    }

    pub fn left(id: u32) -> Self {
        Self::new(Side::Left, id)
    }

    pub fn right(id: u32) -> Self {
        Self::new(Side::Right, id)
    }
}

/// Edge label raster with the same shape as the trace image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeMap {
    labels: Buffer2<Option<EdgeLabel>>,
}

impl EdgeMap {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            labels: Buffer2::new_filled(width, height, None),
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.labels.width()
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.labels.height()
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> Option<EdgeLabel> {
        *self.labels.get(x, y)
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, label: Option<EdgeLabel>) {
        *self.labels.get_mut(x, y) = label;
    }

    pub fn row(&self, y: usize) -> &[Option<EdgeLabel>] {
        self.labels.row(y)
    }

    pub fn labels(&self) -> &Buffer2<Option<EdgeLabel>> {
        &self.labels
    }

    /// Number of labelled pixels on `side`.
    pub fn count(&self, side: Side) -> usize {
        self.labels.iter().flatten().filter(|l| l.side == side).count()
    }

    /// Pixels of each group on `side`, keyed by id. Pixels are in row-major order.
    pub fn groups(&self, side: Side) -> BTreeMap<u32, Vec<(usize, usize)>> {
        let width = self.width();
        let mut groups: BTreeMap<u32, Vec<(usize, usize)>> = BTreeMap::new();
        for (idx, label) in self.labels.iter().enumerate() {
            if let Some(label) = label
                && label.side == side
            {
                groups.entry(label.id).or_default().push((idx % width, idx / width));
            }
        }
        groups
    }

    /// Sorted distinct ids on `side`.
    pub fn ids(&self, side: Side) -> Vec<u32> {
        self.groups(side).into_keys().collect()
    }

    pub fn num_groups(&self, side: Side) -> usize {
        self.groups(side).len()
    }

    /// Rewrite every id on `side`; `None` clears the pixel.
    pub fn relabel(&mut self, side: Side, mut f: impl FnMut(u32) -> Option<u32>) {
        for label in self.labels.iter_mut() {
            if let Some(l) = *label
                && l.side == side
            {
                *label = f(l.id).map(|id| EdgeLabel::new(side, id));
            }
        }
    }

    pub fn clear_side(&mut self, side: Side) {
        self.relabel(side, |_| None);
    }

    pub fn remove_group(&mut self, side: Side, id: u32) {
        self.relabel(side, |other| (other != id).then_some(other));
    }

    /// Column of each group on `side` at `ref_row`: the mean detected column
    /// there, or the column of the detection on the nearest row.
    pub fn reference_columns(&self, side: Side, ref_row: usize) -> BTreeMap<u32, f64> {
        self.groups(side)
            .into_iter()
            .filter_map(|(id, pixels)| reference_column(&pixels, ref_row).map(|c| (id, c)))
            .collect()
    }

    /// Renumber `side` to 1..N by increasing reference column (ties: lower id).
    /// Returns N.
    pub fn renumber_by_reference(&mut self, side: Side, ref_row: usize) -> usize {
        let mut order: Vec<(u32, f64)> = self.reference_columns(side, ref_row).into_iter().collect();
        order.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));

        let mapping: std::collections::HashMap<u32, u32> = order
            .iter()
            .enumerate()
            .map(|(i, &(id, _))| (id, i as u32 + 1))
            .collect();
        self.relabel(side, |id| mapping.get(&id).copied());
        order.len()
    }

    /// Write a trace of column positions (one per row, fractional allowed)
    /// as `label`. Positions are rounded and clamped onto the detector.
    pub fn write_trace(&mut self, label: EdgeLabel, positions: &[f64]) {
        debug_assert_eq!(positions.len(), self.height());
        let max_x = self.width().saturating_sub(1) as f64;
        for (y, &pos) in positions.iter().enumerate() {
            if !pos.is_finite() {
                continue;
            }
            let x = pos.round().clamp(0.0, max_x) as usize;
            self.set(x, y, Some(label));
        }
    }
}

/// See [`EdgeMap::reference_columns`]. `pixels` are `(x, y)` in row-major order.
pub(crate) fn reference_column(pixels: &[(usize, usize)], ref_row: usize) -> Option<f64> {
    let nearest_row = pixels.iter().map(|&(_, y)| y).min_by_key(|&y| (y.abs_diff(ref_row), y))?;
    let (sum, n) = pixels
        .iter()
        .filter(|&&(_, y)| y == nearest_row)
        .fold((0.0, 0usize), |(s, n), &(x, _)| (s + x as f64, n + 1));
    Some(sum / n as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_columns_use_nearest_row() {
        let mut map = EdgeMap::new(20, 10);
        map.set(4, 5, Some(EdgeLabel::left(1)));
        map.set(6, 5, Some(EdgeLabel::left(1)));
        map.set(15, 0, Some(EdgeLabel::left(2)));
        map.set(12, 8, Some(EdgeLabel::left(2)));

        let cols = map.reference_columns(Side::Left, 5);
        assert_eq!(cols[&1], 5.0);
        assert_eq!(cols[&2], 12.0);
    }

    #[test]
    fn test_renumber_by_reference() {
        let mut map = EdgeMap::new(20, 3);
        for y in 0..3 {
            map.set(15, y, Some(EdgeLabel::right(4)));
            map.set(2, y, Some(EdgeLabel::right(9)));
        }
        assert_eq!(map.renumber_by_reference(Side::Right, 1), 2);
        assert_eq!(map.get(2, 0), Some(EdgeLabel::right(1)));
        assert_eq!(map.get(15, 2), Some(EdgeLabel::right(2)));
    }

    fn sample_map() -> EdgeMap {
        let mut map = EdgeMap::new(8, 4);
        for y in 0..4 {
            map.set(1, y, Some(EdgeLabel::left(1)));
            map.set(5, y, Some(EdgeLabel::right(2)));
        }
        map.set(3, 2, Some(EdgeLabel::left(7)));
        map
    }

    #[test]
    fn test_groups_and_ids() {
        let map = sample_map();
        assert_eq!(map.ids(Side::Left), vec![1, 7]);
        assert_eq!(map.ids(Side::Right), vec![2]);
        assert_eq!(map.count(Side::Left), 5);

        let groups = map.groups(Side::Left);
        assert_eq!(groups[&1], vec![(1, 0), (1, 1), (1, 2), (1, 3)]);
        assert_eq!(groups[&7], vec![(3, 2)]);
    }

    #[test]
    fn test_relabel_only_touches_one_side() {
        let mut map = sample_map();
        map.relabel(Side::Left, |id| Some(id + 10));
        assert_eq!(map.ids(Side::Left), vec![11, 17]);
        assert_eq!(map.ids(Side::Right), vec![2]);
    }

    #[test]
    fn test_remove_group() {
        let mut map = sample_map();
        map.remove_group(Side::Left, 7);
        assert_eq!(map.get(3, 2), None);
        assert_eq!(map.num_groups(Side::Left), 1);
    }

    #[test]
    fn test_write_trace_rounds_and_clamps() {
        let mut map = EdgeMap::new(6, 3);
        map.write_trace(EdgeLabel::right(1), &[2.4, 9.0, -3.0]);
        assert_eq!(map.get(2, 0), Some(EdgeLabel::right(1)));
        assert_eq!(map.get(5, 1), Some(EdgeLabel::right(1)));
        assert_eq!(map.get(0, 2), Some(EdgeLabel::right(1)));
    }

    #[test]
    fn test_side_display_and_opposite() {
        assert_eq!(Side::Left.to_string(), "left");
        assert_eq!(Side::Right.opposite(), Side::Left);
    }
}
