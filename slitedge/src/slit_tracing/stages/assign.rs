//! Resolution of matched edge groups into one definitive set per side.

use std::collections::{BTreeMap, HashMap};

use crate::common::Buffer2;
use crate::math::median_of;
use crate::math::polynomial::{fit_weighted, rms};
use crate::math::FunctionFamily;
use crate::slit_tracing::config::Config;
use crate::slit_tracing::constants::{ASSIGN_CONFLICT_PIXELS, ASSIGN_MERGE_RMS, MIN_GROUP_ROWS};
use crate::slit_tracing::edge_map::{EdgeMap, Side};

/// One edge group on one side.
#[derive(Debug, Clone)]
struct Group {
    id: u32,
    /// `(x, y)` in row-major order.
    pixels: Vec<(usize, usize)>,
}

impl Group {
    /// Mean detected column per row.
    fn columns_by_row(&self) -> BTreeMap<usize, f64> {
        let mut sums: BTreeMap<usize, (f64, usize)> = BTreeMap::new();
        for &(x, y) in &self.pixels {
            let e = sums.entry(y).or_insert((0.0, 0));
            e.0 += x as f64;
            e.1 += 1;
        }
        sums.into_iter().map(|(y, (s, n))| (y, s / n as f64)).collect()
    }

    fn num_rows(&self) -> usize {
        self.columns_by_row().len()
    }

    fn median_column(&self) -> f64 {
        median_of(self.pixels.iter().map(|&(x, _)| x as f64)).unwrap_or(0.0)
    }

    /// Column at `ref_row`, extrapolating a linear fit of the group when it
    /// does not reach that row.
    fn reference_position(&self, ref_row: usize, height: usize) -> f64 {
        let columns = self.columns_by_row();
        if let Some(&col) = columns.get(&ref_row) {
            return col;
        }
        let (rows, cols): (Vec<f64>, Vec<f64>) = columns.iter().map(|(&y, &x)| (y as f64, x)).unzip();
        let weights = vec![1.0; rows.len()];
        let domain = (0.0, height.saturating_sub(1) as f64);
        fit_weighted(FunctionFamily::Polynomial, domain, &rows, &cols, &weights, 1)
            .map(|curve| curve.eval(ref_row as f64))
            .unwrap_or_else(|| self.median_column())
    }

    /// Total edge strength: |significance| when available, otherwise the
    /// flux contrast across each pixel.
    fn strength(&self, binarr: &Buffer2<f32>, significance: Option<&Buffer2<f32>>) -> f64 {
        let last = binarr.width().saturating_sub(1);
        self.pixels
            .iter()
            .map(|&(x, y)| match significance {
                Some(sig) => sig[(x, y)].abs() as f64,
                None => (binarr[((x + 1).min(last), y)] - binarr[(x.saturating_sub(1), y)]).abs() as f64,
            })
            .sum()
    }
}

fn collect_groups(edges: &EdgeMap, side: Side) -> Vec<Group> {
    edges
        .groups(side)
        .into_iter()
        .map(|(id, pixels)| Group { id, pixels })
        .collect()
}

/// Two groups conflict when they are both detected on some row at clearly
/// different columns.
fn conflicts(a: &BTreeMap<usize, f64>, b: &BTreeMap<usize, f64>) -> bool {
    a.iter()
        .any(|(y, &xa)| b.get(y).is_some_and(|&xb| (xa - xb).abs() > ASSIGN_CONFLICT_PIXELS))
}

/// RMS of a joint fit over both groups, in pixels.
fn merged_fit_rms(a: &BTreeMap<usize, f64>, b: &BTreeMap<usize, f64>, height: usize, config: &Config) -> Option<f64> {
    let (rows, cols): (Vec<f64>, Vec<f64>) = a
        .iter()
        .chain(b.iter())
        .map(|(&y, &x)| (y as f64, x))
        .unzip();
    let mut distinct: Vec<usize> = a.keys().chain(b.keys()).copied().collect();
    distinct.sort_unstable();
    distinct.dedup();

    let order = config.poly_order.min(distinct.len().saturating_sub(1));
    let weights = vec![1.0; rows.len()];
    let domain = (0.0, height.saturating_sub(1) as f64);
    let curve = fit_weighted(config.function_family, domain, &rows, &cols, &weights, order)?;
    Some(rms(&curve, &rows, &cols))
}

/// Merge fragments of the same edge, drop short groups, keep the strongest
/// `number_of_slits` groups and number the rest 1..N by column at the
/// reference row. Returns N.
pub(crate) fn assign(
    binarr: &Buffer2<f32>,
    edges: &mut EdgeMap,
    side: Side,
    significance: Option<&Buffer2<f32>>,
    config: &Config,
) -> usize {
    let height = edges.height();
    let ref_row = height / 2;
    let mut groups = collect_groups(edges, side);

    if groups.len() == 1 {
        let id = groups[0].id;
        edges.relabel(side, |other| (other == id).then_some(1));
        return 1;
    }

    // Merge fragments until stable.
    let mut merges = 0usize;
    loop {
        groups.sort_by(|a, b| a.median_column().total_cmp(&b.median_column()).then(a.id.cmp(&b.id)));
        let columns: Vec<BTreeMap<usize, f64>> = groups.iter().map(Group::columns_by_row).collect();

        let candidate = (0..groups.len().saturating_sub(1)).find(|&i| {
            !conflicts(&columns[i], &columns[i + 1])
                && merged_fit_rms(&columns[i], &columns[i + 1], height, config)
                    .is_some_and(|r| r <= ASSIGN_MERGE_RMS)
        });
        let Some(i) = candidate else { break };

        let absorbed = groups.remove(i + 1);
        let keep = &mut groups[i];
        let (keep_id, absorbed_id) = (keep.id.min(absorbed.id), keep.id.max(absorbed.id));
        keep.id = keep_id;
        keep.pixels.extend(absorbed.pixels);
        keep.pixels.sort_by_key(|&(x, y)| (y, x));
        edges.relabel(side, |id| Some(if id == absorbed_id { keep_id } else { id }));
        merges += 1;
    }

    // Short groups are noise.
    let (kept, short): (Vec<Group>, Vec<Group>) = groups.into_iter().partition(|g| g.num_rows() >= MIN_GROUP_ROWS);
    for g in &short {
        edges.remove_group(side, g.id);
    }
    let mut groups = kept;

    if let Some(n) = config.number_of_slits
        && groups.len() > n
    {
        let mut ranked: Vec<(f64, usize, f64, u32)> = groups
            .iter()
            .map(|g| {
                (
                    g.strength(binarr, significance),
                    g.num_rows(),
                    g.reference_position(ref_row, height),
                    g.id,
                )
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.0.total_cmp(&a.0)
                .then(b.1.cmp(&a.1))
                .then(a.2.total_cmp(&b.2))
        });
        let weak: Vec<u32> = ranked[n..].iter().map(|r| r.3).collect();
        for &id in &weak {
            edges.remove_group(side, id);
        }
        groups.retain(|g| !weak.contains(&g.id));
    }

    // Final ids by reference-row column.
    let mut order: Vec<(f64, u32)> = groups
        .iter()
        .map(|g| (g.reference_position(ref_row, height), g.id))
        .collect();
    order.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    let mapping: HashMap<u32, u32> = order
        .iter()
        .enumerate()
        .map(|(i, &(_, id))| (id, i as u32 + 1))
        .collect();
    edges.relabel(side, |id| mapping.get(&id).copied());

    tracing::debug!(
        %side,
        groups = order.len(),
        merges,
        discarded = short.len(),
        "edges assigned"
    );
    order.len()
}

/// Collapse duplicate detections of one group within a row to a single
/// pixel: the highest |significance|, or without a significance image the
/// pixel nearest the group's previous row. Returns the number of pixels removed.
pub(crate) fn final_left_right(edges: &mut EdgeMap, significance: Option<&Buffer2<f32>>) -> usize {
    let mut removed = 0;
    for side in Side::BOTH {
        for (_, pixels) in edges.groups(side) {
            let mut by_row: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
            for &(x, y) in &pixels {
                by_row.entry(y).or_default().push(x);
            }
            let fallback = median_of(pixels.iter().map(|&(x, _)| x as f64)).unwrap_or(0.0);

            let mut previous: Option<usize> = None;
            for (y, columns) in by_row {
                let best = match (columns.len(), significance) {
                    (1, _) => columns[0],
                    (_, Some(sig)) => columns
                        .iter()
                        .copied()
                        .max_by(|&a, &b| sig[(a, y)].abs().total_cmp(&sig[(b, y)].abs()).then(b.cmp(&a)))
                        .unwrap_or(columns[0]),
                    (_, None) => {
                        let target = previous.map_or(fallback, |p| p as f64);
                        columns
                            .iter()
                            .copied()
                            .min_by(|&a, &b| {
                                (a as f64 - target)
                                    .abs()
                                    .total_cmp(&(b as f64 - target).abs())
                                    .then(a.cmp(&b))
                            })
                            .unwrap_or(columns[0])
                    }
                };
                for &x in &columns {
                    if x != best {
                        edges.set(x, y, None);
                        removed += 1;
                    }
                }
                previous = Some(best);
            }
        }
    }
    if removed > 0 {
        tracing::debug!(removed, "duplicate edge detections removed");
    }
    removed
}
