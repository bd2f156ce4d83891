//! Crude row-by-row tracing of edge groups across the whole detector.

use std::collections::BTreeMap;

use crate::common::Buffer2;
use crate::slit_tracing::config::Config;
use crate::slit_tracing::constants::CRUDE_THRESHOLD_FACTOR;
use crate::slit_tracing::edge_map::{EdgeMap, Side};

/// An edge group followed over every detector row.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TracedEdge {
    pub side: Side,
    pub id: u32,
    /// Column position on every row, carried across rows without signal.
    pub positions: Vec<f64>,
    /// Rows where the position was measured rather than carried.
    pub measured: Vec<bool>,
    /// Rows with a real detection.
    pub detections: usize,
    /// Summed |significance| of the detections (detection count without
    /// a significance image).
    pub strength: f64,
}

/// Trace every group on both sides.
pub(crate) fn crude_trace(edges: &EdgeMap, significance: Option<&Buffer2<f32>>, config: &Config) -> Vec<TracedEdge> {
    let mut traced = Vec::new();
    for side in Side::BOTH {
        for (id, pixels) in edges.groups(side) {
            let mut sums: BTreeMap<usize, (f64, usize)> = BTreeMap::new();
            for &(x, y) in &pixels {
                let e = sums.entry(y).or_insert((0.0, 0));
                e.0 += x as f64;
                e.1 += 1;
            }
            let detected: BTreeMap<usize, f64> = sums.into_iter().map(|(y, (s, n))| (y, s / n as f64)).collect();
            if detected.is_empty() {
                continue;
            }

            let strength = match significance {
                Some(sig) => pixels.iter().map(|&(x, y)| sig[(x, y)].abs() as f64).sum(),
                None => detected.len() as f64,
            };

            let tracer = Tracer {
                side,
                significance,
                detected: &detected,
                max_shift: config.max_shift,
                radius: config.max_shift.ceil() as isize + 1,
                threshold: config.sigdetect * CRUDE_THRESHOLD_FACTOR,
            };
            let (positions, measured) = tracer.trace(edges.height());

            traced.push(TracedEdge {
                side,
                id,
                positions,
                measured,
                detections: detected.len(),
                strength,
            });
        }
    }
    tracing::debug!(edges = traced.len(), "crude tracing done");
    traced
}

struct Tracer<'a> {
    side: Side,
    significance: Option<&'a Buffer2<f32>>,
    detected: &'a BTreeMap<usize, f64>,
    max_shift: f64,
    radius: isize,
    threshold: f32,
}

impl Tracer<'_> {
    fn trace(&self, height: usize) -> (Vec<f64>, Vec<bool>) {
        let (start_row, start_col) = self.start();
        let start = self.measure(start_row, start_col).unwrap_or(start_col);

        let mut positions = vec![0.0; height];
        let mut measured = vec![false; height];
        positions[start_row] = start;

        let mut prev = start;
        for y in start_row + 1..height {
            let (pos, found) = self.step(y, prev);
            (positions[y], measured[y]) = (pos, found);
            prev = pos;
        }
        prev = start;
        for y in (0..start_row).rev() {
            let (pos, found) = self.step(y, prev);
            (positions[y], measured[y]) = (pos, found);
            prev = pos;
        }

        for &y in self.detected.keys() {
            measured[y] = true;
        }
        (positions, measured)
    }

    /// Strongest detection (earliest row on ties), or the middle detection
    /// row without a significance image.
    fn start(&self) -> (usize, f64) {
        match self.significance {
            Some(sig) => {
                let mut best: Option<(usize, f64, f32)> = None;
                for (&y, &x) in self.detected {
                    let s = sig[(x.round() as usize, y)].abs();
                    if best.is_none_or(|(_, _, b)| s > b) {
                        best = Some((y, x, s));
                    }
                }
                best.map(|(y, x, _)| (y, x)).unwrap_or((0, 0.0))
            }
            None => {
                let mid = self.detected.len() / 2;
                self.detected
                    .iter()
                    .nth(mid)
                    .map(|(&y, &x)| (y, x))
                    .unwrap_or((0, 0.0))
            }
        }
    }

    /// Next position and whether row `y` had any signal.
    fn step(&self, y: usize, prev: f64) -> (f64, bool) {
        match self.measure(y, prev) {
            Some(pos) => (prev + (pos - prev).clamp(-self.max_shift, self.max_shift), true),
            None => (prev, false),
        }
    }

    /// Edge position on row `y` near `around`: the significance-weighted
    /// centroid of same-side pixels above threshold, or the detection
    /// itself without a significance image.
    fn measure(&self, y: usize, around: f64) -> Option<f64> {
        let Some(sig) = self.significance else {
            return self.detected.get(&y).copied();
        };

        let row = sig.row(y);
        let center = around.round() as isize;
        let lo = (center - self.radius).max(0) as usize;
        let hi = ((center + self.radius).max(-1) + 1).min(row.len() as isize) as usize;

        let mut sum_w = 0.0f64;
        let mut sum_wx = 0.0f64;
        for x in lo..hi.max(lo) {
            let s = match self.side {
                Side::Left => row[x],
                Side::Right => -row[x],
            };
            if s >= self.threshold {
                sum_w += s as f64;
                sum_wx += s as f64 * x as f64;
            }
        }
        (sum_w > 0.0).then(|| sum_wx / sum_w)
    }
}
