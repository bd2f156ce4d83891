//! Hooks for inspecting intermediate pipeline products.

use super::edge_map::EdgeMap;
use super::slit::SlitSet;
use super::stage::Stage;
use crate::common::Buffer2;

/// Receives intermediate products as the pipeline runs. All methods default
/// to no-ops, so implementors only override what they want to inspect
/// (e.g. to dump QA images).
pub trait TraceObserver {
    /// Trace image after smoothing along the spectral axis.
    fn smoothed(&mut self, _image: &Buffer2<f32>) {}

    /// Signed significance image. Positive values mark left edges.
    fn significance(&mut self, _image: &Buffer2<f32>) {}

    /// Edge map after `stage`.
    fn edge_map(&mut self, _stage: Stage, _edges: &EdgeMap) {}

    /// Slits after `stage`.
    fn slits(&mut self, _stage: Stage, _slits: &SlitSet) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl TraceObserver for NoopObserver {}
