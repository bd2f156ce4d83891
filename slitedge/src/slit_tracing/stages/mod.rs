//! Pipeline stages, one module per step, in execution order.

pub(crate) mod smooth;
pub(crate) mod detect;
pub(crate) mod matching;
pub(crate) mod assign;
pub(crate) mod gap_merge;
pub(crate) mod crude_trace;
pub(crate) mod sync;
pub(crate) mod fit;
pub(crate) mod extrapolate;
pub(crate) mod trim;
pub(crate) mod pixel_maps;
