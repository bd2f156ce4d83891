//! Slit edge tracing for spectrograph calibration frames.
//!
//! Given an evenly illuminated trace image (rows along the spectral axis,
//! columns along the spatial axis), finds the left and right boundary of every
//! slit or echelle order and describes each as a smooth curve.
//!
//! # Algorithm Overview
//!
//! 1. **Smoothing**: moving average along the spectral axis only.
//!
//! 2. **Edge detection**: Sobel derivative of the square-rooted image along the
//!    spatial axis, divided by a robust noise estimate. Rising flux above
//!    `sigdetect` marks a left edge, falling flux a right edge.
//!
//! 3. **Matching and assignment**: connect detections row to row into edge
//!    groups, merge fragments of the same physical edge and number the edges
//!    1..N per side by column at the reference row (`height / 2`).
//!
//! 4. **Synchronization**: follow every edge across the detector and pair
//!    left and right edges into slits, closing orphans with synthetic edges.
//!
//! 5. **Fitting**: robust polynomial fit of spatial against spectral position
//!    per edge, in physical coordinates.
//!
//! 6. **Extrapolation**: rebuild missing or poorly traced edges from the
//!    shared curvature pattern of the good ones (PCA).
//!
//! 7. **Trimming and pixel maps**: drop impossible slits and rasterize the
//!    rest into per-pixel slit ids, offsets and edge masks.

mod config;
mod constants;
mod edge_map;
mod error;
mod observer;
mod pixel_locations;
mod slit;
mod stage;
pub(crate) mod stages;
mod tracer;


// Main API
pub use tracer::{Diagnostics, SlitTraceResult, SlitTracer, TraceFrame, TraceOutcome};

// Configuration
pub use config::{Config, PcaMode, SobelMode};
pub use constants::{
    ASSIGN_MERGE_RMS, MAX_REJECT_ITERATIONS, MIN_REJECT_PIXELS, REJECT_SIGMA, REMOVE_SLIT_TOL, SOBEL_NOISE_FLOOR,
};

// Errors
pub use error::{ConfigError, Error, Result};

// Pipeline data
pub use edge_map::{EdgeLabel, EdgeMap, Side};
pub use pixel_locations::PixelLocations;
pub use slit::{EdgeFit, Slit, SlitSet};
pub use stage::{RunLog, Stage};
pub use stages::fit::FitFailure;
pub use stages::pixel_maps::PixelMaps;
pub use stages::trim::{TrimDrop, TrimReason};

// Inspection hooks
pub use observer::{NoopObserver, TraceObserver};
