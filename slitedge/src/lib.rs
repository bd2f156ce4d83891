//! Slitedge - slit edge tracing for spectrograph calibration frames.
//!
//! Finds the left and right edges of every slit (or echelle order) in an
//! evenly illuminated trace image, fits each edge with a smooth curve and
//! rasterizes the result into per-pixel slit maps.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use slitedge::{SlitTraceConfig, SlitTracer, TraceFrame};
//!
//! let tracer = SlitTracer::from_config(SlitTraceConfig::multi_slit())?;
//! let outcome = tracer.trace(&TraceFrame::new(image), 0.2)?;
//!
//! if let Some(result) = outcome.result() {
//!     for (i, slit) in result.slits.iter().enumerate() {
//!         let at = result.slits.ref_spectral();
//!         println!("slit {i}: {:.1}..{:.1}", slit.left.eval(at), slit.right.eval(at));
//!     }
//! }
//! ```

pub(crate) mod common;
pub(crate) mod math;
pub(crate) mod slit_tracing;
pub mod synthetic;

#[cfg(test)]
pub mod testing;

// ============================================================================
// Slit tracing
// ============================================================================

pub use slit_tracing::{
    // Main API
    Diagnostics as SlitTraceDiagnostics,
    SlitTraceResult,
    SlitTracer,
    TraceFrame,
    TraceOutcome,
    // Configuration
    Config as SlitTraceConfig,
    PcaMode,
    SobelMode,
    // Errors
    ConfigError,
    Error,
    Result,
    // Pipeline data
    EdgeFit,
    EdgeLabel,
    EdgeMap,
    FitFailure,
    PixelLocations,
    PixelMaps,
    RunLog,
    Side,
    Slit,
    SlitSet,
    Stage,
    TrimDrop,
    TrimReason,
    // Inspection hooks
    NoopObserver,
    TraceObserver,
};

pub use slit_tracing::{
    ASSIGN_MERGE_RMS, MAX_REJECT_ITERATIONS, MIN_REJECT_PIXELS, REJECT_SIGMA, REMOVE_SLIT_TOL, SOBEL_NOISE_FLOOR,
};

// ============================================================================
// Curves
// ============================================================================

pub use crate::common::Buffer2;
pub use crate::math::{Curve, FunctionFamily};
