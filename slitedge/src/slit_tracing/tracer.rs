//! The slit tracer and its input/output types.

use std::borrow::Cow;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::common::Buffer2;

use super::config::{Config, PcaMode};
use super::edge_map::{EdgeMap, Side};
use super::error::{ConfigError, Error, Result};
use super::observer::{NoopObserver, TraceObserver};
use super::pixel_locations::PixelLocations;
use super::slit::{Slit, SlitSet};
use super::stage::{RunLog, Stage};
use super::stages::assign::{assign, final_left_right};
use super::stages::crude_trace::crude_trace;
use super::stages::detect::{detect, single_slit};
use super::stages::extrapolate::{ExtrapolationInput, extrapolator_for};
use super::stages::fit::{FitFailure, fit_edges};
use super::stages::gap_merge::close_gaps;
use super::stages::matching::{add_left_right, match_edges};
use super::stages::pixel_maps::{PixelMaps, build};
use super::stages::smooth::smooth;
use super::stages::sync::{add_user_slits, ignore_orders, remove_user_slits, sync, synchronize};
use super::stages::trim::{TrimDrop, degenerate, trim};

// =============================================================================
// Input
// =============================================================================

/// A trace image with its optional companions.
///
/// Rows run along the spectral axis, columns along the spatial axis.
#[derive(Debug, Clone)]
pub struct TraceFrame {
    pub image: Buffer2<f32>,
    /// Physical pixel coordinates; pixel indices when absent.
    pub pixel_locations: Option<PixelLocations>,
    /// `true` marks pixels to ignore during edge detection.
    pub bad_pixels: Option<Buffer2<bool>>,
}

impl TraceFrame {
    pub fn new(image: Buffer2<f32>) -> Self {
        Self {
            image,
            pixel_locations: None,
            bad_pixels: None,
        }
    }

    pub fn with_pixel_locations(mut self, locations: PixelLocations) -> Self {
        self.pixel_locations = Some(locations);
        self
    }

    pub fn with_bad_pixels(mut self, mask: Buffer2<bool>) -> Self {
        self.bad_pixels = Some(mask);
        self
    }

    pub fn width(&self) -> usize {
        self.image.width()
    }

    pub fn height(&self) -> usize {
        self.image.height()
    }

    /// Check that the image is non-empty and the companions match its shape.
    pub fn validate(&self) -> Result<()> {
        let shape = (self.width(), self.height());
        if shape.0 == 0 || shape.1 == 0 {
            return Err(Error::EmptyImage {
                width: shape.0,
                height: shape.1,
            });
        }
        if let Some(loc) = &self.pixel_locations
            && (loc.width(), loc.height()) != shape
        {
            return Err(Error::ShapeMismatch {
                what: "pixel locations",
                expected: shape,
                actual: (loc.width(), loc.height()),
            });
        }
        if let Some(mask) = &self.bad_pixels
            && !mask.same_shape(&self.image)
        {
            return Err(Error::ShapeMismatch {
                what: "bad pixel mask",
                expected: shape,
                actual: (mask.width(), mask.height()),
            });
        }
        Ok(())
    }

    fn locations(&self) -> Cow<'_, PixelLocations> {
        match &self.pixel_locations {
            Some(loc) => Cow::Borrowed(loc),
            None => Cow::Owned(PixelLocations::unit(self.width(), self.height())),
        }
    }
}

// =============================================================================
// Output
// =============================================================================

/// Counts and non-fatal events collected along the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    /// Raw edge pixels above threshold.
    pub left_candidates: usize,
    pub right_candidates: usize,
    /// Edge groups after assignment.
    pub left_edges: usize,
    pub right_edges: usize,
    /// Edge pairs merged by gap closing.
    pub gap_merges: usize,
    /// Duplicate edges removed during synchronization.
    pub duplicates_removed: usize,
    /// Orphan edges closed by a synthetic partner during synchronization.
    pub bounded_edges: usize,
    /// Edges discarded as partial orders.
    pub ignored_edges: usize,
    pub user_slits_added: usize,
    pub user_slits_removed: usize,
    /// Edges dropped for too few valid rows.
    pub fit_failures: Vec<FitFailure>,
    /// Slits with at least one rebuilt edge.
    pub extrapolated_slits: usize,
    /// Reconstruction was needed but fell back to dropping incomplete slits.
    pub pca_fallback: bool,
    /// Slits lost for a missing edge.
    pub incomplete_slits_dropped: usize,
    pub trimmed: Vec<TrimDrop>,
}

/// Everything a successful run produces.
#[derive(Debug, Clone)]
pub struct SlitTraceResult {
    pub slits: SlitSet,
    pub pixel_maps: PixelMaps,
    /// Final edge labels, before fitting.
    pub edge_map: EdgeMap,
    /// Signed significance image; absent for single-slit overrides.
    pub significance: Option<Buffer2<f32>>,
    pub run_log: RunLog,
    pub diagnostics: Diagnostics,
}

/// Result of [`SlitTracer::trace`].
#[derive(Debug, Clone)]
pub enum TraceOutcome {
    Traced(Box<SlitTraceResult>),
    /// Nothing slit-like in the image. `stage` is where the run stopped.
    NoSlits { stage: Stage, run_log: RunLog },
}

impl TraceOutcome {
    pub fn is_traced(&self) -> bool {
        matches!(self, Self::Traced(_))
    }

    pub fn result(&self) -> Option<&SlitTraceResult> {
        match self {
            Self::Traced(result) => Some(result),
            Self::NoSlits { .. } => None,
        }
    }

    pub fn into_result(self) -> Option<SlitTraceResult> {
        match self {
            Self::Traced(result) => Some(*result),
            Self::NoSlits { .. } => None,
        }
    }

    pub fn run_log(&self) -> &RunLog {
        match self {
            Self::Traced(result) => &result.run_log,
            Self::NoSlits { run_log, .. } => run_log,
        }
    }

    pub fn num_slits(&self) -> usize {
        self.result().map_or(0, |r| r.slits.len())
    }
}

// =============================================================================
// SlitTracer
// =============================================================================

/// Traces slit edges in calibration frames.
///
/// # Example
///
/// ```rust,ignore
/// use slitedge::{SlitTraceConfig, SlitTracer, TraceFrame};
///
/// let tracer = SlitTracer::from_config(SlitTraceConfig::echelle())?;
/// let outcome = tracer.trace(&TraceFrame::new(image), 0.2)?;
/// if let Some(result) = outcome.result() {
///     println!("{} slits, run: {}", result.slits.len(), result.run_log);
/// }
///
/// // Batch tracing (parallel)
/// let outcomes = tracer.trace_all(&frames, 0.2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct SlitTracer {
    config: Config,
}

impl SlitTracer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a tracer, rejecting invalid configurations up front.
    pub fn from_config(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Trace one frame. `plate_scale` is in arcsec per spatial unit.
    pub fn trace(&self, frame: &TraceFrame, plate_scale: f64) -> Result<TraceOutcome> {
        self.trace_with_observer(frame, plate_scale, &mut NoopObserver)
    }

    /// Trace several frames in parallel.
    pub fn trace_all(&self, frames: &[TraceFrame], plate_scale: f64) -> Vec<Result<TraceOutcome>> {
        frames.par_iter().map(|frame| self.trace(frame, plate_scale)).collect()
    }

    /// Trace one frame, handing intermediate products to `observer`.
    pub fn trace_with_observer(
        &self,
        frame: &TraceFrame,
        plate_scale: f64,
        observer: &mut dyn TraceObserver,
    ) -> Result<TraceOutcome> {
        self.config.validate()?;
        if !(plate_scale > 0.0) {
            return Err(ConfigError::invalid("plate_scale", format!("must be positive, got {plate_scale}")).into());
        }
        frame.validate()?;

        Run {
            config: &self.config,
            frame,
            plate_scale,
            observer,
            log: RunLog::default(),
            diagnostics: Diagnostics::default(),
        }
        .execute()
    }
}

// =============================================================================
// Pipeline
// =============================================================================

struct Run<'a> {
    config: &'a Config,
    frame: &'a TraceFrame,
    plate_scale: f64,
    observer: &'a mut dyn TraceObserver,
    log: RunLog,
    diagnostics: Diagnostics,
}

impl Run<'_> {
    fn no_slits(self) -> Result<TraceOutcome> {
        let stage = self.log.last().unwrap_or(Stage::Init);
        tracing::info!(%stage, "no slits found");
        Ok(TraceOutcome::NoSlits {
            stage,
            run_log: self.log,
        })
    }

    fn execute(mut self) -> Result<TraceOutcome> {
        let config = self.config;
        let frame = self.frame;
        let (width, height) = (frame.width(), frame.height());
        let ref_row = height / 2;
        let locations = frame.locations();
        self.log.push(Stage::Init);

        // Step 1: smooth along the spectral axis
        let binarr = smooth(&frame.image, config.smooth_width);
        self.log.push(Stage::Smooth);
        self.observer.smoothed(&binarr);

        // Step 2: raw edges
        let (mut edges, significance) = match config.single_slit_edges {
            Some(columns) => {
                self.log.push(Stage::SingleSlit);
                (single_slit(width, height, columns), None)
            }
            None => {
                let detection = detect(&binarr, frame.bad_pixels.as_ref(), config);
                self.log.push(Stage::Detect);
                self.diagnostics.left_candidates = detection.left_candidates;
                self.diagnostics.right_candidates = detection.right_candidates;
                self.observer.significance(&detection.significance);
                (detection.edges, Some(detection.significance))
            }
        };
        let sig = significance.as_ref();
        if edges.count(Side::Left) == 0 && edges.count(Side::Right) == 0 {
            return self.no_slits();
        }

        // Step 3: group detections into edges
        let counts = match_edges(&mut edges, config.edge_id_budget)?;
        self.log.push(Stage::MatchEdges);
        let counts = add_left_right(&mut edges, counts, ref_row);
        self.log.push(Stage::AddLeftRight);
        self.observer.edge_map(Stage::AddLeftRight, &edges);
        if counts.is_empty() {
            return self.no_slits();
        }

        // Step 4: definitive left and right sets
        let mut assigned = [0; 2];
        for (n, side) in assigned.iter_mut().zip(Side::BOTH) {
            *n = assign(&binarr, &mut edges, side, sig, config);
        }
        self.log.push(Stage::AssignEdges);
        for (&n, side) in assigned.iter().zip(Side::BOTH) {
            if n == 0 {
                return Err(Error::NoValidEdges {
                    stage: Stage::AssignEdges,
                    side,
                });
            }
        }

        if let Some(max_gap) = config.max_gap {
            self.diagnostics.gap_merges = close_gaps(&binarr, &mut edges, max_gap, config);
            self.log.push(Stage::GapMerge);
        }

        final_left_right(&mut edges, sig);
        self.log.push(Stage::FinalLeftRight);
        self.observer.edge_map(Stage::FinalLeftRight, &edges);

        // Step 5: pair edges into slits
        let single_pair = edges.num_groups(Side::Left) == 1 && edges.num_groups(Side::Right) == 1;
        if config.multi_slit && !single_pair {
            let traced = crude_trace(&edges, sig, config);
            self.log.push(Stage::CrudeTrace);
            let outcome = sync(&mut edges, traced, config);
            self.log.push(Stage::MultiSlitSync);
            self.diagnostics.duplicates_removed = outcome.duplicates_removed;
            self.diagnostics.bounded_edges = outcome.bounded_edges;
            self.observer.edge_map(Stage::MultiSlitSync, &edges);
        }

        if !config.add_slits.is_empty() {
            self.diagnostics.user_slits_added = add_user_slits(&mut edges, &config.add_slits);
            self.log.push(Stage::AddUserSlits);
        }
        if !config.remove_slits.is_empty() {
            self.diagnostics.user_slits_removed = remove_user_slits(&mut edges, &config.remove_slits);
            self.log.push(Stage::RemoveSlits);
        }
        if config.ignore_orders {
            self.diagnostics.ignored_edges = ignore_orders(&mut edges, config.frac_ignore);
            self.log.push(Stage::IgnoreOrders);
        }
        self.diagnostics.left_edges = edges.num_groups(Side::Left);
        self.diagnostics.right_edges = edges.num_groups(Side::Right);

        // Step 6: fit every edge
        let left = fit_edges(&edges, Side::Left, &locations, config);
        self.log.push(Stage::FitLeft);
        let right = fit_edges(&edges, Side::Right, &locations, config);
        self.log.push(Stage::FitRight);
        self.diagnostics.fit_failures = left.failures.iter().chain(&right.failures).cloned().collect();
        if left.fits.is_empty() {
            return Err(Error::NoValidEdges {
                stage: Stage::FitLeft,
                side: Side::Left,
            });
        }
        if right.fits.is_empty() {
            return Err(Error::NoValidEdges {
                stage: Stage::FitRight,
                side: Side::Right,
            });
        }

        let axis = locations.spectral_axis();
        let ref_s = axis[ref_row];
        let longslit = left.fits.len() == 1
            && right.fits.len() == 1
            && left.fits[0].curve.eval(ref_s) < right.fits[0].curve.eval(ref_s);

        // Step 7: complete, extrapolate and trim
        let slits = if longslit {
            let (l, r) = (&left.fits[0], &right.fits[0]);
            self.log.push(Stage::Longslit);
            let slit = Slit::new(l.curve.clone(), r.curve.clone(), false);
            match degenerate(0, &slit, &axis, ref_s) {
                Some(drop) => {
                    self.diagnostics.trimmed.push(drop);
                    SlitSet::new(Vec::new(), axis, ref_row)
                }
                None => SlitSet::new(vec![slit], axis, ref_row),
            }
        } else {
            let candidates = synchronize(left.fits, right.fits, ref_s, config.pca_extrapolate);
            self.log.push(Stage::Synchronize);

            let input = ExtrapolationInput {
                candidates: &candidates,
                spectral_axis: &axis,
                ref_row,
                family: config.function_family,
                poly_order: config.poly_order,
                domain: locations.spectral_domain(),
                min_coverage: config.pca_min_coverage,
            };
            let extrapolation = extrapolator_for(config).extrapolate(&input);
            if config.pca != PcaMode::None {
                self.log.push(Stage::Pca);
            }
            self.diagnostics.pca_fallback = extrapolation.fallback;
            self.diagnostics.incomplete_slits_dropped = extrapolation.dropped;

            let set = SlitSet::new(extrapolation.slits, axis, ref_row);
            self.observer.slits(self.log.last().unwrap_or(Stage::Synchronize), &set);

            let trimmed = trim(set, self.plate_scale, locations.spatial_bounds(), config);
            self.log.push(Stage::Trim);
            self.diagnostics.trimmed = trimmed.dropped;
            trimmed.slits
        };
        self.diagnostics.extrapolated_slits = slits.extrapolated_mask().iter().filter(|&&e| e).count();
        self.observer.slits(self.log.last().unwrap_or(Stage::Trim), &slits);

        if slits.is_empty() {
            return self.no_slits();
        }

        // Step 8: pixel maps
        let pixel_maps = build(&slits, &locations, config.trim_padding, config.trim_fraction);
        self.log.push(Stage::PixelMaps);

        tracing::info!(
            slits = slits.len(),
            extrapolated = self.diagnostics.extrapolated_slits,
            trimmed = self.diagnostics.trimmed.len(),
            "slit tracing done"
        );

        Ok(TraceOutcome::Traced(Box::new(SlitTraceResult {
            slits,
            pixel_maps,
            edge_map: edges,
            significance,
            run_log: self.log,
            diagnostics: self.diagnostics,
        })))
    }
}
