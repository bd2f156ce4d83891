//! Configuration for the slit tracing pipeline.
//!
//! A single flat [`Config`] record grouped by pipeline stage. Presets cover the
//! common detector layouts; customize individual fields from there.

use serde::{Deserialize, Serialize};

use super::error::ConfigError;
use crate::math::FunctionFamily;

// ============================================================================
// Enums
// ============================================================================

/// Boundary handling of the spatial derivative filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SobelMode {
    /// Repeat the border pixel.
    #[default]
    Nearest,
    /// Reflect about the border pixel without repeating it.
    Reflect,
    /// Treat everything outside the detector as zero flux.
    Constant,
}

/// Strategy used to rebuild missing or poorly covered edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PcaMode {
    /// Keep complete slits, drop slits missing an edge.
    None,
    /// PCA on per-slit curve coefficients, regressed on slit index.
    /// Suited to echelle orders.
    Order,
    /// PCA on per-row edge offsets, regressed on edge position.
    /// Suited to irregular multi-slit masks.
    #[default]
    Pixel,
}

// ============================================================================
// Config
// ============================================================================

/// Configuration for the slit tracing pipeline.
///
/// # Example
///
/// ```rust,ignore
/// use slitedge::SlitTraceConfig;
///
/// let mut config = SlitTraceConfig::echelle();
/// config.sigdetect = 50.0;
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // -- Smoothing / detection --
    /// Moving-average length along the spectral axis (rows). 1 disables it.
    pub smooth_width: usize,
    /// Detection threshold on the significance image.
    pub sigdetect: f32,
    /// Number of 3×7 median filter passes before the derivative filter.
    pub median_repeat: usize,
    /// Border handling of the derivative filter.
    pub sobel_mode: SobelMode,
    /// User-given `[left, right]` columns of a single slit. Bypasses detection.
    pub single_slit_edges: Option<[f64; 2]>,

    // -- Grouping --
    /// Maximum number of edge groups per side before the frame is rejected.
    pub edge_id_budget: usize,
    /// Keep only this many of the strongest edges per side.
    pub number_of_slits: Option<usize>,
    /// Merge edges closer than this many pixels. Not recommended for multi-slit masks.
    pub max_gap: Option<f64>,

    // -- Multi-slit synchronization --
    /// Trace crudely and pair edges before fitting (long/multi-slit layouts).
    /// Echelle layouts pair fitted curves instead.
    pub multi_slit: bool,
    /// Maximum column shift per row while crude tracing.
    pub max_shift: f64,
    /// Same-side edges closer than this (pixels) are duplicates.
    pub duplicate_separation: f64,
    /// Remove edges covering less than `frac_ignore` of the rows.
    pub ignore_orders: bool,
    /// Row-coverage fraction used by `ignore_orders`.
    pub frac_ignore: f64,
    /// Extra `[left, right]` slits (pixel columns at the reference row).
    pub add_slits: Vec<[f64; 2]>,
    /// Slits to remove, matched at the reference row.
    pub remove_slits: Vec<[f64; 2]>,

    // -- Edge fitting --
    /// Basis of the edge curves.
    pub function_family: FunctionFamily,
    /// Order of the edge curves.
    pub poly_order: usize,
    /// Minimum number of valid rows for an edge to be fit.
    pub min_edge_rows: usize,

    // -- PCA extrapolation --
    pub pca: PcaMode,
    /// Regression order of each kept principal component.
    pub pca_order_factors: Vec<usize>,
    /// Regression order of the slit width against slit index (order PCA).
    pub diff_poly_order: usize,
    /// Extra slits to extrapolate `[before, after]` the detected ones (order PCA).
    pub pca_extrapolate: [usize; 2],
    /// Edges covering less than this fraction of rows are rebuilt.
    pub pca_min_coverage: f64,

    // -- Trimming --
    /// Drop slits narrower than `min_slit_width`.
    pub trim_short_slits: bool,
    /// Minimum slit width in arcseconds.
    pub min_slit_width: f64,

    // -- Pixel maps --
    /// Pixels added on each side of a slit in the slit-id raster.
    pub trim_padding: usize,
    /// Fraction of the slit width at each edge flagged in the edge mask.
    pub trim_fraction: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            // Smoothing / detection
            smooth_width: 3,
            sigdetect: 20.0,
            median_repeat: 0,
            sobel_mode: SobelMode::Nearest,
            single_slit_edges: None,

            // Grouping
            edge_id_budget: 100_000,
            number_of_slits: None,
            max_gap: None,

            // Multi-slit synchronization
            multi_slit: true,
            max_shift: 0.15,
            duplicate_separation: 8.0,
            ignore_orders: false,
            frac_ignore: 0.01,
            add_slits: Vec::new(),
            remove_slits: Vec::new(),

            // Edge fitting
            function_family: FunctionFamily::Legendre,
            poly_order: 3,
            min_edge_rows: 10,

            // PCA extrapolation
            pca: PcaMode::Pixel,
            pca_order_factors: vec![3, 2, 1, 0, 0, 0],
            diff_poly_order: 2,
            pca_extrapolate: [0, 0],
            pca_min_coverage: 0.5,

            // Trimming
            trim_short_slits: true,
            min_slit_width: 6.0,

            // Pixel maps
            trim_padding: 0,
            trim_fraction: 0.05,
        }
    }
}

impl Config {
    /// Multi-slit masks: crude tracing + synchronization, pixel PCA.
    pub fn multi_slit() -> Self {
        Self::default()
    }

    /// Echelle orders: fitted-curve synchronization, order PCA, orders that
    /// run off the detector are ignored.
    pub fn echelle() -> Self {
        Self {
            multi_slit: false,
            pca: PcaMode::Order,
            ignore_orders: true,
            frac_ignore: 0.5,
            trim_short_slits: false,
            ..Self::default()
        }
    }

    /// A single long slit.
    pub fn longslit() -> Self {
        Self {
            number_of_slits: Some(1),
            pca: PcaMode::None,
            ..Self::default()
        }
    }

    /// Validate option ranges and combinations.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.smooth_width == 0 {
            return Err(ConfigError::invalid("smooth_width", "must be at least 1"));
        }
        if !(self.sigdetect > 0.0) {
            return Err(ConfigError::invalid("sigdetect", format!("must be positive, got {}", self.sigdetect)));
        }
        if self.median_repeat > 10 {
            return Err(ConfigError::invalid(
                "median_repeat",
                format!("must be <= 10, got {}", self.median_repeat),
            ));
        }
        if let Some([left, right]) = self.single_slit_edges
            && !(left < right)
        {
            return Err(ConfigError::SingleSlitOrder { left, right });
        }
        if self.edge_id_budget == 0 {
            return Err(ConfigError::invalid("edge_id_budget", "must be at least 1"));
        }
        if self.number_of_slits == Some(0) {
            return Err(ConfigError::invalid("number_of_slits", "must be at least 1 when set"));
        }
        if let Some(gap) = self.max_gap
            && !(gap > 0.0)
        {
            return Err(ConfigError::invalid("max_gap", format!("must be positive, got {gap}")));
        }
        if !(self.max_shift > 0.0) {
            return Err(ConfigError::invalid("max_shift", format!("must be positive, got {}", self.max_shift)));
        }
        if self.duplicate_separation < 0.0 {
            return Err(ConfigError::invalid("duplicate_separation", "must be non-negative"));
        }
        if !(0.0..=1.0).contains(&self.frac_ignore) {
            return Err(ConfigError::invalid(
                "frac_ignore",
                format!("must be in [0, 1], got {}", self.frac_ignore),
            ));
        }
        for &[left, right] in self.add_slits.iter().chain(&self.remove_slits) {
            if !(left < right) {
                return Err(ConfigError::invalid(
                    "add_slits/remove_slits",
                    format!("left {left} must be < right {right}"),
                ));
            }
        }
        if self.poly_order > 10 {
            return Err(ConfigError::invalid("poly_order", format!("must be <= 10, got {}", self.poly_order)));
        }
        if self.min_edge_rows < 2 {
            return Err(ConfigError::invalid("min_edge_rows", "must be at least 2"));
        }
        if self.pca != PcaMode::None {
            if self.number_of_slits == Some(1) || self.single_slit_edges.is_some() {
                return Err(ConfigError::PcaNeedsTwoSlits);
            }
            if self.pca_order_factors.is_empty() {
                return Err(ConfigError::EmptyPcaOrderFactors);
            }
        }
        if !(0.0..=1.0).contains(&self.pca_min_coverage) {
            return Err(ConfigError::invalid(
                "pca_min_coverage",
                format!("must be in [0, 1], got {}", self.pca_min_coverage),
            ));
        }
        if (self.pca_extrapolate[0] > 0 || self.pca_extrapolate[1] > 0) && self.pca != PcaMode::Order {
            return Err(ConfigError::invalid("pca_extrapolate", "requires order PCA"));
        }
        if self.min_slit_width < 0.0 {
            return Err(ConfigError::invalid("min_slit_width", "must be non-negative"));
        }
        if !(0.0..0.5).contains(&self.trim_fraction) {
            return Err(ConfigError::invalid(
                "trim_fraction",
                format!("must be in [0, 0.5), got {}", self.trim_fraction),
            ));
        }
        Ok(())
    }
}
