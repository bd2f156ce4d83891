//! Error types for slit tracing.

use thiserror::Error;

use super::edge_map::Side;
use super::stage::Stage;

/// Invalid option values or combinations, detected before any processing.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("Invalid value for '{name}': {reason}")]
    InvalidValue { name: &'static str, reason: String },

    #[error("Single slit edges must satisfy left < right, got [{left}, {right}]")]
    SingleSlitOrder { left: f64, right: f64 },

    #[error("PCA extrapolation needs at least two slits; disable PCA for single-slit setups")]
    PcaNeedsTwoSlits,

    #[error("PCA is enabled but pca_order_factors is empty")]
    EmptyPcaOrderFactors,
}

impl ConfigError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            name,
            reason: reason.into(),
        }
    }
}

/// Fatal errors of a tracing run.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Trace image is empty ({width}x{height})")]
    EmptyImage { width: usize, height: usize },

    #[error("Shape mismatch for {what}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        what: &'static str,
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("Too many {side} edges: {count} exceeds the budget of {budget}")]
    EdgeBudgetExceeded { side: Side, count: usize, budget: usize },

    #[error("No valid {side} edges after {stage}")]
    NoValidEdges { stage: Stage, side: Side },
}

impl Error {
    /// Stage at which the run failed.
    pub fn stage(&self) -> Stage {
        match self {
            Self::Config(_) | Self::EmptyImage { .. } | Self::ShapeMismatch { .. } => Stage::Init,
            Self::EdgeBudgetExceeded { .. } => Stage::MatchEdges,
            Self::NoValidEdges { stage, .. } => *stage,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_error_message() {
        let err = Error::EdgeBudgetExceeded {
            side: Side::Left,
            count: 120,
            budget: 100,
        };
        assert_eq!(err.to_string(), "Too many left edges: 120 exceeds the budget of 100");
        assert_eq!(err.stage(), Stage::MatchEdges);
    }

    #[test]
    fn test_no_valid_edges_message() {
        let err = Error::NoValidEdges {
            stage: Stage::FitRight,
            side: Side::Right,
        };
        assert_eq!(err.to_string(), "No valid right edges after fit_right");
        assert_eq!(err.stage(), Stage::FitRight);
    }

    #[test]
    fn test_config_error_wraps() {
        let err: Error = ConfigError::PcaNeedsTwoSlits.into();
        assert!(err.to_string().starts_with("Invalid configuration: PCA extrapolation"));
        assert_eq!(err.stage(), Stage::Init);
    }

    #[test]
    fn test_invalid_value_message() {
        let err = ConfigError::invalid("sigdetect", "must be positive, got -1");
        assert_eq!(err.to_string(), "Invalid value for 'sigdetect': must be positive, got -1");
    }

    #[test]
    fn test_shape_mismatch_message() {
        let err = Error::ShapeMismatch {
            what: "bad pixel mask",
            expected: (10, 20),
            actual: (10, 21),
        };
        assert_eq!(
            err.to_string(),
            "Shape mismatch for bad pixel mask: expected (10, 20), got (10, 21)"
        );
    }
}
