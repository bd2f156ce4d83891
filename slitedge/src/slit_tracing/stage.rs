//! Pipeline stages and the per-run log of stages visited.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A step of the tracing pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Input validation, before any processing.
    Init,
    Smooth,
    Detect,
    SingleSlit,
    MatchEdges,
    AddLeftRight,
    AssignEdges,
    GapMerge,
    FinalLeftRight,
    CrudeTrace,
    MultiSlitSync,
    IgnoreOrders,
    FitLeft,
    FitRight,
    Longslit,
    Synchronize,
    Pca,
    AddUserSlits,
    RemoveSlits,
    Trim,
    PixelMaps,
}

impl Stage {
    pub fn name(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Smooth => "smooth",
            Self::Detect => "detect",
            Self::SingleSlit => "single_slit",
            Self::MatchEdges => "match_edges",
            Self::AddLeftRight => "add_left_right",
            Self::AssignEdges => "assign_edges",
            Self::GapMerge => "gap_merge",
            Self::FinalLeftRight => "final_left_right",
            Self::CrudeTrace => "crude_trace",
            Self::MultiSlitSync => "multi_slit_sync",
            Self::IgnoreOrders => "ignore_orders",
            Self::FitLeft => "fit_left",
            Self::FitRight => "fit_right",
            Self::Longslit => "longslit",
            Self::Synchronize => "synchronize",
            Self::Pca => "pca",
            Self::AddUserSlits => "add_user_slits",
            Self::RemoveSlits => "remove_slits",
            Self::Trim => "trim",
            Self::PixelMaps => "pixel_maps",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Ordered list of the stages a run went through.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunLog {
    stages: Vec<Stage>,
}

impl RunLog {
    pub(crate) fn push(&mut self, stage: Stage) {
        tracing::debug!(stage = %stage, "slit tracing stage");
        self.stages.push(stage);
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn contains(&self, stage: Stage) -> bool {
        self.stages.contains(&stage)
    }

    pub fn last(&self) -> Option<Stage> {
        self.stages.last().copied()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl fmt::Display for RunLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, stage) in self.stages.iter().enumerate() {
            if i > 0 {
                f.write_str(" -> ")?;
            }
            write!(f, "{stage}")?;
        }
        Ok(())
    }
}
