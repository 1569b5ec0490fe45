//! Configuration for projectors and the iteration drivers.

use moco_core::VoxelConvention;
use serde::{Deserialize, Serialize};

/// Projector implementation selected at configuration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ProjectorKind {
    /// Rayon-parallel ray casting over host copies of the buffers.
    #[default]
    Host,
    /// Batched gather/scatter on the burn backend's device.
    Tensor,
}

/// Projector configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProjectorConfig {
    pub kind: ProjectorKind,
    pub convention: VoxelConvention,
    /// Sample the volume at displaced positions.
    pub warp: bool,
}

impl Default for ProjectorConfig {
    fn default() -> Self {
        Self {
            kind: ProjectorKind::Host,
            convention: VoxelConvention::Corner,
            warp: true,
        }
    }
}

impl ProjectorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_kind(mut self, kind: ProjectorKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_convention(mut self, convention: VoxelConvention) -> Self {
        self.convention = convention;
        self
    }

    /// Disable warping; the displacement field is then never read.
    pub fn without_warp(mut self) -> Self {
        self.warp = false;
        self
    }

    pub fn with_warp(mut self, warp: bool) -> Self {
        self.warp = warp;
        self
    }
}

/// Driver configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReconstructionConfig {
    pub projector: ProjectorConfig,
    /// Log progress every this many projections; zero disables progress logging.
    pub log_interval: usize,
    /// Initial value of a freshly allocated 4D destination.
    pub initial_value: f32,
    /// Weight projections from a laterally displaced detector before
    /// back-projection. Has no effect on a centred detector.
    pub displaced_detector: bool,
}

impl Default for ReconstructionConfig {
    fn default() -> Self {
        Self {
            projector: ProjectorConfig::default(),
            log_interval: 0,
            initial_value: 0.0,
            displaced_detector: true,
        }
    }
}

impl ReconstructionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_projector(mut self, projector: ProjectorConfig) -> Self {
        self.projector = projector;
        self
    }

    pub fn with_log_interval(mut self, log_interval: usize) -> Self {
        self.log_interval = log_interval;
        self
    }

    pub fn with_initial_value(mut self, value: f32) -> Self {
        self.initial_value = value;
        self
    }

    pub fn with_displaced_detector(mut self, enabled: bool) -> Self {
        self.displaced_detector = enabled;
        self
    }
}
