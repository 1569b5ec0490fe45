//! Interpolation types and operations.
//!
//! Trilinear sampling at continuous *sampling coordinates*: buffer-relative
//! voxel coordinates in which buffer element `k` sits at `k + offset`, the
//! offset being fixed by the [`VoxelConvention`]. Every sampler in this
//! crate returns exactly zero outside `[offset, offset + n - 1]` on any axis
//! and clamps the upper stencil corner so it never reads past the last sample.

pub mod host;
pub mod linear;
pub mod trait_;

use serde::{Deserialize, Serialize};

pub use host::{sample_trilinear, TrilinearStencil};
pub use linear::LinearInterpolator;
pub use trait_::Interpolator;

/// Where a voxel's value sits inside its cell.
///
/// `Corner` places the value of buffer element `k` at coordinate `k + 0.5`,
/// the convention of texture-fetch hardware. `Center` places it at `k`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VoxelConvention {
    #[default]
    Corner,
    Center,
}

impl VoxelConvention {
    /// Offset added to a buffer index to obtain its sampling coordinate.
    pub fn offset(&self) -> f64 {
        match self {
            VoxelConvention::Corner => 0.5,
            VoxelConvention::Center => 0.0,
        }
    }
}
