//! Displacement sampling: trilinear in space, linear between frames.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use moco_core::interpolation::{Interpolator, LinearInterpolator, TrilinearStencil};
use moco_core::VoxelConvention;
use super::sequence::{DecomposedField, HostField};
use crate::temporal::wrap_phase;

/// The two frames bracketing a phase and the blend weight of the upper one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FramePosition {
    pub lower: usize,
    pub upper: usize,
    pub weight: f64,
}

impl FramePosition {
    /// Locate `phase` (cycle units, wrapped into `[0, 1)`) among `frames`
    /// equally spaced frames. The frame after the last is frame 0.
    pub fn from_phase(phase: f64, frames: usize) -> Self {
        if frames == 0 {
            return Self { lower: 0, upper: 0, weight: 0.0 };
        }
        let position = wrap_phase(phase) * frames as f64;
        let floor = position.floor();
        let lower = (floor as usize) % frames;
        Self {
            lower,
            upper: (lower + 1) % frames,
            weight: position - floor,
        }
    }

    /// A single frame, no blending.
    pub fn single(frame: usize) -> Self {
        Self { lower: frame, upper: frame, weight: 0.0 }
    }
}

/// Sampling of a decomposed displacement field at one point.
pub trait DisplacementSampler {
    /// Displacement at field sampling coordinate `coord`, in physical units.
    ///
    /// Exactly zero when any axis lies outside `[offset, offset + n - 1]`.
    fn sample(&self, coord: [f64; 3], frame: &FramePosition) -> [f64; 3];
}

/// Host sampler over a [`HostField`].
#[derive(Debug, Clone, Copy)]
pub struct HostDisplacementSampler<'a> {
    field: &'a HostField,
    offset: f64,
}

impl<'a> HostDisplacementSampler<'a> {
    pub fn new(field: &'a HostField, convention: VoxelConvention) -> Self {
        Self {
            field,
            offset: convention.offset(),
        }
    }
}

impl DisplacementSampler for HostDisplacementSampler<'_> {
    fn sample(&self, coord: [f64; 3], frame: &FramePosition) -> [f64; 3] {
        let Some(stencil) = TrilinearStencil::new(self.field.size, coord, self.offset) else {
            return [0.0; 3];
        };
        let mut out = [0.0; 3];
        for (axis, value) in out.iter_mut().enumerate() {
            let lower = stencil.gather(self.field.frame(axis, frame.lower));
            *value = if frame.weight == 0.0 {
                lower
            } else {
                let upper = stencil.gather(self.field.frame(axis, frame.upper));
                (1.0 - frame.weight) * lower + frame.weight * upper
            };
        }
        out
    }
}

impl<B: Backend> DecomposedField<B> {
    /// Batched sampling at field sampling coordinates `[N, 3]`; returns `[N, 3]`.
    pub fn sample_tensor(&self, coords: Tensor<B, 2>, frame: &FramePosition, convention: VoxelConvention) -> Tensor<B, 2> {
        let interpolator = LinearInterpolator::new(convention);
        let components = (0..3)
            .map(|axis| {
                let lower = interpolator.interpolate(&self.frame_component(axis, frame.lower), coords.clone());
                if frame.weight == 0.0 {
                    lower
                } else {
                    let upper = interpolator.interpolate(&self.frame_component(axis, frame.upper), coords.clone());
                    lower * (1.0 - frame.weight) + upper * frame.weight
                }
            })
            .collect();
        Tensor::stack::<2>(components, 1)
    }
}
