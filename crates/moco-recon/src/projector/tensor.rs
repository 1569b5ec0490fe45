//! Tensor projector: batched gathers and scatters on the burn backend.
//!
//! Rays are planned on the host; the sample coordinates of the whole slice
//! are uploaded once and warped, interpolated and accumulated as tensor
//! operations on the device.

use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor, TensorData};
use moco_core::interpolation::{Interpolator, LinearInterpolator};
use moco_core::transform::HomogeneousMatrix;
use moco_core::VoxelConvention;
use super::ray::RayPlan;
use super::{Projector, RayContext};
use crate::composer::ProjectionTransforms;
use crate::config::ProjectorKind;

#[derive(Debug, Clone, Copy, Default)]
pub struct TensorProjector {
    interpolator: LinearInterpolator,
}

impl TensorProjector {
    pub fn new(convention: VoxelConvention) -> Self {
        Self {
            interpolator: LinearInterpolator::new(convention),
        }
    }
}

/// All samples of one slice, flattened.
struct SliceSamples<B: Backend> {
    /// Unwarped sampling coordinates `[N, 3]`.
    coords: Tensor<B, 2>,
    /// Flat detector pixel of each sample `[N]`.
    pixels: Tensor<B, 1, Int>,
    /// Physical step length of each sample `[N]`.
    steps: Tensor<B, 1>,
}

impl<B: Backend> SliceSamples<B> {
    fn plan(
        transforms: &ProjectionTransforms,
        slice: [usize; 2],
        size: [usize; 3],
        offset: f64,
        device: &B::Device,
    ) -> Option<Self> {
        let [nv, nu] = slice;
        let mut coords = Vec::new();
        let mut pixels = Vec::new();
        let mut steps = Vec::new();
        for v in 0..nv {
            for u in 0..nu {
                let Some(plan) = RayPlan::new(transforms, [u as f64, v as f64], size, offset) else {
                    continue;
                };
                for c in plan.samples() {
                    coords.extend(c.iter().map(|&x| x as f32));
                    pixels.push((v * nu + u) as i64);
                    steps.push(plan.step() as f32);
                }
            }
        }
        let n = pixels.len();
        if n == 0 {
            return None;
        }
        Some(Self {
            coords: Tensor::from_data(TensorData::new(coords, [n, 3]), device),
            pixels: Tensor::from_data(TensorData::new(pixels, [n]), device),
            steps: Tensor::from_data(TensorData::new(steps, [n]), device),
        })
    }
}

/// Apply an affine matrix to row points `[N, 3]`.
fn apply_affine<B: Backend>(points: Tensor<B, 2>, matrix: &HomogeneousMatrix) -> Tensor<B, 2> {
    let device = points.device();
    let wire = matrix.to_wire();
    // Transposed linear part, so that rows map as p · Lᵀ
    let linear_t: Vec<f32> = (0..3)
        .flat_map(|j| (0..3).map(move |i| wire[i * 4 + j]))
        .collect();
    let linear_t = Tensor::<B, 2>::from_data(TensorData::new(linear_t, [3, 3]), &device);
    let translation = Tensor::<B, 2>::from_data(TensorData::new(vec![wire[3], wire[7], wire[11]], [1, 3]), &device);
    points.matmul(linear_t) + translation
}

impl TensorProjector {
    /// Coordinates the volume is actually sampled at.
    fn warped<B: Backend>(&self, coords: Tensor<B, 2>, ctx: &RayContext<'_, B>) -> Tensor<B, 2> {
        let Some(warp) = ctx.warp else {
            return coords;
        };
        let t = ctx.transforms;
        let device = coords.device();
        let physical = apply_affine(coords, &t.index_to_physical);
        let field_coords = apply_affine(physical.clone(), &t.physical_to_field_index);
        let displacement = warp
            .field
            .sample_tensor(field_coords, &warp.frame, self.interpolator.convention());
        let offset = Tensor::<B, 2>::from_data(
            TensorData::new(t.sampling_offset.iter().map(|&o| o as f32).collect::<Vec<_>>(), [1, 3]),
            &device,
        );
        apply_affine(physical + displacement, &t.physical_to_index) + offset
    }
}

impl<B: Backend> Projector<B> for TensorProjector {
    fn kind(&self) -> ProjectorKind {
        ProjectorKind::Tensor
    }

    fn forward(&self, volume: &Tensor<B, 3>, slice: Tensor<B, 2>, ctx: &RayContext<'_, B>) -> Tensor<B, 2> {
        let [nz, ny, nx] = volume.dims();
        let [nv, nu] = slice.dims();
        let device = slice.device();
        let offset = self.interpolator.convention().offset();

        let Some(samples) = SliceSamples::<B>::plan(ctx.transforms, [nv, nu], [nx, ny, nz], offset, &device) else {
            return slice;
        };

        let coords = self.warped(samples.coords, ctx);
        let values = self.interpolator.interpolate(volume, coords) * samples.steps;
        let integrals = Tensor::<B, 1>::zeros([nv * nu], &device).scatter(0, samples.pixels, values);
        slice + integrals.reshape([nv, nu])
    }

    fn backward(&self, slice: &Tensor<B, 2>, shape: [usize; 3], ctx: &RayContext<'_, B>) -> Tensor<B, 3> {
        let [nz, ny, nx] = shape;
        let [nv, nu] = slice.dims();
        let device = slice.device();
        let offset = self.interpolator.convention().offset();

        let Some(samples) = SliceSamples::<B>::plan(ctx.transforms, [nv, nu], [nx, ny, nz], offset, &device) else {
            return Tensor::zeros(shape, &device);
        };

        let values = slice.clone().reshape([nv * nu]).gather(0, samples.pixels) * samples.steps;
        let coords = self.warped(samples.coords, ctx);
        self.interpolator.splat([nx, ny, nz], coords, values)
    }
}
