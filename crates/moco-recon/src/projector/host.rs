//! Host projector: rayon-parallel ray walking over host copies.

use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use moco_core::interpolation::{sample_trilinear, TrilinearStencil};
use moco_core::VoxelConvention;
use rayon::prelude::*;
use super::ray::RayPlan;
use super::{Projector, RayContext};
use crate::composer::ProjectionTransforms;
use crate::config::ProjectorKind;
use crate::displacement::{DisplacementSampler, FramePosition, HostDisplacementSampler};

/// Upper bound on the private volumes held during one back-projection.
const BACKWARD_BANDS: usize = 16;

/// Projector evaluating every ray on the host.
///
/// Forward projection is parallel over pixels. Back-projection splits the
/// detector rows into at most [`BACKWARD_BANDS`] bands whose size depends
/// only on the slice height, fills one private volume per band in parallel
/// and sums the bands in row order, so the result depends neither on
/// scheduling nor on the thread count.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostProjector {
    convention: VoxelConvention,
}

impl HostProjector {
    pub fn new(convention: VoxelConvention) -> Self {
        Self { convention }
    }
}

/// Maps unwarped sampling coordinates to the coordinates actually sampled.
struct HostWarp<'a> {
    transforms: &'a ProjectionTransforms,
    displacement: Option<(HostDisplacementSampler<'a>, FramePosition)>,
}

impl HostWarp<'_> {
    fn apply(&self, c: [f64; 3]) -> [f64; 3] {
        match &self.displacement {
            None => c,
            Some((sampler, frame)) => {
                let physical = self.transforms.index_to_physical.transform_point(c);
                let field_coord = self.transforms.physical_to_field_index.transform_point(physical);
                let displacement = sampler.sample(field_coord, frame);
                self.transforms.warped_sampling_coordinate(physical, displacement)
            }
        }
    }
}

fn host_values<B: Backend, const D: usize>(tensor: &Tensor<B, D>) -> Vec<f32> {
    tensor.clone().into_data().iter::<f32>().collect()
}

impl HostProjector {
    fn warp<'a, B: Backend>(&self, ctx: &RayContext<'a, B>) -> HostWarp<'a> {
        HostWarp {
            transforms: ctx.transforms,
            displacement: ctx
                .warp
                .map(|w| (HostDisplacementSampler::new(w.field.host(), self.convention), w.frame)),
        }
    }
}

impl<B: Backend> Projector<B> for HostProjector {
    fn kind(&self) -> ProjectorKind {
        ProjectorKind::Host
    }

    fn forward(&self, volume: &Tensor<B, 3>, slice: Tensor<B, 2>, ctx: &RayContext<'_, B>) -> Tensor<B, 2> {
        let [nz, ny, nx] = volume.dims();
        let size = [nx, ny, nz];
        let [nv, nu] = slice.dims();
        let device = slice.device();
        let offset = self.convention.offset();

        let volume_data = host_values(volume);
        let input = host_values(&slice);
        let warp = self.warp(ctx);
        let transforms = ctx.transforms;

        let output: Vec<f32> = input
            .par_iter()
            .enumerate()
            .map(|(pixel, &value)| {
                let (v, u) = (pixel / nu, pixel % nu);
                let integral = RayPlan::new(transforms, [u as f64, v as f64], size, offset).map_or(0.0, |plan| {
                    plan.samples()
                        .map(|c| sample_trilinear(&volume_data, size, warp.apply(c), offset))
                        .sum::<f64>()
                        * plan.step()
                });
                value + integral as f32
            })
            .collect();

        Tensor::from_data(TensorData::new(output, [nv, nu]), &device)
    }

    fn backward(&self, slice: &Tensor<B, 2>, shape: [usize; 3], ctx: &RayContext<'_, B>) -> Tensor<B, 3> {
        let [nz, ny, nx] = shape;
        let size = [nx, ny, nz];
        let len = nx * ny * nz;
        let [nv, nu] = slice.dims();
        let device = slice.device();
        let offset = self.convention.offset();

        let input = host_values(slice);
        let warp = self.warp(ctx);
        let transforms = ctx.transforms;

        let rows_per_band = nv.div_ceil(BACKWARD_BANDS).max(1);
        let bands: Vec<Vec<f32>> = input
            .par_chunks((rows_per_band * nu).max(1))
            .enumerate()
            .map(|(band, values)| {
                let mut private = vec![0.0f32; len];
                for (i, &value) in values.iter().enumerate() {
                    if value == 0.0 {
                        continue;
                    }
                    let pixel = band * rows_per_band * nu + i;
                    let (v, u) = (pixel / nu, pixel % nu);
                    let Some(plan) = RayPlan::new(transforms, [u as f64, v as f64], size, offset) else {
                        continue;
                    };
                    let weight = f64::from(value) * plan.step();
                    for c in plan.samples() {
                        if let Some(stencil) = TrilinearStencil::new(size, warp.apply(c), offset) {
                            stencil.scatter(&mut private, weight);
                        }
                    }
                }
                private
            })
            .collect();

        let mut accumulated = vec![0.0f32; len];
        for band in &bands {
            for (acc, value) in accumulated.iter_mut().zip(band) {
                *acc += value;
            }
        }

        Tensor::from_data(TensorData::new(accumulated, [nz, ny, nx]), &device)
    }
}
