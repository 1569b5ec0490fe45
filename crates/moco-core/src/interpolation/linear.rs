//! Linear interpolation implementation.
//!
//! Trilinear gather and its scatter adjoint on burn tensors, for sampling
//! many continuous coordinates of a `[Z, Y, X]` volume in one launch.

use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor};
use serde::{Deserialize, Serialize};
use super::trait_::Interpolator;
use super::VoxelConvention;

/// Linear Interpolator.
///
/// Trilinear interpolation with a zero boundary: coordinates outside the
/// sampling box receive zero weight on every stencil voxel.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LinearInterpolator {
    convention: VoxelConvention,
}

impl LinearInterpolator {
    /// Create a new linear interpolator for the given voxel convention.
    pub fn new(convention: VoxelConvention) -> Self {
        Self { convention }
    }

    pub fn convention(&self) -> VoxelConvention {
        self.convention
    }

    /// Compute the trilinear stencil of each coordinate.
    ///
    /// # Arguments
    /// * `size` - Volume size in `(x, y, z)` order
    /// * `coords` - Sampling coordinates `[N, 3]` as `(x, y, z)`
    ///
    /// # Returns
    /// Flat buffer indices `[N, 8]` and weights `[N, 8]`. Weights are zero
    /// for coordinates outside the sampling box; indices are always valid.
    pub fn stencil<B: Backend>(
        &self,
        size: [usize; 3],
        coords: Tensor<B, 2>,
    ) -> (Tensor<B, 2, Int>, Tensor<B, 2>) {
        let offset = self.convention.offset();
        let [nx, ny, nz] = size;

        let x = coords.clone().narrow(1, 0, 1).squeeze::<1>(1) - offset;
        let y = coords.clone().narrow(1, 1, 1).squeeze::<1>(1) - offset;
        let z = coords.narrow(1, 2, 1).squeeze::<1>(1) - offset;

        let inside = Self::inside(&x, nx) * Self::inside(&y, ny) * Self::inside(&z, nz);

        let (x0, x1, wx) = Self::axis(x, nx);
        let (y0, y1, wy) = Self::axis(y, ny);
        let (z0, z1, wz) = Self::axis(z, nz);

        // Stride for [Z, Y, X] layout
        let stride_z = (nx * ny) as i32;
        let stride_y = nx as i32;

        let mut indices = Vec::with_capacity(8);
        let mut weights = Vec::with_capacity(8);
        for corner in 0..8 {
            let (xi, fx) = Self::pick(corner & 1 != 0, &x0, &x1, &wx);
            let (yi, fy) = Self::pick(corner & 2 != 0, &y0, &y1, &wy);
            let (zi, fz) = Self::pick(corner & 4 != 0, &z0, &z1, &wz);
            indices.push(zi * stride_z + yi * stride_y + xi);
            weights.push(fx * fy * fz * inside.clone());
        }

        (Tensor::stack::<2>(indices, 1), Tensor::stack::<2>(weights, 1))
    }

    /// Adjoint of [`Interpolator::interpolate`]: spread `values` `[N]` over
    /// the stencils of `coords` and add them into a zero `[Z, Y, X]` volume.
    pub fn splat<B: Backend>(
        &self,
        size: [usize; 3],
        coords: Tensor<B, 2>,
        values: Tensor<B, 1>,
    ) -> Tensor<B, 3> {
        let [nx, ny, nz] = size;
        let n = values.dims()[0];
        let device = values.device();
        let (indices, weights) = self.stencil(size, coords);

        let contributions = weights * values.reshape([n, 1]);
        let flat = Tensor::<B, 1>::zeros([nx * ny * nz], &device).scatter(
            0,
            indices.reshape([n * 8]),
            contributions.reshape([n * 8]),
        );
        flat.reshape([nz, ny, nx])
    }

    fn inside<B: Backend>(u: &Tensor<B, 1>, n: usize) -> Tensor<B, 1> {
        let upper = n.saturating_sub(1) as f64;
        let mask = u.clone().greater_equal_elem(0.0).float() * u.clone().lower_equal_elem(upper).float();
        if n == 0 {
            mask.zeros_like()
        } else {
            mask
        }
    }

    /// Lower index, clamped upper index and fractional weight along one axis.
    fn axis<B: Backend>(u: Tensor<B, 1>, n: usize) -> (Tensor<B, 1, Int>, Tensor<B, 1, Int>, Tensor<B, 1>) {
        let max = n.saturating_sub(1) as f64;
        let u0 = u.clone().floor();
        let w = u - u0.clone();
        let i0 = u0.clone().clamp(0.0, max).int();
        let i1 = (u0 + 1.0).clamp(0.0, max).int();
        (i0, i1, w)
    }

    fn pick<B: Backend>(
        upper: bool,
        i0: &Tensor<B, 1, Int>,
        i1: &Tensor<B, 1, Int>,
        w: &Tensor<B, 1>,
    ) -> (Tensor<B, 1, Int>, Tensor<B, 1>) {
        if upper {
            (i1.clone(), w.clone())
        } else {
            (i0.clone(), w.ones_like() - w.clone())
        }
    }
}

impl<B: Backend> Interpolator<B> for LinearInterpolator {
    fn interpolate(&self, data: &Tensor<B, 3>, coords: Tensor<B, 2>) -> Tensor<B, 1> {
        let [nz, ny, nx] = data.dims();
        let n = coords.dims()[0];
        let (indices, weights) = self.stencil([nx, ny, nz], coords);

        // Pre-flatten data once to avoid repeated reshaping
        let flat_data = data.clone().reshape([nx * ny * nz]);
        let values = flat_data.gather(0, indices.reshape([n * 8])).reshape([n, 8]);
        (values * weights).sum_dim(1).squeeze::<1>(1)
    }
}
