//! Trilinear sampling over host slices.
//!
//! Buffers are flat row-major `[Z, Y, X]` slices; sizes are given in
//! `(x, y, z)` order like image metadata.

/// The eight-voxel stencil of a trilinear lookup.
///
/// `indices` are flat buffer offsets, `weights` the matching interpolation
/// weights (they sum to one). The same stencil drives both the gather of a
/// forward lookup and the scatter of its adjoint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrilinearStencil {
    pub indices: [usize; 8],
    pub weights: [f64; 8],
}

impl TrilinearStencil {
    /// Build the stencil at sampling coordinate `coord`.
    ///
    /// Returns `None` when any axis lies outside `[offset, offset + n - 1]`,
    /// which callers treat as a zero sample.
    pub fn new(size: [usize; 3], coord: [f64; 3], offset: f64) -> Option<Self> {
        let mut lo = [0usize; 3];
        let mut hi = [0usize; 3];
        let mut frac = [0.0f64; 3];
        for axis in 0..3 {
            let n = size[axis];
            let u = coord[axis] - offset;
            if n == 0 || !(u >= 0.0 && u <= (n - 1) as f64) {
                return None;
            }
            let i0 = u.floor() as usize;
            lo[axis] = i0;
            hi[axis] = (i0 + 1).min(n - 1);
            frac[axis] = u - i0 as f64;
        }

        let stride_y = size[0];
        let stride_z = size[0] * size[1];
        let mut indices = [0usize; 8];
        let mut weights = [0.0f64; 8];
        for corner in 0..8 {
            let (x, wx) = if corner & 1 == 0 { (lo[0], 1.0 - frac[0]) } else { (hi[0], frac[0]) };
            let (y, wy) = if corner & 2 == 0 { (lo[1], 1.0 - frac[1]) } else { (hi[1], frac[1]) };
            let (z, wz) = if corner & 4 == 0 { (lo[2], 1.0 - frac[2]) } else { (hi[2], frac[2]) };
            indices[corner] = z * stride_z + y * stride_y + x;
            weights[corner] = wx * wy * wz;
        }
        Some(Self { indices, weights })
    }

    /// Weighted sum of the stencil voxels.
    pub fn gather(&self, data: &[f32]) -> f64 {
        self.indices
            .iter()
            .zip(self.weights.iter())
            .map(|(&i, &w)| w * f64::from(data[i]))
            .sum()
    }

    /// Add `value` spread over the stencil voxels (adjoint of [`gather`](Self::gather)).
    pub fn scatter(&self, data: &mut [f32], value: f64) {
        for (&i, &w) in self.indices.iter().zip(self.weights.iter()) {
            if w != 0.0 {
                data[i] += (w * value) as f32;
            }
        }
    }
}

/// Trilinear value of `data` at sampling coordinate `coord`, zero outside.
pub fn sample_trilinear(data: &[f32], size: [usize; 3], coord: [f64; 3], offset: f64) -> f64 {
    TrilinearStencil::new(size, coord, offset).map_or(0.0, |s| s.gather(data))
}
