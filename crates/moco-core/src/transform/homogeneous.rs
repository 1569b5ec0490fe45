//! Homogeneous 4×4 matrices.
//!
//! Every space change in the projectors (projection index, physical,
//! volume index, displacement-field index) is a 4×4 homogeneous matrix.
//! Matrices are composed on the host in double precision and handed to the
//! sampling kernels in a compact single-precision transfer format.

use nalgebra::{Matrix3, Matrix4, Vector3, Vector4};
use serde::{Deserialize, Serialize};
use crate::spatial::{Direction, Point, Spacing};

/// Number of `f32` values in the transfer format (the last row is implied).
pub const WIRE_LEN: usize = 12;

/// A 4×4 homogeneous transform.
///
/// The last row is `[0, 0, 0, 1]` for every matrix built by this crate,
/// which is what allows the 12-value transfer format.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HomogeneousMatrix(pub Matrix4<f64>);

impl HomogeneousMatrix {
    /// The identity transform.
    pub fn identity() -> Self {
        Self(Matrix4::identity())
    }

    /// Pure translation by `offset`.
    pub fn translation(offset: [f64; 3]) -> Self {
        Self(Matrix4::new_translation(&Vector3::from(offset)))
    }

    /// Build from a 3×3 linear part and a translation column.
    pub fn from_parts(linear: Matrix3<f64>, translation: Vector3<f64>) -> Self {
        let mut m = linear.to_homogeneous();
        m.fixed_view_mut::<3, 1>(0, 3).copy_from(&translation);
        Self(m)
    }

    /// Rebuild a matrix from its transfer format.
    pub fn from_wire(wire: &[f32; WIRE_LEN]) -> Self {
        let mut m = Matrix4::identity();
        for (j, value) in wire.iter().enumerate() {
            m[(j / 4, j % 4)] = f64::from(*value);
        }
        Self(m)
    }

    /// Row-major single-precision transfer format, last row omitted.
    pub fn to_wire(&self) -> [f32; WIRE_LEN] {
        let mut wire = [0.0f32; WIRE_LEN];
        for (j, value) in wire.iter_mut().enumerate() {
            *value = self.0[(j / 4, j % 4)] as f32;
        }
        wire
    }

    /// Linear (upper-left 3×3) part.
    pub fn linear(&self) -> Matrix3<f64> {
        self.0.fixed_view::<3, 3>(0, 0).into_owned()
    }

    /// Add `offset` to the translation column (left-multiplication by a translation).
    pub fn translated(mut self, offset: [f64; 3]) -> Self {
        for (i, value) in offset.iter().enumerate() {
            self.0[(i, 3)] += value;
        }
        self
    }

    /// Map a point (w = 1).
    pub fn transform_point(&self, p: [f64; 3]) -> [f64; 3] {
        let m = &self.0;
        [
            m[(0, 0)] * p[0] + m[(0, 1)] * p[1] + m[(0, 2)] * p[2] + m[(0, 3)],
            m[(1, 0)] * p[0] + m[(1, 1)] * p[1] + m[(1, 2)] * p[2] + m[(1, 3)],
            m[(2, 0)] * p[0] + m[(2, 1)] * p[1] + m[(2, 2)] * p[2] + m[(2, 3)],
        ]
    }

    /// Map a direction (w = 0), ignoring the translation.
    pub fn transform_vector(&self, v: [f64; 3]) -> [f64; 3] {
        let m = &self.0;
        [
            m[(0, 0)] * v[0] + m[(0, 1)] * v[1] + m[(0, 2)] * v[2],
            m[(1, 0)] * v[0] + m[(1, 1)] * v[1] + m[(1, 2)] * v[2],
            m[(2, 0)] * v[0] + m[(2, 1)] * v[1] + m[(2, 2)] * v[2],
        ]
    }

    /// Map a full homogeneous 4-vector.
    pub fn transform_homogeneous(&self, v: &Vector4<f64>) -> Vector4<f64> {
        self.0 * v
    }

    /// Inverse, if the matrix is invertible.
    pub fn try_inverse(&self) -> Option<Self> {
        self.0.try_inverse().map(Self)
    }

    /// Get the inner nalgebra matrix.
    pub fn inner(&self) -> &Matrix4<f64> {
        &self.0
    }
}

impl Default for HomogeneousMatrix {
    fn default() -> Self {
        Self::identity()
    }
}

impl std::ops::Mul for HomogeneousMatrix {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self::Output {
        Self(self.0 * rhs.0)
    }
}

/// Index-to-physical-point matrix of a 3D grid.
///
/// `x = origin + direction · diag(spacing) · index`, with `index` the
/// absolute (center-convention) voxel index.
pub fn index_to_physical_matrix(
    origin: &Point<3>,
    spacing: &Spacing<3>,
    direction: &Direction<3>,
) -> HomogeneousMatrix {
    let scale = Matrix3::from_diagonal(spacing.inner());
    HomogeneousMatrix::from_parts(direction.inner() * scale, origin.inner().coords)
}

/// Physical-point-to-index matrix of a 3D grid.
///
/// Returns `None` when the direction matrix is singular or a spacing
/// component is zero.
pub fn physical_to_index_matrix(
    origin: &Point<3>,
    spacing: &Spacing<3>,
    direction: &Direction<3>,
) -> Option<HomogeneousMatrix> {
    if !spacing.is_valid() {
        return None;
    }
    let inv_dir = direction.try_inverse()?;
    let inv_scale = Matrix3::from_diagonal(&spacing.inner().map(|s| 1.0 / s));
    let linear = inv_scale * inv_dir.inner();
    let translation = -(linear * origin.inner().coords);
    Some(HomogeneousMatrix::from_parts(linear, translation))
}
