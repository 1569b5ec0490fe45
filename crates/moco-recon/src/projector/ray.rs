//! Ray planning for the Joseph-style line integral.
//!
//! A ray is stepped plane by plane along the index axis it travels fastest
//! on. Each voxel-centre plane it crosses inside the volume's sampling box
//! contributes one trilinear sample, weighted by the physical distance
//! between consecutive planes along the ray. Forward projection and
//! back-projection walk the same plan, which makes them exact adjoints.

use crate::composer::ProjectionTransforms;

const PARALLEL_EPSILON: f64 = 1e-12;

/// Sample positions of one detector pixel's ray.
#[derive(Debug, Clone, PartialEq)]
pub struct RayPlan {
    origin: [f64; 3],
    direction: [f64; 3],
    axis: usize,
    /// First and one-past-last plane index along `axis`.
    planes: (usize, usize),
    offset: f64,
    size: [usize; 3],
    /// Only points with `t >= 0` belong to the ray.
    half_line: bool,
    step: f64,
}

impl RayPlan {
    /// Plan the ray through pixel `(u, v)` of the current slice.
    ///
    /// `size` is the volume size in `(x, y, z)` order and `offset` the voxel
    /// convention offset. Returns `None` when the ray is degenerate or
    /// misses the sampling box entirely.
    pub fn new(transforms: &ProjectionTransforms, pixel: [f64; 2], size: [usize; 3], offset: f64) -> Option<Self> {
        if size.iter().any(|&n| n == 0) {
            return None;
        }
        let detector = transforms.ray_matrix.transform_point([pixel[0], pixel[1], 0.0]);
        let s = transforms.source;

        let (origin, direction, half_line) = if s[3] == 0.0 {
            (detector, [-s[0], -s[1], -s[2]], false)
        } else {
            let source = [s[0] / s[3], s[1] / s[3], s[2] / s[3]];
            let direction = [
                detector[0] - source[0],
                detector[1] - source[1],
                detector[2] - source[2],
            ];
            (source, direction, true)
        };

        let axis = (0..3)
            .max_by(|&a, &b| direction[a].abs().total_cmp(&direction[b].abs()))
            .unwrap_or(0);
        let d = direction[axis];
        if !d.is_finite() || d.abs() < PARALLEL_EPSILON {
            return None;
        }

        // Physical distance between consecutive planes along the ray.
        let physical = transforms.index_to_physical.transform_vector(direction);
        let step = (physical[0] * physical[0] + physical[1] * physical[1] + physical[2] * physical[2]).sqrt() / d.abs();

        // Planes sit at offset + k; a half line only reaches planes on the far side of its origin.
        let n = size[axis];
        let clamp = |k: f64| k.max(0.0).min(n as f64) as usize;
        let planes = if !half_line {
            (0, n)
        } else if d > 0.0 {
            (clamp((origin[axis] - offset).ceil()), n)
        } else {
            (0, clamp((origin[axis] - offset).floor() + 1.0))
        };

        Some(Self {
            origin,
            direction,
            axis,
            planes,
            offset,
            size,
            half_line,
            step,
        })
        .filter(|plan| plan.samples().next().is_some())
    }

    /// Physical length represented by each sample.
    pub fn step(&self) -> f64 {
        self.step
    }

    /// Index axis the ray is stepped along.
    pub fn axis(&self) -> usize {
        self.axis
    }

    /// Sampling coordinates of the ray's samples inside the box.
    pub fn samples(&self) -> impl Iterator<Item = [f64; 3]> + '_ {
        (self.planes.0..self.planes.1).filter_map(move |k| {
            let plane = self.offset + k as f64;
            let t = (plane - self.origin[self.axis]) / self.direction[self.axis];
            if self.half_line && t < 0.0 {
                return None;
            }
            let mut position = [0.0; 3];
            for a in 0..3 {
                position[a] = if a == self.axis {
                    plane
                } else {
                    self.origin[a] + t * self.direction[a]
                };
            }
            let inside = (0..3).all(|a| {
                position[a] >= self.offset && position[a] <= self.offset + (self.size[a] - 1) as f64
            });
            inside.then_some(position)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use moco_core::transform::HomogeneousMatrix;
    use nalgebra::Vector4;

    fn transforms(ray_matrix: HomogeneousMatrix, source: Vector4<f64>) -> ProjectionTransforms {
        ProjectionTransforms {
            ray_matrix,
            source,
            index_to_physical: HomogeneousMatrix::identity(),
            physical_to_field_index: HomogeneousMatrix::identity(),
            physical_to_index: HomogeneousMatrix::identity(),
            sampling_offset: [0.0; 3],
        }
    }

    #[test]
    fn test_parallel_ray_hits_every_plane() {
        let t = transforms(HomogeneousMatrix::translation([1.0, 2.0, 0.0]), Vector4::new(0.0, 0.0, 1.0, 0.0));
        let plan = RayPlan::new(&t, [0.0, 0.0], [4, 4, 4], 0.5).unwrap();
        let samples: Vec<_> = plan.samples().collect();
        assert_eq!(plan.axis(), 2);
        assert_eq!(plan.step(), 1.0);
        assert_eq!(samples.len(), 4);
        assert_eq!(samples[0], [1.0, 2.0, 0.5]);
        assert_eq!(samples[3], [1.0, 2.0, 3.5]);
    }

    #[test]
    fn test_ray_outside_box_has_no_plan() {
        let t = transforms(HomogeneousMatrix::translation([5.0, 2.0, 0.0]), Vector4::new(0.0, 0.0, 1.0, 0.0));
        assert!(RayPlan::new(&t, [0.0, 0.0], [4, 4, 4], 0.5).is_none());
    }

    #[test]
    fn test_diagonal_step_length() {
        let t = transforms(HomogeneousMatrix::identity(), Vector4::new(-1.0, 0.0, -1.0, 0.0));
        let plan = RayPlan::new(&t, [2.0, 1.0], [4, 4, 4], 0.0).unwrap();
        assert!((plan.step() - 2f64.sqrt()).abs() < 1e-12);
        // Line x = 2 + t, z = t through planes of the dominant axis
        assert!(plan.samples().all(|p| (p[0] - p[2] - 2.0).abs() < 1e-12));
    }

    #[test]
    fn test_cone_ray_starts_at_source() {
        // Source inside the box at z = 1.5, detector pixel at z = 10.
        let t = transforms(HomogeneousMatrix::translation([1.0, 1.0, 10.0]), Vector4::new(1.0, 1.0, 1.5, 1.0));
        let plan = RayPlan::new(&t, [0.0, 0.0], [3, 3, 4], 0.0).unwrap();
        let z: Vec<f64> = plan.samples().map(|p| p[2]).collect();
        assert_eq!(z, vec![2.0, 3.0]);

        // Reversed: detector below the source
        let t = transforms(HomogeneousMatrix::translation([1.0, 1.0, -10.0]), Vector4::new(1.0, 1.0, 1.5, 1.0));
        let plan = RayPlan::new(&t, [0.0, 0.0], [3, 3, 4], 0.0).unwrap();
        let z: Vec<f64> = plan.samples().map(|p| p[2]).collect();
        assert_eq!(z, vec![0.0, 1.0]);
    }

    #[test]
    fn test_degenerate_ray() {
        let t = transforms(HomogeneousMatrix::translation([1.0, 1.0, 1.0]), Vector4::new(1.0, 1.0, 1.0, 1.0));
        assert!(RayPlan::new(&t, [0.0, 0.0], [3, 3, 3], 0.0).is_none());
    }
}
