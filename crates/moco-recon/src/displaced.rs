//! Displaced-detector weighting.
//!
//! A detector shifted sideways on a full rotation sees the central band of
//! the field of view twice (once from each side) and the outer band once.
//! Before back-projection each column `u` is weighted by its signed distance
//! `l` to the central ray: with `θ` the half-width of the doubly measured
//! band, the weight ramps as `2 sin²(π (l + θ) / 4θ)` across the band, is 2
//! on the singly measured side and 0 on the side that is measured by the
//! opposite view. Weights of the two views of one ray sum to 2.

use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use moco_core::{GeometryRecord, ImageMetadata};
use std::f64::consts::PI;
use crate::error::{ReconError, Result};

/// Relative asymmetry below which a detector counts as centred.
const CENTRED_TOLERANCE: f64 = 0.1;

const PLANE_EPSILON: f64 = 1e-12;

/// Column weighting of projections acquired with a laterally displaced detector.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisplacedDetectorWeighting;

impl DisplacedDetectorWeighting {
    pub fn new() -> Self {
        Self
    }

    /// Weights of the `width` columns of one projection, or `None` when the
    /// detector is centred on the central ray and needs no weighting.
    ///
    /// Columns are measured on the stack grid at its first row; `stack` is
    /// the grid of the whole projection stack, not a requested window.
    pub fn column_weights<G: GeometryRecord>(
        &self,
        record: &G,
        stack: &ImageMetadata<3>,
        width: usize,
    ) -> Result<Option<Vec<f64>>> {
        if width == 0 {
            return Ok(None);
        }
        let central = central_ray_u(record)?;

        let to_physical = stack.index_to_physical_matrix();
        let [u0, v0, _] = *stack.index();
        let positions: Vec<f64> = (0..width as i64)
            .map(|i| to_physical.transform_point([(u0 + i) as f64, v0 as f64, 0.0])[0] - central)
            .collect();
        let inferior = positions.iter().copied().fold(f64::INFINITY, f64::min);
        let superior = positions.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        if (inferior + superior).abs() <= CENTRED_TOLERANCE * (superior - inferior).abs() {
            return Ok(None);
        }

        let theta = (-inferior).min(superior);
        if theta <= 0.0 {
            return Err(ReconError::invalid_configuration(format!(
                "central ray falls outside the detector (columns span [{:.3}, {:.3}] around it)",
                inferior, superior
            )));
        }

        let positive = inferior + superior > 0.0;
        let weights = positions
            .iter()
            .map(|&l| {
                // Mirror the negative case onto the positive one.
                let l = if positive { l } else { -l };
                if l <= -theta {
                    0.0
                } else if l >= theta {
                    2.0
                } else {
                    2.0 * (PI * (l + theta) / (4.0 * theta)).sin().powi(2)
                }
            })
            .collect();
        Ok(Some(weights))
    }

    /// Multiply every row of `slice` `[V, U]` by `weights[u0..u0 + U]`.
    pub fn apply<B: Backend>(&self, slice: Tensor<B, 2>, weights: &[f64], u0: usize) -> Tensor<B, 2> {
        let [_, nu] = slice.dims();
        let columns: Vec<f32> = weights[u0..u0 + nu].iter().map(|&w| w as f32).collect();
        let columns = Tensor::<B, 2>::from_data(TensorData::new(columns, [1, nu]), &slice.device());
        slice * columns
    }
}

/// Detector `u` where the ray through the isocenter meets the detector plane.
fn central_ray_u<G: GeometryRecord>(record: &G) -> Result<f64> {
    let to_detector = record
        .projection_to_fixed_matrix()
        .try_inverse()
        .ok_or_else(|| ReconError::invalid_configuration("projection matrix is not invertible"))?;
    let source = record.source_position();
    let isocenter = to_detector.transform_point([0.0, 0.0, 0.0]);

    let direction = if source[3] == 0.0 {
        to_detector.transform_vector([source[0], source[1], source[2]])
    } else {
        let s = to_detector.transform_point([source[0] / source[3], source[1] / source[3], source[2] / source[3]]);
        [isocenter[0] - s[0], isocenter[1] - s[1], isocenter[2] - s[2]]
    };
    if direction[2].abs() < PLANE_EPSILON {
        return Err(ReconError::invalid_configuration("central ray is parallel to the detector"));
    }
    Ok(isocenter[0] - isocenter[2] * direction[0] / direction[2])
}
