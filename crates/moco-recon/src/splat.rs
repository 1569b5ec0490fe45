//! Temporal splatting between a 3D volume and the phases of a 4D series.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use moco_core::Image;
use crate::error::Result;
use crate::validation::{validate_shape, validate_weights_row};

/// Accumulates back-projected volumes into a volume series and, as its
/// forward counterpart, blends a series down to one volume.
///
/// Phases with a zero weight are skipped; their data is never read or
/// written.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemporalSplatAccumulator;

impl TemporalSplatAccumulator {
    pub fn new() -> Self {
        Self
    }

    /// `series[φ] += row[φ] · volume` for every phase with a non-zero weight.
    ///
    /// Negative or non-finite weights are rejected.
    pub fn splat<B: Backend>(&self, series: Image<B, 4>, volume: &Tensor<B, 3>, row: &[f32]) -> Result<Image<B, 4>> {
        let [t, z, y, x] = series.shape();
        validate_weights_row(row, t)?;
        validate_shape(volume, [z, y, x])?;

        let (mut data, metadata) = series.into_parts();
        for (phase, &weight) in row.iter().enumerate() {
            if weight == 0.0 {
                continue;
            }
            let ranges = [phase..phase + 1, 0..z, 0..y, 0..x];
            let updated = data.clone().slice(ranges.clone()) + volume.clone().mul_scalar(weight).unsqueeze::<4>();
            data = data.slice_assign(ranges, updated);
        }
        Ok(Image::from_metadata(data, metadata))
    }

    /// `Σ_φ row[φ] · series[φ]` over the phases with a non-zero weight.
    pub fn interpolate<B: Backend>(&self, series: &Image<B, 4>, row: &[f32]) -> Result<Tensor<B, 3>> {
        let [t, z, y, x] = series.shape();
        validate_weights_row(row, t)?;

        let data = series.data();
        let mut volume = Tensor::zeros([z, y, x], &data.device());
        for (phase, &weight) in row.iter().enumerate() {
            if weight == 0.0 {
                continue;
            }
            let frame = data
                .clone()
                .slice([phase..phase + 1, 0..z, 0..y, 0..x])
                .reshape([z, y, x]);
            volume = volume + frame.mul_scalar(weight);
        }
        Ok(volume)
    }
}
