//! Validation utilities for the projection drivers.
//!
//! Every check runs before the first projection is launched, so a failed
//! call never leaves a partially updated destination behind.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use moco_core::ImageMetadata;
use crate::error::{ReconError, Result};

/// Validate that a grid has a positive finite spacing and an invertible direction.
pub fn validate_grid<const D: usize>(metadata: &ImageMetadata<D>, what: &str) -> Result<()> {
    if !metadata.spacing().is_valid() {
        return Err(ReconError::invalid_configuration(format!(
            "{} spacing must be finite and positive, got {:?}",
            what,
            metadata.spacing().to_array()
        )));
    }
    if metadata.direction().try_inverse().is_none() {
        return Err(ReconError::invalid_configuration(format!(
            "{} direction matrix is singular",
            what
        )));
    }
    Ok(())
}

/// Validate that two tensors live on the same device.
pub fn validate_same_device<B: Backend, const D1: usize, const D2: usize>(
    a: &Tensor<B, D1>,
    b: &Tensor<B, D2>,
    what: &str,
) -> Result<()> {
    let (da, db) = (a.device(), b.device());
    if da != db {
        return Err(ReconError::device(format!("{}: {:?} vs {:?}", what, da, db)));
    }
    Ok(())
}

/// Validate a tensor's shape.
pub fn validate_shape<B: Backend, const D: usize>(tensor: &Tensor<B, D>, expected: [usize; D]) -> Result<()> {
    let actual = tensor.dims();
    if actual != expected {
        return Err(ReconError::shape_mismatch(&expected, &actual));
    }
    Ok(())
}

/// Validate that a weights row has one finite, non-negative entry per phase.
pub fn validate_weights_row(row: &[f32], phases: usize) -> Result<()> {
    if row.len() != phases {
        return Err(ReconError::dimension_mismatch(format!(
            "weights row has {} entries but the series has {} phases",
            row.len(),
            phases
        )));
    }
    if let Some(bad) = row.iter().find(|w| !w.is_finite() || **w < 0.0) {
        return Err(ReconError::invalid_configuration(format!(
            "temporal weight {} is not a finite non-negative value",
            bad
        )));
    }
    Ok(())
}
