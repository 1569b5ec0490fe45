//! Interpolator trait for sampling values at continuous coordinates.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Interpolator trait for sampling values at continuous coordinates.
///
/// # Type Parameters
/// * `B` - The Burn backend
pub trait Interpolator<B: Backend> {
    /// Interpolate values from a volume at given sampling coordinates.
    ///
    /// # Arguments
    /// * `data` - The source volume `[Z, Y, X]`
    /// * `coords` - Sampling coordinates `[Batch, 3]` in `(x, y, z)` order
    ///
    /// # Returns
    /// Tensor of sampled values `[Batch]`
    fn interpolate(&self, data: &Tensor<B, 3>, coords: Tensor<B, 2>) -> Tensor<B, 1>;
}
