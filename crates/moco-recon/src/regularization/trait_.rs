//! Regularizer trait definition.
//!
//! This module defines the core trait for regularizers applied to a volume
//! series between reconstruction iterations.

use burn::tensor::backend::Backend;
use moco_core::Image;
use crate::error::Result;

/// Trait for volume series regularizers.
///
/// # Type Parameters
/// * `B` - The backend type
pub trait Regularizer<B: Backend> {
    /// Regularize `series` (tensor shape `[T, Z, Y, X]`).
    fn apply(&self, series: Image<B, 4>) -> Result<Image<B, 4>>;

    /// Get the weight (strength) of this regularizer.
    fn weight(&self) -> f64;

    /// Set the weight (strength) of this regularizer.
    fn set_weight(&mut self, weight: f64);
}

/// Finite differences over `[T, Z, Y, X]` tensors.
///
/// Axes are numbered in image order, `0 = x` through `3 = t`; axis `a` is
/// tensor dimension `3 - a`.
pub mod utils {
    use burn::tensor::backend::Backend;
    use burn::tensor::Tensor;

    /// Tensor dimension of image axis `axis`.
    pub fn tensor_dim(axis: usize) -> usize {
        3 - axis
    }

    /// Forward difference along `axis`.
    ///
    /// With a periodic boundary the last sample differences against the
    /// first; otherwise it is zero.
    pub fn forward_difference<B: Backend>(u: Tensor<B, 4>, axis: usize, periodic: bool) -> Tensor<B, 4> {
        let dim = tensor_dim(axis);
        let n = u.dims()[dim];
        if n < 2 {
            return u.zeros_like();
        }
        let head = u.clone().narrow(dim, 0, n - 1);
        let tail = u.clone().narrow(dim, 1, n - 1);
        let inner = tail - head;
        let last = if periodic {
            u.clone().narrow(dim, 0, 1) - u.narrow(dim, n - 1, 1)
        } else {
            u.narrow(dim, n - 1, 1).zeros_like()
        };
        Tensor::cat(vec![inner, last], dim)
    }

    /// Backward difference along `axis`: the negative adjoint of
    /// [`forward_difference`] with the same boundary.
    pub fn backward_difference<B: Backend>(p: Tensor<B, 4>, axis: usize, periodic: bool) -> Tensor<B, 4> {
        let dim = tensor_dim(axis);
        let n = p.dims()[dim];
        if n < 2 {
            return p.zeros_like();
        }
        if periodic {
            let previous = Tensor::cat(vec![p.clone().narrow(dim, n - 1, 1), p.clone().narrow(dim, 0, n - 1)], dim);
            return p - previous;
        }
        // div[0] = p[0], div[i] = p[i] - p[i-1], div[n-1] = -p[n-2]
        let first = p.clone().narrow(dim, 0, 1);
        let last = p.clone().narrow(dim, n - 2, 1).neg();
        if n == 2 {
            return Tensor::cat(vec![first, last], dim);
        }
        let inner = p.clone().narrow(dim, 1, n - 2) - p.narrow(dim, 0, n - 2);
        Tensor::cat(vec![first, inner, last], dim)
    }

    /// Forward-difference gradient along every processed axis.
    pub fn gradient<B: Backend>(u: &Tensor<B, 4>, processed: &[bool; 4], periodic: &[bool; 4]) -> Vec<Tensor<B, 4>> {
        (0..4)
            .filter(|&a| processed[a])
            .map(|a| forward_difference(u.clone(), a, periodic[a]))
            .collect()
    }

    /// Divergence of a field produced by [`gradient`] with the same masks.
    pub fn divergence<B: Backend>(p: &[Tensor<B, 4>], processed: &[bool; 4], periodic: &[bool; 4]) -> Option<Tensor<B, 4>> {
        (0..4)
            .filter(|&a| processed[a])
            .zip(p)
            .map(|(a, component)| backward_difference(component.clone(), a, periodic[a]))
            .reduce(|acc, d| acc + d)
    }
}
