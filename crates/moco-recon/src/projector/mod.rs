//! Deformable ray projectors.
//!
//! [`Projector`] is the seam between the iteration drivers and the two
//! implementations: [`HostProjector`] walks rays on host copies of the
//! buffers with rayon, [`TensorProjector`] plans rays on the host and
//! performs the warped gathers and scatters as batched burn operations.
//! Both walk identical [`RayPlan`]s, so they agree up to rounding.

pub mod host;
pub mod ray;
pub mod tensor;

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use crate::composer::ProjectionTransforms;
use crate::config::{ProjectorConfig, ProjectorKind};
use crate::displacement::{DecomposedField, FramePosition};

pub use host::HostProjector;
pub use ray::RayPlan;
pub use tensor::TensorProjector;

/// Displacement applied to every sample of one projection.
#[derive(Debug)]
pub struct Warp<'a, B: Backend> {
    pub field: &'a DecomposedField<B>,
    pub frame: FramePosition,
}

impl<B: Backend> Clone for Warp<'_, B> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<B: Backend> Copy for Warp<'_, B> {}

/// Per-projection inputs shared by forward and back projection.
#[derive(Debug)]
pub struct RayContext<'a, B: Backend> {
    pub transforms: &'a ProjectionTransforms,
    /// `None` samples the volume unwarped.
    pub warp: Option<Warp<'a, B>>,
}

impl<B: Backend> Clone for RayContext<'_, B> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<B: Backend> Copy for RayContext<'_, B> {}

/// Forward projector and its adjoint.
pub trait Projector<B: Backend>: Send + Sync + std::fmt::Debug {
    fn kind(&self) -> ProjectorKind;

    /// Add the line integrals through `volume` `[Z, Y, X]` to `slice` `[V, U]`.
    fn forward(&self, volume: &Tensor<B, 3>, slice: Tensor<B, 2>, ctx: &RayContext<'_, B>) -> Tensor<B, 2>;

    /// Back-project `slice` `[V, U]` into a zero volume of tensor shape `[Z, Y, X]`.
    fn backward(&self, slice: &Tensor<B, 2>, shape: [usize; 3], ctx: &RayContext<'_, B>) -> Tensor<B, 3>;
}

/// Build the projector selected by `config`.
pub fn build_projector<B: Backend>(config: &ProjectorConfig) -> Box<dyn Projector<B>> {
    match config.kind {
        ProjectorKind::Host => Box::new(HostProjector::new(config.convention)),
        ProjectorKind::Tensor => Box::new(TensorProjector::new(config.convention)),
    }
}
