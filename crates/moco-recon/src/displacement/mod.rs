//! Displacement field sequences and their samplers.

pub mod sampler;
pub mod sequence;

pub use sampler::{DisplacementSampler, FramePosition, HostDisplacementSampler};
pub use sequence::{DecomposedField, DisplacementFieldSequence, HostField};
