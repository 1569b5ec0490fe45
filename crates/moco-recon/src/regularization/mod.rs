//! Regularization of reconstructed volume series.
//!
//! Iterative 4D reconstruction alternates data-consistency steps, built
//! from the projection drivers, with a regularization step applied to the
//! whole series.
//!
//! # Available Regularizers
//!
//! * **TotalVariationDenoising**: isotropic TV over selected axes, with
//!   optional periodic boundaries (the phase axis is cyclic)

pub mod trait_;
pub mod total_variation;

pub use trait_::Regularizer;
pub use total_variation::TotalVariationDenoising;
