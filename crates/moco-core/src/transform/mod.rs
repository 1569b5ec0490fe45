//! Homogeneous transforms between physical and index spaces.

pub mod homogeneous;

pub use homogeneous::{
    index_to_physical_matrix, physical_to_index_matrix, HomogeneousMatrix, WIRE_LEN,
};
