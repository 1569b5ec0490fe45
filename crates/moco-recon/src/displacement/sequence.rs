//! Time-varying displacement fields.

use std::sync::OnceLock;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use moco_core::image::{ImageMetadata, ImageRegion};
use crate::error::{ReconError, Result};

/// A 4D vector field: one 3D displacement field per respiratory frame.
///
/// The tensor is interleaved `[T, Z, Y, X, 3]`; vectors are in physical
/// units. The spatial grid has its own metadata, independent of the volume.
#[derive(Debug, Clone)]
pub struct DisplacementFieldSequence<B: Backend> {
    data: Tensor<B, 5>,
    metadata: ImageMetadata<3>,
}

impl<B: Backend> DisplacementFieldSequence<B> {
    pub fn new(data: Tensor<B, 5>, metadata: ImageMetadata<3>) -> Result<Self> {
        let dims = data.dims();
        if dims[4] != 3 {
            return Err(ReconError::dimension_mismatch(format!(
                "displacement vectors must have 3 components, got {}",
                dims[4]
            )));
        }
        if dims.iter().any(|&d| d == 0) {
            return Err(ReconError::invalid_configuration(format!(
                "displacement field sequence is empty: {:?}",
                dims
            )));
        }
        Ok(Self { data, metadata })
    }

    /// An identically-zero sequence.
    pub fn zeros(frames: usize, size: [usize; 3], metadata: ImageMetadata<3>, device: &B::Device) -> Result<Self> {
        Self::new(Tensor::zeros([frames, size[2], size[1], size[0], 3], device), metadata)
    }

    pub fn frames(&self) -> usize {
        self.data.dims()[0]
    }

    /// Spatial size in `(x, y, z)` order.
    pub fn size(&self) -> [usize; 3] {
        let [_, z, y, x, _] = self.data.dims();
        [x, y, z]
    }

    pub fn metadata(&self) -> &ImageMetadata<3> {
        &self.metadata
    }

    pub fn data(&self) -> &Tensor<B, 5> {
        &self.data
    }

    /// Largest possible region, frames as the fourth axis.
    pub fn region(&self) -> ImageRegion<4> {
        let [x, y, z] = self.size();
        let index = self.metadata.index();
        ImageRegion::new([index[0], index[1], index[2], 0], [x, y, z, self.frames()])
    }

    /// Split the interleaved vectors into three scalar `[T, Z, Y, X]` fields.
    pub fn decompose(&self) -> DecomposedField<B> {
        let [t, z, y, x, _] = self.data.dims();
        let component = |c: usize| {
            self.data
                .clone()
                .slice([0..t, 0..z, 0..y, 0..x, c..c + 1])
                .reshape([t, z, y, x])
        };
        DecomposedField {
            components: [component(0), component(1), component(2)],
            metadata: self.metadata.clone(),
            host: OnceLock::new(),
        }
    }
}

/// The three scalar component fields of a [`DisplacementFieldSequence`].
///
/// Built once per driver call and read-only afterwards. The host copy is
/// materialised on first use and shared by every projection.
#[derive(Debug)]
pub struct DecomposedField<B: Backend> {
    components: [Tensor<B, 4>; 3],
    metadata: ImageMetadata<3>,
    host: OnceLock<HostField>,
}

impl<B: Backend> DecomposedField<B> {
    /// Component `axis` (0 = x, 1 = y, 2 = z) as `[T, Z, Y, X]`.
    pub fn component(&self, axis: usize) -> &Tensor<B, 4> {
        &self.components[axis]
    }

    /// Component `axis` of one frame as `[Z, Y, X]`.
    pub fn frame_component(&self, axis: usize, frame: usize) -> Tensor<B, 3> {
        let [_, z, y, x] = self.components[axis].dims();
        self.components[axis]
            .clone()
            .slice([frame..frame + 1, 0..z, 0..y, 0..x])
            .reshape([z, y, x])
    }

    pub fn frames(&self) -> usize {
        self.components[0].dims()[0]
    }

    /// Spatial size in `(x, y, z)` order.
    pub fn size(&self) -> [usize; 3] {
        let [_, z, y, x] = self.components[0].dims();
        [x, y, z]
    }

    pub fn metadata(&self) -> &ImageMetadata<3> {
        &self.metadata
    }

    /// Host copy of the components.
    pub fn host(&self) -> &HostField {
        self.host.get_or_init(|| HostField {
            components: [
                to_host(&self.components[0]),
                to_host(&self.components[1]),
                to_host(&self.components[2]),
            ],
            size: self.size(),
            frames: self.frames(),
        })
    }
}

fn to_host<B: Backend>(tensor: &Tensor<B, 4>) -> Vec<f32> {
    tensor.clone().into_data().iter::<f32>().collect()
}

/// Host copies of the three component fields, each row-major `[T, Z, Y, X]`.
#[derive(Debug, Clone, PartialEq)]
pub struct HostField {
    pub components: [Vec<f32>; 3],
    /// Spatial size in `(x, y, z)` order.
    pub size: [usize; 3],
    pub frames: usize,
}

impl HostField {
    /// Number of voxels in one frame.
    pub fn frame_len(&self) -> usize {
        self.size.iter().product()
    }

    /// Component `axis` of one frame.
    pub fn frame(&self, axis: usize, frame: usize) -> &[f32] {
        let len = self.frame_len();
        &self.components[axis][frame * len..(frame + 1) * len]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::TensorData;
    use burn_ndarray::NdArray;

    type Backend = NdArray<f32>;

    #[test]
    fn test_decompose_splits_components() {
        let device = Default::default();
        // 2 frames, 1x1x2 grid: vector (f, k, c) encodes frame, x index and component
        let values: Vec<f32> = (0..2)
            .flat_map(|f| (0..2).flat_map(move |k| (0..3).map(move |c| (100 * f + 10 * k + c) as f32)))
            .collect();
        let data = Tensor::<Backend, 5>::from_data(TensorData::new(values, [2, 1, 1, 2, 3]), &device);
        let sequence = DisplacementFieldSequence::new(data, ImageMetadata::default()).unwrap();
        assert_eq!(sequence.size(), [2, 1, 1]);
        assert_eq!(sequence.region(), ImageRegion::new([0, 0, 0, 0], [2, 1, 1, 2]));

        let field = sequence.decompose();
        let host = field.host();
        assert_eq!(host.components[0], vec![0.0, 10.0, 100.0, 110.0]);
        assert_eq!(host.components[2], vec![2.0, 12.0, 102.0, 112.0]);
        assert_eq!(host.frame(1, 1), &[101.0, 111.0]);

        let frame = field.frame_component(1, 1).into_data().to_vec::<f32>().unwrap();
        assert_eq!(frame, vec![101.0, 111.0]);
    }

    #[test]
    fn test_rejects_non_vector_pixels() {
        let device = Default::default();
        let data = Tensor::<Backend, 5>::zeros([1, 2, 2, 2, 2], &device);
        assert!(DisplacementFieldSequence::new(data, ImageMetadata::default()).is_err());
    }
}
