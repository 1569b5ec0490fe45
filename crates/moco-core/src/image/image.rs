//! Image type with physical metadata and coordinate transformations.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use crate::image::{ImageMetadata, ImageRegion};
use crate::spatial::{Direction, Point, Spacing};
use crate::transform::HomogeneousMatrix;

/// Image with physical metadata.
///
/// Combines tensor data (potentially on GPU) with the physical space
/// metadata that describes how indices map to physical coordinates.
///
/// # Type Parameters
/// * `B` - The backend (CPU or GPU) for tensor operations
/// * `D` - The dimensionality of the image
///
/// # Layout
/// The tensor is row-major with the *last* spatial axis first: a volume is
/// `[Z, Y, X]`, a projection stack `[P, V, U]`, a volume series
/// `[T, Z, Y, X]`. Metadata (origin, spacing, direction, index) uses the
/// opposite order `(x, y, z, ...)`.
///
/// # Examples
/// ```rust
/// use moco_core::Image;
/// use moco_core::spatial::{Point3, Spacing3, Direction3};
/// use burn::tensor::Tensor;
/// use burn_ndarray::NdArray;
///
/// type Backend = NdArray<f32>;
///
/// let device = Default::default();
/// let data = Tensor::<Backend, 3>::zeros([4, 4, 4], &device);
/// let image = Image::new(
///     data,
///     Point3::new([-1.5, -1.5, -1.5]),
///     Spacing3::uniform(1.0),
///     Direction3::identity(),
/// );
/// assert_eq!(image.size(), [4, 4, 4]);
/// ```
#[derive(Debug, Clone)]
pub struct Image<B: Backend, const D: usize> {
    data: Tensor<B, D>,
    metadata: ImageMetadata<D>,
}

impl<B: Backend, const D: usize> Image<B, D> {
    /// Create a new image with the given data and metadata, buffered at index zero.
    pub fn new(
        data: Tensor<B, D>,
        origin: Point<D>,
        spacing: Spacing<D>,
        direction: Direction<D>,
    ) -> Self {
        Self {
            data,
            metadata: ImageMetadata::new(origin, spacing, direction),
        }
    }

    /// Create an image from data and a full metadata record.
    pub fn from_metadata(data: Tensor<B, D>, metadata: ImageMetadata<D>) -> Self {
        Self { data, metadata }
    }

    /// Allocate an image filled with `value` over `size` (axis order `(x, y, ...)`).
    ///
    /// This is the constant source used to initialise destination buffers.
    pub fn constant(
        size: [usize; D],
        value: f32,
        metadata: ImageMetadata<D>,
        device: &B::Device,
    ) -> Self {
        let mut shape = size;
        shape.reverse();
        Self {
            data: Tensor::full(shape, value, device),
            metadata,
        }
    }

    /// Set the buffered index of the first element.
    pub fn with_index(mut self, index: [i64; D]) -> Self {
        self.metadata.set_index(index);
        self
    }

    /// Get the image data tensor.
    pub fn data(&self) -> &Tensor<B, D> {
        &self.data
    }

    /// Split into data and metadata.
    pub fn into_parts(self) -> (Tensor<B, D>, ImageMetadata<D>) {
        (self.data, self.metadata)
    }

    pub fn metadata(&self) -> &ImageMetadata<D> {
        &self.metadata
    }

    /// Get the origin (physical coordinate of index 0).
    pub fn origin(&self) -> &Point<D> {
        self.metadata.origin()
    }

    pub fn spacing(&self) -> &Spacing<D> {
        self.metadata.spacing()
    }

    pub fn direction(&self) -> &Direction<D> {
        self.metadata.direction()
    }

    /// Absolute index of the first buffered element, `(x, y, ...)` order.
    pub fn index(&self) -> &[i64; D] {
        self.metadata.index()
    }

    /// Tensor shape (last spatial axis first).
    pub fn shape(&self) -> [usize; D] {
        self.data.dims()
    }

    /// Grid size in `(x, y, ...)` order.
    pub fn size(&self) -> [usize; D] {
        let mut size = self.data.dims();
        size.reverse();
        size
    }

    /// The buffered region: index and size.
    pub fn region(&self) -> ImageRegion<D> {
        ImageRegion::new(*self.index(), self.size())
    }

    /// Convert a continuous physical point to a continuous absolute index.
    ///
    /// `index = (Direction^-1 * (point - origin)) / spacing`
    ///
    /// Returns `None` if the direction matrix is singular.
    pub fn transform_physical_point_to_continuous_index(&self, point: &Point<D>) -> Option<Point<D>> {
        let diff = *point - *self.origin();
        let rotated = self.direction().try_inverse()? * diff;
        let mut index = Point::<D>::origin();
        for i in 0..D {
            index[i] = rotated[i] / self.spacing()[i];
        }
        Some(index)
    }

    /// Convert a continuous absolute index to a physical point.
    ///
    /// `point = origin + Direction * (index * spacing)`
    pub fn transform_continuous_index_to_physical_point(&self, index: &Point<D>) -> Point<D> {
        let mut scaled = crate::spatial::Vector::<D>::zeros();
        for i in 0..D {
            scaled[i] = index[i] * self.spacing()[i];
        }
        *self.origin() + *self.direction() * scaled
    }
}

impl<B: Backend> Image<B, 3> {
    /// Homogeneous absolute-index to physical matrix.
    pub fn index_to_physical_matrix(&self) -> HomogeneousMatrix {
        self.metadata.index_to_physical_matrix()
    }

    /// Homogeneous physical to absolute-index matrix.
    pub fn physical_to_index_matrix(&self) -> Option<HomogeneousMatrix> {
        self.metadata.physical_to_index_matrix()
    }
}
