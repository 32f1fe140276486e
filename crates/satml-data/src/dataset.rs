// Dataset trait — unified interface for any indexed image source

use satml_core::Result;

/// A single image in row-major `[C, H, W]` layout.
///
/// Pixel values are widened to `f32`, the element type batches are built
/// from.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    /// Pixel values, channel-first, row-major.
    pub data: Vec<f32>,
    /// `[C, H, W]`.
    pub shape: [usize; 3],
}

impl Image {
    pub fn new(data: Vec<f32>, shape: [usize; 3]) -> Self {
        debug_assert_eq!(data.len(), shape.iter().product::<usize>());
        Self { data, shape }
    }

    pub fn channels(&self) -> usize {
        self.shape[0]
    }

    pub fn height(&self) -> usize {
        self.shape[1]
    }

    pub fn width(&self) -> usize {
        self.shape[2]
    }

    /// Number of pixels in one channel plane.
    pub fn plane_len(&self) -> usize {
        self.height() * self.width()
    }

    /// Pixels of channel `c`.
    pub fn channel(&self, c: usize) -> &[f32] {
        let p = self.plane_len();
        &self.data[c * p..(c + 1) * p]
    }
}

/// A single sample: an image and its class index.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub image: Image,
    /// Row of the `1` in the sample's one-hot label column.
    pub label: usize,
}

/// A dataset is an indexed collection of samples.
///
/// Implementations must be `Send + Sync` so loaders can read from several
/// worker threads at once without locking.
pub trait Dataset: Send + Sync {
    /// Total number of samples in the dataset.
    fn len(&self) -> usize;

    /// Whether the dataset is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Retrieve the sample at position `index`.
    ///
    /// Fails with `Error::Index` when `index >= self.len()`.
    fn get(&self, index: usize) -> Result<Sample>;

    /// The `[C, H, W]` shape of every image.
    fn image_shape(&self) -> [usize; 3];

    /// Optional human-readable name.
    fn name(&self) -> &str {
        "dataset"
    }
}
