// Transform — per-image preprocessing applied on access

use crate::dataset::Image;

/// A pure function applied to each image when it is read.
///
/// Transforms run lazily inside `Dataset::get`, never ahead of time, and may
/// be called from several loader threads at once.
pub trait Transform: Send + Sync {
    /// Apply the transform to an image, returning the modified image.
    fn apply(&self, image: Image) -> Image;
}

/// Any thread-safe closure `Image -> Image` is a transform.
impl<F> Transform for F
where
    F: Fn(Image) -> Image + Send + Sync,
{
    fn apply(&self, image: Image) -> Image {
        self(image)
    }
}

// Built-in transforms

/// Divide every pixel by 255, mapping byte images to `[0, 1]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScaleToUnit;

impl Transform for ScaleToUnit {
    fn apply(&self, mut image: Image) -> Image {
        for v in &mut image.data {
            *v /= 255.0;
        }
        image
    }
}

/// Per-channel normalization: `(x - mean[c]) / std[c]`.
///
/// A single mean/std pair is broadcast to every channel. The SAT training
/// scripts use `Normalize::new(vec![0.5; 4], vec![0.5; 4])` after
/// [`ScaleToUnit`], mapping pixels to `[-1, 1]`.
#[derive(Debug, Clone)]
pub struct Normalize {
    mean: Vec<f32>,
    std: Vec<f32>,
}

impl Normalize {
    pub fn new(mean: Vec<f32>, std: Vec<f32>) -> Self {
        assert_eq!(
            mean.len(),
            std.len(),
            "Normalize: {} means but {} stds",
            mean.len(),
            std.len()
        );
        Self { mean, std }
    }

    /// The same mean and std for every channel.
    pub fn uniform(mean: f32, std: f32) -> Self {
        Self::new(vec![mean], vec![std])
    }
}

impl Transform for Normalize {
    fn apply(&self, mut image: Image) -> Image {
        let channels = image.channels();
        let plane = image.plane_len();
        assert!(
            self.mean.len() == 1 || self.mean.len() == channels,
            "Normalize: {} channel statistics for a {}-channel image",
            self.mean.len(),
            channels
        );
        for (c, chunk) in image.data.chunks_mut(plane.max(1)).enumerate() {
            let k = if self.mean.len() == 1 { 0 } else { c };
            let (m, s) = (self.mean[k], self.std[k]);
            for v in chunk {
                *v = (*v - m) / s;
            }
        }
        image
    }
}

/// Chain multiple transforms, applied in order.
pub struct Compose {
    transforms: Vec<Box<dyn Transform>>,
}

impl Compose {
    pub fn new(transforms: Vec<Box<dyn Transform>>) -> Self {
        Self { transforms }
    }
}

impl Transform for Compose {
    fn apply(&self, mut image: Image) -> Image {
        for t in &self.transforms {
            image = t.apply(image);
        }
        image
    }
}
