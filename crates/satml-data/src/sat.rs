// SAT-4 / SAT-6 — windowed views over the DeepSat MAT container
//
// The container stores images as [H, W, C, N] and one-hot labels as [K, N],
// both column-major. Three phases are cut from it:
//
//   train  columns [0, train_end)        of train_x / train_y
//   val    columns [train_end, val_end)  of train_x / train_y
//   test   every column                  of test_x / test_y
//
// Construction copies the phase's window out of the container and transposes
// every image to row-major [C, H, W] once, so `get` is a slice copy plus the
// optional transform.

use std::fmt;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::info;

use satml_core::{Error, NdArray, Result, Shape, Storage};

use crate::dataset::{Dataset, Image, Sample};
use crate::mat::MatFile;
use crate::transform::Transform;

/// Which window of the container a dataset exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Phase {
    #[default]
    Train,
    Val,
    Test,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Train => "train",
            Phase::Val => "val",
            Phase::Test => "test",
        }
    }

    /// Names of the (images, labels) arrays the phase reads.
    pub fn array_names(&self) -> (&'static str, &'static str) {
        match self {
            Phase::Train | Phase::Val => ("train_x", "train_y"),
            Phase::Test => ("test_x", "test_y"),
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "train" => Ok(Phase::Train),
            "val" => Ok(Phase::Val),
            "test" => Ok(Phase::Test),
            other => Err(Error::invalid(format!(
                "unknown phase `{other}` (expected train, val or test)"
            ))),
        }
    }
}

/// Column boundaries of the train and val windows inside `train_x`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionBounds {
    pub train_end: usize,
    pub val_end: usize,
}

impl Default for PartitionBounds {
    fn default() -> Self {
        Self {
            train_end: 30_000,
            val_end: 40_000,
        }
    }
}

impl PartitionBounds {
    pub fn new(train_end: usize, val_end: usize) -> Result<Self> {
        if train_end == 0 || val_end < train_end {
            return Err(Error::invalid(format!(
                "partition bounds must satisfy 0 < train_end <= val_end, got {train_end} and {val_end}"
            )));
        }
        Ok(Self { train_end, val_end })
    }

    /// Source column range for `phase`, clamped to `n` stored columns.
    pub fn window(&self, phase: Phase, n: usize) -> Range<usize> {
        let (start, end) = match phase {
            Phase::Train => (0, self.train_end),
            Phase::Val => (self.train_end, self.val_end),
            Phase::Test => (0, n),
        };
        let end = end.min(n);
        start.min(end)..end
    }
}

/// One phase of a SAT-4/SAT-6 container as an indexable dataset.
///
/// Read-only after construction; `get` may be called from any number of
/// threads.
pub struct SatDataset {
    phase: Phase,
    window: Range<usize>,
    image_shape: [usize; 3],
    /// `len` images, each row-major [C, H, W].
    images: Storage,
    num_classes: usize,
    /// `len` one-hot columns of `num_classes` entries.
    targets: Storage,
    transform: Option<Box<dyn Transform>>,
    name: String,
}

impl SatDataset {
    /// Load `phase` from the container at `path` with the default bounds.
    pub fn load(
        path: impl AsRef<Path>,
        phase: Phase,
        transform: Option<Box<dyn Transform>>,
    ) -> Result<Self> {
        let mat = MatFile::open(path.as_ref())?;
        Self::from_container(&mat, phase, PartitionBounds::default(), transform)
            .map_err(|e| e.at_path(path.as_ref()))
    }

    /// Start configuring a dataset read from `path`.
    pub fn builder(path: impl Into<PathBuf>) -> SatDatasetBuilder {
        SatDatasetBuilder {
            path: path.into(),
            phase: Phase::default(),
            bounds: PartitionBounds::default(),
            transform: None,
        }
    }

    /// Cut `phase` out of an already-loaded container.
    pub fn from_container(
        mat: &MatFile,
        phase: Phase,
        bounds: PartitionBounds,
        transform: Option<Box<dyn Transform>>,
    ) -> Result<Self> {
        let (x_name, y_name) = phase.array_names();
        let x = mat.require(x_name)?;
        let y = mat.require(y_name)?;

        let (h, w, c, n) = match *x.dims() {
            [h, w, c, n] => (h, w, c, n),
            // MATLAB drops a trailing singleton: one image is [H, W, C].
            [h, w, c] => (h, w, c, 1),
            _ => {
                return Err(Error::data_load(
                    "",
                    format!("`{x_name}` must be [H, W, C, N], got {}", x.shape()),
                ))
            }
        };
        let (k, n_labels) = match *y.dims() {
            [k, n] => (k, n),
            _ => {
                return Err(Error::data_load(
                    "",
                    format!("`{y_name}` must be [K, N], got {}", y.shape()),
                ))
            }
        };
        if n != n_labels {
            return Err(Error::data_load(
                "",
                format!("`{x_name}` holds {n} images but `{y_name}` holds {n_labels} labels"),
            ));
        }

        let window = bounds.window(phase, n);
        let images = to_channel_first(x, [h, w, c], window.clone());
        let targets = y.narrow_last(window.start, window.end)?.into_storage();

        let dataset = Self {
            phase,
            window,
            image_shape: [c, h, w],
            images,
            num_classes: k,
            targets,
            transform,
            name: format!("SAT-{phase}"),
        };
        info!(
            phase = %phase,
            len = dataset.len(),
            channels = c,
            height = h,
            width = w,
            classes = k,
            "built SAT dataset window"
        );
        Ok(dataset)
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Column of the stored array that sample `index` comes from.
    pub fn source_column(&self, index: usize) -> Option<usize> {
        (index < self.len()).then(|| self.window.start + index)
    }

    /// Decode the label of sample `index` without touching its image.
    pub fn label(&self, index: usize) -> Result<usize> {
        self.check(index)?;
        let base = index * self.num_classes;
        (0..self.num_classes)
            .find(|&r| self.targets.get_f64(base + r) == 1.0)
            .ok_or(Error::LabelDecode {
                index,
                column: self.window.start + index,
            })
    }

    /// Decoded labels of every sample, in order.
    pub fn labels(&self) -> Result<Vec<usize>> {
        (0..self.len()).map(|i| self.label(i)).collect()
    }

    /// Number of samples per class.
    pub fn class_counts(&self) -> Result<Vec<usize>> {
        let mut counts = vec![0; self.num_classes];
        for label in self.labels()? {
            counts[label] += 1;
        }
        Ok(counts)
    }

    fn check(&self, index: usize) -> Result<()> {
        if index >= self.len() {
            return Err(Error::Index {
                index,
                len: self.len(),
            });
        }
        Ok(())
    }

    fn image_len(&self) -> usize {
        self.image_shape.iter().product()
    }
}

impl Dataset for SatDataset {
    fn len(&self) -> usize {
        self.window.len()
    }

    fn get(&self, index: usize) -> Result<Sample> {
        self.check(index)?;
        let len = self.image_len();
        let data = self.images.to_f32_range(index * len..(index + 1) * len);
        let mut image = Image::new(data, self.image_shape);
        if let Some(t) = &self.transform {
            image = t.apply(image);
        }
        let label = self.label(index)?;
        Ok(Sample { image, label })
    }

    fn image_shape(&self) -> [usize; 3] {
        self.image_shape
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for SatDataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SatDataset")
            .field("phase", &self.phase)
            .field("window", &self.window)
            .field("image_shape", &self.image_shape)
            .field("num_classes", &self.num_classes)
            .field("transform", &self.transform.is_some())
            .finish()
    }
}

/// Copy columns `window` of an [H, W, C, N] array into row-major [C, H, W] images.
fn to_channel_first(x: &NdArray, [h, w, c]: [usize; 3], window: Range<usize>) -> Storage {
    // Strides of the image axes; a rank-3 stack is one image.
    let strides = Shape::from((h, w, c)).stride_column_major();
    let (sh, sw, sc) = (strides[0], strides[1], strides[2]);
    let mut offsets = Vec::with_capacity(c * h * w);
    for ci in 0..c {
        for hi in 0..h {
            for wi in 0..w {
                offsets.push(hi * sh + wi * sw + ci * sc);
            }
        }
    }
    x.storage().gather_blocks(h * w * c, window, &offsets)
}

/// Builder for [`SatDataset`].
pub struct SatDatasetBuilder {
    path: PathBuf,
    phase: Phase,
    bounds: PartitionBounds,
    transform: Option<Box<dyn Transform>>,
}

impl SatDatasetBuilder {
    pub fn phase(mut self, phase: Phase) -> Self {
        self.phase = phase;
        self
    }

    pub fn bounds(mut self, bounds: PartitionBounds) -> Self {
        self.bounds = bounds;
        self
    }

    pub fn transform(mut self, t: impl Transform + 'static) -> Self {
        self.transform = Some(Box::new(t));
        self
    }

    /// Read the container and cut the configured window.
    pub fn build(self) -> Result<SatDataset> {
        let mat = MatFile::open(&self.path)?;
        SatDataset::from_container(&mat, self.phase, self.bounds, self.transform)
            .map_err(|e| e.at_path(&self.path))
    }
}
