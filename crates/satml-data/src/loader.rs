// DataLoader — batching over a dataset driven by an index sampler

use rayon::prelude::*;

use satml_core::{Error, Result, Shape};

use crate::dataset::{Dataset, Sample};

/// Configuration shared by [`DataLoader`] and [`PrefetchLoader`](crate::PrefetchLoader).
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Number of samples per batch.
    pub batch_size: usize,
    /// Whether to drop a trailing batch smaller than `batch_size`.
    pub drop_last: bool,
    /// Number of parallel workers for sample fetching (0 = sequential).
    pub num_workers: usize,
    /// Batches buffered per worker by the prefetching loader.
    pub prefetch_factor: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            drop_last: true,
            num_workers: 0,
            prefetch_factor: 2,
        }
    }
}

impl LoaderConfig {
    pub fn batch_size(mut self, bs: usize) -> Self {
        self.batch_size = bs;
        self
    }

    pub fn drop_last(mut self, d: bool) -> Self {
        self.drop_last = d;
        self
    }

    pub fn num_workers(mut self, n: usize) -> Self {
        self.num_workers = n;
        self
    }

    pub fn prefetch_factor(mut self, pf: usize) -> Self {
        self.prefetch_factor = pf;
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::invalid("batch_size must be > 0"));
        }
        if self.prefetch_factor == 0 {
            return Err(Error::invalid("prefetch_factor must be > 0"));
        }
        Ok(())
    }
}

/// A batch of samples stacked into one `[B, C, H, W]` buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// Row-major pixel data.
    pub images: Vec<f32>,
    /// `[B, C, H, W]`.
    pub shape: [usize; 4],
    /// Class index of each sample.
    pub labels: Vec<usize>,
}

impl Batch {
    /// Number of samples in the batch.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Pixels of sample `i`.
    pub fn image(&self, i: usize) -> &[f32] {
        let per: usize = self.shape[1..].iter().product();
        &self.images[i * per..(i + 1) * per]
    }
}

/// Stack samples into a batch. Every image must have the same shape.
pub(crate) fn collate(samples: &[Sample]) -> Result<Batch> {
    let Some(first) = samples.first() else {
        return Err(Error::invalid("cannot collate an empty batch"));
    };
    let [c, h, w] = first.image.shape;

    let mut images = Vec::with_capacity(samples.len() * c * h * w);
    let mut labels = Vec::with_capacity(samples.len());
    for s in samples {
        if s.image.shape != first.image.shape {
            return Err(Error::ShapeMismatch {
                expected: Shape::from(&first.image.shape[..]),
                got: Shape::from(&s.image.shape[..]),
            });
        }
        images.extend_from_slice(&s.image.data);
        labels.push(s.label);
    }

    Ok(Batch {
        images,
        shape: [samples.len(), c, h, w],
        labels,
    })
}

/// Pulls `batch_size` indices at a time from a sampler and fetches the
/// samples from a dataset.
///
/// With a finite sampler the loader ends when the sampler does; with
/// [`InfiniteSampler`](crate::InfiniteSampler) it never ends and the
/// training loop decides when to stop.
pub struct DataLoader<'a, S> {
    dataset: &'a dyn Dataset,
    sampler: S,
    config: LoaderConfig,
    done: bool,
}

impl<'a, S: Iterator<Item = usize>> DataLoader<'a, S> {
    /// Create a new DataLoader over a dataset.
    pub fn new(dataset: &'a dyn Dataset, sampler: S, config: LoaderConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            dataset,
            sampler,
            config,
            done: false,
        })
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Batches left, if the sampler reports an exact remaining length.
    pub fn num_batches(&self) -> Option<usize> {
        let (lo, hi) = self.sampler.size_hint();
        match hi {
            Some(hi) if hi == lo => Some(if self.config.drop_last {
                lo / self.config.batch_size
            } else {
                lo.div_ceil(self.config.batch_size)
            }),
            _ => None,
        }
    }

    /// Fetch a slice of samples, optionally in parallel via rayon.
    fn fetch_samples(&self, indices: &[usize]) -> Result<Vec<Sample>> {
        if self.config.num_workers > 0 && indices.len() > 1 {
            indices.par_iter().map(|&i| self.dataset.get(i)).collect()
        } else {
            indices.iter().map(|&i| self.dataset.get(i)).collect()
        }
    }

    /// Draw the next batch. `None` once a finite sampler is exhausted.
    pub fn next_batch(&mut self) -> Option<Result<Batch>> {
        if self.done {
            return None;
        }
        let bs = self.config.batch_size;
        let indices: Vec<usize> = self.sampler.by_ref().take(bs).collect();
        if indices.len() < bs {
            self.done = true;
            if indices.is_empty() || self.config.drop_last {
                return None;
            }
        }
        Some(self.fetch_samples(&indices).and_then(|s| collate(&s)))
    }
}

impl<'a, S: Iterator<Item = usize>> Iterator for DataLoader<'a, S> {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_batch()
    }
}
