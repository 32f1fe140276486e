//! # satml-data
//!
//! Data loading for the SAT-4 / SAT-6 satellite-image datasets.
//!
//! This crate provides:
//! - [`MatFile`] / [`MatWriter`] — reader and writer for MATLAB Level 5 MAT
//!   containers, including zlib-compressed elements
//! - [`SatDataset`] — a train/val/test window over a SAT container, with
//!   images returned channel-first and labels decoded from one-hot columns
//! - [`InfiniteSampler`] — an endless stream of reshuffled index permutations
//! - [`DataLoader`] — batching driven by any index sampler
//! - [`PrefetchLoader`] — batches prepared ahead on background threads
//   - Sequential and random single-pass samplers
//   - Per-image transforms: scaling, per-channel normalization, composition

pub mod dataset;
pub mod loader;
pub mod mat;
pub mod prefetch;
pub mod sampler;
pub mod sat;
pub mod transform;

pub use dataset::{Dataset, Image, Sample};
pub use loader::{Batch, DataLoader, LoaderConfig};
pub use mat::{Endian, MatFile, MatWriter};
pub use prefetch::PrefetchLoader;
pub use sampler::{
    EntropySource, InfiniteSampler, OsEntropy, RandomSampler, SeededEntropy, SequentialSampler,
};
pub use sat::{PartitionBounds, Phase, SatDataset, SatDatasetBuilder};
pub use transform::{Compose, Normalize, ScaleToUnit, Transform};
