// Samplers — strategies for drawing dataset indices
//
// Every sampler is a plain `Iterator<Item = usize>`, so a loader can be
// driven by any of them:
//
//   SequentialSampler  0, 1, ..., n-1 then stop
//   RandomSampler      one random permutation of [0, n) then stop
//   InfiniteSampler    an endless stream of freshly shuffled permutations
//
// The infinite sampler owns its generator. Each permutation block reseeds it
// from an injected `EntropySource`, so tests can pin the seed sequence while
// production runs draw from the operating system.

use rand::rngs::{OsRng, StdRng};
use rand::seq::SliceRandom;
use rand::{thread_rng, Rng, RngCore, SeedableRng};
use tracing::debug;

use satml_core::{Error, Result};

// Entropy sources

/// Supplies the seed for each new permutation block.
pub trait EntropySource: Send {
    fn next_seed(&mut self) -> u64;
}

/// Seeds drawn from operating-system entropy.
///
/// Streams are not reproducible across runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn next_seed(&mut self) -> u64 {
        OsRng.next_u64()
    }
}

/// A deterministic seed sequence derived from one `u64`.
///
/// Two samplers built from the same seed produce identical streams.
#[derive(Debug, Clone)]
pub struct SeededEntropy {
    rng: StdRng,
}

impl SeededEntropy {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl EntropySource for SeededEntropy {
    fn next_seed(&mut self) -> u64 {
        self.rng.gen()
    }
}

// InfiniteSampler

/// An unending stream of indices in `[0, n)`.
///
/// The stream opens with the last slot of the initial permutation, then walks
/// that permutation from slot 0 to slot `n - 1`. After that every block of `n`
/// indices is a fresh permutation drawn from a generator reseeded by the
/// entropy source. The first `n` indices are a rotation of the initial
/// permutation, so they cover `[0, n)` exactly once.
///
/// `next` never returns `None`. The stream cannot be rewound; build a new
/// sampler to restart. One sampler serves one consumer.
pub struct InfiniteSampler<E: EntropySource = OsEntropy> {
    n: usize,
    order: Vec<usize>,
    cursor: usize,
    /// True until the opening `order[n - 1]` has been delivered.
    lead: bool,
    rng: StdRng,
    entropy: E,
    reshuffles: u64,
}

impl InfiniteSampler<OsEntropy> {
    /// Sampler over `[0, n)` reseeded from operating-system entropy.
    pub fn new(n: usize) -> Result<Self> {
        Self::with_entropy(n, OsEntropy)
    }

    /// Like [`new`](Self::new) for callers holding a signed size.
    pub fn from_len(n: i64) -> Result<Self> {
        if n <= 0 {
            return Err(Error::invalid(format!(
                "InfiniteSampler: n must be > 0, got {n}"
            )));
        }
        let n = usize::try_from(n).map_err(|_| {
            Error::invalid(format!("InfiniteSampler: n = {n} does not fit in usize"))
        })?;
        Self::new(n)
    }
}

impl InfiniteSampler<SeededEntropy> {
    /// Reproducible sampler: the whole stream is a function of `seed`.
    pub fn seeded(n: usize, seed: u64) -> Result<Self> {
        Self::with_entropy(n, SeededEntropy::new(seed))
    }
}

impl<E: EntropySource> InfiniteSampler<E> {
    /// Sampler over `[0, n)` reseeded from `entropy` at every block.
    pub fn with_entropy(n: usize, mut entropy: E) -> Result<Self> {
        if n == 0 {
            return Err(Error::invalid("InfiniteSampler: n must be > 0, got 0"));
        }
        let mut rng = StdRng::seed_from_u64(entropy.next_seed());
        let mut order: Vec<usize> = (0..n).collect();
        order.shuffle(&mut rng);
        Ok(Self {
            n,
            order,
            cursor: n - 1,
            lead: true,
            rng,
            entropy,
            reshuffles: 0,
        })
    }

    /// Size of the index range.
    pub fn n(&self) -> usize {
        self.n
    }

    /// How many permutations have been drawn after the initial one.
    pub fn reshuffles(&self) -> u64 {
        self.reshuffles
    }

    fn reshuffle(&mut self) {
        self.rng = StdRng::seed_from_u64(self.entropy.next_seed());
        for (i, slot) in self.order.iter_mut().enumerate() {
            *slot = i;
        }
        self.order.shuffle(&mut self.rng);
        self.cursor = 0;
        self.reshuffles += 1;
        debug!(n = self.n, reshuffles = self.reshuffles, "sampler reshuffled");
    }
}

impl<E: EntropySource> Iterator for InfiniteSampler<E> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let idx = self.order[self.cursor];
        if self.lead {
            self.lead = false;
            self.cursor = 0;
        } else {
            self.cursor += 1;
            if self.cursor >= self.n {
                self.reshuffle();
            }
        }
        Some(idx)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (usize::MAX, None)
    }
}

impl<E: EntropySource> std::fmt::Debug for InfiniteSampler<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InfiniteSampler")
            .field("n", &self.n)
            .field("cursor", &self.cursor)
            .field("reshuffles", &self.reshuffles)
            .finish()
    }
}

// Finite samplers

/// Yields `0..n` in order, once.
#[derive(Debug, Clone)]
pub struct SequentialSampler {
    inner: std::ops::Range<usize>,
}

impl SequentialSampler {
    pub fn new(n: usize) -> Self {
        Self { inner: 0..n }
    }
}

impl Iterator for SequentialSampler {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for SequentialSampler {}

/// Yields one random permutation of `[0, n)`, once.
#[derive(Debug, Clone)]
pub struct RandomSampler {
    inner: std::vec::IntoIter<usize>,
}

impl RandomSampler {
    /// Shuffle with `seed`, or with the thread-local generator when `None`.
    pub fn new(n: usize, seed: Option<u64>) -> Self {
        let mut order: Vec<usize> = (0..n).collect();
        match seed {
            Some(seed) => {
                let mut rng = StdRng::seed_from_u64(seed);
                order.shuffle(&mut rng);
            }
            None => {
                let mut rng = thread_rng();
                order.shuffle(&mut rng);
            }
        }
        Self {
            inner: order.into_iter(),
        }
    }
}

impl Iterator for RandomSampler {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for RandomSampler {}
