// PrefetchLoader — batches prepared ahead of the consumer on worker threads
//
// Workers share one sampler behind a mutex. Each worker repeatedly:
//   1. locks the sampler and takes `batch_size` indices
//   2. fetches and collates those samples
//   3. pushes the batch into a bounded channel
//
// The channel holds at most `prefetch_factor * max(num_workers, 1)` batches,
// so memory stays bounded even when the sampler is infinite.
//
// Usage:
//
//   let loader = PrefetchLoader::spawn(
//       dataset.clone(),
//       InfiniteSampler::new(dataset.len())?,
//       LoaderConfig::default().batch_size(64).num_workers(2),
//   )?;
//
//   for (step, batch) in loader.take(num_steps).enumerate() {
//       let batch = batch?;
//       // train on batch ...
//   }

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;

use tracing::debug;

use satml_core::Result;

use crate::dataset::{Dataset, Sample};
use crate::loader::{collate, Batch, LoaderConfig};

/// A loader that prepares batches on background threads.
///
/// Batches from different workers may arrive out of sampler order. Dropping
/// the loader closes the channel and joins every worker.
pub struct PrefetchLoader {
    rx: Option<mpsc::Receiver<Result<Batch>>>,
    handles: Vec<thread::JoinHandle<()>>,
}

impl PrefetchLoader {
    /// Start the workers.
    ///
    /// The dataset is held via `Arc<dyn Dataset>` so every worker can read it.
    pub fn spawn<S>(dataset: Arc<dyn Dataset>, sampler: S, config: LoaderConfig) -> Result<Self>
    where
        S: Iterator<Item = usize> + Send + 'static,
    {
        config.validate()?;
        let workers = config.num_workers.max(1);
        let capacity = config.prefetch_factor * workers;
        let (tx, rx) = mpsc::sync_channel::<Result<Batch>>(capacity);

        // Fused so a drained sampler keeps answering `None` to every worker.
        let sampler = Arc::new(Mutex::new(sampler.fuse()));

        let mut handles = Vec::with_capacity(workers);
        for worker in 0..workers {
            let sampler = sampler.clone();
            let tx = tx.clone();
            let ds = dataset.clone();
            let config = config.clone();

            let handle = thread::spawn(move || {
                let dataset: &dyn Dataset = &*ds;
                let bs = config.batch_size;

                loop {
                    let indices: Vec<usize> = match sampler.lock() {
                        Ok(mut s) => s.by_ref().take(bs).collect(),
                        Err(_) => break, // another worker panicked
                    };
                    if indices.is_empty() || (config.drop_last && indices.len() < bs) {
                        break;
                    }

                    let result = indices
                        .iter()
                        .map(|&i| dataset.get(i))
                        .collect::<Result<Vec<Sample>>>()
                        .and_then(|samples| collate(&samples));
                    let failed = result.is_err();

                    // Receiver gone: the loader was dropped.
                    if tx.send(result).is_err() || failed {
                        break;
                    }
                }
                debug!(worker, "prefetch worker exiting");
            });
            handles.push(handle);
        }

        // Drop the original sender so the channel closes when all workers finish
        drop(tx);

        Ok(Self {
            rx: Some(rx),
            handles,
        })
    }
}

impl Iterator for PrefetchLoader {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        self.rx.as_ref()?.recv().ok()
    }
}

impl Drop for PrefetchLoader {
    fn drop(&mut self) {
        // Closing the receiver makes every pending `send` fail, which stops
        // workers even when the sampler never ends.
        drop(self.rx.take());
        for h in self.handles.drain(..) {
            let _ = h.join();
        }
    }
}
