use std::sync::Arc;
use std::sync::mpsc::{Receiver, SyncSender, sync_channel};
use std::thread::JoinHandle;

use ndarray::{Array2, Array4, Axis, s};
use rand::rngs::StdRng;
use rand::{SeedableRng, seq::SliceRandom};

use super::{AugmentConfig, PipelineConfig, random_transform, standardize};

/// Batches buffered per worker before it blocks.
const PREFETCH_PER_WORKER: usize = 2;
const ORDER_SALT: u64 = 0x5eed_0f0d_e5a1_7000;
const AUGMENT_SALT: u64 = 0xa0b6_3e47_11d2_9c55;

/// One mini-batch of images and one-hot labels.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// `B x H x W x C` images.
    pub images: Array4<f32>,
    /// `B x n_classes` one-hot labels.
    pub labels: Array2<f32>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.images.len_of(Axis(0))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Shared, read-only arrays batches are drawn from.
#[derive(Debug, Clone)]
pub struct BatchSource {
    images: Arc<Array4<f32>>,
    labels: Arc<Array2<f32>>,
}

impl BatchSource {
    /// Pair images with one-hot labels; row counts must agree.
    pub fn new(images: Arc<Array4<f32>>, labels: Arc<Array2<f32>>) -> Option<Self> {
        (images.len_of(Axis(0)) == labels.len_of(Axis(0))).then_some(Self { images, labels })
    }

    pub fn len(&self) -> usize {
        self.images.len_of(Axis(0))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Sampling {
    /// Reshuffle at the start of every pass.
    Shuffled,
    /// Manifest order, every pass.
    Sequential,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum TransformMode {
    None,
    StandardizeOnly,
    Random,
}

/// Deterministic batch factory: batch `k` depends only on the seed and `k`.
#[derive(Clone)]
struct BatchGenerator {
    source: BatchSource,
    batch_size: usize,
    steps_per_epoch: usize,
    seed: u64,
    sampling: Sampling,
    mode: TransformMode,
    augment: AugmentConfig,
    order: Option<(usize, Vec<usize>)>,
}

impl BatchGenerator {
    fn batch(&mut self, k: usize) -> Batch {
        let n = self.source.len();
        let epoch = k / self.steps_per_epoch;
        let step = k % self.steps_per_epoch;
        let start = (step * self.batch_size).min(n);
        let end = (start + self.batch_size).min(n);
        let indices = self.epoch_order(epoch)[start..end].to_vec();

        let mut images = self.source.images.select(Axis(0), &indices);
        let labels = self.source.labels.select(Axis(0), &indices);
        match self.mode {
            TransformMode::None => {}
            TransformMode::StandardizeOnly => {
                for mut image in images.axis_iter_mut(Axis(0)) {
                    let mut owned = image.to_owned();
                    standardize(&mut owned, &self.augment);
                    image.assign(&owned);
                }
            }
            TransformMode::Random => {
                let mut rng = StdRng::seed_from_u64(mix(self.seed ^ AUGMENT_SALT, k as u64));
                for (i, &sample) in indices.iter().enumerate() {
                    let mut out = random_transform(
                        self.source.images.index_axis(Axis(0), sample),
                        &self.augment,
                        &mut rng,
                    );
                    standardize(&mut out, &self.augment);
                    images.slice_mut(s![i, .., .., ..]).assign(&out);
                }
            }
        }
        Batch { images, labels }
    }

    fn epoch_order(&mut self, epoch: usize) -> &[usize] {
        let stale = self.order.as_ref().is_none_or(|(cached, _)| *cached != epoch);
        if stale {
            let mut order: Vec<usize> = (0..self.source.len()).collect();
            if self.sampling == Sampling::Shuffled {
                let mut rng = StdRng::seed_from_u64(mix(self.seed ^ ORDER_SALT, epoch as u64));
                order.shuffle(&mut rng);
            }
            self.order = Some((epoch, order));
        }
        match &self.order {
            Some((_, order)) => order,
            None => &[],
        }
    }
}

/// Endless iterator of batches cycling over a [`BatchSource`].
///
/// With workers, batch `k` is produced by worker `k % workers` and the
/// consumer reads the workers round-robin, so output order and content do not
/// depend on the worker count.
pub struct BatchProducer {
    steps_per_epoch: usize,
    next: usize,
    inner: ProducerInner,
}

enum ProducerInner {
    Inline(Box<BatchGenerator>),
    Workers {
        receivers: Vec<Receiver<Batch>>,
        handles: Vec<JoinHandle<()>>,
    },
}

impl BatchProducer {
    pub(super) fn spawn(
        source: BatchSource,
        config: &PipelineConfig,
        sampling: Sampling,
        mode: TransformMode,
    ) -> Self {
        let batch_size = config.batch_size.max(1);
        let steps_per_epoch = source.len().div_ceil(batch_size).max(1);
        let generator = BatchGenerator {
            source,
            batch_size,
            steps_per_epoch,
            seed: config.seed,
            sampling,
            mode,
            augment: config.augment.clone(),
            order: None,
        };
        let inner = if config.workers == 0 {
            ProducerInner::Inline(Box::new(generator))
        } else {
            let workers = config.workers;
            let mut receivers = Vec::with_capacity(workers);
            let mut handles = Vec::with_capacity(workers);
            for worker in 0..workers {
                let (tx, rx) = sync_channel(PREFETCH_PER_WORKER);
                let generator = generator.clone();
                handles.push(std::thread::spawn(move || {
                    run_worker(generator, worker, workers, tx)
                }));
                receivers.push(rx);
            }
            tracing::debug!("Started {workers} batch workers ({steps_per_epoch} steps/epoch)");
            ProducerInner::Workers { receivers, handles }
        };
        Self {
            steps_per_epoch,
            next: 0,
            inner,
        }
    }

    /// Batches per full pass over the source.
    pub fn steps_per_epoch(&self) -> usize {
        self.steps_per_epoch
    }
}

fn run_worker(mut generator: BatchGenerator, worker: usize, workers: usize, tx: SyncSender<Batch>) {
    let mut k = worker;
    loop {
        if tx.send(generator.batch(k)).is_err() {
            return;
        }
        k += workers;
    }
}

impl Iterator for BatchProducer {
    type Item = Batch;

    fn next(&mut self) -> Option<Batch> {
        let k = self.next;
        let batch = match &mut self.inner {
            ProducerInner::Inline(generator) => Some(generator.batch(k)),
            ProducerInner::Workers { receivers, .. } => {
                receivers[k % receivers.len()].recv().ok()
            }
        }?;
        self.next += 1;
        Some(batch)
    }
}

impl Drop for BatchProducer {
    fn drop(&mut self) {
        if let ProducerInner::Workers { receivers, handles } = &mut self.inner {
            // Closing the channels makes blocked workers exit.
            receivers.clear();
            for handle in handles.drain(..) {
                join_worker(handle);
            }
        }
    }
}

/// Join a worker thread, logging and returning its panic message if it died.
fn join_worker(handle: JoinHandle<()>) -> Option<String> {
    let payload = handle.join().err()?;
    let message = payload
        .downcast_ref::<&str>()
        .map(|msg| msg.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());
    tracing::warn!("Batch worker panicked: {message}");
    Some(message)
}

fn mix(seed: u64, value: u64) -> u64 {
    let mut z = seed ^ value.wrapping_mul(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}
