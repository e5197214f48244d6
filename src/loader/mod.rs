//! # Batch loader
//!
//! This module streams decoded, transformed records out of a container in batches,
//! with decoding and transformation done by a pool of worker threads.
//!
//! ## Overview
//!
//! A [`BatchLoader`] snapshots the sorted id list of a container once, at
//! construction. Every call to [`BatchLoader::epoch`] then starts a fresh pass:
//!
//! 1. The id order is copied from the snapshot and shuffled if requested
//! 2. The order is cut into chunks of `batch_size` ids, all submitted up front
//! 3. Each worker opens its own [`ContainerReader`] and turns chunks into [`Batch`]es
//! 4. The [`Epoch`] iterator yields batches in completion order
//!
//! The epoch ends after exactly [`BatchLoader::len`] batches, after the first worker
//! fault, or when a result does not arrive within the configured timeout. In every
//! case the workers are signalled, the result queue is released, and each worker is
//! joined within a grace period.
//!
//! ## Example
//!
//! ```rust,no_run
//! use cseq::{BatchLoader, Tensor};
//!
//! let loader = BatchLoader::builder()
//!     .batch_size(16)
//!     .shuffle(true)
//!     .workers(4)
//!     .build("data.cseq", |sequence: &str| -> anyhow::Result<Tensor> {
//!         Ok(Tensor::from_vec(vec![sequence.len() as f32]))
//!     })
//!     .unwrap();
//!
//! for batch in loader.epoch().unwrap() {
//!     let batch = batch.unwrap();
//!     println!("{:?} {:?}", batch.tensor.shape(), batch.ids);
//! }
//! ```

mod tensor;
mod worker;

pub use tensor::{Tensor, Transform};

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use rand::{rngs::SmallRng, seq::SliceRandom, SeedableRng};

use crate::{
    error::{LoaderError, Result},
    reader::ContainerReader,
};
use worker::{Task, Worker};

/// Default number of ids per batch
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// Default bound on each wait for a result
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default time each worker is given to exit at shutdown
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Poll interval while joining workers
const JOIN_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// One transformed batch
#[derive(Debug, Clone)]
pub struct Batch {
    /// Per-record tensors stacked along a new leading axis
    pub tensor: Tensor,

    /// Ids of the records in the batch, aligned with the leading axis of `tensor`
    pub ids: Vec<String>,

    /// Labels aligned with `ids`, present when the loader was given a label map
    pub labels: Option<Vec<Option<f32>>>,
}
impl Batch {
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Configures a [`BatchLoader`]
#[derive(Debug, Clone, Default)]
pub struct BatchLoaderBuilder {
    batch_size: Option<usize>,
    shuffle: Option<bool>,
    workers: Option<usize>,
    timeout: Option<Duration>,
    grace_period: Option<Duration>,
    seed: Option<u64>,
    labels: Option<HashMap<String, f32>>,
}

impl BatchLoaderBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of ids per batch; the last batch of an epoch may be shorter
    #[must_use]
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    /// Shuffles the id order at the start of every epoch
    #[must_use]
    pub fn shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = Some(shuffle);
        self
    }

    /// Number of worker threads, defaulting to the number of CPUs
    #[must_use]
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    /// Maximum wait for each batch
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Time each worker is given to exit at shutdown before it is detached
    #[must_use]
    pub fn grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = Some(grace_period);
        self
    }

    /// Seeds the shuffle so epoch orders are reproducible
    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Attaches a label to each id; batches then carry aligned labels
    #[must_use]
    pub fn labels(mut self, labels: HashMap<String, f32>) -> Self {
        self.labels = Some(labels);
        self
    }

    /// Validates the configuration and snapshots the ids of the container at `path`
    ///
    /// # Errors
    ///
    /// * `LoaderError::InvalidBatchSize` if the batch size is zero
    /// * `LoaderError::InvalidWorkerCount` if the worker count is zero
    /// * Any error raised while opening the container
    pub fn build<P, T>(self, path: P, transform: T) -> Result<BatchLoader>
    where
        P: AsRef<Path>,
        T: Transform + 'static,
    {
        let batch_size = self.batch_size.unwrap_or(DEFAULT_BATCH_SIZE);
        if batch_size == 0 {
            return Err(LoaderError::InvalidBatchSize.into());
        }
        let workers = self.workers.unwrap_or_else(num_cpus::get);
        if workers == 0 {
            return Err(LoaderError::InvalidWorkerCount.into());
        }

        let path = path.as_ref().to_path_buf();
        let ids = ContainerReader::scoped(&path, |reader| Ok(reader.list_ids()))?;
        let rng = match self.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_rng(&mut rand::rng()),
        };
        tracing::debug!(
            path = %path.display(),
            records = ids.len(),
            batch_size,
            workers,
            "Built batch loader"
        );

        Ok(BatchLoader {
            path: Arc::new(path),
            transform: Arc::new(transform),
            labels: self.labels.map(Arc::new),
            ids,
            batch_size,
            shuffle: self.shuffle.unwrap_or(true),
            workers,
            timeout: self.timeout.unwrap_or(DEFAULT_TIMEOUT),
            grace_period: self.grace_period.unwrap_or(DEFAULT_GRACE_PERIOD),
            rng: Mutex::new(rng),
            active: Mutex::new(None),
        })
    }
}

/// Streams batches of transformed records out of a container
///
/// The loader itself holds no open file; each epoch starts its own workers, and each
/// worker opens its own reader.
pub struct BatchLoader {
    path: Arc<PathBuf>,
    transform: Arc<dyn Transform>,
    labels: Option<Arc<HashMap<String, f32>>>,

    /// Sorted id snapshot taken at construction
    ids: Vec<String>,

    batch_size: usize,
    shuffle: bool,
    workers: usize,
    timeout: Duration,
    grace_period: Duration,

    rng: Mutex<SmallRng>,

    /// Control of the most recently started epoch
    active: Mutex<Option<Arc<EpochControl>>>,
}

impl BatchLoader {
    #[must_use]
    pub fn builder() -> BatchLoaderBuilder {
        BatchLoaderBuilder::new()
    }

    /// Creates a loader with the default timeout and grace period
    ///
    /// `workers` falls back to the number of CPUs when `None`.
    pub fn new<P, T>(
        path: P,
        transform: T,
        batch_size: usize,
        shuffle: bool,
        workers: Option<usize>,
    ) -> Result<Self>
    where
        P: AsRef<Path>,
        T: Transform + 'static,
    {
        let mut builder = BatchLoaderBuilder::new()
            .batch_size(batch_size)
            .shuffle(shuffle);
        if let Some(workers) = workers {
            builder = builder.workers(workers);
        }
        builder.build(path, transform)
    }

    /// Number of batches in every epoch
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len().div_ceil(self.batch_size)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Number of records in the snapshot
    #[must_use]
    pub fn num_records(&self) -> usize {
        self.ids.len()
    }

    /// The id snapshot in sorted order
    #[must_use]
    pub fn ordered_ids(&self) -> &[String] {
        &self.ids
    }

    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    #[must_use]
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Starts a new epoch
    ///
    /// An epoch started earlier from this loader is shut down first; its workers are
    /// joined and it yields no further batches.
    pub fn epoch(&self) -> Result<Epoch> {
        let previous = self.active.lock().take();
        if let Some(previous) = previous {
            previous.shutdown();
        }

        let mut order = self.ids.clone();
        if self.shuffle {
            order.shuffle(&mut *self.rng.lock());
        }
        let chunks: Vec<Vec<String>> = order
            .chunks(self.batch_size)
            .map(<[String]>::to_vec)
            .collect();

        let (task_tx, task_rx) = unbounded();
        let control = Arc::new(EpochControl {
            stop: Arc::new(AtomicBool::new(false)),
            tasks: task_tx,
            handles: Mutex::new(Vec::new()),
            grace_period: self.grace_period,
        });
        let mut epoch = Epoch {
            order,
            control: Arc::clone(&control),
            results: None,
            remaining: chunks.len(),
            timeout: self.timeout,
            finished: chunks.is_empty(),
        };
        if chunks.is_empty() {
            return Ok(epoch);
        }

        let num_chunks = chunks.len();
        for chunk in chunks {
            control
                .tasks
                .send(Task::Chunk(chunk))
                .map_err(|_| LoaderError::WorkersDisconnected)?;
        }

        let (result_tx, result_rx) = bounded(2 * self.workers);
        epoch.results = Some(result_rx);
        for tid in 0..self.workers {
            let worker = Worker {
                tid,
                path: Arc::clone(&self.path),
                transform: Arc::clone(&self.transform),
                labels: self.labels.clone(),
                tasks: task_rx.clone(),
                results: result_tx.clone(),
                stop: Arc::clone(&control.stop),
            };
            // a failed spawn drops `epoch`, which shuts down the workers already running
            let handle = thread::Builder::new()
                .name(format!("cseq-loader-{tid}"))
                .spawn(move || worker.run())?;
            control.handles.lock().push(handle);
        }
        *self.active.lock() = Some(control);

        tracing::debug!(
            chunks = num_chunks,
            workers = self.workers,
            shuffled = self.shuffle,
            "Started epoch"
        );
        Ok(epoch)
    }
}

impl fmt::Debug for BatchLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchLoader")
            .field("path", &self.path)
            .field("records", &self.ids.len())
            .field("batch_size", &self.batch_size)
            .field("shuffle", &self.shuffle)
            .field("workers", &self.workers)
            .field("timeout", &self.timeout)
            .field("grace_period", &self.grace_period)
            .finish_non_exhaustive()
    }
}

/// Worker-side state of one epoch, shared with the loader that started it
#[derive(Debug)]
struct EpochControl {
    stop: Arc<AtomicBool>,
    tasks: Sender<Task>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    grace_period: Duration,
}

impl EpochControl {
    fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Raises the stop flag and joins every worker within the grace period
    ///
    /// Workers blocked on a full result queue notice the flag on their next send
    /// attempt. Calling this again is a no-op.
    fn shutdown(&self) {
        self.stop.store(true, Ordering::Release);
        let handles = std::mem::take(&mut *self.handles.lock());
        for _ in 0..handles.len() {
            // only fails once every worker is gone
            let _ = self.tasks.send(Task::Stop);
        }

        for (tid, handle) in handles.into_iter().enumerate() {
            let deadline = Instant::now() + self.grace_period;
            while !handle.is_finished() && Instant::now() < deadline {
                thread::sleep(JOIN_POLL_INTERVAL);
            }
            if handle.is_finished() {
                if handle.join().is_err() {
                    tracing::warn!(worker = tid, "Worker thread panicked");
                }
            } else {
                tracing::warn!(
                    worker = tid,
                    grace_period = ?self.grace_period,
                    "Worker did not exit within the grace period, detaching"
                );
            }
        }
    }
}

/// One pass of a [`BatchLoader`] over its ids
///
/// Yields `Ok(batch)` in completion order. A fault is yielded once as `Err`, after
/// which the epoch is over. Dropping an unfinished epoch stops its workers.
#[derive(Debug)]
pub struct Epoch {
    /// Id order submitted for this epoch
    order: Vec<String>,

    control: Arc<EpochControl>,

    /// Result queue, released at shutdown
    results: Option<Receiver<Result<Batch>>>,

    /// Batches still to be received
    remaining: usize,

    timeout: Duration,
    finished: bool,
}

impl Epoch {
    /// The id order submitted for this epoch, before chunking
    #[must_use]
    pub fn order(&self) -> &[String] {
        &self.order
    }

    /// Batches not yet received
    #[must_use]
    pub fn remaining(&self) -> usize {
        if self.finished {
            0
        } else {
            self.remaining
        }
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Worker threads of this epoch that have not exited yet
    #[must_use]
    pub fn active_workers(&self) -> usize {
        self.control
            .handles
            .lock()
            .iter()
            .filter(|handle| !handle.is_finished())
            .count()
    }

    /// Ends the epoch early, waiting for the workers to exit
    pub fn stop(&mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.finished = true;
        // unblocks workers waiting on a full result queue
        self.results = None;
        self.control.shutdown();
    }
}

impl Iterator for Epoch {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        if self.remaining == 0 || self.control.is_stopped() {
            self.shutdown();
            return None;
        }
        let received = self.results.as_ref()?.recv_timeout(self.timeout);
        match received {
            Ok(Ok(batch)) => {
                self.remaining -= 1;
                if self.remaining == 0 {
                    self.shutdown();
                }
                Some(Ok(batch))
            }
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "Worker fault, aborting epoch");
                self.shutdown();
                Some(Err(err))
            }
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(timeout = ?self.timeout, "Timed out waiting for a batch, aborting epoch");
                self.shutdown();
                Some(Err(LoaderError::WorkerTimeout(self.timeout).into()))
            }
            Err(RecvTimeoutError::Disconnected) => {
                self.shutdown();
                Some(Err(LoaderError::WorkersDisconnected.into()))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining()))
    }
}

impl Drop for Epoch {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod testing {
    use std::collections::HashSet;

    use super::*;
    use crate::{ContainerWriter, Error};

    fn write_container(dir: &tempfile::TempDir, n: usize) -> Result<PathBuf> {
        let path = dir.path().join("loader.cseq");
        let mut writer = ContainerWriter::create(&path)?;
        for i in 0..n {
            let sequence: String = "ACGT".chars().cycle().skip(i % 4).take(10 + i % 3).collect();
            writer.add_record(&format!("id{i:03}"), &sequence)?;
        }
        writer.finalize()?;
        Ok(path)
    }

    fn composition(sequence: &str) -> anyhow::Result<Tensor> {
        let mut counts = [0f32; 4];
        for symbol in sequence.chars() {
            match symbol {
                'A' => counts[0] += 1.0,
                'C' => counts[1] += 1.0,
                'G' => counts[2] += 1.0,
                'T' => counts[3] += 1.0,
                _ => {}
            }
        }
        Ok(Tensor::from_vec(counts.to_vec()))
    }

    fn batch_sizes(batches: &[Batch]) -> Vec<usize> {
        let mut sizes: Vec<_> = batches.iter().map(Batch::len).collect();
        sizes.sort_unstable();
        sizes
    }

    #[test]
    fn test_epoch_partitions_ids() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = write_container(&dir, 50)?;
        let loader = BatchLoader::new(&path, composition, 16, false, Some(3))?;
        assert_eq!(loader.len(), 4);

        let batches = loader.epoch()?.collect::<Result<Vec<_>>>()?;
        assert_eq!(batches.len(), 4);
        assert_eq!(batch_sizes(&batches), vec![2, 16, 16, 16]);

        let mut seen = HashSet::new();
        for batch in &batches {
            assert_eq!(batch.tensor.shape(), &[batch.len(), 4]);
            assert!(batch.labels.is_none());
            for id in &batch.ids {
                assert!(seen.insert(id.clone()), "{id} yielded twice");
            }
        }
        let expected: HashSet<_> = loader.ordered_ids().iter().cloned().collect();
        assert_eq!(seen, expected);
        Ok(())
    }

    #[test]
    fn test_batches_match_records() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = write_container(&dir, 20)?;
        let loader = BatchLoader::new(&path, composition, 6, true, Some(2))?;
        let mut reader = ContainerReader::open(&path)?;
        for batch in loader.epoch()? {
            let batch = batch?;
            for (i, id) in batch.ids.iter().enumerate() {
                let expected = composition(&reader.get(id, true)?)?;
                assert_eq!(batch.tensor.row(i), Some(expected.data()));
            }
        }
        Ok(())
    }

    #[test]
    fn test_uneven_last_batch() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = write_container(&dir, 50)?;
        let loader = BatchLoader::new(&path, composition, 40, true, Some(4))?;
        let batches = loader.epoch()?.collect::<Result<Vec<_>>>()?;
        assert_eq!(batch_sizes(&batches), vec![10, 40]);
        Ok(())
    }

    #[test]
    fn test_single_worker_keeps_order() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = write_container(&dir, 25)?;
        let loader = BatchLoader::new(&path, composition, 4, false, Some(1))?;
        let ids: Vec<String> = loader
            .epoch()?
            .map(|batch| batch.map(|batch| batch.ids))
            .collect::<Result<Vec<_>>>()?
            .concat();
        assert_eq!(ids, loader.ordered_ids());
        Ok(())
    }

    #[test]
    fn test_shuffle_changes_order() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = write_container(&dir, 50)?;
        let loader = BatchLoader::builder()
            .batch_size(16)
            .workers(2)
            .build(&path, composition)?;

        let mut reordered = false;
        for _ in 0..5 {
            let mut epoch = loader.epoch()?;
            reordered |= epoch.order() != loader.ordered_ids();
            epoch.stop();
        }
        assert!(reordered);
        Ok(())
    }

    #[test]
    fn test_seeded_shuffle_is_reproducible() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = write_container(&dir, 30)?;
        let build = || {
            BatchLoader::builder()
                .seed(42)
                .workers(1)
                .build(&path, composition)
        };
        let (a, b) = (build()?, build()?);
        let mut first = a.epoch()?;
        let mut second = b.epoch()?;
        assert_eq!(first.order(), second.order());
        first.stop();
        second.stop();
        Ok(())
    }

    #[test]
    fn test_labels_align_with_ids() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = write_container(&dir, 12)?;
        let labels: HashMap<String, f32> = (0..12)
            .filter(|i| i % 2 == 0)
            .map(|i| (format!("id{i:03}"), i as f32))
            .collect();
        let loader = BatchLoader::builder()
            .batch_size(5)
            .workers(2)
            .labels(labels.clone())
            .build(&path, composition)?;
        for batch in loader.epoch()? {
            let batch = batch?;
            let batch_labels = batch.labels.unwrap();
            assert_eq!(batch_labels.len(), batch.ids.len());
            for (id, label) in batch.ids.iter().zip(batch_labels) {
                assert_eq!(label, labels.get(id).copied());
            }
        }
        Ok(())
    }

    #[test]
    fn test_transform_fault_ends_epoch() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = write_container(&dir, 40)?;
        let failing = |sequence: &str| -> anyhow::Result<Tensor> {
            if sequence.len() == 12 {
                anyhow::bail!("unsupported length");
            }
            composition(sequence)
        };
        let loader = BatchLoader::new(&path, failing, 4, false, Some(2))?;
        let mut epoch = loader.epoch()?;
        let mut faults = 0;
        for item in epoch.by_ref() {
            if let Err(err) = item {
                assert!(matches!(err, Error::AnyhowError(_)));
                faults += 1;
            }
        }
        assert_eq!(faults, 1);
        assert!(epoch.is_finished());
        assert!(epoch.next().is_none());
        Ok(())
    }

    #[test]
    fn test_transform_panic_is_reported() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = write_container(&dir, 8)?;
        let panicking = |_: &str| -> anyhow::Result<Tensor> { panic!("transform exploded") };
        let loader = BatchLoader::new(&path, panicking, 4, false, Some(1))?;
        let mut epoch = loader.epoch()?;
        let err = epoch.next().unwrap().unwrap_err();
        assert!(matches!(
            err,
            Error::LoaderError(LoaderError::WorkerPanic { ref message, .. }) if message == "transform exploded"
        ));
        assert!(epoch.next().is_none());
        Ok(())
    }

    #[test]
    fn test_slow_worker_times_out() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = write_container(&dir, 4)?;
        let slow = |sequence: &str| -> anyhow::Result<Tensor> {
            thread::sleep(Duration::from_millis(300));
            composition(sequence)
        };
        let loader = BatchLoader::builder()
            .batch_size(2)
            .workers(1)
            .timeout(Duration::from_millis(20))
            .grace_period(Duration::from_secs(5))
            .build(&path, slow)?;
        let mut epoch = loader.epoch()?;
        let err = epoch.next().unwrap().unwrap_err();
        assert!(matches!(
            err,
            Error::LoaderError(LoaderError::WorkerTimeout(_))
        ));
        assert!(epoch.next().is_none());
        Ok(())
    }

    #[test]
    fn test_early_stop_and_drop() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = write_container(&dir, 50)?;
        let loader = BatchLoader::new(&path, composition, 1, true, Some(2))?;

        let mut epoch = loader.epoch()?;
        assert!(epoch.next().unwrap().is_ok());
        assert!(epoch.next().unwrap().is_ok());
        epoch.stop();
        assert!(epoch.next().is_none());
        assert_eq!(epoch.remaining(), 0);

        // abandoned mid-loop
        for (i, batch) in loader.epoch()?.enumerate() {
            batch?;
            if i == 3 {
                break;
            }
        }

        assert_eq!(loader.epoch()?.count(), 50);
        Ok(())
    }

    #[test]
    fn test_new_epoch_stops_previous() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = write_container(&dir, 20)?;
        let loader = BatchLoader::new(&path, composition, 5, false, Some(2))?;
        let mut first = loader.epoch()?;
        assert!(first.next().is_some());
        let second = loader.epoch()?;
        assert!(first.next().is_none());
        assert_eq!(second.collect::<Result<Vec<_>>>()?.len(), 4);
        Ok(())
    }

    #[test]
    fn test_new_epoch_joins_blocked_workers() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = write_container(&dir, 20)?;
        let loader = BatchLoader::builder()
            .batch_size(1)
            .shuffle(false)
            .workers(1)
            .grace_period(Duration::from_secs(30))
            .build(&path, composition)?;

        // never polled, so the worker fills the result queue and blocks
        let mut first = loader.epoch()?;
        thread::sleep(Duration::from_millis(100));
        assert_eq!(first.active_workers(), 1);

        let start = Instant::now();
        let second = loader.epoch()?;
        assert!(start.elapsed() < Duration::from_secs(10));
        assert_eq!(first.active_workers(), 0);
        assert!(first.next().is_none());
        assert_eq!(second.collect::<Result<Vec<_>>>()?.len(), 20);
        Ok(())
    }

    #[test]
    fn test_debug_summary() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = write_container(&dir, 10)?;
        let loader = BatchLoader::new(&path, composition, 4, false, Some(2))?;
        let summary = format!("{loader:?}");
        assert!(summary.starts_with("BatchLoader"));
        assert!(summary.contains("records: 10"));
        assert!(summary.contains("batch_size: 4"));
        Ok(())
    }

    #[test]
    fn test_empty_container() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = write_container(&dir, 0)?;
        let loader = BatchLoader::new(&path, composition, 8, true, None)?;
        assert!(loader.is_empty());
        assert_eq!(loader.len(), 0);
        assert_eq!(loader.epoch()?.count(), 0);
        Ok(())
    }

    #[test]
    fn test_invalid_configuration() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = write_container(&dir, 4)?;
        let err = BatchLoader::new(&path, composition, 0, false, None).unwrap_err();
        assert!(matches!(err, Error::LoaderError(LoaderError::InvalidBatchSize)));
        let err = BatchLoader::new(&path, composition, 4, false, Some(0)).unwrap_err();
        assert!(matches!(err, Error::LoaderError(LoaderError::InvalidWorkerCount)));
        let err = BatchLoader::new(dir.path().join("absent.cseq"), composition, 4, false, None)
            .unwrap_err();
        assert!(err.is_not_found());
        Ok(())
    }
}
