use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use crossbeam::channel::{Receiver, SendTimeoutError, Sender};

use super::{Batch, Tensor, Transform};
use crate::{
    error::{LoaderError, Result},
    reader::ContainerReader,
};

/// How often a worker blocked on a full result queue checks the stop flag
const SEND_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Unit of work on the submission queue
#[derive(Debug)]
pub(crate) enum Task {
    /// Ids forming one batch
    Chunk(Vec<String>),
    /// Exit once this is received
    Stop,
}

/// State handed to each worker thread
pub(crate) struct Worker {
    pub tid: usize,
    pub path: Arc<PathBuf>,
    pub transform: Arc<dyn Transform>,
    pub labels: Option<Arc<HashMap<String, f32>>>,
    pub tasks: Receiver<Task>,
    pub results: Sender<Result<Batch>>,
    pub stop: Arc<AtomicBool>,
}

impl Worker {
    /// Pulls chunks until a stop is received, the stop flag is raised, or a fault occurs
    ///
    /// The first fault is forwarded on the result queue and ends the worker.
    pub fn run(self) {
        tracing::debug!(worker = self.tid, "Worker started");
        let mut reader = match ContainerReader::open(self.path.as_path()) {
            Ok(reader) => reader,
            Err(err) => {
                self.deliver(Err(err));
                return;
            }
        };

        let mut dbuf = String::new();
        while let Ok(Task::Chunk(ids)) = self.tasks.recv() {
            if self.stop.load(Ordering::Acquire) {
                break;
            }
            let result = self.process_chunk(&mut reader, ids, &mut dbuf);
            let failed = result.is_err();
            if !self.deliver(result) || failed {
                break;
            }
        }
        reader.close();
        tracing::debug!(worker = self.tid, "Worker exited");
    }

    /// Sends a result, giving up once the consumer hangs up or the stop flag is raised
    fn deliver(&self, mut result: Result<Batch>) -> bool {
        loop {
            match self.results.send_timeout(result, SEND_POLL_INTERVAL) {
                Ok(()) => return true,
                Err(SendTimeoutError::Disconnected(_)) => return false,
                Err(SendTimeoutError::Timeout(unsent)) => {
                    if self.stop.load(Ordering::Acquire) {
                        return false;
                    }
                    result = unsent;
                }
            }
        }
    }

    fn process_chunk<R>(
        &self,
        reader: &mut ContainerReader<R>,
        ids: Vec<String>,
        dbuf: &mut String,
    ) -> Result<Batch>
    where
        R: std::io::Read + std::io::Seek,
    {
        let mut tensors = Vec::with_capacity(ids.len());
        for id in &ids {
            dbuf.clear();
            reader.get_into(id, false, dbuf)?;
            let tensor = panic::catch_unwind(AssertUnwindSafe(|| self.transform.transform(dbuf.as_str())))
                .map_err(|payload| LoaderError::WorkerPanic {
                    worker: self.tid,
                    message: panic_message(payload.as_ref()),
                })?
                .with_context(|| format!("Transform failed for record '{id}'"))?;
            tensors.push(tensor);
        }
        let tensor = Tensor::stack(&tensors)?;
        let labels = self
            .labels
            .as_ref()
            .map(|labels| ids.iter().map(|id| labels.get(id).copied()).collect());
        Ok(Batch {
            tensor,
            ids,
            labels,
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
