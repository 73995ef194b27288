//! Task Pool
//!
//! Fixed worker pool for CPU-bound work that must stay off the render loop.
//! Each submitted task returns a [`TaskHandle`] that receives its result over
//! a one-shot channel; dropping the handle discards the result.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError};

use crate::{CoreError, CoreResult};

type Task = Box<dyn FnOnce() + Send + 'static>;

/// Handle to a submitted task's result
#[derive(Debug)]
pub struct TaskHandle<T> {
    id: u64,
    receiver: Receiver<T>,
}

impl<T> TaskHandle<T> {
    /// Get the task ID
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Take the result if the task has finished.
    ///
    /// Returns `Err(TaskLost)` if the task panicked or the pool shut down
    /// before it ran.
    pub fn try_take(&self) -> Result<Option<T>, TaskLost> {
        match self.receiver.try_recv() {
            Ok(value) => Ok(Some(value)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(TaskLost { id: self.id }),
        }
    }

    /// Block until the task finishes
    pub fn wait(self) -> Result<T, TaskLost> {
        self.receiver.recv().map_err(|_| TaskLost { id: self.id })
    }
}

/// The task never produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Task {id} ended without a result")]
pub struct TaskLost {
    pub id: u64,
}

struct Worker {
    id: usize,
    thread: Option<JoinHandle<()>>,
}

impl Worker {
    fn spawn(id: usize, receiver: Receiver<Task>) -> CoreResult<Self> {
        let thread = thread::Builder::new()
            .name(format!("stipple-worker-{}", id))
            .spawn(move || loop {
                match receiver.recv_timeout(Duration::from_millis(100)) {
                    Ok(task) => {
                        if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
                            log::error!("Task panicked on worker {}", id);
                        }
                    }
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            })
            .map_err(CoreError::ThreadSpawn)?;

        Ok(Self {
            id,
            thread: Some(thread),
        })
    }
}

/// Thread pool returning typed results
pub struct TaskPool {
    workers: Vec<Worker>,
    sender: Option<Sender<Task>>,
    next_id: AtomicU64,
}

impl TaskPool {
    /// Create a new pool with the specified number of workers
    pub fn new(num_workers: usize) -> CoreResult<Self> {
        let num_workers = num_workers.max(1);
        let (sender, receiver) = unbounded();

        let workers = (0..num_workers)
            .map(|id| Worker::spawn(id, receiver.clone()))
            .collect::<CoreResult<Vec<_>>>()?;

        log::debug!("Task pool started with {} workers", num_workers);

        Ok(Self {
            workers,
            sender: Some(sender),
            next_id: AtomicU64::new(0),
        })
    }

    /// Create a pool sized to the rayon thread count
    pub fn with_cores() -> CoreResult<Self> {
        Self::new(rayon::current_num_threads())
    }

    /// Get the number of workers
    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    /// Submit a task and get a handle to its result
    pub fn spawn<T, F>(&self, name: &'static str, func: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (result_tx, result_rx) = bounded(1);

        let task: Task = Box::new(move || {
            let _span = crate::timer::StageSpan::start(name);
            // Receiver may already be gone if the caller lost interest
            let _ = result_tx.send(func());
        });

        if let Some(sender) = &self.sender {
            if sender.send(task).is_err() {
                log::warn!("Task pool closed, dropping task '{}'", name);
            }
        }

        TaskHandle {
            id,
            receiver: result_rx,
        }
    }
}

impl Drop for TaskPool {
    fn drop(&mut self) {
        drop(self.sender.take());

        for worker in &mut self.workers {
            if let Some(thread) = worker.thread.take() {
                if thread.join().is_err() {
                    log::warn!("Worker {} exited abnormally", worker.id);
                }
            }
        }
    }
}
