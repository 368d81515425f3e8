//! Bounded worker pool.
//!
//! `n` long-lived threads read tasks from a bounded queue and push one
//! outcome per task onto a bounded result queue. Both queues hold at most
//! `n` items, so a submitter blocks until workers catch up, and workers
//! block until someone drains results.

use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};
use log::{error, trace};

use crate::error::{Error, Result};
use crate::model::ObjectId;

/// A unit of work that owns everything it needs.
pub trait Task: Send + 'static {
    /// Object the task belongs to; used to report a panicking task.
    fn object(&self) -> ObjectId;

    fn run(self) -> TaskOutcome;
}

/// Result of one task, tagged with its object.
#[derive(Debug)]
pub struct TaskOutcome {
    pub object: ObjectId,
    /// File name relative to the task's destination directory.
    pub file: Option<String>,
    pub error: Option<Error>,
}

impl TaskOutcome {
    pub fn written(object: ObjectId, file: impl Into<String>) -> Self {
        Self {
            object,
            file: Some(file.into()),
            error: None,
        }
    }

    /// Nothing to write for this object.
    pub fn skipped(object: ObjectId) -> Self {
        Self {
            object,
            file: None,
            error: None,
        }
    }

    pub fn failed(object: ObjectId, error: Error) -> Self {
        Self {
            object,
            file: None,
            error: Some(error),
        }
    }
}

/// Fixed-size pool of worker threads.
pub struct WorkerPool<T: Task> {
    tasks: Option<Sender<T>>,
    results: Receiver<TaskOutcome>,
    workers: Vec<JoinHandle<()>>,
}

impl<T: Task> WorkerPool<T> {
    /// Start `size` workers (at least one).
    pub fn new(size: usize) -> Result<Self> {
        let size = size.max(1);
        let (task_tx, task_rx) = bounded::<T>(size);
        let (result_tx, result_rx) = bounded::<TaskOutcome>(size);

        let mut workers = Vec::with_capacity(size);
        for index in 0..size {
            let tasks = task_rx.clone();
            let results = result_tx.clone();
            let handle = thread::Builder::new()
                .name(format!("unai-worker-{index}"))
                .spawn(move || worker_loop(tasks, results))?;
            workers.push(handle);
        }

        Ok(Self {
            tasks: Some(task_tx),
            results: result_rx,
            workers,
        })
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Queue a task, blocking while the queue is full.
    pub fn submit(&self, task: T) -> Result<()> {
        let sender = self
            .tasks
            .as_ref()
            .ok_or_else(|| Error::Other("worker pool is closed".to_string()))?;
        sender
            .send(task)
            .map_err(|_| Error::Other("worker pool is closed".to_string()))
    }

    /// Wait for the next outcome.
    pub fn recv(&self) -> Result<TaskOutcome> {
        self.results
            .recv()
            .map_err(|_| Error::Other("all workers have stopped".to_string()))
    }
}

impl<T: Task> Drop for WorkerPool<T> {
    fn drop(&mut self) {
        // closing the queue ends every worker loop
        self.tasks.take();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                error!("worker thread panicked");
            }
        }
    }
}

fn worker_loop<T: Task>(tasks: Receiver<T>, results: Sender<TaskOutcome>) {
    for task in tasks.iter() {
        let object = task.object();
        trace!("worker picked obj#:{object}");
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| task.run())).unwrap_or_else(|_| {
            TaskOutcome::failed(object, Error::Other("task panicked".to_string()))
        });
        if results.send(outcome).is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::time::Duration;

    struct Echo {
        id: ObjectId,
        fail: bool,
    }

    impl Task for Echo {
        fn object(&self) -> ObjectId {
            self.id
        }

        fn run(self) -> TaskOutcome {
            thread::sleep(Duration::from_millis((self.id % 3) as u64));
            if self.fail {
                TaskOutcome::failed(self.id, Error::Decode("bad".to_string()))
            } else {
                TaskOutcome::written(self.id, format!("{}.bin", self.id))
            }
        }
    }

    struct Boom(ObjectId);

    impl Task for Boom {
        fn object(&self) -> ObjectId {
            self.0
        }

        fn run(self) -> TaskOutcome {
            panic!("boom");
        }
    }

    #[test]
    fn test_every_task_yields_one_outcome() {
        let pool = WorkerPool::new(3).unwrap();
        let total = 25;

        let seen = thread::scope(|s| {
            let collector = s.spawn(|| {
                let mut seen = BTreeSet::new();
                for _ in 0..total {
                    let outcome = pool.recv().unwrap();
                    assert_eq!(outcome.file, Some(format!("{}.bin", outcome.object)));
                    assert!(seen.insert(outcome.object));
                }
                seen
            });
            for id in 0..total {
                pool.submit(Echo { id, fail: false }).unwrap();
            }
            collector.join().unwrap()
        });

        assert_eq!(seen, (0..total).collect());
    }

    #[test]
    fn test_failures_are_outcomes() {
        let pool = WorkerPool::new(2).unwrap();
        pool.submit(Echo { id: 1, fail: true }).unwrap();
        let outcome = pool.recv().unwrap();
        assert_eq!(outcome.object, 1);
        assert!(outcome.file.is_none());
        assert!(matches!(outcome.error, Some(Error::Decode(_))));
    }

    #[test]
    fn test_panicking_task_is_reported() {
        let pool = WorkerPool::new(1).unwrap();
        pool.submit(Boom(9)).unwrap();
        let outcome = pool.recv().unwrap();
        assert_eq!(outcome.object, 9);
        assert!(outcome.error.is_some());

        // the worker survives
        pool.submit(Boom(10)).unwrap();
        assert_eq!(pool.recv().unwrap().object, 10);
    }

    #[test]
    fn test_zero_size_means_one_worker() {
        let pool: WorkerPool<Echo> = WorkerPool::new(0).unwrap();
        assert_eq!(pool.size(), 1);
    }
}
