// Copyright (c) The crosstest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::helpers::panic_message;
use crossbeam_channel::{Receiver, Sender};
use rayon::ThreadPool;
use std::{
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};
use tracing::debug;

/// A fixed-size pool of workers with a single completion queue.
///
/// Jobs are submitted from one thread and their results are drained on that same thread, in
/// the order they complete. Dropping the queue terminates it and waits for every submitted job
/// to report.
#[derive(Debug)]
pub struct WorkQueue<T> {
    pool: Arc<ThreadPool>,
    sender: Sender<Completion<T>>,
    receiver: Receiver<Completion<T>>,
    terminated: Arc<AtomicBool>,
    submitted: usize,
    received: usize,
}

/// A job that has reported back to its [`WorkQueue`].
#[derive(Debug)]
pub struct Completion<T> {
    /// The position of the job in submission order, starting at 0.
    pub index: usize,

    /// What happened to the job.
    pub result: WorkResult<T>,
}

/// The result of a job submitted to a [`WorkQueue`].
#[derive(Debug)]
pub enum WorkResult<T> {
    /// The job ran to completion.
    Finished(T),

    /// The job panicked.
    Panicked(String),

    /// The queue was terminated before the job started.
    Canceled,
}

impl<T: Send + 'static> WorkQueue<T> {
    /// Creates a new queue whose jobs run on `pool`.
    pub fn new(pool: Arc<ThreadPool>) -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self {
            pool,
            sender,
            receiver,
            terminated: Arc::new(AtomicBool::new(false)),
            submitted: 0,
            received: 0,
        }
    }

    /// Submits a job. Returns false if the queue has been terminated, in which case the job is
    /// dropped without running.
    pub fn submit<F>(&mut self, job: F) -> bool
    where
        F: FnOnce() -> T + Send + 'static,
    {
        if self.is_terminated() {
            return false;
        }

        let index = self.submitted;
        self.submitted += 1;
        let sender = self.sender.clone();
        let terminated = self.terminated.clone();
        self.pool.spawn(move || {
            let result = if terminated.load(Ordering::Acquire) {
                WorkResult::Canceled
            } else {
                match catch_unwind(AssertUnwindSafe(job)) {
                    Ok(value) => WorkResult::Finished(value),
                    Err(payload) => WorkResult::Panicked(panic_message(&*payload)),
                }
            };
            // The receiver lives as long as the queue, and the queue waits for every job.
            let _ = sender.send(Completion { index, result });
        });
        true
    }

    /// Returns the number of jobs submitted so far.
    pub fn submitted(&self) -> usize {
        self.submitted
    }

    /// Returns the number of submitted jobs that haven't reported yet.
    pub fn running(&self) -> usize {
        self.submitted - self.received
    }

    /// Returns true if every submitted job has reported.
    pub fn finished(&self) -> bool {
        self.received == self.submitted
    }

    /// Blocks until the next job reports. Returns `None` once every submitted job has reported.
    pub fn get_result(&mut self) -> Option<Completion<T>> {
        if self.finished() {
            return None;
        }
        // The queue holds a sender, so the channel can't disconnect while jobs are pending.
        let completion = self.receiver.recv().ok()?;
        self.received += 1;
        Some(completion)
    }

    /// Stops the queue: later submissions are rejected, and jobs that haven't started yet
    /// report [`WorkResult::Canceled`] instead of running. Jobs already running finish normally.
    pub fn terminate(&mut self) {
        if !self.terminated.swap(true, Ordering::AcqRel) {
            debug!("terminating work queue with {} jobs running", self.running());
        }
    }

    /// Returns true if [`terminate`](Self::terminate) has been called.
    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    /// Waits for every submitted job to report, discarding the results.
    pub fn join(&mut self) {
        while self.get_result().is_some() {}
    }
}

impl<T> Drop for WorkQueue<T> {
    fn drop(&mut self) {
        self.terminated.store(true, Ordering::Release);
        while self.received < self.submitted {
            if self.receiver.recv().is_err() {
                break;
            }
            self.received += 1;
        }
    }
}
